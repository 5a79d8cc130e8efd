use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Samples returned by a poll, keyed by node path.
pub type PollBatch = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0} is not supported by this data server")]
    Unsupported(&'static str),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeValue {
    Int(i64),
    Double(f64),
}

impl NodeValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int(v) => v as f64,
            Self::Double(v) => v,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

/// A connection to a lock-in data server.
///
/// Only enumeration, device connection and node writes are mandatory. The
/// read primitives differ between server versions, so they default to
/// [`ServerError::Unsupported`] and an implementation overrides the ones it
/// actually has.
pub trait DataServer {
    fn visible_devices(&mut self) -> Result<Vec<String>, ServerError>;

    fn connect_device(&mut self, device_id: &str) -> Result<(), ServerError>;

    fn disconnect_device(&mut self, _device_id: &str) -> Result<(), ServerError> {
        Err(ServerError::Unsupported("disconnect_device"))
    }

    fn set(&mut self, path: &str, value: NodeValue) -> Result<(), ServerError>;

    fn subscribe(&mut self, _path: &str) -> Result<(), ServerError> {
        Err(ServerError::Unsupported("subscribe"))
    }

    fn unsubscribe(&mut self, _path: &str) -> Result<(), ServerError> {
        Err(ServerError::Unsupported("unsubscribe"))
    }

    /// Collect data for all subscribed paths for `duration`, waiting at most
    /// `timeout` for the server to answer.
    fn poll(&mut self, _duration: Duration, _timeout: Duration) -> Result<PollBatch, ServerError> {
        Err(ServerError::Unsupported("poll"))
    }

    fn get_sample(&mut self, _path: &str) -> Result<Value, ServerError> {
        Err(ServerError::Unsupported("get_sample"))
    }

    fn get_as_event(&mut self, _path: &str) -> Result<Value, ServerError> {
        Err(ServerError::Unsupported("get_as_event"))
    }

    /// Generic node read. The result is a mapping keyed by node path.
    fn get(&mut self, _path: &str) -> Result<Value, ServerError> {
        Err(ServerError::Unsupported("get"))
    }
}

/// Opens connections to a data server.
pub trait Connector {
    type Server: DataServer;

    fn open(&self, host: &str, port: u16) -> Result<Self::Server, ServerError>;
}

/// Look up `path` in a path-keyed mapping. Servers are not consistent about
/// the case of device ids, so keys compare ASCII case-insensitively.
pub fn lookup_path<'a>(entries: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    entries.get(path).or_else(|| {
        entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(path))
            .map(|(_, value)| value)
    })
}
