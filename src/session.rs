use crate::data_server::{Connector, DataServer, ServerError};

/// Entry shown in the device selector when enumeration finds nothing.
pub const NO_DEVICES_PLACEHOLDER: &str = "(none found)";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Could not connect to data server at {host}:{port}: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: ServerError,
    },

    #[error("Could not query visible devices: {0}")]
    Query(#[source] ServerError),

    #[error("Device {device}: {source}")]
    Device {
        device: String,
        #[source]
        source: ServerError,
    },
}

/// Whether a device-connect failure means another client holds the device.
/// Some server setups still allow read-only listeners in that case.
pub fn looks_like_in_use_error(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("in use")
        || m.contains("already connected")
        || m.contains("32789")
        || m.contains("different server")
}

/// Returns false for empty ids and placeholder entries such as `(none found)`.
pub fn is_valid_device_id(device_id: &str) -> bool {
    let id = device_id.trim();
    !id.is_empty() && !id.starts_with('(')
}

/// Entries offered by the device selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList {
    entries: Vec<String>,
}

impl DeviceList {
    pub fn new(devices: Vec<String>) -> Self {
        if devices.is_empty() {
            Self {
                entries: vec![NO_DEVICES_PLACEHOLDER.to_string()],
            }
        } else {
            Self { entries: devices }
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// Number of real devices, not counting the placeholder.
    pub fn device_count(&self) -> usize {
        self.entries.iter().filter(|e| is_valid_device_id(e)).count()
    }
}

impl Default for DeviceList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// An open connection to a data server.
pub struct Session<S: DataServer> {
    host: String,
    port: u16,
    server: S,
}

impl<S: DataServer> Session<S> {
    pub fn open<C>(connector: &C, host: &str, port: u16) -> Result<Self, SessionError>
    where
        C: Connector<Server = S>,
    {
        log::debug!("Connecting to data server at {}:{}", host, port);
        let server = connector
            .open(host, port)
            .map_err(|source| SessionError::Connection {
                host: host.to_string(),
                port,
                source,
            })?;
        log::info!("Connected to data server at {}:{}", host, port);

        Ok(Self {
            host: host.to_string(),
            port,
            server,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn server(&mut self) -> &mut S {
        &mut self.server
    }

    pub fn visible_devices(&mut self) -> Result<Vec<String>, SessionError> {
        let devices = self.server.visible_devices().map_err(SessionError::Query)?;
        log::debug!("Visible devices: {:?}", devices);
        Ok(devices)
    }

    pub fn connect_device(&mut self, device_id: &str) -> Result<(), SessionError> {
        self.server
            .connect_device(device_id)
            .map_err(|source| SessionError::Device {
                device: device_id.to_string(),
                source,
            })
    }

    /// Release the device. Not every server version supports this, so
    /// failures are only logged.
    pub fn disconnect_device(&mut self, device_id: &str) {
        if let Err(e) = self.server.disconnect_device(device_id) {
            log::debug!("Ignoring disconnect failure for {}: {}", device_id, e);
        }
    }
}
