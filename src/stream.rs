use crate::channel_config::{self, ChannelConfig, ChannelPolicy, ConfigurationError, DemodChannel};
use crate::data_server::{lookup_path, Connector, DataServer, ServerError};
use crate::session::{is_valid_device_id, looks_like_in_use_error, Session, SessionError};
use crate::ticker::Ticker;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Not connected to a data server")]
    NotConnected,

    #[error("No valid device selected")]
    NoValidDevice,

    #[error("Could not connect device {device}: {source}")]
    DeviceConnect {
        device: String,
        #[source]
        source: ServerError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Could not configure device {device}: {source}")]
    Configuration {
        device: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("Could not start live stream from {path}: {source}")]
    Start {
        path: String,
        #[source]
        source: ServerError,
    },

    #[error("Poll error: {0}")]
    Poll(#[source] ServerError),
}

/// How samples are read, decided once when the stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMethod {
    /// Subscribed to the sample path; read with `poll`.
    Subscribed,
    /// `get_sample` on the sample path.
    DirectRead,
    /// `get_as_event` on the sample path.
    PolledEvent,
    /// Generic `get`, sample unwrapped from the path-keyed reply.
    NodeGet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connected,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStream {
    pub device_id: String,
    pub path: String,
    pub method: FeedMethod,
}

/// Timing of the render loop and of poll reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTiming {
    pub render_period: Duration,
    pub poll_duration: Duration,
    pub poll_timeout: Duration,
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self {
            render_period: Duration::from_millis(200),
            poll_duration: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(500),
        }
    }
}

pub struct StreamController<S: DataServer, T: Ticker> {
    session: Option<Session<S>>,
    active: Option<ActiveStream>,
    ticker: T,
    policy: ChannelPolicy,
    timing: StreamTiming,
}

impl<S: DataServer, T: Ticker> StreamController<S, T> {
    pub fn new(ticker: T, policy: ChannelPolicy, timing: StreamTiming) -> Self {
        Self {
            session: None,
            active: None,
            ticker,
            policy,
            timing,
        }
    }

    pub fn state(&self) -> StreamState {
        match (&self.session, &self.active) {
            (None, _) => StreamState::Disconnected,
            (Some(_), None) => StreamState::Connected,
            (Some(_), Some(_)) => StreamState::Streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveStream> {
        self.active.as_ref()
    }

    pub fn session(&mut self) -> Option<&mut Session<S>> {
        self.session.as_mut()
    }

    pub fn ticker(&self) -> &T {
        &self.ticker
    }

    pub fn ticker_mut(&mut self) -> &mut T {
        &mut self.ticker
    }

    pub fn policy(&self) -> &ChannelPolicy {
        &self.policy
    }

    /// Open a new session, replacing the current one. On failure the
    /// controller is left disconnected.
    pub fn connect<C>(&mut self, connector: &C, host: &str, port: u16) -> Result<(), StreamError>
    where
        C: Connector<Server = S>,
    {
        self.disconnect();
        self.session = Some(Session::open(connector, host, port)?);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.stop();
        if self.session.take().is_some() {
            log::info!("Disconnected from data server");
        }
    }

    /// Start streaming from `device_id`. A stream already running is stopped
    /// first.
    pub fn start(&mut self, device_id: &str, config: &ChannelConfig) -> Result<&ActiveStream, StreamError> {
        let device_id = device_id.trim();
        if self.session.is_none() {
            return Err(StreamError::NotConnected);
        }
        if !is_valid_device_id(device_id) {
            return Err(StreamError::NoValidDevice);
        }

        if self.is_streaming() {
            log::debug!("Restarting stream");
            self.stop();
        }

        let session = self.session.as_mut().ok_or(StreamError::NotConnected)?;
        let channel = DemodChannel::new(device_id);

        match session.connect_device(device_id) {
            Ok(()) => {}
            Err(SessionError::Device { source, .. }) if looks_like_in_use_error(&source.to_string()) => {
                log::warn!("Device {} appears to be in use ({}); trying to read anyway", device_id, source);
            }
            Err(SessionError::Device { device, source }) => {
                return Err(StreamError::DeviceConnect { device, source });
            }
            Err(e) => return Err(e.into()),
        }

        channel_config::apply(session.server(), &channel, config, &self.policy).map_err(|source| {
            StreamError::Configuration {
                device: device_id.to_string(),
                source,
            }
        })?;

        let path = channel.sample_path();
        let method = negotiate_feed(session.server(), &path).map_err(|source| StreamError::Start {
            path: path.clone(),
            source,
        })?;
        log::info!("Streaming from {} via {:?}", path, method);

        self.ticker.start(self.timing.render_period);
        Ok(&*self.active.insert(ActiveStream {
            device_id: device_id.to_string(),
            path,
            method,
        }))
    }

    /// Stop the stream. The ticker is halted before any teardown call.
    /// Returns false if nothing was streaming.
    pub fn stop(&mut self) -> bool {
        self.ticker.stop();

        let Some(active) = self.active.take() else {
            return false;
        };
        let Some(session) = self.session.as_mut() else {
            return true;
        };

        if active.method == FeedMethod::Subscribed {
            if let Err(e) = session.server().unsubscribe(&active.path) {
                log::debug!("Ignoring unsubscribe failure for {}: {}", active.path, e);
            }
        }
        session.disconnect_device(&active.device_id);
        log::info!("Stopped stream from {}", active.path);
        true
    }

    /// Read the most recent raw sample of the active stream. `Ok(None)` means
    /// there is nothing new this tick.
    pub fn fetch_latest(&mut self) -> Result<Option<Value>, StreamError> {
        let (Some(active), Some(session)) = (self.active.as_ref(), self.session.as_mut()) else {
            return Ok(None);
        };
        let server = session.server();
        let path = active.path.as_str();

        let raw = match active.method {
            FeedMethod::Subscribed => {
                let batch = server
                    .poll(self.timing.poll_duration, self.timing.poll_timeout)
                    .map_err(StreamError::Poll)?;
                lookup_path(&batch, path).cloned()
            }
            FeedMethod::DirectRead => Some(server.get_sample(path).map_err(StreamError::Poll)?),
            FeedMethod::PolledEvent => Some(server.get_as_event(path).map_err(StreamError::Poll)?),
            FeedMethod::NodeGet => {
                let reply = server.get(path).map_err(StreamError::Poll)?;
                let keyed = match &reply {
                    Value::Object(entries) => lookup_path(entries, path).cloned(),
                    _ => None,
                };
                keyed.or_else(|| {
                    log::debug!("get reply for {} is not keyed by path, reading it as the sample", path);
                    Some(reply)
                })
            }
        };

        Ok(raw.filter(|v| !v.is_null()))
    }
}

/// Find the first read primitive the server supports. Only
/// [`ServerError::Unsupported`] moves on to the next candidate.
fn negotiate_feed<S: DataServer>(server: &mut S, path: &str) -> Result<FeedMethod, ServerError> {
    match server.subscribe(path) {
        Ok(()) => return Ok(FeedMethod::Subscribed),
        Err(e) if e.is_unsupported() => log::debug!("{e}"),
        Err(e) => return Err(e),
    }
    match server.get_sample(path) {
        Ok(_) => return Ok(FeedMethod::DirectRead),
        Err(e) if e.is_unsupported() => log::debug!("{e}"),
        Err(e) => return Err(e),
    }
    match server.get_as_event(path) {
        Ok(_) => return Ok(FeedMethod::PolledEvent),
        Err(e) if e.is_unsupported() => log::debug!("{e}"),
        Err(e) => return Err(e),
    }
    server.get(path).map(|_| FeedMethod::NodeGet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_server::NodeValue;
    use crate::simulated::{ApiLevel, SimulatedConnector};
    use crate::ticker::IntervalTicker;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    /// Server stand-in that records every call into a journal shared with
    /// the ticker, so call order across both can be checked.
    struct RecordingServer {
        journal: Journal,
        teardown_fails: bool,
        connect_error: Option<String>,
    }

    impl RecordingServer {
        fn record(&self, entry: String) {
            self.journal.borrow_mut().push(entry);
        }
    }

    impl DataServer for RecordingServer {
        fn visible_devices(&mut self) -> Result<Vec<String>, ServerError> {
            Ok(vec!["dev1".into(), "dev2".into()])
        }

        fn connect_device(&mut self, device_id: &str) -> Result<(), ServerError> {
            self.record(format!("connect_device {device_id}"));
            match &self.connect_error {
                Some(msg) => Err(ServerError::Server(msg.clone())),
                None => Ok(()),
            }
        }

        fn disconnect_device(&mut self, device_id: &str) -> Result<(), ServerError> {
            self.record(format!("disconnect_device {device_id}"));
            if self.teardown_fails {
                return Err(ServerError::Server("gone".into()));
            }
            Ok(())
        }

        fn set(&mut self, _path: &str, _value: NodeValue) -> Result<(), ServerError> {
            Ok(())
        }

        fn subscribe(&mut self, path: &str) -> Result<(), ServerError> {
            self.record(format!("subscribe {path}"));
            Ok(())
        }

        fn unsubscribe(&mut self, path: &str) -> Result<(), ServerError> {
            self.record(format!("unsubscribe {path}"));
            if self.teardown_fails {
                return Err(ServerError::Server("gone".into()));
            }
            Ok(())
        }
    }

    struct RecordingConnector {
        journal: Journal,
        teardown_fails: bool,
        connect_error: Option<String>,
    }

    impl Connector for RecordingConnector {
        type Server = RecordingServer;

        fn open(&self, _host: &str, _port: u16) -> Result<RecordingServer, ServerError> {
            Ok(RecordingServer {
                journal: self.journal.clone(),
                teardown_fails: self.teardown_fails,
                connect_error: self.connect_error.clone(),
            })
        }
    }

    struct RecordingTicker {
        journal: Journal,
        active: bool,
    }

    impl Ticker for RecordingTicker {
        fn start(&mut self, _period: Duration) {
            self.journal.borrow_mut().push("timer start".into());
            self.active = true;
        }

        fn stop(&mut self) {
            self.journal.borrow_mut().push("timer stop".into());
            self.active = false;
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn due(&mut self, _now: std::time::Instant) -> bool {
            self.active
        }
    }

    fn recording(
        teardown_fails: bool,
        connect_error: Option<&str>,
    ) -> (StreamController<RecordingServer, RecordingTicker>, Journal) {
        let journal = Journal::default();
        let connector = RecordingConnector {
            journal: journal.clone(),
            teardown_fails,
            connect_error: connect_error.map(str::to_string),
        };
        let ticker = RecordingTicker {
            journal: journal.clone(),
            active: false,
        };
        let mut controller = StreamController::new(ticker, ChannelPolicy::default(), StreamTiming::default());
        controller.connect(&connector, "localhost", 8004).unwrap();
        journal.borrow_mut().clear();
        (controller, journal)
    }

    fn simulated(api: ApiLevel) -> StreamController<crate::simulated::SimulatedServer, IntervalTicker> {
        let connector = SimulatedConnector::new(vec!["dev1".into()]).with_api(api);
        let mut controller =
            StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
        controller.connect(&connector, "localhost", 8004).unwrap();
        controller
    }

    #[test]
    fn test_state_transitions() {
        let mut controller = simulated(ApiLevel::Poll);
        assert_eq!(controller.state(), StreamState::Connected);

        controller.start("dev1", &ChannelConfig::default()).unwrap();
        assert_eq!(controller.state(), StreamState::Streaming);
        assert!(controller.ticker().is_active());

        assert!(controller.stop());
        assert_eq!(controller.state(), StreamState::Connected);
        assert!(!controller.ticker().is_active());
        assert!(!controller.stop());

        controller.disconnect();
        assert_eq!(controller.state(), StreamState::Disconnected);
    }

    #[test]
    fn test_start_requires_session() {
        let mut controller: StreamController<crate::simulated::SimulatedServer, IntervalTicker> =
            StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
        assert!(matches!(
            controller.start("dev1", &ChannelConfig::default()),
            Err(StreamError::NotConnected)
        ));
    }

    #[test]
    fn test_missing_session_reported_before_device() {
        let mut controller: StreamController<crate::simulated::SimulatedServer, IntervalTicker> =
            StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
        for device in ["(none found)", ""] {
            assert!(matches!(
                controller.start(device, &ChannelConfig::default()),
                Err(StreamError::NotConnected)
            ));
        }
    }

    #[test]
    fn test_failed_config_write_aborts_start() {
        let connector = SimulatedConnector::new(vec!["dev1".into()]).without_node("rate");
        let mut controller =
            StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
        controller.connect(&connector, "localhost", 8004).unwrap();

        let err = controller.start("dev1", &ChannelConfig::default()).unwrap_err();
        assert!(matches!(
            &err,
            StreamError::Configuration { device, source }
                if device == "dev1" && source.node == "/dev1/demods/0/rate"
        ));
        assert_eq!(controller.state(), StreamState::Connected);
        assert!(!controller.ticker().is_active());
        let server = controller.session().unwrap().server();
        assert!(!server.is_subscribed("/dev1/demods/0/sample"));
    }

    #[test]
    fn test_placeholder_device_never_reaches_server() {
        let (mut controller, journal) = recording(false, None);
        let err = controller.start("(none found)", &ChannelConfig::default()).unwrap_err();

        assert!(matches!(err, StreamError::NoValidDevice));
        assert!(err.to_string().to_lowercase().contains("no valid device"));
        assert!(journal.borrow().is_empty());
        assert_eq!(controller.state(), StreamState::Connected);
    }

    #[test]
    fn test_stop_halts_timer_before_teardown() {
        for teardown_fails in [false, true] {
            let (mut controller, journal) = recording(teardown_fails, None);
            controller.start("dev1", &ChannelConfig::default()).unwrap();
            journal.borrow_mut().clear();

            assert!(controller.stop());
            assert_eq!(
                *journal.borrow(),
                vec![
                    "timer stop".to_string(),
                    "unsubscribe /dev1/demods/0/sample".to_string(),
                    "disconnect_device dev1".to_string(),
                ]
            );
            assert_eq!(controller.state(), StreamState::Connected);
        }
    }

    #[test]
    fn test_restart_stops_previous_stream() {
        let (mut controller, journal) = recording(false, None);
        controller.start("dev1", &ChannelConfig::default()).unwrap();
        controller.start("dev2", &ChannelConfig::default()).unwrap();

        let entries = journal.borrow();
        let subscribes = entries.iter().filter(|e| e.starts_with("subscribe")).count();
        let unsubscribes = entries.iter().filter(|e| e.starts_with("unsubscribe")).count();
        assert_eq!(subscribes - unsubscribes, 1);
        assert!(entries.contains(&"unsubscribe /dev1/demods/0/sample".to_string()));
        drop(entries);

        let active = controller.active().unwrap();
        assert_eq!(active.device_id, "dev2");
        assert_eq!(active.path, "/dev2/demods/0/sample");
        assert_eq!(controller.state(), StreamState::Streaming);
    }

    #[test]
    fn test_in_use_device_does_not_abort_start() {
        let (mut controller, journal) = recording(false, Some("Device dev1 is already in use"));
        controller.start("dev1", &ChannelConfig::default()).unwrap();

        assert_eq!(controller.state(), StreamState::Streaming);
        assert!(journal.borrow().contains(&"subscribe /dev1/demods/0/sample".to_string()));
    }

    #[test]
    fn test_other_connect_failure_aborts_start() {
        let (mut controller, journal) = recording(false, Some("device not found"));
        let err = controller.start("dev1", &ChannelConfig::default()).unwrap_err();

        assert!(matches!(err, StreamError::DeviceConnect { .. }));
        assert_eq!(controller.state(), StreamState::Connected);
        assert!(!controller.ticker().is_active());
        assert!(!journal.borrow().iter().any(|e| e.starts_with("subscribe")));
    }

    #[test]
    fn test_negotiates_first_supported_feed() {
        let cases = [
            (ApiLevel::Poll, FeedMethod::Subscribed),
            (ApiLevel::Sample, FeedMethod::DirectRead),
            (ApiLevel::Event, FeedMethod::PolledEvent),
            (ApiLevel::Node, FeedMethod::NodeGet),
        ];
        for (api, expected) in cases {
            let mut controller = simulated(api);
            let active = controller.start("dev1", &ChannelConfig::default()).unwrap();
            assert_eq!(active.method, expected, "{:?}", api);
            assert!(controller.fetch_latest().unwrap().is_some(), "{:?}", api);
        }
    }

    #[test]
    fn test_no_feed_method_aborts_start() {
        let mut controller = simulated(ApiLevel::None);
        let err = controller.start("dev1", &ChannelConfig::default()).unwrap_err();

        assert!(matches!(err, StreamError::Start { .. }));
        assert_eq!(controller.state(), StreamState::Connected);
        assert!(!controller.ticker().is_active());
    }

    /// Node-only server whose `get` returns the sample itself instead of a
    /// path-keyed mapping.
    struct BareNodeServer;

    impl DataServer for BareNodeServer {
        fn visible_devices(&mut self) -> Result<Vec<String>, ServerError> {
            Ok(vec!["dev1".into()])
        }

        fn connect_device(&mut self, _device_id: &str) -> Result<(), ServerError> {
            Ok(())
        }

        fn set(&mut self, _path: &str, _value: NodeValue) -> Result<(), ServerError> {
            Ok(())
        }

        fn get(&mut self, _path: &str) -> Result<Value, ServerError> {
            Ok(serde_json::json!({"x": 0.003, "y": 0.004}))
        }
    }

    struct BareNodeConnector;

    impl Connector for BareNodeConnector {
        type Server = BareNodeServer;

        fn open(&self, _host: &str, _port: u16) -> Result<BareNodeServer, ServerError> {
            Ok(BareNodeServer)
        }
    }

    #[test]
    fn test_unkeyed_get_reply_is_read_as_sample() {
        let mut controller =
            StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
        controller.connect(&BareNodeConnector, "localhost", 8004).unwrap();
        let active = controller.start("dev1", &ChannelConfig::default()).unwrap();
        assert_eq!(active.method, FeedMethod::NodeGet);

        let raw = controller.fetch_latest().unwrap().unwrap();
        assert_eq!(raw, serde_json::json!({"x": 0.003, "y": 0.004}));
    }

    #[test]
    fn test_fetch_without_stream_is_empty() {
        let mut controller = simulated(ApiLevel::Poll);
        assert!(controller.fetch_latest().unwrap().is_none());
    }
}
