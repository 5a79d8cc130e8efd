//! An in-process data server producing a synthetic demodulator signal.
//!
//! The server can pretend to be any of the read API generations the monitor
//! knows about ([`ApiLevel`]) and can hand out samples in any of the shapes
//! [`crate::sample::normalize`] accepts ([`SampleShape`]).

use crate::data_server::{Connector, DataServer, NodeValue, PollBatch, ServerError};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;
use std::time::Duration;

/// Which read primitive the simulated server offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiLevel {
    /// subscribe/poll/unsubscribe plus device disconnect
    Poll,
    /// get_sample only
    Sample,
    /// get_as_event only
    Event,
    /// generic node get only
    Node,
    /// no read primitive at all
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleShape {
    /// One array per field
    Structured,
    /// Flat mapping of scalars
    Mapping,
    /// x/y mapping nested under "value", no polar fields
    NestedValue,
    /// Bare in-phase value
    Scalar,
}

const AMPLITUDE_V: f64 = 1e-3;
const CLOCKBASE_HZ: f64 = 60e6;
const SAMPLES_PER_POLL: usize = 3;

#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    devices: Vec<String>,
    api: ApiLevel,
    shape: SampleShape,
    reachable: bool,
    connect_error: Option<String>,
    missing_nodes: Vec<String>,
}

impl SimulatedConnector {
    pub fn new(devices: Vec<String>) -> Self {
        Self {
            devices,
            api: ApiLevel::Poll,
            shape: SampleShape::Structured,
            reachable: true,
            connect_error: None,
            missing_nodes: Vec::new(),
        }
    }

    /// A connector whose server refuses every connection.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_api(mut self, api: ApiLevel) -> Self {
        self.api = api;
        self
    }

    pub fn with_shape(mut self, shape: SampleShape) -> Self {
        self.shape = shape;
        self
    }

    /// Make every `connect_device` fail with `message`.
    pub fn with_connect_error(mut self, message: &str) -> Self {
        self.connect_error = Some(message.to_string());
        self
    }

    /// Reject writes to nodes whose last path segment is `leaf`.
    pub fn without_node(mut self, leaf: &str) -> Self {
        self.missing_nodes.push(leaf.to_string());
        self
    }
}

impl Connector for SimulatedConnector {
    type Server = SimulatedServer;

    fn open(&self, host: &str, port: u16) -> Result<SimulatedServer, ServerError> {
        if !self.reachable {
            return Err(ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{host}:{port} refused the connection"),
            )));
        }
        log::debug!("Simulated data server at {}:{} ({:?})", host, port, self.api);

        Ok(SimulatedServer {
            devices: self.devices.clone(),
            api: self.api,
            shape: self.shape,
            connect_error: self.connect_error.clone(),
            missing_nodes: self.missing_nodes.clone(),
            ..SimulatedServer::new(Vec::new())
        })
    }
}

#[derive(Debug)]
pub struct SimulatedServer {
    devices: Vec<String>,
    api: ApiLevel,
    shape: SampleShape,
    connect_error: Option<String>,
    missing_nodes: Vec<String>,
    nodes: BTreeMap<String, NodeValue>,
    subscribed: BTreeSet<String>,
    connected: BTreeSet<String>,
    phase: f64,
    timestamp: u64,
}

impl SimulatedServer {
    pub fn new(devices: Vec<String>) -> Self {
        Self {
            devices,
            api: ApiLevel::Poll,
            shape: SampleShape::Structured,
            connect_error: None,
            missing_nodes: Vec::new(),
            nodes: BTreeMap::new(),
            subscribed: BTreeSet::new(),
            connected: BTreeSet::new(),
            phase: 0.0,
            timestamp: 0,
        }
    }

    pub fn without_node(mut self, leaf: &str) -> Self {
        self.missing_nodes.push(leaf.to_string());
        self
    }

    /// Last value written to `path`.
    pub fn node(&self, path: &str) -> Option<NodeValue> {
        self.nodes.get(path).copied()
    }

    pub fn is_subscribed(&self, path: &str) -> bool {
        self.subscribed.contains(path)
    }

    pub fn is_device_connected(&self, device_id: &str) -> bool {
        self.connected.contains(&device_id.to_lowercase())
    }

    fn has_device(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.eq_ignore_ascii_case(device_id))
    }

    /// `/dev1/demods/0/sample` -> `dev1`, if that device exists.
    fn device_of(&self, path: &str) -> Result<String, ServerError> {
        let device = path.trim_start_matches('/').split('/').next().unwrap_or_default();
        if self.has_device(device) {
            Ok(device.to_lowercase())
        } else {
            Err(ServerError::Server(format!("Path {path} not found")))
        }
    }

    fn node_f64(&self, path: &str, default: f64) -> f64 {
        self.node(path).map_or(default, |v| v.as_f64())
    }

    /// Advance the phasor by one demodulator sample and return (ts, x, y).
    fn next_point(&mut self, device: &str) -> (u64, f64, f64) {
        let freq = self.node_f64(&format!("/{device}/oscs/0/freq"), 1000.0);
        let rate = self.node_f64(&format!("/{device}/demods/0/rate"), 200.0).max(1.0);

        // A slow beat between the signal and the reference.
        self.phase = (self.phase + TAU * (freq * 1e-6) / rate * 1e3) % TAU;
        self.timestamp += (CLOCKBASE_HZ / rate) as u64;

        (self.timestamp, AMPLITUDE_V * self.phase.cos(), AMPLITUDE_V * self.phase.sin())
    }

    fn shaped_sample(&mut self, device: &str, count: usize) -> Value {
        let points: Vec<(u64, f64, f64)> = (0..count.max(1)).map(|_| self.next_point(device)).collect();
        let &(ts, x, y) = points.last().unwrap_or(&(0, 0.0, 0.0));

        match self.shape {
            SampleShape::Structured => json!({
                "timestamp": points.iter().map(|p| p.0).collect::<Vec<_>>(),
                "x": points.iter().map(|p| p.1).collect::<Vec<_>>(),
                "y": points.iter().map(|p| p.2).collect::<Vec<_>>(),
                "r": points.iter().map(|p| p.1.hypot(p.2)).collect::<Vec<_>>(),
                "phi": points.iter().map(|p| p.2.atan2(p.1)).collect::<Vec<_>>(),
            }),
            SampleShape::Mapping => json!({
                "timestamp": ts,
                "x": x,
                "y": y,
                "r": x.hypot(y),
                "phi": y.atan2(x),
            }),
            SampleShape::NestedValue => json!({
                "timestamp": ts,
                "value": { "x": x, "y": y },
            }),
            SampleShape::Scalar => json!(x),
        }
    }

    fn require(&self, api: ApiLevel, name: &'static str) -> Result<(), ServerError> {
        if self.api == api {
            Ok(())
        } else {
            Err(ServerError::Unsupported(name))
        }
    }
}

impl DataServer for SimulatedServer {
    fn visible_devices(&mut self) -> Result<Vec<String>, ServerError> {
        Ok(self.devices.clone())
    }

    fn connect_device(&mut self, device_id: &str) -> Result<(), ServerError> {
        if !self.has_device(device_id) {
            return Err(ServerError::Server(format!("Device {device_id} not found")));
        }
        if let Some(message) = &self.connect_error {
            return Err(ServerError::Server(message.clone()));
        }
        self.connected.insert(device_id.to_lowercase());
        Ok(())
    }

    fn disconnect_device(&mut self, device_id: &str) -> Result<(), ServerError> {
        self.require(ApiLevel::Poll, "disconnect_device")?;
        self.connected.remove(&device_id.to_lowercase());
        Ok(())
    }

    fn set(&mut self, path: &str, value: NodeValue) -> Result<(), ServerError> {
        self.device_of(path)?;
        let leaf = path.rsplit('/').next().unwrap_or_default();
        if self.missing_nodes.iter().any(|m| m == leaf) {
            return Err(ServerError::Server(format!("Path {path} not found")));
        }
        self.nodes.insert(path.to_string(), value);
        Ok(())
    }

    fn subscribe(&mut self, path: &str) -> Result<(), ServerError> {
        self.require(ApiLevel::Poll, "subscribe")?;
        self.device_of(path)?;
        self.subscribed.insert(path.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, path: &str) -> Result<(), ServerError> {
        self.require(ApiLevel::Poll, "unsubscribe")?;
        self.subscribed.remove(path);
        Ok(())
    }

    fn poll(&mut self, _duration: Duration, _timeout: Duration) -> Result<PollBatch, ServerError> {
        self.require(ApiLevel::Poll, "poll")?;
        let mut batch = PollBatch::new();
        for path in self.subscribed.clone() {
            let device = self.device_of(&path)?;
            batch.insert(path, self.shaped_sample(&device, SAMPLES_PER_POLL));
        }
        Ok(batch)
    }

    fn get_sample(&mut self, path: &str) -> Result<Value, ServerError> {
        self.require(ApiLevel::Sample, "get_sample")?;
        let device = self.device_of(path)?;
        Ok(self.shaped_sample(&device, 1))
    }

    fn get_as_event(&mut self, path: &str) -> Result<Value, ServerError> {
        self.require(ApiLevel::Event, "get_as_event")?;
        let device = self.device_of(path)?;
        Ok(self.shaped_sample(&device, 1))
    }

    fn get(&mut self, path: &str) -> Result<Value, ServerError> {
        self.require(ApiLevel::Node, "get")?;
        let device = self.device_of(path)?;
        let sample = self.shaped_sample(&device, 1);
        Ok(json!({ path: sample }))
    }
}
