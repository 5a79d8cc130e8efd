//! # lockin-monitor
//!
//! A live monitor for one demodulator of a lock-in amplifier.
//!
//! The monitor connects to the instrument's data server, lists the visible
//! devices, applies a few channel settings (oscillator frequency,
//! demodulator time constant, filter order, sample rate), starts a sample
//! feed for `/{device}/demods/0/sample` and repaints X, Y, R and phi on a
//! 200 ms timer.
//!
//! ## Features
//!
//! - **Pluggable data server**: the [`DataServer`] trait only requires the
//!   calls every server version has; the read primitives are optional and
//!   negotiated once when a stream starts ([`FeedMethod`])
//! - **Shape-tolerant samples**: [`normalize`] accepts structured, mapping,
//!   nested and scalar samples and derives R/phi when missing
//! - **Toolkit independent UI logic**: [`LiveMonitor`] drives any
//!   [`MonitorView`]
//! - **Simulated server** for trying things out without hardware
//!
//! ## Examples
//!
//! ### Streaming from a simulated server
//!
//! ```rust
//! use lockin_monitor::{
//!     IntervalTicker, LiveMonitor, MonitorSettings, SimulatedConnector, TextPanel, TickOutcome,
//! };
//!
//! let connector = SimulatedConnector::new(vec!["dev1".to_string()]);
//! let settings = MonitorSettings::default();
//! let mut monitor = LiveMonitor::new(connector, IntervalTicker::new(), TextPanel::new(), &settings);
//!
//! assert!(monitor.connect());
//! assert!(monitor.start());
//! assert!(matches!(monitor.tick(), TickOutcome::Rendered(_)));
//! println!("{}", monitor.view().readout);
//!
//! monitor.close();
//! ```
//!
//! ### Normalizing a raw sample
//!
//! ```rust
//! use lockin_monitor::{normalize, Readout};
//! use serde_json::json;
//!
//! let sample = normalize(&json!({"value": {"x": 3.0, "y": 4.0}})).unwrap();
//! assert_eq!(sample.r, 5.0);
//!
//! let readout = Readout::from_sample(&sample);
//! assert_eq!(readout.r, "R: 5.000000e+00");
//! ```
//!
//! ### Driving the stream controller directly
//!
//! ```rust
//! use lockin_monitor::{
//!     ChannelConfig, ChannelPolicy, FeedMethod, IntervalTicker, SimulatedConnector,
//!     StreamController, StreamTiming,
//! };
//! use lockin_monitor::simulated::ApiLevel;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = SimulatedConnector::new(vec!["dev1".into()]).with_api(ApiLevel::Sample);
//! let mut controller =
//!     StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
//!
//! controller.connect(&connector, "localhost", 8004)?;
//! let config = ChannelConfig::from_inputs("2000", "0.02", "oops"); // rate falls back to 200
//! let active = controller.start("dev1", &config)?;
//! assert_eq!(active.method, FeedMethod::DirectRead);
//!
//! let raw = controller.fetch_latest()?;
//! assert!(raw.is_some());
//! controller.stop();
//! # Ok(())
//! # }
//! ```

pub mod channel_config;
pub mod data_server;
pub mod monitor;
pub mod readout;
pub mod renderer;
pub mod sample;
pub mod session;
pub mod settings;
pub mod simulated;
pub mod stream;
pub mod ticker;

// Re-export the main types for convenience
pub use channel_config::{ChannelConfig, ChannelPolicy, ConfigurationError, DemodChannel};

pub use data_server::{Connector, DataServer, NodeValue, PollBatch, ServerError};

pub use session::{
    is_valid_device_id, looks_like_in_use_error, DeviceList, Session, SessionError,
    NO_DEVICES_PLACEHOLDER,
};

pub use stream::{ActiveStream, FeedMethod, StreamController, StreamError, StreamState, StreamTiming};

pub use sample::{normalize, DemodSample, ParseError};

pub use readout::{scientific, ErrorDialog, MonitorView, Readout, TextPanel};

pub use renderer::{render_tick, TickOutcome};

pub use monitor::{LiveMonitor, MonitorForm};

pub use settings::{MonitorSettings, SettingsError};

pub use simulated::{SimulatedConnector, SimulatedServer};

pub use ticker::{IntervalTicker, Ticker};
