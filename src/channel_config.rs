use crate::data_server::{DataServer, NodeValue, ServerError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FREQUENCY_HZ: f64 = 1000.0;
pub const DEFAULT_TIME_CONSTANT_S: f64 = 0.01;
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 200.0;

#[derive(Debug, thiserror::Error)]
#[error("Failed to set {node}: {source}")]
pub struct ConfigurationError {
    pub node: String,
    #[source]
    pub source: ServerError,
}

/// The demodulator channel being monitored. Only input, demodulator and
/// oscillator 0 are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemodChannel {
    device_id: String,
}

impl DemodChannel {
    const SIGIN: u8 = 0;
    const DEMOD: u8 = 0;
    const OSC: u8 = 0;

    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn sigin_node(&self, leaf: &str) -> String {
        format!("/{}/sigins/{}/{}", self.device_id, Self::SIGIN, leaf)
    }

    fn demod_node(&self, leaf: &str) -> String {
        format!("/{}/demods/{}/{}", self.device_id, Self::DEMOD, leaf)
    }

    fn osc_node(&self, leaf: &str) -> String {
        format!("/{}/oscs/{}/{}", self.device_id, Self::OSC, leaf)
    }

    /// `/{device}/demods/0/sample`
    pub fn sample_path(&self) -> String {
        self.demod_node("sample")
    }
}

/// Settings that are hardware policy rather than user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPolicy {
    pub filter_order: u8,
    pub autorange: bool,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            filter_order: 4,
            autorange: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub frequency_hz: f64,
    pub time_constant_s: f64,
    pub sample_rate_hz: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            time_constant_s: DEFAULT_TIME_CONSTANT_S,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
        }
    }
}

impl ChannelConfig {
    /// Parse the three text fields. Each one falls back to its own default
    /// when it does not hold a finite number.
    pub fn from_inputs(frequency: &str, time_constant: &str, sample_rate: &str) -> Self {
        Self::from_inputs_or(frequency, time_constant, sample_rate, &Self::default())
    }

    /// Like [`ChannelConfig::from_inputs`] with caller-supplied fallbacks.
    pub fn from_inputs_or(
        frequency: &str,
        time_constant: &str,
        sample_rate: &str,
        fallback: &Self,
    ) -> Self {
        Self {
            frequency_hz: parse_or("frequency", frequency, fallback.frequency_hz),
            time_constant_s: parse_or("time constant", time_constant, fallback.time_constant_s),
            sample_rate_hz: parse_or("sample rate", sample_rate, fallback.sample_rate_hz),
        }
    }
}

fn parse_or(field: &str, text: &str, default: f64) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            log::warn!("Invalid {} '{}', using {}", field, text, default);
            default
        }
    }
}

fn write<S: DataServer>(server: &mut S, node: String, value: NodeValue) -> Result<(), ConfigurationError> {
    log::debug!("{} = {}", node, value);
    server
        .set(&node, value)
        .map_err(|source| ConfigurationError { node, source })
}

/// Enable the input and demodulator, then write frequency, time constant,
/// filter order and rate.
pub fn apply<S: DataServer>(
    server: &mut S,
    channel: &DemodChannel,
    config: &ChannelConfig,
    policy: &ChannelPolicy,
) -> Result<(), ConfigurationError> {
    write(server, channel.sigin_node("on"), NodeValue::Int(1))?;
    write(server, channel.demod_node("enable"), NodeValue::Int(1))?;

    write(server, channel.osc_node("freq"), NodeValue::Double(config.frequency_hz))?;
    write(
        server,
        channel.demod_node("timeconstant"),
        NodeValue::Double(config.time_constant_s),
    )?;
    write(
        server,
        channel.demod_node("order"),
        NodeValue::Int(i64::from(policy.filter_order)),
    )?;
    write(server, channel.demod_node("rate"), NodeValue::Double(config.sample_rate_hz))?;

    if policy.autorange {
        // Older firmware has no autorange node.
        if let Err(e) = server.set(&channel.sigin_node("autorange"), NodeValue::Int(1)) {
            log::debug!("Autorange not applied: {}", e);
        }
    }

    Ok(())
}
