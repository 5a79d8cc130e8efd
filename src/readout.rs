use crate::sample::DemodSample;
use std::fmt;

/// Shown in place of a value while nothing is streaming.
pub const UNSET: &str = "—";

/// Text of the four live-value labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub x: String,
    pub y: String,
    pub r: String,
    pub phi: String,
}

impl Readout {
    pub fn unset() -> Self {
        Self {
            x: format!("X: {UNSET}"),
            y: format!("Y: {UNSET}"),
            r: format!("R: {UNSET}"),
            phi: format!("phi: {UNSET}"),
        }
    }

    pub fn from_sample(sample: &DemodSample) -> Self {
        Self {
            x: format!("X: {}", scientific(sample.x, true)),
            y: format!("Y: {}", scientific(sample.y, true)),
            r: format!("R: {}", scientific(sample.r, false)),
            phi: format!("phi: {:+.3} rad", sample.phi),
        }
    }

    pub fn lines(&self) -> [&str; 4] {
        [&self.x, &self.y, &self.r, &self.phi]
    }
}

impl Default for Readout {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}  {}  {}", self.x, self.y, self.r, self.phi)
    }
}

/// Six-digit scientific notation with a signed, at least two-digit exponent
/// (`1.000000e-03`). With `signed` a `+` is written for non-negative values.
pub fn scientific(value: f64, signed: bool) -> String {
    if !value.is_finite() {
        let text = if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
        return if signed && !text.starts_with('-') {
            format!("+{text}")
        } else {
            text
        };
    }

    let formatted = if signed {
        format!("{value:+.6e}")
    } else {
        format!("{value:.6e}")
    };
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => formatted,
    }
}

/// Where the monitor shows its state. A windowing toolkit implements this
/// over its widgets.
pub trait MonitorView {
    fn set_status(&mut self, message: &str);

    /// Modal error requiring acknowledgment.
    fn show_error(&mut self, title: &str, message: &str);

    fn set_devices(&mut self, devices: &[String]);

    fn set_readout(&mut self, readout: &Readout);

    /// Start is enabled while not streaming, Stop while streaming.
    fn set_streaming(&mut self, streaming: bool);
}

/// A modal error the user has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDialog {
    pub title: String,
    pub message: String,
}

/// In-memory view. Keeps what a window would display.
#[derive(Debug, Clone, Default)]
pub struct TextPanel {
    pub status: String,
    pub devices: Vec<String>,
    pub readout: Readout,
    pub streaming: bool,
    pub errors: Vec<ErrorDialog>,
}

impl TextPanel {
    pub fn new() -> Self {
        Self {
            status: "Status: Disconnected".to_string(),
            ..Self::default()
        }
    }

    /// Acknowledge and return the oldest pending error.
    pub fn acknowledge(&mut self) -> Option<ErrorDialog> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.remove(0))
        }
    }
}

impl MonitorView for TextPanel {
    fn set_status(&mut self, message: &str) {
        self.status = format!("Status: {message}");
    }

    fn show_error(&mut self, title: &str, message: &str) {
        log::error!("{}: {}", title, message);
        self.errors.push(ErrorDialog {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn set_devices(&mut self, devices: &[String]) {
        self.devices = devices.to_vec();
    }

    fn set_readout(&mut self, readout: &Readout) {
        self.readout = readout.clone();
    }

    fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }
}
