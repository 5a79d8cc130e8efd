use crate::channel_config::ChannelConfig;
use crate::data_server::Connector;
use crate::readout::{MonitorView, Readout};
use crate::renderer::{render_tick, TickOutcome};
use crate::session::{DeviceList, SessionError};
use crate::settings::MonitorSettings;
use crate::stream::{StreamController, StreamError};
use crate::ticker::Ticker;
use std::time::Instant;

/// Text the user has typed into the form, plus the device selection.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorForm {
    pub host: String,
    pub port: String,
    pub frequency: String,
    pub time_constant: String,
    pub sample_rate: String,
    pub devices: DeviceList,
    pub selected: usize,
}

impl MonitorForm {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port.to_string(),
            frequency: settings.channel.frequency_hz.to_string(),
            time_constant: settings.channel.time_constant_s.to_string(),
            sample_rate: settings.channel.sample_rate_hz.to_string(),
            devices: DeviceList::default(),
            selected: 0,
        }
    }

    pub fn selected_device(&self) -> &str {
        self.devices.get(self.selected).unwrap_or_default()
    }

    /// Select `device_id` if it is in the list.
    pub fn select(&mut self, device_id: &str) -> bool {
        match self.devices.entries().iter().position(|d| d == device_id) {
            Some(index) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }
}

impl Default for MonitorForm {
    fn default() -> Self {
        Self::from_settings(&MonitorSettings::default())
    }
}

/// The monitor window's behavior, independent of any widget toolkit.
/// Each `pub fn` corresponds to a button or window event.
pub struct LiveMonitor<C: Connector, T: Ticker, V: MonitorView> {
    connector: C,
    controller: StreamController<C::Server, T>,
    view: V,
    defaults: ChannelConfig,
    pub form: MonitorForm,
}

impl<C: Connector, T: Ticker, V: MonitorView> LiveMonitor<C, T, V> {
    pub fn new(connector: C, ticker: T, view: V, settings: &MonitorSettings) -> Self {
        let mut monitor = Self {
            connector,
            controller: StreamController::new(ticker, settings.policy, settings.stream.timing()),
            view,
            defaults: settings.channel,
            form: MonitorForm::from_settings(settings),
        };
        monitor.view.set_status("Disconnected");
        monitor.view.set_devices(monitor.form.devices.entries());
        monitor.view.set_readout(&Readout::unset());
        monitor.view.set_streaming(false);
        monitor
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn controller(&self) -> &StreamController<C::Server, T> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StreamController<C::Server, T> {
        &mut self.controller
    }

    pub fn connect(&mut self) -> bool {
        let host = self.form.host.trim().to_string();
        let Ok(port) = self.form.port.trim().parse::<u16>() else {
            self.view
                .show_error("Bad Port", "Port must be an integer (e.g., 8004).");
            return false;
        };

        if self.controller.is_streaming() {
            self.stop();
        }

        match self.controller.connect(&self.connector, &host, port) {
            Ok(()) => {
                self.view
                    .set_status(&format!("Connected to data server at {host}:{port}"));
                self.refresh_devices();
                true
            }
            Err(e) => {
                self.view.set_status("Disconnected");
                let detail = match &e {
                    StreamError::Session(SessionError::Connection { source, .. }) => source.to_string(),
                    other => other.to_string(),
                };
                self.view.show_error(
                    "Connection Failed",
                    &format!("Could not connect to data server at {host}:{port}\n\n{detail}"),
                );
                false
            }
        }
    }

    pub fn refresh_devices(&mut self) -> bool {
        let Some(session) = self.controller.session() else {
            self.view.show_error("Not Connected", "Click Connect first.");
            return false;
        };

        let devices = match session.visible_devices() {
            Ok(devices) => devices,
            Err(e) => {
                let detail = match &e {
                    SessionError::Query(source) => source.to_string(),
                    other => other.to_string(),
                };
                self.view.show_error(
                    "Device Query Failed",
                    &format!("Could not query visible devices.\n\n{detail}"),
                );
                return false;
            }
        };

        self.form.devices = DeviceList::new(devices);
        self.form.selected = 0;
        self.view.set_devices(self.form.devices.entries());

        match self.form.devices.device_count() {
            0 => self.view.set_status("Connected, but no devices visible."),
            n => self.view.set_status(&format!(
                "Connected. Found {n} device(s). Select one, then Start Live."
            )),
        }
        true
    }

    pub fn start(&mut self) -> bool {
        let config = ChannelConfig::from_inputs_or(
            &self.form.frequency,
            &self.form.time_constant,
            &self.form.sample_rate,
            &self.defaults,
        );
        let device_id = self.form.selected_device().trim().to_string();

        match self.controller.start(&device_id, &config) {
            Ok(active) => {
                let status = format!("Streaming from {}", active.path.trim_start_matches('/'));
                self.view.set_readout(&Readout::unset());
                self.view.set_streaming(true);
                self.view.set_status(&status);
                true
            }
            Err(e) => {
                // A failure after validation has already stopped the old stream.
                if !self.controller.is_streaming() {
                    self.view.set_streaming(false);
                    self.view.set_readout(&Readout::unset());
                }
                let (title, message) = match &e {
                    StreamError::NotConnected => (
                        "Not Connected",
                        "Connect to the data server first.".to_string(),
                    ),
                    StreamError::NoValidDevice => ("No Device", "No valid device selected.".to_string()),
                    StreamError::DeviceConnect { device, source } => (
                        "Start Failed",
                        format!("Could not connect device {device}.\n\n{source}"),
                    ),
                    other => (
                        "Start Failed",
                        format!(
                            "Could not start live stream.\n\nDevice: {device_id}\n\n{other}\n\n\
                             If you see 'in use', close other clients of this device or restart the data server."
                        ),
                    ),
                };
                self.view.show_error(title, &message);
                false
            }
        }
    }

    pub fn stop(&mut self) {
        self.controller.stop();
        self.view.set_streaming(false);
        if self.controller.session().is_some() {
            self.view.set_status("Connected (stream stopped)");
        }
        self.view.set_readout(&Readout::unset());
    }

    /// One render timer tick.
    pub fn tick(&mut self) -> TickOutcome {
        render_tick(&mut self.controller, &mut self.view)
    }

    /// Run a tick if the render timer is due. Returns `None` when it is not.
    pub fn pump(&mut self, now: Instant) -> Option<TickOutcome> {
        if self.controller.ticker_mut().due(now) {
            Some(self.tick())
        } else {
            None
        }
    }

    pub fn disconnect(&mut self) {
        if self.controller.is_streaming() {
            self.stop();
        }
        self.controller.disconnect();
        self.form.devices = DeviceList::default();
        self.form.selected = 0;
        self.view.set_devices(self.form.devices.entries());
        self.view.set_status("Disconnected");
    }

    /// Window close. Forces a stop so the device is released.
    pub fn close(&mut self) {
        if self.controller.is_streaming() {
            self.stop();
        }
    }
}
