use crate::data_server::DataServer;
use crate::readout::{MonitorView, Readout};
use crate::sample::{normalize, DemodSample};
use crate::stream::StreamController;
use crate::ticker::Ticker;

/// What a single render tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not streaming; the tick was ignored.
    Idle,
    /// Nothing new for the subscribed path.
    NoData,
    Rendered(DemodSample),
    /// Read failed; reported as status text.
    ReadFailed(String),
    /// Sample shape not understood; reported as status text.
    ParseFailed(String),
}

/// Fetch, normalize and display the latest sample. Errors never stop the
/// stream, they only show up in the status line.
pub fn render_tick<S, T, V>(controller: &mut StreamController<S, T>, view: &mut V) -> TickOutcome
where
    S: DataServer,
    T: Ticker,
    V: MonitorView + ?Sized,
{
    #[cfg(feature = "cpu-profiling")]
    let _zone = tracy_client::span!("render_tick");

    if !controller.is_streaming() {
        return TickOutcome::Idle;
    }

    let raw = match controller.fetch_latest() {
        Ok(Some(raw)) => raw,
        Ok(None) => return TickOutcome::NoData,
        Err(e) => {
            let message = e.to_string();
            log::debug!("{}", message);
            view.set_status(&message);
            return TickOutcome::ReadFailed(message);
        }
    };

    match normalize(&raw) {
        Ok(sample) => {
            view.set_readout(&Readout::from_sample(&sample));
            TickOutcome::Rendered(sample)
        }
        Err(e) => {
            let message = format!("Data parsing error: {e}");
            log::debug!("{}", message);
            view.set_status(&message);
            TickOutcome::ParseFailed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_config::{ChannelConfig, ChannelPolicy};
    use crate::data_server::{Connector, NodeValue, PollBatch, ServerError};
    use crate::readout::TextPanel;
    use crate::stream::StreamTiming;
    use crate::ticker::IntervalTicker;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Replays a fixed list of poll results, then returns empty batches.
    struct ScriptedServer {
        replies: Vec<Result<PollBatch, ServerError>>,
    }

    impl DataServer for ScriptedServer {
        fn visible_devices(&mut self) -> Result<Vec<String>, ServerError> {
            Ok(vec!["dev1".into()])
        }

        fn connect_device(&mut self, _device_id: &str) -> Result<(), ServerError> {
            Ok(())
        }

        fn set(&mut self, _path: &str, _value: NodeValue) -> Result<(), ServerError> {
            Ok(())
        }

        fn subscribe(&mut self, _path: &str) -> Result<(), ServerError> {
            Ok(())
        }

        fn poll(&mut self, _duration: Duration, _timeout: Duration) -> Result<PollBatch, ServerError> {
            if self.replies.is_empty() {
                Ok(PollBatch::new())
            } else {
                self.replies.remove(0)
            }
        }
    }

    struct ScriptedConnector(Vec<Value>);

    impl Connector for ScriptedConnector {
        type Server = ScriptedServer;

        fn open(&self, _host: &str, _port: u16) -> Result<ScriptedServer, ServerError> {
            let mut replies: Vec<Result<PollBatch, ServerError>> = self
                .0
                .iter()
                .map(|sample| {
                    let mut batch = PollBatch::new();
                    batch.insert("/dev1/demods/0/sample".into(), sample.clone());
                    Ok(batch)
                })
                .collect();
            replies.push(Err(ServerError::Timeout(Duration::from_millis(500))));
            Ok(ScriptedServer { replies })
        }
    }

    fn streaming(samples: Vec<Value>) -> StreamController<ScriptedServer, IntervalTicker> {
        let mut controller =
            StreamController::new(IntervalTicker::new(), ChannelPolicy::default(), StreamTiming::default());
        controller
            .connect(&ScriptedConnector(samples), "localhost", 8004)
            .unwrap();
        controller.start("dev1", &ChannelConfig::default()).unwrap();
        controller
    }

    #[test]
    fn test_renders_latest_sample() {
        let mut controller = streaming(vec![json!({"x": [0.5, 0.001], "y": [0.0, 0.0], "r": [0.5, 0.001], "phi": [0.0, 0.0]})]);
        let mut panel = TextPanel::new();

        assert!(matches!(render_tick(&mut controller, &mut panel), TickOutcome::Rendered(_)));
        assert_eq!(panel.readout.x, "X: +1.000000e-03");
        assert_eq!(panel.readout.phi, "phi: +0.000 rad");
    }

    #[test]
    fn test_errors_are_status_only() {
        let mut controller = streaming(vec![json!({"x": "garbage"}), json!({"x": 3.0, "y": 4.0})]);
        let mut panel = TextPanel::new();

        assert!(matches!(render_tick(&mut controller, &mut panel), TickOutcome::ParseFailed(_)));
        assert!(panel.status.starts_with("Status: Data parsing error"));
        assert!(controller.is_streaming());

        assert!(matches!(render_tick(&mut controller, &mut panel), TickOutcome::Rendered(_)));
        assert_eq!(panel.readout.r, "R: 5.000000e+00");

        assert!(matches!(render_tick(&mut controller, &mut panel), TickOutcome::ReadFailed(_)));
        assert!(panel.status.contains("Poll error"));
        assert!(controller.is_streaming());
        assert!(controller.ticker().is_active());
        assert!(panel.errors.is_empty());

        assert_eq!(render_tick(&mut controller, &mut panel), TickOutcome::NoData);
    }

    #[test]
    fn test_idle_when_stopped() {
        let mut controller = streaming(vec![json!({"x": 1.0})]);
        controller.stop();
        let mut panel = TextPanel::new();
        assert_eq!(render_tick(&mut controller, &mut panel), TickOutcome::Idle);
        assert_eq!(panel.readout, Readout::unset());
    }
}
