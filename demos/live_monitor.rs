// Live monitor against the simulated data server
//
// Runs the same connect / start / tick / stop sequence a window would, and
// prints the four readouts to the terminal on every render tick.

use clap::{Parser, ValueEnum};
use lockin_monitor::simulated::{ApiLevel, SampleShape};
use lockin_monitor::{
    IntervalTicker, LiveMonitor, MonitorSettings, SimulatedConnector, TextPanel, TickOutcome, Ticker,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Api {
    Poll,
    Sample,
    Event,
    Node,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Shape {
    Structured,
    Mapping,
    Nested,
    Scalar,
}

#[derive(Parser)]
#[command(name = "live_monitor")]
#[command(version = "1.0")]
#[command(about = "Stream demodulator samples from a simulated lock-in data server")]
struct Args {
    /// Device to stream from
    #[arg(short, long, default_value = "dev1")]
    device: String,

    /// Number of render ticks before stopping
    #[arg(short, long, default_value_t = 25)]
    ticks: u32,

    /// Read API generation the simulated server offers
    #[arg(long, value_enum, default_value_t = Api::Poll)]
    api: Api,

    /// Shape of the samples the simulated server returns
    #[arg(long, value_enum, default_value_t = Shape::Structured)]
    shape: Shape,

    /// Settings file (defaults to lockin-monitor.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Oscillator frequency in Hz, as typed into the form
    #[arg(long)]
    frequency: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    #[cfg(feature = "cpu-profiling")]
    let _client = tracy_client::Client::start();

    let settings = match &args.config {
        Some(path) => MonitorSettings::load_from(path)?,
        None => MonitorSettings::load()?,
    };

    let api = match args.api {
        Api::Poll => ApiLevel::Poll,
        Api::Sample => ApiLevel::Sample,
        Api::Event => ApiLevel::Event,
        Api::Node => ApiLevel::Node,
    };
    let shape = match args.shape {
        Shape::Structured => SampleShape::Structured,
        Shape::Mapping => SampleShape::Mapping,
        Shape::Nested => SampleShape::NestedValue,
        Shape::Scalar => SampleShape::Scalar,
    };
    let connector = SimulatedConnector::new(vec![args.device.clone(), "dev9999".to_string()])
        .with_api(api)
        .with_shape(shape);

    println!("Lock-in Live Monitor");
    println!("====================");
    println!("API: {:?}, sample shape: {:?}\n", api, shape);

    let mut monitor = LiveMonitor::new(connector, IntervalTicker::new(), TextPanel::new(), &settings);

    if !monitor.connect() {
        report_errors(&mut monitor);
        return Ok(());
    }
    println!("{}", monitor.view().status);
    println!("Devices: {}", monitor.view().devices.join(", "));

    if let Some(frequency) = args.frequency {
        monitor.form.frequency = frequency;
    }
    monitor.form.select(&args.device);

    if !monitor.start() {
        report_errors(&mut monitor);
        return Ok(());
    }
    println!("{}\n", monitor.view().status);

    let mut rendered = 0;
    while rendered < args.ticks {
        let now = Instant::now();
        match monitor.pump(now) {
            Some(TickOutcome::Rendered(_)) => {
                rendered += 1;
                print!("\r{}", monitor.view().readout);
                io::stdout().flush()?;
            }
            Some(TickOutcome::ReadFailed(_) | TickOutcome::ParseFailed(_)) => {
                eprintln!("\n{}", monitor.view().status);
            }
            Some(TickOutcome::NoData | TickOutcome::Idle) | None => {}
        }

        let wait = monitor
            .controller()
            .ticker()
            .remaining(Instant::now())
            .unwrap_or(Duration::from_millis(10));
        std::thread::sleep(wait.max(Duration::from_millis(1)));
    }

    monitor.close();
    println!("\n\n{}", monitor.view().status);
    println!("{}", monitor.view().readout);
    debug_assert!(!monitor.controller().ticker().is_active());

    Ok(())
}

fn report_errors<C, T>(monitor: &mut LiveMonitor<C, T, TextPanel>)
where
    C: lockin_monitor::Connector,
    T: Ticker,
{
    while let Some(dialog) = monitor.view_mut().acknowledge() {
        eprintln!("{}\n{}\n", dialog.title, dialog.message);
    }
}
