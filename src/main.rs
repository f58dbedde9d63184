use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use daikin_s21::config::Port;
use daikin_s21::controller::transport::BufferedTransport;
use daikin_s21::controller::Controller;
use daikin_s21::intake;
use daikin_s21::report::JsonReporter;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;


/// Polls a Daikin unit over its S21 port and accepts commands on stdin.
///
/// State changes and command results are printed to stdout as JSON lines.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// either serial:///device/path or tcp+raw://host:port URLs supported
    #[arg(env = "S21_PORT")]
    port: Url,

    /// Seconds between state updates
    #[arg(long, env = "S21_PERIOD", default_value_t = 15)]
    period: u64,

    /// Milliseconds between controller ticks
    #[arg(long, default_value_t = 5)]
    tick_ms: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn initialize_logging(&self) {
        let filter = if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };

        // stdout carries the reports
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}


type S21Controller = Controller<BufferedTransport, JsonReporter<std::io::Stdout>>;

async fn flush<W: AsyncWrite + Unpin>(controller: &mut S21Controller, port: &mut W) -> Result<()> {
    let bytes = controller.transport_mut().take_written();
    if bytes.is_empty() {
        return Ok(());
    }

    port.write_all(&bytes).await.context("failed to write to port")?;
    port.flush().await?;
    Ok(())
}


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.initialize_logging();

    let port = Port::open(&args.port).await?;
    let (mut rx, mut tx) = tokio::io::split(port.io());

    info!("Connected to {}", args.port);

    let mut controller = Controller::new(BufferedTransport::new(), JsonReporter::new(std::io::stdout()))
        .with_period(Duration::from_secs(args.period));

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut buffer = [0u8; 64];

    loop {
        tokio::select! {
            n = rx.read(&mut buffer) => {
                let n = n.context("failed to read from port")?;
                if n == 0 {
                    info!("Port closed");
                    break;
                }
                controller.transport_mut().feed(&buffer[..n]);
                controller.tick(Instant::now());
            },
            _ = ticker.tick() => {
                controller.tick(Instant::now());
            },
            line = stdin.next_line(), if stdin_open => {
                match line? {
                    Some(line) => intake::dispatch(&mut controller, &line, Instant::now()),
                    None => {
                        debug!("stdin closed, no more commands");
                        stdin_open = false;
                    },
                }
                controller.tick(Instant::now());
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            },
        }

        flush(&mut controller, &mut tx).await?;
    }

    Ok(())
}
