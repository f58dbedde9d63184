use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use daikin_s21::{config::{Port, PortStream}, emulator::UnitEmulator};
use futures::{SinkExt, TryStreamExt};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Emulator for a Daikin unit's S21 port
///
/// Answers the controller's queries from its own state, applies the writes
/// it receives and lets the sensor values wander.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// either serial:///device/path or tcp+raw://host:port URLs supported
    #[arg(long, conflicts_with = "listen")]
    port: Option<Url>,

    /// Address and port to listen on (host:port) for a controller
    #[arg(long)]
    listen: Option<String>,

    /// Seconds between sensor changes
    #[arg(long, default_value_t = 5)]
    drift: u64,
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = match (&args.port, &args.listen) {
        (Some(url), _) => Port::open(url).await?,
        (None, Some(addr)) => Port::accept(addr).await?,
        (None, None) => bail!("either --port or --listen is required"),
    };

    unit_emulator(port.framed(), Duration::from_secs(args.drift)).await
}


async fn unit_emulator(mut port: Box<dyn PortStream>, drift: Duration) -> Result<()> {
    info!("Starting unit emulator");

    let mut unit = UnitEmulator::new();
    let mut ticker = tokio::time::interval(drift);

    loop {
        tokio::select! {
            frame = port.try_next() => {
                let Some(frame) = frame? else {
                    // stream reached the end
                    return Ok(())
                };

                for reply in unit.handle(frame) {
                    port.feed(reply).await?;
                }
                port.flush().await?;
            },
            _ = ticker.tick() => {
                unit.drift(&mut rand::thread_rng());
            },
        }
    }
}
