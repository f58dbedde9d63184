use std::time::Instant;

use anyhow::Result;

use clap::Parser;
use colored::{Colorize, ColoredString};
use daikin_s21::{config::Port, protocol::{codec::{hex_repr, str_repr, Frame, RxFrame}, responses::Response}};
use futures::StreamExt;
use url::Url;


/// Prints everything seen on an S21 line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// either serial:///device/path or tcp+raw://host:port URLs supported
    port: Url,

    /// Also print the raw bytes of each frame
    #[arg(long)]
    hex: bool,
}


fn frame_desc(frame: &Frame) -> String {
    let kind = match frame.header().map(|h| h[0]) {
        Some(b'F' | b'R') => "Query".to_string(),
        Some(b'D') => "Write".to_string(),
        Some(b'G' | b'S') => match Response::try_from(frame) {
            Ok(response) => format!("{response:?}"),
            Err(err) => format!("{err}"),
        },
        _ => "Unknown".to_string(),
    };

    format!("{: <8} {kind}", str_repr(frame.payload()))
}

fn coloured(frame: &RxFrame, line: String) -> ColoredString {
    match frame {
        RxFrame::Ack => line.cyan(),
        RxFrame::Nak => line.on_red().bright_white(),
        RxFrame::Frame(frame) => match frame.header().map(|h| h[0]) {
            Some(b'F' | b'R') => line.on_green().bright_white(),
            Some(b'G' | b'S') => line.on_bright_green().bright_white(),
            Some(b'D') => line.on_purple().bright_white(),
            _ => line.on_black(),
        },
        RxFrame::Corrupted(_) => line.red(),
        RxFrame::Unexpected(_) => line.yellow(),
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut framed = Port::open(&args.port).await?.framed();

    let start_time = Instant::now();
    let mut last_frame_time: Option<Instant> = None;

    while let Some(Ok(frame)) = framed.next().await {
        let now = Instant::now();
        let start_delta_ms = now.duration_since(start_time).as_millis();
        let last_frame_delta_ms = last_frame_time.map_or(0, |last| now.duration_since(last).as_millis());

        let desc = match &frame {
            RxFrame::Ack => "ACK".to_string(),
            RxFrame::Nak => "NAK".to_string(),
            RxFrame::Frame(frame) if args.hex => format!("{} [{}]", frame_desc(frame), hex_repr(&frame.to_wire())),
            RxFrame::Frame(frame) => frame_desc(frame),
            RxFrame::Corrupted(data) => format!("corrupted frame: {}", hex_repr(data)),
            RxFrame::Unexpected(byte) => format!("stray byte {byte:#04x}"),
        };

        let line = format!("[{start_delta_ms:8}, {last_frame_delta_ms:8}] {desc}");

        println!("{}", coloured(&frame, line));

        last_frame_time = Some(now);
    }

    Ok(())
}
