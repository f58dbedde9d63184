use futures::{Stream, Sink};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_serial::{SerialStream, SerialPortBuilderExt};
use tokio_util::codec::Framed;
use tracing::info;
use url::Url;
use anyhow::{Result, Context, bail};

use crate::protocol::codec::{RxFrame, TxFrame, S21Codec};


/// S21 line speed.
pub const BAUD_RATE: u32 = 2400;


pub enum Port {
    Serial(SerialStream),
    TcpRaw(TcpStream)
}


/// A port wrapped in [S21Codec].
pub trait PortStream: Stream<Item = std::io::Result<RxFrame>> + Sink<TxFrame, Error = std::io::Error> + Send + Unpin {}

impl<T> PortStream for T
where
    T: Stream<Item = std::io::Result<RxFrame>> + Sink<TxFrame, Error = std::io::Error> + Send + Unpin,
{}

/// A port as a raw byte stream.
pub trait PortIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> PortIo for T
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{}


impl Port {
    /// Open `serial:///dev/ttyX` (2400 baud, 8E2) or `tcp+raw://host:port`.
    pub async fn open(url: &Url) -> Result<Self> {
        match url.scheme() {
            "serial" => {
                let path = url.path();

                let port = tokio_serial::new(path, BAUD_RATE)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::Even)
                    .stop_bits(tokio_serial::StopBits::Two)
                    .open_native_async()
                    .with_context(|| format!("failed to open serial port {path}"))
                    ?;

                Ok(Self::Serial(port))
            },
            "tcp+raw" => {
                let host = url.host_str()
                    .with_context(|| format!("tcp+raw requires a host to be specified in the url: {url}"))?;

                let port = url.port()
                    .with_context(|| format!("tcp+raw requires a port number to be specified in the url: {url}"))?;

                let stream = TcpStream::connect((host, port)).await
                    .with_context(|| format!("failed to open tcp+raw connection to: {url}"))?;

                stream.set_nodelay(true)?;

                Ok(Self::TcpRaw(stream))
            },
            other => {
                bail!("url scheme {other} not supported");
            }
        }
    }

    /// Wait on `addr` (host:port) for a single tcp+raw peer.
    pub async fn accept(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await
            .with_context(|| format!("failed to listen on {addr}"))?;

        info!("listening on {addr}");

        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;

        info!("connection from {peer}");

        Ok(Self::TcpRaw(stream))
    }

    pub fn io(self) -> Box<dyn PortIo> {
        match self {
            Port::Serial(port) => Box::new(port),
            Port::TcpRaw(stream) => Box::new(stream),
        }
    }

    pub fn framed(self) -> Box<dyn PortStream> {
        match self {
            Port::Serial(port) => {
                Box::new(Framed::new(port, S21Codec::new()))
            },
            Port::TcpRaw(stream) => {
                Box::new(Framed::new(stream, S21Codec::new()))
            }
        }
    }
}
