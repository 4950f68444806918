//! Serial/USB transport implementation.
//!
//! The device presents a CDC serial port but will not speak its framed
//! protocol until the client completes an HTTP-upgrade-style handshake,
//! a leftover of the vendor's websocket-over-serial design.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

use crate::error::{Error, Result};
use crate::protocol::{PacketFramer, encode_frame};
use crate::transport::Transport;

/// Default baud rate. The port is CDC so the rate is nominal, but this is
/// what the vendor software configures.
pub const DEFAULT_BAUD_RATE: u32 = 256_000;

/// Default time allowed for the device to answer the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Literal upgrade request the device expects before framed traffic.
const HANDSHAKE_REQUEST: &[u8] = b"GET /index.html\n\
HTTP/1.1\n\
Connection: Upgrade\n\
Upgrade: websocket\n\
Sec-WebSocket-Key: 123abc\n\n";

/// Required prefix of the device's handshake response.
const HANDSHAKE_RESPONSE_PREFIX: &[u8] = b"HTTP/1.1 101";

/// Upper bound on handshake response accumulation.
const HANDSHAKE_RESPONSE_MAX: usize = 1024;

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyACM0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Time allowed for the handshake response.
    pub handshake_timeout: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Serial transport for Loupedeck communication.
///
/// Uses split read/write halves so sending and the background read loop
/// never contend on one handle.
pub struct SerialTransport {
    config: SerialConfig,
    writer: Option<Arc<Mutex<WriteHalf<SerialStream>>>>,
    reader: Option<ReadHalf<SerialStream>>,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            writer: None,
            reader: None,
        }
    }

    /// Creates a new serial transport for the given port with default
    /// settings.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Takes the reader half for use in a background task.
    ///
    /// This can only be called once after connecting.
    pub fn take_reader(&mut self) -> Option<ReadHalf<SerialStream>> {
        self.reader.take()
    }

    /// Runs the read loop with a given reader, feeding the framer and
    /// forwarding each completed packet.
    ///
    /// This should be spawned as a separate task. Returns `Ok(())` only
    /// when the packet receiver is dropped; any read failure or EOF is
    /// the error cause the caller reports in its disconnect notification.
    ///
    /// # Errors
    ///
    /// Returns an error when the port read fails or reaches EOF.
    pub async fn run_read_loop_with_reader(
        mut reader: ReadHalf<SerialStream>,
        packet_tx: mpsc::Sender<Bytes>,
    ) -> Result<()> {
        let mut framer = PacketFramer::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("serial port closed");
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "serial port closed",
                    )));
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("serial read error: {}", e);
                    return Err(Error::Io(e));
                }
            };

            tracing::trace!("received {} bytes", n);
            framer.feed(&buf[..n]);

            // Drain all packets completed by this read.
            loop {
                match framer.next_packet() {
                    Ok(Some(packet)) => {
                        tracing::trace!("framed packet: {} bytes", packet.len());
                        if packet_tx.send(packet).await.is_err() {
                            tracing::debug!("packet receiver dropped");
                            return Ok(());
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // The framer already resynchronized past the bad header.
                        tracing::warn!("framing error: {}", e);
                    }
                }
            }
        }
    }

    /// Performs the upgrade handshake on a freshly opened stream.
    async fn perform_handshake(stream: &mut SerialStream, timeout: Duration) -> Result<()> {
        stream.write_all(HANDSHAKE_REQUEST).await.map_err(Error::Io)?;
        stream.flush().await.map_err(Error::Io)?;

        // Some units only answer after a control-line transition.
        if let Err(e) = stream.write_request_to_send(true) {
            tracing::warn!("failed to raise RTS: {}", e);
        }
        if let Err(e) = stream.write_request_to_send(false) {
            tracing::warn!("failed to drop RTS: {}", e);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut response = Vec::new();
        let mut buf = [0u8; 256];

        while !handshake_response_complete(&response) {
            let Some(remaining) =
                deadline.checked_duration_since(tokio::time::Instant::now())
            else {
                return Err(Error::Handshake {
                    message: "timed out waiting for upgrade response".into(),
                });
            };
            let read = tokio::time::timeout(remaining, stream.read(&mut buf))
                .await
                .map_err(|_| Error::Handshake {
                    message: "timed out waiting for upgrade response".into(),
                })?;
            match read {
                Ok(0) => {
                    return Err(Error::Handshake {
                        message: "port closed during handshake".into(),
                    });
                }
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(e) => return Err(Error::Io(e)),
            }
            if response.len() > HANDSHAKE_RESPONSE_MAX {
                break;
            }
        }

        if upgrade_accepted(&response) {
            Ok(())
        } else {
            let line = response
                .split(|&b| b == b'\n')
                .next()
                .unwrap_or(&response[..]);
            Err(Error::Handshake {
                message: format!(
                    "unexpected upgrade response: {:?}",
                    String::from_utf8_lossy(line)
                ),
            })
        }
    }
}

/// True once the response holds its terminating blank line.
fn handshake_response_complete(response: &[u8]) -> bool {
    response.windows(2).any(|w| w == b"\n\n")
        || response.windows(4).any(|w| w == b"\r\n\r\n")
}

/// True if the device accepted the upgrade.
fn upgrade_accepted(response: &[u8]) -> bool {
    response.starts_with(HANDSHAKE_RESPONSE_PREFIX)
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.writer.is_some() {
                return Ok(());
            }

            tracing::info!("connecting to serial port: {}", self.config.port);

            let mut stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .open_native_async()
                .map_err(Error::Serial)?;

            // The stream is dropped (and the port closed) on any handshake
            // failure, so observers never see a half-open handle.
            Self::perform_handshake(&mut stream, self.config.handshake_timeout).await?;

            let (reader, writer) = tokio::io::split(stream);
            self.reader = Some(reader);
            self.writer = Some(Arc::new(Mutex::new(writer)));

            tracing::info!("handshake complete on {}", self.config.port);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.writer.is_some() || self.reader.is_some() {
                tracing::info!("disconnecting from serial port");
                self.writer = None;
                self.reader = None;
            }
            Ok(())
        })
    }

    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let writer = self.writer.clone();
        Box::pin(async move {
            let writer = writer.ok_or(Error::NotConnected)?;
            let mut writer = writer.lock().await;

            // Header and payload go out as one buffer under the lock, so
            // concurrent sends cannot interleave on the wire.
            let frame = encode_frame(&data);
            tracing::trace!("sending frame: {} bytes", frame.len());

            writer.write_all(&frame).await.map_err(Error::Io)?;
            writer.flush().await.map_err(Error::Io)?;

            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
