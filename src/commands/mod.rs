//! Command handling for Loupedeck operations.
//!
//! Every outbound command carries a one-byte transaction id; the device
//! echoes the id in its reply. [`TransactionTable`] owns the id sequence
//! and the pending-response slots, and [`CommandHandler`] builds frames,
//! hands them to the transport, and awaits correlated replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{Mutex, oneshot};

use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher};
use crate::protocol::{Haptic, MAX_BRIGHTNESS, Opcode, encode_command};
use crate::transport::Transport;
use crate::types::{Button, Screen};

/// Default command timeout.
///
/// The vendor protocol has no notion of a response deadline; a command
/// the device never answers would block its caller forever. Bounding the
/// wait is a deliberate behavioral change, see DESIGN.md.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct TableState {
    last_id: u8,
    pending: HashMap<u8, oneshot::Sender<Bytes>>,
}

/// Correlates outbound commands with their asynchronous responses.
///
/// Ids run 1..=255; zero is reserved and skipped. Each id holds at most
/// one pending slot, resolved exactly once and removed immediately.
#[derive(Debug, Default)]
pub struct TransactionTable {
    state: StdMutex<TableState>,
}

impl TransactionTable {
    /// Creates an empty table. The first allocated id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(state: &mut TableState) -> u8 {
        state.last_id = state.last_id.wrapping_add(1);
        if state.last_id == 0 {
            state.last_id = 1;
        }
        state.last_id
    }

    /// Allocates the next transaction id without registering a slot.
    pub fn next_id(&self) -> u8 {
        Self::advance(&mut self.lock())
    }

    /// Allocates the next id and registers a pending slot under it.
    ///
    /// If the id wrapped around onto a slot that was never resolved, the
    /// stale slot is dropped (its waiter observes a closed channel).
    pub fn begin(&self) -> (u8, oneshot::Receiver<Bytes>) {
        let mut state = self.lock();
        let id = Self::advance(&mut state);
        let (tx, rx) = oneshot::channel();
        if state.pending.insert(id, tx).is_some() {
            tracing::warn!("transaction id {id} wrapped onto an unresolved slot");
        }
        (id, rx)
    }

    /// Resolves a pending slot with the response payload.
    ///
    /// Returns true if a waiter existed and received the payload. The slot
    /// is removed either way.
    pub fn resolve(&self, id: u8, payload: Bytes) -> bool {
        let sender = self.lock().pending.remove(&id);
        match sender {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Removes a slot without resolving it (timeout or failed send).
    pub fn cancel(&self, id: u8) {
        self.lock().pending.remove(&id);
    }

    /// Drops all pending slots; their waiters observe a closed channel.
    ///
    /// Used on disconnect so in-flight commands fail fast instead of
    /// running out their timeout.
    pub fn clear(&self) {
        self.lock().pending.clear();
    }

    /// Number of unresolved slots.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Command handler for Loupedeck operations.
pub struct CommandHandler<T> {
    transport: Arc<Mutex<T>>,
    dispatcher: EventDispatcher,
    transactions: Arc<TransactionTable>,
    link_fault: Arc<AtomicBool>,
    timeout: Duration,
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(
        transport: Arc<Mutex<T>>,
        dispatcher: EventDispatcher,
        transactions: Arc<TransactionTable>,
        link_fault: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            transactions,
            link_fault,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the command timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Hands one framed command to the transport.
    ///
    /// A write failure closes the transport and raises a single
    /// disconnect event for the session.
    async fn send_frame(&self, frame: Bytes) -> Result<()> {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.send(frame).await {
            if matches!(e, Error::NotConnected) {
                return Err(e);
            }
            tracing::error!("write failed: {}", e);
            let _ = transport.disconnect().await;
            drop(transport);
            self.transactions.clear();
            if !self.link_fault.swap(true, Ordering::SeqCst) {
                self.dispatcher.dispatch(Event::Disconnected {
                    error: Some(e.to_string()),
                });
            }
            return Err(e);
        }
        Ok(())
    }

    /// Sends a command and waits for the correlated response payload.
    ///
    /// The pending slot is removed exactly once: by the frame-processing
    /// task on resolution, or here on timeout or send failure.
    pub async fn send_and_wait(&self, opcode: Opcode, payload: &[u8]) -> Result<Bytes> {
        let (id, rx) = self.transactions.begin();
        let frame = encode_command(opcode, id, payload);

        if let Err(e) = self.send_frame(frame).await {
            self.transactions.cancel(id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                self.transactions.cancel(id);
                Err(Error::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Sends a command without waiting for a response.
    ///
    /// The frame still consumes a transaction id so the sequence stays
    /// monotonic across both send styles.
    pub async fn send_fire_and_forget(&self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        let id = self.transactions.next_id();
        self.send_frame(encode_command(opcode, id, payload)).await
    }

    // ==================== Device Commands ====================

    /// Reads the device serial number.
    pub async fn get_serial(&self) -> Result<String> {
        let payload = self.send_and_wait(Opcode::Serial, &[]).await?;
        Ok(String::from_utf8_lossy(&payload)
            .trim_matches(char::from(0))
            .trim()
            .to_owned())
    }

    /// Reads the firmware version as a dotted string.
    pub async fn get_version(&self) -> Result<String> {
        let payload = self.send_and_wait(Opcode::Version, &[]).await?;
        if payload.len() < 3 {
            return Err(Error::Protocol {
                message: format!("version response too short: {} bytes", payload.len()),
            });
        }
        Ok(format!("{}.{}.{}", payload[0], payload[1], payload[2]))
    }

    /// Sets display backlight brightness as a device level.
    pub async fn set_brightness_level(&self, level: u8) -> Result<()> {
        let level = level.min(MAX_BRIGHTNESS);
        self.send_fire_and_forget(Opcode::SetBrightness, &[level])
            .await
    }

    /// Sets a button backlight color.
    pub async fn set_button_color(&self, button: Button, red: u8, green: u8, blue: u8) -> Result<()> {
        self.send_fire_and_forget(Opcode::SetColor, &[button as u8, red, green, blue])
            .await
    }

    /// Plays a haptic pattern.
    pub async fn vibrate(&self, pattern: Haptic) -> Result<()> {
        self.send_fire_and_forget(Opcode::SetVibration, &[pattern as u8])
            .await
    }

    /// Resets the device to its power-on state.
    pub async fn reset(&self) -> Result<()> {
        self.send_fire_and_forget(Opcode::Reset, &[0x00]).await
    }

    /// Writes a pixel region into a display framebuffer.
    ///
    /// The payload is the surface wire id, an 8-byte big-endian header
    /// `[x, y, width, height]`, and the RGB565-LE pixels. The device
    /// acknowledges the write; the ack payload is empty.
    pub async fn write_framebuffer(
        &self,
        screen: Screen,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u8],
    ) -> Result<()> {
        let mut buf = BytesMut::with_capacity(10 + pixels.len());
        buf.put_slice(&screen.wire_id());
        buf.put_u16(x);
        buf.put_u16(y);
        buf.put_u16(width);
        buf.put_u16(height);
        buf.put_slice(pixels);
        self.send_and_wait(Opcode::WriteFramebuffer, &buf).await?;
        Ok(())
    }

    /// Refreshes a display from its framebuffer.
    pub async fn refresh(&self, screen: Screen) -> Result<()> {
        self.send_and_wait(Opcode::Draw, &screen.wire_id()).await?;
        Ok(())
    }
}
