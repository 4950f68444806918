//! Main [`Loupedeck`] client implementation.
//!
//! This module provides the high-level [`Loupedeck`] client that combines
//! transport, command correlation, hardware-event decoding and the draw
//! protocol into a unified interface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::commands::{CommandHandler, TransactionTable};
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::protocol::{FRAME_PAYLOAD_OFFSET, Haptic, MAX_BRIGHTNESS, Opcode, pixel};
use crate::transport::{SerialTransport, Transport, serial::SerialConfig};
use crate::types::{
    Button, DeviceInfo, Key, Knob, Screen, TouchContact, TouchTracker,
    display::{KEY_COLUMNS, KEY_ROWS, KEY_SIZE},
};

/// Default delay between reconnection attempts.
///
/// The device sits on the user's desk; when it drops off the bus it is
/// expected back, so attempts repeat at this fixed interval forever.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Capacity of the packet channel between the read loop and processing.
const PACKET_CHANNEL_CAPACITY: usize = 256;

/// Handles for the per-session background tasks.
struct SessionTasks {
    read: Option<JoinHandle<()>>,
    process: Option<JoinHandle<()>>,
}

impl SessionTasks {
    const fn empty() -> Self {
        Self {
            read: None,
            process: None,
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.read.take() {
            task.abort();
        }
        if let Some(task) = self.process.take() {
            task.abort();
        }
    }
}

/// Client for communicating with a Loupedeck device.
pub struct Loupedeck<T> {
    transport: Arc<Mutex<T>>,
    dispatcher: EventDispatcher,
    commands: CommandHandler<T>,
    transactions: Arc<TransactionTable>,
    touches: Arc<StdMutex<TouchTracker>>,

    /// Set once per session when the link fails, so exactly one
    /// disconnect notification goes out per failure.
    link_fault: Arc<AtomicBool>,
    /// Terminal flag; once set, no reconnection happens.
    closed: Arc<AtomicBool>,

    tasks: Arc<StdMutex<SessionTasks>>,
    reconnect_interval: Duration,
    supervisor: Option<JoinHandle<()>>,
}

impl Loupedeck<SerialTransport> {
    /// Creates a new client for a serial port.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyACM0")
    ///
    /// # Returns
    ///
    /// A new client (not yet connected).
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::with_serial_config(SerialConfig::new(port))
    }

    /// Creates a new client with custom serial configuration.
    #[must_use]
    pub fn with_serial_config(config: SerialConfig) -> Self {
        Self::new(SerialTransport::new(config))
    }

    /// Connects to the device.
    ///
    /// Opens the port, performs the upgrade handshake, and starts the
    /// background read loop; the call returns only once the read loop has
    /// confirmed it is running. An `Event::Connected` is dispatched on
    /// success, and the reconnect supervisor starts watching the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened, the handshake
    /// fails, or the client was already closed.
    pub async fn connect(&mut self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        Self::establish(
            &self.transport,
            &self.dispatcher,
            &self.transactions,
            &self.touches,
            &self.link_fault,
            &self.closed,
            &self.tasks,
        )
        .await?;
        self.spawn_supervisor();
        Ok(())
    }

    /// Brings up one connected session: transport connect (including the
    /// handshake), fresh per-session state, read and processing tasks.
    ///
    /// Shared by [`connect`](Self::connect) and the reconnect supervisor.
    async fn establish(
        transport: &Arc<Mutex<SerialTransport>>,
        dispatcher: &EventDispatcher,
        transactions: &Arc<TransactionTable>,
        touches: &Arc<StdMutex<TouchTracker>>,
        link_fault: &Arc<AtomicBool>,
        closed: &Arc<AtomicBool>,
        tasks: &Arc<StdMutex<SessionTasks>>,
    ) -> Result<()> {
        let reader = {
            let mut guard = transport.lock().await;
            guard.connect().await?;
            guard.take_reader().ok_or(Error::NotConnected)?
        };

        // Fresh session state.
        transactions.clear();
        touches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        link_fault.store(false, Ordering::SeqCst);

        let (packet_tx, mut packet_rx) = mpsc::channel::<Bytes>(PACKET_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let read_task = tokio::spawn({
            let transport = Arc::clone(transport);
            let dispatcher = dispatcher.clone();
            let transactions = Arc::clone(transactions);
            let link_fault = Arc::clone(link_fault);
            let closed = Arc::clone(closed);
            async move {
                let _ = ready_tx.send(());
                if let Err(e) =
                    SerialTransport::run_read_loop_with_reader(reader, packet_tx).await
                {
                    if closed.load(Ordering::SeqCst) {
                        return;
                    }
                    // Close before notifying, so observers never see a
                    // half-open handle.
                    let _ = transport.lock().await.disconnect().await;
                    transactions.clear();
                    if !link_fault.swap(true, Ordering::SeqCst) {
                        dispatcher.dispatch(Event::Disconnected {
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        });

        let process_task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let transactions = Arc::clone(transactions);
            let touches = Arc::clone(touches);
            async move {
                while let Some(packet) = packet_rx.recv().await {
                    process_frame(&packet, &dispatcher, &transactions, &touches);
                }
            }
        });

        // The session counts as up only once the read loop is running.
        ready_rx.await.map_err(|_| Error::ChannelClosed)?;

        {
            let mut guard = tasks.lock().unwrap_or_else(PoisonError::into_inner);
            guard.abort();
            guard.read = Some(read_task);
            guard.process = Some(process_task);
        }

        dispatcher.dispatch(Event::Connected);
        Ok(())
    }

    /// Starts the reconnect supervisor if it is not already running.
    ///
    /// One task watches for unexpected disconnects and serially retries
    /// the connect sequence at a fixed interval, forever, until the
    /// client is closed. Attempts cannot overlap and no lock is held
    /// across the retry sleep.
    fn spawn_supervisor(&mut self) {
        if self.supervisor.is_some() {
            return;
        }
        let mut events = self.dispatcher.subscribe();
        let transport = Arc::clone(&self.transport);
        let dispatcher = self.dispatcher.clone();
        let transactions = Arc::clone(&self.transactions);
        let touches = Arc::clone(&self.touches);
        let link_fault = Arc::clone(&self.link_fault);
        let closed = Arc::clone(&self.closed);
        let tasks = Arc::clone(&self.tasks);
        let interval = self.reconnect_interval;

        self.supervisor = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Event::Disconnected { error: Some(cause) } = event else {
                    continue;
                };
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                tracing::warn!(
                    "connection lost ({cause}); retrying every {}ms",
                    interval.as_millis()
                );
                loop {
                    tokio::time::sleep(interval).await;
                    if closed.load(Ordering::SeqCst) {
                        return;
                    }
                    // Tear the dead session down before reopening the port.
                    tasks.lock().unwrap_or_else(PoisonError::into_inner).abort();
                    let _ = transport.lock().await.disconnect().await;
                    match Self::establish(
                        &transport,
                        &dispatcher,
                        &transactions,
                        &touches,
                        &link_fault,
                        &closed,
                        &tasks,
                    )
                    .await
                    {
                        Ok(()) => {
                            tracing::info!("reconnected");
                            break;
                        }
                        Err(e) => tracing::debug!("reconnect attempt failed: {}", e),
                    }
                }
            }
        }));
    }
}

impl<T: Transport + 'static> Loupedeck<T> {
    /// Creates a new client with the given transport.
    fn new(transport: T) -> Self {
        let dispatcher = EventDispatcher::new(256);
        let transport = Arc::new(Mutex::new(transport));
        let transactions = Arc::new(TransactionTable::new());
        let link_fault = Arc::new(AtomicBool::new(false));

        let commands = CommandHandler::new(
            Arc::clone(&transport),
            dispatcher.clone(),
            Arc::clone(&transactions),
            Arc::clone(&link_fault),
        );

        Self {
            transport,
            dispatcher,
            commands,
            transactions,
            touches: Arc::new(StdMutex::new(TouchTracker::new())),
            link_fault,
            closed: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(StdMutex::new(SessionTasks::empty())),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            supervisor: None,
        }
    }

    /// Closes the client.
    ///
    /// Terminal and idempotent: background tasks stop, the port closes,
    /// and a final `Event::Disconnected { error: None }` is dispatched.
    /// No reconnection happens afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort();
        {
            let mut transport = self.transport.lock().await;
            transport.disconnect().await?;
        }
        self.transactions.clear();
        self.touches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.dispatcher.dispatch(Event::Disconnected { error: None });
        Ok(())
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Snapshot of the contacts currently on the glass, ordered by id.
    #[must_use]
    pub fn touches(&self) -> Vec<TouchContact> {
        self.touches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active()
    }

    /// Returns the command handler for direct command access.
    #[must_use]
    pub const fn commands(&self) -> &CommandHandler<T> {
        &self.commands
    }

    /// Sets the response timeout for commands that wait for a reply.
    pub fn set_command_timeout(&mut self, timeout: Duration) {
        self.commands.set_timeout(timeout);
    }

    /// Sets the reconnect interval. Takes effect from the next connect.
    pub fn set_reconnect_interval(&mut self, interval: Duration) {
        self.reconnect_interval = interval;
    }

    // ==================== High-Level Device Methods ====================

    /// Queries the device serial number and firmware version.
    ///
    /// Fails immediately when not connected.
    pub async fn get_info(&self) -> Result<DeviceInfo> {
        if !self.is_connected().await {
            return Err(Error::NotConnected);
        }
        let serial = self.commands.get_serial().await?;
        let version = self.commands.get_version().await?;
        Ok(DeviceInfo { serial, version })
    }

    /// Sets display brightness from a 0.0..=1.0 fraction.
    ///
    /// The fraction is scaled to the device's 0..=10 range by rounding
    /// and clamped.
    pub async fn set_brightness(&self, fraction: f64) -> Result<()> {
        let max = f64::from(MAX_BRIGHTNESS);
        let level = (fraction * max).round().clamp(0.0, max) as u8;
        self.commands.set_brightness_level(level).await
    }

    /// Sets a button backlight color.
    pub async fn set_button_color(&self, button: Button, red: u8, green: u8, blue: u8) -> Result<()> {
        self.commands.set_button_color(button, red, green, blue).await
    }

    /// Plays a haptic pattern.
    pub async fn vibrate(&self, pattern: Haptic) -> Result<()> {
        self.commands.vibrate(pattern).await
    }

    /// Resets the device to its power-on state.
    pub async fn reset(&self) -> Result<()> {
        self.commands.reset().await
    }

    // ==================== Draw Methods ====================

    /// Draws an RGB565-LE pixel buffer into a region of a display.
    ///
    /// A `width` or `height` of zero defaults to the full surface
    /// dimension. The buffer must hold exactly `width * height` 16-bit
    /// pixels; a mismatch fails before anything is sent. With
    /// `auto_refresh` the surface is refreshed immediately after the
    /// write.
    pub async fn draw_buffer(
        &self,
        screen: Screen,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u8],
        auto_refresh: bool,
    ) -> Result<()> {
        let descriptor = screen.descriptor();
        let width = if width == 0 { descriptor.width } else { width };
        let height = if height == 0 { descriptor.height } else { height };

        let expected = usize::from(width) * usize::from(height) * pixel::BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(Error::PixelCount {
                expected,
                got: pixels.len(),
            });
        }

        self.commands
            .write_framebuffer(screen, x, y, width, height, pixels)
            .await?;
        if auto_refresh {
            self.commands.refresh(screen).await?;
        }
        Ok(())
    }

    /// Draws a full surface and refreshes it.
    pub async fn draw_screen(&self, screen: Screen, pixels: &[u8]) -> Result<()> {
        self.draw_buffer(screen, 0, 0, 0, 0, pixels, true).await
    }

    /// Draws one 90×90 tile of the center key grid and refreshes it.
    ///
    /// `index` is row-major, 0..=11.
    pub async fn draw_key(&self, index: u8, pixels: &[u8]) -> Result<()> {
        if u16::from(index) >= KEY_COLUMNS * KEY_ROWS {
            return Err(Error::Protocol {
                message: format!("key index {index} out of range"),
            });
        }
        let x = u16::from(index) % KEY_COLUMNS * KEY_SIZE;
        let y = u16::from(index) / KEY_COLUMNS * KEY_SIZE;
        self.draw_buffer(Screen::Center, x, y, KEY_SIZE, KEY_SIZE, pixels, true)
            .await
    }
}

/// Decodes one application frame and dispatches the appropriate event.
///
/// Hardware reports become events; command responses resolve their
/// pending transaction. Both go through this single path, so a response
/// that is also a report (none today) would do both.
fn process_frame(
    frame: &Bytes,
    dispatcher: &EventDispatcher,
    transactions: &TransactionTable,
    touches: &StdMutex<TouchTracker>,
) {
    if frame.len() < FRAME_PAYLOAD_OFFSET {
        tracing::trace!("short frame: {} bytes", frame.len());
        return;
    }
    let opcode_byte = frame[1];
    let transaction_id = frame[2];
    let data = frame.slice(FRAME_PAYLOAD_OFFSET..);

    tracing::trace!(
        "processing opcode 0x{opcode_byte:02x}, {} data bytes",
        data.len()
    );

    match Opcode::from_byte(opcode_byte) {
        Some(Opcode::ButtonPress) => {
            if data.len() >= 2 {
                match Key::from_byte(data[0]) {
                    Some(key) => dispatcher.dispatch(Event::Button {
                        key,
                        pressed: data[1] == 0,
                    }),
                    None => tracing::trace!("unknown key code 0x{:02x}", data[0]),
                }
            }
        }
        Some(Opcode::KnobRotate) => {
            if data.len() >= 2 {
                match Knob::from_byte(data[0]) {
                    Some(knob) => dispatcher.dispatch(Event::Rotate {
                        knob,
                        delta: i8::from_le_bytes([data[1]]),
                    }),
                    None => tracing::trace!("rotation from unknown code 0x{:02x}", data[0]),
                }
            }
        }
        Some(opcode @ (Opcode::Touch | Opcode::TouchEnd)) => {
            // [reserved:1] [x:2 BE] [y:2 BE] [touch id:1]
            if data.len() >= 6 {
                let x = u16::from_be_bytes([data[1], data[2]]);
                let y = u16::from_be_bytes([data[3], data[4]]);
                let contact = TouchContact::new(data[5], x, y);
                let ended = opcode == Opcode::TouchEnd;
                let (kind, snapshot) = {
                    let mut tracker = touches.lock().unwrap_or_else(PoisonError::into_inner);
                    let kind = tracker.track(ended, contact);
                    (kind, tracker.active())
                };
                dispatcher.dispatch(Event::Touch {
                    kind,
                    touches: snapshot,
                    changed: contact,
                });
            }
        }
        // Serial/version replies carry no event of their own; they only
        // surface through the pending table below. Unknown opcodes are
        // dropped.
        _ => {}
    }

    if transaction_id != 0 {
        transactions.resolve(transaction_id, data);
    }
}

impl<T> Drop for Loupedeck<T> {
    fn drop(&mut self) {
        // Abort background tasks
        if let Some(task) = self.supervisor.take() {
            task.abort();
        }
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TouchKind;
    use std::future::Future;
    use std::pin::Pin;

    struct MockTransport {
        connected: bool,
        sent: Arc<StdMutex<Vec<Bytes>>>,
    }

    impl MockTransport {
        fn mock() -> (Self, Arc<StdMutex<Vec<Bytes>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    connected: true,
                    sent: Arc::clone(&sent),
                },
                sent,
            )
        }
    }

    impl Transport for MockTransport {
        fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.connected = true;
                Ok(())
            })
        }

        fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.connected = false;
                Ok(())
            })
        }

        fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.sent
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(data);
                Ok(())
            })
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn frame(opcode: Opcode, transaction_id: u8, data: &[u8]) -> Bytes {
        let mut v = vec![(3 + data.len()).min(255) as u8, opcode as u8, transaction_id];
        v.extend_from_slice(data);
        Bytes::from(v)
    }

    fn harness() -> (EventDispatcher, Arc<TransactionTable>, StdMutex<TouchTracker>) {
        (
            EventDispatcher::new(64),
            Arc::new(TransactionTable::new()),
            StdMutex::new(TouchTracker::new()),
        )
    }

    #[tokio::test]
    async fn test_button_press_event() {
        let (dispatcher, transactions, touches) = harness();
        let mut events = dispatcher.subscribe();

        process_frame(
            &frame(Opcode::ButtonPress, 0, &[0x07, 0x00]),
            &dispatcher,
            &transactions,
            &touches,
        );

        match events.recv().await {
            Some(Event::Button { key, pressed }) => {
                assert_eq!(key, Key::Button(Button::Home));
                assert!(pressed);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_key_code_dropped() {
        let (dispatcher, transactions, touches) = harness();
        let mut events = dispatcher.subscribe();

        process_frame(
            &frame(Opcode::ButtonPress, 0, &[0x55, 0x00]),
            &dispatcher,
            &transactions,
            &touches,
        );

        let got = tokio::time::timeout(Duration::from_millis(20), events.recv()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn test_knob_rotate_negative_delta() {
        let (dispatcher, transactions, touches) = harness();
        let mut events = dispatcher.subscribe();

        process_frame(
            &frame(Opcode::KnobRotate, 0, &[0x01, 0xFF]),
            &dispatcher,
            &transactions,
            &touches,
        );

        match events.recv().await {
            Some(Event::Rotate { knob, delta }) => {
                assert_eq!(knob, Knob::TopLeft);
                assert_eq!(delta, -1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_touch_lifecycle_through_frames() {
        let (dispatcher, transactions, touches) = harness();
        let mut events = dispatcher.subscribe();

        // Move-form report for an unseen id: still a Start.
        process_frame(
            &frame(Opcode::Touch, 0, &[0, 0, 100, 0, 50, 3]),
            &dispatcher,
            &transactions,
            &touches,
        );
        match events.recv().await {
            Some(Event::Touch { kind, touches, changed }) => {
                assert_eq!(kind, TouchKind::Start);
                assert_eq!(changed.id, 3);
                assert_eq!(changed.x, 100);
                assert_eq!(changed.y, 50);
                assert_eq!(touches.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Same id again: a Move.
        process_frame(
            &frame(Opcode::Touch, 0, &[0, 0, 110, 0, 50, 3]),
            &dispatcher,
            &transactions,
            &touches,
        );
        assert!(matches!(
            events.recv().await,
            Some(Event::Touch { kind: TouchKind::Move, .. })
        ));

        // End removes it from the active set.
        process_frame(
            &frame(Opcode::TouchEnd, 0, &[0, 0, 110, 0, 50, 3]),
            &dispatcher,
            &transactions,
            &touches,
        );
        match events.recv().await {
            Some(Event::Touch { kind, touches, .. }) => {
                assert_eq!(kind, TouchKind::End);
                assert!(touches.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_response_resolves_pending_transaction() {
        let (dispatcher, transactions, touches) = harness();

        let (id, mut rx) = transactions.begin();
        process_frame(
            &frame(Opcode::Serial, id, b"LDD123"),
            &dispatcher,
            &transactions,
            &touches,
        );

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"LDD123"));
        assert_eq!(transactions.pending(), 0);
    }

    #[tokio::test]
    async fn test_draw_buffer_validates_before_sending() {
        let (transport, sent) = MockTransport::mock();
        let client = Loupedeck::new(transport);

        let result = client
            .draw_buffer(Screen::Center, 0, 0, 2, 2, &[0u8; 7], false)
            .await;
        assert!(matches!(
            result,
            Err(Error::PixelCount { expected: 8, got: 7 })
        ));
        assert!(sent.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
    }

    #[tokio::test]
    async fn test_draw_buffer_defaults_dimensions() {
        let (transport, sent) = MockTransport::mock();
        let client = Loupedeck::new(transport);

        // Wrong length against the full left strip (60x270).
        let result = client
            .draw_buffer(Screen::Left, 0, 0, 0, 0, &[0u8; 10], false)
            .await;
        assert!(matches!(
            result,
            Err(Error::PixelCount { expected, .. }) if expected == 60 * 270 * 2
        ));
        assert!(sent.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
    }

    #[tokio::test]
    async fn test_draw_key_sends_framebuffer_then_refresh() {
        let (transport, sent) = MockTransport::mock();
        let mut client = Loupedeck::new(transport);
        client.set_command_timeout(Duration::from_secs(1));

        let transactions = Arc::clone(&client.transactions);
        tokio::spawn(async move {
            for id in 1..=2 {
                while !transactions.resolve(id, Bytes::new()) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        });

        let pixels = vec![0u8; usize::from(KEY_SIZE) * usize::from(KEY_SIZE) * 2];
        client.draw_key(5, &pixels).await.unwrap();

        let sent = sent.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(sent.len(), 2);
        // Framebuffer write targets tile 5: column 1, row 1 → (90, 90).
        assert_eq!(sent[0][1], Opcode::WriteFramebuffer as u8);
        assert_eq!(&sent[0][5..13], &[0, 90, 0, 90, 0, 90, 0, 90]);
        // Refresh carries the surface id.
        assert_eq!(sent[1][1], Opcode::Draw as u8);
        assert_eq!(&sent[1][3..5], &[0x00, b'A']);
    }

    #[tokio::test]
    async fn test_draw_key_rejects_bad_index() {
        let (transport, sent) = MockTransport::mock();
        let client = Loupedeck::new(transport);

        let pixels = vec![0u8; usize::from(KEY_SIZE) * usize::from(KEY_SIZE) * 2];
        assert!(client.draw_key(12, &pixels).await.is_err());
        assert!(sent.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
    }

    #[tokio::test]
    async fn test_get_info_composes_serial_and_version() {
        let (transport, _) = MockTransport::mock();
        let client = Loupedeck::new(transport);

        let transactions = Arc::clone(&client.transactions);
        tokio::spawn(async move {
            while !transactions.resolve(1, Bytes::from_static(b"LDD2101013000396\0")) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            while !transactions.resolve(2, Bytes::from_static(&[0, 2, 5])) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let info = client.get_info().await.unwrap();
        assert_eq!(info.serial, "LDD2101013000396");
        assert_eq!(info.version, "0.2.5");
    }

    #[tokio::test]
    async fn test_brightness_fraction_scaling() {
        let (transport, sent) = MockTransport::mock();
        let client = Loupedeck::new(transport);

        client.set_brightness(0.5).await.unwrap();
        client.set_brightness(1.0).await.unwrap();
        client.set_brightness(-3.0).await.unwrap();
        client.set_brightness(9.9).await.unwrap();

        let sent = sent.lock().unwrap_or_else(PoisonError::into_inner);
        let levels: Vec<u8> = sent.iter().map(|f| f[3]).collect();
        assert_eq!(levels, vec![5, 10, 0, 10]);
    }

    #[tokio::test]
    async fn test_set_button_color_frame() {
        let (transport, sent) = MockTransport::mock();
        let client = Loupedeck::new(transport);

        client
            .set_button_color(Button::Action3, 0x11, 0x22, 0x33)
            .await
            .unwrap();

        let sent = sent.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(&sent[0][..], &[0x07, 0x02, 0x01, 0x0A, 0x11, 0x22, 0x33]);
    }

    #[tokio::test]
    async fn test_get_info_requires_connection() {
        let (mut transport, _) = MockTransport::mock();
        transport.connected = false;
        let client = Loupedeck::new(transport);

        assert!(matches!(client.get_info().await, Err(Error::NotConnected)));
    }
}
