//! Individual Yeelight device communication and state management.
//! Handles the TCP connection, the read loop, request correlation and reconnects.

use crate::correlator::Correlator;
use crate::error::{Result, YeelightError};
use crate::protocol::{
    Command, DEFAULT_PORT, Inbound, LineBuffer, Method, Model, Notification, Property,
    decode_line, encode,
};
use crate::state::{DeviceDescriptor, PropertySet, PropertyStore};
use futures_core::stream::Stream;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

const READ_TICK: Duration = Duration::from_millis(100);
const SLEEP_RECONNECT_MIN: Duration = Duration::from_secs(1);
const SLEEP_RECONNECT_MAX: Duration = Duration::from_secs(60);
const MAX_PROPS_PER_REQUEST: usize = 20;
const READ_CHUNK: usize = 4096;
const EVENT_CAPACITY: usize = 64;

/// Something that happened on a device connection.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// `connect()` finished and the property store was seeded.
    Connected,
    /// The socket was closed, locally or by the peer.
    Disconnected,
    /// The read loop restored a dropped connection.
    Reconnected,
    /// Unsolicited state change, already merged into the property store.
    Notification(Notification),
    /// An inbound line could not be decoded; the read loop keeps going.
    Error(YeelightError),
}

/// Counters describing the health of a device connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub pending_requests: usize,
    pub unmatched_results: u64,
    pub decode_failures: u64,
    pub reconnects: u64,
}

/// Connection settings of a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub command_timeout: Duration,
    /// `None` leaves the connect timeout to the operating system.
    pub connect_timeout: Option<Duration>,
    pub reconnect: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: None,
            reconnect: false,
        }
    }
}

/// Builder for [`Device`].
pub struct DeviceBuilder {
    descriptor: DeviceDescriptor,
    config: DeviceConfig,
}

impl DeviceBuilder {
    pub fn new<H: Into<String>>(hostname: H) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(hostname, DEFAULT_PORT),
            config: DeviceConfig::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.descriptor.port = port;
        self
    }

    pub fn command_timeout(mut self, limit: Duration) -> Self {
        self.config.command_timeout = limit;
        self
    }

    pub fn connect_timeout(mut self, limit: Duration) -> Self {
        self.config.connect_timeout = Some(limit);
        self
    }

    /// Enables automatic reconnection after the connection drops.
    ///
    /// Off by default: a dropped connection stays down and later commands fail
    /// with `NotConnected` until `connect` is called again. When enabled, the
    /// read loop retries once right away and then backs off from 1 s to 60 s.
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    /// Uses a discovered descriptor (identity, supported methods and property snapshot).
    pub fn descriptor(mut self, descriptor: DeviceDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn build(self) -> Device {
        Device::with_config(self.descriptor, self.config)
    }
}

struct ConnectionTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct DeviceInner {
    descriptor: DeviceDescriptor,
    config: DeviceConfig,
    reconnect: AtomicBool,
    connected: AtomicBool,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    correlator: Correlator,
    properties: PropertyStore,
    events: broadcast::Sender<DeviceEvent>,
    task: Mutex<Option<ConnectionTask>>,
    /// Serializes `connect` and `disconnect`.
    lifecycle: tokio::sync::Mutex<()>,
    decode_failures: AtomicU64,
    reconnects: AtomicU64,
}

/// A Yeelight device reachable over the LAN control protocol.
///
/// Cloning is cheap; every clone drives the same connection. The read loop
/// runs as a background task until [`disconnect`](Self::disconnect) is called.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("hostname", &self.hostname())
            .field("port", &self.port())
            .field("connected", &self.is_connected())
            .finish()
    }
}

enum LoopEvent {
    Shutdown,
    Readable(std::io::Result<()>),
    Tick,
}

impl Device {
    // -------------------------------------------------------------------------
    // Public API
    // -------------------------------------------------------------------------

    /// Creates a device handle for `hostname:port` with default settings.
    pub fn new<H: Into<String>>(hostname: H, port: u16) -> Self {
        DeviceBuilder::new(hostname).port(port).build()
    }

    pub fn builder<H: Into<String>>(hostname: H) -> DeviceBuilder {
        DeviceBuilder::new(hostname)
    }

    fn with_config(mut descriptor: DeviceDescriptor, config: DeviceConfig) -> Self {
        let properties = PropertyStore::new();
        properties.merge(std::mem::take(&mut descriptor.properties));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(DeviceInner {
                reconnect: AtomicBool::new(config.reconnect),
                descriptor,
                config,
                connected: AtomicBool::new(false),
                writer: tokio::sync::Mutex::new(None),
                correlator: Correlator::new(),
                properties,
                events,
                task: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                decode_failures: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
            }),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.inner.descriptor.hostname
    }

    pub fn port(&self) -> u16 {
        self.inner.descriptor.port
    }

    pub fn id(&self) -> Option<&str> {
        self.inner.descriptor.id.as_deref()
    }

    pub fn model(&self) -> Model {
        self.inner.descriptor.model
    }

    pub fn supported_methods(&self) -> &[Method] {
        &self.inner.descriptor.supported_methods
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Descriptor with the current property snapshot.
    pub fn descriptor(&self) -> DeviceDescriptor {
        let mut descriptor = self.inner.descriptor.clone();
        descriptor.properties = self.inner.properties.snapshot();
        descriptor
    }

    /// Last known value of `property`.
    pub fn property(&self, property: Property) -> Option<Value> {
        self.inner.properties.get(property)
    }

    pub fn properties(&self) -> HashMap<Property, Value> {
        self.inner.properties.snapshot()
    }

    /// Checks if the device is currently connected.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Sets whether the device should automatically reconnect on failure.
    pub fn set_reconnect(&self, enabled: bool) {
        self.inner.reconnect.store(enabled, Ordering::SeqCst);
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            pending_requests: self.inner.correlator.pending_count(),
            unmatched_results: self.inner.correlator.unmatched_count(),
            decode_failures: self.inner.decode_failures.load(Ordering::Relaxed),
            reconnects: self.inner.reconnects.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Internal State Helpers
    // -------------------------------------------------------------------------

    pub(crate) fn store(&self) -> &PropertyStore {
        &self.inner.properties
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.inner.events.send(event);
    }

    fn reconnect_enabled(&self) -> bool {
        self.inner.reconnect.load(Ordering::SeqCst)
    }

    fn ensure_supported(&self, method: Method) -> Result<()> {
        if self.inner.descriptor.supports(method) {
            Ok(())
        } else {
            Err(YeelightError::UnsupportedOperation(method))
        }
    }
}

// -------------------------------------------------------------------------
// Commands
// -------------------------------------------------------------------------
impl Device {
    /// Writes raw bytes to the socket under the write lock.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(YeelightError::NotConnected)?;
        writer.write_all(bytes).await.map_err(|e| {
            debug!("Write to {} failed: {}", self.hostname(), e);
            YeelightError::from(e)
        })
    }

    /// Sends a command without waiting for its result.
    pub async fn execute(&self, method: Method, params: Vec<Value>) -> Result<()> {
        self.ensure_supported(method)?;
        let id = self.inner.correlator.next_id();
        let bytes = encode(&Command::new(id, method, params))?;
        self.log_outbound(&bytes);
        self.send(&bytes).await
    }

    /// Sends a command and waits for its result, using the configured timeout.
    pub async fn execute_with_response<T>(&self, method: Method, params: Vec<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self
            .execute_with_timeout(method, params, self.inner.config.command_timeout)
            .await?;
        serde_json::from_value(value).map_err(|e| {
            YeelightError::Decode(format!("unexpected result shape for {}: {}", method, e))
        })
    }

    /// Sends a command and waits up to `limit` for its raw result payload.
    pub async fn execute_with_timeout(
        &self,
        method: Method,
        params: Vec<Value>,
        limit: Duration,
    ) -> Result<Value> {
        self.ensure_supported(method)?;
        let correlator = &self.inner.correlator;
        let id = correlator.next_id();
        let bytes = encode(&Command::new(id, method, params))?;

        let ticket = correlator.register(id, limit);
        self.log_outbound(&bytes);
        if let Err(e) = self.send(&bytes).await {
            correlator.cancel(&ticket);
            return Err(e);
        }
        correlator.wait(ticket).await
    }

    fn log_outbound(&self, bytes: &[u8]) {
        debug!(
            "-> {}: {}",
            self.hostname(),
            String::from_utf8_lossy(bytes).trim_end()
        );
    }
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------
impl Device {
    /// Reads one property from the device.
    pub async fn get_prop(&self, property: Property) -> Result<Option<Value>> {
        let mut values = self.get_props(PropertySet::from(property)).await?;
        Ok(values.remove(&property))
    }

    /// Reads the selected properties and refreshes the store with them.
    ///
    /// Names are sent in batches of 20 per `get_prop` command. Properties the
    /// device answers with an empty string are left out of the result.
    pub async fn get_props(&self, selection: PropertySet) -> Result<HashMap<Property, Value>> {
        let requested: Vec<Property> = selection.iter().collect();
        let mut values = HashMap::new();

        for chunk in requested.chunks(MAX_PROPS_PER_REQUEST) {
            let params = chunk.iter().map(|p| Value::from(p.as_str())).collect();
            let reply: Vec<Value> = self.execute_with_response(Method::GetProp, params).await?;
            for (prop, value) in chunk.iter().zip(reply) {
                if value.as_str().is_some_and(str::is_empty) || value.is_null() {
                    continue;
                }
                values.insert(*prop, value);
            }
        }

        self.inner.properties.merge(values.clone());
        Ok(values)
    }

    pub async fn get_all_props(&self) -> Result<HashMap<Property, Value>> {
        self.get_props(PropertySet::all()).await
    }
}

// -------------------------------------------------------------------------
// Connection & Streaming
// -------------------------------------------------------------------------
impl Device {
    /// Returns a Stream of events from the device.
    ///
    /// Subscribers that fall behind skip the events they missed.
    pub fn stream(&self) -> impl Stream<Item = DeviceEvent> + Send + 'static {
        let mut rx = self.inner.events.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Event subscriber lagged, skipped {} event(s)", n);
                        continue;
                    }
                }
            }
        }
    }

    /// Opens the control connection and seeds the property store.
    ///
    /// Any previous connection is closed first. Returns `false` (and leaves the
    /// device disconnected) when the socket is dead right after opening or the
    /// device reports no properties. Concurrent calls on clones of the same
    /// device run one after the other; the last one owns the connection.
    pub async fn connect(&self) -> Result<bool> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.teardown().await;

        info!("Connecting to device at {}", self.inner.descriptor.address());
        let stream = self.open_stream().await?;
        let (mut reader, writer) = stream.into_split();
        if !probe_alive(&mut reader).await {
            warn!("Device {} closed the connection immediately", self.hostname());
            return Ok(false);
        }
        self.attach(reader, writer).await;

        match self.get_all_props().await {
            Ok(props) if !props.is_empty() => {
                info!(
                    "Connected to {} ({} properties)",
                    self.hostname(),
                    props.len()
                );
                self.emit(DeviceEvent::Connected);
                Ok(true)
            }
            Ok(_) => {
                warn!("Device {} reported no properties", self.hostname());
                self.teardown().await;
                Ok(false)
            }
            Err(e) => {
                warn!("Initial property fetch from {} failed: {}", self.hostname(), e);
                self.teardown().await;
                Ok(false)
            }
        }
    }

    /// Stops the read loop, closes the socket and fails pending requests.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.teardown().await;
    }

    /// Caller holds the lifecycle lock.
    async fn teardown(&self) {
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                error!("Read loop for {} ended abnormally: {}", self.hostname(), e);
            }
        }

        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }

        let was_connected = self.inner.connected.swap(false, Ordering::SeqCst);
        let failed = self.inner.correlator.fail_all(YeelightError::Disconnected);
        if failed > 0 {
            debug!("Failed {} pending request(s) on {}", failed, self.hostname());
        }
        if was_connected {
            info!("Disconnected from {}", self.hostname());
            self.emit(DeviceEvent::Disconnected);
        }
    }

    async fn open_stream(&self) -> Result<TcpStream> {
        let addr = self.inner.descriptor.address();
        let connecting = TcpStream::connect(addr);
        let stream = match self.inner.config.connect_timeout {
            Some(limit) => timeout(limit, connecting)
                .await
                .map_err(|_| YeelightError::Timeout)??,
            None => connecting.await?,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", self.hostname(), e);
        }
        Ok(stream)
    }

    async fn attach(&self, reader: OwnedReadHalf, writer: OwnedWriteHalf) {
        *self.inner.writer.lock().await = Some(writer);
        self.inner.connected.store(true, Ordering::SeqCst);

        let token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_read_loop(reader, token.clone()));
        *self.inner.task.lock() = Some(ConnectionTask { token, handle });
    }
}

// -------------------------------------------------------------------------
// Read Loop
// -------------------------------------------------------------------------
impl Device {
    async fn run_read_loop(self, reader: OwnedReadHalf, token: CancellationToken) {
        let mut reader = Some(reader);
        let mut lines = LineBuffer::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut ticker = tokio::time::interval(READ_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut failure_count = 0u32;
        let mut retry_at: Option<Instant> = None;

        debug!("Read loop started for {}", self.hostname());

        loop {
            let event = tokio::select! {
                _ = token.cancelled() => LoopEvent::Shutdown,
                res = wait_readable(reader.as_ref()) => LoopEvent::Readable(res),
                _ = ticker.tick() => LoopEvent::Tick,
            };

            let lost = match event {
                LoopEvent::Shutdown => break,
                LoopEvent::Readable(Ok(())) => match reader.as_ref() {
                    Some(r) => self.drain_socket(r, &mut lines, &mut buf).err(),
                    None => None,
                },
                LoopEvent::Readable(Err(e)) => Some(YeelightError::from(e)),
                LoopEvent::Tick => {
                    self.inner.correlator.expire_overdue(Instant::now());
                    match reader.as_mut() {
                        Some(r) => {
                            if probe_alive(r).await {
                                None
                            } else {
                                Some(YeelightError::Disconnected)
                            }
                        }
                        None => None,
                    }
                }
            };

            if let Some(reason) = lost {
                reader = None;
                lines.clear();
                self.handle_connection_lost(&reason).await;
                if !self.reconnect_enabled() {
                    break;
                }
                retry_at = Some(Instant::now());
            }

            if reader.is_some() {
                continue;
            }
            if !self.reconnect_enabled() {
                break;
            }
            if retry_at.is_some_and(|at| Instant::now() >= at) {
                match self.try_reconnect(&token).await {
                    Ok(Some(r)) => {
                        reader = Some(r);
                        failure_count = 0;
                        retry_at = None;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let wait = get_backoff_duration(failure_count);
                        failure_count += 1;
                        error!(
                            "Reconnect to {} failed: {} (retrying in {}s, fail count: {})",
                            self.hostname(),
                            e,
                            wait.as_secs(),
                            failure_count
                        );
                        retry_at = Some(Instant::now() + wait);
                    }
                }
            }
        }

        debug!("Read loop for {} stopped", self.hostname());
    }

    /// Reads everything currently available. Errors mean the connection is gone.
    fn drain_socket(
        &self,
        reader: &OwnedReadHalf,
        lines: &mut LineBuffer,
        buf: &mut [u8],
    ) -> Result<()> {
        loop {
            match reader.try_read(buf) {
                Ok(0) => return Err(YeelightError::Disconnected),
                Ok(n) => {
                    for line in lines.push(&buf[..n]) {
                        self.handle_line(&line);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn handle_line(&self, line: &str) {
        debug!("<- {}: {}", self.hostname(), line);
        match decode_line(line) {
            Ok(Inbound::Result(result)) => {
                self.inner.correlator.resolve(result);
            }
            Ok(Inbound::Notification(notification)) => {
                let touched = self.inner.properties.merge_notification(&notification);
                debug!(
                    "Notification '{}' from {} updated {:?}",
                    notification.method,
                    self.hostname(),
                    touched
                );
                self.emit(DeviceEvent::Notification(notification));
            }
            Err(e) => {
                self.inner.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Undecodable line from {}: {}", self.hostname(), e);
                self.emit(DeviceEvent::Error(e));
            }
        }
    }

    async fn handle_connection_lost(&self, reason: &YeelightError) {
        *self.inner.writer.lock().await = None;
        self.inner.connected.store(false, Ordering::SeqCst);
        let failed = self.inner.correlator.fail_all(YeelightError::Disconnected);
        warn!(
            "Connection to {} lost ({}), {} pending request(s) failed",
            self.hostname(),
            reason,
            failed
        );
        self.emit(DeviceEvent::Disconnected);
    }

    /// Returns `Ok(None)` if shutdown was requested while connecting.
    async fn try_reconnect(&self, token: &CancellationToken) -> Result<Option<OwnedReadHalf>> {
        info!("Reconnecting to {}", self.inner.descriptor.address());
        let stream = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            res = self.open_stream() => res?,
        };

        let (mut reader, writer) = stream.into_split();
        if !probe_alive(&mut reader).await {
            return Err(YeelightError::Disconnected);
        }
        *self.inner.writer.lock().await = Some(writer);
        self.inner.connected.store(true, Ordering::SeqCst);
        self.inner.reconnects.fetch_add(1, Ordering::Relaxed);

        info!("Reconnected to {}", self.hostname());
        self.emit(DeviceEvent::Reconnected);
        Ok(Some(reader))
    }
}

async fn wait_readable(reader: Option<&OwnedReadHalf>) -> std::io::Result<()> {
    match reader {
        Some(r) => r.readable().await,
        None => std::future::pending().await,
    }
}

/// Zero-wait peek: pending data or nothing to read means alive, EOF or an error means closed.
async fn probe_alive(reader: &mut OwnedReadHalf) -> bool {
    let mut byte = [0u8; 1];
    match timeout(Duration::ZERO, reader.peek(&mut byte)).await {
        Err(_) => true,
        Ok(Ok(n)) => n > 0,
        Ok(Err(_)) => false,
    }
}

fn get_backoff_duration(failure_count: u32) -> Duration {
    let min_secs = SLEEP_RECONNECT_MIN.as_secs();
    let max_secs = SLEEP_RECONNECT_MAX.as_secs();
    let secs = (2u64.pow(failure_count.min(6)) * min_secs).min(max_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(get_backoff_duration(0), Duration::from_secs(1));
        assert_eq!(get_backoff_duration(1), Duration::from_secs(2));
        assert_eq!(get_backoff_duration(5), Duration::from_secs(32));
        assert_eq!(get_backoff_duration(6), Duration::from_secs(60));
        assert_eq!(get_backoff_duration(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn send_without_socket_is_not_connected() {
        let device = Device::new("127.0.0.1", DEFAULT_PORT);
        assert!(!device.is_connected());

        let err = device
            .execute(Method::Toggle, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, YeelightError::NotConnected));
        assert_eq!(device.stats().pending_requests, 0);
    }

    #[tokio::test]
    async fn unadvertised_methods_fail_before_io() {
        let mut descriptor = DeviceDescriptor::new("127.0.0.1", DEFAULT_PORT);
        descriptor.supported_methods = vec![Method::GetProp, Method::SetPower];
        let device = DeviceBuilder::new("ignored").descriptor(descriptor).build();

        let err = device
            .execute_with_timeout(Method::SetScene, vec![json!("ct")], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            YeelightError::UnsupportedOperation(Method::SetScene)
        ));
    }

    #[tokio::test]
    async fn liveness_check_tells_open_from_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        let (mut reader, _writer) = client.into_split();
        assert!(probe_alive(&mut reader).await);

        drop(peer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!probe_alive(&mut reader).await);
    }

    #[test]
    fn debug_shows_the_address() {
        let device = Device::new("10.0.0.4", 55443);
        let text = format!("{:?}", device);
        assert!(text.contains("10.0.0.4"));
        assert!(text.contains("connected: false"));
    }

    #[test]
    fn descriptor_properties_seed_the_store() {
        let mut descriptor = DeviceDescriptor::new("10.0.0.9", 55443);
        descriptor.properties.insert(Property::Power, json!("on"));
        let device = DeviceBuilder::new("10.0.0.9").descriptor(descriptor).build();

        assert_eq!(device.property(Property::Power), Some(json!("on")));
        assert_eq!(device.descriptor().properties.len(), 1);
        assert_eq!(device.config().command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }
}
