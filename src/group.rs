//! Management of several Yeelight devices as one unit.
//! Provides a unified event stream and fan-out of control commands.

use crate::control::{ColorFlow, PowerOnMode, Rgb, Scene, Transition};
use crate::device::{Device, DeviceEvent};
use crate::error::{Result, YeelightError};
use futures_util::future::join_all;
use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 128;

/// An event from any device of a [`DeviceGroup`], tagged with its hostname.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    pub hostname: String,
    pub event: DeviceEvent,
}

/// A named set of devices keyed by hostname.
///
/// Control methods run on every member concurrently and report `true` only
/// when every device acknowledged the command.
#[derive(Clone)]
pub struct DeviceGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    name: String,
    devices: RwLock<HashMap<String, Device>>,
    device_tokens: RwLock<HashMap<String, CancellationToken>>,
    event_tx: broadcast::Sender<GroupEvent>,
    cancel_token: CancellationToken,
}

impl DeviceGroup {
    /// Create a new, empty group.
    pub fn new<N: Into<String>>(name: N) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                devices: RwLock::new(HashMap::new()),
                device_tokens: RwLock::new(HashMap::new()),
                event_tx,
                cancel_token: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns a Stream of events from all member devices.
    pub fn stream(&self) -> impl Stream<Item = GroupEvent> + Send + 'static {
        let mut rx = self.inner.event_tx.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    }

    /// Add a device to the group.
    ///
    /// Returns an error if a device with the same hostname already exists.
    pub async fn add(&self, device: Device) -> Result<()> {
        let hostname = device.hostname().to_string();
        let mut devices = self.inner.devices.write().await;
        let mut device_tokens = self.inner.device_tokens.write().await;

        if devices.contains_key(&hostname) {
            return Err(YeelightError::DuplicateDevice(hostname));
        }

        let device_token = self.inner.cancel_token.child_token();
        self.spawn_device_monitor(device.clone(), device_token.clone());

        devices.insert(hostname.clone(), device);
        device_tokens.insert(hostname.clone(), device_token);

        info!("Device {} added to group '{}'", hostname, self.inner.name);
        Ok(())
    }

    /// Remove a device from the group and stop forwarding its events.
    ///
    /// The device itself stays connected.
    pub async fn remove(&self, hostname: &str) -> Result<Device> {
        let mut devices = self.inner.devices.write().await;
        let mut device_tokens = self.inner.device_tokens.write().await;

        match devices.remove(hostname) {
            Some(device) => {
                if let Some(token) = device_tokens.remove(hostname) {
                    token.cancel();
                }
                info!("Device {} removed from group '{}'", hostname, self.inner.name);
                Ok(device)
            }
            None => {
                warn!("Attempted to remove non-existent device {}", hostname);
                Err(YeelightError::DeviceNotFound(hostname.to_string()))
            }
        }
    }

    /// Get a device by hostname.
    pub async fn get(&self, hostname: &str) -> Option<Device> {
        self.inner.devices.read().await.get(hostname).cloned()
    }

    /// Map of hostname to local connection status (no network request).
    pub async fn list(&self) -> HashMap<String, bool> {
        let devices = self.inner.devices.read().await;
        devices
            .iter()
            .map(|(host, device)| (host.clone(), device.is_connected()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.devices.read().await.is_empty()
    }

    /// Connects every member concurrently. True when all of them connected.
    pub async fn connect_all(&self) -> bool {
        self.fan_out(|d| async move { d.connect().await }).await
    }

    pub async fn disconnect_all(&self) {
        let devices = self.snapshot().await;
        join_all(devices.iter().map(|d| d.disconnect())).await;
    }

    /// Stop forwarding events from all members.
    pub async fn shutdown(self) {
        self.inner.cancel_token.cancel();
        self.inner.device_tokens.write().await.clear();
        self.inner.devices.write().await.clear();
    }

    async fn snapshot(&self) -> Vec<Device> {
        self.inner.devices.read().await.values().cloned().collect()
    }

    /// Runs `op` on every member concurrently and folds the outcomes.
    async fn fan_out<F, Fut>(&self, op: F) -> bool
    where
        F: Fn(Device) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let devices = self.snapshot().await;
        let outcomes = join_all(devices.iter().cloned().map(&op)).await;

        let mut all_ok = true;
        for (device, outcome) in devices.iter().zip(outcomes) {
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Device {} did not acknowledge", device.hostname());
                    all_ok = false;
                }
                Err(e) => {
                    warn!("Command failed on {}: {}", device.hostname(), e);
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    fn spawn_device_monitor(&self, device: Device, token: CancellationToken) {
        let hostname = device.hostname().to_string();
        let event_tx = self.inner.event_tx.clone();
        // Subscribe before spawning so no event emitted after `add` is missed.
        let stream = device.stream();

        tokio::spawn(async move {
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = stream.next() => {
                        match event {
                            Some(event) => {
                                let _ = event_tx.send(GroupEvent {
                                    hostname: hostname.clone(),
                                    event,
                                });
                            }
                            None => break,
                        }
                    }
                }
            }
            debug!("Event forwarding for {} stopped", hostname);
        });
    }
}

// -------------------------------------------------------------------------
// Group Control API
// -------------------------------------------------------------------------
impl DeviceGroup {
    pub async fn set_power(&self, on: bool, transition: Transition, mode: PowerOnMode) -> bool {
        self.fan_out(|d| async move { d.set_power(on, transition, mode).await }).await
    }

    pub async fn turn_on(&self, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.turn_on(transition).await }).await
    }

    pub async fn turn_off(&self, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.turn_off(transition).await }).await
    }

    pub async fn toggle(&self) -> bool {
        self.fan_out(|d| async move { d.toggle().await }).await
    }

    pub async fn set_brightness(&self, value: u8, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.set_brightness(value, transition).await }).await
    }

    pub async fn set_color_temperature(&self, kelvin: u32, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.set_color_temperature(kelvin, transition).await }).await
    }

    pub async fn set_rgb_color(&self, color: Rgb, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.set_rgb_color(color, transition).await }).await
    }

    pub async fn set_hsv_color(&self, hue: u16, sat: u8, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.set_hsv_color(hue, sat, transition).await }).await
    }

    pub async fn adjust_brightness(&self, percent: i32, duration: Duration) -> bool {
        self.fan_out(|d| async move { d.adjust_brightness(percent, duration).await }).await
    }

    pub async fn set_default(&self) -> bool {
        self.fan_out(|d| async move { d.set_default().await }).await
    }

    pub async fn start_color_flow(&self, flow: &ColorFlow) -> bool {
        self.fan_out(|d| {
            let flow = flow.clone();
            async move { d.start_color_flow(&flow).await }
        })
        .await
    }

    pub async fn stop_color_flow(&self) -> bool {
        self.fan_out(|d| async move { d.stop_color_flow().await }).await
    }

    pub async fn set_scene(&self, scene: &Scene) -> bool {
        self.fan_out(|d| {
            let scene = scene.clone();
            async move { d.set_scene(&scene).await }
        })
        .await
    }

    pub async fn bg_turn_on(&self, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.bg_turn_on(transition).await }).await
    }

    pub async fn bg_turn_off(&self, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.bg_turn_off(transition).await }).await
    }

    pub async fn bg_toggle(&self) -> bool {
        self.fan_out(|d| async move { d.bg_toggle().await }).await
    }

    pub async fn bg_set_brightness(&self, value: u8, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.bg_set_brightness(value, transition).await }).await
    }

    pub async fn bg_set_rgb_color(&self, color: Rgb, transition: Transition) -> bool {
        self.fan_out(|d| async move { d.bg_set_rgb_color(color, transition).await }).await
    }
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        // Stops the forwarding tasks.
        self.cancel_token.cancel();
    }
}
