//! SSDP-style multicast discovery of Yeelight devices.
//! Probes every usable interface in parallel and parses the free-text replies.

use crate::error::Result;
use crate::protocol::{DEFAULT_PORT, Method, Model, Property};
use crate::state::DeviceDescriptor;
use futures_core::stream::Stream;
use futures_util::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};

pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const MULTICAST_PORT: u16 = 1982;

const DEFAULT_LISTEN_WINDOW: Duration = Duration::from_secs(1);
const DEFAULT_ATTEMPTS: usize = 3;
const EVENT_CAPACITY: usize = 64;
const RECV_BUFFER: usize = 2048;

const PROBE_MESSAGE: &str = "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1982\r\nMAN: \"ssdp:discover\"\r\nST: wifi_bulb";

const LOCATION_PREFIX: &str = "Location: yeelight://";
const KEY_ID: &str = "id";
const KEY_MODEL: &str = "model";
const KEY_SUPPORT: &str = "support";

/// Name prefixes of tunnels, bridges and other interfaces that never reach a bulb.
const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "tun", "tap", "utun", "vmnet", "vboxnet", "wg", "zt",
    "tailscale", "awdl", "llw", "gif", "stf", "anpi", "bridge",
];

/// Deduplicates discovery replies by hostname, keeping discovery order.
#[derive(Debug, Default)]
pub struct DiscoveryCollector {
    seen: HashSet<String>,
    found: Vec<DeviceDescriptor>,
}

impl DiscoveryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `descriptor` if its hostname is new. Returns true when it was kept.
    pub fn insert(&mut self, descriptor: DeviceDescriptor) -> bool {
        if !self.seen.insert(descriptor.hostname.clone()) {
            return false;
        }
        self.found.push(descriptor);
        true
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    pub fn descriptors(&self) -> &[DeviceDescriptor] {
        &self.found
    }

    pub fn into_descriptors(self) -> Vec<DeviceDescriptor> {
        self.found
    }
}

/// Scanner discovers Yeelight devices on the local network using multicast probes.
#[derive(Clone)]
pub struct Scanner {
    /// Listen window of each probe attempt
    pub timeout: Duration,
    /// Concurrent probe attempts per local address
    pub attempts: usize,
    /// Only probe from interfaces with this name
    pub interface: Option<String>,
    /// Probe destination (the multicast group unless overridden)
    pub target: SocketAddrV4,
    events: broadcast::Sender<DeviceDescriptor>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    /// Create a new Scanner with default settings.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            timeout: DEFAULT_LISTEN_WINDOW,
            attempts: DEFAULT_ATTEMPTS,
            interface: None,
            target: SocketAddrV4::new(MULTICAST_ADDR, MULTICAST_PORT),
            events,
        }
    }

    /// Set the listen window of each attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Restrict discovery to one network interface.
    pub fn with_interface<S: Into<String>>(mut self, name: S) -> Self {
        self.interface = Some(name.into());
        self
    }

    /// Send probes to a unicast responder instead of the multicast group.
    pub fn with_target(mut self, target: SocketAddrV4) -> Self {
        self.target = target;
        self
    }

    /// Returns a Stream of newly found devices, one item per hostname per scan.
    pub fn stream(&self) -> impl Stream<Item = DeviceDescriptor> + Send + 'static {
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(descriptor) => yield descriptor,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    }

    /// Probes from every usable IPv4 address of the host.
    pub async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let addrs = self.local_addresses()?;
        if addrs.is_empty() {
            warn!("No usable network interface found for discovery");
        }
        self.discover_on(addrs).await
    }

    /// Probes from the given local addresses.
    ///
    /// Every address gets `attempts` concurrent probes; the returned list holds
    /// one descriptor per hostname, in the order replies arrived.
    pub async fn discover_on<I>(&self, addrs: I) -> Result<Vec<DeviceDescriptor>>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let addrs: Vec<Ipv4Addr> = addrs.into_iter().collect();
        info!(
            "Starting Yeelight discovery on {:?} (target: {}, window: {:?})",
            addrs, self.target, self.timeout
        );

        let collector = Mutex::new(DiscoveryCollector::new());
        let probes = addrs
            .iter()
            .flat_map(|addr| (0..self.attempts).map(move |_| *addr))
            .map(|addr| self.probe(addr, &collector));
        join_all(probes).await;

        let found = collector.into_inner().into_descriptors();
        info!("Discovery finished. Found {} device(s).", found.len());
        Ok(found)
    }

    fn local_addresses(&self) -> Result<Vec<Ipv4Addr>> {
        let mut addrs = Vec::new();
        for iface in if_addrs::get_if_addrs()? {
            if !accepts_interface(&iface.name, iface.is_loopback(), self.interface.as_deref()) {
                continue;
            }
            if let std::net::IpAddr::V4(ip) = iface.ip() {
                debug!("Using interface {} ({})", iface.name, ip);
                addrs.push(ip);
            }
        }
        Ok(addrs)
    }

    /// One probe attempt: send once, then collect replies for the listen window.
    async fn probe(&self, local: Ipv4Addr, collector: &Mutex<DiscoveryCollector>) {
        let socket = match self.create_socket(local) {
            Ok(s) => s,
            Err(e) => {
                debug!("Skipping probe from {}: {}", local, e);
                return;
            }
        };

        if let Err(e) = socket
            .send_to(PROBE_MESSAGE.as_bytes(), SocketAddr::V4(self.target))
            .await
        {
            debug!("Failed to send probe from {} to {}: {}", local, self.target, e);
            return;
        }

        let window = sleep(self.timeout);
        tokio::pin!(window);
        let mut buf = [0u8; RECV_BUFFER];

        loop {
            tokio::select! {
                _ = &mut window => break,
                res = socket.recv_from(&mut buf) => {
                    match res {
                        Ok((len, from)) => {
                            let text = String::from_utf8_lossy(&buf[..len]);
                            match parse_reply(&text) {
                                Some(descriptor) => self.collect(collector, descriptor),
                                None => debug!("Ignoring discovery reply from {}", from),
                            }
                        }
                        Err(e) => {
                            debug!("Receive on {} failed: {}", local, e);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn collect(&self, collector: &Mutex<DiscoveryCollector>, descriptor: DeviceDescriptor) {
        let mut guard = collector.lock();
        if guard.insert(descriptor.clone()) {
            info!(
                "Found device: host={}, port={}, model={}",
                descriptor.hostname, descriptor.port, descriptor.model
            );
            let _ = self.events.send(descriptor);
        }
    }

    /// Create and configure the UDP socket of one probe attempt.
    fn create_socket(&self, local: Ipv4Addr) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        if let Err(e) = socket.set_reuse_address(true) {
            debug!("Failed to set reuse_address on {}: {}", local, e);
        }
        socket.bind(&SockAddr::from(SocketAddrV4::new(local, 0)))?;

        if self.target.ip().is_multicast() {
            socket.set_multicast_ttl_v4(1)?;
            socket.set_multicast_loop_v4(false)?;
            socket.set_multicast_if_v4(&local)?;
            socket.join_multicast_v4(self.target.ip(), &local)?;
        }

        socket.set_nonblocking(true)?;
        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpSocket::from_std(std_socket)?)
    }
}

/// Interface selection for `discover`.
///
/// A name given through [`Scanner::with_interface`] is used as is, even for
/// loopback or virtual interfaces. Otherwise loopback and virtual interfaces
/// are skipped.
pub fn accepts_interface(name: &str, is_loopback: bool, wanted: Option<&str>) -> bool {
    match wanted {
        Some(wanted) => name == wanted,
        None => !is_loopback && !is_virtual_interface(name),
    }
}

/// True for loopback, tunnel, bridge and container interfaces.
pub fn is_virtual_interface(name: &str) -> bool {
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Parses one discovery reply. Replies without a `Location` header yield `None`.
pub fn parse_reply(text: &str) -> Option<DeviceDescriptor> {
    let mut location = None;
    let mut id = None;
    let mut model = Model::Unknown;
    let mut supported = Vec::new();
    let mut properties = std::collections::HashMap::new();

    for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(LOCATION_PREFIX) {
            location = Some(parse_location(rest.trim()));
            continue;
        }

        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            continue;
        }
        let (key, value) = (parts[0].trim(), parts[1].trim());
        match key {
            KEY_ID => id = Some(value.to_string()),
            KEY_MODEL => model = Model::from_announced(value),
            KEY_SUPPORT => {
                supported = value.split_whitespace().filter_map(Method::from_wire).collect()
            }
            other => {
                if let Some(prop) = Property::from_wire(other) {
                    properties.insert(prop, Value::from(value));
                }
            }
        }
    }

    let (hostname, port) = location?;
    Some(DeviceDescriptor {
        hostname,
        port,
        id,
        model,
        properties,
        supported_methods: supported,
    })
}

fn parse_location(rest: &str) -> (String, u16) {
    match rest.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (rest.to_string(), DEFAULT_PORT),
        },
        None => (rest.to_string(), DEFAULT_PORT),
    }
}
