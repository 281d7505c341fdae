//! # Rustylight
//!
//! Asynchronous Yeelight LAN control: multicast discovery, a persistent
//! per-device connection with request/response correlation, and typed
//! control commands.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rustylight::{Device, Transition};
//!
//! # async fn run() -> rustylight::error::Result<()> {
//! let device = Device::new("192.168.1.20", 55443);
//! if device.connect().await? {
//!     device.turn_on(Transition::smooth_ms(500)).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
#[macro_use]
mod macros;
pub mod control;
pub mod correlator;
pub mod device;
pub mod error;
pub mod group;
pub mod protocol;
pub mod scanner;
pub mod state;

pub use control::{
    AdjustAction, AdjustProperty, ColorFlow, CronEntry, FlowEndAction, FlowExpression,
    PowerOnMode, Rgb, Scene, Transition,
};
pub use device::{Device, DeviceBuilder, DeviceConfig, DeviceEvent, DeviceStats};
pub use error::YeelightError;
pub use group::{DeviceGroup, GroupEvent};
pub use protocol::{Method, Model, Property};
pub use scanner::Scanner;
pub use state::{DeviceDescriptor, PropertySet};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
