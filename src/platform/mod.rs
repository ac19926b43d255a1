//! Platform abstraction layer.
//!
//! The vendor WiFi stack, smartconfig engine and non-volatile storage are
//! opaque collaborators. This module defines the trait seams the lifecycle
//! code drives them through:
//!
//! - **ESP32** (`esp32` feature): ESP-IDF implementations in [`esp`]
//! - **Host tests**: a scripted mock in [`mock`]
//!
//! All fallible platform calls return the vendor status code wrapped in
//! [`PlatformError`]; zero/`Ok` is the only actionable positive signal.

use std::fmt;
use std::sync::Arc;

use crate::wifi::{AccessPointConfig, Credentials, Mode, WifiEvent};

#[cfg(feature = "esp32")]
pub mod esp;

#[cfg(test)]
pub mod mock;

#[cfg(feature = "esp32")]
pub use esp::{EspWifiPlatform, NvsCredentialStore};

/// Callback invoked by the platform's event-delivery context.
pub type EventHandler = Arc<dyn Fn(&WifiEvent) + Send + Sync>;

/// Where the platform keeps its own copy of the WiFi configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStorage {
    /// Volatile; lost on reboot. Used while acting as a setup AP.
    Ram,
    /// Persistent; survives reboot.
    Flash,
}

/// A failed platform call, carrying the vendor status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformError {
    /// Non-zero vendor status code.
    pub code: i32,
}

impl PlatformError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "platform status code {}", self.code)
    }
}

impl std::error::Error for PlatformError {}

/// Vendor WiFi/network stack surface.
///
/// Methods take `&self`; implementations provide their own interior
/// locking because the dispatcher calls back into the platform from the
/// event-delivery context.
pub trait WifiPlatform: Send + Sync {
    /// One-time platform/network-stack initialization.
    ///
    /// The controller guards against repeated calls; implementations may
    /// assume they are invoked at most once per process.
    fn init(&self) -> Result<(), PlatformError>;

    /// Install `handler` as the event sink, returning any handler it
    /// displaced so mode transitions can restore it.
    fn register_handler(&self, handler: EventHandler)
        -> Result<Option<EventHandler>, PlatformError>;

    /// Remove the current event sink, returning it.
    fn unregister_handler(&self) -> Option<EventHandler>;

    /// Select the radio mode.
    fn set_mode(&self, mode: Mode) -> Result<(), PlatformError>;

    /// Select where the platform persists its WiFi configuration.
    fn set_storage(&self, storage: ConfigStorage) -> Result<(), PlatformError>;

    /// Apply station credentials.
    fn set_station_config(&self, credentials: &Credentials) -> Result<(), PlatformError>;

    /// Apply soft-AP configuration.
    fn set_access_point_config(&self, config: &AccessPointConfig) -> Result<(), PlatformError>;

    /// Start the radio.
    fn start(&self) -> Result<(), PlatformError>;

    /// Stop the radio.
    fn stop(&self) -> Result<(), PlatformError>;

    /// Issue a station connect request. Completion is signalled through
    /// events, not the return value.
    fn connect(&self) -> Result<(), PlatformError>;

    /// Drop the current station link.
    fn disconnect(&self) -> Result<(), PlatformError>;

    /// Start the smartconfig provisioning engine.
    fn start_smartconfig(&self) -> Result<(), PlatformError>;

    /// Stop the smartconfig provisioning engine.
    fn stop_smartconfig(&self) -> Result<(), PlatformError>;

    /// Drive the connectivity indicator LED.
    fn set_indicator(&self, on: bool);
}

/// Non-volatile storage for the single provisioned credentials blob.
pub trait CredentialStore: Send + Sync {
    /// Persist `credentials`, replacing any previous blob.
    fn save(&self, credentials: &Credentials) -> Result<(), PlatformError>;

    /// Load the stored credentials.
    ///
    /// Returns `None` if nothing is stored or the blob is corrupted.
    fn load(&self) -> Option<Credentials>;

    /// Remove the stored blob.
    fn clear(&self) -> Result<(), PlatformError>;
}
