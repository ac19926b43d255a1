//! ESP32 IoT demo bring-up library.
//!
//! Orchestrates WiFi connectivity (static credentials or smartconfig
//! provisioning), SNTP time sync, and the hand-off to an IoT demo entry
//! point. The lifecycle itself is platform-independent and tested on the
//! host machine; the ESP-IDF bindings live behind the `esp32` feature.

pub mod bringup;
pub mod platform;
pub mod sntp;
pub mod wifi;

// Re-export commonly used items
pub use bringup::{BringUp, BringUpMode};
pub use platform::{ConfigStorage, CredentialStore, EventHandler, PlatformError, WifiPlatform};
pub use sntp::TimeSync;
pub use wifi::{
    AccessPointConfig, Credentials, CredentialsError, EventStore, Mode, WaitEvent, WifiController,
    WifiError, WifiEvent,
};
