//! WiFi connection and provisioning lifecycle.
//!
//! # Components
//!
//! - [`config`] - credentials and mode types (host-testable)
//! - [`events`] - connectivity events and the shared event store
//! - [`dispatcher`] - platform event to state translation
//! - [`controller`] - mode sequencing over a [`crate::platform::WifiPlatform`]

mod config;
mod controller;
mod dispatcher;
mod events;

pub use config::{
    AccessPointConfig, Credentials, CredentialsError, Mode, DEFAULT_MAX_AP_CONNECTIONS,
    MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN,
};
pub use controller::{WifiController, WifiError};
pub use dispatcher::EventDispatcher;
pub use events::{EventStore, WaitEvent, WifiEvent};
