//! Scripted platform for host tests.
//!
//! Records every platform call in order, lets tests inject failure codes
//! per operation, and delivers events into the registered handler from
//! whatever thread the test chooses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{ConfigStorage, CredentialStore, EventHandler, PlatformError, WifiPlatform};
use crate::wifi::{AccessPointConfig, Credentials, Mode, WifiEvent};

#[derive(Default)]
pub struct MockPlatform {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, i32>>,
    handler: Mutex<Option<EventHandler>>,
    init_count: AtomicU32,
    indicator: Mutex<Vec<bool>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call to `op` fail with `code`.
    pub fn fail_on(&self, op: &'static str, code: i32) {
        self.failures.lock().unwrap().insert(op, code);
    }

    /// Deliver an event to the registered handler, as the platform's
    /// event-delivery context would. Panics if no handler is installed.
    pub fn fire(&self, event: &WifiEvent) {
        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .expect("no event handler registered");
        handler(event);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn init_count(&self) -> u32 {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn indicator_toggles(&self) -> usize {
        self.indicator.lock().unwrap().len()
    }

    fn record(&self, op: &'static str) -> Result<(), PlatformError> {
        self.calls.lock().unwrap().push(op.to_string());
        match self.failures.lock().unwrap().get(op) {
            Some(&code) => Err(PlatformError::new(code)),
            None => Ok(()),
        }
    }
}

impl WifiPlatform for MockPlatform {
    fn init(&self) -> Result<(), PlatformError> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        self.record("init")
    }

    fn register_handler(
        &self,
        handler: EventHandler,
    ) -> Result<Option<EventHandler>, PlatformError> {
        self.record("register_handler")?;
        Ok(self.handler.lock().unwrap().replace(handler))
    }

    fn unregister_handler(&self) -> Option<EventHandler> {
        self.calls
            .lock()
            .unwrap()
            .push("unregister_handler".to_string());
        self.handler.lock().unwrap().take()
    }

    fn set_mode(&self, mode: Mode) -> Result<(), PlatformError> {
        let op = match mode {
            Mode::Station => "set_mode(station)",
            Mode::AccessPoint => "set_mode(access-point)",
            Mode::Mixed => "set_mode(mixed)",
        };
        self.calls.lock().unwrap().push(op.to_string());
        match self.failures.lock().unwrap().get("set_mode") {
            Some(&code) => Err(PlatformError::new(code)),
            None => Ok(()),
        }
    }

    fn set_storage(&self, storage: ConfigStorage) -> Result<(), PlatformError> {
        let op = match storage {
            ConfigStorage::Ram => "set_storage(ram)",
            ConfigStorage::Flash => "set_storage(flash)",
        };
        self.calls.lock().unwrap().push(op.to_string());
        match self.failures.lock().unwrap().get("set_storage") {
            Some(&code) => Err(PlatformError::new(code)),
            None => Ok(()),
        }
    }

    fn set_station_config(&self, credentials: &Credentials) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_station_config({})", credentials.ssid()));
        match self.failures.lock().unwrap().get("set_station_config") {
            Some(&code) => Err(PlatformError::new(code)),
            None => Ok(()),
        }
    }

    fn set_access_point_config(&self, config: &AccessPointConfig) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_access_point_config({})", config.ssid));
        match self.failures.lock().unwrap().get("set_access_point_config") {
            Some(&code) => Err(PlatformError::new(code)),
            None => Ok(()),
        }
    }

    fn start(&self) -> Result<(), PlatformError> {
        self.record("start")
    }

    fn stop(&self) -> Result<(), PlatformError> {
        self.record("stop")
    }

    fn connect(&self) -> Result<(), PlatformError> {
        self.record("connect")
    }

    fn disconnect(&self) -> Result<(), PlatformError> {
        self.record("disconnect")
    }

    fn start_smartconfig(&self) -> Result<(), PlatformError> {
        self.record("start_smartconfig")
    }

    fn stop_smartconfig(&self) -> Result<(), PlatformError> {
        self.record("stop_smartconfig")
    }

    fn set_indicator(&self, on: bool) {
        self.indicator.lock().unwrap().push(on);
    }
}

/// In-memory credential store keeping the full save history, so tests can
/// assert on exactly what was persisted.
#[derive(Default)]
pub struct MemoryCredentialStore {
    saved: Mutex<Vec<Credentials>>,
    fail_code: Mutex<Option<i32>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, code: i32) {
        *self.fail_code.lock().unwrap() = Some(code);
    }

    pub fn history(&self) -> Vec<Credentials> {
        self.saved.lock().unwrap().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, credentials: &Credentials) -> Result<(), PlatformError> {
        if let Some(code) = *self.fail_code.lock().unwrap() {
            return Err(PlatformError::new(code));
        }
        self.saved.lock().unwrap().push(credentials.clone());
        Ok(())
    }

    fn load(&self) -> Option<Credentials> {
        self.saved.lock().unwrap().last().cloned()
    }

    fn clear(&self) -> Result<(), PlatformError> {
        self.saved.lock().unwrap().clear();
        Ok(())
    }
}
