//! WiFi mode sequencing.
//!
//! The controller owns the connectivity context the original design kept in
//! globals: the event store, the dispatcher registration, and the handler
//! displaced while acting as a setup AP. It brings the radio into a
//! requested mode, idempotently with respect to one-time platform
//! initialization.
//!
//! Mode transitions always attempt a best-effort disconnect/stop of the
//! prior mode first; errors from that step are logged but do not abort the
//! transition.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::config::{AccessPointConfig, Credentials, CredentialsError, Mode};
use super::dispatcher::EventDispatcher;
use super::events::{EventStore, WaitEvent};
use crate::platform::{ConfigStorage, CredentialStore, EventHandler, PlatformError, WifiPlatform};

/// Errors surfaced by controller operations.
#[derive(Debug)]
pub enum WifiError {
    /// Rejected credentials or AP configuration.
    InvalidConfig(CredentialsError),
    /// A platform call returned a non-zero status.
    Platform(PlatformError),
}

impl std::fmt::Display for WifiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(e) => write!(f, "invalid configuration: {}", e),
            Self::Platform(e) => write!(f, "platform call failed: {}", e),
        }
    }
}

impl std::error::Error for WifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig(e) => Some(e),
            Self::Platform(e) => Some(e),
        }
    }
}

impl From<PlatformError> for WifiError {
    fn from(e: PlatformError) -> Self {
        Self::Platform(e)
    }
}

impl From<CredentialsError> for WifiError {
    fn from(e: CredentialsError) -> Self {
        Self::InvalidConfig(e)
    }
}

/// Sequences radio mode transitions and owns the connectivity context.
pub struct WifiController<P, S> {
    platform: Arc<P>,
    events: Arc<EventStore>,
    dispatcher: Arc<EventDispatcher<P, S>>,
    init_done: bool,
    /// Handler displaced when entering AP or provisioning mode, restored on
    /// the matching stop call. Scoped to this controller, not the process.
    displaced: Option<EventHandler>,
}

impl<P, S> WifiController<P, S>
where
    P: WifiPlatform + 'static,
    S: CredentialStore + 'static,
{
    pub fn new(platform: Arc<P>, credentials: Arc<S>) -> Self {
        let events = Arc::new(EventStore::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&platform),
            Arc::clone(&events),
            credentials,
        ));
        Self {
            platform,
            events,
            dispatcher,
            init_done: false,
            displaced: None,
        }
    }

    /// Shared connectivity state, for waiters outside the controller.
    pub fn events(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// One-time platform initialization; later calls are no-ops.
    pub fn init_platform(&mut self) -> Result<(), WifiError> {
        if self.init_done {
            return Ok(());
        }
        self.platform.init()?;
        self.init_done = true;
        Ok(())
    }

    /// Bring the radio up as a setup access point.
    ///
    /// Does not start the radio; call [`start_radio`](Self::start_radio)
    /// once any companion services are ready.
    pub fn enter_access_point(&mut self, config: &AccessPointConfig) -> Result<(), WifiError> {
        config.validate()?;
        self.init_platform()?;
        self.prepare_transition();

        let previous = self.platform.register_handler(self.dispatcher.handler())?;
        if self.displaced.is_none() {
            self.displaced = previous;
        }

        self.platform.set_storage(ConfigStorage::Ram)?;
        self.platform.set_mode(Mode::AccessPoint)?;
        self.platform.set_access_point_config(config)?;

        info!("soft-AP configured: {} (channel {})", config.ssid, config.channel);
        Ok(())
    }

    /// Connect as a station with the given credentials.
    ///
    /// A failed connect request is reported, not retried; reconnection is
    /// event-driven.
    pub fn enter_station(&mut self, credentials: &Credentials) -> Result<(), WifiError> {
        self.enter_client_mode(Mode::Station, credentials)
    }

    /// Connect as a station while keeping the soft-AP up.
    pub fn enter_mixed(&mut self, credentials: &Credentials) -> Result<(), WifiError> {
        self.enter_client_mode(Mode::Mixed, credentials)
    }

    /// Tear the soft-AP down and return to station mode, restoring any
    /// event handler that was active before [`enter_access_point`].
    pub fn stop_access_point(&mut self) {
        info!("switching back to station mode");
        if let Err(e) = self.platform.set_mode(Mode::Station) {
            warn!("set mode station failed: {}", e);
        }
        self.restore_handler();
    }

    /// Start the radio in whatever mode is configured.
    pub fn start_radio(&self) -> Result<(), WifiError> {
        self.platform.start()?;
        Ok(())
    }

    /// Run the smartconfig provisioning flow.
    ///
    /// Registers the dispatcher, starts the engine, then blocks without a
    /// timeout until the link comes up or the provisioning handshake
    /// completes. Callers needing a bound should poll
    /// [`wait_event`](Self::wait_event) instead.
    pub fn start_smartconfig(&mut self) -> Result<WaitEvent, WifiError> {
        self.init_platform()?;
        self.prepare_transition();

        let previous = self.platform.register_handler(self.dispatcher.handler())?;
        if self.displaced.is_none() {
            self.displaced = previous;
        }

        self.platform.set_storage(ConfigStorage::Flash)?;
        self.platform.set_mode(Mode::Station)?;
        self.platform.start()?;
        self.platform.start_smartconfig()?;

        info!("smartconfig started, waiting for credentials");
        Ok(self.events.wait_connected_or_done(None))
    }

    /// Stop the provisioning flow, clear its flags, and restore any
    /// displaced event handler.
    pub fn stop_smartconfig(&mut self) -> Result<(), WifiError> {
        let result = self.platform.stop_smartconfig();
        self.events.clear_all();
        self.restore_handler();
        result?;
        Ok(())
    }

    /// Bounded wait for connected or provisioning-done.
    pub fn wait_event(&self, timeout: Duration) -> WaitEvent {
        self.events.wait_connected_or_done(Some(timeout))
    }

    /// Snapshot of the station link state, for external polling.
    pub fn is_sta_connected(&self) -> bool {
        self.events.is_link_up()
    }

    fn enter_client_mode(&mut self, mode: Mode, credentials: &Credentials) -> Result<(), WifiError> {
        credentials.validate()?;
        self.init_platform()?;

        if mode == Mode::Station {
            self.prepare_transition();
            // Station bring-up installs the dispatcher; mixed mode keeps the
            // registration made when the AP came up.
            self.platform.register_handler(self.dispatcher.handler())?;
        }

        self.platform.set_storage(ConfigStorage::Flash)?;
        self.platform.set_mode(mode)?;
        self.platform.set_station_config(credentials)?;
        self.platform.connect()?;

        info!("connect requested: {} (mode {})", credentials.ssid(), mode);
        Ok(())
    }

    /// Best-effort teardown of the prior mode. Failures are expected when
    /// nothing was connected or started yet.
    fn prepare_transition(&self) {
        self.events.clear_all();

        if let Err(e) = self.platform.disconnect() {
            warn!("disconnect failed: {}", e);
        }
        if let Err(e) = self.platform.stop() {
            warn!("stop failed: {}", e);
        }
    }

    fn restore_handler(&mut self) {
        match self.displaced.take() {
            Some(handler) => {
                if let Err(e) = self.platform.register_handler(handler) {
                    warn!("restoring event handler failed: {}", e);
                }
            }
            None => {
                self.platform.unregister_handler();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MemoryCredentialStore, MockPlatform};
    use crate::wifi::WifiEvent;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn controller() -> (
        Arc<MockPlatform>,
        WifiController<MockPlatform, MemoryCredentialStore>,
    ) {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(MemoryCredentialStore::new());
        let controller = WifiController::new(Arc::clone(&platform), store);
        (platform, controller)
    }

    #[test]
    fn test_init_platform_is_idempotent() {
        let (platform, mut controller) = controller();
        controller.init_platform().unwrap();
        controller.init_platform().unwrap();
        assert_eq!(platform.init_count(), 1);
    }

    #[test]
    fn test_enter_station_sequences_platform_calls() {
        let (platform, mut controller) = controller();
        let credentials = Credentials::new("Router", "password1").unwrap();
        controller.enter_station(&credentials).unwrap();

        let calls = platform.calls();
        let position = |op: &str| calls.iter().position(|c| c == op).unwrap();
        assert!(position("init") < position("set_storage(flash)"));
        assert!(position("set_storage(flash)") < position("set_mode(station)"));
        assert!(position("set_mode(station)") < position("set_station_config(Router)"));
        assert!(position("set_station_config(Router)") < position("connect"));
        assert!(platform.has_handler());
    }

    #[test]
    fn test_enter_station_rejects_bad_ssid() {
        let (platform, mut controller) = controller();
        let credentials = Credentials {
            ssid: "x".repeat(40),
            password: "password1".into(),
            bssid: None,
        };
        assert!(matches!(
            controller.enter_station(&credentials),
            Err(WifiError::InvalidConfig(_))
        ));
        // Nothing touched the platform
        assert!(platform.calls().is_empty());
    }

    #[test]
    fn test_failed_connect_is_reported_not_retried() {
        let (platform, mut controller) = controller();
        platform.fail_on("connect", -1);
        let credentials = Credentials::new("Router", "password1").unwrap();
        let result = controller.enter_station(&credentials);
        assert!(matches!(
            result,
            Err(WifiError::Platform(PlatformError { code: -1 }))
        ));
        let calls = platform.calls();
        assert_eq!(calls.iter().filter(|c| *c == "connect").count(), 1);
    }

    #[test]
    fn test_best_effort_teardown_does_not_abort_transition() {
        let (platform, mut controller) = controller();
        platform.fail_on("disconnect", -5);
        platform.fail_on("stop", -5);
        let config = AccessPointConfig::new("Setup", None, 6).unwrap();
        controller.enter_access_point(&config).unwrap();
        controller.start_radio().unwrap();

        let calls = platform.calls();
        assert!(calls.contains(&"set_mode(access-point)".to_string()));
        assert!(calls.contains(&"start".to_string()));
    }

    #[test]
    fn test_stop_access_point_restores_displaced_handler() {
        let (platform, mut controller) = controller();

        // A handler was active before AP mode
        let restored = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&restored);
        let prior: EventHandler = Arc::new(move |_| flag.store(true, Ordering::SeqCst));
        platform.register_handler(prior).unwrap();

        let config = AccessPointConfig::new("Setup", None, 6).unwrap();
        controller.enter_access_point(&config).unwrap();

        // While in AP mode the dispatcher is installed, not the prior handler
        platform.fire(&WifiEvent::ScanDone);
        assert!(!restored.load(Ordering::SeqCst));

        controller.stop_access_point();
        platform.fire(&WifiEvent::ScanDone);
        assert!(restored.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_access_point_without_prior_handler_unregisters() {
        let (platform, mut controller) = controller();
        let config = AccessPointConfig::new("Setup", None, 6).unwrap();
        controller.enter_access_point(&config).unwrap();
        assert!(platform.has_handler());
        controller.stop_access_point();
        assert!(!platform.has_handler());
    }

    #[test]
    fn test_mixed_mode_keeps_ap_registration() {
        let (platform, mut controller) = controller();
        let config = AccessPointConfig::new("Setup", None, 6).unwrap();
        controller.enter_access_point(&config).unwrap();
        let registrations_after_ap = platform
            .calls()
            .iter()
            .filter(|c| *c == "register_handler")
            .count();

        let credentials = Credentials::new("Router", "password1").unwrap();
        controller.enter_mixed(&credentials).unwrap();

        let calls = platform.calls();
        assert_eq!(
            calls.iter().filter(|c| *c == "register_handler").count(),
            registrations_after_ap
        );
        assert!(calls.contains(&"set_mode(mixed)".to_string()));
    }

    #[test]
    fn test_wait_event_and_snapshot() {
        let (platform, mut controller) = controller();
        let credentials = Credentials::new("Router", "password1").unwrap();
        controller.enter_station(&credentials).unwrap();

        assert!(!controller.is_sta_connected());
        platform.fire(&WifiEvent::GotIp(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(controller.is_sta_connected());
        assert_eq!(
            controller.wait_event(Duration::from_millis(10)),
            WaitEvent::Connected
        );
        // The consuming wait does not disturb the snapshot
        assert!(controller.is_sta_connected());
        assert_eq!(
            controller.wait_event(Duration::from_millis(10)),
            WaitEvent::Timeout
        );
    }

    #[test]
    fn test_stop_smartconfig_clears_flags_and_restores() {
        let (platform, mut controller) = controller();
        let credentials = Credentials::new("Router", "password1").unwrap();
        controller.enter_station(&credentials).unwrap();

        platform.fire(&WifiEvent::AckSent);
        controller.stop_smartconfig().unwrap();
        assert_eq!(
            controller.wait_event(Duration::from_millis(10)),
            WaitEvent::Timeout
        );
        assert!(platform.calls().contains(&"stop_smartconfig".to_string()));
    }
}
