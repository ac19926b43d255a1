//! Startup sequencing.
//!
//! The bring-up task drives the overall policy: bring the radio up (static
//! credentials or smartconfig provisioning), wait for connectivity within a
//! bounded budget, best-effort time sync, then hand off to the IoT demo
//! entry point. On failure it logs and returns; no retries happen at this
//! layer.

use std::time::Duration;

use log::{debug, error, info};

use crate::platform::{CredentialStore, WifiPlatform};
use crate::sntp::{self, TimeSync};
use crate::wifi::{Credentials, WifiController};

/// Connected-wait budget: iterations of [`DEFAULT_WAIT_SLICE`].
pub const DEFAULT_WAIT_ITERATIONS: u32 = 20;

/// One slice of the connected-wait loop; the indicator LED toggles once per
/// non-connected slice.
pub const DEFAULT_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Provisioning poll budget.
pub const DEFAULT_PROVISION_ITERATIONS: u32 = 150;

/// Interval between provisioning polls.
pub const DEFAULT_PROVISION_INTERVAL: Duration = Duration::from_millis(2000);

/// How connectivity is established.
pub enum BringUpMode {
    /// Connect with fixed credentials.
    Station(Credentials),
    /// Acquire credentials through smartconfig provisioning.
    Provisioning,
}

/// Top-level startup task state.
pub struct BringUp<P, S> {
    controller: WifiController<P, S>,
    wait_iterations: u32,
    wait_slice: Duration,
    provision_iterations: u32,
    provision_interval: Duration,
    sync_retries: u32,
    sync_interval: Duration,
}

impl<P, S> BringUp<P, S>
where
    P: WifiPlatform + 'static,
    S: CredentialStore + 'static,
{
    pub fn new(controller: WifiController<P, S>) -> Self {
        Self {
            controller,
            wait_iterations: DEFAULT_WAIT_ITERATIONS,
            wait_slice: DEFAULT_WAIT_SLICE,
            provision_iterations: DEFAULT_PROVISION_ITERATIONS,
            provision_interval: DEFAULT_PROVISION_INTERVAL,
            sync_retries: sntp::DEFAULT_SYNC_RETRIES,
            sync_interval: sntp::DEFAULT_SYNC_INTERVAL,
        }
    }

    /// Override the connected-wait budget.
    pub fn with_wait_budget(mut self, iterations: u32, slice: Duration) -> Self {
        self.wait_iterations = iterations;
        self.wait_slice = slice;
        self
    }

    /// Override the provisioning poll budget.
    pub fn with_provision_budget(mut self, iterations: u32, interval: Duration) -> Self {
        self.provision_iterations = iterations;
        self.provision_interval = interval;
        self
    }

    /// Override the time-sync retry budget.
    pub fn with_sync_budget(mut self, retries: u32, interval: Duration) -> Self {
        self.sync_retries = retries;
        self.sync_interval = interval;
        self
    }

    pub fn controller(&self) -> &WifiController<P, S> {
        &self.controller
    }

    /// Establish connectivity, sync time, and invoke the demo entry point.
    ///
    /// Time sync failure is non-fatal. Returns whether the demo ran.
    pub fn run(
        &mut self,
        mode: BringUpMode,
        time: Option<&dyn TimeSync>,
        demo: impl FnOnce(),
    ) -> bool {
        info!("bring-up task start");

        let connected = match mode {
            BringUpMode::Station(credentials) => self.connect_station(&credentials),
            BringUpMode::Provisioning => self.run_provisioning(),
        };

        if !connected {
            error!("WiFi is not ready, check configuration");
            return false;
        }

        if let Some(time) = time {
            sntp::wait_for_sync(time, self.sync_retries, self.sync_interval);
        }

        info!("WiFi is ready, handing off to IoT demo");
        demo();
        true
    }

    /// Static-credential path: station mode plus a bounded connected wait.
    pub fn connect_station(&mut self, credentials: &Credentials) -> bool {
        if let Err(e) = self.controller.enter_station(credentials) {
            error!("station bring-up failed: {}", e);
            return false;
        }
        self.wait_for_wifi_ready()
    }

    /// Poll the event store for the connected flag, one slice at a time,
    /// toggling the indicator LED on each miss. Exhausting the budget
    /// clears the flag and reports failure.
    pub fn wait_for_wifi_ready(&self) -> bool {
        let events = self.controller.events();
        let mut led_on = false;

        for _ in 0..self.wait_iterations {
            if events.wait_connected(self.wait_slice) {
                info!("WiFi connected to AP");
                return true;
            }
            led_on = !led_on;
            self.controller.platform().set_indicator(led_on);
        }

        events.clear_connected();
        false
    }

    /// Provisioning path: start smartconfig (blocks until the link comes up
    /// or the handshake completes), then poll the link snapshot on a fixed
    /// interval until it reports up or the budget runs out.
    pub fn run_provisioning(&mut self) -> bool {
        match self.controller.start_smartconfig() {
            Ok(event) => debug!("smartconfig wait finished: {:?}", event),
            Err(e) => {
                error!("starting provisioning failed: {}", e);
                return false;
            }
        }

        for _ in 0..self.provision_iterations {
            if self.controller.is_sta_connected() {
                return true;
            }
            debug!("waiting for provisioning result...");
            std::thread::sleep(self.provision_interval);
        }
        self.controller.is_sta_connected()
    }
}
