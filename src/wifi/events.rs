//! Connectivity events and the event store.
//!
//! The event store is the only cross-task coordination point in the
//! bring-up lifecycle: the dispatcher sets and clears flags from the
//! platform's event-delivery context, while the bring-up task blocks on
//! them with a bounded timeout. Flags are guarded by a mutex and condvar
//! instead of a raw bit group, so waits are expressed as predicates over
//! named fields.
//!
//! Flag waits are consuming (an observed flag is cleared on return), which
//! matches the latch semantics the bring-up loop relies on. The separate
//! link-up snapshot is *not* consuming and is what external pollers read.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::config::Credentials;

/// Asynchronous platform event, as delivered to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// Station interface started.
    StaStart,
    /// Associated with an access point (no IP yet).
    StaConnected,
    /// Lost association with the access point.
    StaDisconnected,
    /// Station acquired an IP address.
    GotIp(Ipv4Addr),
    /// A client joined our soft-AP.
    ApStaConnected,
    /// A client left our soft-AP.
    ApStaDisconnected,
    /// Provisioning: channel scan finished.
    ScanDone,
    /// Provisioning: target channel located.
    FoundChannel,
    /// Provisioning: credentials received from the configuring app.
    GotCredentials(Credentials),
    /// Provisioning: acknowledgement sent back to the app.
    AckSent,
}

/// Outcome of a bounded wait on the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// The connected flag was observed (and consumed).
    Connected,
    /// The provisioning-done flag was observed (and consumed).
    ProvisioningDone,
    /// Neither flag appeared within the timeout.
    Timeout,
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    connected: bool,
    provisioning_done: bool,
    peer_disconnected: bool,
}

/// Shared connectivity state.
///
/// Written by the event dispatcher, read and cleared by the bring-up
/// sequencer and mode-transition code.
#[derive(Debug, Default)]
pub struct EventStore {
    flags: Mutex<Flags>,
    cond: Condvar,
    // Non-consuming mirror of the connected state for external polling.
    link_up: AtomicBool,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the station link as connected.
    pub fn set_connected(&self) {
        self.link_up.store(true, Ordering::SeqCst);
        self.set(|f| f.connected = true);
    }

    /// Clear the connected flag (disconnection or consumed timeout budget).
    pub fn clear_connected(&self) {
        self.link_up.store(false, Ordering::SeqCst);
        self.set(|f| f.connected = false);
    }

    /// Mark the provisioning handshake as complete.
    pub fn set_provisioning_done(&self) {
        self.set(|f| f.provisioning_done = true);
    }

    /// Mark that a soft-AP client disconnected.
    pub fn set_peer_disconnected(&self) {
        self.set(|f| f.peer_disconnected = true);
    }

    /// Consume the peer-disconnected flag.
    pub fn take_peer_disconnected(&self) -> bool {
        let mut flags = self.flags.lock().unwrap();
        std::mem::take(&mut flags.peer_disconnected)
    }

    /// Clear every flag. Used on mode transitions.
    pub fn clear_all(&self) {
        self.link_up.store(false, Ordering::SeqCst);
        self.set(|f| *f = Flags::default());
    }

    /// Non-consuming snapshot of the station link state.
    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    /// Block until the connected flag is set or `timeout` elapses.
    ///
    /// Consumes the flag when observed.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flags = self.flags.lock().unwrap();
        loop {
            if flags.connected {
                flags.connected = false;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cond.wait_timeout(flags, deadline - now).unwrap();
            flags = guard;
        }
    }

    /// Block until connected or provisioning-done is set.
    ///
    /// `timeout == None` waits indefinitely. Consumes whichever flag is
    /// observed; connected wins if both are set.
    pub fn wait_connected_or_done(&self, timeout: Option<Duration>) -> WaitEvent {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut flags = self.flags.lock().unwrap();
        loop {
            if flags.connected {
                flags.connected = false;
                return WaitEvent::Connected;
            }
            if flags.provisioning_done {
                flags.provisioning_done = false;
                return WaitEvent::ProvisioningDone;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitEvent::Timeout;
                    }
                    let (guard, _) = self.cond.wait_timeout(flags, deadline - now).unwrap();
                    flags = guard;
                }
                None => {
                    flags = self.cond.wait(flags).unwrap();
                }
            }
        }
    }

    fn set(&self, update: impl FnOnce(&mut Flags)) {
        let mut flags = self.flags.lock().unwrap();
        update(&mut flags);
        self.cond.notify_all();
    }
}
