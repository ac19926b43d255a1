//! Translation of platform events into connectivity state.
//!
//! A single dispatcher instance is registered as the platform's event
//! handler. Every event becomes a log line plus a flag update in the
//! [`EventStore`]; the provisioning credentials event additionally applies
//! and persists the new credentials and issues a connect request.
//!
//! The event-delivery mechanism has no return channel, so platform calls
//! that fail here are logged with their status code and otherwise
//! swallowed. A persistent failure shows up later as an absent connected
//! flag at the sequencer's timeout.

use std::sync::Arc;

use log::{debug, error, info, warn};

use super::config::Credentials;
use super::events::{EventStore, WifiEvent};
use crate::platform::{CredentialStore, EventHandler, WifiPlatform};

pub struct EventDispatcher<P, S> {
    platform: Arc<P>,
    events: Arc<EventStore>,
    credentials: Arc<S>,
}

impl<P, S> EventDispatcher<P, S>
where
    P: WifiPlatform + 'static,
    S: CredentialStore + 'static,
{
    pub fn new(platform: Arc<P>, events: Arc<EventStore>, credentials: Arc<S>) -> Self {
        Self {
            platform,
            events,
            credentials,
        }
    }

    /// Erase the dispatcher into a registrable callback.
    pub fn handler(self: &Arc<Self>) -> EventHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |event| dispatcher.handle(event))
    }

    /// Process one platform event.
    pub fn handle(&self, event: &WifiEvent) {
        match event {
            WifiEvent::StaStart => {
                info!("station interface started");
            }
            WifiEvent::StaConnected => {
                // Associated, but connectivity means an IP address.
                info!("associated with AP, waiting for IP");
                self.events.clear_connected();
            }
            WifiEvent::StaDisconnected => {
                info!("disconnected from AP");
                self.events.clear_connected();
            }
            WifiEvent::GotIp(ip) => {
                info!("station got IPv4 [{}]", ip);
                self.events.set_connected();
            }
            WifiEvent::ApStaConnected => {
                info!("client joined soft-AP");
            }
            WifiEvent::ApStaDisconnected => {
                info!("client left soft-AP");
                self.events.set_peer_disconnected();
            }
            WifiEvent::ScanDone => {
                debug!("provisioning scan done");
            }
            WifiEvent::FoundChannel => {
                debug!("provisioning found channel");
            }
            WifiEvent::GotCredentials(credentials) => {
                info!("provisioning delivered credentials for {}", credentials.ssid());
                self.apply_credentials(credentials);
            }
            WifiEvent::AckSent => {
                warn!("provisioning ack sent, handshake complete");
                self.events.set_provisioning_done();
            }
        }
    }

    /// Switch the station link over to freshly provisioned credentials.
    ///
    /// The connect request is fired regardless of whether the persist
    /// succeeded; durability is not a precondition for connectivity.
    fn apply_credentials(&self, credentials: &Credentials) {
        if let Err(e) = self.platform.disconnect() {
            error!("disconnect failed: {}", e);
        }

        if let Err(e) = self.platform.set_station_config(credentials) {
            error!("set station config failed: {}", e);
        }

        if let Err(e) = self.credentials.save(credentials) {
            error!("persisting credentials failed: {}", e);
        }

        if let Err(e) = self.platform.connect() {
            error!("connect failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MemoryCredentialStore, MockPlatform};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn fixture() -> (
        Arc<MockPlatform>,
        Arc<EventStore>,
        Arc<MemoryCredentialStore>,
        EventDispatcher<MockPlatform, MemoryCredentialStore>,
    ) {
        let platform = Arc::new(MockPlatform::new());
        let events = Arc::new(EventStore::new());
        let store = Arc::new(MemoryCredentialStore::new());
        let dispatcher = EventDispatcher::new(
            Arc::clone(&platform),
            Arc::clone(&events),
            Arc::clone(&store),
        );
        (platform, events, store, dispatcher)
    }

    #[test]
    fn test_connected_tracks_most_recent_event() {
        let (_platform, events, _store, dispatcher) = fixture();

        dispatcher.handle(&WifiEvent::GotIp(Ipv4Addr::new(192, 168, 1, 7)));
        assert!(events.is_link_up());

        dispatcher.handle(&WifiEvent::StaDisconnected);
        assert!(!events.is_link_up());

        dispatcher.handle(&WifiEvent::GotIp(Ipv4Addr::new(192, 168, 1, 7)));
        assert!(events.is_link_up());
        assert!(events.wait_connected(Duration::from_millis(10)));
    }

    #[test]
    fn test_association_alone_is_not_connected() {
        let (_platform, events, _store, dispatcher) = fixture();
        dispatcher.handle(&WifiEvent::StaConnected);
        assert!(!events.is_link_up());
        assert!(!events.wait_connected(Duration::from_millis(10)));
    }

    #[test]
    fn test_credentials_then_ack_persists_last_pair() {
        let (platform, events, store, dispatcher) = fixture();

        let first = Credentials::new("FirstNet", "firstpass").unwrap();
        let second = Credentials::new("SecondNet", "secondpass").unwrap();
        dispatcher.handle(&WifiEvent::GotCredentials(first));
        dispatcher.handle(&WifiEvent::GotCredentials(second.clone()));
        dispatcher.handle(&WifiEvent::AckSent);

        assert_eq!(
            events.wait_connected_or_done(Some(Duration::from_millis(10))),
            crate::wifi::WaitEvent::ProvisioningDone
        );
        assert_eq!(store.load(), Some(second.clone()));
        assert_eq!(store.history().last(), Some(&second));
        // disconnect/config/connect issued for each credentials delivery
        let calls = platform.calls();
        assert_eq!(calls.iter().filter(|c| *c == "connect").count(), 2);
        assert_eq!(calls.iter().filter(|c| *c == "disconnect").count(), 2);
    }

    #[test]
    fn test_platform_failures_are_swallowed() {
        let (platform, _events, store, dispatcher) = fixture();
        platform.fail_on("disconnect", -3);
        platform.fail_on("connect", -7);

        let credentials = Credentials::new("Net", "password1").unwrap();
        dispatcher.handle(&WifiEvent::GotCredentials(credentials.clone()));

        // Persist still happened despite the surrounding failures
        assert_eq!(store.load(), Some(credentials));
    }

    #[test]
    fn test_persist_failure_does_not_block_connect() {
        let (platform, _events, store, dispatcher) = fixture();
        store.fail_with(-11);

        let credentials = Credentials::new("Net", "password1").unwrap();
        dispatcher.handle(&WifiEvent::GotCredentials(credentials));

        // The connect request still goes out; durability is best-effort
        assert!(platform.calls().contains(&"connect".to_string()));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_ap_peer_disconnect_sets_flag() {
        let (_platform, events, _store, dispatcher) = fixture();
        dispatcher.handle(&WifiEvent::ApStaConnected);
        assert!(!events.take_peer_disconnected());
        dispatcher.handle(&WifiEvent::ApStaDisconnected);
        assert!(events.take_peer_disconnected());
    }
}
