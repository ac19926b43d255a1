//! Time synchronization.
//!
//! Bring-up treats time sync as best-effort: the sequencer polls the sync
//! status for a bounded number of retries and proceeds either way.

use std::time::Duration;

use log::{debug, info, warn};

/// Default retry budget, one second apart.
pub const DEFAULT_SYNC_RETRIES: u32 = 10;

/// Default polling interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// SNTP server pool polled by the device.
pub const SNTP_SERVERS: [&str; 4] = [
    "time1.cloud.tencent.com",
    "cn.pool.ntp.org",
    "time-a.nist.gov",
    "cn.ntp.org.cn",
];

/// Timezone applied alongside SNTP; the demo backend runs in UTC+8.
pub const SNTP_TIMEZONE: &std::ffi::CStr = c"CST-8";

/// Fill the IDF-provided server slots from [`SNTP_SERVERS`].
///
/// The slot count is `CONFIG_LWIP_SNTP_MAX_SERVERS` and may be smaller
/// than the pool; extra pool entries are dropped, extra slots keep their
/// defaults.
#[cfg(any(test, feature = "esp32"))]
fn assign_servers(slots: &mut [&str]) {
    for (slot, server) in slots.iter_mut().zip(SNTP_SERVERS) {
        *slot = server;
    }
}

/// A time service whose synchronization state can be polled.
pub trait TimeSync {
    /// Whether the system clock has been set from the network.
    fn is_synchronized(&self) -> bool;
}

/// Poll `time` until it reports synchronized, up to `retries` attempts
/// spaced `interval` apart. Returns the final synchronization state.
pub fn wait_for_sync(time: &dyn TimeSync, retries: u32, interval: Duration) -> bool {
    for attempt in 1..=retries {
        if time.is_synchronized() {
            info!("system time synchronized");
            return true;
        }
        debug!(
            "waiting for system time to be set... ({}/{})",
            attempt, retries
        );
        std::thread::sleep(interval);
    }

    let synced = time.is_synchronized();
    if !synced {
        warn!("time sync did not complete within {} retries", retries);
    }
    synced
}

/// SNTP-backed time sync on ESP-IDF.
///
/// Polls the [`SNTP_SERVERS`] pool (as many entries as the IDF build
/// exposes slots for) and sets the [`SNTP_TIMEZONE`] for local-time
/// conversions.
#[cfg(feature = "esp32")]
pub struct EspTimeSync {
    sntp: esp_idf_svc::sntp::EspSntp<'static>,
}

#[cfg(feature = "esp32")]
impl EspTimeSync {
    /// Start the SNTP service in poll mode.
    pub fn new() -> Result<Self, esp_idf_sys::EspError> {
        let mut conf = esp_idf_svc::sntp::SntpConf::default();
        assign_servers(&mut conf.servers);
        let sntp = esp_idf_svc::sntp::EspSntp::new(&conf)?;

        unsafe {
            esp_idf_sys::setenv(b"TZ\0".as_ptr().cast(), SNTP_TIMEZONE.as_ptr().cast(), 1);
            esp_idf_sys::tzset();
        }

        Ok(Self { sntp })
    }
}

#[cfg(feature = "esp32")]
impl TimeSync for EspTimeSync {
    fn is_synchronized(&self) -> bool {
        self.sntp.get_sync_status() == esp_idf_svc::sntp::SyncStatus::Completed
    }
}
