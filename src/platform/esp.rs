//! ESP-IDF implementations of the platform traits.
//!
//! WiFi driver calls go through `esp_idf_svc`; smartconfig has no safe
//! wrapper, so its start/stop and SC_EVENT delivery use `esp_idf_sys`
//! directly. Events from the system event loop and from the smartconfig
//! engine are translated into [`WifiEvent`] and funnelled into whichever
//! handler is currently registered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
    WifiEvent as SysWifiEvent,
};
use esp_idf_sys::{esp, EspError};
use log::{debug, error};

use super::{ConfigStorage, CredentialStore, EventHandler, PlatformError, WifiPlatform};
use crate::wifi::{AccessPointConfig, Credentials, Mode, WifiEvent};

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for the stored credentials blob.
const NVS_KEY: &str = "credentials";

/// Maximum serialized credentials size:
/// `[ssid_len:1][ssid:32][password_len:1][password:64][bssid_flag:1][bssid:6]`
/// plus a small margin.
const MAX_BLOB_SIZE: usize = 1 + 32 + 1 + 64 + 1 + 6 + 4;

// The extern "C" smartconfig callback and the event-loop subscriptions both
// deliver into whatever handler is registered at that moment.
static ACTIVE_HANDLER: Mutex<Option<EventHandler>> = Mutex::new(None);

fn dispatch(event: &WifiEvent) {
    let handler = ACTIVE_HANDLER.lock().unwrap().clone();
    if let Some(handler) = handler {
        handler(event);
    }
}

fn status(e: EspError) -> PlatformError {
    PlatformError::new(e.code())
}

/// ESP-IDF WiFi platform.
pub struct EspWifiPlatform {
    wifi: Mutex<EspWifi<'static>>,
    sysloop: EspSystemEventLoop,
    // Last-applied client/AP configuration, recombined on mode changes.
    client_config: Mutex<ClientConfiguration>,
    ap_config: Mutex<AccessPointConfiguration>,
    mode: Mutex<Mode>,
    subscriptions: Mutex<Option<SubscriptionPair>>,
    sc_registered: AtomicBool,
    indicator: Mutex<Option<PinDriver<'static, AnyOutputPin, Output>>>,
}

type SubscriptionPair = (
    EspSubscription<'static, System>,
    EspSubscription<'static, System>,
);

impl EspWifiPlatform {
    /// Wrap the modem peripheral. `indicator` is the connectivity LED pin,
    /// if the board has one.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspNvsPartition<NvsDefault>,
        indicator: Option<AnyOutputPin>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        let indicator = match indicator {
            Some(pin) => Some(PinDriver::output(pin)?),
            None => None,
        };

        Ok(Self {
            wifi: Mutex::new(wifi),
            sysloop,
            client_config: Mutex::new(ClientConfiguration::default()),
            ap_config: Mutex::new(AccessPointConfiguration::default()),
            mode: Mutex::new(Mode::Station),
            subscriptions: Mutex::new(None),
            sc_registered: AtomicBool::new(false),
            indicator: Mutex::new(indicator),
        })
    }

    /// Rebuild the driver configuration from the cached mode and configs.
    fn apply_configuration(&self) -> Result<(), PlatformError> {
        let mode = *self.mode.lock().unwrap();
        let configuration = match mode {
            Mode::Station => Configuration::Client(self.client_config.lock().unwrap().clone()),
            Mode::AccessPoint => {
                Configuration::AccessPoint(self.ap_config.lock().unwrap().clone())
            }
            Mode::Mixed => Configuration::Mixed(
                self.client_config.lock().unwrap().clone(),
                self.ap_config.lock().unwrap().clone(),
            ),
        };
        self.wifi
            .lock()
            .unwrap()
            .set_configuration(&configuration)
            .map_err(status)
    }

    fn subscribe(&self) -> Result<(), PlatformError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.is_some() {
            return Ok(());
        }

        let wifi_subscription = self
            .sysloop
            .subscribe::<SysWifiEvent, _>(|event| {
                if let Some(translated) = translate_wifi_event(&event) {
                    dispatch(&translated);
                }
            })
            .map_err(status)?;

        let ip_subscription = self
            .sysloop
            .subscribe::<IpEvent, _>(|event| {
                if let Some(translated) = translate_ip_event(&event) {
                    dispatch(&translated);
                }
            })
            .map_err(status)?;

        *subscriptions = Some((wifi_subscription, ip_subscription));
        Ok(())
    }

    fn register_sc_events(&self) -> Result<(), PlatformError> {
        if self.sc_registered.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        esp!(unsafe {
            esp_idf_sys::esp_event_handler_register(
                esp_idf_sys::SC_EVENT,
                esp_idf_sys::ESP_EVENT_ANY_ID,
                Some(sc_event_trampoline),
                core::ptr::null_mut(),
            )
        })
        .map_err(status)
    }
}

impl WifiPlatform for EspWifiPlatform {
    fn init(&self) -> Result<(), PlatformError> {
        // Netif/event-loop/driver setup already happened when the driver
        // was constructed; nothing further is needed per process.
        debug!("network stack ready");
        Ok(())
    }

    fn register_handler(
        &self,
        handler: EventHandler,
    ) -> Result<Option<EventHandler>, PlatformError> {
        self.subscribe()?;
        self.register_sc_events()?;
        Ok(ACTIVE_HANDLER.lock().unwrap().replace(handler))
    }

    fn unregister_handler(&self) -> Option<EventHandler> {
        ACTIVE_HANDLER.lock().unwrap().take()
    }

    fn set_mode(&self, mode: Mode) -> Result<(), PlatformError> {
        *self.mode.lock().unwrap() = mode;
        self.apply_configuration()
    }

    fn set_storage(&self, storage: ConfigStorage) -> Result<(), PlatformError> {
        let storage = match storage {
            ConfigStorage::Ram => esp_idf_sys::wifi_storage_t_WIFI_STORAGE_RAM,
            ConfigStorage::Flash => esp_idf_sys::wifi_storage_t_WIFI_STORAGE_FLASH,
        };
        esp!(unsafe { esp_idf_sys::esp_wifi_set_storage(storage) }).map_err(status)
    }

    fn set_station_config(&self, credentials: &Credentials) -> Result<(), PlatformError> {
        let invalid = || PlatformError::new(esp_idf_sys::ESP_ERR_INVALID_ARG as i32);
        let config = ClientConfiguration {
            ssid: credentials.ssid().try_into().map_err(|_| invalid())?,
            password: credentials.password().try_into().map_err(|_| invalid())?,
            bssid: credentials.bssid(),
            auth_method: if credentials.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        *self.client_config.lock().unwrap() = config;
        self.apply_configuration()
    }

    fn set_access_point_config(&self, config: &AccessPointConfig) -> Result<(), PlatformError> {
        let invalid = || PlatformError::new(esp_idf_sys::ESP_ERR_INVALID_ARG as i32);
        let ap = AccessPointConfiguration {
            ssid: config.ssid.as_str().try_into().map_err(|_| invalid())?,
            password: config
                .password
                .as_deref()
                .unwrap_or("")
                .try_into()
                .map_err(|_| invalid())?,
            channel: config.channel,
            auth_method: if config.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPAWPA2Personal
            },
            max_connections: u16::from(config.max_connections),
            ..Default::default()
        };
        *self.ap_config.lock().unwrap() = ap;
        self.apply_configuration()
    }

    fn start(&self) -> Result<(), PlatformError> {
        self.wifi.lock().unwrap().start().map_err(status)
    }

    fn stop(&self) -> Result<(), PlatformError> {
        self.wifi.lock().unwrap().stop().map_err(status)
    }

    fn connect(&self) -> Result<(), PlatformError> {
        self.wifi.lock().unwrap().connect().map_err(status)
    }

    fn disconnect(&self) -> Result<(), PlatformError> {
        self.wifi.lock().unwrap().disconnect().map_err(status)
    }

    fn start_smartconfig(&self) -> Result<(), PlatformError> {
        esp!(unsafe {
            esp_idf_sys::esp_smartconfig_set_type(esp_idf_sys::smartconfig_type_t_SC_TYPE_ESPTOUCH)
        })
        .map_err(status)?;

        let config = esp_idf_sys::smartconfig_start_config_t::default();
        esp!(unsafe { esp_idf_sys::esp_smartconfig_start(&config) }).map_err(status)
    }

    fn stop_smartconfig(&self) -> Result<(), PlatformError> {
        esp!(unsafe { esp_idf_sys::esp_smartconfig_stop() }).map_err(status)
    }

    fn set_indicator(&self, on: bool) {
        if let Some(pin) = self.indicator.lock().unwrap().as_mut() {
            let result = if on { pin.set_high() } else { pin.set_low() };
            if let Err(e) = result {
                debug!("indicator pin write failed: {:?}", e);
            }
        }
    }
}

fn translate_wifi_event(event: &SysWifiEvent) -> Option<WifiEvent> {
    match event {
        SysWifiEvent::StaStarted => Some(WifiEvent::StaStart),
        SysWifiEvent::StaConnected(_) => Some(WifiEvent::StaConnected),
        SysWifiEvent::StaDisconnected(_) => Some(WifiEvent::StaDisconnected),
        SysWifiEvent::ApStaConnected(_) => Some(WifiEvent::ApStaConnected),
        SysWifiEvent::ApStaDisconnected(_) => Some(WifiEvent::ApStaDisconnected),
        _ => None,
    }
}

fn translate_ip_event(event: &IpEvent) -> Option<WifiEvent> {
    match event {
        IpEvent::DhcpIpAssigned(assignment) => Some(WifiEvent::GotIp(assignment.ip())),
        _ => None,
    }
}

unsafe extern "C" fn sc_event_trampoline(
    _arg: *mut core::ffi::c_void,
    _event_base: esp_idf_sys::esp_event_base_t,
    event_id: i32,
    event_data: *mut core::ffi::c_void,
) {
    let event = match event_id as u32 {
        esp_idf_sys::smartconfig_event_t_SC_EVENT_SCAN_DONE => WifiEvent::ScanDone,
        esp_idf_sys::smartconfig_event_t_SC_EVENT_FOUND_CHANNEL => WifiEvent::FoundChannel,
        esp_idf_sys::smartconfig_event_t_SC_EVENT_GOT_SSID_PSWD => {
            let data = &*(event_data as *const esp_idf_sys::smartconfig_event_got_ssid_pswd_t);
            match credentials_from_event(data) {
                Some(credentials) => WifiEvent::GotCredentials(credentials),
                None => return,
            }
        }
        esp_idf_sys::smartconfig_event_t_SC_EVENT_SEND_ACK_DONE => WifiEvent::AckSent,
        _ => return,
    };
    dispatch(&event);
}

fn credentials_from_event(
    data: &esp_idf_sys::smartconfig_event_got_ssid_pswd_t,
) -> Option<Credentials> {
    let ssid = String::from_utf8(nul_trimmed(&data.ssid).to_vec()).ok()?;
    let password = String::from_utf8(nul_trimmed(&data.password).to_vec()).ok()?;

    let credentials = match Credentials::new(ssid, password) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("provisioned credentials rejected: {}", e);
            return None;
        }
    };

    if data.bssid_set {
        Some(credentials.with_bssid(data.bssid))
    } else {
        Some(credentials)
    }
}

/// The smartconfig payload buffers are fixed-size and NUL-padded.
fn nul_trimmed(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// NVS-backed credential persistence.
pub struct NvsCredentialStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsCredentialStore {
    /// Open the WiFi configuration namespace on the default partition.
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }
}

impl CredentialStore for NvsCredentialStore {
    fn save(&self, credentials: &Credentials) -> Result<(), PlatformError> {
        self.nvs
            .lock()
            .unwrap()
            .set_raw(NVS_KEY, &credentials.to_bytes())
            .map_err(status)
    }

    fn load(&self) -> Option<Credentials> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        let nvs = self.nvs.lock().unwrap();
        let bytes = nvs.get_raw(NVS_KEY, &mut buf).ok()??;
        Credentials::from_bytes(bytes).ok()
    }

    fn clear(&self) -> Result<(), PlatformError> {
        self.nvs
            .lock()
            .unwrap()
            .remove(NVS_KEY)
            .map(|_| ())
            .map_err(status)
    }
}
