//! IoT demo firmware binary.
//!
//! Brings up WiFi (static credentials by default, smartconfig with the
//! `provisioning` feature), syncs time over SNTP, then hands off to the
//! demo task.

#[cfg(feature = "esp32")]
fn main() {
    use std::sync::Arc;
    use std::time::Duration;

    use iot_bringup_esp32::platform::{EspWifiPlatform, NvsCredentialStore};
    use iot_bringup_esp32::sntp::EspTimeSync;
    use iot_bringup_esp32::{BringUp, BringUpMode, Credentials, WifiController};

    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Route the log crate through the ESP-IDF logger
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== IoT demo starting ===");

    let peripherals =
        esp_idf_hal::peripherals::Peripherals::take().expect("peripherals already taken");
    let sysloop =
        esp_idf_svc::eventloop::EspSystemEventLoop::take().expect("failed to take event loop");
    let nvs = esp_idf_svc::nvs::EspDefaultNvsPartition::take().expect("failed to take NVS");

    // GPIO2 drives the connectivity LED on the devkit
    let indicator = peripherals.pins.gpio2.downgrade_output();

    let platform = Arc::new(
        EspWifiPlatform::new(peripherals.modem, sysloop, nvs.clone(), Some(indicator))
            .expect("WiFi driver init failed"),
    );
    let credentials_store =
        Arc::new(NvsCredentialStore::new(nvs).expect("NVS credential store init failed"));

    let controller = WifiController::new(platform, credentials_store);
    let mut bringup = BringUp::new(controller);

    let mode = if cfg!(feature = "provisioning") {
        BringUpMode::Provisioning
    } else {
        let ssid = option_env!("DEMO_WIFI_SSID").unwrap_or("my-router");
        let password = option_env!("DEMO_WIFI_PASSWORD").unwrap_or("my-password");
        let credentials = Credentials::new(ssid, password).expect("invalid demo credentials");
        BringUpMode::Station(credentials)
    };

    let time = EspTimeSync::new().expect("SNTP init failed");

    let ok = bringup.run(mode, Some(&time), || {
        // Stand-in for the cloud IoT SDK entry point
        log::info!("IoT demo task running");
        loop {
            std::thread::sleep(Duration::from_secs(2));
            log::info!("heartbeat...");
        }
    });

    if !ok {
        log::error!("bring-up failed, demo task not started");
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo test' for host testing of the bring-up lifecycle.");
}
