//! ESP-IDF radio backend.
//!
//! Drives the ESP32 WiFi driver in access point (coordinator) or station
//! (peer) mode, and translates the system event loop's WiFi and IP events
//! into [`LinkEvent`]s and [`AddressEvent`]s.

use super::{Radio, RadioFault, StorageFault};
use crate::config::{AuthMode, RoleConfig};
use crate::events::{AddressEvent, EventCategory, EventSink, LinkEvent};
use crate::lifecycle::Role;
use esp_idf_hal::modem::Modem;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent,
};
use esp_idf_sys::{self as sys, EspError};
use log::{debug, info};

/// WiFi radio on ESP32.
pub struct EspRadio {
    modem: Modem,
    nvs: Option<EspDefaultNvsPartition>,
    sysloop: Option<EspSystemEventLoop>,
    wifi: Option<EspWifi<'static>>,
    role: Option<Role>,
    subscriptions: Vec<EspSubscription<'static, System>>,
}

impl EspRadio {
    /// Create the radio from the modem peripheral.
    ///
    /// Nothing is initialized until the lifecycle drives it.
    pub fn new(modem: Modem) -> Self {
        Self {
            modem,
            nvs: None,
            sysloop: None,
            wifi: None,
            role: None,
            subscriptions: Vec::new(),
        }
    }

    fn wifi_mut(&mut self, op: &'static str) -> Result<&mut EspWifi<'static>, RadioFault> {
        self.wifi
            .as_mut()
            .ok_or_else(|| RadioFault::new(op, "WiFi driver not initialized"))
    }
}

fn fault(op: &'static str) -> impl FnOnce(EspError) -> RadioFault {
    move |e| RadioFault::new(op, format!("{:?}", e))
}

fn auth_method(mode: AuthMode) -> AuthMethod {
    match mode {
        AuthMode::Open => AuthMethod::None,
        AuthMode::Wpa2Personal => AuthMethod::WPA2Personal,
        AuthMode::Wpa3Personal => AuthMethod::WPA3Personal,
        AuthMode::Wpa2Wpa3Personal => AuthMethod::WPA2WPA3Personal,
    }
}

fn wifi_configuration(role: Role, config: &RoleConfig) -> Result<Configuration, RadioFault> {
    const OP: &str = "apply configuration";
    let ssid = config
        .ssid()
        .try_into()
        .map_err(|_| RadioFault::new(OP, "SSID does not fit the driver"))?;
    let password = config
        .passphrase()
        .try_into()
        .map_err(|_| RadioFault::new(OP, "passphrase does not fit the driver"))?;
    let auth_method = auth_method(config.auth_mode());

    Ok(match role {
        Role::Coordinator => Configuration::AccessPoint(AccessPointConfiguration {
            ssid,
            password,
            channel: config.channel(),
            auth_method,
            max_connections: config.max_peers().into(),
            ..Default::default()
        }),
        Role::Peer => Configuration::Client(ClientConfiguration {
            ssid,
            password,
            channel: Some(config.channel()),
            auth_method,
            ..Default::default()
        }),
    })
}

fn translate_wifi(event: WifiEvent<'_>) -> Option<LinkEvent> {
    Some(match event {
        WifiEvent::ApStarted => LinkEvent::AccessPointStarted,
        WifiEvent::ApStopped => LinkEvent::AccessPointStopped,
        WifiEvent::ApStaConnected(sta) => LinkEvent::PeerJoined { mac: sta.mac() },
        WifiEvent::ApStaDisconnected(sta) => LinkEvent::PeerLeft { mac: sta.mac() },
        WifiEvent::StaStarted => LinkEvent::StationStarted,
        WifiEvent::StaConnected(_) => LinkEvent::StationConnected,
        WifiEvent::StaDisconnected(_) => LinkEvent::StationDisconnected,
        WifiEvent::StaStopped => LinkEvent::StationStopped,
        _ => return None,
    })
}

fn translate_ip(event: IpEvent<'_>) -> Option<AddressEvent> {
    Some(match event {
        IpEvent::DhcpIpAssigned(assignment) => AddressEvent::Assigned {
            ip: assignment.ip(),
        },
        IpEvent::DhcpIpDeassigned(_) => AddressEvent::Lost,
        IpEvent::ApStaIpAssigned(assignment) => AddressEvent::PeerAssigned {
            ip: assignment.ip(),
        },
        _ => return None,
    })
}

impl Radio for EspRadio {
    fn prepare_persistent_storage(&mut self) -> Result<(), StorageFault> {
        const OP: &str = "prepare storage";
        let code = unsafe { sys::nvs_flash_init() };
        match code {
            sys::ESP_OK => {}
            sys::ESP_ERR_NVS_NO_FREE_PAGES | sys::ESP_ERR_NVS_NEW_VERSION_FOUND => {
                return Err(StorageFault::Stale(RadioFault::new(
                    OP,
                    format!("nvs_flash_init returned {}", code),
                )));
            }
            other => {
                return Err(StorageFault::Fatal(RadioFault::new(
                    OP,
                    format!("nvs_flash_init returned {}", other),
                )));
            }
        }

        if self.nvs.is_none() {
            let partition = EspDefaultNvsPartition::take()
                .map_err(|e| StorageFault::Fatal(fault(OP)(e)))?;
            self.nvs = Some(partition);
        }
        Ok(())
    }

    fn erase_persistent_storage(&mut self) -> Result<(), RadioFault> {
        info!("Erasing NVS partition");
        sys::esp!(unsafe { sys::nvs_flash_erase() }).map_err(fault("erase storage"))
    }

    fn start_base_network_stack(&mut self) -> Result<(), RadioFault> {
        const OP: &str = "start network stack";
        if self.sysloop.is_none() {
            self.sysloop = Some(EspSystemEventLoop::take().map_err(fault(OP))?);
        }
        if self.wifi.is_none() {
            let sysloop = self
                .sysloop
                .clone()
                .ok_or_else(|| RadioFault::new(OP, "event loop missing"))?;
            // SAFETY: the modem is only ever driven by one EspWifi at a time;
            // the previous driver (if any) was dropped in `release`.
            let modem = unsafe { self.modem.clone_unchecked() };
            let wifi = EspWifi::new(modem, sysloop, self.nvs.clone()).map_err(fault(OP))?;
            self.wifi = Some(wifi);
        }
        debug!("WiFi driver initialized");
        Ok(())
    }

    fn subscribe(&mut self, category: EventCategory, sink: EventSink) -> Result<(), RadioFault> {
        const OP: &str = "subscribe";
        let sysloop = self
            .sysloop
            .as_ref()
            .ok_or_else(|| RadioFault::new(OP, "event loop not running"))?;

        let subscription = match category {
            EventCategory::Link => sysloop.subscribe::<WifiEvent, _>(move |event| {
                if let Some(link) = translate_wifi(event) {
                    sink.post_link(link);
                }
            }),
            EventCategory::Address => sysloop.subscribe::<IpEvent, _>(move |event| {
                if let Some(address) = translate_ip(event) {
                    sink.post_address(address);
                }
            }),
        }
        .map_err(fault(OP))?;

        self.subscriptions.push(subscription);
        Ok(())
    }

    fn apply_role_configuration(
        &mut self,
        role: Role,
        config: &RoleConfig,
    ) -> Result<(), RadioFault> {
        let wifi_config = wifi_configuration(role, config)?;
        self.wifi_mut("apply configuration")?
            .set_configuration(&wifi_config)
            .map_err(fault("apply configuration"))?;
        self.role = Some(role);
        info!("WiFi configured as {} for '{}'", role, config.ssid());
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioFault> {
        let role = self.role;
        let wifi = self.wifi_mut("start")?;
        wifi.start().map_err(fault("start"))?;
        if role == Some(Role::Peer) {
            wifi.connect().map_err(fault("connect"))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioFault> {
        self.wifi_mut("stop")?.stop().map_err(fault("stop"))
    }

    fn release(&mut self) -> Result<(), RadioFault> {
        const OP: &str = "release";
        if let Some(wifi) = self.wifi.as_mut() {
            // Dropping the driver panics if deinit fails, and deinit fails
            // while connected or started.
            if wifi.is_connected().map_err(fault(OP))? {
                wifi.disconnect().map_err(fault(OP))?;
            }
            if wifi.is_started().map_err(fault(OP))? {
                wifi.stop().map_err(fault(OP))?;
            }
        }

        self.subscriptions.clear();
        self.wifi = None;
        self.role = None;
        debug!("WiFi driver released");
        Ok(())
    }
}

#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use protopixel_net_macros::tap_test;

    #[tap_test]
    fn auth_modes_map_to_driver() {
        assert!(matches!(auth_method(AuthMode::Open), AuthMethod::None));
        assert!(matches!(
            auth_method(AuthMode::Wpa2Personal),
            AuthMethod::WPA2Personal
        ));
    }

    #[tap_test]
    fn release_brings_running_driver_down() -> crate::testing::TestResult {
        // SAFETY: no other driver holds the modem while the test runs.
        let mut radio = EspRadio::new(unsafe { Modem::new() });
        radio.prepare_persistent_storage()?;
        if let Err(e) = radio.start_base_network_stack() {
            // QEMU has no WiFi hardware.
            log::warn!("WiFi unavailable, nothing to release: {}", e);
            return Ok(());
        }
        radio.apply_role_configuration(Role::Coordinator, &RoleConfig::fixed())?;
        radio.start()?;

        radio.release()?;
        assert!(radio.wifi.is_none());
        assert!(radio.subscriptions.is_empty());

        // The driver can be brought up again and released twice.
        radio.start_base_network_stack()?;
        radio.release()?;
        radio.release()?;
        Ok(())
    }

    #[tap_test]
    fn coordinator_configuration_is_access_point() {
        let config = wifi_configuration(Role::Coordinator, &RoleConfig::fixed()).unwrap();
        assert!(matches!(config, Configuration::AccessPoint(_)));
    }
}
