//! Peer node: joins the coordinator's network and sends light commands.
//!
//! - **Host**: `cargo run --bin peer` (simulated radio; connects to the
//!   coordinator binary on localhost, or to `PROTOPIXEL_COORDINATOR`)
//! - **ESP32**: `cargo espflash flash --bin peer --features esp32 --release`
//!
//! Once associated, toggles each LED in turn and reconnects whenever the
//! command link drops.

use log::{error, info, warn};
use protopixel_net::config::TCP_COMMAND_PORT;
use protopixel_net::protocol::CommandClient;
use protopixel_net::{
    AddressEvent, CommandFrame, EventSubscriptions, LinkEvent, NodeLifecycle, Radio, Role,
    RoleConfig,
};
use std::net::SocketAddr;
use std::time::Duration;

/// LEDs on the coordinator to cycle through.
const LED_COUNT: u32 = 8;

const COMMAND_INTERVAL: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const ADDRESS_WAIT: Duration = Duration::from_secs(30);

type BoxError = Box<dyn std::error::Error>;

#[cfg(feature = "esp32")]
fn platform_init() -> Result<impl Radio, BoxError> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    Ok(protopixel_net::EspRadio::new(peripherals.modem))
}

#[cfg(not(feature = "esp32"))]
fn platform_init() -> Result<impl Radio, BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    Ok(protopixel_net::HostRadio::new())
}

#[cfg(feature = "esp32")]
fn coordinator_addr() -> Result<SocketAddr, BoxError> {
    Ok(SocketAddr::from((
        protopixel_net::config::COORDINATOR_ADDR,
        TCP_COMMAND_PORT,
    )))
}

// The simulated radio has no real access point; the coordinator binary
// listens on this machine unless told otherwise.
#[cfg(not(feature = "esp32"))]
fn coordinator_addr() -> Result<SocketAddr, BoxError> {
    match std::env::var("PROTOPIXEL_COORDINATOR") {
        Ok(addr) => Ok(addr.parse()?),
        Err(_) => Ok(SocketAddr::from((
            std::net::Ipv4Addr::LOCALHOST,
            TCP_COMMAND_PORT,
        ))),
    }
}

fn subscriptions() -> EventSubscriptions {
    EventSubscriptions::none()
        .on_link(
            LinkEvent::STA_CONNECTED | LinkEvent::STA_DISCONNECTED,
            |event| {
                info!("Link: {:?}", event);
                Ok(())
            },
        )
        .on_address(AddressEvent::ASSIGNED | AddressEvent::LOST, |event| {
            info!("Address: {:?}", event);
            Ok(())
        })
}

async fn wait_for_address<R: Radio>(node: &NodeLifecycle<R>) -> Result<(), BoxError> {
    let deadline = tokio::time::Instant::now() + ADDRESS_WAIT;
    while node.link_status().address.is_none() {
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("no address after {:?}", ADDRESS_WAIT).into());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Ok(())
}

/// Send toggles until the link breaks.
async fn drive(client: &mut CommandClient, next_led: &mut u32) -> Result<(), BoxError> {
    let mut ticker = tokio::time::interval(COMMAND_INTERVAL);
    loop {
        ticker.tick().await;
        let frame = CommandFrame::toggle(*next_led);
        client.send(&frame).await?;
        info!("Sent: {}", frame);
        *next_led = (*next_led + 1) % LED_COUNT;
    }
}

async fn run<R: Radio>(node: &NodeLifecycle<R>) -> Result<(), BoxError> {
    node.initialize(Role::Peer, &RoleConfig::fixed(), subscriptions())?;
    wait_for_address(node).await?;
    info!("Peer {} with {:?}", node.state(), node.link_status().address);

    let addr = coordinator_addr()?;
    let mut next_led = 0;
    loop {
        match CommandClient::connect(addr).await {
            Ok(mut client) => {
                info!("Connected to coordinator at {}", client.peer_addr());
                if let Err(e) = drive(&mut client, &mut next_led).await {
                    warn!("Command link lost: {}", e);
                }
            }
            Err(e) => warn!("Cannot reach coordinator at {}: {}", addr, e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let radio = match platform_init() {
        Ok(radio) => radio,
        Err(e) => {
            eprintln!("Platform init failed: {}", e);
            std::process::exit(1);
        }
    };

    info!("=== ProtoPixel peer starting ===");
    let node = NodeLifecycle::new(radio);

    let result = tokio::select! {
        result = run(&node) => result,
        _ = shutdown_requested() => {
            info!("Shutdown requested");
            Ok(())
        }
    };
    if let Err(e) = &result {
        error!("Peer failed: {}", e);
    }

    if node.state().is_active() {
        if let Err(e) = node.shutdown() {
            error!("Shutdown failed: {}", e);
            std::process::exit(1);
        }
    }

    if result.is_err() {
        std::process::exit(1);
    }
}

#[cfg(not(target_os = "espidf"))]
async fn shutdown_requested() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(target_os = "espidf")]
async fn shutdown_requested() {
    std::future::pending::<()>().await;
}
