//! Coordinator node: hosts the access point and applies light commands.
//!
//! - **Host**: `cargo run --bin coordinator` (simulated radio, real TCP)
//! - **ESP32**: `cargo espflash flash --bin coordinator --features esp32 --release`
//!
//! Listens on the command port, decodes frames from the peer and applies
//! them to the LED bank. Ctrl+C on the host shuts the node down cleanly.

use log::{error, info, warn};
use protopixel_net::config::TCP_COMMAND_PORT;
use protopixel_net::protocol::CommandServer;
use protopixel_net::{
    AddressEvent, EventSubscriptions, LedBank, LightDriver, LinkEvent, NodeLifecycle, Radio, Role,
    RoleConfig,
};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::sync::mpsc;

/// Number of LEDs driven by this node.
const LED_COUNT: usize = 8;

/// Frames buffered between the link and the LED driver.
const FRAME_QUEUE_DEPTH: usize = 16;

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

#[cfg(not(target_os = "espidf"))]
async fn shutdown_requested() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

// No console signal on the device; run until reset.
#[cfg(target_os = "espidf")]
async fn shutdown_requested() {
    std::future::pending::<()>().await;
}

fn subscriptions() -> EventSubscriptions {
    EventSubscriptions::none()
        .on_link(
            LinkEvent::AP_STARTED | LinkEvent::PEER_JOINED | LinkEvent::PEER_LEFT,
            |event| {
                info!("Link: {:?}", event);
                Ok(())
            },
        )
        .on_address(AddressEvent::PEER_ASSIGNED, |event| {
            info!("Address: {:?}", event);
            Ok(())
        })
}

async fn run<R: Radio>(node: &NodeLifecycle<R>) -> Result<(), BoxError> {
    node.initialize(Role::Coordinator, &RoleConfig::fixed(), subscriptions())?;
    info!("Coordinator {}", node.state());

    let server =
        CommandServer::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, TCP_COMMAND_PORT))).await?;
    let cancel = server.cancel_token();
    let (tx, mut rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    let serving = tokio::spawn(server.serve(tx));

    let mut leds = LedBank::new(LED_COUNT);
    let shutdown = shutdown_requested();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => match leds.apply(&frame) {
                    Ok(()) => info!("Applied: {}", frame),
                    Err(e) => warn!("Dropped command: {}", e),
                },
                None => break,
            },
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    cancel.cancel();
    match serving.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Command server ended with error: {}", e),
        Err(e) => warn!("Command server task failed: {}", e),
    }
    Ok(())
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

    info!("=== ProtoPixel coordinator starting ===");
    let node = NodeLifecycle::new(radio);

    let result = run(&node).await;
    if let Err(e) = &result {
        error!("Coordinator failed: {}", e);
    }

    if node.state().is_active() {
        if let Err(e) = node.shutdown() {
            error!("Shutdown failed: {}", e);
            std::process::exit(1);
        }
    }
    info!("Coordinator {}", node.state());

    if result.is_err() {
        std::process::exit(1);
    }
}
