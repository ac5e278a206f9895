//! Runs every `#[tap_test]` and prints TAP output.
//!
//! ```bash
//! # Host
//! cargo run --bin device-tests --features tap-tests
//!
//! # Host, only tests whose name contains "frame"
//! cargo run --bin device-tests --features tap-tests -- frame
//!
//! # Hardware
//! cargo espflash flash --bin device-tests --features esp32,tap-tests --release --monitor
//! ```

use protopixel_net::testing;

#[cfg(feature = "esp32")]
fn main() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let success = testing::run_all_tests();
    log::info!("Tests complete ({}). Halting.", if success { "PASS" } else { "FAIL" });
    loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let filter = std::env::args().nth(1);
    let success = testing::run_matching(filter.as_deref());
    std::process::exit(if success { 0 } else { 1 });
}
