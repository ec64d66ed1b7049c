// src/main.rs

use beacon_relay::config::Config;
use beacon_relay::downlink::UdpBroadcastTransport;
use beacon_relay::pipeline::Pipeline;
use beacon_relay::scanner::{AdvertisementCallback, SimulatedScanner, supervise};
use beacon_relay::sensor_data::Advertisement;
use chrono::Utc;
use std::env;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// `beacon-relay <path>`, `--config <path>` or `-c <path>`; built-in defaults otherwise
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }
    None
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(buf, "[{}] {} {}", Utc::now(), record.level(), record.args())
        })
        .init();
}

fn main() {
    let config = match parse_config_path() {
        Some(path) => match Config::from_file(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("[{}] Failed to load config {}: {}", Utc::now(), path, e);
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    init_logging(&config.logging.level);
    log::info!("{} is now awake", config.device_name);

    let pipeline = UdpBroadcastTransport::from_config(&config.transport)
        .and_then(|transport| {
            log::info!("Broadcasting to {}", transport.target());
            Pipeline::start(&config, transport)
        });
    let pipeline = match pipeline {
        Ok(p) => p,
        Err(e) => {
            log::error!("Forwarding init failed: {}", e);
            process::exit(1);
        }
    };

    let ctx = pipeline.context();
    let on_result: AdvertisementCallback = Arc::new(move |advert: &Advertisement| {
        ctx.on_advertisement(advert);
    });

    let scanner =
        SimulatedScanner::new(config.scanner.clone(), SimulatedScanner::default_beacons());
    supervise(
        scanner,
        on_result,
        Duration::from_millis(config.scanner.restart_check_ms),
    )
}
