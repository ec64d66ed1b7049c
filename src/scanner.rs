// src/scanner.rs

use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::sensor::{MANUFACTURER_PREFIX, PAYLOAD_LEN, SERVICE_ID};
use crate::sensor_data::Advertisement;
use rand::Rng;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Invoked once per received advertisement, on the scanner's own thread.
/// Must return promptly.
pub type AdvertisementCallback = Arc<dyn Fn(&Advertisement) + Send + Sync>;

/// Advertisement source. Duplicates are reported every time they are heard.
pub trait Scanner {
    fn is_scanning(&self) -> bool;
    fn start(&mut self, on_result: AdvertisementCallback) -> Result<()>;
}

/// Build an H5074 manufacturer payload
pub fn h5074_payload(temperature_c: f64, humidity_pct: f64, battery_pct: u8) -> [u8; PAYLOAD_LEN] {
    let temp = ((temperature_c * 100.0).round() as i16).to_le_bytes();
    let hum = ((humidity_pct * 100.0).round() as i16).to_le_bytes();
    [
        MANUFACTURER_PREFIX[0],
        MANUFACTURER_PREFIX[1],
        0x00,
        temp[0],
        temp[1],
        hum[0],
        hum[1],
        battery_pct,
        0x02,
    ]
}

#[derive(Debug, Clone)]
pub struct SimulatedBeacon {
    pub name: String,
    pub address: String,
}

/// Host stand-in for the radio: one thread that "hears" a random beacon
/// every scan interval, plus the odd unrelated device.
pub struct SimulatedScanner {
    config: ScannerConfig,
    beacons: Vec<SimulatedBeacon>,
    /// Stop after this long, as a radio error would; `None` scans forever
    run_for: Option<Duration>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedScanner {
    pub fn new(config: ScannerConfig, beacons: Vec<SimulatedBeacon>) -> Self {
        Self {
            config,
            beacons,
            run_for: None,
            handle: None,
        }
    }

    pub fn with_run_limit(mut self, run_for: Duration) -> Self {
        self.run_for = Some(run_for);
        self
    }

    pub fn default_beacons() -> Vec<SimulatedBeacon> {
        vec![
            SimulatedBeacon {
                name: "Govee_H5074_4B2C".to_string(),
                address: "a4:c1:38:5e:4b:2c".to_string(),
            },
            SimulatedBeacon {
                name: "Govee_H5074_91D0".to_string(),
                address: "a4:c1:38:0f:91:d0".to_string(),
            },
            SimulatedBeacon {
                name: String::new(),
                address: "e3:60:59:21:7a:04".to_string(),
            },
        ]
    }
}

fn random_advert<R: Rng>(rng: &mut R, beacons: &[SimulatedBeacon]) -> Advertisement {
    // roughly one in five advertisements is some other device
    if beacons.is_empty() || rng.random_bool(0.2) {
        return Advertisement {
            name: "LE-Headset".to_string(),
            address: "5c:f3:70:01:02:03".to_string(),
            service_uuid: Some("180f".to_string()),
            manufacturer_data: vec![0x4C, 0x00, 0x10, 0x05],
        };
    }

    let beacon = &beacons[rng.random_range(0..beacons.len())];
    let payload = h5074_payload(
        rng.random_range(15.0..30.0),
        rng.random_range(30.0..70.0),
        rng.random_range(60..=100),
    );
    Advertisement {
        name: beacon.name.clone(),
        address: beacon.address.clone(),
        service_uuid: Some(SERVICE_ID.to_string()),
        manufacturer_data: payload.to_vec(),
    }
}

impl Scanner for SimulatedScanner {
    fn is_scanning(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn start(&mut self, on_result: AdvertisementCallback) -> Result<()> {
        if self.is_scanning() {
            return Ok(());
        }
        let interval = Duration::from_millis(self.config.interval_ms.max(1));
        let beacons = self.beacons.clone();
        let run_for = self.run_for;

        log::info!(
            "Scan start: interval {}ms window {}ms {}",
            self.config.interval_ms,
            self.config.window_ms,
            if self.config.active { "active" } else { "passive" }
        );

        let handle = thread::Builder::new()
            .name("scanner".into())
            .spawn(move || {
                let mut rng = rand::rng();
                let started = Instant::now();
                let mut next_sample = Instant::now() + interval;

                while run_for.is_none_or(|limit| started.elapsed() < limit) {
                    on_result(&random_advert(&mut rng, &beacons));

                    let now = Instant::now();
                    if next_sample > now {
                        thread::sleep(next_sample - now);
                    }
                    next_sample += interval;
                }
                log::warn!("Scan stopped");
            })
            .map_err(Error::Spawn)?;
        self.handle = Some(handle);
        Ok(())
    }
}

/// Restart the scan if it has stopped. Returns true when a restart happened.
pub fn ensure_scanning<S: Scanner>(scanner: &mut S, on_result: &AdvertisementCallback) -> bool {
    if scanner.is_scanning() {
        return false;
    }
    match scanner.start(on_result.clone()) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Scan restart failed: {}", e);
            false
        }
    }
}

/// Keep the scanner running for the life of the process
pub fn supervise<S: Scanner>(
    mut scanner: S,
    on_result: AdvertisementCallback,
    check_every: Duration,
) -> ! {
    loop {
        ensure_scanning(&mut scanner, &on_result);
        thread::sleep(check_every);
    }
}
