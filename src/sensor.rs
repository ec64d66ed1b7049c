// src/sensor.rs

//! Decoder for Govee H5074 thermometer/hygrometer advertisements.
//!
//! Runs inside the scanner's callback context, so it never blocks and only
//! allocates the label of an accepted reading.

use crate::sensor_data::{Advertisement, SensorReading};

/// 16-bit service UUID advertised by the H5074
pub const SERVICE_ID: &str = "ec88";
/// Same service expanded onto the Bluetooth base UUID
const SERVICE_ID_FULL: &str = "0000ec88-0000-1000-8000-00805f9b34fb";

pub const PAYLOAD_LEN: usize = 9;
pub const MANUFACTURER_PREFIX: [u8; 2] = [0x88, 0xEC];

/// Values carried by a matching payload, before a label is attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_pct: u8,
}

pub fn service_matches(service_id: &str) -> bool {
    service_id.eq_ignore_ascii_case(SERVICE_ID) || service_id.eq_ignore_ascii_case(SERVICE_ID_FULL)
}

/// Decode a manufacturer payload. `None` is a filter miss, not an error.
///
/// Layout: `[0x88, 0xEC, reserved, temp_lo, temp_hi, hum_lo, hum_hi, battery, flags]`,
/// temperature and humidity in hundredths as signed little-endian.
pub fn decode_payload(service_id: &str, payload: &[u8]) -> Option<RawReading> {
    if !service_matches(service_id) {
        return None;
    }
    if payload.len() != PAYLOAD_LEN || payload[..2] != MANUFACTURER_PREFIX {
        return None;
    }

    let temp_raw = i16::from_le_bytes([payload[3], payload[4]]);
    let hum_raw = i16::from_le_bytes([payload[5], payload[6]]);

    Some(RawReading {
        temperature_c: f64::from(temp_raw) / 100.0,
        humidity_pct: f64::from(hum_raw) / 100.0,
        battery_pct: payload[7],
    })
}

pub fn decode(advert: &Advertisement) -> Option<SensorReading> {
    let service_id = advert.service_uuid.as_deref()?;
    let raw = decode_payload(service_id, &advert.manufacturer_data)?;

    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "{} {} {} {:.2} {:.2} {}",
            advert.name,
            advert.address,
            hex(&advert.manufacturer_data),
            raw.temperature_c,
            raw.humidity_pct,
            raw.battery_pct
        );
    }

    Some(SensorReading {
        device_label: advert.label().to_string(),
        temperature_c: raw.temperature_c,
        humidity_pct: raw.humidity_pct,
        battery_pct: raw.battery_pct,
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
