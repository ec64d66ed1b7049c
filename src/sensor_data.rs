// src/sensor_data.rs

use serde::{Deserialize, Serialize};

/// One advertisement as delivered by the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub name: String,
    pub address: String,
    pub service_uuid: Option<String>,
    pub manufacturer_data: Vec<u8>,
}

impl Advertisement {
    /// Advertised name, or the address for beacons that do not send one
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_label: String,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_pct: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackHeadroom {
    /// Heartbeat task
    pub producer: usize,
    /// Transmit task
    pub consumer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub device_name: String,
    pub uptime_text: String,
    pub stack_headroom: StackHeadroom,
    pub free_heap_bytes: u64,
    pub min_free_heap_bytes: u64,
}
