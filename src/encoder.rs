// src/encoder.rs

//! JSON wire encoding. A message is either the whole document or nothing:
//! anything longer than the slot size is refused rather than truncated.
//!
//! Sensor schema (keys namespaced by device label):
//! `{"D": device, "<label>/tempInC": 18.37, "<label>/humidity": 51.82, "<label>/battery": 97}`
//!
//! Heartbeat schema:
//! `{"D": device, "T": uptime, "R": heartbeat headroom, "W": transmit headroom, "H": free, "M": min free}`
//!
//! Numbers are written in serde_json's shortest round-trip form, so a reading
//! of 20.00 goes out as `20.0` and 18.30 as `18.3`. Parsing the text back
//! always gives the value to at least two decimals.

use crate::error::{Error, Result};
use crate::queue::Message;
use crate::sensor_data::{HeartbeatStatus, SensorReading};
use serde_json::{Map, Value, json};

/// Ordered key/value set handed to the encoder
pub type Fields = Map<String, Value>;

pub const KEY_DEVICE: &str = "D";
pub const KEY_UPTIME: &str = "T";
pub const KEY_PRODUCER_STACK: &str = "R";
pub const KEY_CONSUMER_STACK: &str = "W";
pub const KEY_FREE_HEAP: &str = "H";
pub const KEY_MIN_FREE_HEAP: &str = "M";

pub fn encode(fields: &Fields, max_len: usize) -> Result<Message> {
    let bytes = serde_json::to_vec(fields)?;
    crate::stack::mark_current();
    if bytes.len() > max_len {
        return Err(Error::Overflow {
            len: bytes.len(),
            max: max_len,
        });
    }
    Message::new(&bytes, max_len)
}

pub fn reading_fields(reading: &SensorReading, device_name: &str) -> Fields {
    let label = &reading.device_label;
    let mut fields = Fields::new();
    fields.insert(KEY_DEVICE.into(), json!(device_name));
    fields.insert(format!("{}/tempInC", label), json!(reading.temperature_c));
    fields.insert(format!("{}/humidity", label), json!(reading.humidity_pct));
    fields.insert(format!("{}/battery", label), json!(reading.battery_pct));
    fields
}

pub fn heartbeat_fields(status: &HeartbeatStatus) -> Fields {
    let mut fields = Fields::new();
    fields.insert(KEY_DEVICE.into(), json!(status.device_name));
    fields.insert(KEY_UPTIME.into(), json!(status.uptime_text));
    fields.insert(KEY_PRODUCER_STACK.into(), json!(status.stack_headroom.producer));
    fields.insert(KEY_CONSUMER_STACK.into(), json!(status.stack_headroom.consumer));
    fields.insert(KEY_FREE_HEAP.into(), json!(status.free_heap_bytes));
    fields.insert(KEY_MIN_FREE_HEAP.into(), json!(status.min_free_heap_bytes));
    fields
}

pub fn encode_reading(
    reading: &SensorReading,
    device_name: &str,
    max_len: usize,
) -> Result<Message> {
    encode(&reading_fields(reading, device_name), max_len)
}

pub fn encode_heartbeat(status: &HeartbeatStatus, max_len: usize) -> Result<Message> {
    encode(&heartbeat_fields(status), max_len)
}
