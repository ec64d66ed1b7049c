// src/lib.rs

//! Relays Govee H5074 sensor advertisements and periodic heartbeats over a
//! broadcast link.
//!
//! advertisement -> [`sensor::decode`] -> [`encoder`] -> [`queue::OutboundQueue`]
//! -> [`downlink::transmit_loop`] -> [`downlink::Transport`]
//!
//! The heartbeat task feeds the same queue on its own timer.

pub mod config;
pub mod downlink;
pub mod encoder;
pub mod error;
pub mod heartbeat;
pub mod pipeline;
pub mod queue;
pub mod scanner;
pub mod sensor;
pub mod sensor_data;
pub mod stack;

pub use config::Config;
pub use downlink::{PeerInfo, Transport, UdpBroadcastTransport};
pub use error::{Error, Result};
pub use pipeline::{ForwardOutcome, Pipeline, PipelineContext};
pub use queue::{Message, OutboundQueue};
pub use sensor_data::{Advertisement, HeartbeatStatus, SensorReading};
