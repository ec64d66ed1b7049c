use beacon_relay::config::Config;
use beacon_relay::downlink::{BROADCAST_ADDRESS, PeerInfo, Transport};
use beacon_relay::error::{Error, Result};
use beacon_relay::pipeline::{ForwardOutcome, Pipeline, TRANSMIT_STACK_SIZE};
use beacon_relay::scanner::h5074_payload;
use beacon_relay::sensor_data::Advertisement;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;
use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

/// In-memory transport: every frame handed to `send` goes to a channel
struct RecordingTransport {
    frames: Sender<Vec<u8>>,
    fail_init: bool,
    fail_peer: bool,
    /// Fail every n-th send (1-based)
    fail_every: Option<usize>,
    sends: usize,
    peers: Vec<PeerInfo>,
}

impl RecordingTransport {
    fn new() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = unbounded();
        (
            Self {
                frames: tx,
                fail_init: false,
                fail_peer: false,
                fail_every: None,
                sends: 0,
                peers: Vec::new(),
            },
            rx,
        )
    }
}

impl Transport for RecordingTransport {
    fn init(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(Error::TransportInit("radio unavailable".into()));
        }
        Ok(())
    }

    fn add_peer(&mut self, peer: &PeerInfo) -> Result<()> {
        if self.fail_peer {
            return Err(Error::PeerRegistration("peer table full".into()));
        }
        self.peers.push(*peer);
        Ok(())
    }

    fn send(&mut self, peer: &[u8; 6], frame: &[u8]) -> Result<()> {
        assert_eq!(peer, &BROADCAST_ADDRESS);
        assert_eq!(self.peers.len(), 1);
        self.sends += 1;
        if self.fail_every.is_some_and(|n| self.sends % n == 0) {
            return Err(Error::Send("no ack".into()));
        }
        let _ = self.frames.send(frame.to_vec());
        Ok(())
    }
}

/// Transport whose send path uses a large stack buffer, like a radio driver
struct DeepSendTransport {
    sent: Sender<()>,
}

impl Transport for DeepSendTransport {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn add_peer(&mut self, _peer: &PeerInfo) -> Result<()> {
        Ok(())
    }

    #[inline(never)]
    fn send(&mut self, _peer: &[u8; 6], frame: &[u8]) -> Result<()> {
        let mut scratch = black_box([0u8; 8 * 1024]);
        scratch[..frame.len()].copy_from_slice(frame);
        beacon_relay::stack::mark_current();
        black_box(&scratch);
        let _ = self.sent.send(());
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        heartbeat_period_ms: 50,
        ..Config::default()
    }
}

fn govee(name: &str, temp: f64, hum: f64, batt: u8) -> Advertisement {
    Advertisement {
        name: name.to_string(),
        address: "a4:c1:38:aa:bb:cc".to_string(),
        service_uuid: Some("ec88".to_string()),
        manufacturer_data: h5074_payload(temp, hum, batt).to_vec(),
    }
}

fn parse_frame(frame: &[u8]) -> Value {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(frame.len());
    serde_json::from_slice(&frame[..end]).unwrap()
}

fn is_heartbeat(v: &Value) -> bool {
    v.get("T").is_some()
}

#[test]
fn test_reading_and_heartbeat_reach_transport() {
    let (transport, frames) = RecordingTransport::new();
    let pipeline = Pipeline::start_with_yield(&test_config(), transport, Duration::ZERO).unwrap();
    let ctx = pipeline.context();

    assert!(matches!(
        ctx.on_advertisement(&govee("Govee_H5074_4B2C", 18.37, 51.82, 97)),
        ForwardOutcome::Queued
    ));

    let mut saw_reading = false;
    let mut saw_heartbeat = false;
    let deadline = Instant::now() + Duration::from_secs(3);
    while !(saw_reading && saw_heartbeat) && Instant::now() < deadline {
        let Ok(frame) = frames.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        assert_eq!(frame.len(), 200);
        let v = parse_frame(&frame);
        assert_eq!(v["D"], "ESP-GOVEE");
        if is_heartbeat(&v) {
            saw_heartbeat = true;
        } else {
            let temp = v["Govee_H5074_4B2C/tempInC"].as_f64().unwrap();
            assert!((temp - 18.37).abs() < 0.005);
            assert_eq!(v["Govee_H5074_4B2C/battery"], 97);
            saw_reading = true;
        }
    }
    assert!(saw_reading && saw_heartbeat);
    assert!(pipeline.is_running());
}

#[test]
fn test_init_failure_aborts_startup() {
    let (mut transport, _frames) = RecordingTransport::new();
    transport.fail_init = true;
    let err = Pipeline::start(&test_config(), transport).err().unwrap();
    assert!(matches!(err, Error::TransportInit(_)));
}

#[test]
fn test_peer_failure_aborts_startup() {
    let (mut transport, _frames) = RecordingTransport::new();
    transport.fail_peer = true;
    let err = Pipeline::start(&test_config(), transport).err().unwrap();
    assert!(matches!(err, Error::PeerRegistration(_)));
}

#[test]
fn test_invalid_queue_aborts_startup() {
    let (transport, _frames) = RecordingTransport::new();
    let config = Config {
        queue_capacity: 0,
        ..test_config()
    };
    let err = Pipeline::start(&config, transport).err().unwrap();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_send_failure_does_not_stop_worker() {
    let (mut transport, frames) = RecordingTransport::new();
    transport.fail_every = Some(2);
    let config = Config {
        heartbeat_period_ms: 60_000,
        ..Config::default()
    };
    let pipeline = Pipeline::start_with_yield(&config, transport, Duration::ZERO).unwrap();
    let ctx = pipeline.context();

    // first heartbeat fires at startup; wait for it to go out
    let first = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(is_heartbeat(&parse_frame(&first)));

    // send #2 fails, send #3 succeeds
    ctx.on_advertisement(&govee("lost", 20.0, 40.0, 80));
    thread::sleep(Duration::from_millis(100));
    ctx.on_advertisement(&govee("kept", 21.5, 41.25, 81));

    let frame = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    let v = parse_frame(&frame);
    assert_eq!(v["kept/humidity"].as_f64().unwrap(), 41.25);
    assert!(frames.recv_timeout(Duration::from_millis(100)).is_err());

    let stats = ctx.stats.snapshot();
    assert_eq!(stats.send_failed, 1);
    assert_eq!(stats.sent, 2);
    assert!(pipeline.is_running());
}

#[test]
fn test_deep_send_lowers_transmit_headroom() {
    let (tx, sent) = unbounded();
    let config = Config {
        heartbeat_period_ms: 60_000,
        ..Config::default()
    };
    let transport = DeepSendTransport { sent: tx };
    let pipeline = Pipeline::start_with_yield(&config, transport, Duration::ZERO).unwrap();
    let ctx = pipeline.context();

    // startup heartbeat
    sent.recv_timeout(Duration::from_secs(2)).unwrap();
    ctx.on_advertisement(&govee("Govee_H5074_1", 21.0, 40.0, 90));
    sent.recv_timeout(Duration::from_secs(2)).unwrap();

    let headroom = ctx.transmit_stack.headroom();
    assert!(
        headroom <= TRANSMIT_STACK_SIZE - 8 * 1024,
        "transmit headroom {} ignores the send frame",
        headroom
    );
}

#[test]
fn test_heartbeat_not_starved_by_sensor_traffic() {
    let (transport, frames) = RecordingTransport::new();
    let config = Config {
        heartbeat_period_ms: 100,
        ..Config::default()
    };
    // default transmit yield: the worker drains far slower than the flood fills
    let pipeline = Pipeline::start(&config, transport).unwrap();
    let ctx = pipeline.context();

    let run_for = Duration::from_millis(1200);
    let flood = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            let start = Instant::now();
            let mut n = 0u32;
            while start.elapsed() < run_for {
                let name = format!("Govee_{}", n % 4);
                ctx.on_advertisement(&govee(&name, 22.0, 45.0, 90));
                n += 1;
                thread::sleep(Duration::from_micros(500));
            }
        })
    };
    flood.join().unwrap();
    let during_flood = ctx.stats.snapshot();
    assert!(during_flood.dropped_queue_full > 0, "flood never saturated the queue");

    // 1.2s at a 100ms period is about 13 ticks
    assert!(
        during_flood.heartbeats >= 9,
        "only {} heartbeats queued",
        during_flood.heartbeats
    );

    // let the queue drain at the 10ms yield
    thread::sleep(Duration::from_millis(300));
    let mut heartbeats = 0;
    let mut readings = 0;
    while let Ok(frame) = frames.try_recv() {
        if is_heartbeat(&parse_frame(&frame)) {
            heartbeats += 1;
        } else {
            readings += 1;
        }
    }
    assert!(heartbeats >= during_flood.heartbeats, "{} sent", heartbeats);
    assert!(readings > 0);
}
