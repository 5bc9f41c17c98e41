// SPDX-License-Identifier: MPL-2.0

//! Demo: bridge a simulated smart outlet to an MQTT broker.
//!
//! Runs the poll-variant bridge against an in-memory outlet with two data
//! points (1 = `pump`, 2 = `temp`), so the whole topic surface can be
//! explored with any MQTT client. Try:
//!
//! ```bash
//! mosquitto_sub -h <host> -t 'outlet/#' -v
//! mosquitto_pub -h <host> -t outlet/set/command -m 'pump,true' -r
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --example simulated_outlet -- <host> [topic_root]
//! ```
//!
//! # Example
//!
//! ```bash
//! cargo run --example simulated_outlet -- 192.168.1.50 outlet
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use dpbridge::bus::mqtt::MqttBus;
use dpbridge::{
    BridgeConfig, BridgeTopics, BrokerSettings, DeviceClient, DeviceConnector, DeviceIdentity,
    DeviceSchema, DpId, DpMap, DpValue, PollBridge, ProtocolError, StatusUpdate,
    shutdown_channel, shutdown_on_signals,
};

/// An outlet that exists only in memory: writes change its state, full
/// reads report it back.
#[derive(Debug, Clone)]
struct SimulatedOutlet {
    state: Arc<Mutex<DpMap>>,
}

impl SimulatedOutlet {
    fn new() -> Self {
        let state = StatusUpdate::from_pairs([
            (1, DpValue::Bool(false)),
            (2, DpValue::Int(20)),
        ])
        .dps;
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl DeviceConnector for SimulatedOutlet {
    type Client = SimulatedSession;

    async fn connect(&self) -> Result<Self::Client, ProtocolError> {
        Ok(SimulatedSession {
            outlet: self.clone(),
        })
    }
}

struct SimulatedSession {
    outlet: SimulatedOutlet,
}

impl DeviceClient for SimulatedSession {
    async fn query_status(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<StatusUpdate>, ProtocolError> {
        Ok(None)
    }

    async fn full_status(&mut self) -> Result<StatusUpdate, ProtocolError> {
        Ok(StatusUpdate {
            dps: self.outlet.state.lock().clone(),
            t: None,
        })
    }

    async fn set_value(&mut self, id: DpId, value: DpValue) -> Result<(), ProtocolError> {
        println!("Outlet write: {id} = {value}");
        self.outlet.state.lock().insert(id, value);
        Ok(())
    }

    async fn heartbeat(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dpbridge=debug")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <host> [topic_root]", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --example simulated_outlet -- 192.168.1.50 outlet");
        std::process::exit(1);
    }

    let host = &args[1];
    let topic_root = args.get(2).map_or("outlet", String::as_str);

    let schema = Arc::new(DeviceSchema::from_pairs([(1, "pump"), (2, "temp")]));
    let config = BridgeConfig::new(
        topic_root,
        BrokerSettings::new(host, 1883),
        DeviceIdentity::new("simulated", "none", "0"),
    )
    .with_poll_interval(Duration::from_secs(10));

    println!("Connecting to MQTT broker {host}...");
    let bus = MqttBus::connect_with_retry(
        &config.broker,
        BridgeTopics::new(&config.topic_root),
        &config.startup_retry,
    )
    .await?;
    println!("Connected! Bridging under '{topic_root}/', Ctrl-C to stop.");

    let (handle, signal) = shutdown_channel();
    shutdown_on_signals(handle);

    let result = PollBridge::new(config, schema, SimulatedOutlet::new(), bus.clone())
        .run(signal)
        .await;

    bus.disconnect().await?;
    println!("Bridge stopped.");

    result.map_err(Into::into)
}
