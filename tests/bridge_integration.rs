// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end bridge loop tests with a scripted device and an in-memory bus.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use dpbridge::{
    BridgeConfig, BrokerSettings, CommandQueue, DeviceClient, DeviceConnector, DeviceIdentity,
    DpId, DpMap, DpValue, PollBridge, ProtocolError, PushBridge, RetryPolicy, ShutdownHandle,
    StatusBus, StatusUpdate, shutdown_channel,
};

/// Records every publication and feeds queued control payloads to the loop.
#[derive(Debug, Default, Clone)]
struct MemoryBus {
    published: Arc<Mutex<Vec<(String, String, bool)>>>,
    queue: CommandQueue,
}

impl MemoryBus {
    fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| payload.clone())
            .collect()
    }

    fn json_payloads_for(&self, topic: &str) -> Vec<Value> {
        self.payloads_for(topic)
            .iter()
            .map(|payload| serde_json::from_str(payload).unwrap())
            .collect()
    }

    fn all_retained(&self) -> bool {
        self.published.lock().iter().all(|(_, _, retain)| *retain)
    }
}

impl StatusBus for MemoryBus {
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        self.published
            .lock()
            .push((topic.to_string(), payload, retain));
        Ok(())
    }

    fn poll_command(&self) -> Option<String> {
        self.queue.pop()
    }
}

/// Push-variant device: answers one full read, then plays back scripted
/// deltas. Requests shutdown once the script is exhausted so tests finish
/// deterministically.
#[derive(Debug)]
struct ScriptedDevice {
    full: StatusUpdate,
    deltas: VecDeque<StatusUpdate>,
    writes: Arc<Mutex<Vec<(DpId, DpValue)>>>,
    pending_full: bool,
    stop: ShutdownHandle,
}

impl ScriptedDevice {
    fn new(
        full: StatusUpdate,
        deltas: impl IntoIterator<Item = StatusUpdate>,
        stop: ShutdownHandle,
    ) -> Self {
        Self {
            full,
            deltas: deltas.into_iter().collect(),
            writes: Arc::new(Mutex::new(Vec::new())),
            pending_full: false,
            stop,
        }
    }
}

impl DeviceClient for ScriptedDevice {
    async fn query_status(&mut self) -> Result<(), ProtocolError> {
        self.pending_full = true;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<StatusUpdate>, ProtocolError> {
        if self.pending_full {
            self.pending_full = false;
            return Ok(Some(self.full.clone()));
        }
        match self.deltas.pop_front() {
            Some(delta) => Ok(Some(delta)),
            None => {
                self.stop.shutdown();
                Ok(None)
            }
        }
    }

    async fn full_status(&mut self) -> Result<StatusUpdate, ProtocolError> {
        Ok(self.full.clone())
    }

    async fn set_value(&mut self, id: DpId, value: DpValue) -> Result<(), ProtocolError> {
        self.writes.lock().push((id, value));
        Ok(())
    }

    async fn heartbeat(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

/// Poll-variant device: sessions share one mutable outlet state, so a write
/// through one session is visible to the full read of the next.
#[derive(Debug, Clone, Default)]
struct SharedOutlet {
    state: Arc<Mutex<DpMap>>,
    writes: Arc<Mutex<Vec<(DpId, DpValue)>>>,
    full_reads: Arc<Mutex<u32>>,
}

impl SharedOutlet {
    fn with_state(state: DpMap) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            ..Self::default()
        }
    }
}

impl DeviceConnector for SharedOutlet {
    type Client = SharedOutletSession;

    async fn connect(&self) -> Result<Self::Client, ProtocolError> {
        Ok(SharedOutletSession {
            outlet: self.clone(),
        })
    }
}

#[derive(Debug)]
struct SharedOutletSession {
    outlet: SharedOutlet,
}

impl DeviceClient for SharedOutletSession {
    async fn query_status(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<StatusUpdate>, ProtocolError> {
        Ok(None)
    }

    async fn full_status(&mut self) -> Result<StatusUpdate, ProtocolError> {
        *self.outlet.full_reads.lock() += 1;
        Ok(StatusUpdate {
            dps: self.outlet.state.lock().clone(),
            t: None,
        })
    }

    async fn set_value(&mut self, id: DpId, value: DpValue) -> Result<(), ProtocolError> {
        self.outlet.state.lock().insert(id, value.clone());
        self.outlet.writes.lock().push((id, value));
        Ok(())
    }

    async fn heartbeat(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

fn config() -> BridgeConfig {
    BridgeConfig::new(
        "outlet",
        BrokerSettings::new("localhost", 1883),
        DeviceIdentity::new("bf3a1f8e", "f00dfeed", "3.3"),
    )
    .with_idle_sleep(Duration::from_millis(2))
    .with_startup_retry(RetryPolicy::fixed(3, Duration::from_millis(1)))
}

fn schema() -> Arc<dpbridge::DeviceSchema> {
    Arc::new(dpbridge::DeviceSchema::from_pairs([(1, "pump"), (2, "temp")]))
}

#[tokio::test]
async fn push_bridge_publishes_initial_then_delta() {
    let (handle, signal) = shutdown_channel();
    let full = StatusUpdate::from_pairs([(1, DpValue::Bool(true)), (2, DpValue::Int(20))]);
    let delta = StatusUpdate::from_pairs([(2, DpValue::Int(21))]).with_timestamp(1_700_000_000);
    let device = ScriptedDevice::new(full, [delta], handle);
    let bus = MemoryBus::default();

    PushBridge::new(config(), schema(), device, bus.clone())
        .run(signal)
        .await
        .unwrap();

    let statuses = bus.json_payloads_for("outlet/status");
    assert_eq!(statuses[0], json!({"pump": true, "temp": 20}));
    assert_eq!(statuses[1], json!({"pump": true, "temp": 21}));

    // Raw goes out on the full read only, not on the delta.
    let raws = bus.json_payloads_for("outlet/status_raw");
    assert_eq!(raws, vec![json!({"dps": {"1": true, "2": 20}})]);

    // The delta's device-reported timestamp lands on the last topic.
    let lasts = bus.payloads_for("outlet/last");
    assert_eq!(lasts.len(), 2);
    assert_eq!(lasts[1], "1700000000");

    assert!(bus.all_retained());
}

#[tokio::test]
async fn push_bridge_dispatches_command_once() {
    let (handle, signal) = shutdown_channel();
    let full = StatusUpdate::from_pairs([(1, DpValue::Bool(true))]);
    let device = ScriptedDevice::new(full, [], handle);
    let writes = Arc::clone(&device.writes);
    let bus = MemoryBus::default();

    bus.queue.push("pump,false".to_string());
    // The retained sentinel left by a previous dispatch is re-delivered on
    // reconnect; it must not trigger another write.
    bus.queue.push("0".to_string());
    bus.queue.push("0".to_string());

    PushBridge::new(config(), schema(), device, bus.clone())
        .run(signal)
        .await
        .unwrap();

    assert_eq!(*writes.lock(), vec![(DpId::new(1), DpValue::Bool(false))]);
    assert_eq!(bus.payloads_for("outlet/set/command"), vec!["0"]);
    assert_eq!(
        bus.payloads_for("outlet/set/lastcommand"),
        vec!["pump,false"]
    );
}

#[tokio::test]
async fn push_bridge_ignores_malformed_commands() {
    let (handle, signal) = shutdown_channel();
    let full = StatusUpdate::from_pairs([(1, DpValue::Bool(true))]);
    let device = ScriptedDevice::new(full, [], handle);
    let writes = Arc::clone(&device.writes);
    let bus = MemoryBus::default();

    bus.queue.push("nosuchname,1".to_string());
    bus.queue.push("plain text".to_string());

    PushBridge::new(config(), schema(), device, bus.clone())
        .run(signal)
        .await
        .unwrap();

    assert!(writes.lock().is_empty());
    assert!(bus.payloads_for("outlet/set/lastcommand").is_empty());
}

#[tokio::test]
async fn poll_bridge_command_forces_refresh() {
    let (handle, signal) = shutdown_channel();
    let outlet = SharedOutlet::with_state(
        StatusUpdate::from_pairs([(1, DpValue::Bool(false)), (2, DpValue::Int(20))]).dps,
    );
    let bus = MemoryBus::default();

    bus.queue.push("pump,true".to_string());

    // Interval far in the future: the second refresh can only come from the
    // command-forced path.
    let bridge = PollBridge::new(
        config().with_poll_interval(Duration::from_secs(3600)),
        schema(),
        outlet.clone(),
        bus.clone(),
    );

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown();
    });
    bridge.run(signal).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(*outlet.full_reads.lock(), 2);
    assert_eq!(
        *outlet.writes.lock(),
        vec![(DpId::new(1), DpValue::Bool(true))]
    );

    let statuses = bus.json_payloads_for("outlet/status");
    assert_eq!(statuses[0], json!({"pump": false, "temp": 20}));
    assert_eq!(statuses[1], json!({"pump": true, "temp": 20}));

    // Every full read republishes the raw snapshot.
    let raws = bus.json_payloads_for("outlet/status_raw");
    assert_eq!(raws.len(), 2);
    assert_eq!(raws[1], json!({"dps": {"1": true, "2": 20}}));

    assert_eq!(bus.payloads_for("outlet/set/command"), vec!["0"]);
    assert_eq!(bus.payloads_for("outlet/set/lastcommand"), vec!["pump,true"]);
}

#[tokio::test]
async fn poll_bridge_refreshes_on_interval() {
    let (handle, signal) = shutdown_channel();
    let outlet =
        SharedOutlet::with_state(StatusUpdate::from_pairs([(1, DpValue::Bool(true))]).dps);
    let bus = MemoryBus::default();

    let bridge = PollBridge::new(
        config().with_poll_interval(Duration::from_millis(20)),
        schema(),
        outlet.clone(),
        bus.clone(),
    );

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown();
    });
    bridge.run(signal).await.unwrap();
    stopper.await.unwrap();

    // Initial refresh plus at least one interval-driven refresh.
    assert!(*outlet.full_reads.lock() >= 2);
    assert!(bus.json_payloads_for("outlet/status").len() >= 2);
}
