//! Shared fakes for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mixlite_core::{
    Client, Error, InitOptions, KeyValueStore, MemoryStore, NativeContext, OutboundRequest,
    Payload, Result, TransactionQueue, Transport,
};
use tokio::sync::Notify;

/// Transport that records every request and answers from a script.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Mutex<Option<Arc<Gate>>>,
}

/// Holds the next request until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay the response for events named `event`.
    pub fn delay(&self, event: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(event.to_string(), delay);
    }

    /// Reject events named `event`.
    pub fn fail(&self, event: &str) {
        self.failing.lock().unwrap().insert(event.to_string());
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Block the next request until the returned gate is released.
    pub fn gate_next(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.requests()
            .iter()
            .map(|r| r.payload().expect("request payload decodes"))
            .collect()
    }

    /// Event names in the order they were sent.
    pub fn sent_events(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .filter_map(|p| p.event_name().map(str::to_string))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let payload = request.payload()?;
        let name = payload.event_name().unwrap_or_default().to_string();

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let delay = self.delays.lock().unwrap().get(&name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let rejected =
            self.fail_all.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&name);
        if rejected {
            return Err(Error::Rejected {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

/// A client wired to fakes, plus handles to drive them.
pub struct Harness {
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub environment: Arc<NativeContext>,
    pub transport: Arc<RecordingTransport>,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        Self::with_store(online, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(online: bool, store: Arc<MemoryStore>) -> Self {
        let environment = Arc::new(NativeContext::new().with_online(online));
        let transport = RecordingTransport::new();
        let client = Client::builder()
            .store(store.clone())
            .environment(environment.clone())
            .transport(transport.clone())
            .capacity(100)
            .redrain_delay(Duration::ZERO)
            .build()
            .expect("client builds");

        Self {
            client,
            store,
            environment,
            transport,
        }
    }

    /// Initialized harness with the test token.
    pub fn initialized(online: bool) -> Self {
        let harness = Self::new(online);
        harness.client.init("test-token", InitOptions::default());
        harness
    }

    pub fn pending_events(&self) -> Vec<String> {
        self.client
            .pending()
            .iter()
            .map(|t| t.event_name().unwrap_or_default().to_string())
            .collect()
    }

    /// Event names persisted in the store, read past the client.
    pub fn stored_events(&self) -> Vec<String> {
        TransactionQueue::new(self.store.clone(), 100)
            .all()
            .iter()
            .map(|t| t.event_name().unwrap_or_default().to_string())
            .collect()
    }

    pub fn stored_device_id(&self) -> Option<String> {
        self.store.get("device_id").expect("store readable")
    }
}

/// Give already spawned drains a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Let spawned drains run until the client's queue is empty.
pub async fn wait_for_empty_queue(client: &Client) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !client.pending().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("background drain should empty the queue");
}
