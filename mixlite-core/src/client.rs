//! Public tracking surface
//!
//! [`Client`] wires the session, the builder, the queue and the delivery
//! pipeline together. No call ever returns an error to the host: user
//! mistakes and storage or network trouble are logged as warnings, and
//! undelivered transactions simply stay queued.
//!
//! ```no_run
//! use mixlite_core::{Client, InitOptions};
//!
//! # async fn run() -> mixlite_core::Result<()> {
//! let client = Client::builder().build()?;
//! client.init("project-token", InitOptions::default());
//! client.track("signup", None);
//! client.flush().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::builder;
use crate::config::{validate_endpoint, Config, InitOptions};
use crate::environment::{Environment, NativeContext};
use crate::error::{Error, Result};
use crate::pipeline::{DeliveryPipeline, DeliveryStats, DrainOutcome, DEFAULT_REDRAIN_DELAY};
use crate::queue::{TransactionQueue, DEFAULT_CAPACITY};
use crate::session::{load_or_create_device_id, SessionStore};
use crate::store::{KeyValueStore, MemoryStore, SqliteStore};
use crate::transport::{Endpoints, HttpTransport, Transport};
use crate::types::{Payload, Properties, Transaction};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`Client`].
pub struct ClientBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    environment: Option<Arc<dyn Environment>>,
    transport: Option<Arc<dyn Transport>>,
    endpoints: Endpoints,
    capacity: usize,
    redrain_delay: Duration,
    request_timeout: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            store: None,
            environment: None,
            transport: None,
            endpoints: Endpoints::default(),
            capacity: DEFAULT_CAPACITY,
            redrain_delay: DEFAULT_REDRAIN_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientBuilder {
    /// Builder preloaded from configuration, backed by the SQLite store.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.client.validate()?;
        let store = SqliteStore::open(&config.resolved_store_path())?;

        Ok(Self::default()
            .store(Arc::new(store))
            .endpoints(Endpoints {
                tracking: config.client.tracking_url.clone(),
                engage: config.client.engage_url.clone(),
            })
            .capacity(config.client.queue_capacity)
            .redrain_delay(config.client.redrain_delay())
            .request_timeout(config.client.request_timeout()))
    }

    /// Durable store (defaults to an in-memory store).
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Host environment (defaults to [`NativeContext`]).
    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Network transport (defaults to [`HttpTransport`]).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Endpoints used unless `init` overrides them.
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn redrain_delay(mut self, delay: Duration) -> Self {
        self.redrain_delay = delay;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Client> {
        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let environment: Arc<dyn Environment> = match self.environment {
            Some(environment) => environment,
            None => Arc::new(NativeContext::new()),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.request_timeout)?),
        };

        let queue = Arc::new(TransactionQueue::new(store.clone(), self.capacity));
        let pipeline = Arc::new(DeliveryPipeline::new(
            queue.clone(),
            transport,
            environment.clone(),
            self.redrain_delay,
        ));
        pipeline.set_endpoints(self.endpoints.clone());

        Ok(Client {
            base_endpoints: self.endpoints,
            store,
            environment,
            queue,
            pipeline,
            session: Mutex::new(SessionStore::new()),
            muted: AtomicBool::new(false),
        })
    }
}

/// Analytics client.
pub struct Client {
    base_endpoints: Endpoints,
    store: Arc<dyn KeyValueStore>,
    environment: Arc<dyn Environment>,
    queue: Arc<TransactionQueue>,
    pipeline: Arc<DeliveryPipeline>,
    session: Mutex<SessionStore>,
    muted: AtomicBool,
}

/// Profile operations, see [`Client::people`].
pub struct People<'a> {
    client: &'a Client,
}

impl People<'_> {
    /// Queue a `$set` profile update for the current distinct id.
    pub fn set(&self, data: Properties) {
        let client = self.client;
        if client.muted_call("people.set") {
            return;
        }
        if let Err(e) = client.try_people_set(&data) {
            warn!(error = %e, "mixlite.people.set failed");
        }
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Start a session for `token`.
    ///
    /// A blank token or an invalid endpoint override leaves the client
    /// uninitialized. `mute: true` mutes the client and does nothing else.
    pub fn init(&self, token: &str, options: InitOptions) {
        if self.muted_call("init") {
            return;
        }
        if options.mute {
            self.muted.store(true, Ordering::SeqCst);
            info!("mixlite.init: muted");
            return;
        }
        if let Err(e) = self.try_init(token, options) {
            warn!(error = %e, "mixlite.init failed");
        }
    }

    fn try_init(&self, token: &str, options: InitOptions) -> Result<()> {
        if token.trim().is_empty() {
            return Err(Error::InvalidToken);
        }

        let endpoints = Endpoints {
            tracking: options
                .tracking_url
                .clone()
                .unwrap_or_else(|| self.base_endpoints.tracking.clone()),
            engage: options
                .engage_url
                .clone()
                .unwrap_or_else(|| self.base_endpoints.engage.clone()),
        };
        validate_endpoint("tracking_url", &endpoints.tracking)?;
        validate_endpoint("engage_url", &endpoints.engage)?;

        let device_id = load_or_create_device_id(self.store.as_ref());
        let debug_calls = options.debug;
        self.session().init(
            token,
            options,
            &device_id,
            self.environment.properties(),
        );
        self.pipeline.set_endpoints(endpoints);

        if debug_calls {
            info!(token, device_id = %device_id, "mixlite.init");
        } else {
            debug!(token, "mixlite.init");
        }
        Ok(())
    }

    /// Queue an event and start delivery in the background.
    pub fn track(&self, event: &str, data: Option<Properties>) {
        if self.muted_call("track") {
            return;
        }
        if let Err(e) = self.try_track(event, data.as_ref()) {
            warn!(event, error = %e, "mixlite.track failed");
        }
    }

    fn try_track(&self, event: &str, data: Option<&Properties>) -> Result<()> {
        if event.trim().is_empty() {
            return Err(Error::InvalidEventName);
        }

        let (snapshot, debug_calls) = {
            let session = self.session();
            if !session.is_initialized() {
                return Err(Error::NotInitialized);
            }
            (session.snapshot(), session.options().debug)
        };

        if self.environment.do_not_track() {
            return Ok(());
        }

        let payload = builder::build_event(event, data, &snapshot, self.environment.as_ref());
        let transaction = self.queue.add(payload)?;

        if debug_calls {
            info!(event, id = %transaction.id, "mixlite.track");
        } else {
            debug!(event, id = %transaction.id, "mixlite.track");
        }

        self.spawn_drain("track");
        Ok(())
    }

    /// Merge `data` into the session properties sent with every event.
    pub fn register(&self, data: Properties) {
        if self.muted_call("register") {
            return;
        }
        let mut session = self.session();
        if !session.is_initialized() {
            warn!(error = %Error::NotInitialized, "mixlite.register failed");
            return;
        }
        session.register(&data);
        debug!(keys = data.len(), "mixlite.register");
    }

    /// Switch to a known identity, emitting `$identify` with the previous
    /// anonymous id.
    pub fn identify(&self, id: &str) {
        if self.muted_call("identify") {
            return;
        }
        if let Err(e) = self.try_identify(id) {
            warn!(error = %e, "mixlite.identify failed");
        }
    }

    fn try_identify(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::InvalidId);
        }

        let previous = {
            let session = self.session();
            if !session.is_initialized() {
                return Err(Error::NotInitialized);
            }
            session.distinct_id()
        };

        let mut data = Properties::new();
        data.insert("distinct_id".into(), json!(id));
        data.insert("$anon_distinct_id".into(), json!(previous));
        if let Err(e) = self.try_track("$identify", Some(&data)) {
            warn!(error = %e, "mixlite.identify: $identify event not queued");
        }

        self.session().identify(id);
        debug!(id, "mixlite.identify");
        Ok(())
    }

    pub fn people(&self) -> People<'_> {
        People { client: self }
    }

    fn try_people_set(&self, data: &Properties) -> Result<()> {
        let (token, distinct_id) = {
            let session = self.session();
            let token = session.token().ok_or(Error::NotInitialized)?.to_string();
            let distinct_id = session.distinct_id().ok_or(Error::NotInitialized)?;
            (token, distinct_id)
        };

        let payload: Payload = builder::build_profile_update(data, &token, &distinct_id);
        let transaction = self.queue.add(payload)?;
        debug!(id = %transaction.id, distinct_id = %distinct_id, "mixlite.people.set");

        self.spawn_drain("people.set");
        Ok(())
    }

    /// Start over with the same token: new distinct id, same device id.
    pub fn reset(&self) {
        if self.muted_call("reset") {
            return;
        }
        let previous = {
            let session = self.session();
            session
                .token()
                .map(|token| (token.to_string(), session.options().clone()))
        };
        match previous {
            Some((token, options)) => {
                if let Err(e) = self.try_init(&token, options) {
                    warn!(error = %e, "mixlite.reset failed");
                }
            }
            None => warn!(error = %Error::NotInitialized, "mixlite.reset failed"),
        }
    }

    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
        debug!("mixlite.mute");
    }

    pub fn unmute(&self) {
        self.muted.store(false, Ordering::SeqCst);
        debug!("mixlite.unmute");
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Current value of a session property.
    pub fn get_property(&self, name: &str) -> Option<Value> {
        if self.muted_call("get_property") {
            return None;
        }
        self.session().get(name).cloned()
    }

    /// Drain now and wait for the result.
    ///
    /// If a background drain is in flight, waits for it to settle and then
    /// drains once more. Returns `None` when muted.
    pub async fn flush(&self) -> Option<DrainOutcome> {
        if self.muted_call("flush") {
            return None;
        }
        loop {
            match self.pipeline.drain().await {
                DrainOutcome::Deferred => self.pipeline.wait_idle().await,
                outcome => return Some(outcome),
            }
        }
    }

    /// Host is ready (page loaded, app started).
    pub fn on_ready(&self) {
        if self.muted_call("on_ready") {
            return;
        }
        self.spawn_drain("ready");
    }

    /// Connectivity came back.
    pub fn on_online(&self) {
        if self.muted_call("on_online") {
            return;
        }
        self.spawn_drain("online");
    }

    /// Snapshot of the pending transactions, oldest first. Empty when muted.
    pub fn pending(&self) -> Vec<Transaction> {
        if self.muted_call("pending") {
            return Vec::new();
        }
        self.queue.all()
    }

    /// Drop every pending transaction.
    pub fn clear_pending(&self) {
        if self.muted_call("clear_pending") {
            return;
        }
        if let Err(e) = self.queue.clear() {
            warn!(error = %e, "Failed to clear pending transactions");
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.pipeline.stats()
    }

    /// Endpoints requests are currently routed to.
    pub fn endpoints(&self) -> Endpoints {
        self.pipeline.endpoints()
    }

    /// Whether the environment currently reports connectivity.
    pub fn is_online(&self) -> bool {
        self.environment.is_online()
    }

    fn spawn_drain(&self, trigger: &'static str) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pipeline = self.pipeline.clone();
                handle.spawn(async move {
                    pipeline.drain().await;
                });
            }
            Err(_) => debug!(trigger, "No async runtime, delivery waits for the next trigger"),
        }
    }

    fn muted_call(&self, call: &str) -> bool {
        let muted = self.is_muted();
        if muted {
            debug!(call, "mixlite muted, call ignored");
        }
        muted
    }

    fn session(&self) -> MutexGuard<'_, SessionStore> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
