use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use edgeflow_domain::{
    AppFunction, InMemorySecretProvider, MessageEnvelope, SecretProvider, StoreClient, TargetType,
};
use edgeflow_messaging::NatsMessageBus;
use edgeflow_runner::ServiceRunner;
use edgeflow_runtime::{PipelineError, PipelineRuntime, StoreAndForward};
use edgeflow_store::{InMemoryStore, SqliteStore};
use edgeflow_triggers::{HttpTrigger, MessageBusTrigger, MessageProcessor, MqttTrigger, Trigger};

use crate::config::ServiceConfig;

pub const TRIGGER_TYPE_HTTP: &str = "HTTP";
pub const TRIGGER_TYPE_MESSAGE_BUS: &str = "EDGEX-MESSAGEBUS";
pub const TRIGGER_TYPE_EXTERNAL_MQTT: &str = "EXTERNAL-MQTT";

/// Everything a custom trigger factory needs to build its trigger.
pub struct CustomTriggerContext {
    pub processor: Arc<MessageProcessor>,
    pub config: Arc<ServiceConfig>,
}

pub type TriggerFactory =
    Box<dyn Fn(CustomTriggerContext) -> anyhow::Result<Box<dyn Trigger>> + Send + Sync>;

/// Runtime control over the store-and-forward retry loop.
///
/// Disabling cancels the enabled token of the running loop; a
/// subsequent enable spawns a fresh loop under a fresh token. Clones
/// share state, so a handle taken before [`ApplicationService::run`]
/// keeps working while the service runs.
#[derive(Clone)]
pub struct StoreAndForwardController {
    engine: Arc<StoreAndForward>,
    tracker: TaskTracker,
    app_token: CancellationToken,
    enabled_token: Arc<Mutex<Option<CancellationToken>>>,
}

impl StoreAndForwardController {
    fn new(engine: Arc<StoreAndForward>, tracker: TaskTracker, app_token: CancellationToken) -> Self {
        Self {
            engine,
            tracker,
            app_token,
            enabled_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Enable or disable the retry loop. Enabling while a loop is
    /// already running is a no-op.
    pub fn set_enabled(&self, enabled: bool) {
        let mut current = self
            .enabled_token
            .lock()
            .expect("store and forward state lock poisoned");

        if enabled {
            if current.is_some() {
                return;
            }
            let enabled_token = CancellationToken::new();
            self.engine.clone().start_retry_loop(
                &self.tracker,
                self.app_token.clone(),
                enabled_token.clone(),
            );
            *current = Some(enabled_token);
            info!("store and forward enabled");
        } else if let Some(enabled_token) = current.take() {
            enabled_token.cancel();
            info!("store and forward disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_token
            .lock()
            .expect("store and forward state lock poisoned")
            .is_some()
    }
}

/// Facade wiring configuration, pipeline runtime, persistence and the
/// selected trigger into one runnable service.
pub struct ApplicationService {
    config: Arc<ServiceConfig>,
    runtime: Arc<PipelineRuntime>,
    secret_provider: Arc<dyn SecretProvider>,
    custom_factories: HashMap<String, TriggerFactory>,
    background_tx: mpsc::Sender<MessageEnvelope>,
    background_rx: Option<mpsc::Receiver<MessageEnvelope>>,
    app_token: CancellationToken,
    tracker: TaskTracker,
    store_and_forward: StoreAndForwardController,
}

impl ApplicationService {
    pub fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        Self::with_secret_provider(config, Arc::new(InMemorySecretProvider::new()))
    }

    pub fn with_secret_provider(
        config: ServiceConfig,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> anyhow::Result<Self> {
        let store_client = build_store_client(&config)?;

        let runtime = Arc::new(
            PipelineRuntime::new(config.service_key.clone(), TargetType::Event)
                .with_store_client(store_client.clone()),
        );

        let app_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let store_and_forward = StoreAndForwardController::new(
            Arc::new(StoreAndForward::new(
                runtime.clone(),
                store_client,
                config.store_and_forward(),
            )),
            tracker.clone(),
            app_token.clone(),
        );

        let (background_tx, background_rx) = mpsc::channel(config.background_buffer_size.max(1));

        Ok(Self {
            config: Arc::new(config),
            runtime,
            secret_provider,
            custom_factories: HashMap::new(),
            background_tx,
            background_rx: Some(background_rx),
            app_token,
            tracker,
            store_and_forward,
        })
    }

    pub fn runtime(&self) -> Arc<PipelineRuntime> {
        self.runtime.clone()
    }

    /// Replace the function pipeline. Takes effect on the next message.
    pub fn set_functions(&self, functions: Vec<Arc<dyn AppFunction>>) -> Result<(), PipelineError> {
        self.runtime.set_transforms(functions)
    }

    /// Sender for envelopes the application wants published on the
    /// trigger's transport without running the pipeline.
    pub fn background_publisher(&self) -> mpsc::Sender<MessageEnvelope> {
        self.background_tx.clone()
    }

    /// Handle for toggling the store-and-forward retry loop at runtime.
    /// Take a clone before calling [`ApplicationService::run`].
    pub fn store_and_forward_controller(&self) -> StoreAndForwardController {
        self.store_and_forward.clone()
    }

    /// Register a factory for a custom trigger type. Names collide
    /// case-insensitively; built-in names are reserved.
    pub fn register_custom_trigger_factory(
        &mut self,
        name: &str,
        factory: TriggerFactory,
    ) -> anyhow::Result<()> {
        let key = name.to_uppercase();
        if [
            TRIGGER_TYPE_HTTP,
            TRIGGER_TYPE_MESSAGE_BUS,
            TRIGGER_TYPE_EXTERNAL_MQTT,
        ]
        .contains(&key.as_str())
        {
            anyhow::bail!("cannot register a custom trigger for built-in type '{name}'");
        }

        self.custom_factories.insert(key, factory);
        Ok(())
    }

    async fn build_trigger(
        &self,
        processor: Arc<MessageProcessor>,
    ) -> anyhow::Result<Box<dyn Trigger>> {
        match self.config.trigger_type.to_uppercase().as_str() {
            TRIGGER_TYPE_HTTP => {
                info!("http trigger selected");
                Ok(Box::new(HttpTrigger::new(
                    processor,
                    self.config.http_bind_address.clone(),
                )))
            }
            TRIGGER_TYPE_MESSAGE_BUS => {
                info!("message bus trigger selected");
                let bus_config = self.config.message_bus()?;
                let client =
                    NatsMessageBus::from_config(bus_config, self.secret_provider.as_ref()).await?;
                Ok(Box::new(MessageBusTrigger::new(
                    Arc::new(client),
                    processor,
                    self.config.bus_subscribe_topics.clone(),
                    self.config.bus_publish_topic.clone(),
                )))
            }
            TRIGGER_TYPE_EXTERNAL_MQTT => {
                info!("external mqtt trigger selected");
                let mqtt_config = self.config.external_mqtt()?;
                Ok(Box::new(MqttTrigger::new(
                    processor,
                    mqtt_config,
                    self.secret_provider.clone(),
                )))
            }
            custom => match self.custom_factories.get(custom) {
                Some(factory) => {
                    info!(trigger_type = %custom, "custom trigger selected");
                    factory(CustomTriggerContext {
                        processor,
                        config: self.config.clone(),
                    })
                }
                None => anyhow::bail!(
                    "invalid trigger type '{}' specified",
                    self.config.trigger_type
                ),
            },
        }
    }

    /// Initialize the trigger and store-and-forward engine, then host
    /// the service until shutdown.
    ///
    /// Returns an error only when initialization fails; after a
    /// successful start the runner owns the process and exits it with
    /// code 0 on a signal-driven shutdown or 1 on a process failure.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let app_token = self.app_token.clone();
        let tracker = self.tracker.clone();

        let store_and_forward = self.config.store_and_forward();
        let processor = Arc::new(MessageProcessor::new(
            self.runtime.clone(),
            store_and_forward.clone(),
        ));

        let background_rx = self
            .background_rx
            .take()
            .context("application service is already running")?;

        let mut trigger = self.build_trigger(processor).await?;
        let deferred = trigger
            .initialize(&tracker, app_token.clone(), background_rx)
            .await
            .context("failed to initialize trigger")?;

        if store_and_forward.enabled {
            self.store_and_forward.set_enabled(true);
        }

        info!(service_key = %self.config.service_key, "service started");

        ServiceRunner::new()
            .with_cancellation_token(app_token.clone())
            .with_process(|token| async move {
                // All workers live on the task tracker; this process only
                // holds the runner open until shutdown.
                token.cancelled().await;
                Ok(())
            })
            .with_closer(move || async move {
                deferred().await;
                tracker.close();
                tracker.wait().await;
                Ok(())
            })
            .run()
            .await;

        Ok(())
    }
}

/// The store client backs both the runtime's persist hook and the retry
/// engine. It is built regardless of the initial enabled flag so the
/// feature can be enabled at runtime.
fn build_store_client(config: &ServiceConfig) -> anyhow::Result<Arc<dyn StoreClient>> {
    match config.store_backing.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => {
            let store = SqliteStore::open(Path::new(&config.store_sqlite_path))
                .context("failed to open the sqlite store")?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown store backing '{other}'"),
    }
}
