use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use edgeflow_domain::StoreAndForwardConfig;
use edgeflow_messaging::{AuthMode, HostInfo, MessageBusConfig};
use edgeflow_triggers::ExternalMqttConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Key identifying this service; store-and-forward items are scoped
    /// to it.
    #[serde(default = "default_service_key")]
    pub service_key: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Trigger selector: HTTP, EDGEX-MESSAGEBUS, EXTERNAL-MQTT or a
    /// registered custom trigger name (case-insensitive).
    #[serde(default = "default_trigger_type")]
    pub trigger_type: String,

    /// Bound of the background publish channel.
    #[serde(default = "default_background_buffer_size")]
    pub background_buffer_size: usize,

    // Message bus trigger
    /// Bus protocol for subscribe/publish host URLs
    #[serde(default = "default_bus_protocol")]
    pub bus_protocol: String,

    #[serde(default = "default_bus_host")]
    pub bus_subscribe_host: String,

    #[serde(default = "default_bus_port")]
    pub bus_subscribe_port: u16,

    /// Comma-separated subscribe topics; empty means the wildcard topic
    #[serde(default)]
    pub bus_subscribe_topics: String,

    #[serde(default = "default_bus_host")]
    pub bus_publish_host: String,

    #[serde(default = "default_bus_port")]
    pub bus_publish_port: u16,

    #[serde(default = "default_publish_topic")]
    pub bus_publish_topic: String,

    /// Bus auth mode: none, usernamepassword, clientcert or cacert
    #[serde(default = "default_auth_mode")]
    pub bus_auth_mode: String,

    /// Secret holding the bus credentials when an auth mode is set
    #[serde(default)]
    pub bus_secret_name: String,

    // HTTP trigger
    #[serde(default = "default_http_bind_address")]
    pub http_bind_address: String,

    // External MQTT trigger
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Comma-separated subscribe topics; empty means the wildcard topic
    #[serde(default)]
    pub mqtt_subscribe_topics: String,

    #[serde(default = "default_publish_topic")]
    pub mqtt_publish_topic: String,

    /// MQTT quality of service (0, 1 or 2)
    #[serde(default)]
    pub mqtt_qos: u8,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_auth_mode")]
    pub mqtt_auth_mode: String,

    #[serde(default)]
    pub mqtt_secret_name: String,

    // Store and forward
    #[serde(default)]
    pub store_and_forward_enabled: bool,

    /// Milliseconds between retry ticks; clamped to the engine minimum
    #[serde(default = "default_retry_interval_ms")]
    pub store_and_forward_retry_interval_ms: u64,

    /// Maximum failed attempts; zero means unbounded, negative coerces
    /// to one
    #[serde(default = "default_max_retry_count")]
    pub store_and_forward_max_retry_count: i64,

    /// Store backing: memory or sqlite
    #[serde(default = "default_store_backing")]
    pub store_backing: String,

    #[serde(default = "default_store_sqlite_path")]
    pub store_sqlite_path: String,
}

fn default_service_key() -> String {
    "app-edgeflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_trigger_type() -> String {
    "EDGEX-MESSAGEBUS".to_string()
}

fn default_background_buffer_size() -> usize {
    10
}

// Message bus defaults
fn default_bus_protocol() -> String {
    "nats".to_string()
}

fn default_bus_host() -> String {
    "localhost".to_string()
}

fn default_bus_port() -> u16 {
    4222
}

fn default_publish_topic() -> String {
    "edgeflow/responses".to_string()
}

fn default_auth_mode() -> String {
    "none".to_string()
}

// HTTP trigger defaults
fn default_http_bind_address() -> String {
    "0.0.0.0:48095".to_string()
}

// External MQTT defaults
fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "edgeflow-trigger".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

// Store and forward defaults
fn default_retry_interval_ms() -> u64 {
    30_000
}

fn default_max_retry_count() -> i64 {
    10
}

fn default_store_backing() -> String {
    "memory".to_string()
}

fn default_store_sqlite_path() -> String {
    "./edgeflow-store.db".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_key: default_service_key(),
            log_level: default_log_level(),
            trigger_type: default_trigger_type(),
            background_buffer_size: default_background_buffer_size(),
            bus_protocol: default_bus_protocol(),
            bus_subscribe_host: default_bus_host(),
            bus_subscribe_port: default_bus_port(),
            bus_subscribe_topics: String::new(),
            bus_publish_host: default_bus_host(),
            bus_publish_port: default_bus_port(),
            bus_publish_topic: default_publish_topic(),
            bus_auth_mode: default_auth_mode(),
            bus_secret_name: String::new(),
            http_bind_address: default_http_bind_address(),
            mqtt_broker_url: default_mqtt_broker_url(),
            mqtt_client_id: default_mqtt_client_id(),
            mqtt_subscribe_topics: String::new(),
            mqtt_publish_topic: default_publish_topic(),
            mqtt_qos: 0,
            mqtt_keep_alive_secs: default_mqtt_keep_alive_secs(),
            mqtt_auth_mode: default_auth_mode(),
            mqtt_secret_name: String::new(),
            store_and_forward_enabled: false,
            store_and_forward_retry_interval_ms: default_retry_interval_ms(),
            store_and_forward_max_retry_count: default_max_retry_count(),
            store_backing: default_store_backing(),
            store_sqlite_path: default_store_sqlite_path(),
        }
    }
}

impl ServiceConfig {
    /// Load from `EDGEFLOW_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("EDGEFLOW"))
            .build()?
            .try_deserialize()
    }

    /// Snapshot handed to per-message contexts and the retry engine.
    pub fn store_and_forward(&self) -> StoreAndForwardConfig {
        StoreAndForwardConfig {
            enabled: self.store_and_forward_enabled,
            retry_interval_ms: self.store_and_forward_retry_interval_ms,
            max_retry_count: self.store_and_forward_max_retry_count,
        }
    }

    pub fn message_bus(&self) -> anyhow::Result<MessageBusConfig> {
        Ok(MessageBusConfig {
            subscribe_host: HostInfo::new(
                self.bus_subscribe_host.clone(),
                self.bus_subscribe_port,
                self.bus_protocol.clone(),
            ),
            publish_host: HostInfo::new(
                self.bus_publish_host.clone(),
                self.bus_publish_port,
                self.bus_protocol.clone(),
            ),
            auth_mode: AuthMode::parse(&self.bus_auth_mode)?,
            secret_name: self.bus_secret_name.clone(),
        })
    }

    pub fn external_mqtt(&self) -> anyhow::Result<ExternalMqttConfig> {
        Ok(ExternalMqttConfig {
            broker_url: self.mqtt_broker_url.clone(),
            client_id: self.mqtt_client_id.clone(),
            subscribe_topics: self.mqtt_subscribe_topics.clone(),
            publish_topic: self.mqtt_publish_topic.clone(),
            qos: self.mqtt_qos,
            keep_alive_secs: self.mqtt_keep_alive_secs,
            auth_mode: AuthMode::parse(&self.mqtt_auth_mode)?,
            secret_name: self.mqtt_secret_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex so env-mutating tests do not interfere with each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_without_environment() {
        let _lock = TEST_LOCK.lock().unwrap();

        // SAFETY: env access is serialized by the test lock.
        unsafe {
            std::env::remove_var("EDGEFLOW_LOG_LEVEL");
            std::env::remove_var("EDGEFLOW_TRIGGER_TYPE");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.trigger_type, "EDGEX-MESSAGEBUS");
        assert_eq!(config.store_and_forward_max_retry_count, 10);
        assert!(!config.store_and_forward_enabled);
    }

    #[test]
    fn environment_overrides_defaults() {
        let _lock = TEST_LOCK.lock().unwrap();

        // SAFETY: env access is serialized by the test lock.
        unsafe {
            std::env::set_var("EDGEFLOW_TRIGGER_TYPE", "http");
            std::env::set_var("EDGEFLOW_BUS_SUBSCRIBE_TOPICS", "events/#");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.trigger_type, "http");
        assert_eq!(config.bus_subscribe_topics, "events/#");

        // SAFETY: env access is serialized by the test lock.
        unsafe {
            std::env::remove_var("EDGEFLOW_TRIGGER_TYPE");
            std::env::remove_var("EDGEFLOW_BUS_SUBSCRIBE_TOPICS");
        }
    }

    #[test]
    fn snapshots_map_configuration_fields() {
        let mut config = ServiceConfig::default();
        config.store_and_forward_enabled = true;
        config.store_and_forward_retry_interval_ms = 10_000;
        config.store_and_forward_max_retry_count = 3;

        let snapshot = config.store_and_forward();
        assert!(snapshot.enabled);
        assert_eq!(snapshot.retry_interval_ms, 10_000);
        assert_eq!(snapshot.max_retry_count, 3);

        let bus = config.message_bus().unwrap();
        assert_eq!(bus.subscribe_host.url(), "nats://localhost:4222");
        assert_eq!(bus.auth_mode, AuthMode::None);
    }

    #[test]
    fn invalid_auth_mode_is_rejected() {
        let mut config = ServiceConfig::default();
        config.bus_auth_mode = "kerberos".to_string();
        assert!(config.message_bus().is_err());
    }
}
