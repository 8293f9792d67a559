pub mod config;
pub mod service;
pub mod telemetry;

pub use config::ServiceConfig;
pub use service::{
    ApplicationService, CustomTriggerContext, StoreAndForwardController, TriggerFactory,
    TRIGGER_TYPE_EXTERNAL_MQTT, TRIGGER_TYPE_HTTP, TRIGGER_TYPE_MESSAGE_BUS,
};
pub use telemetry::init_logging;
