pub mod http;
pub mod messagebus;
pub mod mqtt;
pub mod trigger;
pub mod util;

pub use http::{HttpTrigger, TRIGGER_ROUTE};
pub use messagebus::MessageBusTrigger;
pub use mqtt::{ExternalMqttConfig, MqttTrigger};
pub use trigger::{Deferred, MessageProcessor, Trigger};
pub use util::{infer_inbound_content_type, infer_response_content_type};
