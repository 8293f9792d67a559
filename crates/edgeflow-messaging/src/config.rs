use crate::auth::AuthMode;
use crate::traits::MessagingError;

/// One side of a bus connection: where to dial and how.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInfo {
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

impl HostInfo {
    pub fn new(host: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: protocol.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Message bus connection settings for the bus trigger.
#[derive(Debug, Clone, Default)]
pub struct MessageBusConfig {
    pub subscribe_host: HostInfo,
    pub publish_host: HostInfo,
    pub auth_mode: AuthMode,
    pub secret_name: String,
}

impl MessageBusConfig {
    /// URL the single bus connection dials: the subscribe host, or the
    /// publish host for publish-only services.
    pub fn broker_url(&self) -> Result<String, MessagingError> {
        if self.subscribe_host.is_configured() {
            Ok(self.subscribe_host.url())
        } else if self.publish_host.is_configured() {
            Ok(self.publish_host.url())
        } else {
            Err(MessagingError::Connect(
                "no message bus host configured".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_info_formats_a_url() {
        let host = HostInfo::new("broker.local", 4222, "nats");
        assert_eq!(host.url(), "nats://broker.local:4222");
        assert!(host.is_configured());
        assert!(!HostInfo::default().is_configured());
    }

    #[test]
    fn broker_url_prefers_the_subscribe_host() {
        let config = MessageBusConfig {
            subscribe_host: HostInfo::new("sub.local", 4222, "nats"),
            publish_host: HostInfo::new("pub.local", 4222, "nats"),
            ..Default::default()
        };
        assert_eq!(config.broker_url().unwrap(), "nats://sub.local:4222");

        let publish_only = MessageBusConfig {
            publish_host: HostInfo::new("pub.local", 4222, "nats"),
            ..Default::default()
        };
        assert_eq!(publish_only.broker_url().unwrap(), "nats://pub.local:4222");

        assert!(MessageBusConfig::default().broker_url().is_err());
    }
}
