use std::collections::HashMap;

use edgeflow_domain::{SecretError, SecretProvider};

use crate::traits::MessagingError;

pub const SECRET_USERNAME_KEY: &str = "username";
pub const SECRET_PASSWORD_KEY: &str = "password";
pub const SECRET_CLIENT_CERT_KEY: &str = "clientcert";
pub const SECRET_CLIENT_KEY_KEY: &str = "clientkey";
pub const SECRET_CA_CERT_KEY: &str = "cacert";

/// How a transport client authenticates against its broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    None,
    UsernamePassword,
    ClientCert,
    CaCert,
}

impl AuthMode {
    pub fn parse(value: &str) -> Result<Self, MessagingError> {
        match value.to_lowercase().as_str() {
            "" | "none" => Ok(AuthMode::None),
            "usernamepassword" => Ok(AuthMode::UsernamePassword),
            "clientcert" => Ok(AuthMode::ClientCert),
            "cacert" => Ok(AuthMode::CaCert),
            other => Err(MessagingError::Auth(format!("unknown auth mode '{other}'"))),
        }
    }
}

/// Secret data resolved for one auth mode. Certificate entries are file
/// paths; the transport clients consume paths, not PEM bodies.
#[derive(Debug, Clone, Default)]
pub struct SecretData {
    pub username: String,
    pub password: String,
    pub client_cert: String,
    pub client_key: String,
    pub ca_cert: String,
}

/// Fetch and validate the secret data required by `mode`. `None` auth
/// needs no secret and resolves to no credentials.
pub async fn resolve_credentials(
    mode: AuthMode,
    secret_name: &str,
    provider: &dyn SecretProvider,
) -> Result<Option<SecretData>, MessagingError> {
    if mode == AuthMode::None {
        return Ok(None);
    }
    let data = provider.get_secret(secret_name).await?;
    validate_secret_data(mode, secret_name, &data).map(Some)
}

/// Check that every key `mode` requires is present and non-empty.
pub fn validate_secret_data(
    mode: AuthMode,
    secret_name: &str,
    data: &HashMap<String, String>,
) -> Result<SecretData, MessagingError> {
    let required: &[&str] = match mode {
        AuthMode::None => &[],
        AuthMode::UsernamePassword => &[SECRET_USERNAME_KEY, SECRET_PASSWORD_KEY],
        AuthMode::ClientCert => &[SECRET_CLIENT_CERT_KEY, SECRET_CLIENT_KEY_KEY],
        AuthMode::CaCert => &[SECRET_CA_CERT_KEY],
    };

    let missing: Vec<String> = required
        .iter()
        .filter(|key| data.get(**key).map_or(true, |value| value.is_empty()))
        .map(|key| key.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(MessagingError::Secret(SecretError::MissingKeys {
            name: secret_name.to_string(),
            missing,
        }));
    }

    let get = |key: &str| data.get(key).cloned().unwrap_or_default();
    Ok(SecretData {
        username: get(SECRET_USERNAME_KEY),
        password: get(SECRET_PASSWORD_KEY),
        client_cert: get(SECRET_CLIENT_CERT_KEY),
        client_key: get(SECRET_CLIENT_KEY_KEY),
        ca_cert: get(SECRET_CA_CERT_KEY),
    })
}
