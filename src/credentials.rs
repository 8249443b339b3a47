//! Network credentials and the validation rule shared by both intakes.
//!
//! A [`Credentials`] value can only be built through [`Credentials::new`],
//! so holding one proves both fields are non-empty after trimming.  The
//! stored values are exactly what was submitted; trimming is only used
//! for the check.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PayloadError, ValidationError};

/// A validated `{ssid, password}` pair.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    #[serde(rename = "ssid")]
    network_id: String,
    #[serde(rename = "password")]
    secret: String,
}

impl Credentials {
    /// Validate and build a credential pair.
    pub fn new(
        network_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let network_id = network_id.into();
        let secret = secret.into();
        validate(&network_id, &secret)?;
        Ok(Self { network_id, secret })
    }

    /// Parse a BLE characteristic value: UTF-8 JSON with both fields present.
    pub fn from_ble_payload(value: &[u8]) -> Result<Result<Self, ValidationError>, PayloadError> {
        let text = core::str::from_utf8(value).map_err(|_| PayloadError::InvalidUtf8)?;
        let fields: CredentialFields =
            serde_json::from_str(text).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        Ok(fields.into_credentials())
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network_id", &self.network_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The single credential rule: both fields non-empty after trimming.
pub fn validate(network_id: &str, secret: &str) -> Result<(), ValidationError> {
    if network_id.trim().is_empty() {
        return Err(ValidationError::EmptyNetworkId);
    }
    if secret.trim().is_empty() {
        return Err(ValidationError::EmptySecret);
    }
    Ok(())
}

/// Raw wire/disk shape before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialFields {
    pub ssid: String,
    pub password: String,
}

impl CredentialFields {
    pub fn into_credentials(self) -> Result<Credentials, ValidationError> {
        Credentials::new(self.ssid, self.password)
    }
}
