//! Login material derived from the account credentials.

use fleetlink_domain::message::md5_hex;

/// Account identity plus the per-instance application id.
#[derive(Debug, Clone)]
pub struct MqttCredentials {
    pub user_id: String,
    pub key: String,
    pub app_id: String,
}

impl MqttCredentials {
    /// Credentials with a freshly generated application id.
    #[must_use]
    pub fn new(user_id: impl Into<String>, key: impl Into<String>) -> Self {
        let app_id = md5_hex(&format!("API{}", uuid::Uuid::new_v4()));
        Self::with_app_id(user_id, key, app_id)
    }

    #[must_use]
    pub fn with_app_id(user_id: impl Into<String>, key: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            key: key.into(),
            app_id: app_id.into(),
        }
    }

    /// Broker password: `md5(user_id + key)`.
    #[must_use]
    pub fn password(&self) -> String {
        md5_hex(&format!("{}{}", self.user_id, self.key))
    }

    #[must_use]
    pub fn client_id(&self) -> String {
        format!("app:{}", self.app_id)
    }
}
