use crate::error::AppError;
use crate::logging::LogSettings;
use serde::Deserialize;
use serde_json::Value;

/// AES-256 needs exactly this many key bytes.
pub const STATE_KEY_LENGTH: usize = 32;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfiguration {
    #[serde(flatten)]
    pub log: LogSettings,
    pub user_pool_arn: String,
    pub idp_domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub callback_path: String,
    pub sign_out_path: String,
    pub post_sign_out_path: String,
    pub state_encryption_key: String,
    pub policy_enabled: bool,
    pub policy_data: Option<Value>,
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            user_pool_arn: String::new(),
            idp_domain: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: vec!["openid".to_string()],
            callback_path: "/_edge/auth/signin".to_string(),
            sign_out_path: "/_edge/auth/signout".to_string(),
            post_sign_out_path: "/".to_string(),
            state_encryption_key: String::new(),
            policy_enabled: false,
            policy_data: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct JsonWebKey {
    #[serde(rename = "kid")]
    pub key_id: String,
    #[serde(rename = "e", default)]
    pub exponent: String,
    #[serde(rename = "n", default)]
    pub modulus: String,
    #[serde(rename = "kty", default)]
    pub key_type: String,
    #[serde(rename = "alg", default)]
    pub algorithm: Option<String>,
}

impl JsonWebKey {
    pub fn is_rs256(&self) -> bool {
        self.key_type == "RSA"
            && self.algorithm.as_deref().map_or(true, |alg| alg == "RS256")
            && !self.modulus.is_empty()
            && !self.exponent.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Jwks {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub config: ServiceConfiguration,
    pub jwks: Jwks,
}

impl Config {
    /// Loads the configuration and key-set bundled into the edge binary.
    pub fn load() -> Result<Self, AppError> {
        Self::from_sources(
            include_str!("config.toml"),
            include_str!("well-known/jwks.json"),
        )
    }

    pub fn from_sources(config_toml: &str, jwks_json: &str) -> Result<Self, AppError> {
        let config: ServiceConfiguration = toml::from_str(config_toml)
            .map_err(|err| AppError::invalid_config(format!("unreadable configuration: {err}")))?;
        let jwks: Jwks = serde_json::from_str(jwks_json)
            .map_err(|err| AppError::invalid_config(format!("unreadable key-set: {err}")))?;
        let settings = Self { config, jwks };
        settings.validate()?;
        log::debug!("app config loaded for client {}", settings.config.client_id);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let config = &self.config;
        if config.state_encryption_key.is_empty() {
            return Err(AppError::invalid_config(
                "required config is missing or empty: state_encryption_key",
            ));
        }
        if config.state_encryption_key.len() != STATE_KEY_LENGTH {
            return Err(AppError::invalid_config(format!(
                "state_encryption_key must be {STATE_KEY_LENGTH} bytes, got {}",
                config.state_encryption_key.len()
            )));
        }
        for (name, value) in [
            ("client_id", &config.client_id),
            ("idp_domain", &config.idp_domain),
            ("user_pool_arn", &config.user_pool_arn),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::invalid_config(format!(
                    "required config is missing or empty: {name}"
                )));
            }
        }
        if !config.callback_path.starts_with('/') {
            return Err(AppError::invalid_config("callback_path must start with '/'"));
        }
        if self.user_pool_id().is_empty() || self.region().is_empty() {
            return Err(AppError::invalid_config(format!(
                "malformed user_pool_arn: {}",
                config.user_pool_arn
            )));
        }
        if !self.jwks.keys.iter().any(JsonWebKey::is_rs256) {
            return Err(AppError::invalid_config(
                "key-set does not contain usable RS256 keys",
            ));
        }
        Ok(())
    }

    /// `us-east-1_TESTPOOL` out of `arn:aws:cognito-idp:...:userpool/us-east-1_TESTPOOL`.
    pub fn user_pool_id(&self) -> &str {
        self.config
            .user_pool_arn
            .split_once('/')
            .map(|(_, id)| id)
            .unwrap_or_default()
    }

    pub fn region(&self) -> &str {
        match self.config.user_pool_arn.split(':').nth(3) {
            Some(region) if !region.is_empty() => region,
            _ => self
                .user_pool_id()
                .split_once('_')
                .map(|(region, _)| region)
                .unwrap_or_default(),
        }
    }

    pub fn issuer(&self) -> String {
        format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            self.region(),
            self.user_pool_id()
        )
    }

    pub fn scope(&self) -> String {
        self.config.scopes.join(" ")
    }
}

/// Settings for the URL rewriting service.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RewriteConfig {
    #[serde(flatten)]
    pub log: LogSettings,
    pub policy_data: Option<Value>,
}

impl RewriteConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::from_toml(include_str!("rewrite.toml"))
    }

    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        toml::from_str(source)
            .map_err(|err| AppError::invalid_config(format!("unreadable configuration: {err}")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;

    pub(crate) const TEST_CONFIG: &str = r#"
log_level = "silent"
user_pool_arn = "arn:aws:cognito-idp:us-east-1:000000000000:userpool/us-east-1_TESTPOOL"
idp_domain = "test.auth.us-east-1.amazoncognito.com"
client_id = "fake_client_id"
client_secret = "abc123"
scopes = ["phone", "email", "profile", "openid"]
callback_path = "/_edge/auth/signin"
state_encryption_key = "12345678901234567890123456789012"
"#;

    pub(crate) const TEST_JWKS: &str = include_str!("../tests/fixtures/jwks.json");

    pub(crate) fn test_config() -> Config {
        Config::from_sources(TEST_CONFIG, TEST_JWKS).unwrap()
    }

    #[test]
    fn loads_and_derives_pool_values() {
        let settings = test_config();
        assert_eq!(settings.user_pool_id(), "us-east-1_TESTPOOL");
        assert_eq!(settings.region(), "us-east-1");
        assert_eq!(
            settings.issuer(),
            "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_TESTPOOL"
        );
        assert_eq!(settings.scope(), "phone email profile openid");
        assert_eq!(settings.config.log.log_level.as_deref(), Some("silent"));
        assert!(!settings.config.policy_enabled);
    }

    #[test]
    fn applies_defaults() {
        let settings = test_config();
        assert!(settings.config.log.log_enabled);
        assert_eq!(settings.config.sign_out_path, "/_edge/auth/signout");
        assert_eq!(settings.config.post_sign_out_path, "/");
        assert!(settings.config.policy_data.is_none());
    }

    #[test]
    fn missing_encryption_key_is_invalid_config() {
        let source = TEST_CONFIG.replace(
            "state_encryption_key = \"12345678901234567890123456789012\"",
            "",
        );
        let err = Config::from_sources(&source, TEST_JWKS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.message().contains("state_encryption_key"));
    }

    #[test]
    fn short_encryption_key_is_invalid_config() {
        let source = TEST_CONFIG.replace("12345678901234567890123456789012", "short");
        let err = Config::from_sources(&source, TEST_JWKS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn malformed_sources_are_invalid_config() {
        let err = Config::from_sources("client_id = [", TEST_JWKS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = Config::from_sources(TEST_CONFIG, "{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = Config::from_sources(TEST_CONFIG, r#"{"keys": []}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn policy_data_table_becomes_json() {
        let source = format!("{TEST_CONFIG}\npolicy_enabled = true\n[policy_data]\nadmin_group = \"admins\"\n");
        let settings = Config::from_sources(&source, TEST_JWKS).unwrap();
        assert!(settings.config.policy_enabled);
        assert_eq!(
            settings.config.policy_data,
            Some(serde_json::json!({"admin_group": "admins"}))
        );
    }

    #[test]
    fn rewrite_config_defaults() {
        let config = RewriteConfig::from_toml("").unwrap();
        assert!(config.log.log_enabled);
        assert!(config.policy_data.is_none());
    }
}
