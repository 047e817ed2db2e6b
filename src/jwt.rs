use crate::config::Config;
use crate::error::AppError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Claims Cognito adds on top of the registered ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitoClaims {
    #[serde(default)]
    pub token_use: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(
        rename = "cognito:username",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type CognitoTokenClaims = JWTClaims<CognitoClaims>;

/// Claims of a verified access/id token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTokens {
    pub access_token: CognitoTokenClaims,
    pub id_token: CognitoTokenClaims,
}

pub trait TokenDecoder: Send + Sync {
    fn decode_access_token(&self, token: &str) -> Result<CognitoTokenClaims, AppError>;
    fn decode_id_token(&self, token: &str) -> Result<CognitoTokenClaims, AppError>;

    /// Both tokens verify or neither counts.
    fn decode(&self, access_token: &str, id_token: &str) -> Result<DecodedTokens, AppError> {
        Ok(DecodedTokens {
            access_token: self.decode_access_token(access_token)?,
            id_token: self.decode_id_token(id_token)?,
        })
    }

    fn verify(&self, access_token: &str, id_token: &str) -> Result<(), AppError> {
        self.decode(access_token, id_token).map(|_| ())
    }
}

/// Verifies Cognito RS256 tokens against the key-set loaded with the configuration.
pub struct CognitoJwtDecoder {
    keys: HashMap<String, RS256PublicKey>,
    issuer: String,
    client_id: String,
    scopes: Vec<String>,
}

impl CognitoJwtDecoder {
    pub fn new(settings: &Config) -> Result<Self, AppError> {
        let mut keys = HashMap::new();
        for key in settings.jwks.keys.iter().filter(|key| key.is_rs256()) {
            // Reconstruct the public key used to sign the token.
            let modulus = decode_component(&key.modulus)?;
            let exponent = decode_component(&key.exponent)?;
            let public_key = RS256PublicKey::from_components(&modulus, &exponent)
                .map_err(|err| {
                    AppError::invalid_config(format!("unusable key {}: {err}", key.key_id))
                })?
                .with_key_id(&key.key_id);
            keys.insert(key.key_id.clone(), public_key);
        }
        if keys.is_empty() {
            return Err(AppError::invalid_config("key-set does not contain usable RS256 keys"));
        }
        Ok(Self {
            keys,
            issuer: settings.issuer(),
            client_id: settings.config.client_id.clone(),
            scopes: settings.config.scopes.clone(),
        })
    }

    fn verify_signed(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> Result<CognitoTokenClaims, AppError> {
        let metadata = Token::decode_metadata(token)
            .map_err(|err| AppError::invalid_input(format!("malformed token: {err}")))?;
        // Match the public key id for the JSON web key.
        let key_id = metadata.key_id().unwrap_or_default();
        let public_key = self
            .keys
            .get(key_id)
            .ok_or_else(|| AppError::invalid_input(format!("unknown signing key: {key_id}")))?;

        let mut verification_options = VerificationOptions::default();
        verification_options.allowed_issuers = Some(HashSet::from_strings(&[&self.issuer]));
        if let Some(audience) = audience {
            verification_options.allowed_audiences = Some(HashSet::from_strings(&[audience]));
        }
        public_key
            .verify_token::<CognitoClaims>(token, Some(verification_options))
            .map_err(|err| AppError::invalid_input(format!("token verification failed: {err}")))
    }
}

fn decode_component(value: &str) -> Result<Vec<u8>, AppError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|err| AppError::invalid_config(format!("malformed key component: {err}")))
}

impl TokenDecoder for CognitoJwtDecoder {
    fn decode_access_token(&self, token: &str) -> Result<CognitoTokenClaims, AppError> {
        let claims = self.verify_signed(token, None)?;
        let custom = &claims.custom;
        if custom.token_use != "access" {
            return Err(AppError::invalid_input("not an access token"));
        }
        if custom.client_id.as_deref() != Some(self.client_id.as_str()) {
            return Err(AppError::invalid_input("access token issued to another client"));
        }
        let granted = custom.scope.as_deref().unwrap_or_default();
        if !granted
            .split_whitespace()
            .any(|scope| self.scopes.iter().any(|wanted| wanted == scope))
        {
            return Err(AppError::invalid_input("access token lacks the required scopes"));
        }
        Ok(claims)
    }

    fn decode_id_token(&self, token: &str) -> Result<CognitoTokenClaims, AppError> {
        let claims = self.verify_signed(token, Some(&self.client_id))?;
        if claims.custom.token_use != "id" {
            return Err(AppError::invalid_input("not an id token"));
        }
        Ok(claims)
    }
}
