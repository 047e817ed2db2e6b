//! The opaque `state` parameter carried through the authorize redirect.

use crate::crypter::{Crypter, EncryptionContext};
use crate::error::AppError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTripState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirected_from_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_code_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_code_challenge: Option<String>,
}

fn context(client_id: &str) -> EncryptionContext {
    EncryptionContext::from([("clientId".to_string(), client_id.to_string())])
}

pub fn encrypt_state(
    crypter: &dyn Crypter,
    client_id: &str,
    state: &RoundTripState,
) -> Result<String, AppError> {
    let json = serde_json::to_vec(state)
        .map_err(|err| AppError::invalid_input(format!("unencodable state: {err}")))?;
    let sealed = crypter.encrypt(&json, &context(client_id))?;
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

/// Never fails: anything that does not decode, decrypt and parse under this
/// client id reads as an empty state.
pub fn decrypt_state(crypter: &dyn Crypter, client_id: &str, encoded: &str) -> RoundTripState {
    match try_decrypt_state(crypter, client_id, encoded) {
        Ok(state) => {
            log::debug!("decrypted state: {state:?}");
            state
        }
        Err(err) => {
            log::warn!("failed to decrypt state: {err}");
            RoundTripState::default()
        }
    }
}

fn try_decrypt_state(
    crypter: &dyn Crypter,
    client_id: &str,
    encoded: &str,
) -> Result<RoundTripState, AppError> {
    let sealed = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|err| AppError::invalid_input(format!("malformed state encoding: {err}")))?;
    let json = crypter.decrypt(&sealed, &context(client_id))?;
    serde_json::from_slice(&json)
        .map_err(|err| AppError::invalid_input(format!("malformed state: {err}")))
}
