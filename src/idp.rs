//! Wire shapes of the Cognito hosted UI OAuth 2.0 endpoints.

use crate::error::AppError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const AUTHORIZE_PATH: &str = "/oauth2/authorize";
pub const TOKEN_PATH: &str = "/oauth2/token";
pub const LOGOUT_PATH: &str = "/logout";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

/// Form body of the authorization code grant.
#[derive(Serialize)]
pub struct ExchangePayload<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<&'a str>,
}

/// Query of the authorize redirect, in the order the provider documents it.
#[derive(Serialize)]
pub struct AuthCodePayload<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub response_type: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
    pub code_challenge_method: &'a str,
    pub code_challenge: &'a str,
}

#[derive(Serialize)]
pub struct LogoutPayload<'a> {
    pub client_id: &'a str,
    pub logout_uri: &'a str,
}

pub fn endpoint<T: Serialize>(domain: &str, path: &str, query: &T) -> Result<String, AppError> {
    let query = serde_urlencoded::to_string(query)
        .map_err(|err| AppError::invalid_input(format!("cannot encode {path} query: {err}")))?;
    Ok(format!("https://{domain}{path}?{query}"))
}

pub fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_query_keeps_field_order() {
        let url = endpoint(
            "auth.example.com",
            AUTHORIZE_PATH,
            &AuthCodePayload {
                client_id: "cid",
                redirect_uri: "https://app.example.com/_edge/auth/signin",
                response_type: "code",
                scope: "openid email",
                state: "abc",
                code_challenge_method: "S256",
                code_challenge: "xyz",
            },
        )
        .unwrap();
        assert_eq!(
            url,
            "https://auth.example.com/oauth2/authorize?client_id=cid\
             &redirect_uri=https%3A%2F%2Fapp.example.com%2F_edge%2Fauth%2Fsignin\
             &response_type=code&scope=openid+email&state=abc\
             &code_challenge_method=S256&code_challenge=xyz"
        );
    }

    #[test]
    fn exchange_payload_skips_missing_verifier() {
        let body = serde_urlencoded::to_string(ExchangePayload {
            grant_type: "authorization_code",
            client_id: "cid",
            redirect_uri: "https://app/cb",
            code: "c0de",
            code_verifier: None,
        })
        .unwrap();
        assert_eq!(
            body,
            "grant_type=authorization_code&client_id=cid&redirect_uri=https%3A%2F%2Fapp%2Fcb&code=c0de"
        );
    }

    #[test]
    fn basic_authorization_encodes_credentials() {
        assert_eq!(basic_authorization("id", "secret"), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn token_response_tolerates_missing_refresh_token() {
        let tokens: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","id_token":"i","token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(tokens.refresh_token, "");
    }
}
