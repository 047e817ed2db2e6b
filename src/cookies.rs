use crate::idp::TokenResponse;
use crate::request::{header_values, Headers, URI_COMPONENT};
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use std::collections::HashMap;

const COOKIE_ATTRIBUTES: &str = "Path=/; Secure; SameSite=Lax";

/// Flag cookie the Amplify client libraries look for after a hosted UI sign in.
pub const HOSTED_UI_FLAG: &str = "amplify-signin-with-hostedUI";

/// Session fields recovered from the Cognito cookie family. Missing cookies
/// are empty strings; nothing here is trusted until the tokens verify.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookies {
    pub user_id: String,
    pub user_scopes: String,
    pub user_token_id: String,
    pub user_token_access: String,
    pub user_token_refresh: String,
}

impl SessionCookies {
    pub fn from_headers(headers: &Headers, client_id: &str) -> Self {
        let cookie_header = header_values(headers, "cookie").collect::<Vec<_>>().join("; ");
        let cookie = parse(&cookie_header);
        let prefix = key_prefix(client_id);
        let lookup = |name: String| cookie.get(name.as_str()).cloned().unwrap_or_default();

        let user_id = lookup(format!("{prefix}.LastAuthUser"));
        let user_prefix = format!("{prefix}.{user_id}");
        Self {
            user_scopes: lookup(format!("{user_prefix}.tokenScopesString")),
            user_token_access: lookup(format!("{user_prefix}.accessToken")),
            user_token_id: lookup(format!("{user_prefix}.idToken")),
            user_token_refresh: lookup(format!("{user_prefix}.refreshToken")),
            user_id,
        }
    }
}

pub fn key_prefix(client_id: &str) -> String {
    format!("CognitoIdentityServiceProvider.{client_id}")
}

/// Parses a `Cookie` header. The first occurrence of a name wins and values
/// are percent-decoded when they decode cleanly.
pub fn parse(cookie_string: &str) -> HashMap<&str, String> {
    let mut cookies = HashMap::new();
    for kv in cookie_string.split(';') {
        let Some(index) = kv.find('=') else {
            continue;
        };
        let (key, value) = kv.split_at(index);
        let key = key.trim();
        if key.is_empty() || cookies.contains_key(key) {
            continue;
        }
        let mut value = value[1..].trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        let value = percent_decode_str(value)
            .decode_utf8()
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.insert(key, value);
    }
    cookies
}

pub fn persistent(name: &str, value: &str, max_age: u32) -> String {
    format!(
        "{}={}; Max-Age={}; {}",
        name,
        utf8_percent_encode(value, URI_COMPONENT),
        max_age,
        COOKIE_ATTRIBUTES
    )
}

pub fn expired(name: &str) -> String {
    persistent(name, "", 0)
}

pub fn session(name: &str, value: &str) -> String {
    format!(
        "{}={}; {}",
        name,
        utf8_percent_encode(value, URI_COMPONENT),
        COOKIE_ATTRIBUTES
    )
}

/// The six cookies the hosted UI client libraries expect after sign in.
pub fn session_cookies(
    client_id: &str,
    user_id: &str,
    tokens: &TokenResponse,
    scopes: &[String],
) -> Vec<String> {
    let prefix = key_prefix(client_id);
    let user_prefix = format!("{prefix}.{user_id}");
    vec![
        session(HOSTED_UI_FLAG, "true"),
        session(&format!("{prefix}.LastAuthUser"), user_id),
        session(&format!("{user_prefix}.accessToken"), &tokens.access_token),
        session(&format!("{user_prefix}.idToken"), &tokens.id_token),
        session(&format!("{user_prefix}.refreshToken"), &tokens.refresh_token),
        session(&format!("{user_prefix}.tokenScopesString"), &scopes.join(" ")),
    ]
}

/// Clears the same six cookies, e.g. on sign out.
pub fn expired_session_cookies(client_id: &str, user_id: &str) -> Vec<String> {
    let prefix = key_prefix(client_id);
    let user_prefix = format!("{prefix}.{user_id}");
    vec![
        expired(HOSTED_UI_FLAG),
        expired(&format!("{prefix}.LastAuthUser")),
        expired(&format!("{user_prefix}.accessToken")),
        expired(&format!("{user_prefix}.idToken")),
        expired(&format!("{user_prefix}.refreshToken")),
        expired(&format!("{user_prefix}.tokenScopesString")),
    ]
}
