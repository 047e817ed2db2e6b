use crate::request::{header_values, push_header, Headers};
use serde::{Deserialize, Serialize};

const LOCATION: &str = "location";
const SET_COOKIE: &str = "set-cookie";
const CACHE_CONTROL: &str = "cache-control";

/// A synthetic response generated at the edge instead of reaching origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl EdgeResponse {
    pub fn from_status(status: u16) -> Self {
        Self {
            status: status.to_string(),
            status_description: None,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.status_description = Some(description.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        push_header(&mut self.headers, name, value);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status.parse().unwrap_or(500)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_all(name).next()
    }

    pub fn header_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        header_values(&self.headers, name)
    }
}

/// Sends the browser to the identity provider's authorize endpoint.
pub fn login_redirect(location: &str) -> EdgeResponse {
    EdgeResponse::from_status(307)
        .with_description("Temporary Redirect")
        .with_header(LOCATION, location)
}

/// Replays the original destination, carrying the session cookies.
pub fn temporary_redirect(location: &str, cookies: Vec<String>) -> EdgeResponse {
    let mut res = EdgeResponse::from_status(307).with_header(LOCATION, location);
    // The header map must list set-cookie even when there are no cookies.
    res.headers.entry(SET_COOKIE.to_string()).or_default();
    for cookie in cookies {
        res = res.with_header(SET_COOKIE, cookie);
    }
    res.with_header(CACHE_CONTROL, "no-cache")
}

pub fn unauthorized(body: impl Into<String>) -> EdgeResponse {
    EdgeResponse {
        body: Some(body.into()),
        ..EdgeResponse::from_status(403)
    }
}

/// A policy driven 301/302 without any other header.
pub fn redirect(status: u16, location: &str) -> EdgeResponse {
    EdgeResponse::from_status(status).with_header(LOCATION, location)
}

pub fn internal_error() -> EdgeResponse {
    EdgeResponse::from_status(500).with_description("Unknown Error")
}
