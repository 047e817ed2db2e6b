//! Glue between the Fastly Compute host and the host independent handlers.

use crate::client::{IdpRequest, IdpResponse, Transport};
use crate::config::Config;
use crate::error::AppError;
use crate::handler::{self, EdgeHandler};
use crate::logging::LogSettings;
use crate::request::{push_header, EdgeRequest, Headers, Outcome};
use crate::responses::EdgeResponse;
use fastly::http::StatusCode;
use fastly::{Error, Request, Response, SecretStore};

pub const ORIGIN_BACKEND: &str = "origin";
pub const IDP_BACKEND: &str = "idp";
pub const SECRET_STORE: &str = "edge_auth";

/// Installs the Fastly logger once per instance, copying to stdout so that
/// log tailing works too.
pub fn init_logging(settings: &LogSettings, endpoint: &str) {
    log_fastly::Logger::builder()
        .max_level(settings.level_filter())
        .default_endpoint(endpoint)
        .echo_stdout(true)
        .init();
    log::debug!(
        "FASTLY_SERVICE_VERSION: {}",
        std::env::var("FASTLY_SERVICE_VERSION").unwrap_or_default()
    );
}

/// Overrides bundled secrets with the secret store entries, when the store exists.
pub fn apply_secrets(settings: &mut Config) -> Result<(), AppError> {
    let store = match SecretStore::open(SECRET_STORE) {
        Ok(store) => store,
        Err(err) => {
            log::debug!("secret store {SECRET_STORE} unavailable, using bundled values: {err}");
            return Ok(());
        }
    };
    let config = &mut settings.config;
    for (name, target) in [
        ("client_secret", &mut config.client_secret),
        ("state_encryption_key", &mut config.state_encryption_key),
    ] {
        if let Some(secret) = store.get(name) {
            *target = String::from_utf8(secret.plaintext().to_vec())
                .map_err(|_| AppError::invalid_config(format!("secret {name} is not UTF-8")))?;
        }
    }
    settings.validate()
}

pub fn edge_request(req: &Request) -> EdgeRequest {
    let mut headers = Headers::new();
    for (name, value) in req.get_headers() {
        if let Ok(value) = value.to_str() {
            push_header(&mut headers, name.as_str(), value);
        }
    }
    EdgeRequest {
        client_ip: req
            .get_client_ip_addr()
            .map(|ip| ip.to_string())
            .unwrap_or_default(),
        method: req.get_method_str().to_string(),
        uri: req.get_path().to_string(),
        querystring: req.get_query_str().unwrap_or_default().to_string(),
        headers,
    }
}

fn into_response(res: EdgeResponse) -> Response {
    let status = StatusCode::from_u16(res.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::from_status(status);
    for header in res.headers.values().flatten() {
        response.append_header(header.key.as_str(), header.value.as_str());
    }
    if let Some(body) = res.body {
        response.set_body(body);
    }
    response
}

/// Runs `handler` for one request and performs its outcome.
pub fn serve(handler: &dyn EdgeHandler, mut req: Request) -> Result<Response, Error> {
    match handler::invoke(handler, edge_request(&req)) {
        Outcome::Forward(forward) => {
            if req.get_path() != forward.uri {
                req.set_path(&forward.uri);
            }
            if forward.querystring.is_empty() {
                req.remove_query();
            } else {
                req.set_query_str(&forward.querystring);
            }
            Ok(req.send(ORIGIN_BACKEND)?)
        }
        Outcome::Respond(response) => Ok(into_response(response)),
    }
}

/// Token endpoint calls over a named Fastly backend.
pub struct FastlyTransport {
    backend: String,
}

impl FastlyTransport {
    pub fn new(backend: &str) -> Self {
        Self {
            backend: backend.to_string(),
        }
    }
}

impl Transport for FastlyTransport {
    fn send(&self, request: &IdpRequest) -> Result<IdpResponse, AppError> {
        let mut req = Request::post(request.url.as_str());
        for (name, value) in &request.headers {
            req.set_header(name.as_str(), value.as_str());
        }
        req.set_body(request.body.as_str());

        let mut resp = req
            .send(self.backend.as_str())
            .map_err(|err| AppError::unknown(format!("request to {} failed: {err}", self.backend)))?;
        Ok(IdpResponse {
            status: resp.get_status().as_u16(),
            content_type: resp.get_header_str("content-type").map(str::to_string),
            body: resp.take_body_bytes(),
        })
    }
}
