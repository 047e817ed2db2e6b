//! Token endpoint client with bounded, jittered exponential backoff.

use crate::error::AppError;
use rand::Rng;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_UNIT_MS: f64 = 25.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl IdpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one POST to the identity provider. `Err` means the exchange never
/// produced a response (connect failure, timeout, ...).
pub trait Transport: Send + Sync {
    fn send(&self, request: &IdpRequest) -> Result<IdpResponse, AppError>;
}

pub type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

pub struct IdpClient {
    transport: Box<dyn Transport>,
    sleep: Sleeper,
    max_attempts: u32,
}

impl IdpClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            sleep: Box::new(std::thread::sleep),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Sends `request`, retrying transport failures up to the attempt bound.
    ///
    /// A response whose content type is not JSON is a protocol violation and
    /// fails at once. The HTTP status is left for the caller to judge.
    pub fn send_with_retry(&self, request: &IdpRequest) -> Result<IdpResponse, AppError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.send(request) {
                Ok(response) => return check_content_type(response),
                Err(err) => {
                    log::debug!("failed cognito request attempt {attempts}: {err}");
                    if attempts >= self.max_attempts {
                        return Err(AppError::cognito("failed cognito request"));
                    }
                    log::debug!("attempting request again after exponential backoff");
                    (self.sleep)(backoff_delay(attempts, rand::rng().random()));
                }
            }
        }
    }
}

fn check_content_type(response: IdpResponse) -> Result<IdpResponse, AppError> {
    match response.content_type.as_deref() {
        Some(content_type) if content_type.starts_with("application/json") => Ok(response),
        other => Err(AppError::cognito(format!(
            "cognito responded with incorrect content-type: {}",
            other.unwrap_or("none")
        ))),
    }
}

/// `25 * (2^attempt + jitter * attempt)` milliseconds, `jitter` in `[0, 1)`.
pub fn backoff_delay(attempt: u32, jitter: f64) -> Duration {
    let exponential = 2f64.powi(attempt as i32);
    let millis = BACKOFF_UNIT_MS * (exponential + jitter * attempt as f64);
    Duration::from_micros((millis * 1000.0) as u64)
}
