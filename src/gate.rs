//! Helpers shared by the two legs of the auth gate, and the router that
//! picks a leg per request.

use crate::check_auth::CheckAuth;
use crate::client::{IdpClient, IdpRequest, Transport};
use crate::config::Config;
use crate::cookies::{self, SessionCookies};
use crate::crypter::{AesGcmCrypter, Crypter};
use crate::error::AppError;
use crate::handler::EdgeHandler;
use crate::idp::{self, AuthCodePayload, ExchangePayload, LogoutPayload, TokenResponse};
use crate::jwt::{CognitoJwtDecoder, DecodedTokens, TokenDecoder};
use crate::parse_auth::ParseAuth;
use crate::pkce::{Pkce, CODE_CHALLENGE_METHOD};
use crate::policy::{Policy, RulePolicy};
use crate::request::{parse_query, stringify_query, EdgeRequest, Outcome, RequestData};
use crate::responses::{self, EdgeResponse};
use crate::state::{self, RoundTripState};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Group-gated policy shipped with the gate.
pub const AUTH_POLICY: &str = include_str!("policy/auth.json");

const DEFAULT_DENY_MESSAGE: &str = "unauthorized";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub message: String,
}

#[derive(Serialize)]
struct PolicyInput<'a> {
    request: &'a RequestData,
    tokens: &'a DecodedTokens,
}

/// Policies may answer with any JSON value; only `null`, `false`, `0` and
/// `""` deny.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Clone)]
pub struct AuthService {
    config: Arc<Config>,
    crypter: Arc<dyn Crypter>,
    decoder: Arc<dyn TokenDecoder>,
    policy: Option<Arc<dyn Policy>>,
    client: Arc<IdpClient>,
}

impl AuthService {
    pub fn new(
        config: Config,
        crypter: Arc<dyn Crypter>,
        decoder: Arc<dyn TokenDecoder>,
        policy: Option<Arc<dyn Policy>>,
        client: IdpClient,
    ) -> Self {
        Self {
            config: Arc::new(config),
            crypter,
            decoder,
            policy,
            client: Arc::new(client),
        }
    }

    /// Wires the shipped collaborators: AES-GCM state, Cognito token
    /// verification, and the bundled policy when `policy_enabled` is set.
    pub fn from_config(config: Config, transport: impl Transport + 'static) -> Result<Self, AppError> {
        let crypter = AesGcmCrypter::new(config.config.state_encryption_key.as_bytes())?;
        let decoder = CognitoJwtDecoder::new(&config)?;
        let policy: Option<Arc<dyn Policy>> = if config.config.policy_enabled {
            Some(Arc::new(RulePolicy::from_json(
                AUTH_POLICY,
                config.config.policy_data.clone(),
            )?))
        } else {
            None
        };
        Ok(Self::new(
            config,
            Arc::new(crypter),
            Arc::new(decoder),
            policy,
            IdpClient::new(transport),
        ))
    }

    pub fn with_client(mut self, client: IdpClient) -> Self {
        self.client = Arc::new(client);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parse_request(&self, request: &EdgeRequest) -> RequestData {
        RequestData {
            host: request.header("host").unwrap_or_default().to_string(),
            cookies: SessionCookies::from_headers(&request.headers, &self.config.config.client_id),
            querystring: parse_query(&request.querystring),
            path: if request.uri.is_empty() {
                "/".to_string()
            } else {
                request.uri.clone()
            },
        }
    }

    fn redirect_uri(&self, host: &str) -> String {
        format!("https://{host}{}", self.config.config.callback_path)
    }

    /// 307 to the hosted UI with a fresh PKCE pair sealed into `state`.
    pub fn login_redirect(&self, request: &RequestData) -> Result<EdgeResponse, AppError> {
        let redirected_from_url = if request.path == self.config.config.callback_path {
            "/".to_string()
        } else {
            let mut url = format!(
                "https://{}{}?{}",
                request.host,
                request.path,
                stringify_query(&request.querystring)
            );
            if url.ends_with('?') {
                url.pop();
            }
            url
        };
        let pkce = Pkce::generate(self.crypter.as_ref());
        let state = self.encrypt_state(&RoundTripState {
            redirected_from_url: Some(redirected_from_url),
            pkce_code_verifier: Some(pkce.code_verifier),
            pkce_code_challenge: Some(pkce.code_challenge.clone()),
        })?;

        let redirect_uri = self.redirect_uri(&request.host);
        let scope = self.config.scope();
        let location = idp::endpoint(
            &self.config.config.idp_domain,
            idp::AUTHORIZE_PATH,
            &AuthCodePayload {
                client_id: &self.config.config.client_id,
                redirect_uri: &redirect_uri,
                response_type: "code",
                scope: &scope,
                state: &state,
                code_challenge_method: CODE_CHALLENGE_METHOD,
                code_challenge: &pkce.code_challenge,
            },
        )?;
        Ok(responses::login_redirect(&location))
    }

    /// Verified tokens from the session cookies, or `None` when they do not verify.
    pub fn read_tokens(&self, cookies: &SessionCookies) -> Option<DecodedTokens> {
        match self
            .decoder
            .decode(&cookies.user_token_access, &cookies.user_token_id)
        {
            Ok(tokens) => Some(tokens),
            Err(err) => {
                log::debug!("failed to read tokens for user {:?}: {err}", cookies.user_id);
                None
            }
        }
    }

    pub fn encrypt_state(&self, state: &RoundTripState) -> Result<String, AppError> {
        state::encrypt_state(self.crypter.as_ref(), &self.config.config.client_id, state)
    }

    pub fn decrypt_state(&self, encoded: &str) -> RoundTripState {
        state::decrypt_state(self.crypter.as_ref(), &self.config.config.client_id, encoded)
    }

    /// Evaluates `{request, tokens}`; only the first decision counts.
    pub fn check_policy(
        &self,
        request: &RequestData,
        tokens: &DecodedTokens,
    ) -> Result<PolicyVerdict, AppError> {
        let Some(policy) = &self.policy else {
            return Ok(PolicyVerdict {
                allowed: true,
                message: String::new(),
            });
        };
        let input = serde_json::to_value(PolicyInput { request, tokens })
            .map_err(|err| AppError::invalid_input(format!("unencodable policy input: {err}")))?;
        let decision = policy.evaluate(&input)?.into_iter().next();

        let allowed = decision
            .as_ref()
            .and_then(|decision| decision.get("allowed"))
            .is_some_and(is_truthy);
        if !allowed {
            log::info!("failed policy check for {}: {decision:?}", request.path);
        }
        let message = decision
            .as_ref()
            .and_then(|decision| decision.get("message"))
            .and_then(|message| message.as_str())
            .filter(|message| !message.is_empty())
            .unwrap_or(DEFAULT_DENY_MESSAGE)
            .to_string();
        Ok(PolicyVerdict { allowed, message })
    }

    /// Trades an authorization code for tokens at the token endpoint.
    pub fn exchange_code(
        &self,
        host: &str,
        code: &str,
        state: &RoundTripState,
    ) -> Result<TokenResponse, AppError> {
        let config = &self.config.config;
        let redirect_uri = self.redirect_uri(host);
        let body = serde_urlencoded::to_string(ExchangePayload {
            grant_type: "authorization_code",
            client_id: &config.client_id,
            redirect_uri: &redirect_uri,
            code,
            code_verifier: state.pkce_code_verifier.as_deref(),
        })
        .map_err(|err| AppError::invalid_input(format!("cannot encode token request: {err}")))?;

        let request = IdpRequest {
            url: format!("https://{}{}", config.idp_domain, idp::TOKEN_PATH),
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
                (
                    "Authorization".to_string(),
                    idp::basic_authorization(&config.client_id, &config.client_secret),
                ),
            ],
            body,
        };
        let response = self.client.send_with_retry(&request)?;
        if !response.is_success() {
            return Err(AppError::cognito(format!(
                "token endpoint responded with status {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )));
        }
        serde_json::from_slice(&response.body)
            .map_err(|err| AppError::cognito(format!("unreadable token response: {err}")))
    }

    /// The six session cookies for freshly issued tokens, keyed by the
    /// username inside the id token.
    pub fn session_cookies(&self, tokens: &TokenResponse) -> Result<Vec<String>, AppError> {
        let claims = self
            .decoder
            .decode_id_token(&tokens.id_token)
            .map_err(|err| AppError::cognito(format!("issued id token did not verify: {err}")))?;
        let user_id = claims
            .custom
            .username
            .filter(|username| !username.is_empty())
            .ok_or_else(|| AppError::cognito("issued id token carries no cognito:username"))?;
        Ok(cookies::session_cookies(
            &self.config.config.client_id,
            &user_id,
            tokens,
            &self.config.config.scopes,
        ))
    }

    /// Clears the session and sends the browser through the hosted UI logout.
    pub fn sign_out(&self, request: &RequestData) -> Result<EdgeResponse, AppError> {
        let config = &self.config.config;
        let logout_uri = format!("https://{}{}", request.host, config.post_sign_out_path);
        let location = idp::endpoint(
            &config.idp_domain,
            idp::LOGOUT_PATH,
            &LogoutPayload {
                client_id: &config.client_id,
                logout_uri: &logout_uri,
            },
        )?;
        Ok(responses::temporary_redirect(
            &location,
            cookies::expired_session_cookies(&config.client_id, &request.cookies.user_id),
        ))
    }
}

/// Sends the provider callback to the code exchange and everything else
/// through the session check.
pub struct AuthGate {
    callback_path: String,
    check: CheckAuth,
    parse: ParseAuth,
}

impl AuthGate {
    pub fn new(service: AuthService) -> Self {
        Self {
            callback_path: service.config().config.callback_path.clone(),
            check: CheckAuth::new(service.clone()),
            parse: ParseAuth::new(service),
        }
    }
}

impl EdgeHandler for AuthGate {
    fn handle(&self, request: EdgeRequest) -> Result<Outcome, AppError> {
        if request.uri == self.callback_path {
            self.parse.handle(request)
        } else {
            self.check.handle(request)
        }
    }
}
