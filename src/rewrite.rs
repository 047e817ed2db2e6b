use crate::error::AppError;
use crate::handler::EdgeHandler;
use crate::policy::Policy;
use crate::request::{EdgeRequest, Outcome};
use crate::responses;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The documented rewrite rules shipped with the rewriter.
pub const REWRITE_POLICY: &str = include_str!("policy/rewrite.json");

#[derive(Debug, Serialize)]
pub struct RewriteInput<'a> {
    pub uri: &'a str,
    pub uri_parts: Vec<&'a str>,
    pub querystring: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RewriteDecision {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub querystring: String,
    #[serde(default)]
    pub action: Option<String>,
}

impl RewriteDecision {
    fn redirect_status(&self) -> Option<u16> {
        match self.action.as_deref() {
            Some("REDIRECT_301") => Some(301),
            Some("REDIRECT_302") => Some(302),
            _ => None,
        }
    }
}

/// Rewrites or redirects requests as a policy decides. Never blocks traffic
/// on its own failure: any evaluation error forwards the request untouched.
pub struct UrlRewriter {
    policy: Arc<dyn Policy>,
}

impl UrlRewriter {
    pub fn new(policy: Arc<dyn Policy>) -> Self {
        Self { policy }
    }

    fn decide(&self, request: &EdgeRequest) -> Result<Option<RewriteDecision>, AppError> {
        let input = RewriteInput {
            uri: &request.uri,
            uri_parts: request.uri.split('/').filter(|part| !part.is_empty()).collect(),
            querystring: &request.querystring,
        };
        let input = serde_json::to_value(&input)
            .map_err(|err| AppError::invalid_input(format!("unencodable rewrite input: {err}")))?;
        let decisions = self.policy.evaluate(&input)?;
        log::debug!("request {} evaluated against policy: {decisions:?}", request.uri);

        decisions
            .into_iter()
            .next()
            .map(|decision| {
                serde_json::from_value(decision)
                    .map_err(|err| AppError::invalid_input(format!("malformed rewrite decision: {err}")))
            })
            .transpose()
    }
}

impl EdgeHandler for UrlRewriter {
    fn handle(&self, mut request: EdgeRequest) -> Result<Outcome, AppError> {
        let decision = match self.decide(&request) {
            Ok(Some(decision)) => decision,
            Ok(None) => return Ok(Outcome::Forward(request)),
            Err(err) => {
                log::error!("error evaluating request against policy: {err}");
                return Ok(Outcome::Forward(request));
            }
        };

        if let Some(status) = decision.redirect_status() {
            let uri = if decision.uri.is_empty() { "/" } else { &decision.uri };
            let location = if decision.querystring.is_empty() {
                uri.to_string()
            } else {
                format!("{uri}?{}", decision.querystring)
            };
            return Ok(Outcome::Respond(responses::redirect(status, &location)));
        }

        request.uri = decision.uri;
        request.querystring = decision.querystring;
        Ok(Outcome::Forward(request))
    }
}
