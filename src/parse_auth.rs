use crate::error::AppError;
use crate::gate::AuthService;
use crate::handler::EdgeHandler;
use crate::request::{EdgeRequest, Outcome, QueryValue};
use crate::responses;

/// Completes the hosted UI sign in: trades the authorization code for
/// tokens and replays the original destination with session cookies.
pub struct ParseAuth {
    service: AuthService,
}

impl ParseAuth {
    pub fn new(service: AuthService) -> Self {
        log::debug!("parse-auth service initialized");
        Self { service }
    }
}

impl EdgeHandler for ParseAuth {
    fn handle(&self, event: EdgeRequest) -> Result<Outcome, AppError> {
        let request = self.service.parse_request(&event);

        // Without a code the request did not come back from the provider.
        let Some(code) = request.querystring.get("code").and_then(QueryValue::as_single) else {
            return Ok(Outcome::Respond(self.service.login_redirect(&request)?));
        };

        let encoded_state = request
            .querystring
            .get("state")
            .and_then(QueryValue::as_single)
            .unwrap_or_default();
        let state = self.service.decrypt_state(encoded_state);
        let tokens = self.service.exchange_code(&request.host, code, &state)?;
        let cookies = self.service.session_cookies(&tokens)?;

        let location = state
            .redirected_from_url
            .as_deref()
            .filter(|location| !location.is_empty())
            .unwrap_or("/");
        Ok(Outcome::Respond(responses::temporary_redirect(location, cookies)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{json_response, ScriptedTransport};
    use crate::client::IdpResponse;
    use crate::error::{AppError, ErrorKind};
    use crate::gate::tests::{service, HOST};
    use crate::jwt::tests::{access_token, id_token};
    use crate::request::parse_query;
    use crate::state::RoundTripState;

    fn token_body() -> String {
        serde_json::json!({
            "access_token": access_token(),
            "id_token": id_token("user-1"),
            "refresh_token": "refresh-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })
        .to_string()
    }

    fn callback(querystring: &str) -> EdgeRequest {
        EdgeRequest::new("GET", "/_edge/auth/signin", querystring).with_header("host", HOST)
    }

    fn respond(outcome: Outcome) -> crate::responses::EdgeResponse {
        match outcome {
            Outcome::Respond(response) => response,
            Outcome::Forward(request) => panic!("request was forwarded: {request:?}"),
        }
    }

    #[test]
    fn code_exchange_sets_session_and_replays_origin() {
        let transport = ScriptedTransport::new(vec![Ok(json_response(&token_body()))]);
        let service = service(&transport);
        let state = service
            .encrypt_state(&RoundTripState {
                redirected_from_url: Some("https://app.dev.example.com/private?a=1".to_string()),
                pkce_code_verifier: Some("the-verifier".to_string()),
                pkce_code_challenge: Some("the-challenge".to_string()),
            })
            .unwrap();

        let parse_auth = ParseAuth::new(service);
        let response = respond(
            parse_auth
                .handle(callback(&format!("code=c0de&state={state}")))
                .unwrap(),
        );

        assert_eq!(response.status, "307");
        assert!(response.status_description.is_none());
        assert_eq!(response.header("location"), Some("https://app.dev.example.com/private?a=1"));
        assert_eq!(response.header("cache-control"), Some("no-cache"));
        let cookies: Vec<_> = response.header_all("set-cookie").collect();
        assert_eq!(cookies.len(), 6);
        assert_eq!(cookies[0], "amplify-signin-with-hostedUI=true; Path=/; Secure; SameSite=Lax");
        assert!(cookies[4].starts_with(
            "CognitoIdentityServiceProvider.fake_client_id.user-1.refreshToken=refresh-token;"
        ));
        assert!(cookies[5].contains(".tokenScopesString=phone%20email%20profile%20openid;"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let form = parse_query(&sent[0].body);
        assert_eq!(form["code"].as_single(), Some("c0de"));
        assert_eq!(form["code_verifier"].as_single(), Some("the-verifier"));
    }

    #[test]
    fn missing_code_starts_a_new_login() {
        let transport = ScriptedTransport::default();
        let parse_auth = ParseAuth::new(service(&transport));

        for querystring in ["", "state=abc", "code=a&code=b"] {
            let response = respond(parse_auth.handle(callback(querystring)).unwrap());
            assert_eq!(response.status, "307");
            assert!(response.header("location").unwrap().contains("/oauth2/authorize?"));
        }
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn unreadable_state_lands_on_root() {
        let transport = ScriptedTransport::new(vec![Ok(json_response(&token_body()))]);
        let parse_auth = ParseAuth::new(service(&transport));

        let response = respond(parse_auth.handle(callback("code=c0de&state=forged")).unwrap());
        assert_eq!(response.header("location"), Some("/"));
        let form = parse_query(&transport.sent()[0].body);
        assert!(!form.contains_key("code_verifier"));
    }

    #[test]
    fn exhausted_retries_surface_as_cognito_error() {
        let failures = (0..5)
            .map(|_| Err(AppError::unknown("connection reset")))
            .collect::<Vec<Result<IdpResponse, AppError>>>();
        let transport = ScriptedTransport::new(failures);
        let parse_auth = ParseAuth::new(service(&transport));

        let err = parse_auth.handle(callback("code=c0de")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CognitoError);
        assert_eq!(transport.sent().len(), 5);
    }
}
