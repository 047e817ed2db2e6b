use crate::error::AppError;
use crate::gate::AuthService;
use crate::handler::EdgeHandler;
use crate::request::{EdgeRequest, Outcome};
use crate::responses;

/// Lets requests with a verified Cognito session through to origin.
pub struct CheckAuth {
    service: AuthService,
}

impl CheckAuth {
    pub fn new(service: AuthService) -> Self {
        log::debug!("check-auth service initialized");
        Self { service }
    }
}

impl EdgeHandler for CheckAuth {
    fn handle(&self, event: EdgeRequest) -> Result<Outcome, AppError> {
        let request = self.service.parse_request(&event);

        if request.path == self.service.config().config.sign_out_path {
            return Ok(Outcome::Respond(self.service.sign_out(&request)?));
        }

        let Some(tokens) = self.service.read_tokens(&request.cookies) else {
            return Ok(Outcome::Respond(self.service.login_redirect(&request)?));
        };

        let verdict = self.service.check_policy(&request, &tokens)?;
        if !verdict.allowed {
            return Ok(Outcome::Respond(responses::unauthorized(verdict.message)));
        }

        Ok(Outcome::Forward(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::ScriptedTransport;
    use crate::gate::tests::{service, session_cookie_header, with_policy, HOST};
    use crate::cookies;
    use crate::gate::AUTH_POLICY;
    use crate::jwt::tests::{access_token, sign};
    use crate::jwt::CognitoClaims;
    use crate::request::Header;

    fn check_auth() -> CheckAuth {
        CheckAuth::new(service(&ScriptedTransport::default()))
    }

    fn respond(outcome: Outcome) -> crate::responses::EdgeResponse {
        match outcome {
            Outcome::Respond(response) => response,
            Outcome::Forward(request) => panic!("request was forwarded: {request:?}"),
        }
    }

    #[test]
    fn without_session_redirects_to_login() {
        let request = EdgeRequest::new("GET", "/private", "").with_header("host", HOST);
        let response = respond(check_auth().handle(request).unwrap());
        assert_eq!(response.status, "307");
        let location = response.header("location").unwrap();
        assert!(location.contains("/oauth2/authorize?"));
        assert!(location.contains("&state="));
        assert!(location.contains("&code_challenge="));
    }

    #[test]
    fn tampered_session_redirects_to_login() {
        let header = session_cookie_header("user-1").replace(".accessToken=ey", ".accessToken=xx");
        let request = EdgeRequest::new("GET", "/", "")
            .with_header("host", HOST)
            .with_header("cookie", header);
        assert_eq!(respond(check_auth().handle(request).unwrap()).status, "307");
    }

    #[test]
    fn verified_session_passes_request_unchanged() {
        let request = EdgeRequest {
            client_ip: "203.0.113.9".to_string(),
            ..EdgeRequest::new("GET", "/private", "a=1")
                .with_header("Host", HOST)
                .with_header("Cookie", session_cookie_header("user-1"))
        };
        assert_eq!(
            check_auth().handle(request.clone()).unwrap(),
            Outcome::Forward(request)
        );
    }

    #[test]
    fn policy_denial_is_a_bare_403() {
        let service = with_policy(
            service(&ScriptedTransport::default()),
            r#"{"rules": [{"decision": {"allowed": false}}]}"#,
        );
        let request = EdgeRequest::new("GET", "/", "").with_header("cookie", session_cookie_header("user-1"));
        let response = respond(CheckAuth::new(service).handle(request).unwrap());
        assert_eq!(response.status, "403");
        assert!(response.headers.is_empty());
        assert_eq!(response.body.as_deref(), Some("unauthorized"));
    }

    #[test]
    fn bundled_policy_gates_the_admin_area() {
        let service = with_policy(service(&ScriptedTransport::default()), AUTH_POLICY);
        let check_auth = CheckAuth::new(service);
        let cookie = session_cookie_header("user-1");

        // The signed test id token lists the user in "admins".
        let request = EdgeRequest::new("GET", "/admin/users", "").with_header("cookie", cookie.clone());
        assert!(matches!(check_auth.handle(request).unwrap(), Outcome::Forward(_)));

        let request = EdgeRequest::new("GET", "/public", "").with_header("cookie", cookie);
        assert!(matches!(check_auth.handle(request).unwrap(), Outcome::Forward(_)));

        let prefix = cookies::key_prefix("fake_client_id");
        let id_token = sign(
            CognitoClaims {
                token_use: "id".to_string(),
                username: Some("user-2".to_string()),
                ..Default::default()
            },
            Some("fake_client_id"),
        );
        let cookie = format!(
            "{prefix}.LastAuthUser=user-2; {prefix}.user-2.accessToken={}; {prefix}.user-2.idToken={id_token}",
            access_token()
        );
        let request = EdgeRequest::new("GET", "/admin", "").with_header("cookie", cookie);
        let response = respond(check_auth.handle(request).unwrap());
        assert_eq!(response.status, "403");
        assert_eq!(response.body.as_deref(), Some("admin group membership required"));
    }

    #[test]
    fn sign_out_path_clears_cookies() {
        let request = EdgeRequest::new("GET", "/_edge/auth/signout", "")
            .with_header("host", HOST)
            .with_header("cookie", session_cookie_header("user-1"));
        let response = respond(check_auth().handle(request).unwrap());
        assert_eq!(response.status, "307");
        assert!(response.header("location").unwrap().contains("/logout?client_id=fake_client_id"));
        assert_eq!(response.header_all("set-cookie").count(), 6);
        assert_eq!(
            response.headers["location"],
            vec![Header {
                key: "location".to_string(),
                value: response.header("location").unwrap().to_string()
            }]
        );
    }
}
