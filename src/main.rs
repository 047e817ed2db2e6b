use edge_auth::config::Config;
use edge_auth::edge::{self, FastlyTransport};
use edge_auth::gate::{AuthGate, AuthService};
use fastly::{Error, Request, Response};

const LOG_ENDPOINT: &str = "edge_auth_logs";

#[fastly::main]
fn main(req: Request) -> Result<Response, Error> {
    // Load the service configuration and the user pool signing keys.
    let mut settings = Config::load()?;
    edge::init_logging(&settings.config.log, LOG_ENDPOINT);
    edge::apply_secrets(&mut settings)?;

    let service = AuthService::from_config(settings, FastlyTransport::new(edge::IDP_BACKEND))?;
    edge::serve(&AuthGate::new(service), req)
}
