use edge_auth::config::RewriteConfig;
use edge_auth::edge;
use edge_auth::policy::RulePolicy;
use edge_auth::rewrite::{UrlRewriter, REWRITE_POLICY};
use fastly::{Error, Request, Response};
use std::sync::Arc;

const LOG_ENDPOINT: &str = "edge_rewrite_logs";

#[fastly::main]
fn main(req: Request) -> Result<Response, Error> {
    let settings = RewriteConfig::load()?;
    edge::init_logging(&settings.log, LOG_ENDPOINT);

    let policy = RulePolicy::from_json(REWRITE_POLICY, settings.policy_data)?;
    edge::serve(&UrlRewriter::new(Arc::new(policy)), req)
}
