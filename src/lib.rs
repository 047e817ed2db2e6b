//! Edge functions for a Cognito hosted UI session gate and a policy driven
//! URL rewriter. The handlers are host independent; `edge` binds them to
//! Fastly Compute.

pub mod check_auth;
pub mod client;
pub mod config;
pub mod cookies;
pub mod crypter;
#[cfg(feature = "edge")]
pub mod edge;
pub mod error;
pub mod gate;
pub mod handler;
pub mod idp;
pub mod jwt;
pub mod logging;
pub mod parse_auth;
pub mod pkce;
pub mod policy;
pub mod request;
pub mod responses;
pub mod rewrite;
pub mod state;

pub use error::{AppError, ErrorKind};
pub use handler::{invoke, EdgeHandler};
pub use request::{EdgeRequest, Outcome};
pub use responses::EdgeResponse;
