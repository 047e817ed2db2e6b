use crate::error::AppError;
use crate::request::{EdgeRequest, Outcome};
use crate::responses;

/// One edge function: takes the inbound request, decides what happens to it.
pub trait EdgeHandler {
    fn handle(&self, request: EdgeRequest) -> Result<Outcome, AppError>;
}

/// Runs `handler`, answering any application error with a generic 500.
pub fn invoke(handler: &dyn EdgeHandler, request: EdgeRequest) -> Outcome {
    let uri = request.uri.clone();
    match handler.handle(request) {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("failed to handle request for {uri}: {err}");
            Outcome::Respond(responses::internal_error())
        }
    }
}
