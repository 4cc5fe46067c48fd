//! Routes a request to its command handler.
//!
//! Always produces exactly one response value: the handler's result, or
//! `{"error": ...}` for validation failures and panics.

use crate::bridge::protocol::error_response;
use crate::bridge::{Fields, Value};
use crate::commands::{self, CommandError};
use crate::panic_trace;
use crate::service::Service;

/// Handle request `id`. Blocking; runs on a blocking thread.
pub fn handle_request(service: &Service, id: u32, request: Value) -> Value {
    match panic_trace::catch(|| route(service, id, &request)) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::debug!(id, error = %e, "Request failed");
            error_response(e.to_string())
        }
        Err(panic) => error_response(panic),
    }
}

fn route(service: &Service, id: u32, request: &Value) -> Result<Value, CommandError> {
    let fields = Fields::new(request)?;
    let command = fields.str("command")?;
    tracing::debug!(id, command, "Handling request");

    match command {
        "build" => commands::build::handle(service, &fields),
        "transform" => commands::transform::handle(service.engine(), &fields),
        "error" => commands::error::handle(&fields),
        other => Err(CommandError::InvalidCommand(other.to_owned())),
    }
}
