//! `error` command: print a message from the host's own setup code.
//!
//! Lets the host surface errors it would otherwise swallow, formatted the same
//! way as build diagnostics.

use std::io::{self, Write};

use super::CommandError;
use crate::bridge::protocol::decode_message;
use crate::bridge::{FieldError, Fields, Map, Value};
use crate::options::{LogLevel, parse_log_options};

pub fn handle(request: &Fields<'_>) -> Result<Value, CommandError> {
    handle_with_writer(request, &mut io::stderr().lock())
}

pub fn handle_with_writer(
    request: &Fields<'_>,
    out: &mut impl Write,
) -> Result<Value, CommandError> {
    let flags = request.string_array("flags")?;
    let error = request.get("error").ok_or(FieldError::Missing("error"))?;
    let message = decode_message(error)?;

    if parse_log_options(&flags).level < LogLevel::Silent
        && let Err(e) = out.write_all(message.render("error").as_bytes())
    {
        tracing::warn!(error = %e, "Failed to print host error");
    }
    Ok(Value::Map(Map::new()))
}
