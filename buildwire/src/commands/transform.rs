//! `transform` command.
//!
//! With `inputFS` the host passes a path instead of the source text: the file
//! is read and deleted here, and the results are written next to it as
//! `<input>.code` / `<input>.map` so large payloads stay off the pipe. The
//! file must hold UTF-8; anything else is rejected rather than patched up.

use std::fs;

use super::CommandError;
use crate::bridge::protocol::encode_messages;
use crate::bridge::{Fields, Value};
use crate::engine::Engine;
use crate::options::parse_transform_options;

pub fn handle(engine: &dyn Engine, request: &Fields<'_>) -> Result<Value, CommandError> {
    let input_fs = request.bool("inputFS")?;
    let input = request.str("input")?;
    let flags = request.string_array("flags")?;

    let options = parse_transform_options(&flags)?;

    let source = if input_fs {
        let bytes = fs::read(input).map_err(|e| CommandError::io(input, e))?;
        fs::remove_file(input).map_err(|e| CommandError::io(input, e))?;
        String::from_utf8(bytes).map_err(|_| CommandError::InvalidUtf8 {
            path: input.into(),
        })?
    } else {
        input.to_owned()
    };

    tracing::debug!(input_fs, bytes = source.len(), "Starting transform");
    let result = engine.transform(source, options);

    let (code, code_fs) = spill(input_fs, input, "code", result.code);
    let (map, map_fs) = spill(input_fs, input, "map", result.map);

    Ok([
        ("errors", encode_messages(&result.errors)),
        ("warnings", encode_messages(&result.warnings)),
        ("codeFS", Value::Bool(code_fs)),
        ("code", Value::String(code)),
        ("mapFS", Value::Bool(map_fs)),
        ("map", Value::String(map)),
    ]
    .into_iter()
    .collect())
}

/// Write `contents` to `<input>.<extension>` when the input came from disk.
/// Returns the field value and whether it is a path. A failed write falls
/// back to returning the contents inline.
fn spill(input_fs: bool, input: &str, extension: &str, contents: Vec<u8>) -> (String, bool) {
    if input_fs && !contents.is_empty() {
        let path = format!("{input}.{extension}");
        match fs::write(&path, &contents) {
            Ok(()) => return (path, true),
            Err(e) => {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "Failed to write transform output, returning it inline"
                );
            }
        }
    }
    (String::from_utf8_lossy(&contents).into_owned(), false)
}
