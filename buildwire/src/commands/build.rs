//! `build` command.
//!
//! Request: `{command: "build", key, write, flags, stdin?, resolveDir?, plugins?}`.
//! Response: `{errors, warnings, outputFiles?}`.

use std::sync::Arc;

use super::CommandError;
use crate::bridge::protocol::encode_messages;
use crate::bridge::{Fields, Map, Value};
use crate::engine::{OutputFile, Plugin};
use crate::options::parse_build_options;
use crate::plugin_proxy::PluginProxy;
use crate::service::Service;

pub fn handle(service: &Service, request: &Fields<'_>) -> Result<Value, CommandError> {
    let key = request.int("key")?;
    let write = request.bool("write")?;
    let flags = request.string_array("flags")?;

    let mut options = parse_build_options(&flags)?;

    // Stdout is the protocol channel, so a writing build needs somewhere else
    // to put its output.
    if write && !options.has_output_target() {
        return Err(CommandError::MissingOutputTarget);
    }

    if let Some(contents) = request.opt_str("stdin")? {
        let stdin = options.stdin.get_or_insert_with(Default::default);
        stdin.contents = contents.to_owned();
        if let Some(dir) = request.opt_str("resolveDir")? {
            stdin.resolve_dir = dir.to_owned();
        }
    }

    if let Some(plugins) = request.opt_array("plugins")? {
        let proxy = PluginProxy::from_descriptors(service.clone(), key, plugins)?;
        options.plugins.push(Arc::new(proxy) as Arc<dyn Plugin>);
    }

    options.write = write;
    tracing::debug!(
        key,
        write,
        entry_points = options.entry_points.len(),
        plugins = options.plugins.len(),
        "Starting build"
    );
    let result = service.engine().build(options);

    let mut response = Map::new();
    response.insert("errors".into(), encode_messages(&result.errors));
    response.insert("warnings".into(), encode_messages(&result.warnings));
    if !write {
        response.insert("outputFiles".into(), encode_output_files(&result.output_files));
    }
    Ok(Value::Map(response))
}

fn encode_output_files(files: &[OutputFile]) -> Value {
    Value::Array(
        files
            .iter()
            .map(|file| {
                [
                    ("path", Value::from(file.path.as_str())),
                    ("contents", Value::Bytes(file.contents.clone())),
                ]
                .into_iter()
                .collect()
            })
            .collect(),
    )
}
