//! Forwards the engine's plugin hooks to the host.
//!
//! All plugins the host declares for a build are folded into one
//! [`PluginProxy`]. For each hook call it works out which host callbacks
//! apply to the path and, if any do, makes a single reverse request carrying
//! all their ids. The calling (blocking) thread waits for the answer; other
//! requests keep being served.

use regex::Regex;

use crate::bridge::protocol::decode_messages;
use crate::bridge::{FieldError, Fields, Map, Value};
use crate::commands::CommandError;
use crate::engine::{LoadArgs, LoadResult, Plugin, PluginError, ResolveArgs, ResolveResult};
use crate::filter::{compile_filter, plugin_applies_to_path};
use crate::options::Loader;
use crate::service::Service;

/// One `onResolve`/`onLoad` callback registered by a host plugin.
#[derive(Debug, Clone)]
pub struct HookRegistration {
    pub id: i32,
    pub plugin_name: String,
    pub filter: Regex,
    pub namespace: String,
}

pub struct PluginProxy {
    service: Service,
    key: i32,
    on_resolve: Vec<HookRegistration>,
    on_load: Vec<HookRegistration>,
}

impl From<FieldError> for PluginError {
    fn from(e: FieldError) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

fn registrations(
    plugin_name: &str,
    kind: &'static str,
    items: &[Value],
) -> Result<Vec<HookRegistration>, CommandError> {
    items
        .iter()
        .map(|item| -> Result<HookRegistration, CommandError> {
            let item = Fields::new(item)?;
            let filter =
                compile_filter(plugin_name, kind, item.opt_str("filter")?.unwrap_or(""))?;
            Ok(HookRegistration {
                id: item.int("id")?,
                plugin_name: plugin_name.to_owned(),
                filter,
                namespace: item.opt_str("namespace")?.unwrap_or("").to_owned(),
            })
        })
        .collect()
}

fn matching_ids(hooks: &[HookRegistration], path: &str, namespace: &str) -> Vec<Value> {
    hooks
        .iter()
        .filter(|h| plugin_applies_to_path(path, namespace, &h.filter, &h.namespace))
        .map(|h| Value::Int(h.id))
        .collect()
}

/// Name of the plugin whose callback produced the response, from its `id`.
fn responding_plugin(
    hooks: &[HookRegistration],
    response: &Fields<'_>,
) -> Result<String, FieldError> {
    let Some(id) = response.opt_int("id")? else {
        return Ok(String::new());
    };
    Ok(hooks
        .iter()
        .find(|h| h.id == id)
        .map(|h| h.plugin_name.clone())
        .unwrap_or_default())
}

fn host_error(response: &Fields<'_>, plugin_name: &str) -> Result<(), PluginError> {
    match response.opt_str("error")? {
        Some(message) => Err(PluginError::Host {
            plugin_name: plugin_name.to_owned(),
            message: message.to_owned(),
        }),
        None => Ok(()),
    }
}

impl PluginProxy {
    /// Build the proxy from the request's `plugins` array:
    /// `[{name, onResolve: [{id, filter, namespace}], onLoad: [...]}]`.
    pub fn from_descriptors(
        service: Service,
        key: i32,
        plugins: &[Value],
    ) -> Result<Self, CommandError> {
        let mut proxy = Self {
            service,
            key,
            on_resolve: Vec::new(),
            on_load: Vec::new(),
        };
        for plugin in plugins {
            let plugin = Fields::new(plugin)?;
            let name = plugin.str("name")?;
            let on_resolve = plugin.opt_array("onResolve")?.unwrap_or_default();
            proxy
                .on_resolve
                .extend(registrations(name, "onResolve", on_resolve)?);
            let on_load = plugin.opt_array("onLoad")?.unwrap_or_default();
            proxy.on_load.extend(registrations(name, "onLoad", on_load)?);
        }
        tracing::debug!(
            key,
            on_resolve = proxy.on_resolve.len(),
            on_load = proxy.on_load.len(),
            "Installed host plugin proxy"
        );
        Ok(proxy)
    }

    pub fn on_resolve_hooks(&self) -> &[HookRegistration] {
        &self.on_resolve
    }

    pub fn on_load_hooks(&self) -> &[HookRegistration] {
        &self.on_load
    }

    fn call(&self, request: Value) -> Result<Map, PluginError> {
        match self
            .service
            .send_request(request)
            .map_err(|e| PluginError::Transport(e.to_string()))?
        {
            Value::Map(map) => Ok(map),
            other => Err(PluginError::InvalidResponse(format!(
                "expected a map, found {}",
                other.kind()
            ))),
        }
    }
}

impl Plugin for PluginProxy {
    fn name(&self) -> &str {
        "host plugins"
    }

    fn on_resolve(&self, args: &ResolveArgs) -> Result<ResolveResult, PluginError> {
        let ids = matching_ids(&self.on_resolve, &args.path, &args.namespace);
        if ids.is_empty() {
            return Ok(ResolveResult::default());
        }

        let response = self.call(
            [
                ("command", Value::from("resolve")),
                ("key", Value::Int(self.key)),
                ("ids", Value::Array(ids)),
                ("path", Value::from(args.path.as_str())),
                ("importer", Value::from(args.importer.as_str())),
                ("namespace", Value::from(args.namespace.as_str())),
                ("resolveDir", Value::from(args.resolve_dir.as_str())),
            ]
            .into_iter()
            .collect(),
        )?;
        let fields = Fields::from_map(&response);

        let mut result = ResolveResult {
            plugin_name: responding_plugin(&self.on_resolve, &fields)?,
            ..ResolveResult::default()
        };
        host_error(&fields, &result.plugin_name)?;

        if let Some(name) = fields.opt_str("pluginName")? {
            result.plugin_name = name.to_owned();
        }
        if let Some(path) = fields.opt_str("path")? {
            result.path = path.to_owned();
        }
        if let Some(namespace) = fields.opt_str("namespace")? {
            result.namespace = namespace.to_owned();
        }
        result.external = fields.opt_bool("external")?.unwrap_or(false);
        if let Some(errors) = fields.opt_array("errors")? {
            result.errors = decode_messages(errors)?;
        }
        if let Some(warnings) = fields.opt_array("warnings")? {
            result.warnings = decode_messages(warnings)?;
        }
        Ok(result)
    }

    fn on_load(&self, args: &LoadArgs) -> Result<LoadResult, PluginError> {
        let ids = matching_ids(&self.on_load, &args.path, &args.namespace);
        if ids.is_empty() {
            return Ok(LoadResult::default());
        }

        let response = self.call(
            [
                ("command", Value::from("load")),
                ("key", Value::Int(self.key)),
                ("ids", Value::Array(ids)),
                ("path", Value::from(args.path.as_str())),
                ("namespace", Value::from(args.namespace.as_str())),
            ]
            .into_iter()
            .collect(),
        )?;
        let fields = Fields::from_map(&response);

        let mut result = LoadResult {
            plugin_name: responding_plugin(&self.on_load, &fields)?,
            ..LoadResult::default()
        };
        host_error(&fields, &result.plugin_name)?;

        if let Some(name) = fields.opt_str("pluginName")? {
            result.plugin_name = name.to_owned();
        }
        result.contents = fields.opt_contents("contents")?;
        if let Some(dir) = fields.opt_str("resolveDir")? {
            result.resolve_dir = dir.to_owned();
        }
        if let Some(errors) = fields.opt_array("errors")? {
            result.errors = decode_messages(errors)?;
        }
        if let Some(warnings) = fields.opt_array("warnings")? {
            result.warnings = decode_messages(warnings)?;
        }
        if let Some(loader) = fields.opt_str("loader")? {
            let loader =
                Loader::parse(loader).map_err(|e| PluginError::InvalidResponse(e.to_string()))?;
            result.loader = Some(loader);
        }
        Ok(result)
    }
}
