//! Interface to the compiler engine.
//!
//! The service never compiles anything itself: it parses options, hands them
//! to an [`Engine`], and serializes what comes back. Plugins installed on a
//! build (including the proxy that forwards hooks to the host) implement
//! [`Plugin`] and are invoked synchronously by the engine.

use std::fmt;

use crate::diagnostics::Message;
use crate::options::{BuildOptions, Loader, TransformOptions};

/// Compiler/bundler backend.
///
/// Both operations are blocking; the service always calls them from a
/// blocking thread, so an engine may block on plugin round trips freely.
pub trait Engine: Send + Sync + 'static {
    fn build(&self, options: BuildOptions) -> BuildResult;

    fn transform(&self, input: String, options: TransformOptions) -> TransformResult;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    /// Only populated when the build was not asked to write to disk.
    pub output_files: Vec<OutputFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformResult {
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
    pub code: Vec<u8>,
    pub map: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveArgs {
    pub path: String,
    pub importer: String,
    pub namespace: String,
    pub resolve_dir: String,
}

/// Outcome of a resolve hook. An empty `path` means "not handled here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveResult {
    pub plugin_name: String,
    pub path: String,
    pub namespace: String,
    pub external: bool,
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadArgs {
    pub path: String,
    pub namespace: String,
}

/// Outcome of a load hook. `contents == None` means "not handled here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadResult {
    pub plugin_name: String,
    pub contents: Option<Vec<u8>>,
    pub resolve_dir: String,
    pub loader: Option<Loader>,
    pub errors: Vec<Message>,
    pub warnings: Vec<Message>,
}

/// Hook failure. The engine reports it as a diagnostic on the build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// The host's plugin code reported an error.
    #[error("{message}")]
    Host {
        plugin_name: String,
        message: String,
    },

    /// The host's answer could not be interpreted.
    #[error("invalid plugin response: {0}")]
    InvalidResponse(String),

    /// The round trip to the host failed.
    #[error("plugin request failed: {0}")]
    Transport(String),
}

impl PluginError {
    /// Name of the plugin that failed, when known.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::Host { plugin_name, .. } if !plugin_name.is_empty() => Some(plugin_name),
            _ => None,
        }
    }
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_resolve(&self, args: &ResolveArgs) -> Result<ResolveResult, PluginError>;

    fn on_load(&self, args: &LoadArgs) -> Result<LoadResult, PluginError>;
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name()).finish()
    }
}
