//! buildwire: stdio RPC bridge between a host process and a build engine.

mod diagnostics;
mod dispatcher;
mod filter;
mod panic_trace;
mod router;
mod version;

pub mod bridge;
pub mod commands;
pub mod engine;
pub mod inflight;
pub mod options;
pub mod outgoing;
pub mod plugin_proxy;
pub mod registry;
pub mod service;

pub use diagnostics::{Location, Message};
pub use dispatcher::run_service;
pub use engine::{
    BuildResult, Engine, LoadArgs, LoadResult, OutputFile, Plugin, PluginError, ResolveArgs,
    ResolveResult, TransformResult,
};
pub use filter::FilterError;
pub use options::{
    BuildOptions, Format, Loader, LogLevel, LogOptions, Minify, OptionsError, Platform, SourceMap,
    StdinOptions, TransformOptions,
};
pub use service::{Service, ServiceConfig, ServiceError};
pub use version::{BUILDWIRE_VERSION, VersionInfo};
