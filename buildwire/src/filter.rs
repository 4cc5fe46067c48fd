//! Path filters attached to plugin hook registrations.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("[{plugin}] {kind:?} is missing a filter")]
    Missing { plugin: String, kind: &'static str },

    #[error("[{plugin}] {kind:?} filter is not a valid regular expression: {filter:?}")]
    Invalid {
        plugin: String,
        kind: &'static str,
        filter: String,
    },
}

/// Compile the filter of one `onResolve`/`onLoad` registration.
pub fn compile_filter(
    plugin: &str,
    kind: &'static str,
    filter: &str,
) -> Result<Regex, FilterError> {
    if filter.is_empty() {
        return Err(FilterError::Missing {
            plugin: plugin.to_owned(),
            kind,
        });
    }
    Regex::new(filter).map_err(|_| FilterError::Invalid {
        plugin: plugin.to_owned(),
        kind,
        filter: filter.to_owned(),
    })
}

/// An empty hook namespace matches every namespace.
pub fn plugin_applies_to_path(
    path: &str,
    path_namespace: &str,
    filter: &Regex,
    namespace: &str,
) -> bool {
    (namespace.is_empty() || namespace == path_namespace) && filter.is_match(path)
}
