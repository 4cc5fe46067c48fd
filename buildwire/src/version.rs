//! Version information for buildwire.

/// Crate version, sent as the default handshake preamble.
pub const BUILDWIRE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version details logged at startup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub buildwire: &'static str,
    /// Version announced to the host, when it differs from the crate version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            buildwire: BUILDWIRE_VERSION,
            protocol: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the announced version; ignored if it equals the crate version.
    pub fn with_protocol(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if version != self.buildwire {
            self.protocol = Some(version);
        }
        self
    }

    /// The version string to announce in the handshake.
    pub fn announced(&self) -> &str {
        self.protocol.as_deref().unwrap_or(self.buildwire)
    }
}
