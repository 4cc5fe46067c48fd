//! Environment configuration for the service binary.
//!
//! | variable                  | effect                                              |
//! |---------------------------|-----------------------------------------------------|
//! | `RUST_LOG`                | full tracing filter, overrides `BUILDWIRE_LOG`      |
//! | `BUILDWIRE_LOG`           | `debug`, `warn`, `error`, otherwise `info`          |
//! | `LOG_FORMAT`              | `json` for JSON log lines                           |
//! | `BUILDWIRE_VERSION`       | version string announced in the handshake           |
//! | `BUILDWIRE_DIRECT_STDOUT` | `1` writes frames to fd 1 without protecting it     |

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// `RUST_LOG` was set; the subscriber reads it directly.
    pub rust_log: bool,
    pub log_level: &'static str,
    pub json_logs: bool,
    pub version: Option<String>,
    pub direct_stdout: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = match lookup("BUILDWIRE_LOG").as_deref() {
            Some("debug") => "debug",
            Some("warn") | Some("warning") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        Self {
            rust_log: lookup("RUST_LOG").is_some(),
            log_level,
            json_logs: lookup("LOG_FORMAT").as_deref() == Some("json"),
            version: lookup("BUILDWIRE_VERSION").filter(|v| !v.is_empty()),
            direct_stdout: lookup("BUILDWIRE_DIRECT_STDOUT").as_deref() == Some("1"),
        }
    }

    /// Filter directives used when `RUST_LOG` is not set.
    pub fn filter_directives(&self) -> String {
        format!(
            "buildwire={level},buildwire_service={level}",
            level = self.log_level
        )
    }
}
