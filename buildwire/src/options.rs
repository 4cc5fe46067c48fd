//! Build and transform option parsing from the host's flag arrays.
//!
//! Flags use the command-line spelling (`--bundle`, `--outfile=out.js`,
//! `--loader:.txt=text`). Each flag is split at its first `=` or `:` and the
//! name is matched together with that separator, so only the exact spellings
//! are accepted: `--define:K=V` but not `--define=K=V`, `--outfile=x` but not
//! `--outfile:x`. Bare arguments are build entry points.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::Plugin;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("Invalid {kind} flag: {flag:?}")]
    InvalidFlag { kind: &'static str, flag: String },

    #[error("Invalid {what}: {value:?} (valid: {valid})")]
    InvalidValue {
        what: &'static str,
        value: String,
        valid: &'static str,
    },

    #[error("Invalid loader: {0:?}")]
    InvalidLoader(String),

    #[error("Missing \"=\": {0:?}")]
    MissingEquals(String),

    #[error("Cannot transform using the \"file\" loader")]
    FileLoaderForTransform,

    #[error("Unexpected single quote character before flag (use \\\" to escape double quotes): {0}")]
    SingleQuote(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceMap {
    #[default]
    None,
    /// External `.map` file plus a `//# sourceMappingURL=` comment.
    Linked,
    Inline,
    External,
    InlineAndExternal,
}

impl SourceMap {
    pub fn has_inline(self) -> bool {
        matches!(self, Self::Inline | Self::InlineAndExternal)
    }

    pub fn has_file(self) -> bool {
        matches!(self, Self::Linked | Self::External | Self::InlineAndExternal)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Default,
    Iife,
    Cjs,
    Esm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Platform {
    #[default]
    Browser,
    Node,
    Neutral,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Loader {
    #[default]
    Default,
    Js,
    Jsx,
    Ts,
    Tsx,
    Json,
    Text,
    Base64,
    DataUrl,
    File,
    Binary,
    Css,
}

impl Loader {
    pub fn parse(text: &str) -> Result<Self, OptionsError> {
        Ok(match text {
            "js" => Self::Js,
            "jsx" => Self::Jsx,
            "ts" => Self::Ts,
            "tsx" => Self::Tsx,
            "json" => Self::Json,
            "text" => Self::Text,
            "base64" => Self::Base64,
            "dataurl" => Self::DataUrl,
            "file" => Self::File,
            "binary" => Self::Binary,
            "css" => Self::Css,
            "default" => Self::Default,
            other => return Err(OptionsError::InvalidLoader(other.to_owned())),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Js => "js",
            Self::Jsx => "jsx",
            Self::Ts => "ts",
            Self::Tsx => "tsx",
            Self::Json => "json",
            Self::Text => "text",
            Self::Base64 => "base64",
            Self::DataUrl => "dataurl",
            Self::File => "file",
            Self::Binary => "binary",
            Self::Css => "css",
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Verbose,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Minify {
    pub syntax: bool,
    pub whitespace: bool,
    pub identifiers: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub level: LogLevel,
    pub color: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StdinOptions {
    pub contents: String,
    pub resolve_dir: String,
    pub sourcefile: String,
    pub loader: Loader,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub entry_points: Vec<String>,
    pub bundle: bool,
    pub minify: Minify,
    pub sourcemap: SourceMap,
    pub outfile: String,
    pub outdir: String,
    pub global_name: String,
    pub format: Format,
    pub platform: Platform,
    /// Extension (with leading dot) to loader.
    pub loaders: BTreeMap<String, Loader>,
    pub define: BTreeMap<String, String>,
    pub external: Vec<String>,
    pub log: LogOptions,
    pub stdin: Option<StdinOptions>,
    pub write: bool,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

impl BuildOptions {
    pub fn has_output_target(&self) -> bool {
        !self.outfile.is_empty() || !self.outdir.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub minify: Minify,
    pub sourcemap: SourceMap,
    pub sourcefile: String,
    pub loader: Loader,
    pub format: Format,
    pub global_name: String,
    pub define: BTreeMap<String, String>,
    pub log: LogOptions,
}

/// Split `--name=value` / `--name:value` at the first separator, keeping the
/// separator with the value.
fn split_flag(arg: &str) -> (&str, Option<(char, &str)>) {
    match arg.find(['=', ':']) {
        Some(at) => (&arg[..at], Some((char::from(arg.as_bytes()[at]), &arg[at + 1..]))),
        None => (arg, None),
    }
}

fn split_pair(value: &str) -> Result<(&str, &str), OptionsError> {
    value
        .split_once('=')
        .ok_or_else(|| OptionsError::MissingEquals(value.to_owned()))
}

fn parse_sourcemap(value: &str) -> Result<SourceMap, OptionsError> {
    match value {
        "inline" => Ok(SourceMap::Inline),
        "external" => Ok(SourceMap::External),
        "both" => Ok(SourceMap::InlineAndExternal),
        other => Err(OptionsError::InvalidValue {
            what: "sourcemap",
            value: other.to_owned(),
            valid: "inline, external, both",
        }),
    }
}

fn parse_format(value: &str) -> Result<Format, OptionsError> {
    match value {
        "iife" => Ok(Format::Iife),
        "cjs" => Ok(Format::Cjs),
        "esm" => Ok(Format::Esm),
        other => Err(OptionsError::InvalidValue {
            what: "format",
            value: other.to_owned(),
            valid: "iife, cjs, esm",
        }),
    }
}

fn parse_platform(value: &str) -> Result<Platform, OptionsError> {
    match value {
        "browser" => Ok(Platform::Browser),
        "node" => Ok(Platform::Node),
        "neutral" => Ok(Platform::Neutral),
        other => Err(OptionsError::InvalidValue {
            what: "platform",
            value: other.to_owned(),
            valid: "browser, node, neutral",
        }),
    }
}

fn parse_log_level(value: &str) -> Result<LogLevel, OptionsError> {
    match value {
        "verbose" => Ok(LogLevel::Verbose),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warning" => Ok(LogLevel::Warning),
        "error" => Ok(LogLevel::Error),
        "silent" => Ok(LogLevel::Silent),
        other => Err(OptionsError::InvalidValue {
            what: "log level",
            value: other.to_owned(),
            valid: "verbose, debug, info, warning, error, silent",
        }),
    }
}

fn parse_color(value: &str) -> Result<bool, OptionsError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(OptionsError::InvalidValue {
            what: "color",
            value: other.to_owned(),
            valid: "false, true",
        }),
    }
}

/// Flags understood by both build and transform. Returns false when the flag
/// is not one of them.
fn apply_common(
    name: &str,
    value: Option<(char, &str)>,
    minify: &mut Minify,
    define: &mut BTreeMap<String, String>,
    global_name: &mut String,
    format: &mut Format,
    log: &mut LogOptions,
) -> Result<bool, OptionsError> {
    match (name, value) {
        ("--minify", None) => {
            *minify = Minify {
                syntax: true,
                whitespace: true,
                identifiers: true,
            }
        }
        ("--minify-syntax", None) => minify.syntax = true,
        ("--minify-whitespace", None) => minify.whitespace = true,
        ("--minify-identifiers", None) => minify.identifiers = true,
        ("--define", Some((':', v))) => {
            let (key, value) = split_pair(v)?;
            define.insert(key.to_owned(), value.to_owned());
        }
        ("--global-name", Some(('=', v))) => *global_name = v.to_owned(),
        ("--format", Some(('=', v))) => *format = parse_format(v)?,
        ("--log-level", Some(('=', v))) => log.level = parse_log_level(v)?,
        ("--color", Some(('=', v))) => log.color = Some(parse_color(v)?),
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn parse_build_options(flags: &[String]) -> Result<BuildOptions, OptionsError> {
    let mut options = BuildOptions::default();
    let mut bare_sourcemap = false;

    for arg in flags {
        if arg.starts_with("'--") {
            return Err(OptionsError::SingleQuote(arg.clone()));
        }
        if !arg.starts_with('-') {
            options.entry_points.push(arg.clone());
            continue;
        }

        let (name, value) = split_flag(arg);
        if apply_common(
            name,
            value,
            &mut options.minify,
            &mut options.define,
            &mut options.global_name,
            &mut options.format,
            &mut options.log,
        )? {
            continue;
        }

        match (name, value) {
            ("--bundle", None) => options.bundle = true,
            ("--sourcemap", None) => {
                options.sourcemap = SourceMap::Linked;
                bare_sourcemap = true;
            }
            ("--sourcemap", Some(('=', v))) => {
                options.sourcemap = parse_sourcemap(v)?;
                bare_sourcemap = false;
            }
            ("--sourcefile", Some(('=', v))) => {
                options.stdin.get_or_insert_with(Default::default).sourcefile = v.to_owned()
            }
            ("--outfile", Some(('=', v))) => options.outfile = v.to_owned(),
            ("--outdir", Some(('=', v))) => options.outdir = v.to_owned(),
            ("--platform", Some(('=', v))) => options.platform = parse_platform(v)?,
            ("--external", Some((':', v))) => options.external.push(v.to_owned()),
            // `--loader:.ext=name` maps an extension.
            ("--loader", Some((':', v))) => {
                let (ext, text) = split_pair(v)?;
                options.loaders.insert(ext.to_owned(), Loader::parse(text)?);
            }
            // `--loader=name` sets the stdin loader.
            ("--loader", Some(('=', v))) => {
                let loader = Loader::parse(v)?;
                if loader == Loader::File {
                    return Err(OptionsError::FileLoaderForTransform);
                }
                options.stdin.get_or_insert_with(Default::default).loader = loader;
            }
            _ => {
                return Err(OptionsError::InvalidFlag {
                    kind: "build",
                    flag: arg.clone(),
                });
            }
        }
    }

    // A bare `--sourcemap` with nowhere to put a `.map` file goes inline.
    if bare_sourcemap && !options.has_output_target() {
        options.sourcemap = SourceMap::Inline;
    }

    Ok(options)
}

pub fn parse_transform_options(flags: &[String]) -> Result<TransformOptions, OptionsError> {
    let mut options = TransformOptions::default();

    for arg in flags {
        if arg.starts_with("'--") {
            return Err(OptionsError::SingleQuote(arg.clone()));
        }

        let (name, value) = split_flag(arg);
        if apply_common(
            name,
            value,
            &mut options.minify,
            &mut options.define,
            &mut options.global_name,
            &mut options.format,
            &mut options.log,
        )? {
            continue;
        }

        match (name, value) {
            ("--sourcemap", None) => options.sourcemap = SourceMap::Inline,
            ("--sourcemap", Some(('=', v))) => options.sourcemap = parse_sourcemap(v)?,
            ("--sourcefile", Some(('=', v))) => options.sourcefile = v.to_owned(),
            ("--loader", Some(('=', v))) => {
                let loader = Loader::parse(v)?;
                if loader == Loader::File {
                    return Err(OptionsError::FileLoaderForTransform);
                }
                options.loader = loader;
            }
            _ => {
                return Err(OptionsError::InvalidFlag {
                    kind: "transform",
                    flag: arg.clone(),
                });
            }
        }
    }

    Ok(options)
}

/// Logging flags only; everything else is ignored. Used where a malformed
/// flag list must not stop a message from being printed.
pub fn parse_log_options(flags: &[String]) -> LogOptions {
    let mut log = LogOptions::default();
    for arg in flags {
        match split_flag(arg) {
            ("--log-level", Some(('=', v))) => {
                if let Ok(level) = parse_log_level(v) {
                    log.level = level;
                }
            }
            ("--color", Some(('=', v))) => {
                if let Ok(color) = parse_color(v) {
                    log.color = Some(color);
                }
            }
            _ => {}
        }
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_flags() {
        let options = parse_build_options(&flags(&[
            "src/a.ts",
            "--bundle",
            "--minify-whitespace",
            "--outdir=dist",
            "--format=esm",
            "--platform=node",
            "--external:fs",
            "--loader:.txt=text",
            "--define:DEBUG=false",
            "--sourcemap=external",
            "src/b.ts",
        ]))
        .unwrap();

        assert_eq!(options.entry_points, ["src/a.ts", "src/b.ts"]);
        assert!(options.bundle);
        assert_eq!(
            options.minify,
            Minify {
                whitespace: true,
                ..Minify::default()
            }
        );
        assert_eq!(options.outdir, "dist");
        assert_eq!(options.format, Format::Esm);
        assert_eq!(options.platform, Platform::Node);
        assert_eq!(options.external, ["fs"]);
        assert_eq!(options.loaders.get(".txt"), Some(&Loader::Text));
        assert_eq!(options.define.get("DEBUG").map(String::as_str), Some("false"));
        assert_eq!(options.sourcemap, SourceMap::External);
        assert!(options.has_output_target());
    }

    #[test]
    fn bare_sourcemap_without_target_goes_inline() {
        let options = parse_build_options(&flags(&["--sourcemap"])).unwrap();
        assert_eq!(options.sourcemap, SourceMap::Inline);

        let options = parse_build_options(&flags(&["--sourcemap", "--outfile=o.js"])).unwrap();
        assert_eq!(options.sourcemap, SourceMap::Linked);
    }

    #[test]
    fn build_stdin_flags_create_stdin_options() {
        let options = parse_build_options(&flags(&["--loader=tsx", "--sourcefile=in.tsx"])).unwrap();
        let stdin = options.stdin.unwrap();
        assert_eq!(stdin.loader, Loader::Tsx);
        assert_eq!(stdin.sourcefile, "in.tsx");
    }

    #[test]
    fn transform_flags() {
        let options = parse_transform_options(&flags(&[
            "--loader=ts",
            "--sourcemap",
            "--minify",
            "--sourcefile=x.ts",
            "--log-level=warning",
        ]))
        .unwrap();
        assert_eq!(options.loader, Loader::Ts);
        assert_eq!(options.sourcemap, SourceMap::Inline);
        assert!(options.minify.syntax && options.minify.whitespace && options.minify.identifiers);
        assert_eq!(options.sourcefile, "x.ts");
        assert_eq!(options.log.level, LogLevel::Warning);
    }

    #[test]
    fn invalid_flags_name_the_command() {
        assert_eq!(
            parse_build_options(&flags(&["--nope"])).unwrap_err().to_string(),
            "Invalid build flag: \"--nope\""
        );
        assert_eq!(
            parse_transform_options(&flags(&["entry.js"])).unwrap_err().to_string(),
            "Invalid transform flag: \"entry.js\""
        );
        // Build-only flags are not transform flags.
        assert!(matches!(
            parse_transform_options(&flags(&["--bundle"])),
            Err(OptionsError::InvalidFlag { kind: "transform", .. })
        ));
    }

    #[test]
    fn invalid_values() {
        assert_eq!(
            parse_build_options(&flags(&["--sourcemap=x"])).unwrap_err().to_string(),
            "Invalid sourcemap: \"x\" (valid: inline, external, both)"
        );
        assert_eq!(
            parse_build_options(&flags(&["--define:NOPE"])).unwrap_err().to_string(),
            "Missing \"=\": \"NOPE\""
        );
        assert_eq!(
            parse_transform_options(&flags(&["--loader=file"])).unwrap_err(),
            OptionsError::FileLoaderForTransform
        );
        assert_eq!(
            parse_transform_options(&flags(&["--loader=wasm"])).unwrap_err(),
            OptionsError::InvalidLoader("wasm".into())
        );
    }

    #[test]
    fn log_options_ignore_everything_else() {
        let log = parse_log_options(&flags(&["--bogus", "--log-level=silent", "--color=nah"]));
        assert_eq!(log.level, LogLevel::Silent);
        assert_eq!(log.color, None);
    }

    #[test]
    fn loader_names_roundtrip() {
        for name in [
            "js", "jsx", "ts", "tsx", "json", "text", "base64", "dataurl", "file", "binary", "css",
            "default",
        ] {
            assert_eq!(Loader::parse(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn separators_must_match_the_flag() {
        for flag in [
            "--external=fs",
            "--define=K=V",
            "--outfile:x",
            "--sourcemap:inline",
            "--format:esm",
        ] {
            assert_eq!(
                parse_build_options(&flags(&[flag])).unwrap_err(),
                OptionsError::InvalidFlag {
                    kind: "build",
                    flag: flag.to_owned(),
                },
                "{flag}"
            );
        }
        assert!(matches!(
            parse_transform_options(&flags(&["--loader:.ts=ts"])),
            Err(OptionsError::InvalidFlag { kind: "transform", .. })
        ));
        assert_eq!(parse_log_options(&flags(&["--log-level:silent"])).level, LogLevel::Info);
    }

    #[test]
    fn values_may_contain_separators() {
        let options =
            parse_build_options(&flags(&["--outfile=C:/out.js", "--define:URL=\"a:b\""])).unwrap();
        assert_eq!(options.outfile, "C:/out.js");
        assert_eq!(options.define.get("URL").map(String::as_str), Some("\"a:b\""));
    }
}
