//! Reference engine that moves sources through without compiling them.
//!
//! A build resolves and loads each entry point through the installed plugins
//! (falling back to the filesystem for the `file` namespace) and concatenates
//! the results into one output file. A transform echoes its input. Both honour
//! `--minify-whitespace` and the source map flags.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use buildwire::{
    BuildOptions, BuildResult, Engine, LoadArgs, Message, OutputFile, Plugin, PluginError,
    ResolveArgs, SourceMap, TransformOptions, TransformResult,
};

const STDOUT_PATH: &str = "<stdout>";
const STDIN_PATH: &str = "<stdin>";

#[derive(Debug, Default)]
pub struct PassthroughEngine;

impl PassthroughEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Diagnostics collected while loading sources.
#[derive(Default)]
struct Diagnostics {
    errors: Vec<Message>,
    warnings: Vec<Message>,
}

impl Diagnostics {
    fn plugin_error(&mut self, plugin: &dyn Plugin, error: PluginError) {
        let name = error.plugin_name().unwrap_or(plugin.name()).to_owned();
        self.errors.push(Message::new(format!("[{name}] {error}")));
    }
}

struct Source {
    name: String,
    contents: String,
}

/// Returns the resolved path, its namespace and whether it is external.
fn resolve(
    plugins: &[Arc<dyn Plugin>],
    entry: &str,
    diagnostics: &mut Diagnostics,
) -> (String, String, bool) {
    let args = ResolveArgs {
        path: entry.to_owned(),
        importer: String::new(),
        namespace: "file".to_owned(),
        resolve_dir: std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default(),
    };
    for plugin in plugins {
        match plugin.on_resolve(&args) {
            Ok(mut result) => {
                diagnostics.errors.append(&mut result.errors);
                diagnostics.warnings.append(&mut result.warnings);
                if !result.path.is_empty() {
                    let namespace = if result.namespace.is_empty() {
                        "file".to_owned()
                    } else {
                        result.namespace
                    };
                    return (result.path, namespace, result.external);
                }
            }
            Err(e) => diagnostics.plugin_error(plugin.as_ref(), e),
        }
    }
    (entry.to_owned(), "file".to_owned(), false)
}

fn load(
    plugins: &[Arc<dyn Plugin>],
    path: &str,
    namespace: &str,
    diagnostics: &mut Diagnostics,
) -> Option<Vec<u8>> {
    let args = LoadArgs {
        path: path.to_owned(),
        namespace: namespace.to_owned(),
    };
    for plugin in plugins {
        match plugin.on_load(&args) {
            Ok(mut result) => {
                diagnostics.errors.append(&mut result.errors);
                diagnostics.warnings.append(&mut result.warnings);
                if result.contents.is_some() {
                    return result.contents;
                }
            }
            Err(e) => diagnostics.plugin_error(plugin.as_ref(), e),
        }
    }

    if namespace != "file" {
        diagnostics.errors.push(Message::new(format!(
            "No plugin loaded \"{path}\" in namespace \"{namespace}\""
        )));
        return None;
    }
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            diagnostics
                .errors
                .push(Message::new(format!("Could not read \"{path}\": {e}")));
            None
        }
    }
}

/// Drop indentation and blank lines.
fn minify_whitespace(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn source_map(sources: &[Source]) -> String {
    serde_json::json!({
        "version": 3,
        "sources": sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "sourcesContent": sources.iter().map(|s| s.contents.as_str()).collect::<Vec<_>>(),
        "mappings": "",
        "names": [],
    })
    .to_string()
}

fn inline_map_comment(map: &str) -> String {
    format!(
        "//# sourceMappingURL=data:application/json;base64,{}\n",
        STANDARD.encode(map)
    )
}

fn output_path(options: &BuildOptions) -> String {
    if !options.outfile.is_empty() {
        return options.outfile.clone();
    }
    if !options.outdir.is_empty() {
        let stem = options
            .entry_points
            .first()
            .and_then(|e| Path::new(e).file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("stdin");
        return Path::new(&options.outdir)
            .join(format!("{stem}.js"))
            .display()
            .to_string();
    }
    STDOUT_PATH.to_owned()
}

fn write_file(path: &str, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

impl Engine for PassthroughEngine {
    fn build(&self, options: BuildOptions) -> BuildResult {
        let mut diagnostics = Diagnostics::default();
        let mut sources = Vec::new();

        if let Some(stdin) = &options.stdin {
            let name = if stdin.sourcefile.is_empty() {
                STDIN_PATH
            } else {
                stdin.sourcefile.as_str()
            };
            sources.push(Source {
                name: name.to_owned(),
                contents: stdin.contents.clone(),
            });
        }

        for entry in &options.entry_points {
            let (path, namespace, external) = resolve(&options.plugins, entry, &mut diagnostics);
            if external || options.external.iter().any(|e| e == entry) {
                tracing::debug!(entry = %entry, "Skipping external entry point");
                continue;
            }
            if let Some(bytes) = load(&options.plugins, &path, &namespace, &mut diagnostics) {
                sources.push(Source {
                    name: path,
                    contents: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
        }

        if !diagnostics.errors.is_empty() {
            return BuildResult {
                errors: diagnostics.errors,
                warnings: diagnostics.warnings,
                output_files: Vec::new(),
            };
        }

        let mut code = String::new();
        for source in &sources {
            code.push_str(&source.contents);
            if !code.is_empty() && !code.ends_with('\n') {
                code.push('\n');
            }
        }
        if options.minify.whitespace {
            code = minify_whitespace(&code);
        }

        let path = output_path(&options);
        let mut files = Vec::new();
        if options.sourcemap != SourceMap::None {
            let map = source_map(&sources);
            let map_path = format!("{path}.map");
            if options.sourcemap.has_inline() {
                code.push_str(&inline_map_comment(&map));
            } else if options.sourcemap == SourceMap::Linked {
                let name = Path::new(&map_path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(&map_path);
                code.push_str(&format!("//# sourceMappingURL={name}\n"));
            }
            if options.sourcemap.has_file() {
                files.push(OutputFile {
                    path: map_path,
                    contents: map.into_bytes(),
                });
            }
        }
        files.insert(
            0,
            OutputFile {
                path,
                contents: code.into_bytes(),
            },
        );

        if !options.write {
            return BuildResult {
                errors: diagnostics.errors,
                warnings: diagnostics.warnings,
                output_files: files,
            };
        }

        for file in &files {
            if let Err(e) = write_file(&file.path, &file.contents) {
                diagnostics
                    .errors
                    .push(Message::new(format!("Failed to write to output file: {e}")));
            } else {
                tracing::debug!(path = %file.path, bytes = file.contents.len(), "Wrote output file");
            }
        }
        BuildResult {
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
            output_files: Vec::new(),
        }
    }

    fn transform(&self, input: String, options: TransformOptions) -> TransformResult {
        let mut code = if options.minify.whitespace {
            minify_whitespace(&input)
        } else {
            input.clone()
        };

        let mut map = Vec::new();
        if options.sourcemap != SourceMap::None {
            let name = if options.sourcefile.is_empty() {
                STDIN_PATH.to_owned()
            } else {
                options.sourcefile.clone()
            };
            let json = source_map(&[Source {
                name,
                contents: input,
            }]);
            if options.sourcemap.has_inline() {
                if !code.is_empty() && !code.ends_with('\n') {
                    code.push('\n');
                }
                code.push_str(&inline_map_comment(&json));
            }
            if options.sourcemap.has_file() {
                map = json.into_bytes();
            }
        }

        TransformResult {
            code: code.into_bytes(),
            map,
            ..TransformResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use buildwire::{LoadResult, Minify, ResolveResult, StdinOptions};

    use super::*;

    /// Serves `virtual:*` modules from memory and fails on `virtual:broken`.
    struct VirtualModules;

    impl Plugin for VirtualModules {
        fn name(&self) -> &str {
            "virtual"
        }

        fn on_resolve(&self, args: &ResolveArgs) -> Result<ResolveResult, PluginError> {
            if args.path == "virtual:broken" {
                return Err(PluginError::Host {
                    plugin_name: String::new(),
                    message: "cannot resolve".into(),
                });
            }
            if args.path.starts_with("virtual:") {
                return Ok(ResolveResult {
                    path: args.path.clone(),
                    namespace: "virtual".into(),
                    ..ResolveResult::default()
                });
            }
            Ok(ResolveResult::default())
        }

        fn on_load(&self, args: &LoadArgs) -> Result<LoadResult, PluginError> {
            if args.namespace != "virtual" {
                return Ok(LoadResult::default());
            }
            Ok(LoadResult {
                contents: Some(format!("export const name = {:?};", args.path).into_bytes()),
                ..LoadResult::default()
            })
        }
    }

    fn decode_inline_map(code: &str) -> serde_json::Value {
        let (_, encoded) = code
            .trim_end()
            .rsplit_once("base64,")
            .expect("inline source map comment");
        serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn transform_echoes_input() {
        let result = PassthroughEngine.transform("let a = 1;".into(), TransformOptions::default());
        assert_eq!(result.code, b"let a = 1;");
        assert!(result.map.is_empty());
    }

    #[test]
    fn transform_minifies_whitespace() {
        let options = TransformOptions {
            minify: Minify {
                whitespace: true,
                ..Minify::default()
            },
            ..TransformOptions::default()
        };
        let result = PassthroughEngine.transform("  a();\n\n    b();\n".into(), options);
        assert_eq!(String::from_utf8(result.code).unwrap(), "a();\nb();\n");
    }

    #[test]
    fn transform_inline_source_map() {
        let options = TransformOptions {
            sourcemap: SourceMap::Inline,
            sourcefile: "in.js".into(),
            ..TransformOptions::default()
        };
        let result = PassthroughEngine.transform("x()".into(), options);
        let code = String::from_utf8(result.code).unwrap();
        assert!(code.starts_with("x()\n//# sourceMappingURL=data:application/json;base64,"));
        insta::assert_json_snapshot!(decode_inline_map(&code), @r#"
        {
          "mappings": "",
          "names": [],
          "sources": [
            "in.js"
          ],
          "sourcesContent": [
            "x()"
          ],
          "version": 3
        }
        "#);
        assert!(result.map.is_empty());
    }

    #[test]
    fn transform_external_source_map() {
        let options = TransformOptions {
            sourcemap: SourceMap::External,
            ..TransformOptions::default()
        };
        let result = PassthroughEngine.transform("x()".into(), options);
        assert_eq!(result.code, b"x()");
        let map: serde_json::Value = serde_json::from_slice(&result.map).unwrap();
        assert_eq!(map["sources"][0], "<stdin>");
    }

    #[test]
    fn build_from_stdin_and_plugins() {
        let options = BuildOptions {
            entry_points: vec!["virtual:a".into(), "ext".into()],
            external: vec!["ext".into()],
            stdin: Some(StdinOptions {
                contents: "console.log(1)".into(),
                ..StdinOptions::default()
            }),
            plugins: vec![Arc::new(VirtualModules)],
            ..BuildOptions::default()
        };
        let result = PassthroughEngine.build(options);

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.output_files.len(), 1);
        assert_eq!(result.output_files[0].path, "<stdout>");
        assert_eq!(
            String::from_utf8_lossy(&result.output_files[0].contents),
            "console.log(1)\nexport const name = \"virtual:a\";\n"
        );
    }

    #[test]
    fn plugin_errors_become_prefixed_diagnostics() {
        let options = BuildOptions {
            entry_points: vec!["virtual:broken".into()],
            plugins: vec![Arc::new(VirtualModules)],
            ..BuildOptions::default()
        };
        let result = PassthroughEngine.build(options);
        assert!(result.output_files.is_empty());
        let texts: Vec<_> = result.errors.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts[0], "[virtual] cannot resolve");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.js");
        let options = BuildOptions {
            entry_points: vec![missing.display().to_string()],
            ..BuildOptions::default()
        };
        let result = PassthroughEngine.build(options);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].text.starts_with("Could not read"));
    }

    #[test]
    fn writing_build_with_linked_map() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.js");
        fs::write(&entry, "  main();\n").unwrap();
        let outdir = dir.path().join("dist");

        let options = BuildOptions {
            entry_points: vec![entry.display().to_string()],
            outdir: outdir.display().to_string(),
            sourcemap: SourceMap::Linked,
            minify: Minify {
                whitespace: true,
                ..Minify::default()
            },
            write: true,
            ..BuildOptions::default()
        };
        let result = PassthroughEngine.build(options);

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.output_files.is_empty());
        assert_eq!(
            fs::read_to_string(outdir.join("main.js")).unwrap(),
            "main();\n//# sourceMappingURL=main.js.map\n"
        );
        let map: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(outdir.join("main.js.map")).unwrap()).unwrap();
        assert_eq!(map["version"], 3);
    }
}
