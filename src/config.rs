use std::path::{Path, PathBuf};

use crate::backend::{Backend, BuildOptions};
use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Name of the configuration file looked up from the working directory.
pub const CONFIG_FILE: &str = "tessera.toml";

/// Settings from tessera.toml, then the environment. CLI flags are applied
/// on top by the caller.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    /// The file this was loaded from, if any.
    pub path: Option<PathBuf>,
    /// `[cache] dir`, resolved against the config file's directory.
    pub cache_dir: Option<PathBuf>,
    /// `[build] backend`.
    pub backend: Option<Backend>,
    /// `[build] opt_level`, `cc`, `cflags`, `workgroup`.
    pub options: BuildOptions,
}

/// Parse a minimal TOML string array: `["a", "b", "c"]` → `vec!["a", "b", "c"]`.
fn parse_string_array(s: &str) -> Vec<String> {
    let s = s.trim();
    if !s.starts_with('[') || !s.ends_with(']') {
        return Vec::new();
    }
    let inner = &s[1..s.len() - 1];
    inner
        .split(',')
        .map(|part| part.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn config_error(path: &Path, message: String) -> Diagnostic {
    Diagnostic::error(format!("{}: {}", path.display(), message), Span::dummy())
}

impl Config {
    /// Load settings from a tessera.toml file.
    pub fn load(toml_path: &Path) -> Result<Config, Diagnostic> {
        let content = std::fs::read_to_string(toml_path).map_err(|e| {
            Diagnostic::error(
                format!("cannot read '{}': {}", toml_path.display(), e),
                Span::dummy(),
            )
        })?;
        let root_dir = toml_path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut config = Config {
            path: Some(toml_path.to_path_buf()),
            ..Config::default()
        };
        let mut current_section = String::new();

        for (n, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with('#') || trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                current_section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(config_error(
                    toml_path,
                    format!("line {}: expected `key = value`", n + 1),
                ));
            };
            let key = key.trim().trim_matches('"');
            let value = value.trim();
            let text = value.trim_matches('"');

            match (current_section.as_str(), key) {
                ("cache", "dir") => config.cache_dir = Some(root_dir.join(text)),
                ("build", "backend") => {
                    config.backend = Some(Backend::from_name(text).ok_or_else(|| {
                        config_error(toml_path, format!("unknown backend '{}'", text))
                    })?)
                }
                ("build", "opt_level") => {
                    config.options.opt_level = text
                        .parse::<u8>()
                        .ok()
                        .filter(|&o| o <= 3)
                        .ok_or_else(|| {
                            config_error(toml_path, format!("opt_level must be 0-3, found '{}'", text))
                        })?
                }
                ("build", "cc") => config.options.cc = Some(text.to_string()),
                ("build", "cflags") => config.options.cflags = parse_string_array(value),
                ("build", "workgroup") => {
                    config.options.workgroup = parse_workgroup(value).ok_or_else(|| {
                        config_error(
                            toml_path,
                            format!("workgroup must be two positive integers, found {}", value),
                        )
                    })?
                }
                (section, key) => {
                    tracing::warn!(
                        file = %toml_path.display(),
                        "ignoring unknown setting '{}' in [{}]",
                        key,
                        section
                    );
                }
            }
        }

        tracing::debug!(file = %toml_path.display(), ?config, "loaded configuration");
        Ok(config)
    }

    /// Try to find a tessera.toml in the given directory or its ancestors.
    pub fn find(start_dir: &Path) -> Option<PathBuf> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.exists() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// The configuration in effect for `start_dir`: the nearest
    /// tessera.toml, if any, with environment overrides applied.
    pub fn discover(start_dir: &Path) -> Result<Config, Diagnostic> {
        let mut config = match Self::find(start_dir) {
            Some(path) => Self::load(&path)?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `TESSERA_CACHE_DIR`, `TESSERA_BACKEND` and `CC` as read by
    /// `var`. Empty values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), Diagnostic> {
        let var = |name: &str| var(name).filter(|v| !v.is_empty());
        if let Some(dir) = var("TESSERA_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(name) = var("TESSERA_BACKEND") {
            let backend = Backend::from_name(&name).ok_or_else(|| {
                Diagnostic::error(
                    format!("TESSERA_BACKEND: unknown backend '{}'", name),
                    Span::dummy(),
                )
                .with_help("expected one of reference, vectorized, native, gpu".to_string())
            })?;
            self.backend = Some(backend);
        }
        if let Some(cc) = var("CC") {
            self.options.cc = Some(cc);
        }
        Ok(())
    }

    /// Cache root: configured directory, else the default location.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(crate::cache::default_root)
    }

    /// Backend to use when none is given on the command line.
    pub fn backend(&self) -> Backend {
        self.backend.unwrap_or(Backend::Reference)
    }
}

fn parse_workgroup(value: &str) -> Option<[u32; 2]> {
    let parts: Vec<u32> = parse_string_array(value)
        .iter()
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        &[x, y] if x > 0 && y > 0 => Some([x, y]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join(CONFIG_FILE);
        fs::write(
            &toml_path,
            r#"# project settings
[cache]
dir = "build/cache"

[build]
backend = "native"
opt_level = 2
cc = "clang"
cflags = ["-march=native", "-ffast-math"]
workgroup = [16, 4]
"#,
        )
        .unwrap();

        let config = Config::load(&toml_path).unwrap();
        assert_eq!(config.cache_dir, Some(dir.path().join("build/cache")));
        assert_eq!(config.backend(), Backend::Native);
        assert_eq!(config.options.opt_level, 2);
        assert_eq!(config.options.cc.as_deref(), Some("clang"));
        assert_eq!(config.options.cflags, vec!["-march=native", "-ffast-math"]);
        assert_eq!(config.options.workgroup, [16, 4]);
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.backend(), Backend::Reference);
        assert_eq!(config.options, BuildOptions::default());
        assert!(config.path.is_none());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join(CONFIG_FILE);
        for (body, needle) in [
            ("[build]\nbackend = \"cuda\"\n", "unknown backend 'cuda'"),
            ("[build]\nopt_level = 7\n", "opt_level"),
            ("[build]\nworkgroup = [0, 8]\n", "workgroup"),
            ("[build]\nbackend\n", "expected `key = value`"),
        ] {
            fs::write(&toml_path, body).unwrap();
            let err = Config::load(&toml_path).unwrap_err();
            assert!(err.message.contains(needle), "{}", err.message);
        }
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join(CONFIG_FILE);
        fs::write(&toml_path, "[build]\nbackend = \"native\"\ncc = \"clang\"\n").unwrap();
        let mut config = Config::load(&toml_path).unwrap();
        config
            .apply_env(env(&[
                ("TESSERA_BACKEND", "vectorized"),
                ("TESSERA_CACHE_DIR", "/tmp/tessera-cache"),
                ("CC", "gcc-13"),
            ]))
            .unwrap();
        assert_eq!(config.backend(), Backend::Vectorized);
        assert_eq!(config.cache_root(), PathBuf::from("/tmp/tessera-cache"));
        assert_eq!(config.options.cc.as_deref(), Some("gcc-13"));

        // Empty variables do not clear settings.
        config.apply_env(env(&[("CC", "")])).unwrap();
        assert_eq!(config.options.cc.as_deref(), Some("gcc-13"));

        assert!(config.apply_env(env(&[("TESSERA_BACKEND", "nope")])).is_err());
    }

    #[test]
    fn test_find_walks_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[build]\nbackend = \"gpu\"\n").unwrap();
        assert_eq!(Config::find(&nested), Some(dir.path().join(CONFIG_FILE)));
    }

    #[test]
    fn test_parse_string_array() {
        assert_eq!(
            parse_string_array(r#"["a", "b", "c"]"#),
            vec!["a", "b", "c"]
        );
        assert_eq!(parse_string_array(r#"["single"]"#), vec!["single"]);
        assert!(parse_string_array("not_an_array").is_empty());
        assert_eq!(parse_workgroup("[8, 8]"), Some([8, 8]));
        assert_eq!(parse_workgroup("[8]"), None);
    }
}
