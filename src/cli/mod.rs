pub mod build;
pub mod cache;
pub mod check;
pub mod run;

use std::path::{Path, PathBuf};
use std::process;

use tessera::config::Config;
use tessera::diagnostic::render_diagnostics;
use tessera::{AnalyzedStencil, Backend, BuildOptions};

/// Configuration in effect for this invocation: tessera.toml, environment,
/// then `--cache-dir`. Also initializes the process-wide build cache.
pub fn load_config(cache_dir: Option<PathBuf>) -> Config {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = match Config::discover(&cwd) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = Some(dir);
    }
    if let Err(e) = tessera::cache::init(config.cache_root()) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
    config
}

/// Backend from `--backend`, else the configured one.
pub fn resolve_backend(flag: Option<Backend>, config: &Config) -> Backend {
    flag.unwrap_or_else(|| config.backend())
}

/// Build options from the configuration plus command-line overrides.
pub fn resolve_options(config: &Config, opt_level: Option<u8>, rebuild: bool) -> BuildOptions {
    let mut options = config.options.clone();
    if let Some(level) = opt_level {
        options.opt_level = level;
    }
    options.rebuild = rebuild;
    options
}

pub fn read_source(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Parse and analyze a file, rendering diagnostics. Exits on errors.
pub fn check_file(path: &Path) -> Vec<AnalyzedStencil> {
    let source = read_source(path);
    let filename = path.display().to_string();
    match tessera::check(&source) {
        Ok(stencils) => {
            for s in &stencils {
                render_diagnostics(&s.warnings, &filename, &source);
            }
            stencils
        }
        Err(e) => {
            render_diagnostics(&e.diagnostics, &filename, &source);
            process::exit(1);
        }
    }
}

// ─── Argument Parsers ──────────────────────────────────────────────

pub fn parse_backend(s: &str) -> Result<Backend, String> {
    Backend::from_name(s).ok_or_else(|| {
        format!(
            "unknown backend '{}' (expected one of: reference, vectorized, native, gpu)",
            s
        )
    })
}

/// `I,J,K` → `[I, J, K]`.
pub fn parse_triple(s: &str) -> Result<[usize; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected three comma-separated values, got '{}'", s));
    }
    let mut out = [0; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{}' is not a non-negative integer", part))?;
    }
    Ok(out)
}

/// `name=value` → `(name, value)`.
pub fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.trim().to_string(), value))
}
