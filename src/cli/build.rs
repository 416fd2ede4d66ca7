use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use rayon::prelude::*;

use tessera::config::Config;
use tessera::{Backend, Stencil};

use super::{check_file, parse_backend, resolve_backend, resolve_options};

#[derive(Args)]
pub struct BuildArgs {
    /// Input stencil files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Backend: reference, vectorized, native or gpu (default from tessera.toml)
    #[arg(short, long, value_parser = parse_backend)]
    pub backend: Option<Backend>,
    /// Native optimization level (0-3)
    #[arg(short = 'O', long, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub opt_level: Option<u8>,
    /// Ignore cached artifacts and build again
    #[arg(long)]
    pub rebuild: bool,
    /// Also copy each generated source into this directory
    #[arg(long, value_name = "DIR")]
    pub emit: Option<PathBuf>,
}

pub fn cmd_build(args: BuildArgs, config: &Config) {
    let BuildArgs {
        inputs,
        backend,
        opt_level,
        rebuild,
        emit,
    } = args;
    let backend = resolve_backend(backend, config);
    let options = resolve_options(config, opt_level, rebuild);

    let stencils: Vec<_> = inputs
        .iter()
        .flat_map(|input| check_file(input))
        .map(Arc::new)
        .collect();

    let started = Instant::now();
    let results: Vec<Result<Stencil, tessera::Error>> = stencils
        .par_iter()
        .map(|s| tessera::build_analyzed(s.clone(), backend, &options, tessera::cache::global()))
        .collect();

    let mut failed = false;
    for (analyzed, result) in stencils.iter().zip(results) {
        match result {
            Ok(stencil) => {
                println!(
                    "built {} ({}) -> {}",
                    stencil.name(),
                    backend,
                    stencil.source_path().display()
                );
                if let Some(dir) = &emit {
                    emit_source(dir, &stencil);
                }
            }
            Err(e) => {
                eprintln!("error: {}: {}", analyzed.name(), e);
                failed = true;
            }
        }
    }
    eprintln!(
        "{} stencil(s) in {:.2?}",
        stencils.len(),
        started.elapsed()
    );
    if failed {
        process::exit(1);
    }
}

fn emit_source(dir: &std::path::Path, stencil: &Stencil) {
    let path = dir.join(format!(
        "{}.{}",
        stencil.name(),
        stencil.backend().source_extension()
    ));
    let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, stencil.source()));
    match written {
        Ok(()) => eprintln!("  wrote {}", path.display()),
        Err(e) => {
            eprintln!("error: cannot write '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}
