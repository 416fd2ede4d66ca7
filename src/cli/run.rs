use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Args;

use tessera::config::Config;
use tessera::{
    AccessIntent, Backend, Bindings, DType, FieldStorage, GridIndex, Invocation, Origin, Stencil,
};

use super::{check_file, parse_assignment, parse_backend, parse_triple, resolve_backend, resolve_options};

#[derive(Args)]
pub struct RunArgs {
    /// Input stencil file
    pub input: PathBuf,
    /// Stencil to run (default: the only one in the file)
    #[arg(short, long)]
    pub stencil: Option<String>,
    /// Backend: reference, vectorized, native or gpu (default from tessera.toml)
    #[arg(short, long, value_parser = parse_backend)]
    pub backend: Option<Backend>,
    /// Storage shape of every field, I,J,K
    #[arg(long, value_parser = parse_triple)]
    pub shape: [usize; 3],
    /// Origin of the computed region, I,J,K (default: each field's halo)
    #[arg(long, value_parser = parse_triple)]
    pub origin: Option<[usize; 3]>,
    /// Extent of the computed region, I,J,K (default: largest that fits)
    #[arg(long, value_parser = parse_triple)]
    pub domain: Option<[usize; 3]>,
    /// Scalar argument, name=value (repeatable)
    #[arg(long = "scalar", value_parser = parse_assignment)]
    pub scalars: Vec<(String, f64)>,
    /// Initial value of a field, name=value (repeatable; others start at 0)
    #[arg(long = "fill", value_parser = parse_assignment)]
    pub fills: Vec<(String, f64)>,
    /// Number of invocations
    #[arg(short = 'n', long, default_value_t = 1)]
    pub iterations: usize,
    /// Ignore cached artifacts and build again
    #[arg(long)]
    pub rebuild: bool,
}

/// Min, max and sum of a field after the run.
struct Summary {
    name: String,
    dtype: DType,
    intent: AccessIntent,
    min: f64,
    max: f64,
    sum: f64,
}

pub fn cmd_run(args: RunArgs, config: &Config) {
    let backend = resolve_backend(args.backend, config);
    let options = resolve_options(config, None, args.rebuild);

    let mut stencils = check_file(&args.input);
    let analyzed = match &args.stencil {
        Some(name) => match stencils.iter().position(|s| s.name() == name) {
            Some(at) => stencils.swap_remove(at),
            None => {
                eprintln!("error: no stencil named '{}' in {}", name, args.input.display());
                process::exit(1);
            }
        },
        None if stencils.len() == 1 => stencils.remove(0),
        None => {
            let names: Vec<&str> = stencils.iter().map(|s| s.name()).collect();
            eprintln!(
                "error: {} defines several stencils, pick one with --stencil ({})",
                args.input.display(),
                names.join(", ")
            );
            process::exit(1);
        }
    };

    let stencil = match tessera::build_analyzed(
        Arc::new(analyzed),
        backend,
        &options,
        tessera::cache::global(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    match execute(&stencil, &args) {
        Ok(summaries) => {
            println!(
                "  {:<16} {:<5} {:<10} {:>14} {:>14} {:>14}",
                "field", "dtype", "intent", "min", "max", "sum"
            );
            for s in summaries {
                println!(
                    "  {:<16} {:<5} {:<10} {:>14.6e} {:>14.6e} {:>14.6e}",
                    s.name,
                    s.dtype.name(),
                    s.intent.name(),
                    s.min,
                    s.max,
                    s.sum
                );
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn execute(stencil: &Stencil, args: &RunArgs) -> Result<Vec<Summary>, tessera::Error> {
    let fill = |name: &str| {
        args.fills
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map_or(0.0, |(_, v)| *v)
    };

    let mut storages: Vec<Box<dyn FieldStorage>> = Vec::new();
    for field in stencil.fields() {
        let origin = [0, 1, 2].map(|a| field.halo.lower[a].min(args.shape[a].saturating_sub(1)));
        let value = fill(&field.name);
        let storage: Box<dyn FieldStorage> = match field.dtype {
            DType::F32 => {
                let mut s = stencil.zeros::<f32>(args.shape, origin)?;
                s.fill(value as f32)?;
                Box::new(s)
            }
            DType::F64 => {
                let mut s = stencil.zeros::<f64>(args.shape, origin)?;
                s.fill(value)?;
                Box::new(s)
            }
        };
        storages.push(storage);
    }

    let mut call = Invocation::new();
    if let Some(origin) = args.origin {
        call = call.origin(Origin::uniform(origin));
    }
    if let Some(domain) = args.domain {
        call = call.domain(domain);
    }

    for _ in 0..args.iterations {
        let mut bindings = Bindings::new();
        for (field, storage) in stencil.fields().iter().zip(storages.iter_mut()) {
            bindings = bindings.field(field.name.as_str(), &mut **storage);
        }
        for (name, value) in &args.scalars {
            let param = stencil.analyzed().definition.param(name);
            bindings = match param.map(|p| p.dtype) {
                Some(DType::F32) => bindings.scalar(name.as_str(), *value as f32),
                _ => bindings.scalar(name.as_str(), *value),
            };
        }
        let info = stencil.invoke(bindings, &call)?;
        tracing::info!(
            domain = ?info.domain,
            elapsed = ?info.elapsed,
            "{} on {}",
            stencil.name(),
            info.backend
        );
    }

    let mut summaries = Vec::with_capacity(storages.len());
    for (field, storage) in stencil.fields().iter().zip(storages.iter_mut()) {
        storage.sync_host()?;
        let values = storage.read_region([0, 0, 0], storage.shape());
        let (min, max, sum) = values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v),
        );
        summaries.push(Summary {
            name: field.name.clone(),
            dtype: field.dtype,
            intent: field.intent,
            min,
            max,
            sum,
        });
    }
    Ok(summaries)
}
