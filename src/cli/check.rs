use std::path::PathBuf;

use clap::Args;

use tessera::AnalyzedStencil;

use super::check_file;

#[derive(Args)]
pub struct CheckArgs {
    /// Input stencil files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Print the analysis as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_check(args: CheckArgs) {
    let CheckArgs { inputs, json } = args;
    for input in &inputs {
        let stencils = check_file(input);
        if json {
            let report: Vec<_> = stencils.iter().map(report).collect();
            match serde_json::to_string_pretty(&report) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("error: {}", e),
            }
        } else {
            for stencil in &stencils {
                print_table(stencil);
            }
        }
        eprintln!("OK: {} ({} stencil(s))", input.display(), stencils.len());
    }
}

fn report(stencil: &AnalyzedStencil) -> serde_json::Value {
    serde_json::json!({
        "stencil": stencil.name(),
        "fields": stencil.fields,
        "blocks": stencil.blocks.len(),
        "passes": stencil.pass_count(),
    })
}

fn print_table(stencil: &AnalyzedStencil) {
    println!(
        "stencil {} ({} block(s), {} pass(es))",
        stencil.name(),
        stencil.blocks.len(),
        stencil.pass_count()
    );
    println!(
        "  {:<16} {:<5} {:<10} {:>7} {:>7} {:>7}",
        "field", "dtype", "intent", "i-/i+", "j-/j+", "k-/k+"
    );
    for field in &stencil.fields {
        let h = &field.halo;
        let pair = |a: usize| format!("{}/{}", h.lower[a], h.upper[a]);
        println!(
            "  {:<16} {:<5} {:<10} {:>7} {:>7} {:>7}",
            field.name,
            field.dtype.name(),
            field.intent.name(),
            pair(0),
            pair(1),
            pair(2)
        );
    }
    for param in stencil.definition.scalars() {
        println!("  {:<16} {:<5} scalar", param.name, param.dtype.name());
    }
}
