use std::process;

use clap::Subcommand;

use tessera::config::Config;

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Entry counts and disk usage per backend
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every cached artifact
    Clear,
    /// Print the cache directory
    Path,
}

pub fn cmd_cache(command: CacheCommand, config: &Config) {
    let cache = tessera::cache::global();
    match command {
        CacheCommand::Stats { json } => {
            let stats = match cache.stats() {
                Ok(stats) => stats,
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            };
            if json {
                match serde_json::to_string_pretty(&stats) {
                    Ok(text) => println!("{}", text),
                    Err(e) => eprintln!("error: {}", e),
                }
                return;
            }
            println!("cache: {}", cache.root().display());
            if let Some(path) = &config.path {
                println!("config: {}", path.display());
            }
            if stats.entries.is_empty() {
                println!("  (empty)");
            }
            for (backend, count) in &stats.entries {
                println!("  {:<12} {} entr{}", backend.name(), count, if *count == 1 { "y" } else { "ies" });
            }
            println!("  {:<12} {}", "total", format_bytes(stats.total_bytes));
        }
        CacheCommand::Clear => match cache.clear() {
            Ok(()) => eprintln!("cleared {}", cache.root().display()),
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        CacheCommand::Path => println!("{}", cache.root().display()),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 1), "5.0 MiB");
    }
}
