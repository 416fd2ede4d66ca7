//! Invokes the system C compiler on an emitted source.

use std::path::Path;
use std::process::Command;

use crate::backend::{Backend, BuildOptions};
use crate::error::BackendCompilationError;

/// File name of the shared library inside an artifact directory.
pub const LIBRARY_NAME: &str = if cfg!(target_os = "macos") {
    "kernel.dylib"
} else {
    "kernel.so"
};

/// The compiler to run: the override, then `$CC`, then `cc`.
pub fn compiler_command(options: &BuildOptions) -> String {
    options
        .cc
        .clone()
        .or_else(|| std::env::var("CC").ok().filter(|cc| !cc.is_empty()))
        .unwrap_or_else(|| "cc".to_string())
}

/// Check that the compiler runs at all.
pub fn is_available(options: &BuildOptions) -> bool {
    Command::new(compiler_command(options))
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Compile `source` into `dir/kernel.so`.
pub fn compile(
    source: &Path,
    dir: &Path,
    options: &BuildOptions,
) -> Result<(), BackendCompilationError> {
    let compiler = compiler_command(options);
    let lib_path = dir.join(LIBRARY_NAME);
    let mut args = vec![
        "-shared".to_string(),
        "-fPIC".to_string(),
        format!("-O{}", options.opt_level.min(3)),
    ];
    args.extend(options.cflags.iter().cloned());

    tracing::debug!(
        "running compile command: {} {} -o {} {}",
        compiler,
        args.join(" "),
        lib_path.display(),
        source.display()
    );

    let output = Command::new(&compiler)
        .args(&args)
        .arg("-o")
        .arg(&lib_path)
        .arg(source)
        .arg("-lm")
        .output()
        .map_err(|e| {
            BackendCompilationError::new(
                Backend::Native,
                format!("cannot run C compiler '{}': {}", compiler, e),
            )
            .with_source_path(source)
        })?;

    if !output.status.success() {
        return Err(BackendCompilationError::new(
            Backend::Native,
            format!(
                "'{}' exited with {}:\n{}",
                compiler,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            ),
        )
        .with_source_path(source));
    }
    Ok(())
}
