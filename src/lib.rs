//! Tessera: a stencil language for structured 3-D grids, compiled on demand
//! for a reference interpreter, whole-array CPU evaluation, native C, or
//! WGSL compute shaders.
//!
//! The pipeline is explicit: [`parse`] (or [`StencilBuilder`]) produces a
//! [`StencilDefinition`], [`analyze`] infers halos, access intents and
//! passes, and [`build`] generates, compiles and caches a kernel, handing
//! back a callable [`Stencil`].

pub mod analysis;
pub mod ast;
pub mod backend;
pub mod cache;
pub mod config;
pub mod definition;
pub mod diagnostic;
pub mod error;
pub mod ir;
pub mod stencil;
pub mod storage;
pub mod syntax;

// Re-exports: short paths for the front-end modules
pub use syntax::lexeme;
pub use syntax::lexer;
pub use syntax::parser;
pub use syntax::span;

// Re-export public API
pub use analysis::{analyze, AccessIntent, AnalyzedStencil, FieldInfo, Halo};
pub use backend::{Backend, BuildOptions};
pub use cache::BuildCache;
pub use definition::builder::{BlockBuilder, Expr, IntervalSpec, StencilBuilder};
pub use error::{
    BackendCompilationError, CacheError, DefinitionError, Error, OutOfBoundsError, Result,
    SignatureMismatchError, StorageError,
};
pub use ir::{DType, IterationPolicy, StencilDefinition};
pub use stencil::{Bindings, ExecInfo, Invocation, Origin, ScalarValue, Stencil};
pub use storage::{Coherence, DualLocation, FieldStorage, GridIndex, Storage};

use std::sync::Arc;

use diagnostic::Diagnostic;
use lexer::Lexer;
use parser::Parser;
use span::Span;

pub(crate) fn parse_source(source: &str) -> std::result::Result<ast::File, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_file()
}

/// Parse and lower every stencil in `source`.
pub fn parse(source: &str) -> std::result::Result<Vec<StencilDefinition>, DefinitionError> {
    let file = parse_source(source).map_err(DefinitionError::new)?;
    definition::lower_file(&file).map_err(DefinitionError::new)
}

/// Parse, lower and analyze every stencil in `source`.
///
/// Analysis works on span-free IR; its diagnostics are pointed at the name
/// of the stencil they belong to so they can be rendered against `source`.
pub fn check(source: &str) -> std::result::Result<Vec<AnalyzedStencil>, DefinitionError> {
    let file = parse_source(source).map_err(DefinitionError::new)?;
    let definitions = definition::lower_file(&file).map_err(DefinitionError::new)?;

    let mut analyzed = Vec::with_capacity(definitions.len());
    let mut diagnostics = Vec::new();
    for def in definitions {
        let name_span = file
            .stencils
            .iter()
            .find(|s| s.name.node == def.name)
            .map(|s| s.name.span)
            .unwrap_or_default();
        match analyze(def) {
            Ok(mut stencil) => {
                retarget(&mut stencil.warnings, name_span);
                analyzed.push(stencil);
            }
            Err(mut err) => {
                retarget(&mut err.diagnostics, name_span);
                diagnostics.extend(err.diagnostics);
            }
        }
    }
    if diagnostics.is_empty() {
        Ok(analyzed)
    } else {
        Err(DefinitionError::new(diagnostics))
    }
}

fn retarget(diagnostics: &mut [Diagnostic], span: Span) {
    for d in diagnostics.iter_mut().filter(|d| d.span.is_dummy()) {
        d.span = span;
    }
}

/// Analyze and build `definition` for `backend` through the process-wide
/// cache (see [`cache::init`]).
pub fn build(definition: StencilDefinition, backend: Backend, options: &BuildOptions) -> Result<Stencil> {
    build_with(definition, backend, options, cache::global())
}

/// Like [`build`], with an explicit cache.
pub fn build_with(
    definition: StencilDefinition,
    backend: Backend,
    options: &BuildOptions,
    cache: &BuildCache,
) -> Result<Stencil> {
    let analyzed = analyze(definition)?;
    build_analyzed(Arc::new(analyzed), backend, options, cache)
}

/// Build an already analyzed stencil.
pub fn build_analyzed(
    stencil: Arc<AnalyzedStencil>,
    backend: Backend,
    options: &BuildOptions,
    cache: &BuildCache,
) -> Result<Stencil> {
    for warning in &stencil.warnings {
        tracing::warn!(stencil = stencil.name(), "{}", warning.message);
    }
    let artifact = cache.get_or_build(&stencil, backend, options)?;
    Ok(Stencil::new(artifact))
}

/// Parse, analyze and build every stencil in `source`.
pub fn compile(source: &str, backend: Backend, options: &BuildOptions) -> Result<Vec<Stencil>> {
    check(source)?
        .into_iter()
        .map(|s| build_analyzed(Arc::new(s), backend, options, cache::global()))
        .collect()
}
