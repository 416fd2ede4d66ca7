//! Static analysis of a lowered definition: halo requirements, access
//! intents, hazard rejection and pass fusion.
//!
//! The result, [`AnalyzedStencil`], is what every backend consumes.

mod halo;
mod passes;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use halo::Halo;

use crate::diagnostic::Diagnostic;
use crate::error::DefinitionError;
use crate::ir::{DType, Interval, IterationPolicy, ParamKind, Stage, StencilDefinition};
use crate::span::Span;

/// How a stencil uses a field parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessIntent {
    Read,
    Write,
    ReadWrite,
    Unused,
}

impl AccessIntent {
    pub fn is_written(&self) -> bool {
        matches!(self, AccessIntent::Write | AccessIntent::ReadWrite)
    }

    pub fn is_read(&self) -> bool {
        matches!(self, AccessIntent::Read | AccessIntent::ReadWrite)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccessIntent::Read => "read",
            AccessIntent::Write => "write",
            AccessIntent::ReadWrite => "read-write",
            AccessIntent::Unused => "unused",
        }
    }
}

/// Per-field result of analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub dtype: DType,
    pub halo: Halo,
    pub intent: AccessIntent,
}

/// A run of stages lowered to a single loop nest. Indices refer to
/// [`BlockPlan::stages`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pass {
    pub stages: Vec<usize>,
}

/// A computation block with its stages partitioned into passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockPlan {
    pub policy: IterationPolicy,
    pub interval: Interval,
    pub stages: Vec<Stage>,
    pub passes: Vec<Pass>,
}

impl BlockPlan {
    pub fn pass_stages<'a>(&'a self, pass: &'a Pass) -> impl Iterator<Item = &'a Stage> + 'a {
        pass.stages.iter().map(move |&i| &self.stages[i])
    }
}

/// A definition annotated with everything code generation needs.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzedStencil {
    pub definition: StencilDefinition,
    /// Field parameters in declaration order.
    pub fields: Vec<FieldInfo>,
    pub blocks: Vec<BlockPlan>,
    /// Non-fatal findings, e.g. unused parameters.
    pub warnings: Vec<Diagnostic>,
}

impl AnalyzedStencil {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Union of all field halos.
    pub fn max_halo(&self) -> Halo {
        let mut halo = Halo::default();
        for f in &self.fields {
            halo.merge(&f.halo);
        }
        halo
    }

    pub fn pass_count(&self) -> usize {
        self.blocks.iter().map(|b| b.passes.len()).sum()
    }
}

/// Analyze a lowered definition.
pub fn analyze(definition: StencilDefinition) -> Result<AnalyzedStencil, DefinitionError> {
    let _span = tracing::debug_span!("analyze", stencil = %definition.name).entered();

    let mut errors = Vec::new();
    for (idx, block) in definition.blocks.iter().enumerate() {
        errors.extend(passes::check_hazards(idx, block));
    }
    if !errors.is_empty() {
        return Err(DefinitionError::new(errors));
    }

    let mut halos: BTreeMap<&str, Halo> = BTreeMap::new();
    let mut read: BTreeSet<&str> = BTreeSet::new();
    let mut written: BTreeSet<&str> = BTreeSet::new();
    let mut scalars_used: BTreeSet<&str> = BTreeSet::new();

    for block in &definition.blocks {
        for stage in &block.stages {
            written.insert(stage.target.as_str());
            stage.value.visit_fields(&mut |name, offset| {
                if let Some(param) = definition.param(name) {
                    read.insert(param.name.as_str());
                    halos
                        .entry(param.name.as_str())
                        .or_default()
                        .include(offset, block);
                }
            });
            stage.value.visit_scalars(&mut |name| {
                if let Some(param) = definition.param(name) {
                    scalars_used.insert(param.name.as_str());
                }
            });
        }
    }

    let mut warnings = Vec::new();
    let mut fields = Vec::new();
    for param in &definition.params {
        match param.kind {
            ParamKind::Field => {
                let name = param.name.as_str();
                let intent = match (read.contains(name), written.contains(name)) {
                    (true, true) => AccessIntent::ReadWrite,
                    (true, false) => AccessIntent::Read,
                    (false, true) => AccessIntent::Write,
                    (false, false) => {
                        warnings.push(unused_warning("field", name));
                        AccessIntent::Unused
                    }
                };
                fields.push(FieldInfo {
                    name: param.name.clone(),
                    dtype: param.dtype,
                    halo: halos.get(name).copied().unwrap_or_default(),
                    intent,
                });
            }
            ParamKind::Scalar => {
                if !scalars_used.contains(param.name.as_str()) {
                    warnings.push(unused_warning("scalar", &param.name));
                }
            }
        }
    }

    let blocks: Vec<BlockPlan> = definition.blocks.iter().map(passes::plan_block).collect();

    tracing::debug!(
        fields = fields.len(),
        passes = blocks.iter().map(|b| b.passes.len()).sum::<usize>(),
        "analysis complete"
    );

    Ok(AnalyzedStencil {
        definition,
        fields,
        blocks,
        warnings,
    })
}

fn unused_warning(kind: &str, name: &str) -> Diagnostic {
    Diagnostic::warning(
        format!("{} parameter '{}' is never used", kind, name),
        Span::dummy(),
    )
    .with_help("remove it from the signature if it is not needed".to_string())
}
