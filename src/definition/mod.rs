//! Lowering from the spanned AST to the name-resolved IR.
//!
//! This is where the permitted expression grammar is enforced: every name
//! must resolve to a declared parameter, field offsets must be integer
//! literals with exactly three components, and booleans may only appear as
//! conditions. All problems are collected as diagnostics before failing.

pub mod builder;
mod expr;

use std::collections::BTreeMap;

use crate::ast;
use crate::diagnostic::Diagnostic;
use crate::ir::{
    AxisBound, ComputationBlock, DType, Interval, LevelMarker, Param, ParamKind, Stage,
    StencilDefinition,
};
use crate::span::Spanned;

/// Lower every stencil in a parsed file.
pub(crate) fn lower_file(file: &ast::File) -> Result<Vec<StencilDefinition>, Vec<Diagnostic>> {
    let mut defs = Vec::new();
    let mut diagnostics = Vec::new();
    let mut seen: BTreeMap<&str, ()> = BTreeMap::new();

    for stencil in &file.stencils {
        if seen.insert(&stencil.name.node, ()).is_some() {
            diagnostics.push(Diagnostic::error(
                format!("stencil '{}' is defined more than once", stencil.name.node),
                stencil.name.span,
            ));
            continue;
        }
        match lower_stencil(stencil) {
            Ok(def) => defs.push(def),
            Err(errs) => diagnostics.extend(errs),
        }
    }

    if diagnostics.is_empty() {
        Ok(defs)
    } else {
        Err(diagnostics)
    }
}

/// Lower one stencil definition.
pub(crate) fn lower_stencil(def: &ast::StencilDef) -> Result<StencilDefinition, Vec<Diagnostic>> {
    Lowerer::new().lower(def)
}

pub(super) struct Lowerer {
    /// Declared parameters by name.
    pub(super) params: BTreeMap<String, Param>,
    pub(super) diagnostics: Vec<Diagnostic>,
}

impl Lowerer {
    fn new() -> Self {
        Self {
            params: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn lower(mut self, def: &ast::StencilDef) -> Result<StencilDefinition, Vec<Diagnostic>> {
        let params = self.lower_params(&def.params);

        if def.blocks.is_empty() {
            self.diagnostics.push(
                Diagnostic::error(
                    format!("stencil '{}' has no computation blocks", def.name.node),
                    def.name.span,
                )
                .with_help("add `with computation(PARALLEL), interval(...) { ... }`".to_string()),
            );
        }

        let blocks: Vec<ComputationBlock> = def.blocks.iter().map(|b| self.lower_block(b)).collect();

        if self.diagnostics.iter().any(|d| d.is_error()) {
            return Err(self.diagnostics);
        }
        Ok(StencilDefinition {
            name: def.name.node.clone(),
            params,
            blocks,
        })
    }

    fn lower_params(&mut self, params: &[ast::Param]) -> Vec<Param> {
        let mut out = Vec::new();
        for p in params {
            let (kind, dtype_name, dtype_span) = match &p.ty.node {
                ast::Type::Field(dtype) => (ParamKind::Field, dtype.node.as_str(), dtype.span),
                ast::Type::Scalar(dtype) => (ParamKind::Scalar, dtype.as_str(), p.ty.span),
            };
            let dtype = match DType::from_name(dtype_name) {
                Some(d) => d,
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            format!("unsupported element type '{}'", dtype_name),
                            dtype_span,
                        )
                        .with_help("supported element types are f32 and f64".to_string()),
                    );
                    DType::F64
                }
            };
            if self.params.contains_key(&p.name.node) {
                self.diagnostics.push(Diagnostic::error(
                    format!("parameter '{}' is declared more than once", p.name.node),
                    p.name.span,
                ));
                continue;
            }
            let param = Param {
                name: p.name.node.clone(),
                kind,
                dtype,
            };
            self.params.insert(param.name.clone(), param.clone());
            out.push(param);
        }
        out
    }

    fn lower_block(&mut self, block: &Spanned<ast::Block>) -> ComputationBlock {
        let interval = match block.node.interval.node {
            ast::IntervalSpec::Full => Interval::full(),
            ast::IntervalSpec::Levels { start, end } => {
                let start = start as i32;
                let end = end.map(|e| e as i32);
                let interval = Interval::from_levels(start, end);
                let bottom = (fixed_level(interval.start), fixed_level(interval.end));
                let top = (fixed_from_top(interval.start), fixed_from_top(interval.end));
                if let (Some(lo), Some(hi)) = bottom {
                    if hi <= lo {
                        self.error_empty_interval(lo, hi, block.node.interval.span);
                    }
                }
                if let (Some(lo), Some(hi)) = top {
                    if hi <= lo {
                        self.error_empty_interval(lo, hi, block.node.interval.span);
                    }
                }
                interval
            }
        };

        if block.node.stages.is_empty() {
            self.diagnostics.push(Diagnostic::warning(
                "computation block has no stages".to_string(),
                block.span,
            ));
        }

        let stages = block
            .node
            .stages
            .iter()
            .filter_map(|s| self.lower_stage(s))
            .collect();

        ComputationBlock {
            policy: block.node.policy.node,
            interval,
            stages,
        }
    }

    fn lower_stage(&mut self, stage: &Spanned<ast::Assign>) -> Option<Stage> {
        let target = self.lower_target(&stage.node.target);
        let value = self.lower_value(&stage.node.value);
        Some(Stage {
            target: target?,
            value: value?,
        })
    }

    /// The target must be a field parameter at offset `[0, 0, 0]`.
    fn lower_target(&mut self, target: &Spanned<ast::Expr>) -> Option<String> {
        let (name, offsets) = match &target.node {
            ast::Expr::Name(name) => (name.clone(), None),
            ast::Expr::Index { name, offsets } => (name.node.clone(), Some(offsets)),
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        "assignment target must be a field".to_string(),
                        target.span,
                    )
                    .with_help("write `field = expression`".to_string()),
                );
                return None;
            }
        };

        match self.params.get(&name).map(|p| p.kind) {
            Some(ParamKind::Field) => {}
            Some(ParamKind::Scalar) => {
                self.diagnostics.push(Diagnostic::error(
                    format!("cannot assign to scalar parameter '{}'", name),
                    target.span,
                ));
                return None;
            }
            None => {
                self.error_unknown_name(&name, target.span);
                return None;
            }
        }

        if let Some(offsets) = offsets {
            let offset = self.lower_offset(offsets, target.span)?;
            if !offset.is_zero() {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("cannot assign to '{}' at offset {}", name, offset),
                        target.span,
                    )
                    .with_help("stages always write the point being computed, `[0, 0, 0]`".to_string()),
                );
                return None;
            }
        }
        Some(name)
    }

    fn error_empty_interval(&mut self, lo: i32, hi: i32, span: crate::span::Span) {
        self.diagnostics.push(
            Diagnostic::error(
                format!("empty interval: end level {} is not above start level {}", hi, lo),
                span,
            )
            .with_help("intervals are half-open, `interval(lo, hi)` covers lo..hi".to_string()),
        );
    }

    pub(super) fn error_unknown_name(&mut self, name: &str, span: crate::span::Span) {
        let declared: Vec<&str> = self.params.keys().map(|k| k.as_str()).collect();
        let help = if declared.is_empty() {
            "the stencil declares no parameters".to_string()
        } else {
            format!("declared parameters: {}", declared.join(", "))
        };
        self.diagnostics.push(
            Diagnostic::error(format!("unknown name '{}'", name), span).with_help(help),
        );
    }
}

/// Level counted from the bottom, if the bound is anchored there.
fn fixed_level(bound: AxisBound) -> Option<i32> {
    match bound.level {
        LevelMarker::Start => Some(bound.offset),
        LevelMarker::End => None,
    }
}

/// Level counted from the top, if the bound is anchored there.
fn fixed_from_top(bound: AxisBound) -> Option<i32> {
    match bound.level {
        LevelMarker::End => Some(bound.offset),
        LevelMarker::Start => None,
    }
}
