use std::collections::BTreeSet;

use crate::diagnostic::Diagnostic;
use crate::ir::{ComputationBlock, IterationPolicy, Offset};
use crate::span::Span;

use super::{BlockPlan, Pass};

/// Reject read-after-write and self-reference hazards inside a block.
pub(super) fn check_hazards(block_idx: usize, block: &ComputationBlock) -> Vec<Diagnostic> {
    let mut errors = Vec::new();
    let mut written: BTreeSet<&str> = BTreeSet::new();

    for (stage_idx, stage) in block.stages.iter().enumerate() {
        let mut reported: BTreeSet<(String, Offset)> = BTreeSet::new();
        stage.value.visit_fields(&mut |name, offset| {
            if offset.is_zero() || !reported.insert((name.to_string(), offset)) {
                return;
            }
            let horizontal = !offset.is_horizontal_zero();
            let vertical_in_parallel = offset.k != 0 && block.policy == IterationPolicy::Parallel;
            if name == stage.target && (horizontal || vertical_in_parallel) {
                let help = if horizontal {
                    "a stage may only read its own target at a horizontal offset of zero; write to a separate field"
                } else {
                    "PARALLEL levels have no order; use FORWARD or BACKWARD to read neighboring levels of the target"
                };
                errors.push(
                    Diagnostic::error(
                        format!(
                            "stage {} of block {} reads its own target '{}' at offset {}",
                            stage_idx + 1,
                            block_idx + 1,
                            name,
                            offset
                        ),
                        Span::dummy(),
                    )
                    .with_help(help.to_string()),
                );
            } else if written.contains(name) {
                errors.push(
                    Diagnostic::error(
                        format!(
                            "stage {} of block {} reads '{}' at offset {} after an earlier stage in the same block wrote it",
                            stage_idx + 1,
                            block_idx + 1,
                            name,
                            offset
                        ),
                        Span::dummy(),
                    )
                    .with_help(
                        "read-after-write at a nonzero offset is ambiguous; move the reading stage into a new computation block"
                            .to_string(),
                    ),
                );
            }
        });
        written.insert(stage.target.as_str());
    }
    errors
}

/// Split a block's stages into passes that can share one loop nest.
///
/// A fused loop visits each point once and runs every stage there, which
/// differs from stage-by-stage execution only when a stage overwrites a
/// field that an earlier stage of the pass reads at a neighbor the loop has
/// already visited (or will visit later). Such a stage starts a new pass.
pub(super) fn plan_block(block: &ComputationBlock) -> BlockPlan {
    let mut passes = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut offset_reads: BTreeSet<String> = BTreeSet::new();

    for (idx, stage) in block.stages.iter().enumerate() {
        if offset_reads.contains(&stage.target) && !current.is_empty() {
            passes.push(Pass {
                stages: std::mem::take(&mut current),
            });
            offset_reads.clear();
        }
        stage.value.visit_fields(&mut |name, offset| {
            let conflicting = match block.policy {
                IterationPolicy::Parallel => !offset.is_zero(),
                _ => !offset.is_horizontal_zero(),
            };
            if conflicting {
                offset_reads.insert(name.to_string());
            }
        });
        current.push(idx);
    }
    if !current.is_empty() {
        passes.push(Pass { stages: current });
    }

    BlockPlan {
        policy: block.policy,
        interval: block.interval,
        stages: block.stages.clone(),
        passes,
    }
}
