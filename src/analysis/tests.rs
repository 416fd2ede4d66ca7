use super::*;

fn analyze_src(source: &str) -> Result<AnalyzedStencil, DefinitionError> {
    let mut defs = crate::parse(source).unwrap_or_else(|e| panic!("{}", e));
    analyze(defs.remove(0))
}

fn analyzed(source: &str) -> AnalyzedStencil {
    analyze_src(source).unwrap_or_else(|e| panic!("{}", e))
}

fn rejected(source: &str) -> String {
    match analyze_src(source) {
        Ok(_) => panic!("expected a hazard error"),
        Err(e) => e.to_string(),
    }
}

#[test]
fn test_laplacian_halo() {
    let s = analyzed(
        "stencil lap(u: Field<f64>, out: Field<f64>) {
            with computation(PARALLEL), interval(...) {
                out = -4.0 * u + u[-1, 0, 0] + u[1, 0, 0] + u[0, -1, 0] + u[0, 2, 0]
            }
        }",
    );
    let u = s.field("u").unwrap();
    assert_eq!(u.halo.lower, [1, 1, 0]);
    assert_eq!(u.halo.upper, [1, 2, 0]);
    assert_eq!(u.intent, AccessIntent::Read);
    let out = s.field("out").unwrap();
    assert!(out.halo.is_zero());
    assert_eq!(out.intent, AccessIntent::Write);
    assert_eq!(s.max_halo().horizontal_width(), 2);
}

#[test]
fn test_vertical_halo_respects_interval() {
    let s = analyzed(
        "stencil tri(a: Field<f64>, b: Field<f64>) {
            with computation(FORWARD), interval(0, 1) { b = a }
            with computation(FORWARD), interval(1, None) { b = b[0, 0, -1] + a }
        }",
    );
    // b[k-1] is only read from level 1 upwards: no lower vertical halo.
    let b = s.field("b").unwrap();
    assert_eq!(b.halo.lower[2], 0);
    assert_eq!(b.halo.upper[2], 0);
    assert_eq!(b.intent, AccessIntent::ReadWrite);
}

#[test]
fn test_vertical_halo_full_interval() {
    let s = analyzed(
        "stencil d(a: Field<f64>, b: Field<f64>) {
            with computation(PARALLEL), interval(...) { b = a[0, 0, 1] - a[0, 0, -1] }
        }",
    );
    let a = s.field("a").unwrap();
    assert_eq!(a.halo.lower[2], 1);
    assert_eq!(a.halo.upper[2], 1);
}

#[test]
fn test_vertical_halo_end_anchored() {
    let s = analyzed(
        "stencil d(a: Field<f64>, b: Field<f64>) {
            with computation(PARALLEL), interval(0, -1) { b = a[0, 0, 1] }
        }",
    );
    // The last computed level is one below the top, so k+1 stays inside.
    assert_eq!(s.field("a").unwrap().halo.upper[2], 0);
}

#[test]
fn test_unused_parameters_warn() {
    let s = analyzed(
        "stencil w(a: Field<f64>, b: Field<f64>, unused: Field<f64>, c: f64) {
            with computation(PARALLEL), interval(...) { b = a }
        }",
    );
    assert_eq!(s.field("unused").unwrap().intent, AccessIntent::Unused);
    assert_eq!(s.warnings.len(), 2);
    assert!(s.warnings.iter().all(|w| !w.is_error()));
    assert!(s.warnings[0].message.contains("'unused'"));
    assert!(s.warnings[1].message.contains("'c'"));
}

#[test]
fn test_read_after_write_at_offset_is_rejected() {
    let msg = rejected(
        "stencil raw(a: Field<f64>, b: Field<f64>, c: Field<f64>) {
            with computation(PARALLEL), interval(...) {
                b = a
                c = b[1, 0, 0]
            }
        }",
    );
    assert!(msg.contains("after an earlier stage"), "{}", msg);
}

#[test]
fn test_read_after_write_at_zero_offset_is_allowed() {
    let s = analyzed(
        "stencil ok(a: Field<f64>, b: Field<f64>, c: Field<f64>) {
            with computation(PARALLEL), interval(...) {
                b = a * 2.0
                c = b + a[1, 0, 0]
            }
        }",
    );
    assert_eq!(s.pass_count(), 1);
}

#[test]
fn test_self_reference_rules() {
    let msg = rejected(
        "stencil s(a: Field<f64>) { with computation(PARALLEL), interval(...) { a = a[1, 0, 0] } }",
    );
    assert!(msg.contains("its own target"));
    let msg = rejected(
        "stencil s(a: Field<f64>) { with computation(PARALLEL), interval(...) { a = a[0, 0, -1] } }",
    );
    assert!(msg.contains("its own target"));
    // Sequential blocks may read neighboring levels of their target.
    analyzed(
        "stencil s(a: Field<f64>) { with computation(FORWARD), interval(1, None) { a = a[0, 0, -1] } }",
    );
}

#[test]
fn test_hazards_in_separate_blocks_are_fine() {
    analyzed(
        "stencil two(a: Field<f64>, b: Field<f64>, c: Field<f64>) {
            with computation(PARALLEL), interval(...) { b = a }
            with computation(PARALLEL), interval(...) { c = b[1, 0, 0] }
        }",
    );
}

#[test]
fn test_pass_split_on_write_after_offset_read() {
    let s = analyzed(
        "stencil p(a: Field<f64>, b: Field<f64>, c: Field<f64>) {
            with computation(PARALLEL), interval(...) {
                b = a[1, 0, 0]
                a = c
                c = a + b
            }
        }",
    );
    let block = &s.blocks[0];
    assert_eq!(block.passes.len(), 2);
    assert_eq!(block.passes[0].stages, vec![0]);
    assert_eq!(block.passes[1].stages, vec![1, 2]);
    let targets: Vec<&str> = block
        .pass_stages(&block.passes[1])
        .map(|st| st.target.as_str())
        .collect();
    assert_eq!(targets, vec!["a", "c"]);
}

#[test]
fn test_sequential_vertical_reads_do_not_split() {
    let s = analyzed(
        "stencil p(a: Field<f64>, b: Field<f64>) {
            with computation(FORWARD), interval(1, None) {
                b = a[0, 0, -1]
                a = b
            }
        }",
    );
    assert_eq!(s.blocks[0].passes.len(), 1);
}
