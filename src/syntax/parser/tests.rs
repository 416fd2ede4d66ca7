use super::*;
use crate::ir::{BinOp, IterationPolicy, UnaryOp};
use crate::lexer::Lexer;

fn parse(source: &str) -> File {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    match Parser::new(tokens).parse_file() {
        Ok(file) => file,
        Err(errors) => panic!("parse errors: {:?}", errors),
    }
}

fn parse_err(source: &str) -> Vec<Diagnostic> {
    let (tokens, _) = Lexer::new(source).tokenize();
    match Parser::new(tokens).parse_file() {
        Ok(_) => panic!("expected parse errors for {:?}", source),
        Err(errors) => errors,
    }
}

/// Parse a single expression by wrapping it in a one-stage stencil.
fn parse_value(expr: &str) -> Expr {
    let src = format!(
        "stencil t(a: Field<f64>) {{ with computation(PARALLEL), interval(...) {{ a = {}; }} }}",
        expr
    );
    let file = parse(&src);
    file.stencils[0].blocks[0].node.stages[0].node.value.node.clone()
}

#[test]
fn test_parse_laplacian() {
    let file = parse(
        "stencil laplacian(in_field: Field<f64>, out_field: Field<f64>, coeff: f64) {
            with computation(PARALLEL), interval(...) {
                out_field = coeff * (-4.0 * in_field[0, 0, 0]
                    + in_field[-1, 0, 0] + in_field[1, 0, 0]
                    + in_field[0, -1, 0] + in_field[0, 1, 0]);
            }
        }",
    );
    assert_eq!(file.stencils.len(), 1);
    let def = &file.stencils[0];
    assert_eq!(def.name.node, "laplacian");
    assert_eq!(def.params.len(), 3);
    assert!(matches!(def.params[0].ty.node, Type::Field(ref d) if d.node == "f64"));
    assert!(matches!(def.params[2].ty.node, Type::Scalar(ref d) if d == "f64"));
    assert_eq!(def.blocks.len(), 1);
    assert_eq!(def.blocks[0].node.policy.node, IterationPolicy::Parallel);
    assert_eq!(def.blocks[0].node.interval.node, IntervalSpec::Full);
    assert_eq!(def.blocks[0].node.stages.len(), 1);
}

#[test]
fn test_parse_intervals_and_policies() {
    let file = parse(
        "stencil s(a: Field<f32>, b: Field<f32>) {
            with computation(FORWARD), interval(0, 1) { b = a }
            with computation(FORWARD), interval(1, None) { b = b[0, 0, -1] + a }
            with computation(BACKWARD), interval(0, -1) { b = b[0, 0, 1] }
        }",
    );
    let blocks = &file.stencils[0].blocks;
    assert_eq!(blocks.len(), 3);
    assert_eq!(
        blocks[0].node.interval.node,
        IntervalSpec::Levels {
            start: 0,
            end: Some(1)
        }
    );
    assert_eq!(
        blocks[1].node.interval.node,
        IntervalSpec::Levels {
            start: 1,
            end: None
        }
    );
    assert_eq!(
        blocks[2].node.interval.node,
        IntervalSpec::Levels {
            start: 0,
            end: Some(-1)
        }
    );
    assert_eq!(blocks[2].node.policy.node, IterationPolicy::Backward);
}

#[test]
fn test_precedence_mul_over_add() {
    let e = parse_value("a + 2.0 * a");
    match e {
        Expr::Binary { op, rhs, .. } => {
            assert_eq!(op, BinOp::Add);
            assert!(matches!(rhs.node, Expr::Binary { op: BinOp::Mul, .. }));
        }
        other => panic!("expected binary, got {:?}", other),
    }
}

#[test]
fn test_pow_is_right_associative_and_binds_tighter_than_neg() {
    let e = parse_value("-a ** 2 ** 3");
    let Expr::Unary { op, operand } = e else {
        panic!("expected unary");
    };
    assert_eq!(op, UnaryOp::Neg);
    let Expr::Binary { op, rhs, .. } = operand.node else {
        panic!("expected pow");
    };
    assert_eq!(op, BinOp::Pow);
    assert!(matches!(rhs.node, Expr::Binary { op: BinOp::Pow, .. }));
}

#[test]
fn test_conditional_expression() {
    let e = parse_value("a if a > 0.0 and not a > 1.0 else 0.0");
    let Expr::Conditional { cond, then, .. } = e else {
        panic!("expected conditional");
    };
    assert!(matches!(then.node, Expr::Name(ref n) if n == "a"));
    let Expr::Binary { op, rhs, .. } = cond.node else {
        panic!("expected `and`");
    };
    assert_eq!(op, BinOp::And);
    assert!(matches!(
        rhs.node,
        Expr::Unary {
            op: UnaryOp::Not,
            ..
        }
    ));
}

#[test]
fn test_nested_conditional_in_else_branch() {
    let e = parse_value("1.0 if a > 0.0 else -1.0 if a < 0.0 else 0.0");
    let Expr::Conditional { otherwise, .. } = e else {
        panic!("expected conditional");
    };
    assert!(matches!(otherwise.node, Expr::Conditional { .. }));
}

#[test]
fn test_calls_and_indexing() {
    let e = parse_value("max(a[1, 0, 0], sqrt(a))");
    let Expr::Call { func, args } = e else {
        panic!("expected call");
    };
    assert_eq!(func.node, "max");
    assert_eq!(args.len(), 2);
    match &args[0].node {
        Expr::Index { name, offsets } => {
            assert_eq!(name.node, "a");
            assert_eq!(offsets.len(), 3);
        }
        other => panic!("expected index, got {:?}", other),
    }
    assert!(matches!(args[1].node, Expr::Call { .. }));
}

#[test]
fn test_spans_cover_stage() {
    let src = "stencil t(a: Field<f64>) { with computation(PARALLEL), interval(...) { a = a[1, 0, 0] } }";
    let file = parse(src);
    let stage = &file.stencils[0].blocks[0].node.stages[0];
    assert_eq!(&src[stage.span.range()], "a = a[1, 0, 0]");
}

#[test]
fn test_multiple_stencils() {
    let file = parse(
        "stencil one(a: Field<f64>) { with computation(PARALLEL), interval(...) { a = 1.0 } }
         stencil two(a: Field<f64>) { with computation(PARALLEL), interval(...) { a = 2.0 } }",
    );
    assert_eq!(file.stencils.len(), 2);
    assert_eq!(file.stencils[1].name.node, "two");
}

#[test]
fn test_error_empty_file() {
    let errors = parse_err("// nothing here\n");
    assert!(errors[0].message.contains("no stencil definitions"));
}

#[test]
fn test_error_unknown_policy_has_help() {
    let errors = parse_err(
        "stencil t(a: Field<f64>) { with computation(SIDEWAYS), interval(...) { a = 1.0 } }",
    );
    assert!(errors[0].message.contains("SIDEWAYS"));
    assert!(errors[0].help.as_deref().unwrap_or("").contains("PARALLEL"));
}

#[test]
fn test_error_stage_outside_block() {
    let errors = parse_err("stencil t(a: Field<f64>) { a = 1.0 }");
    assert!(errors[0].message.contains("with computation"));
}

#[test]
fn test_error_missing_equals_recovers() {
    let errors = parse_err(
        "stencil t(a: Field<f64>, b: Field<f64>) {
            with computation(PARALLEL), interval(...) { a 1.0; b = = 2.0; }
        }",
    );
    assert!(errors.len() >= 2, "expected both stages reported: {:?}", errors);
}

#[test]
fn test_error_unterminated_file_terminates() {
    let errors = parse_err("stencil t(a: Field<f64>) { with computation(PARALLEL), interval(");
    assert!(!errors.is_empty());
}

#[test]
fn test_deep_nesting_is_rejected() {
    let mut expr = String::new();
    for _ in 0..300 {
        expr.push('(');
    }
    expr.push('a');
    for _ in 0..300 {
        expr.push(')');
    }
    let src = format!(
        "stencil t(a: Field<f64>) {{ with computation(PARALLEL), interval(...) {{ a = {} }} }}",
        expr
    );
    let errors = parse_err(&src);
    assert!(errors.iter().any(|d| d.message.contains("nesting depth")));
}
