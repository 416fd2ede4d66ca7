use super::*;

#[test]
fn test_interval_resolution() {
    assert_eq!(Interval::full().resolve(10), (0, 10));
    assert_eq!(Interval::from_levels(1, None).resolve(10), (1, 10));
    assert_eq!(Interval::from_levels(0, Some(-1)).resolve(10), (0, 9));
    assert_eq!(Interval::from_levels(-1, None).resolve(10), (9, 10));
    assert_eq!(Interval::from_levels(2, Some(4)).resolve(10), (2, 4));
}

#[test]
fn test_interval_clamps_to_small_domains() {
    assert_eq!(Interval::from_levels(2, Some(4)).resolve(3), (2, 3));
    assert_eq!(Interval::from_levels(5, None).resolve(3), (3, 3));
    // End below start resolves to an empty range, never a reversed one.
    assert_eq!(Interval::from_levels(3, Some(1)).resolve(10), (3, 3));
}

#[test]
fn test_policy_names_round_trip() {
    for p in [
        IterationPolicy::Parallel,
        IterationPolicy::Forward,
        IterationPolicy::Backward,
    ] {
        assert_eq!(IterationPolicy::from_name(p.name()), Some(p));
    }
    assert!(IterationPolicy::Forward.is_sequential());
    assert!(!IterationPolicy::Parallel.is_sequential());
}

#[test]
fn test_math_fn_arity_and_apply() {
    assert_eq!(MathFn::from_name("max"), Some(MathFn::Max));
    assert_eq!(MathFn::Max.arity(), 2);
    assert_eq!(MathFn::Sqrt.arity(), 1);
    assert_eq!(MathFn::Max.apply(&[1.0, 3.0]), 3.0);
    assert_eq!(MathFn::Abs.apply(&[-2.5]), 2.5);
    assert!(MathFn::from_name("printf").is_none());
}

#[test]
fn test_visit_fields_in_order() {
    let e = Expr::Binary {
        op: BinOp::Add,
        lhs: Box::new(Expr::Field {
            name: "a".into(),
            offset: Offset::new(-1, 0, 0),
        }),
        rhs: Box::new(Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::Scalar("c".into())),
            rhs: Box::new(Expr::Field {
                name: "b".into(),
                offset: Offset::new(0, 1, 0),
            }),
        }),
    };
    let mut seen = Vec::new();
    e.visit_fields(&mut |name, off| seen.push((name.to_string(), off)));
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Offset::new(-1, 0, 0)),
            ("b".to_string(), Offset::new(0, 1, 0)),
        ]
    );
    assert!(e.reads_field_where("a", |o| !o.is_zero()));
    assert!(!e.reads_field_where("b", |o| o.k != 0));
}

#[test]
fn test_display_parenthesizes_compound_operands() {
    let e = Expr::Binary {
        op: BinOp::Mul,
        lhs: Box::new(Expr::Scalar("coeff".into())),
        rhs: Box::new(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Literal(-4.0)),
            rhs: Box::new(Expr::Field {
                name: "u".into(),
                offset: Offset::new(1, 0, 0),
            }),
        }),
    };
    assert_eq!(e.to_string(), "coeff * ((-4.0) + u[1, 0, 0])");
}

#[test]
fn test_normalized_is_deterministic() {
    let def = StencilDefinition {
        name: "copy".into(),
        params: vec![Param::field("a", DType::F64), Param::field("b", DType::F64)],
        blocks: vec![ComputationBlock {
            policy: IterationPolicy::Parallel,
            interval: Interval::full(),
            stages: vec![Stage {
                target: "b".into(),
                value: Expr::Field {
                    name: "a".into(),
                    offset: Offset::ZERO,
                },
            }],
        }],
    };
    assert_eq!(def.normalized(), def.clone().normalized());
    assert!(def.normalized().contains("\"copy\""));
}
