//! Invocations are validated in full before anything runs.

mod common;

use tessera::error::Bound;
use tessera::ir::{DType, ParamKind};
use tessera::{
    Backend, Bindings, Error, GridIndex, Invocation, OutOfBoundsError, Origin,
    SignatureMismatchError, Storage,
};

const STENCIL: &str = "stencil blur(src: Field<f64>, dst: Field<f64>, w: f64) {
    with computation(PARALLEL), interval(...) {
        dst = w * (src[-2, 0, 0] + src[1, 0, 0] + src[0, 0, 1])
    }
}";

fn out_of_bounds(err: Error) -> OutOfBoundsError {
    match err {
        Error::OutOfBounds(e) => e,
        other => panic!("expected an out-of-bounds error, got {}", other),
    }
}

fn mismatch(err: Error) -> SignatureMismatchError {
    match err {
        Error::SignatureMismatch(e) => e,
        other => panic!("expected a signature mismatch, got {}", other),
    }
}

fn storage(shape: [usize; 3], value: f64) -> Storage<f64> {
    Storage::full(Backend::Reference, shape, [0, 0, 0], value).unwrap()
}

#[test]
fn origin_inside_the_lower_halo_is_rejected() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(STENCIL, Backend::Reference, &cache);
    let mut src = storage([8, 4, 4], 1.0);
    let mut dst = storage([8, 4, 4], 7.0);

    let call = Invocation::new().origin(Origin::uniform([1, 0, 0]));
    let err = stencil
        .invoke(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .scalar("w", 1.0),
            &call,
        )
        .unwrap_err();
    let err = out_of_bounds(err);
    assert_eq!(err.field, "src");
    assert_eq!(err.axis, 0);
    assert_eq!(err.bound, Bound::Lower);
    assert_eq!((err.required, err.available), (2, 1));
    assert!(err.to_string().contains("'src'"));

    // Nothing was written.
    assert!(dst.to_array().unwrap().iter().all(|&v| v == 7.0));
}

#[test]
fn domain_past_the_upper_halo_is_rejected() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(STENCIL, Backend::Vectorized, &cache);
    let mut src = storage([8, 4, 4], 1.0);
    let mut dst = storage([8, 4, 4], 0.0);

    // k reads one level above: a full-height domain needs nk + 1 levels.
    let call = Invocation::new()
        .origin(Origin::uniform([2, 0, 0]))
        .domain([5, 4, 4]);
    let err = out_of_bounds(
        stencil
            .invoke(
                Bindings::new()
                    .field("src", &mut src)
                    .field("dst", &mut dst)
                    .scalar("w", 1.0),
                &call,
            )
            .unwrap_err(),
    );
    assert_eq!((err.field.as_str(), err.axis, err.bound), ("src", 2, Bound::Upper));
    assert_eq!((err.required, err.available), (5, 4));

    // The largest valid domain is inferred when none is given.
    let call = Invocation::new().origin(Origin::uniform([2, 0, 0]));
    let info = stencil
        .invoke(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .scalar("w", 1.0),
            &call,
        )
        .unwrap();
    assert_eq!(info.domain, [5, 4, 3]);
    assert_eq!(dst.get([2, 0, 0]).unwrap(), 3.0);
    assert_eq!(dst.get([2, 0, 3]).unwrap(), 0.0);
}

#[test]
fn overflowing_requests_are_rejected() {
    let (_dir, cache) = common::cache();
    for backend in [Backend::Reference, Backend::Vectorized] {
        let stencil = common::build(STENCIL, backend, &cache);
        let mut src = storage([8, 4, 4], 1.0);
        let mut dst = storage([8, 4, 4], 7.0);

        let call = Invocation::new()
            .origin(Origin::uniform([2, 0, 0]))
            .domain([usize::MAX, 1, 1]);
        let err = out_of_bounds(
            stencil
                .invoke(
                    Bindings::new()
                        .field("src", &mut src)
                        .field("dst", &mut dst)
                        .scalar("w", 1.0),
                    &call,
                )
                .unwrap_err(),
        );
        assert_eq!((err.field.as_str(), err.axis, err.bound), ("src", 0, Bound::Upper));
        assert_eq!(err.required, i64::MAX);

        // A huge origin with an inferred domain is caught the same way.
        let call = Invocation::new().origin(Origin::uniform([usize::MAX, 0, 0]));
        let err = out_of_bounds(
            stencil
                .invoke(
                    Bindings::new()
                        .field("src", &mut src)
                        .field("dst", &mut dst)
                        .scalar("w", 1.0),
                    &call,
                )
                .unwrap_err(),
        );
        assert_eq!((err.axis, err.bound), (0, Bound::Upper));
        assert!(dst.to_array().unwrap().iter().all(|&v| v == 7.0));
    }
}

#[test]
fn destination_too_small_is_rejected() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(STENCIL, Backend::Reference, &cache);
    let mut src = storage([8, 4, 4], 1.0);
    let mut dst = storage([4, 4, 4], 0.0);
    let call = Invocation::new()
        .origin(Origin::uniform([2, 0, 0]))
        .domain([5, 4, 3]);
    let err = out_of_bounds(
        stencil
            .invoke(
                Bindings::new()
                    .field("src", &mut src)
                    .field("dst", &mut dst)
                    .scalar("w", 1.0),
                &call,
            )
            .unwrap_err(),
    );
    assert_eq!(err.field, "dst");
    assert_eq!(err.bound, Bound::Upper);
}

#[test]
fn signature_mismatches() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(STENCIL, Backend::Reference, &cache);
    let mut src = storage([8, 4, 4], 1.0);
    let mut dst = storage([8, 4, 4], 0.0);
    let mut other = storage([8, 4, 4], 0.0);
    let mut single = Storage::<f32>::zeros(Backend::Reference, [8, 4, 4], [0, 0, 0]).unwrap();

    let err = stencil
        .run(Bindings::new().field("src", &mut src).scalar("w", 1.0))
        .unwrap_err();
    assert_eq!(mismatch(err), SignatureMismatchError::MissingField("dst".into()));

    let err = stencil
        .run(Bindings::new().field("src", &mut src).field("dst", &mut dst))
        .unwrap_err();
    assert_eq!(mismatch(err), SignatureMismatchError::MissingScalar("w".into()));

    let err = stencil
        .run(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .field("extra", &mut other)
                .scalar("w", 1.0),
        )
        .unwrap_err();
    assert_eq!(mismatch(err), SignatureMismatchError::UnknownArgument("extra".into()));

    let err = stencil
        .run(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut single)
                .scalar("w", 1.0),
        )
        .unwrap_err();
    assert_eq!(
        mismatch(err),
        SignatureMismatchError::WrongDType {
            name: "dst".into(),
            expected: DType::F64,
            found: DType::F32,
        }
    );

    let err = stencil
        .run(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .field("w", &mut other),
        )
        .unwrap_err();
    assert_eq!(
        mismatch(err),
        SignatureMismatchError::WrongKind {
            name: "w".into(),
            expected: ParamKind::Scalar,
        }
    );

    let err = stencil
        .run(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .scalar("w", 1.0)
                .scalar("w", 2.0),
        )
        .unwrap_err();
    assert_eq!(mismatch(err), SignatureMismatchError::DuplicateArgument("w".into()));

    let err = stencil
        .run(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .scalar("w", 1.0f32),
        )
        .unwrap_err();
    assert!(matches!(mismatch(err), SignatureMismatchError::WrongDType { .. }));

    let call = Invocation::new().origin(Origin::uniform([2, 0, 0]).with_field("nope", [0, 0, 0]));
    let err = stencil
        .invoke(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .scalar("w", 1.0),
            &call,
        )
        .unwrap_err();
    assert_eq!(mismatch(err), SignatureMismatchError::UnknownOrigin("nope".into()));
}

#[test]
fn unvalidated_calls_still_check_bounds() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(STENCIL, Backend::Reference, &cache);
    let mut src = storage([8, 4, 4], 1.0);
    let mut dst = storage([8, 4, 4], 0.0);
    let mut other = storage([2, 2, 2], 0.0);

    // Extra arguments and a mistyped scalar pass without validation.
    let call = Invocation::new()
        .origin(Origin::uniform([2, 0, 0]))
        .validate_args(false);
    stencil
        .invoke(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .field("extra", &mut other)
                .scalar("w", 2.0f32),
            &call,
        )
        .unwrap();
    assert_eq!(dst.get([2, 0, 0]).unwrap(), 6.0);

    let call = Invocation::new()
        .origin(Origin::uniform([0, 0, 0]))
        .validate_args(false);
    let err = stencil
        .invoke(
            Bindings::new()
                .field("src", &mut src)
                .field("dst", &mut dst)
                .scalar("w", 1.0),
            &call,
        )
        .unwrap_err();
    assert_eq!(out_of_bounds(err).bound, Bound::Lower);
}

#[test]
fn unused_fields_do_not_constrain_the_domain() {
    let (_dir, cache) = common::cache();
    let stencil = common::build(
        "stencil copy(a: Field<f64>, b: Field<f64>, spare: Field<f64>) {
            with computation(PARALLEL), interval(...) { b = a }
        }",
        Backend::Reference,
        &cache,
    );
    let mut a = storage([4, 4, 4], 2.0);
    let mut b = storage([4, 4, 4], 0.0);
    let mut spare = storage([1, 1, 1], 0.0);
    let info = stencil
        .run(
            Bindings::new()
                .field("a", &mut a)
                .field("b", &mut b)
                .field("spare", &mut spare),
        )
        .unwrap();
    assert_eq!(info.domain, [4, 4, 4]);
    assert!(b.to_array().unwrap().iter().all(|&v| v == 2.0));
}
