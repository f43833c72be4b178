mod common;

use approx::assert_abs_diff_eq;
use ckks_logreg::linalg::{diagonal_matvec, dot, linear_transform};
use ckks_logreg::packing::{DiagonalPacking, RowPacking, encode_packed, encrypt_packed};
use ckks_logreg::{ErrorKind, EvalContext, EventLog, Leveled, NoopObserver};
use common::{backend, chain, reveal};

#[test]
fn dot_product_fills_the_window() {
    let (backend, keys) = backend(&chain(3));
    let ctx = EvalContext::new(&backend, &keys.evaluation, &NoopObserver);
    let a = ctx.encrypt_values(&[1.0, 2.0, 3.0], 0).unwrap();
    let b = ctx.encrypt_values(&[4.0, 5.0, 6.0], 0).unwrap();

    let out = dot(&ctx, &a, &b, 3).unwrap();
    assert_eq!(out.level(), 1);
    assert_eq!(out.scale(), ctx.base_scale());
    for value in reveal(&backend, &keys, &out, 3) {
        assert_abs_diff_eq!(value, 32.0, epsilon = 1e-4);
    }
}

#[test]
fn dot_product_window_must_fit_twice() {
    let (backend, keys) = backend(&chain(3));
    let ctx = EvalContext::new(&backend, &keys.evaluation, &NoopObserver);
    let a = ctx.encrypt_values(&[1.0], 0).unwrap();
    let err = dot(&ctx, &a, &a, 17).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(dot(&ctx, &a, &a, 16).is_ok());
}

#[test]
fn linear_transform_over_wide_rows() {
    let (backend, keys) = backend(&chain(3));
    let log = EventLog::new();
    let ctx = EvalContext::new(&backend, &keys.evaluation, &log);
    let matrix = vec![
        vec![1.0, 0.5, -2.0, 0.0, 1.0],
        vec![0.0, 3.0, 1.0, -1.0, 2.0],
    ];
    let vector = [0.5, -1.0, 0.25, 2.0, 1.5];
    let rows = encrypt_packed(&ctx, &RowPacking, &matrix).unwrap();
    let v = ctx.encrypt_values(&vector, 0).unwrap();

    let out = linear_transform(&ctx, &rows, &v, vector.len(), 0.5).unwrap();
    assert_eq!(out.level(), 2);

    let expected: Vec<f64> = matrix
        .iter()
        .map(|row| 0.5 * row.iter().zip(&vector).map(|(m, x)| m * x).sum::<f64>())
        .collect();
    let got = reveal(&backend, &keys, &out, 8);
    for (g, e) in got.iter().zip(&expected) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-4);
    }
    // Slots past the row count are masked out.
    for g in &got[matrix.len()..] {
        assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-4);
    }
    assert_eq!(log.levels_for("linear_transform"), vec![2]);
    assert_eq!(log.levels_for("dot"), vec![1, 1]);
}

#[test]
fn linear_transform_needs_two_levels() {
    let (backend, keys) = backend(&chain(2));
    let ctx = EvalContext::new(&backend, &keys.evaluation, &NoopObserver);
    let rows = encrypt_packed(&ctx, &RowPacking, &[vec![1.0, 2.0]]).unwrap();
    let v = ctx.encrypt_values(&[1.0, 1.0], 1).unwrap();
    let err = linear_transform(&ctx, &rows, &v, 2, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DepthExhaustion);
}

#[test]
fn diagonal_matvec_matches_plain_product() {
    let (backend, keys) = backend(&chain(3));
    let ctx = EvalContext::new(&backend, &keys.evaluation, &NoopObserver);
    let matrix = vec![
        vec![2.0, -1.0, 0.0, 1.0],
        vec![0.5, 1.0, 3.0, 0.0],
        vec![-1.0, 0.0, 1.0, 2.0],
        vec![1.0, 1.0, 1.0, 1.0],
    ];
    let vector = [1.0, -2.0, 0.5, 3.0];
    let diagonals = encode_packed(&ctx, &DiagonalPacking, &matrix, 0).unwrap();
    let v = ctx.encrypt_values(&vector, 0).unwrap();

    let out = diagonal_matvec(&ctx, &diagonals, &v, 4).unwrap();
    assert_eq!(out.level(), 1);
    let got = reveal(&backend, &keys, &out, 4);
    for (row, g) in matrix.iter().zip(&got) {
        let e: f64 = row.iter().zip(&vector).map(|(m, x)| m * x).sum();
        assert_abs_diff_eq!(*g, e, epsilon = 1e-4);
    }
}

#[test]
fn diagonal_count_must_match_dimension() {
    let (backend, keys) = backend(&chain(3));
    let ctx = EvalContext::new(&backend, &keys.evaluation, &NoopObserver);
    let diagonals = encode_packed(&ctx, &DiagonalPacking, &[vec![1.0, 0.0], vec![0.0, 1.0]], 0)
        .unwrap();
    let v = ctx.encrypt_values(&[1.0, 1.0, 1.0], 0).unwrap();
    assert!(diagonal_matvec(&ctx, &diagonals, &v, 3).is_err());
}
