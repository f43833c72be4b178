//! Homomorphic dot products and matrix-vector products built from
//! multiplications, rotations and selection masks.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::instrument;

use crate::backend::{CkksBackend, EvalContext, Leveled};
use crate::errors::{CkksError, CkksResult};
use crate::packing::selection_mask;

fn check_window(size: usize, slots: usize) -> CkksResult<()> {
    if size == 0 {
        return Err(CkksError::invalid("dot product size must be at least 1"));
    }
    if 2 * size > slots {
        return Err(CkksError::invalid(format!(
            "window of {size} needs {} slots, only {slots} available",
            2 * size
        )));
    }
    Ok(())
}

/// Inner product of the first `size` slots of `a` and `b`.
///
/// Both operands must be zero beyond `size`. The product is duplicated into
/// `[size, 2 * size)` with one right rotation, then `size - 1` rotate-by-one
/// additions sum a full window into every slot of `[0, size)`. Consumes one
/// level; the result scale is renormalized to a power of two.
pub fn dot<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    a: &B::Ciphertext,
    b: &B::Ciphertext,
    size: usize,
) -> CkksResult<B::Ciphertext> {
    check_window(size, ctx.slot_count())?;
    ctx.params().ensure_depth(a.level().max(b.level()), 1)?;

    let product = ctx.multiply_rescaled(a, b)?;
    let shifted = ctx.rotate(&product, -(size as i64))?;
    let doubled = ctx.backend.add(&product, &shifted)?;

    let mut window = doubled.clone();
    let mut acc = doubled;
    for _ in 1..size {
        window = ctx.rotate(&window, 1)?;
        acc = ctx.backend.add(&acc, &window)?;
    }
    ctx.record("dot", &acc);
    Ok(acc)
}

/// `y[i] = mask_weight * <rows[i], vector>` in slot `i`, zero elsewhere.
///
/// `width` is the populated length of `vector` and of every row. Each dot
/// product runs over `max(width, rows.len())` slots so that slot `i` of every
/// row result is valid. Consumes two levels: one for the dot products and one
/// for the selection masks. `mask_weight` folds a constant factor into the
/// masks without extra depth.
#[instrument(skip_all, fields(rows = rows.len(), width = width))]
pub fn linear_transform<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    rows: &[B::Ciphertext],
    vector: &B::Ciphertext,
    width: usize,
    mask_weight: f64,
) -> CkksResult<B::Ciphertext> {
    if rows.is_empty() {
        return Err(CkksError::invalid("linear transform needs at least one row"));
    }
    let span = width.max(rows.len());
    check_window(span, ctx.slot_count())?;
    let start = rows
        .iter()
        .map(Leveled::level)
        .max()
        .unwrap_or(0)
        .max(vector.level());
    ctx.params().ensure_depth(start, 2)?;

    #[cfg(feature = "parallel")]
    let products: Vec<B::Ciphertext> = rows
        .par_iter()
        .map(|row| dot(ctx, row, vector, span))
        .collect::<CkksResult<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let products: Vec<B::Ciphertext> = rows
        .iter()
        .map(|row| dot(ctx, row, vector, span))
        .collect::<CkksResult<_>>()?;

    let level = products.iter().map(Leveled::level).max().unwrap_or(start);
    let slots = ctx.slot_count();
    let masked = products
        .iter()
        .enumerate()
        .map(|(i, product)| {
            let product = ctx.switch_to(product, level)?;
            let mask = ctx.encode_at(&selection_mask(i, mask_weight, slots)?, level)?;
            ctx.backend.multiply_plain(&product, &mask)
        })
        .collect::<CkksResult<Vec<_>>>()?;

    let sum = ctx.backend.add_many(&masked)?;
    let sum = ctx.backend.relinearize(&sum, &ctx.keys.relin)?;
    let out = ctx.rescale_normalized(&sum)?;
    ctx.record("linear_transform", &out);
    Ok(out)
}

/// Halevi-Shoup product `M v` from the `n` packed diagonals of `M`.
///
/// `ct` holds `v` in its first `n` slots and zeros elsewhere. One right
/// rotation makes the vector periodic over `2n` slots, after which
/// `sum_l diag_l * rot(v, l)` yields `(M v)_i` in slot `i < n`. Consumes one
/// level.
#[instrument(skip_all, fields(n = n))]
pub fn diagonal_matvec<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    diagonals: &[B::Plaintext],
    ct: &B::Ciphertext,
    n: usize,
) -> CkksResult<B::Ciphertext> {
    if diagonals.len() != n {
        return Err(CkksError::invalid(format!(
            "expected {n} diagonals, got {}",
            diagonals.len()
        )));
    }
    check_window(n, ctx.slot_count())?;
    ctx.params().ensure_depth(ct.level(), 1)?;

    let shifted = ctx.rotate(ct, -(n as i64))?;
    let periodic = ctx.backend.add(ct, &shifted)?;
    let level = periodic.level();

    let term = |l: usize| -> CkksResult<B::Ciphertext> {
        let rotated = ctx.rotate(&periodic, l as i64)?;
        let diagonal = &diagonals[l];
        let diagonal = if diagonal.level() == level {
            diagonal.clone()
        } else {
            ctx.backend.mod_switch_plain_to(diagonal, level)?
        };
        ctx.backend.multiply_plain(&rotated, &diagonal)
    };

    #[cfg(feature = "parallel")]
    let terms: Vec<B::Ciphertext> = (0..n)
        .into_par_iter()
        .map(term)
        .collect::<CkksResult<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let terms: Vec<B::Ciphertext> = (0..n).map(term).collect::<CkksResult<_>>()?;

    let sum = ctx.backend.add_many(&terms)?;
    let out = ctx.rescale_normalized(&sum)?;
    ctx.record("diagonal_matvec", &out);
    Ok(out)
}
