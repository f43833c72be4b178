//! Packing plaintext matrices into slot vectors.
//!
//! Diagonal packing follows Halevi and Shoup: the `p`-th generalized diagonal
//! of an `n x n` matrix is `d[i] = M[i][(i + p) mod n]`, which turns a
//! matrix-vector product into `n` slot-wise products with rotated copies of
//! the vector. Row packing keeps one row per vector and is what the trainer
//! uses for features and their transpose.

use crate::backend::{CkksBackend, EvalContext};
use crate::errors::{CkksError, CkksResult};

/// Turns a matrix into slot vectors of length `slots`.
pub trait MatrixPacking {
    fn pack(&self, matrix: &[Vec<f64>], slots: usize) -> CkksResult<Vec<Vec<f64>>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiagonalPacking;

#[derive(Debug, Default, Clone, Copy)]
pub struct RowPacking;

impl MatrixPacking for DiagonalPacking {
    fn pack(&self, matrix: &[Vec<f64>], slots: usize) -> CkksResult<Vec<Vec<f64>>> {
        let n = square_dimension(matrix)?;
        if n > slots {
            return Err(CkksError::InputTooLong { got: n, max: slots });
        }
        all_diagonals(matrix)?
            .into_iter()
            .map(|d| pad(&d, slots))
            .collect()
    }
}

impl MatrixPacking for RowPacking {
    fn pack(&self, matrix: &[Vec<f64>], slots: usize) -> CkksResult<Vec<Vec<f64>>> {
        let width = rectangular_width(matrix)?;
        if width > slots {
            return Err(CkksError::InputTooLong {
                got: width,
                max: slots,
            });
        }
        matrix.iter().map(|row| pad(row, slots)).collect()
    }
}

/// Side length of a non-empty square matrix.
pub fn square_dimension(matrix: &[Vec<f64>]) -> CkksResult<usize> {
    let n = matrix.len();
    if n == 0 {
        return Err(CkksError::invalid("matrix is empty"));
    }
    if let Some((i, row)) = matrix.iter().enumerate().find(|(_, r)| r.len() != n) {
        return Err(CkksError::invalid(format!(
            "matrix is not square: row {i} has {} entries, expected {n}",
            row.len()
        )));
    }
    Ok(n)
}

fn rectangular_width(matrix: &[Vec<f64>]) -> CkksResult<usize> {
    let width = matrix
        .first()
        .map(Vec::len)
        .ok_or_else(|| CkksError::invalid("matrix is empty"))?;
    if let Some((i, row)) = matrix.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(CkksError::invalid(format!(
            "ragged matrix: row {i} has {} entries, expected {width}",
            row.len()
        )));
    }
    Ok(width)
}

/// `d[i] = M[i][(i + p) mod n]`.
pub fn diagonal(p: usize, matrix: &[Vec<f64>]) -> CkksResult<Vec<f64>> {
    let n = square_dimension(matrix)?;
    if p >= n {
        return Err(CkksError::invalid(format!(
            "diagonal index {p} out of range for a {n}x{n} matrix"
        )));
    }
    Ok((0..n).map(|i| matrix[i][(i + p) % n]).collect())
}

pub fn all_diagonals(matrix: &[Vec<f64>]) -> CkksResult<Vec<Vec<f64>>> {
    let n = square_dimension(matrix)?;
    (0..n).map(|p| diagonal(p, matrix)).collect()
}

/// Zero-pads `values` to `slots` entries.
pub fn pad(values: &[f64], slots: usize) -> CkksResult<Vec<f64>> {
    if values.len() > slots {
        return Err(CkksError::InputTooLong {
            got: values.len(),
            max: slots,
        });
    }
    let mut out = values.to_vec();
    out.resize(slots, 0.0);
    Ok(out)
}

/// Selection mask: `value` at `index`, zero elsewhere.
pub fn selection_mask(index: usize, value: f64, slots: usize) -> CkksResult<Vec<f64>> {
    if index >= slots {
        return Err(CkksError::InputTooLong {
            got: index + 1,
            max: slots,
        });
    }
    let mut mask = vec![0.0; slots];
    mask[index] = value;
    Ok(mask)
}

/// Packs and encrypts `matrix` at level 0, one ciphertext per packed vector.
pub fn encrypt_packed<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    packing: &dyn MatrixPacking,
    matrix: &[Vec<f64>],
) -> CkksResult<Vec<B::Ciphertext>> {
    packing
        .pack(matrix, ctx.slot_count())?
        .iter()
        .map(|v| ctx.encrypt_values(v, 0))
        .collect()
}

/// Packs and encodes `matrix` for multiplication with ciphertexts at `level`.
pub fn encode_packed<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    packing: &dyn MatrixPacking,
    matrix: &[Vec<f64>],
    level: usize,
) -> CkksResult<Vec<B::Plaintext>> {
    packing
        .pack(matrix, ctx.slot_count())?
        .iter()
        .map(|v| ctx.encode_at(v, level))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ]
    }

    #[test]
    fn diagonals_wrap_around() {
        let m = sample();
        assert_eq!(diagonal(0, &m).unwrap(), vec![1.0, 5.0, 9.0]);
        assert_eq!(diagonal(1, &m).unwrap(), vec![2.0, 6.0, 7.0]);
        assert_eq!(diagonal(2, &m).unwrap(), vec![3.0, 4.0, 8.0]);
        assert_eq!(all_diagonals(&m).unwrap().len(), 3);
    }

    #[test]
    fn diagonal_index_out_of_range() {
        assert!(diagonal(3, &sample()).is_err());
    }

    #[test]
    fn non_square_is_rejected() {
        let m = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(all_diagonals(&m).is_err());
        assert!(DiagonalPacking.pack(&[], 8).is_err());
        let wide = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        assert!(DiagonalPacking.pack(&wide, 8).is_err());
    }

    #[test]
    fn packing_pads_to_slots() {
        let packed = DiagonalPacking.pack(&sample(), 8).unwrap();
        assert_eq!(packed.len(), 3);
        assert_eq!(packed[1], vec![2.0, 6.0, 7.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let rows = RowPacking
            .pack(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], 4)
            .unwrap();
        assert_eq!(rows[2], vec![5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn too_wide_for_slots() {
        assert_eq!(
            DiagonalPacking.pack(&sample(), 2).unwrap_err(),
            CkksError::InputTooLong { got: 3, max: 2 }
        );
        assert!(RowPacking.pack(&[vec![1.0; 5]], 4).is_err());
        assert!(RowPacking.pack(&[vec![1.0; 2], vec![1.0; 3]], 4).is_err());
    }

    #[test]
    fn selection_mask_isolates_one_slot() {
        assert_eq!(
            selection_mask(2, 0.125, 4).unwrap(),
            vec![0.0, 0.0, 0.125, 0.0]
        );
        assert!(selection_mask(4, 1.0, 4).is_err());
    }
}
