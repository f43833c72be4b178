use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::errors::{CkksError, CkksResult};

/// Samples `len` rounded Gaussian integers (as `f64`) with the given std.
pub fn gaussian_noise<R: Rng + ?Sized>(
    len: usize,
    std_dev: f64,
    rng: &mut R,
) -> CkksResult<Vec<f64>> {
    let invalid = || {
        CkksError::invalid(format!(
            "gaussian_noise: std_dev {std_dev} must be finite and positive"
        ))
    };
    if !(std_dev.is_finite() && std_dev > 0.0) {
        return Err(invalid());
    }
    let normal = Normal::new(0.0, std_dev).map_err(|_| invalid())?;
    Ok((0..len).map(|_| normal.sample(rng).round()).collect())
}

/// Samples `len` values uniformly from `[-bound, bound]`.
pub fn uniform_symmetric<R: Rng + ?Sized>(
    len: usize,
    bound: f64,
    rng: &mut R,
) -> CkksResult<Vec<f64>> {
    if bound == 0.0 {
        return Ok(vec![0.0; len]);
    }
    let distribution = Uniform::new_inclusive(-bound, bound).map_err(|_| {
        CkksError::invalid(format!(
            "uniform_symmetric: invalid bound {bound}, must be finite and non-negative"
        ))
    })?;
    Ok((0..len).map(|_| distribution.sample(rng)).collect())
}
