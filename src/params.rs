//! Scheme parameters shared by the backend and the evaluators.

use std::fmt;

use crate::errors::{CkksError, CkksResult};
use crate::math::primes;

/// Validated CKKS parameter set.
///
/// `modulus_bits[0]` is the base modulus that survives every rescale; the
/// remaining entries are consumed from the end, one per rescale. A ciphertext
/// at level `l` (0 = fresh) therefore still holds `modulus_bits[..len - l]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CkksParams {
    ring_degree: usize,
    modulus_bits: Vec<u32>,
    moduli: Vec<u64>,
    special_modulus_bits: u32,
    special_modulus: u64,
    scale_bits: u32,
    error_std: f64,
}

pub struct CkksParamsBuilder {
    ring_degree: Option<usize>,
    modulus_bits: Option<Vec<u32>>,
    special_modulus_bits: Option<u32>,
    scale_bits: Option<u32>,
    error_std: Option<f64>,
}

impl Default for CkksParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CkksParamsBuilder {
    pub fn new() -> Self {
        Self {
            ring_degree: None,
            modulus_bits: None,
            special_modulus_bits: None,
            scale_bits: None,
            error_std: None,
        }
    }

    pub fn ring_degree(mut self, degree: usize) -> Self {
        self.ring_degree = Some(degree);
        self
    }

    pub fn modulus_chain(mut self, bits: impl Into<Vec<u32>>) -> Self {
        self.modulus_bits = Some(bits.into());
        self
    }

    pub fn special_modulus_bits(mut self, bits: u32) -> Self {
        self.special_modulus_bits = Some(bits);
        self
    }

    pub fn scale_bits(mut self, bits: u32) -> Self {
        self.scale_bits = Some(bits);
        self
    }

    pub fn error_std(mut self, std: f64) -> Self {
        self.error_std = Some(std);
        self
    }

    pub fn build(self) -> CkksResult<CkksParams> {
        let ring_degree = self.ring_degree.unwrap_or(16384);
        let modulus_bits = self
            .modulus_bits
            .unwrap_or_else(|| [60, 40, 40, 40, 40, 40, 40, 40, 40].to_vec());
        let special_modulus_bits = self.special_modulus_bits.unwrap_or(60);
        let scale_bits = self.scale_bits.unwrap_or(40);
        let error_std = self.error_std.unwrap_or(3.2);

        if ring_degree < 4 || !ring_degree.is_power_of_two() {
            return Err(CkksError::invalid(format!(
                "ring degree {ring_degree} must be a power of two >= 4"
            )));
        }
        if modulus_bits.is_empty() {
            return Err(CkksError::invalid("modulus chain must not be empty"));
        }
        if !(error_std.is_finite() && error_std > 0.0) {
            return Err(CkksError::invalid(format!(
                "error std {error_std} must be finite and positive"
            )));
        }
        if scale_bits == 0 || scale_bits >= modulus_bits[0] {
            return Err(CkksError::invalid(format!(
                "scale 2^{scale_bits} must be positive and below the base modulus 2^{}",
                modulus_bits[0]
            )));
        }

        // The special prime is drawn together with the chain so it never
        // collides with one of the chain primes.
        let mut all_bits = modulus_bits.clone();
        all_bits.push(special_modulus_bits);
        let mut moduli = primes::modulus_chain(&all_bits, ring_degree)?;
        let special_modulus = moduli.pop().ok_or_else(|| {
            CkksError::invalid("special modulus could not be generated")
        })?;

        Ok(CkksParams {
            ring_degree,
            modulus_bits,
            moduli,
            special_modulus_bits,
            special_modulus,
            scale_bits,
            error_std,
        })
    }
}

impl CkksParams {
    pub fn builder() -> CkksParamsBuilder {
        CkksParamsBuilder::new()
    }

    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    /// Number of complex slots, `ring_degree / 2`.
    pub fn slot_count(&self) -> usize {
        self.ring_degree / 2
    }

    pub fn modulus_bits(&self) -> &[u32] {
        &self.modulus_bits
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    pub fn special_modulus(&self) -> u64 {
        self.special_modulus
    }

    pub fn special_modulus_bits(&self) -> u32 {
        self.special_modulus_bits
    }

    pub fn scale_bits(&self) -> u32 {
        self.scale_bits
    }

    /// The base scale `2^scale_bits`.
    pub fn base_scale(&self) -> f64 {
        2f64.powi(self.scale_bits as i32)
    }

    pub fn error_std(&self) -> f64 {
        self.error_std
    }

    pub fn chain_length(&self) -> usize {
        self.moduli.len()
    }

    /// Deepest reachable level; rescaling here is a depth exhaustion.
    pub fn max_level(&self) -> usize {
        self.chain_length() - 1
    }

    pub fn remaining_levels(&self, level: usize) -> usize {
        self.max_level().saturating_sub(level)
    }

    /// Prime divided out when a ciphertext at `level` is rescaled.
    pub fn rescale_modulus(&self, level: usize) -> CkksResult<u64> {
        if level >= self.max_level() {
            return Err(CkksError::DepthExhausted {
                level,
                required: 1,
                available: 0,
            });
        }
        Ok(self.moduli[self.max_level() - level])
    }

    /// `log2` of the product of the primes still present at `level`.
    pub fn active_modulus_bits(&self, level: usize) -> f64 {
        let active = self.chain_length().saturating_sub(level);
        self.moduli[..active]
            .iter()
            .map(|&q| (q as f64).log2())
            .sum()
    }

    /// Fails with a depth error unless `required` more rescales fit below `level`.
    pub fn ensure_depth(&self, level: usize, required: usize) -> CkksResult<()> {
        let available = self.remaining_levels(level);
        if required > available {
            return Err(CkksError::DepthExhausted {
                level,
                required,
                available,
            });
        }
        Ok(())
    }
}

impl fmt::Display for CkksParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_bits: u32 =
            self.modulus_bits.iter().sum::<u32>() + self.special_modulus_bits;
        writeln!(f, "CKKS parameters")?;
        writeln!(f, "  ring degree      : {}", self.ring_degree)?;
        writeln!(f, "  slots            : {}", self.slot_count())?;
        writeln!(f, "  modulus chain    : {:?} bits", self.modulus_bits)?;
        writeln!(f, "  special modulus  : {} bits", self.special_modulus_bits)?;
        writeln!(f, "  total modulus    : {total_bits} bits")?;
        writeln!(f, "  scale            : 2^{}", self.scale_bits)?;
        writeln!(f, "  rescales         : {}", self.max_level())?;
        write!(f, "  error std        : {}", self.error_std)
    }
}
