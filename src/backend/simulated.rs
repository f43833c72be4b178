//! Reference backend that tracks the decryption-domain polynomial directly.
//!
//! A ciphertext here is the polynomial `m + e` that decryption would recover,
//! kept as real coefficients, together with its level, scale, component count
//! and the identity of the key set it belongs to. Every operation follows the
//! arithmetic a real RNS-CKKS implementation performs on that polynomial:
//! negacyclic products, Galois automorphisms for rotations, division by the
//! actual chain prime on rescale, Gaussian noise on encryption and key
//! switching. It provides no confidentiality.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, instrument, trace};

use super::{CkksBackend, EvaluationKeys, KeySet, Leveled};
use crate::encoding::CanonicalEmbedding;
use crate::errors::{CkksError, CkksResult};
use crate::math::sampling::gaussian_noise;
use crate::params::CkksParams;

// Relative tolerance when comparing scales; scales that went through the
// same operations are bit-identical, anything else is a real mismatch.
const SCALE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(u64);

#[derive(Debug)]
pub struct SimSecretKey {
    id: KeyId,
}

#[derive(Debug)]
pub struct SimPublicKey {
    id: KeyId,
}

#[derive(Debug)]
pub struct SimRelinKey {
    id: KeyId,
}

#[derive(Debug)]
pub struct SimGaloisKeys {
    id: KeyId,
    steps: BTreeSet<i64>,
}

impl SimSecretKey {
    pub fn id(&self) -> KeyId {
        self.id
    }
}

impl SimGaloisKeys {
    pub fn steps(&self) -> impl Iterator<Item = i64> + '_ {
        self.steps.iter().copied()
    }
}

#[derive(Debug, Clone)]
pub struct SimCiphertext {
    coeffs: Vec<f64>,
    size: usize,
    level: usize,
    scale: f64,
    key: KeyId,
}

impl SimCiphertext {
    /// Number of polynomial components: 2 normally, 3 after a product.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn key_id(&self) -> KeyId {
        self.key
    }
}

impl Leveled for SimCiphertext {
    fn level(&self) -> usize {
        self.level
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

#[derive(Debug, Clone)]
pub struct SimPlaintext {
    coeffs: Vec<f64>,
    level: usize,
    scale: f64,
}

impl Leveled for SimPlaintext {
    fn level(&self) -> usize {
        self.level
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

#[derive(Debug)]
pub struct SimulatedCkks {
    params: CkksParams,
    embedding: CanonicalEmbedding,
    noise: Mutex<ChaCha20Rng>,
}

impl SimulatedCkks {
    pub fn new(params: CkksParams) -> CkksResult<Self> {
        Self::from_rng(params, ChaCha20Rng::from_os_rng())
    }

    /// Deterministic noise stream, for tests and reproducible runs.
    pub fn with_seed(params: CkksParams, seed: u64) -> CkksResult<Self> {
        Self::from_rng(params, ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(params: CkksParams, rng: ChaCha20Rng) -> CkksResult<Self> {
        let embedding = CanonicalEmbedding::new(params.ring_degree())?;
        Ok(Self {
            params,
            embedding,
            noise: Mutex::new(rng),
        })
    }

    fn noise(&self) -> CkksResult<Vec<f64>> {
        let mut rng = self.noise.lock().unwrap_or_else(PoisonError::into_inner);
        gaussian_noise(
            self.params.ring_degree(),
            self.params.error_std(),
            &mut *rng,
        )
    }

    fn add_noise(&self, coeffs: &mut [f64]) -> CkksResult<()> {
        for (c, e) in coeffs.iter_mut().zip(self.noise()?) {
            *c += e;
        }
        Ok(())
    }

    fn check_level(&self, level: usize) -> CkksResult<()> {
        if level > self.params.max_level() {
            return Err(CkksError::invalid(format!(
                "level {level} outside a chain of {} moduli",
                self.params.chain_length()
            )));
        }
        Ok(())
    }

    fn check_scale_fits(&self, level: usize, scale: f64) -> CkksResult<()> {
        let scale_bits = scale.log2();
        let modulus_bits = self.params.active_modulus_bits(level);
        if !scale.is_finite() || scale_bits >= modulus_bits {
            return Err(CkksError::ScaleOutOfBounds {
                level,
                scale_bits,
                modulus_bits: modulus_bits.floor() as u32,
            });
        }
        Ok(())
    }

    /// Expands `steps` into keyed steps: the step itself if a key exists,
    /// otherwise its binary decomposition in the same direction.
    fn rotation_path(&self, steps: i64, keys: &SimGaloisKeys) -> CkksResult<Vec<i64>> {
        if keys.steps.contains(&steps) {
            return Ok(vec![steps]);
        }
        let sign = steps.signum();
        let magnitude = steps.unsigned_abs();
        let mut path = Vec::new();
        for bit in 0..u64::BITS {
            let power = 1u64 << bit;
            if power > magnitude {
                break;
            }
            if magnitude & power != 0 {
                let step = sign * power as i64;
                if !keys.steps.contains(&step) {
                    return Err(CkksError::MissingRotationKey { step });
                }
                path.push(step);
            }
        }
        Ok(path)
    }
}

fn same_key(a: KeyId, b: KeyId) -> CkksResult<()> {
    if a != b {
        return Err(CkksError::KeyMismatch);
    }
    Ok(())
}

fn same_level(expected: usize, actual: usize) -> CkksResult<()> {
    if expected != actual {
        return Err(CkksError::LevelMismatch { expected, actual });
    }
    Ok(())
}

fn same_scale(expected: f64, actual: f64) -> CkksResult<()> {
    if (expected - actual).abs() > expected.abs().max(actual.abs()) * SCALE_TOLERANCE {
        return Err(CkksError::ScaleMismatch { expected, actual });
    }
    Ok(())
}

fn relinearized(ct: &SimCiphertext) -> CkksResult<()> {
    if ct.size != 2 {
        return Err(CkksError::NotRelinearized { size: ct.size });
    }
    Ok(())
}

impl CkksBackend for SimulatedCkks {
    type Ciphertext = SimCiphertext;
    type Plaintext = SimPlaintext;
    type SecretKey = SimSecretKey;
    type PublicKey = SimPublicKey;
    type RelinKey = SimRelinKey;
    type GaloisKeys = SimGaloisKeys;

    fn params(&self) -> &CkksParams {
        &self.params
    }

    #[instrument(skip_all, fields(slots = self.params.slot_count()))]
    fn generate_keys<R: Rng + ?Sized>(&self, rng: &mut R) -> CkksResult<KeySet<Self>> {
        let id = KeyId(rng.random());
        let secret = SimSecretKey { id };
        let mut steps = Vec::new();
        let mut power = 1i64;
        while (power as usize) < self.params.slot_count() {
            steps.push(power);
            steps.push(-power);
            power <<= 1;
        }
        let galois = self.generate_galois_keys(&secret, &steps)?;
        debug!(rotation_keys = galois.steps.len(), "generated key set");
        Ok(KeySet {
            secret,
            evaluation: EvaluationKeys {
                public: SimPublicKey { id },
                relin: SimRelinKey { id },
                galois,
            },
        })
    }

    fn generate_galois_keys(
        &self,
        secret: &SimSecretKey,
        steps: &[i64],
    ) -> CkksResult<SimGaloisKeys> {
        let slots = self.params.slot_count();
        let mut set = BTreeSet::new();
        for &step in steps {
            if step.unsigned_abs() as usize >= slots {
                return Err(CkksError::RotationOutOfRange { steps: step, slots });
            }
            set.insert(step);
        }
        Ok(SimGaloisKeys {
            id: secret.id,
            steps: set,
        })
    }

    fn encode(&self, values: &[f64], scale: f64, level: usize) -> CkksResult<SimPlaintext> {
        self.check_level(level)?;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(CkksError::invalid(format!("scale {scale} must be positive")));
        }
        let coeffs = self.embedding.encode(values, scale)?;
        Ok(SimPlaintext {
            coeffs,
            level,
            scale,
        })
    }

    fn decode(&self, plaintext: &SimPlaintext) -> CkksResult<Vec<f64>> {
        Ok(self.embedding.decode(&plaintext.coeffs, plaintext.scale))
    }

    fn encrypt(&self, plaintext: &SimPlaintext, key: &SimPublicKey) -> CkksResult<SimCiphertext> {
        let mut coeffs = plaintext.coeffs.clone();
        self.add_noise(&mut coeffs)?;
        Ok(SimCiphertext {
            coeffs,
            size: 2,
            level: plaintext.level,
            scale: plaintext.scale,
            key: key.id,
        })
    }

    fn decrypt(&self, ciphertext: &SimCiphertext, key: &SimSecretKey) -> CkksResult<SimPlaintext> {
        same_key(key.id, ciphertext.key)?;
        Ok(SimPlaintext {
            coeffs: ciphertext.coeffs.clone(),
            level: ciphertext.level,
            scale: ciphertext.scale,
        })
    }

    fn add(&self, a: &SimCiphertext, b: &SimCiphertext) -> CkksResult<SimCiphertext> {
        same_key(a.key, b.key)?;
        same_level(a.level, b.level)?;
        same_scale(a.scale, b.scale)?;
        let coeffs = a.coeffs.iter().zip(&b.coeffs).map(|(x, y)| x + y).collect();
        Ok(SimCiphertext {
            coeffs,
            size: a.size.max(b.size),
            ..*a
        })
    }

    fn sub(&self, a: &SimCiphertext, b: &SimCiphertext) -> CkksResult<SimCiphertext> {
        same_key(a.key, b.key)?;
        same_level(a.level, b.level)?;
        same_scale(a.scale, b.scale)?;
        let coeffs = a.coeffs.iter().zip(&b.coeffs).map(|(x, y)| x - y).collect();
        Ok(SimCiphertext {
            coeffs,
            size: a.size.max(b.size),
            ..*a
        })
    }

    fn negate(&self, a: &SimCiphertext) -> CkksResult<SimCiphertext> {
        Ok(SimCiphertext {
            coeffs: a.coeffs.iter().map(|x| -x).collect(),
            ..*a
        })
    }

    fn add_plain(&self, a: &SimCiphertext, b: &SimPlaintext) -> CkksResult<SimCiphertext> {
        same_level(a.level, b.level)?;
        same_scale(a.scale, b.scale)?;
        let coeffs = a.coeffs.iter().zip(&b.coeffs).map(|(x, y)| x + y).collect();
        Ok(SimCiphertext { coeffs, ..*a })
    }

    fn multiply(&self, a: &SimCiphertext, b: &SimCiphertext) -> CkksResult<SimCiphertext> {
        relinearized(a)?;
        relinearized(b)?;
        same_key(a.key, b.key)?;
        same_level(a.level, b.level)?;
        let scale = a.scale * b.scale;
        self.check_scale_fits(a.level, scale)?;
        Ok(SimCiphertext {
            coeffs: self.embedding.negacyclic_product(&a.coeffs, &b.coeffs),
            size: 3,
            scale,
            ..*a
        })
    }

    fn multiply_plain(&self, a: &SimCiphertext, b: &SimPlaintext) -> CkksResult<SimCiphertext> {
        same_level(a.level, b.level)?;
        let scale = a.scale * b.scale;
        self.check_scale_fits(a.level, scale)?;
        Ok(SimCiphertext {
            coeffs: self.embedding.negacyclic_product(&a.coeffs, &b.coeffs),
            scale,
            ..*a
        })
    }

    fn relinearize(&self, a: &SimCiphertext, key: &SimRelinKey) -> CkksResult<SimCiphertext> {
        same_key(key.id, a.key)?;
        if a.size == 2 {
            return Ok(a.clone());
        }
        let mut coeffs = a.coeffs.clone();
        self.add_noise(&mut coeffs)?;
        Ok(SimCiphertext {
            coeffs,
            size: 2,
            ..*a
        })
    }

    fn rescale_to_next(&self, a: &SimCiphertext) -> CkksResult<SimCiphertext> {
        let prime = self.params.rescale_modulus(a.level)?;
        let q = prime as f64;
        trace!(level = a.level, prime, "rescale");
        Ok(SimCiphertext {
            coeffs: a.coeffs.iter().map(|c| (c / q).round()).collect(),
            level: a.level + 1,
            scale: a.scale / q,
            ..*a
        })
    }

    fn mod_switch_to(&self, a: &SimCiphertext, level: usize) -> CkksResult<SimCiphertext> {
        if level < a.level {
            return Err(CkksError::InvalidModSwitch {
                current: a.level,
                target: level,
            });
        }
        self.params.ensure_depth(a.level, level - a.level)?;
        Ok(SimCiphertext {
            coeffs: a.coeffs.clone(),
            level,
            ..*a
        })
    }

    fn mod_switch_plain_to(&self, a: &SimPlaintext, level: usize) -> CkksResult<SimPlaintext> {
        if level < a.level {
            return Err(CkksError::InvalidModSwitch {
                current: a.level,
                target: level,
            });
        }
        self.params.ensure_depth(a.level, level - a.level)?;
        Ok(SimPlaintext {
            coeffs: a.coeffs.clone(),
            level,
            scale: a.scale,
        })
    }

    fn rotate(
        &self,
        a: &SimCiphertext,
        steps: i64,
        keys: &SimGaloisKeys,
    ) -> CkksResult<SimCiphertext> {
        relinearized(a)?;
        same_key(keys.id, a.key)?;
        let slots = self.params.slot_count();
        if steps.unsigned_abs() as usize >= slots {
            return Err(CkksError::RotationOutOfRange { steps, slots });
        }
        if steps == 0 {
            return Ok(a.clone());
        }
        let mut coeffs = a.coeffs.clone();
        for step in self.rotation_path(steps, keys)? {
            let k = self.embedding.galois_element(step);
            coeffs = self.embedding.apply_galois(&coeffs, k);
            self.add_noise(&mut coeffs)?;
        }
        Ok(SimCiphertext { coeffs, ..*a })
    }

    fn add_many(&self, operands: &[SimCiphertext]) -> CkksResult<SimCiphertext> {
        let (first, rest) = operands
            .split_first()
            .ok_or_else(|| CkksError::invalid("add_many needs at least one operand"))?;
        rest.iter()
            .try_fold(first.clone(), |acc, ct| self.add(&acc, ct))
    }
}
