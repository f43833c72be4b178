//! The homomorphic backend seam.
//!
//! Everything above this module (packing, linear algebra, polynomial
//! evaluation, training) only talks to a [`CkksBackend`]. The backend owns
//! the ciphertext representation and the level/scale bookkeeping; callers
//! see ciphertexts and plaintexts through the [`Leveled`] view.

pub mod simulated;

use std::fmt;

use rand::Rng;
use tracing::debug;

use crate::errors::CkksResult;
use crate::observer::{LevelChange, TrainingObserver};
use crate::params::CkksParams;

pub use simulated::SimulatedCkks;

/// Rounds `scale` to the nearest power of two.
///
/// Rescaling divides by primes that are only close to `2^bits`, so scales
/// drift slightly after every multiplication. Renormalizing keeps operands
/// of additions aligned.
pub fn nearest_power_of_two(scale: f64) -> f64 {
    2f64.powi(scale.log2().round() as i32)
}

/// Level and scale metadata shared by ciphertexts and plaintexts.
pub trait Leveled {
    /// Index into the modulus chain from the top; 0 is fresh.
    fn level(&self) -> usize;
    fn scale(&self) -> f64;
    fn set_scale(&mut self, scale: f64);

    fn normalize_scale(&mut self) {
        let scale = nearest_power_of_two(self.scale());
        self.set_scale(scale);
    }
}

pub struct EvaluationKeys<B: CkksBackend> {
    pub public: B::PublicKey,
    pub relin: B::RelinKey,
    pub galois: B::GaloisKeys,
}

/// Full key material. Only the data owner keeps `secret`; the compute party
/// receives [`EvaluationKeys`].
pub struct KeySet<B: CkksBackend> {
    pub secret: B::SecretKey,
    pub evaluation: EvaluationKeys<B>,
}

/// Leveled CKKS operations.
///
/// Unless stated otherwise binary operations require both operands at the
/// same level and produce a result at that level.
pub trait CkksBackend: Send + Sync {
    type Ciphertext: Leveled + Clone + fmt::Debug + Send + Sync;
    type Plaintext: Leveled + Clone + fmt::Debug + Send + Sync;
    type SecretKey: Send + Sync;
    type PublicKey: Send + Sync;
    type RelinKey: Send + Sync;
    type GaloisKeys: Send + Sync;

    fn params(&self) -> &CkksParams;

    fn slot_count(&self) -> usize {
        self.params().slot_count()
    }

    /// Secret, public, relinearization and default rotation keys
    /// (power-of-two steps in both directions).
    fn generate_keys<R: Rng + ?Sized>(&self, rng: &mut R) -> CkksResult<KeySet<Self>>
    where
        Self: Sized;

    /// Rotation keys for exactly `steps`, bound to `secret`.
    fn generate_galois_keys(
        &self,
        secret: &Self::SecretKey,
        steps: &[i64],
    ) -> CkksResult<Self::GaloisKeys>;

    /// Encodes up to `slot_count` values at `scale` for a ciphertext at `level`.
    fn encode(&self, values: &[f64], scale: f64, level: usize) -> CkksResult<Self::Plaintext>;

    /// Returns all `slot_count` slots.
    fn decode(&self, plaintext: &Self::Plaintext) -> CkksResult<Vec<f64>>;

    /// Fresh ciphertext at the plaintext's level and scale.
    fn encrypt(
        &self,
        plaintext: &Self::Plaintext,
        key: &Self::PublicKey,
    ) -> CkksResult<Self::Ciphertext>;

    fn decrypt(
        &self,
        ciphertext: &Self::Ciphertext,
        key: &Self::SecretKey,
    ) -> CkksResult<Self::Plaintext>;

    /// Requires matching scales.
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> CkksResult<Self::Ciphertext>;

    /// Requires matching scales.
    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> CkksResult<Self::Ciphertext>;

    fn negate(&self, a: &Self::Ciphertext) -> CkksResult<Self::Ciphertext>;

    /// Requires matching scales.
    fn add_plain(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Plaintext,
    ) -> CkksResult<Self::Ciphertext>;

    /// Scales multiply; the result has three components and must be
    /// relinearized before it is multiplied or rotated again.
    fn multiply(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> CkksResult<Self::Ciphertext>;

    /// Scales multiply.
    fn multiply_plain(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Plaintext,
    ) -> CkksResult<Self::Ciphertext>;

    /// Back to two components; level and scale unchanged.
    fn relinearize(
        &self,
        a: &Self::Ciphertext,
        key: &Self::RelinKey,
    ) -> CkksResult<Self::Ciphertext>;

    /// Divides by the last active prime: level + 1, scale / prime.
    /// Fails with a depth error at the last level.
    fn rescale_to_next(&self, a: &Self::Ciphertext) -> CkksResult<Self::Ciphertext>;

    /// Drops primes without dividing: level becomes `level`, scale unchanged.
    fn mod_switch_to(&self, a: &Self::Ciphertext, level: usize) -> CkksResult<Self::Ciphertext>;

    fn mod_switch_plain_to(
        &self,
        a: &Self::Plaintext,
        level: usize,
    ) -> CkksResult<Self::Plaintext>;

    /// Left rotation: slot `j` of the result holds slot `j + steps` of `a`.
    /// Negative steps rotate right. `|steps|` must be below `slot_count`.
    fn rotate(
        &self,
        a: &Self::Ciphertext,
        steps: i64,
        keys: &Self::GaloisKeys,
    ) -> CkksResult<Self::Ciphertext>;

    /// Sum of one or more ciphertexts with identical level and scale.
    fn add_many(&self, operands: &[Self::Ciphertext]) -> CkksResult<Self::Ciphertext>;
}

/// What an evaluator needs on the compute side: the backend, the public
/// evaluation keys and somewhere to report level changes.
pub struct EvalContext<'a, B: CkksBackend> {
    pub backend: &'a B,
    pub keys: &'a EvaluationKeys<B>,
    pub observer: &'a dyn TrainingObserver,
}

impl<B: CkksBackend> Clone for EvalContext<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: CkksBackend> Copy for EvalContext<'_, B> {}

impl<'a, B: CkksBackend> EvalContext<'a, B> {
    pub fn new(
        backend: &'a B,
        keys: &'a EvaluationKeys<B>,
        observer: &'a dyn TrainingObserver,
    ) -> Self {
        Self {
            backend,
            keys,
            observer,
        }
    }

    pub fn params(&self) -> &CkksParams {
        self.backend.params()
    }

    pub fn slot_count(&self) -> usize {
        self.backend.slot_count()
    }

    pub fn base_scale(&self) -> f64 {
        self.params().base_scale()
    }

    /// Reports the level and scale of `ct` after `operation`.
    pub fn record(&self, operation: &'static str, ct: &B::Ciphertext) {
        self.observer.on_level_change(&LevelChange {
            operation,
            level: ct.level(),
            remaining: self.params().remaining_levels(ct.level()),
            scale: ct.scale(),
        });
    }

    /// Encrypts `values` at the base scale and `level`.
    pub fn encrypt_values(&self, values: &[f64], level: usize) -> CkksResult<B::Ciphertext> {
        let pt = self.backend.encode(values, self.base_scale(), level)?;
        let ct = self.backend.encrypt(&pt, &self.keys.public)?;
        Ok(ct)
    }

    /// Encodes `values` to multiply a ciphertext at `level`.
    pub fn encode_at(&self, values: &[f64], level: usize) -> CkksResult<B::Plaintext> {
        self.backend.encode(values, self.base_scale(), level)
    }

    /// Mod-switches whichever operand is shallower so both share a level.
    pub fn align(
        &self,
        a: &B::Ciphertext,
        b: &B::Ciphertext,
    ) -> CkksResult<(B::Ciphertext, B::Ciphertext)> {
        let target = a.level().max(b.level());
        Ok((self.switch_to(a, target)?, self.switch_to(b, target)?))
    }

    /// Mod-switch that is a no-op when `ct` is already at `level`.
    pub fn switch_to(&self, ct: &B::Ciphertext, level: usize) -> CkksResult<B::Ciphertext> {
        if ct.level() == level {
            return Ok(ct.clone());
        }
        self.backend.mod_switch_to(ct, level)
    }

    /// Rescales and snaps the scale back to a power of two.
    pub fn rescale_normalized(&self, ct: &B::Ciphertext) -> CkksResult<B::Ciphertext> {
        let mut out = self.backend.rescale_to_next(ct)?;
        out.normalize_scale();
        Ok(out)
    }

    /// Multiply, relinearize, rescale and renormalize: one level.
    pub fn multiply_rescaled(
        &self,
        a: &B::Ciphertext,
        b: &B::Ciphertext,
    ) -> CkksResult<B::Ciphertext> {
        let (a, b) = self.align(a, b)?;
        let product = self.backend.multiply(&a, &b)?;
        let product = self.backend.relinearize(&product, &self.keys.relin)?;
        let out = self.rescale_normalized(&product)?;
        debug!(level = out.level(), "multiply_rescaled");
        Ok(out)
    }

    pub fn rotate(&self, ct: &B::Ciphertext, steps: i64) -> CkksResult<B::Ciphertext> {
        self.backend.rotate(ct, steps, &self.keys.galois)
    }
}
