#![allow(dead_code)]

use ckks_logreg::{CkksBackend, CkksParams, KeySet, SimulatedCkks};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

pub type Ct = <SimulatedCkks as CkksBackend>::Ciphertext;

/// Backend with 32 slots and the given modulus chain, keys from a fixed seed.
pub fn backend(chain: &[u32]) -> (SimulatedCkks, KeySet<SimulatedCkks>) {
    let params = CkksParams::builder()
        .ring_degree(64)
        .modulus_chain(chain.to_vec())
        .build()
        .unwrap();
    let backend = SimulatedCkks::with_seed(params, 7).unwrap();
    let keys = backend
        .generate_keys(&mut ChaCha20Rng::seed_from_u64(42))
        .unwrap();
    (backend, keys)
}

/// `[60]` followed by `rescales` 40-bit primes.
pub fn chain(rescales: usize) -> Vec<u32> {
    let mut bits = vec![60];
    bits.extend(std::iter::repeat_n(40, rescales));
    bits
}

pub fn reveal(
    backend: &SimulatedCkks,
    keys: &KeySet<SimulatedCkks>,
    ct: &Ct,
    width: usize,
) -> Vec<f64> {
    let pt = backend.decrypt(ct, &keys.secret).unwrap();
    let mut values = backend.decode(&pt).unwrap();
    values.truncate(width);
    values
}
