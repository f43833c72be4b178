//! NTT-friendly primes for the modulus chain.
//!
//! Every modulus `q` in the chain satisfies `q = 1 (mod 2N)`, mirroring what a
//! real RNS backend needs for the negacyclic NTT. Rescaling divides by these
//! exact primes, so the scale drift they cause (each prime is only close to a
//! power of two) is real and must be renormalized by the evaluator.
//!
//! Primality uses deterministic Miller-Rabin on `u64`.
//! Reference:
//! https://en.wikipedia.org/wiki/Miller%E2%80%93Rabin_primality_test

use crate::errors::{CkksError, CkksResult};

// Deterministic for every n < 3.3 * 10^24, which covers all u64 values.
// Source: https://miller-rabin.appspot.com/
const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Smallest accepted modulus width.
pub const MIN_MODULUS_BITS: u32 = 20;
/// Largest accepted modulus width; keeps products inside `u128`.
pub const MAX_MODULUS_BITS: u32 = 61;

fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

/// Computes `base^exp mod modulus` via binary exponentiation.
pub(crate) fn mod_pow(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut acc = 1u64;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exp >>= 1;
    }
    acc
}

/// Returns `(d, r)` with `n = d * 2^r` and `d` odd.
fn decompose(n: u64) -> (u64, u32) {
    let r = n.trailing_zeros();
    (n >> r, r)
}

pub fn is_prime(n: u64) -> bool {
    match n {
        0 | 1 => return false,
        2 | 3 => return true,
        _ if n & 1 == 0 => return false,
        _ => {}
    }

    let (d, r) = decompose(n - 1);
    'bases: for &a in MILLER_RABIN_BASES.iter() {
        if a >= n {
            continue;
        }
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

/// `p` is prime and `p = 1 (mod 2 * degree)`.
pub fn is_ntt_friendly_prime(p: u64, degree: usize) -> bool {
    let two_n = 2 * degree as u64;
    is_prime(p) && p % two_n == 1
}

/// Largest NTT-friendly prime strictly below `bound`, if any.
pub fn largest_ntt_prime_below(bound: u64, degree: usize) -> Option<u64> {
    let step = 2 * degree as u64;
    if bound <= step {
        return None;
    }
    // Snap down to the largest candidate = 1 (mod step) that is < bound.
    let top = bound - 1;
    let mut candidate = top - (top + step - 1) % step;
    loop {
        if candidate <= step {
            return None;
        }
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate -= step;
    }
}

/// Picks one distinct NTT-friendly prime below `2^bits` for every entry of
/// `bit_widths`, in order. Equal widths receive successively smaller primes.
pub fn modulus_chain(bit_widths: &[u32], degree: usize) -> CkksResult<Vec<u64>> {
    if !degree.is_power_of_two() {
        return Err(CkksError::invalid(format!(
            "ring degree {degree} is not a power of two"
        )));
    }
    let mut chosen: Vec<u64> = Vec::with_capacity(bit_widths.len());
    for &bits in bit_widths {
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
            return Err(CkksError::invalid(format!(
                "modulus width {bits} outside [{MIN_MODULUS_BITS}, {MAX_MODULUS_BITS}]"
            )));
        }
        let mut bound = 1u64 << bits;
        let prime = loop {
            let candidate = largest_ntt_prime_below(bound, degree).ok_or_else(|| {
                CkksError::invalid(format!(
                    "no {bits}-bit prime = 1 mod {} left for the chain",
                    2 * degree
                ))
            })?;
            if !chosen.contains(&candidate) {
                break candidate;
            }
            bound = candidate;
        };
        chosen.push(prime);
    }
    Ok(chosen)
}
