pub mod primes;
pub mod sampling;

pub use primes::{is_ntt_friendly_prime, is_prime, modulus_chain};
pub use sampling::{gaussian_noise, uniform_symmetric};
