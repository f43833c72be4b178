//! Slot encoding for the reference backend.

mod embedding;

pub use embedding::CanonicalEmbedding;
