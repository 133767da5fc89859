//! Content fingerprints (blake3) for assets, transform outputs and cache keys.

mod hash;

pub use hash::{ContentHash, Fingerprinter};
