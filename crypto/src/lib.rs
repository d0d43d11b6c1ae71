//! Cryptographic primitives for forge.
//!
//! - **Ed25519** key pairs (deterministic, from 32-byte seeds)
//! - **Blake2b** for hashing (block ids, transaction ids, snapshot digests)
//! - **SHA-256** for HTLC secret hashes
//! - Address derivation with `frg_` prefix and base32 encoding
//!
//! Signature verification happens upstream of the state engine and is not
//! provided here.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::derive_address;
pub use hash::{blake2b_256, blake2b_256_multi, hash_transaction, sha256};
pub use keys::keypair_from_seed;
