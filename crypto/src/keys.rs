//! Deterministic Ed25519 key pairs.

use ed25519_dalek::SigningKey;
use forge_types::{KeyPair, PrivateKey, PublicKey};

/// Derive a key pair from a 32-byte seed.
///
/// Genesis tooling and tests use this to get stable delegate identities.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}
