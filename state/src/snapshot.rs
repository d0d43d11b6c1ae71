//! Wallet-state snapshots.
//!
//! A snapshot captures every wallet at a block height so a node can restore
//! state without replaying from genesis. The hash is Blake2b over the
//! bincode encoding of each wallet in address order, so two nodes with the
//! same state produce the same hash.

use crate::{StateError, Wallet, WalletManager};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub hash: [u8; 32],
    /// Height of the last block applied to the captured state.
    pub height: u64,
    pub wallets: Vec<Wallet>,
    pub version: u32,
}

impl StateSnapshot {
    /// Capture every wallet of `manager`.
    pub fn capture(manager: &WalletManager, height: u64) -> Result<Self, StateError> {
        let wallets: Vec<Wallet> = manager.wallets().cloned().collect();
        let hash = compute_hash(&wallets, height)?;
        Ok(Self {
            hash,
            height,
            wallets,
            version: SNAPSHOT_VERSION,
        })
    }

    pub fn verify(&self) -> Result<bool, StateError> {
        Ok(self.hash == compute_hash(&self.wallets, self.height)?)
    }

    /// Replace the contents of `manager` with this snapshot.
    ///
    /// Standard indices are rebuilt from the wallets; plugin indices are
    /// repopulated through their indexers.
    pub fn restore(self, manager: &mut WalletManager) -> Result<(), StateError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StateError::Snapshot(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }
        if !self.verify()? {
            return Err(StateError::Snapshot(format!(
                "hash mismatch for snapshot at height {}",
                self.height
            )));
        }
        let count = self.wallets.len();
        manager.reset();
        manager.index(self.wallets);
        tracing::info!(height = self.height, wallets = count, "restored wallet snapshot");
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(|e| StateError::Snapshot(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(|e| StateError::Snapshot(e.to_string()))
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }
}

fn compute_hash(wallets: &[Wallet], height: u64) -> Result<[u8; 32], StateError> {
    let mut hasher = Blake2b::<U32>::new();
    for wallet in wallets {
        let bytes = bincode::serialize(wallet).map_err(|e| StateError::Snapshot(e.to_string()))?;
        hasher.update(&bytes);
    }
    hasher.update(height.to_le_bytes());

    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::DelegateInfo;
    use forge_types::Amount;

    fn populated() -> WalletManager {
        let mut wallets = manager();
        funded(&mut wallets, 1, 500);
        let delegate = funded(&mut wallets, 2, 10);
        wallets.find_by_address(&delegate).attributes_mut().delegate =
            Some(DelegateInfo::new("dana"));
        wallets.reindex(&delegate);
        wallets
    }

    #[test]
    fn capture_and_verify() {
        let snap = StateSnapshot::capture(&populated(), 7).unwrap();
        assert!(snap.verify().unwrap());
        assert_eq!(snap.wallet_count(), 2);
        assert_eq!(snap.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn tampered_snapshot_fails_verify() {
        let mut snap = StateSnapshot::capture(&populated(), 7).unwrap();
        snap.wallets[0].set_balance(Amount::new(1));
        assert!(!snap.verify().unwrap());

        let mut target = manager();
        assert!(matches!(
            snap.restore(&mut target),
            Err(StateError::Snapshot(_))
        ));
    }

    #[test]
    fn same_state_same_hash() {
        let a = StateSnapshot::capture(&populated(), 7).unwrap();
        let b = StateSnapshot::capture(&populated(), 7).unwrap();
        assert_eq!(a.hash, b.hash);
        let later = StateSnapshot::capture(&populated(), 8).unwrap();
        assert_ne!(a.hash, later.hash);
    }

    #[test]
    fn restore_rebuilds_indices() {
        let source = populated();
        let bytes = StateSnapshot::capture(&source, 7).unwrap().to_bytes().unwrap();

        let mut target = manager();
        funded(&mut target, 3, 1);
        StateSnapshot::from_bytes(&bytes)
            .unwrap()
            .restore(&mut target)
            .unwrap();

        assert_eq!(target.len(), 2);
        assert!(target.has_by_username("dana"));
        assert!(target.has_by_public_key(&key(1)));
        assert!(!target.has_by_public_key(&key(3)));
        assert_eq!(target.get_nonce(&key(1)), 0);
    }
}
