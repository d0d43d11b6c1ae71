//! Delegate roster queries.
//!
//! Reads go through the username and resignation indices only, so the
//! roster is exactly what the wallet state says it is.

use crate::ConsensusError;
use forge_state::{IndexName, Wallet, WalletManager};
use forge_types::{Address, Amount, PublicKey};
use serde::Serialize;

/// One registered delegate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DelegateEntry {
    pub username: String,
    pub address: Address,
    pub public_key: Option<PublicKey>,
    pub vote_balance: Amount,
    pub resigned: bool,
    pub produced_blocks: u64,
}

impl DelegateEntry {
    fn from_wallet(wallet: &Wallet) -> Option<Self> {
        let delegate = wallet.delegate()?;
        Some(Self {
            username: delegate.username.clone(),
            address: wallet.address().clone(),
            public_key: wallet.public_key().copied(),
            vote_balance: delegate.vote_balance,
            resigned: delegate.resigned,
            produced_blocks: delegate.produced_blocks,
        })
    }
}

/// Read-only view of the delegates known to a [`WalletManager`].
pub struct DelegateRoster<'a> {
    wallets: &'a WalletManager,
}

impl<'a> DelegateRoster<'a> {
    pub fn new(wallets: &'a WalletManager) -> Self {
        Self { wallets }
    }

    /// Every registered delegate, in username order.
    pub fn registered(&self) -> Vec<DelegateEntry> {
        self.from_index(IndexName::Usernames)
    }

    /// Delegates that have resigned, in username order.
    pub fn resigned(&self) -> Vec<DelegateEntry> {
        self.from_index(IndexName::Resignations)
    }

    /// Registered delegates that have not resigned.
    pub fn eligible(&self) -> Vec<DelegateEntry> {
        let resignations = self.wallets.index_of(IndexName::Resignations);
        self.registered()
            .into_iter()
            .filter(|entry| !resignations.has(&entry.username))
            .collect()
    }

    pub fn get(&self, username: &str) -> Result<DelegateEntry, ConsensusError> {
        self.wallets
            .find_by_username(username)
            .and_then(DelegateEntry::from_wallet)
            .ok_or_else(|| ConsensusError::DelegateNotFound(username.to_string()))
    }

    /// Sum of the vote balances of eligible delegates.
    pub fn total_vote_balance(&self) -> Result<Amount, ConsensusError> {
        self.eligible()
            .iter()
            .try_fold(Amount::ZERO, |total, entry| total.checked_add(entry.vote_balance))
            .ok_or_else(|| ConsensusError::Overflow("total vote balance".to_string()))
    }

    pub fn len(&self) -> usize {
        self.wallets.index_of(IndexName::Usernames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_index(&self, name: IndexName) -> Vec<DelegateEntry> {
        self.wallets
            .index_of(name)
            .entries()
            .filter_map(|(_, address)| self.wallets.wallet(address))
            .filter_map(DelegateEntry::from_wallet)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VoteBalanceTracker;
    use forge_crypto::keypair_from_seed;
    use forge_nullables::ChainBuilder;
    use forge_state::HandlerRegistry;
    use forge_transactions::TransactionBuilder;
    use std::sync::Arc;

    fn key(seed: u8) -> PublicKey {
        keypair_from_seed(&[seed; 32]).public
    }

    /// Three delegates registered at genesis; "bob" resigns at height 2.
    fn roster_state() -> WalletManager {
        let mut wallets = WalletManager::new(
            Arc::new(HandlerRegistry::with_core_handlers()),
            Arc::new(VoteBalanceTracker::new()),
        );
        let mut chain = ChainBuilder::new(key(1));
        let genesis = chain
            .next_block(vec![
                TransactionBuilder::delegate_registration(key(1), "carol")
                    .build()
                    .unwrap(),
                TransactionBuilder::delegate_registration(key(2), "bob")
                    .build()
                    .unwrap(),
                TransactionBuilder::delegate_registration(key(3), "alice")
                    .build()
                    .unwrap(),
            ])
            .unwrap();
        wallets.apply_block(&genesis).unwrap();

        let resign = chain
            .next_block(vec![TransactionBuilder::delegate_resignation(key(2))
                .nonce(2)
                .build()
                .unwrap()])
            .unwrap();
        wallets.apply_block(&resign).unwrap();
        wallets
    }

    fn names(entries: &[DelegateEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.username.as_str()).collect()
    }

    #[test]
    fn registered_resigned_eligible() {
        let wallets = roster_state();
        let roster = DelegateRoster::new(&wallets);
        assert_eq!(names(&roster.registered()), vec!["alice", "bob", "carol"]);
        assert_eq!(names(&roster.resigned()), vec!["bob"]);
        assert_eq!(names(&roster.eligible()), vec!["alice", "carol"]);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn lookup_by_username() {
        let wallets = roster_state();
        let roster = DelegateRoster::new(&wallets);
        let carol = roster.get("carol").unwrap();
        assert_eq!(carol.public_key, Some(key(1)));
        assert_eq!(carol.produced_blocks, 2);
        assert!(matches!(
            roster.get("nobody"),
            Err(ConsensusError::DelegateNotFound(_))
        ));
        assert_eq!(roster.total_vote_balance().unwrap(), Amount::ZERO);
    }

    #[test]
    fn entries_serialize() {
        let wallets = roster_state();
        let entry = DelegateRoster::new(&wallets).get("alice").unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["resigned"], false);
    }
}
