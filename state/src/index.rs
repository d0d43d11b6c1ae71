//! Derived lookup indices over the wallet arena.
//!
//! An index maps string keys (addresses, public keys, usernames, lock ids,
//! content hashes) to the address of the wallet they belong to. The address
//! is the wallet's handle in the manager's arena, so all entries for one
//! account resolve to the same record.

use crate::Wallet;
use forge_types::Address;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Extracts the keys a wallet should be reachable under. Must be pure.
pub type Indexer = Arc<dyn Fn(&Wallet) -> Vec<String> + Send + Sync>;

/// The indices every manager carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexName {
    Addresses,
    PublicKeys,
    Usernames,
    Resignations,
    Locks,
    Ipfs,
}

impl IndexName {
    /// Lookup priority order.
    pub const ALL: [IndexName; 6] = [
        IndexName::Addresses,
        IndexName::PublicKeys,
        IndexName::Usernames,
        IndexName::Resignations,
        IndexName::Locks,
        IndexName::Ipfs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addresses => "addresses",
            Self::PublicKeys => "public_keys",
            Self::Usernames => "usernames",
            Self::Resignations => "resignations",
            Self::Locks => "locks",
            Self::Ipfs => "ipfs",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|index| index.as_str() == name)
    }

    /// The indexer behind each standard index.
    pub fn indexer(&self) -> Indexer {
        match self {
            Self::Addresses => Arc::new(|w: &Wallet| vec![w.address().to_string()]),
            Self::PublicKeys => Arc::new(|w: &Wallet| {
                w.public_key().map(|pk| pk.to_hex()).into_iter().collect()
            }),
            Self::Usernames => Arc::new(|w: &Wallet| {
                w.delegate().map(|d| d.username.clone()).into_iter().collect()
            }),
            Self::Resignations => Arc::new(|w: &Wallet| {
                w.delegate()
                    .filter(|d| d.resigned)
                    .map(|d| d.username.clone())
                    .into_iter()
                    .collect()
            }),
            Self::Locks => Arc::new(|w: &Wallet| {
                w.attributes()
                    .htlc
                    .locks
                    .keys()
                    .map(|id| id.to_string())
                    .collect()
            }),
            Self::Ipfs => Arc::new(|w: &Wallet| w.attributes().ipfs.iter().cloned().collect()),
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named index: key → wallet address, plus the reverse mapping so a
/// wallet's stale keys can be dropped when it is reindexed.
#[derive(Clone)]
pub struct WalletIndex {
    indexer: Indexer,
    entries: BTreeMap<String, Address>,
    keys_by_wallet: BTreeMap<Address, BTreeSet<String>>,
}

impl WalletIndex {
    pub fn new(indexer: Indexer) -> Self {
        Self {
            indexer,
            entries: BTreeMap::new(),
            keys_by_wallet: BTreeMap::new(),
        }
    }

    /// Point `key` at `wallet`, replacing whatever it pointed at before.
    pub fn set(&mut self, key: impl Into<String>, wallet: &Address) {
        let key = key.into();
        if let Some(previous) = self.entries.insert(key.clone(), wallet.clone()) {
            if &previous != wallet {
                self.unlink(&previous, &key);
            }
        }
        self.keys_by_wallet
            .entry(wallet.clone())
            .or_default()
            .insert(key);
    }

    pub fn get(&self, key: &str) -> Option<&Address> {
        self.entries.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn forget(&mut self, key: &str) {
        if let Some(wallet) = self.entries.remove(key) {
            self.unlink(&wallet, key);
        }
    }

    /// Drop every key pointing at `wallet`.
    pub fn forget_wallet(&mut self, wallet: &Address) {
        if let Some(keys) = self.keys_by_wallet.remove(wallet) {
            for key in keys {
                self.entries.remove(&key);
            }
        }
    }

    /// Distinct wallets reachable through this index, in address order.
    pub fn values(&self) -> Vec<Address> {
        self.keys_by_wallet.keys().cloned().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Address)> {
        self.entries.iter()
    }

    /// Keys currently pointing at `wallet`.
    pub fn keys_of(&self, wallet: &Address) -> Option<&BTreeSet<String>> {
        self.keys_by_wallet.get(wallet)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys_by_wallet.clear();
    }

    /// Run the indexer over `wallet`: add the keys it yields and drop the
    /// ones it no longer yields. Repeating the call changes nothing.
    pub fn index(&mut self, wallet: &Wallet) {
        let address = wallet.address();
        let wanted: BTreeSet<String> = (self.indexer)(wallet).into_iter().collect();

        let stale: Vec<String> = self
            .keys_by_wallet
            .get(address)
            .map(|keys| keys.difference(&wanted).cloned().collect())
            .unwrap_or_default();
        for key in stale {
            self.forget(&key);
        }
        for key in wanted {
            if self.entries.get(&key) != Some(address) {
                self.set(key, address);
            }
        }
    }

    fn unlink(&mut self, wallet: &Address, key: &str) {
        if let Some(keys) = self.keys_by_wallet.get_mut(wallet) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_by_wallet.remove(wallet);
            }
        }
    }
}

impl fmt::Debug for WalletIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletIndex")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DelegateInfo;

    fn addr(c: char) -> Address {
        Address::new(format!("frg_{}", c.to_string().repeat(60)))
    }

    fn delegate(c: char, username: &str) -> Wallet {
        let mut wallet = Wallet::new(addr(c));
        wallet.attributes_mut().delegate = Some(DelegateInfo::new(username));
        wallet
    }

    #[test]
    fn set_and_get() {
        let mut index = WalletIndex::new(IndexName::Usernames.indexer());
        index.set("alice", &addr('a'));
        assert_eq!(index.get("alice"), Some(&addr('a')));
        assert!(index.has("alice"));
        assert!(!index.has("bob"));
        assert_eq!(index.values(), vec![addr('a')]);
    }

    #[test]
    fn set_moves_key_between_wallets() {
        let mut index = WalletIndex::new(IndexName::Usernames.indexer());
        index.set("alice", &addr('a'));
        index.set("alice", &addr('b'));
        assert_eq!(index.get("alice"), Some(&addr('b')));
        assert_eq!(index.values(), vec![addr('b')]);
    }

    #[test]
    fn forget_removes_key() {
        let mut index = WalletIndex::new(IndexName::Usernames.indexer());
        index.set("alice", &addr('a'));
        index.forget("alice");
        assert!(index.is_empty());
        assert!(index.values().is_empty());
    }

    #[test]
    fn index_is_idempotent() {
        let mut index = WalletIndex::new(IndexName::Usernames.indexer());
        let wallet = delegate('a', "alice");
        index.index(&wallet);
        let once: Vec<_> = index.entries().map(|(k, v)| (k.clone(), v.clone())).collect();
        index.index(&wallet);
        let twice: Vec<_> = index.entries().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn index_drops_keys_no_longer_yielded() {
        let mut index = WalletIndex::new(IndexName::Usernames.indexer());
        let mut wallet = delegate('a', "alice");
        index.index(&wallet);

        wallet.attributes_mut().delegate = None;
        index.index(&wallet);
        assert!(!index.has("alice"));
        assert!(index.is_empty());
    }

    #[test]
    fn resignations_only_index_resigned_delegates() {
        let mut index = WalletIndex::new(IndexName::Resignations.indexer());
        let mut wallet = delegate('a', "alice");
        index.index(&wallet);
        assert!(index.is_empty());

        if let Some(d) = wallet.delegate_mut() {
            d.resigned = true;
        }
        index.index(&wallet);
        assert!(index.has("alice"));
    }

    #[test]
    fn index_names_round_trip() {
        for name in IndexName::ALL {
            assert_eq!(IndexName::parse(name.as_str()), Some(name));
        }
        assert_eq!(IndexName::parse("nope"), None);
    }
}
