//! The wallet manager: arena of wallets, derived indices, lookup surface.
//!
//! Wallets are stored once, keyed by address, behind an `Arc` so a
//! [`WalletManager::fork`] can share every record with its parent and copy
//! only the ones it writes. Indices store addresses, never wallets.
//!
//! Lookups by address create missing wallets; every other lookup is
//! read-only and reports absence as `None`.

use crate::index::{IndexName, Indexer, WalletIndex};
use crate::{ConsensusNotifier, HandlerRegistry, StateError, Wallet};
use forge_crypto::derive_address;
use forge_transactions::BlockHeader;
use forge_types::{Address, Amount, PublicKey};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub struct WalletManager {
    pub(crate) wallets: BTreeMap<Address, Arc<Wallet>>,
    pub(crate) standard: [WalletIndex; 6],
    /// Plugin indices in registration order.
    pub(crate) custom: Vec<(String, WalletIndex)>,
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) consensus: Arc<dyn ConsensusNotifier>,
    pub(crate) current_block: Option<BlockHeader>,
    /// Height at which an unknown generator is created instead of rejected.
    pub(crate) genesis_height: u64,
    /// Bumped by every mutable access to the arena or an index; a fork
    /// records the value it was taken at so a stale fork cannot be merged.
    pub(crate) generation: u64,
    pub(crate) forked_at: Option<u64>,
}

impl WalletManager {
    pub fn new(handlers: Arc<HandlerRegistry>, consensus: Arc<dyn ConsensusNotifier>) -> Self {
        Self {
            wallets: BTreeMap::new(),
            standard: IndexName::ALL.map(|name| WalletIndex::new(name.indexer())),
            custom: Vec::new(),
            handlers,
            consensus,
            current_block: None,
            genesis_height: 1,
            generation: 0,
            forked_at: None,
        }
    }

    pub fn with_genesis_height(mut self, genesis_height: u64) -> Self {
        self.genesis_height = genesis_height;
        self
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// Header of the block being applied or reverted, if any.
    pub fn current_block(&self) -> Option<&BlockHeader> {
        self.current_block.as_ref()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Every wallet in address order.
    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values().map(|w| w.as_ref())
    }

    // ── Index registry ──────────────────────────────────────────────────

    /// Register a plugin index and populate it from the existing wallets.
    pub fn register_index(&mut self, name: &str, indexer: Indexer) -> Result<(), StateError> {
        if IndexName::parse(name).is_some() || self.custom.iter().any(|(n, _)| n == name) {
            return Err(StateError::IndexAlreadyRegistered(name.to_string()));
        }
        let mut index = WalletIndex::new(indexer);
        for wallet in self.wallets.values() {
            index.index(wallet);
        }
        self.custom.push((name.to_string(), index));
        self.generation += 1;
        Ok(())
    }

    pub fn unregister_index(&mut self, name: &str) -> Result<(), StateError> {
        if IndexName::parse(name).is_some() {
            return Err(StateError::StandardIndex(name.to_string()));
        }
        let position = self
            .custom
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| StateError::IndexNotFound(name.to_string()))?;
        self.custom.remove(position);
        self.generation += 1;
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> Result<&WalletIndex, StateError> {
        if let Some(standard) = IndexName::parse(name) {
            return Ok(self.index_of(standard));
        }
        self.custom
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, index)| index)
            .ok_or_else(|| StateError::IndexNotFound(name.to_string()))
    }

    fn get_index_mut(&mut self, name: &str) -> Result<&mut WalletIndex, StateError> {
        if let Some(standard) = IndexName::parse(name) {
            return Ok(self.index_of_mut(standard));
        }
        self.custom
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, index)| index)
            .ok_or_else(|| StateError::IndexNotFound(name.to_string()))
    }

    /// Standard indices first, then plugin indices in registration order.
    pub fn index_names(&self) -> Vec<String> {
        IndexName::ALL
            .iter()
            .map(|name| name.as_str().to_string())
            .chain(self.custom.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    pub fn index_of(&self, name: IndexName) -> &WalletIndex {
        &self.standard[name as usize]
    }

    fn index_of_mut(&mut self, name: IndexName) -> &mut WalletIndex {
        &mut self.standard[name as usize]
    }

    fn all_indexes(&self) -> impl Iterator<Item = &WalletIndex> {
        self.standard
            .iter()
            .chain(self.custom.iter().map(|(_, index)| index))
    }

    fn all_indexes_mut(&mut self) -> impl Iterator<Item = &mut WalletIndex> {
        self.standard
            .iter_mut()
            .chain(self.custom.iter_mut().map(|(_, index)| index))
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    /// The wallet at `address`, created with zero state if it does not exist.
    pub fn find_by_address(&mut self, address: &Address) -> &mut Wallet {
        self.generation += 1;
        let addresses = &mut self.standard[IndexName::Addresses as usize];
        if !addresses.has(address.as_str()) {
            addresses.set(address.as_str(), address);
        }
        let slot = self
            .wallets
            .entry(address.clone())
            .or_insert_with(|| Arc::new(Wallet::new(address.clone())));
        Arc::make_mut(slot)
    }

    /// The wallet owning `public_key`, created if needed, with the key
    /// attached and indexed.
    pub fn find_by_public_key(&mut self, public_key: &PublicKey) -> &mut Wallet {
        let key = public_key.to_hex();
        let index = self.index_of(IndexName::PublicKeys);
        let known = index.get(&key).cloned();
        let address = known.clone().unwrap_or_else(|| derive_address(public_key));
        if known.is_none() {
            self.index_of_mut(IndexName::PublicKeys).set(key, &address);
        }

        let wallet = self.find_by_address(&address);
        if wallet.public_key() != Some(public_key) {
            wallet.set_public_key(*public_key);
        }
        wallet
    }

    pub fn find_by_username(&self, username: &str) -> Option<&Wallet> {
        self.lookup(IndexName::Usernames, username)
    }

    /// First wallet found under `key`, trying `names` in order.
    pub fn find_by_index(&self, names: &[&str], key: &str) -> Result<Option<&Wallet>, StateError> {
        for name in names {
            if let Some(address) = self.get_index(name)?.get(key) {
                return Ok(self.wallet(address));
            }
        }
        Ok(None)
    }

    /// First wallet found under `key` in any index, in priority order.
    pub fn find_by_id(&self, key: &str) -> Option<&Wallet> {
        self.all_indexes()
            .find_map(|index| index.get(key))
            .and_then(|address| self.wallet(address))
    }

    pub fn wallet(&self, address: &Address) -> Option<&Wallet> {
        self.wallets.get(address).map(|w| w.as_ref())
    }

    /// Mutable access to an existing wallet. Callers reindex after changing
    /// indexed attributes.
    pub fn wallet_mut(&mut self, address: &Address) -> Option<&mut Wallet> {
        self.generation += 1;
        self.wallets.get_mut(address).map(Arc::make_mut)
    }

    pub fn wallet_by_public_key(&self, public_key: &PublicKey) -> Option<&Wallet> {
        self.lookup(IndexName::PublicKeys, &public_key.to_hex())
    }

    pub fn wallet_by_public_key_mut(&mut self, public_key: &PublicKey) -> Option<&mut Wallet> {
        let address = self
            .index_of(IndexName::PublicKeys)
            .get(&public_key.to_hex())?
            .clone();
        self.wallet_mut(&address)
    }

    fn lookup(&self, name: IndexName, key: &str) -> Option<&Wallet> {
        self.index_of(name)
            .get(key)
            .and_then(|address| self.wallet(address))
    }

    pub fn has(&self, key: &str) -> bool {
        self.all_indexes().any(|index| index.has(key))
    }

    pub fn has_by_address(&self, address: &Address) -> bool {
        self.index_of(IndexName::Addresses).has(address.as_str())
    }

    pub fn has_by_public_key(&self, public_key: &PublicKey) -> bool {
        self.index_of(IndexName::PublicKeys)
            .has(&public_key.to_hex())
    }

    pub fn has_by_username(&self, username: &str) -> bool {
        self.index_of(IndexName::Usernames).has(username)
    }

    pub fn has_by_index(&self, name: &str, key: &str) -> Result<bool, StateError> {
        Ok(self.get_index(name)?.has(key))
    }

    /// Nonce of the wallet owning `public_key`, or zero. Never creates.
    pub fn get_nonce(&self, public_key: &PublicKey) -> u64 {
        self.wallet_by_public_key(public_key)
            .map_or(0, |wallet| wallet.nonce())
    }

    pub fn all_by_address(&self) -> Vec<&Wallet> {
        self.all_by(IndexName::Addresses)
    }

    pub fn all_by_public_key(&self) -> Vec<&Wallet> {
        self.all_by(IndexName::PublicKeys)
    }

    pub fn all_by_username(&self) -> Vec<&Wallet> {
        self.all_by(IndexName::Usernames)
    }

    fn all_by(&self, name: IndexName) -> Vec<&Wallet> {
        self.index_of(name)
            .values()
            .iter()
            .filter_map(|address| self.wallet(address))
            .collect()
    }

    pub fn forget_by_address(&mut self, address: &Address) {
        self.generation += 1;
        self.index_of_mut(IndexName::Addresses)
            .forget(address.as_str());
    }

    pub fn forget_by_public_key(&mut self, public_key: &PublicKey) {
        self.generation += 1;
        self.index_of_mut(IndexName::PublicKeys)
            .forget(&public_key.to_hex());
    }

    pub fn forget_by_username(&mut self, username: &str) {
        self.generation += 1;
        self.index_of_mut(IndexName::Usernames).forget(username);
    }

    pub fn forget_by_index(&mut self, name: &str, key: &str) -> Result<(), StateError> {
        self.get_index_mut(name)?.forget(key);
        self.generation += 1;
        Ok(())
    }

    // ── Indexing ────────────────────────────────────────────────────────

    /// Insert or replace `wallets` in the arena and index each of them.
    pub fn index(&mut self, wallets: impl IntoIterator<Item = Wallet>) {
        for wallet in wallets {
            let address = wallet.address().clone();
            self.wallets.insert(address.clone(), Arc::new(wallet));
            self.reindex(&address);
        }
        self.generation += 1;
    }

    /// Run every index over the wallet at `address`.
    pub fn reindex(&mut self, address: &Address) {
        let Some(wallet) = self.wallets.get(address).cloned() else {
            return;
        };
        for index in self.all_indexes_mut() {
            index.index(&wallet);
        }
        self.generation += 1;
    }

    // ── Purging ─────────────────────────────────────────────────────────

    pub fn can_be_purged(&self, address: &Address) -> bool {
        self.wallet(address).is_some_and(Wallet::can_be_purged)
    }

    /// Remove the wallet from the arena and every index if it holds no state.
    pub fn purge(&mut self, address: &Address) -> bool {
        if !self.can_be_purged(address) {
            return false;
        }
        for index in self.all_indexes_mut() {
            index.forget_wallet(address);
        }
        self.wallets.remove(address);
        self.generation += 1;
        true
    }

    /// Purge every empty wallet. Returns how many were removed.
    pub fn purge_empty(&mut self) -> usize {
        let empty: Vec<Address> = self
            .wallets
            .values()
            .filter(|w| w.can_be_purged())
            .map(|w| w.address().clone())
            .collect();
        empty.iter().filter(|address| self.purge(address)).count()
    }

    /// Drop every wallet and clear every index.
    pub fn reset(&mut self) {
        self.wallets.clear();
        for index in self.all_indexes_mut() {
            index.clear();
        }
        self.generation += 1;
    }

    // ── Vote balances ───────────────────────────────────────────────────

    /// Vote balance of the delegate registered under `delegate`.
    pub fn vote_balance(&self, delegate: &PublicKey) -> Result<Amount, StateError> {
        self.wallet_by_public_key(delegate)
            .and_then(Wallet::delegate)
            .map(|info| info.vote_balance)
            .ok_or_else(|| StateError::VoteBalance(format!("{delegate} is not a known delegate")))
    }

    pub fn set_vote_balance(
        &mut self,
        delegate: &PublicKey,
        vote_balance: Amount,
    ) -> Result<(), StateError> {
        let info = self
            .wallet_by_public_key_mut(delegate)
            .and_then(Wallet::delegate_mut)
            .ok_or_else(|| {
                StateError::VoteBalance(format!("{delegate} is not a known delegate"))
            })?;
        info.vote_balance = vote_balance;
        Ok(())
    }

    /// Add `increase` and subtract `decrease` from a delegate's vote balance,
    /// writing nothing if the result would be negative.
    pub fn adjust_vote_balance(
        &mut self,
        delegate: &PublicKey,
        increase: Amount,
        decrease: Amount,
    ) -> Result<(), StateError> {
        let current = self.vote_balance(delegate)?;
        let next = current
            .checked_add(increase)
            .ok_or_else(|| StateError::Overflow(format!("vote balance of {delegate}")))?
            .checked_sub(decrease)
            .ok_or_else(|| {
                StateError::VoteBalance(format!(
                    "vote balance of {delegate} would drop below zero ({current} + {increase} - {decrease})"
                ))
            })?;
        self.set_vote_balance(delegate, next)
    }

    // ── Forks ───────────────────────────────────────────────────────────

    /// An isolated speculative copy. Wallet records are shared until the
    /// fork writes them.
    pub fn fork(&self) -> WalletManager {
        WalletManager {
            wallets: self.wallets.clone(),
            standard: self.standard.clone(),
            custom: self.custom.clone(),
            handlers: Arc::clone(&self.handlers),
            consensus: Arc::clone(&self.consensus),
            current_block: None,
            genesis_height: self.genesis_height,
            generation: self.generation,
            forked_at: Some(self.generation),
        }
    }

    /// Adopt a fork's wallets and indices. Fails if this manager changed
    /// since the fork was taken.
    pub fn merge(&mut self, fork: WalletManager) -> Result<(), StateError> {
        if let Some(current) = &self.current_block {
            return Err(StateError::BlockInProgress { current: current.id });
        }
        if fork.forked_at != Some(self.generation) {
            return Err(StateError::StaleFork);
        }
        self.wallets = fork.wallets;
        self.standard = fork.standard;
        self.custom = fork.custom;
        self.generation += 1;
        Ok(())
    }
}

impl fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletManager")
            .field("wallets", &self.wallets.len())
            .field("indexes", &self.index_names())
            .field("current_block", &self.current_block.as_ref().map(|h| h.id))
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
