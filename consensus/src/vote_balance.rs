//! Delegate vote balances, updated incrementally per transaction.
//!
//! A delegate's vote balance is the sum of the voting weight (balance plus
//! locked balance) of every wallet voting for it. Rather than rescanning
//! voters, the tracker adjusts the affected delegates each time a
//! transaction is applied or reverted. [`expected_vote_balances`] recomputes
//! from scratch and is used to verify or rebuild the incremental values.

use crate::ConsensusError;
use forge_state::{ConsensusNotifier, StateError, TransactionEffect, WalletManager};
use forge_transactions::{Asset, TransactionKind, VoteAction};
use forge_types::{Amount, PublicKey};
use std::collections::BTreeMap;

/// Net change to one delegate's vote balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Delta {
    increase: Amount,
    decrease: Amount,
}

/// Deltas of one transaction, netted per delegate.
struct Deltas {
    revert: bool,
    by_delegate: BTreeMap<PublicKey, Delta>,
}

impl Deltas {
    fn new(revert: bool) -> Self {
        Self {
            revert,
            by_delegate: BTreeMap::new(),
        }
    }

    /// Record a change as seen when applying; flipped when reverting.
    fn gain(&mut self, delegate: &PublicKey, amount: Amount) -> Result<(), StateError> {
        self.record(delegate, amount, !self.revert)
    }

    fn loss(&mut self, delegate: &PublicKey, amount: Amount) -> Result<(), StateError> {
        self.record(delegate, amount, self.revert)
    }

    fn record(&mut self, delegate: &PublicKey, amount: Amount, increase: bool) -> Result<(), StateError> {
        if amount.is_zero() {
            return Ok(());
        }
        let delta = self.by_delegate.entry(*delegate).or_default();
        let side = if increase {
            &mut delta.increase
        } else {
            &mut delta.decrease
        };
        *side = side
            .checked_add(amount)
            .ok_or_else(|| StateError::Overflow(format!("vote balance delta of {delegate}")))?;
        Ok(())
    }
}

/// The [`ConsensusNotifier`] that keeps delegate vote balances current.
///
/// All changes of one transaction are computed and checked before any is
/// written, so a rejected notification leaves every balance untouched.
#[derive(Debug, Default)]
pub struct VoteBalanceTracker;

impl VoteBalanceTracker {
    pub fn new() -> Self {
        Self
    }

    fn deltas(
        &self,
        wallets: &WalletManager,
        effect: &TransactionEffect<'_>,
    ) -> Result<Deltas, StateError> {
        let tx = effect.transaction;
        let kind = tx.kind();
        let mut deltas = Deltas::new(effect.revert);
        let sender = wallets
            .wallet(&effect.sender)
            .ok_or_else(|| StateError::UnknownWallet(effect.sender.to_string()))?;

        if kind == TransactionKind::VOTE {
            let Asset::Vote { votes } = &tx.asset else {
                return Ok(deltas);
            };
            let weight = sender
                .voting_weight()
                .ok_or_else(|| StateError::Overflow(format!("voting weight of {}", effect.sender)))?;
            // The sender's balance already reflects the fee: after it on
            // apply, before it on revert.
            for action in votes {
                match (action, effect.revert) {
                    (VoteAction::Vote(delegate), false) => deltas.record(delegate, weight, true)?,
                    (VoteAction::Vote(delegate), true) => {
                        let before_fee = weight.checked_sub(tx.fee).ok_or_else(|| {
                            StateError::VoteBalance(format!("voter {} cannot cover fee", effect.sender))
                        })?;
                        deltas.record(delegate, before_fee, false)?
                    }
                    (VoteAction::Unvote(delegate), false) => {
                        let with_fee = weight.checked_add(tx.fee).ok_or_else(|| {
                            StateError::Overflow(format!("voting weight of {}", effect.sender))
                        })?;
                        deltas.record(delegate, with_fee, false)?
                    }
                    (VoteAction::Unvote(delegate), true) => deltas.record(delegate, weight, true)?,
                }
            }
            return Ok(deltas);
        }

        if let Some(delegate) = sender.vote() {
            let spent = if matches!(kind, TransactionKind::HTLC_LOCK | TransactionKind::HTLC_CLAIM) {
                tx.fee
            } else {
                tx.total_debit()
                    .ok_or_else(|| StateError::Overflow(format!("debit of {}", tx.id)))?
            };
            deltas.loss(delegate, spent)?;
        }

        if kind == TransactionKind::HTLC_CLAIM {
            let (Some(lock_wallet), Some(lock)) = (&effect.lock_wallet, &effect.lock_transaction)
            else {
                return Err(StateError::VoteBalance(format!(
                    "claim {} does not resolve to an open lock",
                    tx.id
                )));
            };
            if let Some(delegate) = wallets.wallet(lock_wallet).and_then(|w| w.vote()) {
                deltas.loss(delegate, lock.amount)?;
            }
            if let Some(delegate) = sender.vote() {
                deltas.gain(delegate, lock.amount)?;
            }
        }

        if kind == TransactionKind::TRANSFER {
            let recipient_vote = effect
                .recipient
                .as_ref()
                .and_then(|address| wallets.wallet(address))
                .and_then(|w| w.vote());
            if let Some(delegate) = recipient_vote {
                deltas.gain(delegate, tx.amount)?;
            }
        }

        Ok(deltas)
    }
}

impl ConsensusNotifier for VoteBalanceTracker {
    fn add_transaction(
        &self,
        wallets: &mut WalletManager,
        effect: &TransactionEffect<'_>,
    ) -> Result<(), StateError> {
        let deltas = self.deltas(wallets, effect)?;

        let mut updates = Vec::with_capacity(deltas.by_delegate.len());
        for (delegate, delta) in &deltas.by_delegate {
            let current = wallets.vote_balance(delegate)?;
            let next = current
                .checked_add(delta.increase)
                .ok_or_else(|| StateError::Overflow(format!("vote balance of {delegate}")))?
                .checked_sub(delta.decrease)
                .ok_or_else(|| {
                    StateError::VoteBalance(format!(
                        "vote balance of {delegate} would drop below zero applying {}",
                        effect.transaction.id
                    ))
                })?;
            updates.push((*delegate, next));
        }

        for (delegate, vote_balance) in updates {
            wallets.set_vote_balance(&delegate, vote_balance)?;
            tracing::trace!(
                delegate = %delegate,
                vote_balance = %vote_balance,
                transaction = %effect.transaction.id,
                revert = effect.revert,
                "updated vote balance"
            );
        }
        Ok(())
    }
}

/// Vote balances recomputed from every voter's weight.
///
/// Every registered delegate appears, with zero if nobody votes for it.
pub fn expected_vote_balances(
    wallets: &WalletManager,
) -> Result<BTreeMap<PublicKey, Amount>, ConsensusError> {
    let mut balances: BTreeMap<PublicKey, Amount> = wallets
        .all_by_username()
        .into_iter()
        .filter_map(|w| w.public_key().copied())
        .map(|pk| (pk, Amount::ZERO))
        .collect();

    for voter in wallets.wallets() {
        let Some(delegate) = voter.vote() else {
            continue;
        };
        let weight = voter
            .voting_weight()
            .ok_or_else(|| ConsensusError::Overflow(voter.address().to_string()))?;
        let entry = balances.entry(*delegate).or_default();
        *entry = entry
            .checked_add(weight)
            .ok_or_else(|| ConsensusError::Overflow(delegate.to_hex()))?;
    }
    Ok(balances)
}

/// Check every delegate's recorded vote balance against its voters.
pub fn verify_vote_balances(wallets: &WalletManager) -> Result<(), ConsensusError> {
    for (delegate, expected) in expected_vote_balances(wallets)? {
        let recorded = wallets.vote_balance(&delegate)?;
        if recorded != expected {
            return Err(ConsensusError::VoteBalanceMismatch {
                delegate: delegate.to_hex(),
                recorded,
                expected,
            });
        }
    }
    Ok(())
}

/// Overwrite every delegate's vote balance with the recomputed value.
///
/// Used after importing wallets whose vote balances cannot be trusted.
/// Returns how many delegates changed.
pub fn rebuild_vote_balances(wallets: &mut WalletManager) -> Result<usize, ConsensusError> {
    let mut changed = 0;
    for (delegate, expected) in expected_vote_balances(wallets)? {
        if wallets.vote_balance(&delegate)? != expected {
            wallets.set_vote_balance(&delegate, expected)?;
            changed += 1;
        }
    }
    if changed > 0 {
        tracing::info!(changed, "rebuilt delegate vote balances");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_crypto::keypair_from_seed;
    use forge_nullables::ChainBuilder;
    use forge_state::HandlerRegistry;
    use forge_transactions::{Block, Transaction, TransactionBuilder};
    use std::sync::Arc;

    fn key(seed: u8) -> PublicKey {
        keypair_from_seed(&[seed; 32]).public
    }

    fn manager() -> WalletManager {
        WalletManager::new(
            Arc::new(HandlerRegistry::with_core_handlers()),
            Arc::new(VoteBalanceTracker::new()),
        )
    }

    struct Fixture {
        wallets: WalletManager,
        chain: ChainBuilder,
    }

    /// Genesis: generator G registers as delegate "dana"; voter V holds 1000.
    fn fixture() -> Fixture {
        let mut wallets = manager();
        let mut chain = ChainBuilder::from_seed(100);
        let voter = wallets.find_by_public_key(&key(1));
        voter.set_balance(Amount::new(1000));
        let register = TransactionBuilder::delegate_registration(chain.generator(), "dana")
            .build()
            .unwrap();
        let genesis = chain.next_block(vec![register]).unwrap();
        wallets.apply_block(&genesis).unwrap();
        Fixture { wallets, chain }
    }

    impl Fixture {
        fn block(&mut self, txs: Vec<Transaction>) -> Block {
            let block = self.chain.next_block(txs).unwrap();
            self.wallets.apply_block(&block).unwrap();
            block
        }

        fn dana(&self) -> Amount {
            self.wallets.vote_balance(&self.chain.generator()).unwrap()
        }
    }

    #[test]
    fn vote_adds_weight_and_revert_removes_it() {
        let mut f = fixture();
        let vote = TransactionBuilder::vote(key(1), f.chain.generator())
            .fee(Amount::new(10))
            .build()
            .unwrap();
        let block = f.block(vec![vote]);
        assert_eq!(f.dana(), Amount::new(990));
        verify_vote_balances(&f.wallets).unwrap();

        f.wallets.revert_block(&block).unwrap();
        assert_eq!(f.dana(), Amount::ZERO);
        verify_vote_balances(&f.wallets).unwrap();
    }

    #[test]
    fn unvote_removes_weight_including_fee() {
        let mut f = fixture();
        let vote = TransactionBuilder::vote(key(1), f.chain.generator())
            .build()
            .unwrap();
        f.block(vec![vote]);
        let unvote = TransactionBuilder::unvote(key(1), f.chain.generator())
            .nonce(2)
            .fee(Amount::new(5))
            .build()
            .unwrap();
        let block = f.block(vec![unvote]);
        assert_eq!(f.dana(), Amount::ZERO);

        f.wallets.revert_block(&block).unwrap();
        assert_eq!(f.dana(), Amount::new(1000));
        verify_vote_balances(&f.wallets).unwrap();
    }

    #[test]
    fn transfers_move_weight_between_delegates() {
        let mut f = fixture();
        let vote = TransactionBuilder::vote(key(1), f.chain.generator())
            .build()
            .unwrap();
        f.block(vec![vote]);

        let outsider = forge_crypto::derive_address(&key(2));
        let transfer = TransactionBuilder::transfer(key(1), outsider, Amount::new(300))
            .nonce(2)
            .fee(Amount::new(1))
            .build()
            .unwrap();
        let block = f.block(vec![transfer]);
        assert_eq!(f.dana(), Amount::new(699));
        verify_vote_balances(&f.wallets).unwrap();

        f.wallets.revert_block(&block).unwrap();
        assert_eq!(f.dana(), Amount::new(1000));
    }

    #[test]
    fn verify_detects_drift_and_rebuild_repairs_it() {
        let mut f = fixture();
        let vote = TransactionBuilder::vote(key(1), f.chain.generator())
            .build()
            .unwrap();
        f.block(vec![vote]);

        let generator = f.chain.generator();
        f.wallets
            .set_vote_balance(&generator, Amount::new(1))
            .unwrap();
        assert!(matches!(
            verify_vote_balances(&f.wallets),
            Err(ConsensusError::VoteBalanceMismatch { .. })
        ));
        assert_eq!(rebuild_vote_balances(&mut f.wallets).unwrap(), 1);
        verify_vote_balances(&f.wallets).unwrap();
        assert_eq!(rebuild_vote_balances(&mut f.wallets).unwrap(), 0);
    }

    #[test]
    fn rejected_notification_rolls_back_the_transaction() {
        let mut f = fixture();
        let vote = TransactionBuilder::vote(key(1), f.chain.generator())
            .build()
            .unwrap();
        f.block(vec![vote]);
        let generator = f.chain.generator();
        // Drifted balance that cannot absorb the unvote.
        f.wallets.set_vote_balance(&generator, Amount::ZERO).unwrap();

        let unvote = TransactionBuilder::unvote(key(1), generator)
            .nonce(2)
            .build()
            .unwrap();
        let block = f.chain.next_block(vec![unvote]).unwrap();
        let err = f.wallets.apply_block(&block).unwrap_err();
        assert!(matches!(err, StateError::VoteBalance(_)));

        let voter = f.wallets.wallet_by_public_key(&key(1)).unwrap();
        assert_eq!(voter.vote(), Some(&generator));
        assert_eq!(voter.nonce(), 1);
    }
}
