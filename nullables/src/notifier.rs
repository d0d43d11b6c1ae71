//! Nullable consensus notifiers.

use forge_state::{ConsensusNotifier, StateError, TransactionEffect, WalletManager};
use forge_types::{Address, TransactionId};
use std::sync::Mutex;

/// Accepts every transaction and does nothing.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl ConsensusNotifier for NullNotifier {
    fn add_transaction(
        &self,
        _wallets: &mut WalletManager,
        _effect: &TransactionEffect<'_>,
    ) -> Result<(), StateError> {
        Ok(())
    }
}

/// One notification as seen by a [`RecordingNotifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEffect {
    pub transaction: TransactionId,
    pub sender: Address,
    pub recipient: Option<Address>,
    pub lock_wallet: Option<Address>,
    pub revert: bool,
}

/// Records every notification and can be scripted to reject one.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    effects: Mutex<Vec<RecordedEffect>>,
    calls: Mutex<usize>,
    fail_on_call: Option<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `call`-th notification (1-based). Rejected calls are not recorded.
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn effects(&self) -> Vec<RecordedEffect> {
        self.effects.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ConsensusNotifier for RecordingNotifier {
    fn add_transaction(
        &self,
        _wallets: &mut WalletManager,
        effect: &TransactionEffect<'_>,
    ) -> Result<(), StateError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_on_call == Some(call) {
            return Err(StateError::VoteBalance(format!(
                "scripted rejection of transaction {}",
                effect.transaction.id
            )));
        }
        self.effects.lock().unwrap().push(RecordedEffect {
            transaction: effect.transaction.id,
            sender: effect.sender.clone(),
            recipient: effect.recipient.clone(),
            lock_wallet: effect.lock_wallet.clone(),
            revert: effect.revert,
        });
        Ok(())
    }
}
