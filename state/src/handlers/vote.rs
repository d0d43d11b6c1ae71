use super::{sender_address, Changes};
use crate::{TransactionHandler, WalletManager};
use forge_transactions::{
    validate_transaction, Asset, Transaction, TransactionError, TransactionKind, VoteAction,
};

fn vote_action(tx: &Transaction) -> Result<VoteAction, TransactionError> {
    match &tx.asset {
        Asset::Vote { votes } if votes.len() == 1 => Ok(votes[0]),
        Asset::Vote { votes } => Err(TransactionError::InvalidVoteCount(votes.len())),
        _ => Err(TransactionError::UnexpectedAsset {
            kind: tx.kind().to_string(),
        }),
    }
}

/// Casts (`+pk`) or withdraws (`-pk`) the sender's single vote.
///
/// Vote balances are not touched here; the consensus notifier moves the
/// sender's weight onto or off the delegate.
pub struct VoteHandler;

impl TransactionHandler for VoteHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::VOTE
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let action = vote_action(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        let current = wallets.wallet(&sender).and_then(|w| w.vote().copied());

        match action {
            VoteAction::Vote(delegate) => {
                if current.is_some() {
                    return Err(TransactionError::AlreadyVoted);
                }
                let target = wallets
                    .wallet_by_public_key(&delegate)
                    .and_then(|w| w.delegate())
                    .ok_or_else(|| TransactionError::UnknownDelegate(delegate.to_hex()))?;
                if target.resigned {
                    return Err(TransactionError::ResignedDelegate(target.username.clone()));
                }
            }
            VoteAction::Unvote(delegate) => match current {
                None => return Err(TransactionError::NoVote),
                Some(voted) if voted != delegate => return Err(TransactionError::VoteMismatch),
                Some(_) => {}
            },
        }

        let mut changes = Changes::apply(wallets, tx)?;
        changes.debit_sender(tx.fee);
        changes.commit(wallets)?;

        wallets.find_by_address(&sender).attributes_mut().vote = match action {
            VoteAction::Vote(delegate) => Some(delegate),
            VoteAction::Unvote(_) => None,
        };
        wallets.reindex(&sender);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let action = vote_action(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        let current = wallets.wallet(&sender).and_then(|w| w.vote().copied());

        match (action, current) {
            (VoteAction::Vote(delegate), Some(voted)) if voted == delegate => {}
            (VoteAction::Vote(_), Some(_)) => return Err(TransactionError::VoteMismatch),
            (VoteAction::Vote(_), None) => return Err(TransactionError::NoVote),
            (VoteAction::Unvote(_), Some(_)) => return Err(TransactionError::AlreadyVoted),
            (VoteAction::Unvote(_), None) => {}
        }

        let mut changes = Changes::revert(wallets, tx)?;
        changes.credit_sender(tx.fee);
        changes.commit(wallets)?;

        wallets.find_by_address(&sender).attributes_mut().vote = match action {
            VoteAction::Vote(_) => None,
            VoteAction::Unvote(delegate) => Some(delegate),
        };
        wallets.reindex(&sender);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::DelegateInfo;
    use forge_transactions::TransactionBuilder;
    use forge_types::Amount;

    fn with_delegate(seed: u8, username: &str) -> WalletManager {
        let mut wallets = manager();
        let delegate = funded(&mut wallets, seed, 0);
        wallets.find_by_address(&delegate).attributes_mut().delegate =
            Some(DelegateInfo::new(username));
        wallets.reindex(&delegate);
        wallets
    }

    #[test]
    fn vote_then_unvote() {
        let mut wallets = with_delegate(9, "dana");
        let voter = funded(&mut wallets, 1, 10);

        let vote = TransactionBuilder::vote(key(1), key(9))
            .fee(Amount::new(1))
            .build()
            .unwrap();
        VoteHandler.apply(&vote, &mut wallets).unwrap();
        assert_eq!(wallets.wallet(&voter).unwrap().vote(), Some(&key(9)));
        assert_eq!(
            VoteHandler.apply(&vote, &mut wallets),
            Err(TransactionError::AlreadyVoted)
        );

        let unvote = TransactionBuilder::unvote(key(1), key(9))
            .nonce(2)
            .build()
            .unwrap();
        VoteHandler.apply(&unvote, &mut wallets).unwrap();
        assert_eq!(wallets.wallet(&voter).unwrap().vote(), None);

        VoteHandler.revert(&unvote, &mut wallets).unwrap();
        assert_eq!(wallets.wallet(&voter).unwrap().vote(), Some(&key(9)));
        VoteHandler.revert(&vote, &mut wallets).unwrap();
        assert_eq!(wallets.wallet(&voter).unwrap().vote(), None);
        assert_eq!(wallets.wallet(&voter).unwrap().balance(), Amount::new(10));
    }

    #[test]
    fn vote_requires_registered_delegate() {
        let mut wallets = manager();
        funded(&mut wallets, 1, 10);
        let vote = TransactionBuilder::vote(key(1), key(9)).build().unwrap();
        assert!(matches!(
            VoteHandler.apply(&vote, &mut wallets),
            Err(TransactionError::UnknownDelegate(_))
        ));
    }

    #[test]
    fn vote_rejects_resigned_delegate() {
        let mut wallets = with_delegate(9, "dana");
        if let Some(d) = wallets.wallet_by_public_key_mut(&key(9)).and_then(|w| w.delegate_mut()) {
            d.resigned = true;
        }
        funded(&mut wallets, 1, 10);
        let vote = TransactionBuilder::vote(key(1), key(9)).build().unwrap();
        assert_eq!(
            VoteHandler.apply(&vote, &mut wallets),
            Err(TransactionError::ResignedDelegate("dana".into()))
        );
    }

    #[test]
    fn unvote_must_match_current_vote() {
        let mut wallets = with_delegate(9, "dana");
        funded(&mut wallets, 1, 10);
        let unvote = TransactionBuilder::unvote(key(1), key(9)).build().unwrap();
        assert_eq!(
            VoteHandler.apply(&unvote, &mut wallets),
            Err(TransactionError::NoVote)
        );

        let vote = TransactionBuilder::vote(key(1), key(9)).build().unwrap();
        VoteHandler.apply(&vote, &mut wallets).unwrap();
        let wrong = TransactionBuilder::unvote(key(1), key(8))
            .nonce(2)
            .build()
            .unwrap();
        assert_eq!(
            VoteHandler.apply(&wrong, &mut wallets),
            Err(TransactionError::VoteMismatch)
        );
    }
}
