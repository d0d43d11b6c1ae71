//! Vote balances tracked across whole blocks, checked against a full
//! recomputation after every step.

use forge_consensus::{verify_vote_balances, DelegateRoster, VoteBalanceTracker};
use forge_crypto::{derive_address, keypair_from_seed, sha256};
use forge_nullables::ChainBuilder;
use forge_state::{HandlerRegistry, WalletManager};
use forge_transactions::{Block, HtlcExpiration, Transaction, TransactionBuilder};
use forge_types::{Amount, PublicKey};
use std::sync::Arc;

fn key(seed: u8) -> PublicKey {
    keypair_from_seed(&[seed; 32]).public
}

struct Chain {
    wallets: WalletManager,
    blocks: ChainBuilder,
    delegate: PublicKey,
}

impl Chain {
    /// Delegate "dana" forges every block; voter 1 holds 1000, sender 2 holds 500.
    fn new() -> Self {
        let mut wallets = WalletManager::new(
            Arc::new(HandlerRegistry::with_core_handlers()),
            Arc::new(VoteBalanceTracker::new()),
        );
        wallets
            .find_by_public_key(&key(1))
            .set_balance(Amount::new(1000));
        wallets
            .find_by_public_key(&key(2))
            .set_balance(Amount::new(500));

        let mut blocks = ChainBuilder::from_seed(100);
        let delegate = blocks.generator();
        let genesis = blocks
            .next_block(vec![TransactionBuilder::delegate_registration(delegate, "dana")
                .build()
                .unwrap()])
            .unwrap();
        wallets.apply_block(&genesis).unwrap();

        Self {
            wallets,
            blocks,
            delegate,
        }
    }

    fn apply(&mut self, txs: Vec<Transaction>) -> Block {
        let block = self.blocks.next_block(txs).unwrap();
        self.wallets.apply_block(&block).unwrap();
        verify_vote_balances(&self.wallets).unwrap();
        block
    }

    fn revert(&mut self, block: &Block) {
        self.wallets.revert_block(block).unwrap();
        verify_vote_balances(&self.wallets).unwrap();
    }

    fn dana(&self) -> Amount {
        self.wallets.vote_balance(&self.delegate).unwrap()
    }
}

#[test]
fn incoming_transfer_raises_the_voted_delegate() {
    let mut chain = Chain::new();
    let delegate = chain.delegate;
    chain.apply(vec![TransactionBuilder::vote(key(1), delegate).build().unwrap()]);
    assert_eq!(chain.dana(), Amount::new(1000));

    let transfer = chain.apply(vec![TransactionBuilder::transfer(
        key(2),
        derive_address(&key(1)),
        Amount::new(200),
    )
    .fee(Amount::new(1))
    .build()
    .unwrap()]);
    assert_eq!(chain.dana(), Amount::new(1200));
    assert_eq!(
        DelegateRoster::new(&chain.wallets)
            .total_vote_balance()
            .unwrap(),
        Amount::new(1200)
    );

    chain.revert(&transfer);
    assert_eq!(chain.dana(), Amount::new(1000));
}

#[test]
fn htlc_lock_and_claim_move_weight_between_voters() {
    let mut chain = Chain::new();
    let delegate = chain.delegate;
    chain.apply(vec![TransactionBuilder::vote(key(1), delegate).build().unwrap()]);

    let secret = b"open sesame".to_vec();
    let lock = TransactionBuilder::htlc_lock(
        key(1),
        derive_address(&key(2)),
        Amount::new(300),
        sha256(&secret),
        HtlcExpiration::BlockHeight(100),
    )
    .nonce(2)
    .fee(Amount::new(2))
    .build()
    .unwrap();
    let lock_id = lock.id;
    let lock_block = chain.apply(vec![lock]);
    // Locked funds still count towards the voter's weight.
    assert_eq!(chain.dana(), Amount::new(998));

    let claim_block = chain.apply(vec![TransactionBuilder::htlc_claim(key(2), lock_id, secret)
        .build()
        .unwrap()]);
    assert_eq!(chain.dana(), Amount::new(698));
    assert_eq!(
        chain
            .wallets
            .wallet(&derive_address(&key(2)))
            .unwrap()
            .balance(),
        Amount::new(800)
    );

    chain.revert(&claim_block);
    assert_eq!(chain.dana(), Amount::new(998));
    chain.revert(&lock_block);
    assert_eq!(chain.dana(), Amount::new(1000));
}

#[test]
fn unvote_and_revote_across_blocks() {
    let mut chain = Chain::new();
    let delegate = chain.delegate;
    chain.apply(vec![TransactionBuilder::vote(key(1), delegate).build().unwrap()]);

    let unvote = chain.apply(vec![TransactionBuilder::unvote(key(1), delegate)
        .nonce(2)
        .fee(Amount::new(5))
        .build()
        .unwrap()]);
    assert_eq!(chain.dana(), Amount::ZERO);

    chain.revert(&unvote);
    assert_eq!(chain.dana(), Amount::new(1000));
}
