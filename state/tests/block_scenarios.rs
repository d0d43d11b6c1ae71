//! Block-level scenarios run through the full apply/revert pipeline:
//! generator resolution → handlers → notifier → generator credit → unwind.

use forge_crypto::{derive_address, keypair_from_seed};
use forge_nullables::{ChainBuilder, NullNotifier, RecordingNotifier, ScriptedHandler};
use forge_state::handlers::TransferHandler;
use forge_state::{
    HandlerRegistry, IndexName, StateError, TransactionHandler, WalletManager,
};
use forge_transactions::{
    Block, Transaction, TransactionBuilder, TransactionError, TransactionKind,
};
use forge_types::{Address, Amount, PublicKey};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key(seed: u8) -> PublicKey {
    keypair_from_seed(&[seed; 32]).public
}

fn address(seed: u8) -> Address {
    derive_address(&key(seed))
}

fn manager_with(handlers: HandlerRegistry) -> WalletManager {
    WalletManager::new(Arc::new(handlers), Arc::new(NullNotifier))
}

fn manager() -> WalletManager {
    manager_with(HandlerRegistry::with_core_handlers())
}

fn fund(wallets: &mut WalletManager, seed: u8, balance: u128) {
    wallets
        .find_by_public_key(&key(seed))
        .set_balance(Amount::new(balance));
}

fn balance(wallets: &WalletManager, seed: u8) -> Amount {
    wallets
        .wallet(&address(seed))
        .map_or(Amount::ZERO, |w| w.balance())
}

fn transfer(from: u8, to: u8, amount: u128, nonce: u64) -> Transaction {
    TransactionBuilder::transfer(key(from), address(to), Amount::new(amount))
        .nonce(nonce)
        .build()
        .unwrap()
}

/// Replace the transfer handler with one that fails the given transaction.
fn failing_transfer(tx: &Transaction) -> (HandlerRegistry, Arc<ScriptedHandler>) {
    let scripted = Arc::new(ScriptedHandler::wrap(Arc::new(TransferHandler)).fail_apply_of(tx.id));
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers.replace(Arc::clone(&scripted) as Arc<dyn TransactionHandler>);
    (handlers, scripted)
}

// ---------------------------------------------------------------------------
// 1. Genesis transfer
// ---------------------------------------------------------------------------

#[test]
fn genesis_transfer_apply_and_revert() {
    let mut wallets = manager();
    fund(&mut wallets, 1, 100);
    fund(&mut wallets, 2, 0);

    let mut chain = ChainBuilder::new(key(1));
    let mut block = chain.next_block(vec![transfer(1, 2, 100, 1)]).unwrap();
    block.header.total_fee = Amount::new(1);

    wallets.apply_block(&block).unwrap();
    assert_eq!(balance(&wallets, 1), Amount::new(1));
    assert_eq!(balance(&wallets, 2), Amount::new(100));
    assert_eq!(wallets.get_nonce(&key(1)), 1);
    assert!(wallets.current_block().is_none());

    wallets.revert_block(&block).unwrap();
    assert_eq!(balance(&wallets, 1), Amount::new(100));
    assert_eq!(balance(&wallets, 2), Amount::ZERO);
    assert_eq!(wallets.get_nonce(&key(1)), 0);

    let addresses: Vec<Address> = wallets.index_of(IndexName::Addresses).values();
    let mut expected = vec![address(1), address(2)];
    expected.sort();
    assert_eq!(addresses, expected);
}

#[test]
fn genesis_creates_unknown_generator() {
    let mut wallets = manager();
    let mut chain = ChainBuilder::from_seed(9).reward(Amount::new(5));
    let genesis = chain.next_block(vec![]).unwrap();

    wallets.apply_block(&genesis).unwrap();
    let generator = wallets.wallet_by_public_key(&key(9)).unwrap();
    assert_eq!(generator.balance(), Amount::new(5));
    assert_eq!(generator.public_key(), Some(&key(9)));
}

#[test]
fn failed_genesis_does_not_leave_a_generator_behind() {
    let mut wallets = manager();
    let mut chain = ChainBuilder::from_seed(9);
    // Sender has no funds.
    let genesis = chain.next_block(vec![transfer(1, 2, 10, 1)]).unwrap();

    let err = wallets.apply_block(&genesis).unwrap_err();
    assert!(matches!(err, StateError::TransactionApply { .. }));
    assert!(!err.is_fatal());
    assert!(!wallets.has_by_public_key(&key(9)));
}

// ---------------------------------------------------------------------------
// 2. Unknown generator
// ---------------------------------------------------------------------------

#[test]
fn unknown_generator_above_genesis_is_fatal() {
    let mut wallets = manager();
    fund(&mut wallets, 1, 50);
    let mut chain = ChainBuilder::from_seed(7);
    chain.next_block(vec![]).unwrap();
    let block = chain.next_block(vec![transfer(1, 2, 10, 1)]).unwrap();

    let err = wallets.apply_block(&block).unwrap_err();
    assert!(matches!(err, StateError::ConsistencyViolation { height: 2, .. }));
    assert!(err.is_fatal());
    assert!(!wallets.has_by_public_key(&key(7)));
    assert_eq!(balance(&wallets, 1), Amount::new(50));

    let err = wallets.revert_block(&block).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn genesis_height_is_configurable() {
    let mut wallets = manager().with_genesis_height(100);
    let mut chain = ChainBuilder::from_seed(7);
    let first = chain.next_block(vec![]).unwrap();
    assert!(matches!(
        wallets.apply_block(&first),
        Err(StateError::ConsistencyViolation { .. })
    ));
}

// ---------------------------------------------------------------------------
// 3. Atomicity
// ---------------------------------------------------------------------------

#[test]
fn failing_transaction_unwinds_the_block() {
    let txs = vec![
        transfer(1, 2, 10, 1),
        transfer(1, 3, 20, 2),
        transfer(1, 4, 30, 3),
    ];
    let (handlers, scripted) = failing_transfer(&txs[2]);
    let mut wallets = manager_with(handlers);
    fund(&mut wallets, 1, 100);

    let mut chain = ChainBuilder::new(key(1)).reward(Amount::new(3));
    let block = chain.next_block(txs.clone()).unwrap();

    let err = wallets.apply_block(&block).unwrap_err();
    assert!(matches!(&err, StateError::TransactionApply { id, .. } if *id == txs[2].id));
    assert_eq!(scripted.applied(), vec![txs[0].id, txs[1].id]);
    assert_eq!(scripted.reverted(), vec![txs[1].id, txs[0].id]);

    assert_eq!(balance(&wallets, 1), Amount::new(100));
    assert_eq!(balance(&wallets, 2), Amount::ZERO);
    assert_eq!(balance(&wallets, 3), Amount::ZERO);
    assert_eq!(wallets.get_nonce(&key(1)), 0);
    assert!(wallets.current_block().is_none());
}

#[test]
fn rejected_notification_unwinds_the_block() {
    let notifier = Arc::new(RecordingNotifier::failing_on(2));
    let mut wallets = WalletManager::new(
        Arc::new(HandlerRegistry::with_core_handlers()),
        Arc::clone(&notifier) as Arc<dyn forge_state::ConsensusNotifier>,
    );
    fund(&mut wallets, 1, 100);

    let txs = vec![transfer(1, 2, 10, 1), transfer(1, 3, 20, 2)];
    let block = ChainBuilder::new(key(1)).next_block(txs.clone()).unwrap();

    let err = wallets.apply_block(&block).unwrap_err();
    assert!(matches!(err, StateError::VoteBalance(_)));
    assert_eq!(balance(&wallets, 1), Amount::new(100));
    assert_eq!(balance(&wallets, 3), Amount::ZERO);

    let effects = notifier.effects();
    assert_eq!(effects.len(), 2);
    assert_eq!(effects[0].transaction, txs[0].id);
    assert!(!effects[0].revert);
    assert_eq!(effects[1].transaction, txs[0].id);
    assert!(effects[1].revert);
    assert_eq!(effects[0].recipient, Some(address(2)));
}

#[test]
fn failed_unwind_is_fatal() {
    forge_utils::init_test_tracing();
    let txs = vec![transfer(1, 2, 10, 1), transfer(1, 3, 20, 2)];
    let scripted = Arc::new(
        ScriptedHandler::wrap(Arc::new(TransferHandler))
            .fail_apply_of(txs[1].id)
            .fail_revert_of(txs[0].id),
    );
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers.replace(scripted);
    let mut wallets = manager_with(handlers);
    fund(&mut wallets, 1, 100);

    let block = ChainBuilder::new(key(1)).next_block(txs).unwrap();
    let err = wallets.apply_block(&block).unwrap_err();
    assert!(matches!(err, StateError::RollbackFailed { .. }));
    assert!(err.is_fatal());
}

#[test]
fn failed_unwind_restores_what_it_had_reverted() {
    let txs = vec![
        transfer(1, 2, 10, 1),
        transfer(1, 3, 20, 2),
        transfer(1, 4, 30, 3),
    ];
    let scripted = Arc::new(
        ScriptedHandler::wrap(Arc::new(TransferHandler))
            .fail_apply_of(txs[2].id)
            .fail_revert_of(txs[0].id),
    );
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers.replace(Arc::clone(&scripted) as Arc<dyn TransactionHandler>);
    let mut wallets = manager_with(handlers);
    fund(&mut wallets, 1, 100);

    let block = ChainBuilder::new(key(1)).next_block(txs.clone()).unwrap();
    let err = wallets.apply_block(&block).unwrap_err();
    assert!(matches!(err, StateError::RollbackFailed { .. }));

    // Left as after the first two transactions, not half-unwound.
    assert_eq!(balance(&wallets, 1), Amount::new(70));
    assert_eq!(balance(&wallets, 2), Amount::new(10));
    assert_eq!(balance(&wallets, 3), Amount::new(20));
    assert_eq!(balance(&wallets, 4), Amount::ZERO);
    assert_eq!(wallets.get_nonce(&key(1)), 2);
    assert_eq!(scripted.reverted(), vec![txs[1].id]);
    assert_eq!(scripted.applied(), vec![txs[0].id, txs[1].id, txs[1].id]);
    assert!(wallets.current_block().is_none());
}

/// Plugin handler that records whether the sender and recipient wallets
/// already exist when it is asked to revert.
struct WitnessHandler {
    seen_on_revert: Mutex<Vec<(bool, bool)>>,
}

impl TransactionHandler for WitnessHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::new(7, 1)
    }

    fn apply(&self, _tx: &Transaction, _wallets: &mut WalletManager) -> Result<(), TransactionError> {
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let sender = wallets.has_by_public_key(&tx.sender_public_key);
        let recipient = tx
            .recipient
            .as_ref()
            .is_some_and(|recipient| wallets.has_by_address(recipient));
        self.seen_on_revert.lock().unwrap().push((sender, recipient));
        Ok(())
    }
}

#[test]
fn revert_resolves_parties_before_the_handler_runs() {
    let witness = Arc::new(WitnessHandler {
        seen_on_revert: Mutex::new(Vec::new()),
    });
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers
        .register(Arc::clone(&witness) as Arc<dyn TransactionHandler>)
        .unwrap();
    let mut wallets = manager_with(handlers);

    let tx = TransactionBuilder::new(TransactionKind::new(7, 1), key(5))
        .recipient(address(6))
        .build()
        .unwrap();
    wallets.revert_transaction(&tx).unwrap();

    assert_eq!(*witness.seen_on_revert.lock().unwrap(), vec![(true, true)]);
    assert!(wallets.has_by_public_key(&key(5)));
    assert!(wallets.has_by_address(&address(6)));
}

#[test]
fn failed_revert_replays_the_block() {
    let txs = vec![transfer(1, 2, 10, 1), transfer(1, 3, 20, 2)];
    let scripted = Arc::new(
        ScriptedHandler::wrap(Arc::new(TransferHandler)).fail_revert_of(txs[0].id),
    );
    let mut handlers = HandlerRegistry::with_core_handlers();
    handlers.replace(Arc::clone(&scripted) as Arc<dyn TransactionHandler>);
    let mut wallets = manager_with(handlers);
    fund(&mut wallets, 1, 100);

    let block = ChainBuilder::new(key(1))
        .reward(Amount::new(2))
        .next_block(txs)
        .unwrap();
    wallets.apply_block(&block).unwrap();
    assert_eq!(balance(&wallets, 1), Amount::new(72));

    let err = wallets.revert_block(&block).unwrap_err();
    assert!(matches!(err, StateError::TransactionRevert { .. }));
    assert!(!err.is_fatal());
    assert_eq!(balance(&wallets, 1), Amount::new(72));
    assert_eq!(balance(&wallets, 3), Amount::new(20));
    assert_eq!(wallets.get_nonce(&key(1)), 2);
}

// ---------------------------------------------------------------------------
// 4. Delegates
// ---------------------------------------------------------------------------

#[test]
fn username_and_resignation_indices_follow_blocks() {
    let mut wallets = manager();
    let mut chain = ChainBuilder::new(key(1));
    let genesis = chain
        .next_block(vec![TransactionBuilder::delegate_registration(key(1), "genesis_1")
            .build()
            .unwrap()])
        .unwrap();
    wallets.apply_block(&genesis).unwrap();
    assert_eq!(
        wallets.find_by_username("genesis_1").map(|w| w.address().clone()),
        Some(address(1))
    );

    let resign = chain
        .next_block(vec![TransactionBuilder::delegate_resignation(key(1))
            .nonce(2)
            .build()
            .unwrap()])
        .unwrap();
    wallets.apply_block(&resign).unwrap();
    assert!(wallets.has_by_index("resignations", "genesis_1").unwrap());
    assert_eq!(
        wallets.find_by_username("genesis_1").unwrap().delegate().unwrap().produced_blocks,
        2
    );

    wallets.revert_block(&resign).unwrap();
    assert!(!wallets.has_by_index("resignations", "genesis_1").unwrap());
    assert!(wallets.has_by_username("genesis_1"));

    wallets.revert_block(&genesis).unwrap();
    assert!(!wallets.has_by_username("genesis_1"));
}

#[test]
fn nested_block_context_is_refused() {
    let mut wallets = manager();
    let block: Block = ChainBuilder::from_seed(1).next_block(vec![]).unwrap();
    let nested = wallets
        .with_block_context(&block.header, |inner| inner.apply_block(&block))
        .unwrap();
    assert!(matches!(nested, Err(StateError::BlockInProgress { .. })));
    assert!(wallets.current_block().is_none());
}
