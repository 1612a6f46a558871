//! End-to-end ledger behavior through the public engine API.

use mycoin::blockchain::Blockchain;
use mycoin::config::Config;
use mycoin::error::ChainError;
use mycoin::wallet::Wallet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;

fn ledger() -> Blockchain {
    Blockchain::new(&Config::default())
}

fn funded_wallet(chain: &Blockchain, amount: f64) -> Wallet {
    let wallet = Wallet::new(None);
    chain.credit(&wallet.address, amount).unwrap();
    wallet
}

#[test]
fn stake_minimum_moves_balance_into_pool() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 50.0);

    chain.stake(&alice.address, 10.0).unwrap();

    assert_eq!(chain.get_balance(&alice.address), 40.0);
    let validators = chain.get_validators();
    assert_eq!(validators.len(), 1);
    assert!(validators[0].is_active);
    assert_eq!(validators[0].staked_amount, 10.0);
    assert_eq!(chain.total_staked(), 10.0);
}

#[test]
fn bootstrap_block_rewards_any_proposer() {
    let chain = ledger();
    let before = chain.get_balance("addrX");

    let block = chain.produce_block("addrX").unwrap();

    assert_eq!(block.index, 1);
    assert_eq!(chain.chain_len(), 2);
    assert_eq!(chain.get_balance("addrX"), before + 50.0);
    assert!(chain.verify_chain_integrity());
}

#[test]
fn recent_proposer_is_outside_eligible_set() {
    let chain = ledger();
    let v = funded_wallet(&chain, 100.0);
    chain.stake(&v.address, 20.0).unwrap();

    // Sole validator: the lottery always picks it while it is eligible.
    chain.produce_selected_block(&v.address).unwrap();

    let err = chain.produce_selected_block(&v.address).unwrap_err();
    assert_eq!(err, ChainError::NoEligibleValidators);
    assert_eq!(chain.chain_len(), 2);
}

#[test]
fn jointly_unaffordable_transfers_never_overdraw() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 10.0);

    chain
        .admit_transaction(alice.create_transaction("bob", 6.0, 0.0).unwrap())
        .unwrap();
    chain
        .admit_transaction(alice.create_transaction("carol", 7.0, 0.0).unwrap())
        .unwrap();
    assert_eq!(chain.pending_count(), 2);

    chain.produce_block("miner").unwrap();

    assert!(chain.get_balance(&alice.address) >= 0.0);
    assert_eq!(chain.get_balance(&alice.address), 4.0);
    assert_eq!(chain.get_balance("bob"), 6.0);
    assert_eq!(chain.get_balance("carol"), 0.0);
    assert_eq!(chain.pending_count(), 0);
    assert!(chain.verify_chain_integrity());
}

#[test]
fn exact_balance_is_spendable_and_a_cent_more_is_not() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 10.0);
    let bob = funded_wallet(&chain, 10.0);

    chain
        .admit_transaction(alice.create_transaction("carol", 9.0, 1.0).unwrap())
        .unwrap();

    let err = chain
        .admit_transaction(bob.create_transaction("carol", 9.0, 1.01).unwrap())
        .unwrap_err();
    assert!(matches!(err, ChainError::InsufficientBalance { .. }));

    chain.produce_block("miner").unwrap();
    assert_eq!(chain.get_balance(&alice.address), 0.0);
    assert_eq!(chain.get_balance("carol"), 9.0);
}

#[test]
fn unsigned_and_forged_transfers_are_refused() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 50.0);
    let mallory = Wallet::new(None);

    let unsigned = mycoin::transaction::Transaction::new(alice.address.clone(), "bob", 1.0, 0.0);
    assert!(chain.admit_transaction(unsigned).is_err());

    let mut forged = mycoin::transaction::Transaction::new(alice.address.clone(), "bob", 2.0, 0.0);
    let keypair = mallory.get_keypair().unwrap();
    let signature = keypair.sign(&forged.hash).unwrap();
    forged.sign(signature.to_vec(), keypair.public_key_bytes().to_vec());
    assert!(chain.admit_transaction(forged).is_err());

    assert_eq!(chain.pending_count(), 0);
}

#[test]
fn duplicate_submission_is_rejected() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 50.0);
    let tx = alice.create_transaction("bob", 1.0, 0.0).unwrap();

    chain.admit_transaction(tx.clone()).unwrap();
    let err = chain.admit_transaction(tx).unwrap_err();
    assert!(matches!(err, ChainError::DuplicateTransaction(_)));
}

#[test]
fn integrity_holds_after_every_block() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 1_000.0);

    for round in 0..5u32 {
        let amount = 1.0 + f64::from(round);
        chain
            .admit_transaction(alice.create_transaction("bob", amount, 0.1).unwrap())
            .unwrap();
        let block = chain.produce_block("miner").unwrap();

        assert!(chain.verify_chain_integrity());
        assert_eq!(block.previous_hash, chain.block(block.index - 1).unwrap().hash);
        assert_eq!(chain.latest_block().unwrap(), block);
    }
    assert_eq!(chain.chain_len(), 6);
    assert_eq!(chain.get_balance("bob"), 1.0 + 2.0 + 3.0 + 4.0 + 5.0);
    assert_eq!(chain.transaction_history("bob").len(), 5);
}

#[test]
fn balance_reads_are_idempotent() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 12.5);
    assert_eq!(chain.get_balance(&alice.address), chain.get_balance(&alice.address));
    assert_eq!(chain.get_balance("unknown"), 0.0);
    assert_eq!(chain.get_balance("unknown"), 0.0);
}

#[test]
fn staked_amount_is_visible_through_lookup() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 100.0);
    chain.stake(&alice.address, 42.0).unwrap();

    let validator = chain.get_validator(&alice.address).unwrap();
    assert_eq!(validator.staked_amount, 42.0);
    assert_eq!(validator.slash_count, 0);

    let err = chain.get_validator("nobody").unwrap_err();
    assert_eq!(err, ChainError::ValidatorNotFound("nobody".to_string()));
}

#[test]
fn staked_mode_rewards_validators_only() {
    let chain = ledger();
    let v = funded_wallet(&chain, 100.0);
    chain.stake(&v.address, 50.0).unwrap();

    let err = chain.produce_block("outsider").unwrap_err();
    assert_eq!(err, ChainError::NotAValidator("outsider".to_string()));

    chain.produce_block(&v.address).unwrap();
    assert_eq!(chain.get_balance(&v.address), 55.0);
    assert_eq!(chain.get_validator(&v.address).unwrap().total_rewards, 5.0);
}

#[test]
fn lottery_refuses_unselected_candidates() {
    let chain = ledger();
    for _ in 0..3 {
        let v = funded_wallet(&chain, 100.0);
        chain.stake(&v.address, 25.0).unwrap();
    }

    let mut rng = StdRng::seed_from_u64(11);
    let err = chain
        .produce_selected_block_with("stranger", &mut rng)
        .unwrap_err();
    match err {
        ChainError::NotSelectedValidator { candidate, selected } => {
            assert_eq!(candidate, "stranger");
            assert!(chain.get_validator(&selected).is_ok());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(chain.chain_len(), 1);
}

#[test]
fn slashed_stake_is_refunded_on_unstake() {
    let chain = ledger();
    let v = funded_wallet(&chain, 100.0);
    chain.stake(&v.address, 100.0).unwrap();

    let slashed = chain.slash_validator(&v.address).unwrap();
    assert_eq!(slashed.staked_amount, 90.0);

    let refunded = chain.unstake(&v.address).unwrap();
    assert_eq!(refunded, 90.0);
    assert_eq!(chain.get_balance(&v.address), 90.0);
    assert!(chain.get_validators().is_empty());
}

#[test]
fn refused_stake_leaves_balance_alone() {
    let chain = ledger();
    let alice = funded_wallet(&chain, 50.0);

    assert!(matches!(
        chain.stake(&alice.address, 5.0),
        Err(ChainError::BelowMinimumStake { .. })
    ));
    assert!(matches!(
        chain.stake(&alice.address, 80.0),
        Err(ChainError::InsufficientStakeBalance { .. })
    ));
    assert_eq!(chain.get_balance(&alice.address), 50.0);
    assert!(chain.get_validators().is_empty());
}

#[test]
fn concurrent_admission_and_production_stay_consistent() {
    let chain = Arc::new(ledger());
    let senders: Vec<Wallet> = (0..4).map(|_| funded_wallet(&chain, 100.0)).collect();

    let handles: Vec<_> = senders
        .into_iter()
        .map(|wallet| {
            let chain = Arc::clone(&chain);
            thread::spawn(move || {
                for i in 0..10u32 {
                    let amount = 1.0 + f64::from(i) * 0.01;
                    let tx = wallet.create_transaction("sink", amount, 0.0).unwrap();
                    chain.admit_transaction(tx).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..5 {
        chain.produce_block("miner").unwrap();
    }
    for handle in handles {
        handle.join().unwrap();
    }
    chain.produce_block("miner").unwrap();

    assert_eq!(chain.pending_count(), 0);
    assert!(chain.verify_chain_integrity());
    let expected = 4.0 * (10.0 + 0.45);
    assert!((chain.get_balance("sink") - expected).abs() < 1e-9);
}
