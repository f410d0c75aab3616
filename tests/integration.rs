use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::Address;
use pretty_assertions::assert_eq;

use agent_ledger::config::{StoreBackend, StoreConfig};
use agent_ledger::{
    AgentId, FileStore, KeyedStore, Ledger, LedgerConfig, LedgerError, LedgerEvent, SignerId,
    SignerSet, task_hash,
};

fn signer(byte: u8) -> SignerId {
    SignerId::new(Address::repeat_byte(byte))
}

fn signed_by(ids: &[SignerId]) -> SignerSet {
    SignerSet::trusted(ids.iter().copied())
}

fn register<S: KeyedStore>(ledger: &Ledger<S>, owner: SignerId) -> AgentId {
    ledger
        .register(&signed_by(&[owner]), owner, "https://agents.example/o.json")
        .unwrap()
        .agent_id()
}

// =============================================================================
// Recovery: a backup wallet takes over after the owner key is gone
// =============================================================================

#[test]
fn owner_loses_key_backup_recovers() {
    let ledger = Ledger::in_memory();
    let (owner, backup, second, stranger) = (signer(0x0a), signer(0x0b), signer(0x0c), signer(0xee));
    let agent_id = register(&ledger, owner);

    // Link needs both the authority and the wallet.
    let err = ledger
        .link_wallet(&signed_by(&[owner]), &agent_id, owner, backup)
        .unwrap_err();
    assert!(matches!(err, LedgerError::MissingSignature(s) if s == backup));
    ledger
        .link_wallet(&signed_by(&[owner, backup]), &agent_id, owner, backup)
        .unwrap();

    // From here on the owner never signs again.
    let identity = ledger
        .transfer_authority(&signed_by(&[backup]), &agent_id, backup)
        .unwrap();
    assert_eq!(identity.owner, owner);
    assert_eq!(identity.authority, backup);

    // The new authority can edit and extend the identity.
    ledger
        .update_metadata(&signed_by(&[backup]), &agent_id, backup, "https://agents.example/v2.json")
        .unwrap();
    ledger
        .link_wallet(&signed_by(&[backup, second]), &agent_id, backup, second)
        .unwrap();

    // The old key is locked out.
    let err = ledger
        .update_metadata(&signed_by(&[owner]), &agent_id, owner, "https://stale")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { signer, .. } if signer == owner));

    // Strangers cannot claim or prune.
    assert!(matches!(
        ledger.transfer_authority(&signed_by(&[stranger]), &agent_id, stranger),
        Err(LedgerError::NotFound { .. })
    ));
    assert!(matches!(
        ledger.unlink_wallet(&signed_by(&[stranger]), &agent_id, second, stranger),
        Err(LedgerError::Unauthorized { .. })
    ));

    // Authority keeps moving across linked wallets.
    let identity = ledger
        .transfer_authority(&signed_by(&[second]), &agent_id, second)
        .unwrap();
    assert_eq!(identity.authority, second);
    assert_eq!(identity.owner, owner);
    assert_eq!(identity.metadata_uri, "https://agents.example/v2.json");

    // Lookup by the original owner still finds the same record.
    assert_eq!(ledger.identity_by_owner(&owner).unwrap(), identity);
    assert_eq!(ledger.resolve_wallet(&backup).unwrap().0, agent_id);
}

#[test]
fn both_authority_and_wallet_can_unlink() {
    let ledger = Ledger::in_memory();
    let (owner, w1, w2) = (signer(1), signer(2), signer(3));
    let agent_id = register(&ledger, owner);
    for wallet in [w1, w2] {
        ledger
            .link_wallet(&signed_by(&[owner, wallet]), &agent_id, owner, wallet)
            .unwrap();
    }

    let removed = ledger
        .unlink_wallet(&signed_by(&[owner]), &agent_id, w1, owner)
        .unwrap();
    assert_eq!(removed.wallet, w1);
    let removed = ledger
        .unlink_wallet(&signed_by(&[w2]), &agent_id, w2, w2)
        .unwrap();
    assert_eq!(removed.wallet, w2);

    // Both are free to link again, here to a different identity.
    let other_owner = signer(4);
    let other_id = register(&ledger, other_owner);
    ledger
        .link_wallet(&signed_by(&[other_owner, w1]), &other_id, other_owner, w1)
        .unwrap();
    assert_eq!(ledger.wallet_link(&w1).unwrap().agent_id, other_id);
}

// =============================================================================
// Reputation and validation
// =============================================================================

#[test]
fn reputation_and_validation_flow() {
    let ledger = Ledger::in_memory();
    let (owner, reviewer, validator, late) = (signer(1), signer(2), signer(3), signer(4));
    let agent_id = register(&ledger, owner);

    let reputation = ledger
        .submit_feedback(&signed_by(&[reviewer]), &agent_id, reviewer, true, "fast")
        .unwrap();
    assert_eq!(reputation.reputation_score, 10_000);
    let reputation = ledger
        .submit_feedback(&signed_by(&[reviewer]), &agent_id, reviewer, false, "wrong answer")
        .unwrap();
    assert_eq!(reputation.reputation_score, 5_000);
    assert_eq!(reputation.total_interactions, 2);

    let task = task_hash(b"summarize report #42");
    let first = ledger
        .validate_work(&signed_by(&[validator]), &agent_id, validator, task, true, "ipfs://ok")
        .unwrap();
    let err = ledger
        .validate_work(&signed_by(&[late]), &agent_id, late, task, false, "ipfs://nope")
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists { .. }));
    assert_eq!(ledger.validation(&agent_id, &task).unwrap(), first);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn concurrent_registration_has_one_winner() {
    let ledger = Arc::new(Ledger::in_memory());
    let owner = signer(7);
    let wins = Arc::new(AtomicUsize::new(0));
    let losses = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            let wins = Arc::clone(&wins);
            let losses = Arc::clone(&losses);
            std::thread::spawn(move || {
                match ledger.register(&signed_by(&[owner]), owner, format!("https://race/{i}")) {
                    Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                    Err(LedgerError::AlreadyExists { .. }) => losses.fetch_add(1, Ordering::SeqCst),
                    Err(other) => panic!("unexpected error {other}"),
                };
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(losses.load(Ordering::SeqCst), 15);
    assert_eq!(ledger.store().len(), 1);
}

#[test]
fn concurrent_feedback_loses_no_updates() {
    let ledger = Ledger::in_memory();
    let agent_id = register(&ledger, signer(1));
    let ledger = Arc::new(ledger);

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                let reviewer = signer(0x20 + i);
                for _ in 0..10 {
                    ledger
                        .submit_feedback(&signed_by(&[reviewer]), &agent_id, reviewer, i % 2 == 0, "")
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reputation = ledger.reputation(&agent_id).unwrap().unwrap();
    assert_eq!(reputation.total_interactions, 80);
    assert_eq!(reputation.positive_feedback, 40);
    assert_eq!(reputation.reputation_score, 5_000);
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn events_follow_commits() {
    let ledger = Ledger::in_memory();
    let mut events = ledger.subscribe();
    let (owner, backup, stranger, validator) = (signer(1), signer(2), signer(3), signer(4));
    let task = task_hash("index the archive");
    let agent_id = register(&ledger, owner);

    // Rejected calls publish nothing.
    let _ = ledger.update_metadata(&signed_by(&[stranger]), &agent_id, stranger, "https://evil");
    let _ = ledger.link_wallet(&signed_by(&[owner]), &agent_id, owner, backup);
    let _ = ledger.transfer_authority(&signed_by(&[backup]), &agent_id, backup);
    let _ = ledger.unlink_wallet(&signed_by(&[owner]), &agent_id, stranger, owner);
    let _ = ledger.validate_work(&signed_by(&[owner]), &agent_id, validator, task, true, "");

    ledger
        .update_metadata(&signed_by(&[owner]), &agent_id, owner, "https://agents.example/v2.json")
        .unwrap();
    ledger
        .link_wallet(&signed_by(&[owner, backup]), &agent_id, owner, backup)
        .unwrap();
    ledger
        .transfer_authority(&signed_by(&[backup]), &agent_id, backup)
        .unwrap();
    ledger
        .submit_feedback(&signed_by(&[owner]), &agent_id, owner, true, "self-review")
        .unwrap();
    ledger
        .validate_work(&signed_by(&[validator]), &agent_id, validator, task, true, "ipfs://log")
        .unwrap();
    let _ = ledger.validate_work(&signed_by(&[validator]), &agent_id, validator, task, false, "");
    ledger
        .unlink_wallet(&signed_by(&[backup]), &agent_id, backup, backup)
        .unwrap();
    let _ = ledger.unlink_wallet(&signed_by(&[backup]), &agent_id, backup, backup);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(
        received,
        vec![
            LedgerEvent::AgentRegistered {
                agent_id,
                owner,
                metadata_uri: "https://agents.example/o.json".to_string(),
            },
            LedgerEvent::MetadataUpdated {
                agent_id,
                metadata_uri: "https://agents.example/v2.json".to_string(),
            },
            LedgerEvent::WalletLinked {
                agent_id,
                wallet: backup,
                linked_by: owner,
            },
            LedgerEvent::AuthorityTransferred {
                agent_id,
                previous: owner,
                authority: backup,
            },
            LedgerEvent::FeedbackSubmitted {
                agent_id,
                reviewer: owner,
                positive: true,
                comment: "self-review".to_string(),
                new_score: 10_000,
            },
            LedgerEvent::WorkValidated {
                agent_id,
                validator,
                task_hash: task,
                passed: true,
                evidence_uri: "ipfs://log".to_string(),
            },
            LedgerEvent::WalletUnlinked {
                agent_id,
                wallet: backup,
                removed_by: backup,
            },
        ]
    );
    assert!(received.iter().all(|e| *e.agent_id() == agent_id));
}

#[test]
fn concurrent_updates_publish_in_commit_order() {
    let ledger = Ledger::in_memory();
    let owner = signer(1);
    let agent_id = register(&ledger, owner);
    let mut events = ledger.subscribe();
    let ledger = Arc::new(ledger);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for i in 0..16 {
                    ledger
                        .update_metadata(&signed_by(&[owner]), &agent_id, owner, format!("https://t{t}/{i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut last = None;
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        if let LedgerEvent::MetadataUpdated { metadata_uri, .. } = event {
            last = Some(metadata_uri);
            count += 1;
        }
    }

    // The final event describes the final state.
    assert_eq!(count, 128);
    assert_eq!(last, Some(ledger.identity(&agent_id).unwrap().metadata_uri));
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn file_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig {
        store: StoreConfig {
            backend: StoreBackend::File,
            path: Some(dir.path().join("ledger.json")),
        },
        ..Default::default()
    };
    let (owner, backup) = (signer(1), signer(2));
    let task = task_hash("persisted task");

    let agent_id = {
        let ledger = Ledger::open(&config).unwrap();
        let agent_id = register(&ledger, owner);
        ledger
            .link_wallet(&signed_by(&[owner, backup]), &agent_id, owner, backup)
            .unwrap();
        ledger
            .transfer_authority(&signed_by(&[backup]), &agent_id, backup)
            .unwrap();
        ledger
            .validate_work(&signed_by(&[owner]), &agent_id, owner, task, true, "")
            .unwrap();
        agent_id
    };

    let ledger = Ledger::open(&config).unwrap();
    let identity = ledger.identity(&agent_id).unwrap();
    assert_eq!(identity.authority, backup);
    assert_eq!(ledger.resolve_wallet(&backup).unwrap().0, agent_id);
    assert!(ledger.validation(&agent_id, &task).unwrap().passed);

    // Replay protection holds across restarts.
    assert!(matches!(
        ledger.validate_work(&signed_by(&[backup]), &agent_id, backup, task, false, ""),
        Err(LedgerError::AlreadyExists { .. })
    ));
}

#[test]
fn file_store_can_be_injected_directly() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("direct.json")).unwrap();
    let ledger = Ledger::new(store, &LedgerConfig::default());

    register(&ledger, signer(1));
    assert_eq!(ledger.store().len(), 1);
    assert!(dir.path().join("direct.json").exists());
}
