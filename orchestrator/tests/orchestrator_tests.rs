mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::time::Duration;
use zkapp_lib::{AccountLookup, Field};
use zkapp_orchestrator::{
    Notice, Phase, PipelineStage, PollOutcome, RefreshOutcome, SetupOutcome, SubmitOutcome,
};

#[tokio::test]
async fn test_setup_runs_steps_in_order() {
    let h = Harness::ready(5);

    let outcome = h.orchestrator.setup().await;
    assert_eq!(
        outcome,
        SetupOutcome::Ready {
            funded: true,
            counter: Some(Field::new(5))
        }
    );
    assert_eq!(
        h.ops(),
        vec![
            "initialize",
            "set_network",
            "load_program",
            "compile_program",
            "bind_instance",
            "read_observable"
        ]
    );

    let session = h.orchestrator.session();
    assert!(session.setup_complete);
    assert_eq!(session.wallet_detected, Some(true));
    assert_eq!(session.local_account_key, Some(local_key()));
    assert_eq!(session.contract_account_key, Some(zkapp_key()));
    assert_eq!(session.phase(), Phase::Funded);
    assert_eq!(h.orchestrator.setup().await, SetupOutcome::AlreadyComplete);
}

#[tokio::test]
async fn test_compile_precedes_prove() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;

    let outcome = h.orchestrator.submit_transaction().await;
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));

    let ops = h.ops();
    let compile = ops.iter().position(|op| *op == "compile_program").unwrap();
    let prove = ops.iter().position(|op| *op == "prove").unwrap();
    assert!(compile < prove);
    assert_eq!(&ops[ops.len() - 3..], &["build", "prove", "serialize"]);
}

#[tokio::test]
async fn test_submit_reports_hash_and_explorer_link() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;

    let outcome = h.orchestrator.submit_transaction().await;
    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            hash: zkapp_lib::TxHash::new(STUB_HASH),
            explorer_url: Some(format!(
                "https://berkeley.minaexplorer.com/transaction/{STUB_HASH}"
            )),
        }
    );

    let sent = h.wallet().last_sent.lock().clone().unwrap();
    assert_eq!(sent.fee_payer.fee, 0.1);
    assert!(sent.fee_payer.memo.is_empty());
    let command: serde_json::Value = serde_json::from_str(&sent.transaction).unwrap();
    assert_eq!(command["feePayer"]["body"]["publicKey"], LOCAL);
    assert_eq!(command["accountUpdates"][0]["body"]["update"]["appState"][0], "7");

    let session = h.orchestrator.session();
    assert_eq!(session.last_transaction.as_ref().map(|t| t.as_str()), Some(STUB_HASH));
    assert!(!session.transaction_in_flight);
    assert!(h
        .orchestrator
        .status()
        .last_transaction
        .unwrap()
        .ends_with(STUB_HASH));
}

#[tokio::test]
async fn test_no_reentrant_submission() {
    let h = Harness::ready(1);
    h.orchestrator.setup().await;

    let (first, second) = tokio::join!(
        h.orchestrator.submit_transaction(),
        h.orchestrator.submit_transaction()
    );

    assert!(matches!(first, SubmitOutcome::Submitted { .. }));
    assert_eq!(second, SubmitOutcome::AlreadyInFlight);
    assert_eq!(h.count("build"), 1);
    assert_eq!(h.wallet().submit_count(), 1);
    assert!(!h.orchestrator.session().transaction_in_flight);
}

#[tokio::test]
async fn test_wallet_absence_is_terminal() {
    let ledger = ScriptedLedger::new()
        .script(&local_key(), vec![funded_local()])
        .script(&zkapp_key(), vec![contract_with(3)]);
    let h = Harness::new(ledger, None);

    assert_eq!(h.orchestrator.setup().await, SetupOutcome::WalletAbsent);

    let session = h.orchestrator.session();
    assert!(session.setup_complete);
    assert_eq!(session.wallet_detected, Some(false));
    assert_eq!(session.notice, Some(Notice::WalletMissing));
    assert_eq!(session.phase(), Phase::WalletAbsent);
    assert_eq!(h.ops(), vec!["initialize", "set_network"]);

    assert_eq!(h.orchestrator.poll_account_funding().await, PollOutcome::NotReady);
    assert_eq!(h.orchestrator.submit_transaction().await, SubmitOutcome::NotReady);
    assert_eq!(h.orchestrator.refresh_observed_value().await, RefreshOutcome::NotReady);
    assert_eq!(h.orchestrator.setup().await, SetupOutcome::AlreadyComplete);

    assert_eq!(h.ledger.lookups(&local_key()), 0);
    assert_eq!(h.ledger.total_lookups(), 0);
    assert!(h.orchestrator.status().wallet_missing.is_some());
}

#[tokio::test]
async fn test_poll_stops_after_first_found() {
    let not_found = AccountLookup::NotFound;
    let ledger = ScriptedLedger::new()
        .script(
            &local_key(),
            vec![
                not_found.clone(),
                not_found.clone(),
                not_found.clone(),
                not_found,
                funded_local(),
            ],
        )
        .script(&zkapp_key(), vec![contract_with(0)]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));

    assert_eq!(
        h.orchestrator.setup().await,
        SetupOutcome::Ready {
            funded: false,
            counter: Some(Field::ZERO)
        }
    );
    assert_eq!(h.ledger.lookups(&local_key()), 1);
    assert_eq!(h.orchestrator.session().phase(), Phase::AwaitingFunding);
    assert!(h.orchestrator.status().account_unfunded.is_some());

    let outcome = h.orchestrator.poll_account_funding().await;
    assert_eq!(outcome, PollOutcome::Funded { attempts: 4 });
    assert_eq!(h.ledger.lookups(&local_key()), 5);

    let session = h.orchestrator.session();
    assert!(session.account_confirmed_funded);
    assert!(!session.poll_in_progress);
    assert_eq!(h.orchestrator.poll_account_funding().await, PollOutcome::AlreadyFunded);
}

#[tokio::test]
async fn test_transient_errors_never_fund() {
    let flaky = AccountLookup::TransientError("connection reset".to_string());
    let ledger = ScriptedLedger::new()
        .script(
            &local_key(),
            vec![flaky.clone(), flaky.clone(), flaky, funded_local()],
        )
        .script(&zkapp_key(), vec![contract_with(0)]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));

    assert!(matches!(
        h.orchestrator.setup().await,
        SetupOutcome::Ready { funded: false, .. }
    ));
    assert_eq!(h.orchestrator.submit_transaction().await, SubmitOutcome::NotReady);

    assert_eq!(
        h.orchestrator.poll_account_funding().await,
        PollOutcome::Funded { attempts: 3 }
    );
}

#[tokio::test]
async fn test_funding_is_monotonic() {
    let ledger = ScriptedLedger::new()
        .script(
            &local_key(),
            vec![AccountLookup::NotFound, funded_local(), AccountLookup::NotFound],
        )
        .script(&zkapp_key(), vec![contract_with(2)]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));

    h.orchestrator.setup().await;
    assert!(!h.orchestrator.session().account_confirmed_funded);
    assert_eq!(
        h.orchestrator.poll_account_funding().await,
        PollOutcome::Funded { attempts: 1 }
    );

    // The account vanishes from the ledger's view afterwards.
    let outcome = h.orchestrator.submit_transaction().await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Failed {
            stage: PipelineStage::RefreshAccount,
            ..
        }
    ));
    h.orchestrator.refresh_observed_value().await;

    let session = h.orchestrator.session();
    assert!(session.account_confirmed_funded);
    assert_eq!(session.phase(), Phase::Funded);
    assert_eq!(h.count("build"), 0);
}

#[tokio::test]
async fn test_prover_failure_resets_pipeline() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;
    h.fail_prove.store(true, Ordering::SeqCst);

    let outcome = h.orchestrator.submit_transaction().await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Failed {
            stage: PipelineStage::Prove,
            ..
        }
    ));

    let session = h.orchestrator.session();
    assert!(!session.transaction_in_flight);
    assert!(session.account_confirmed_funded);
    assert_eq!(session.observed_counter_value, Some(Field::new(5)));
    assert!(matches!(
        session.notice,
        Some(Notice::TransactionFailed {
            stage: PipelineStage::Prove,
            ..
        })
    ));
    assert_eq!(h.wallet().submit_count(), 0);

    // A new run starts from a fresh build.
    h.fail_prove.store(false, Ordering::SeqCst);
    assert!(matches!(
        h.orchestrator.submit_transaction().await,
        SubmitOutcome::Submitted { .. }
    ));
    assert_eq!(h.count("build"), 2);
    assert_eq!(h.orchestrator.session().notice, None);
}

#[tokio::test]
async fn test_disconnected_wallet_never_submits() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;
    h.wallet().connected.store(false, Ordering::SeqCst);

    assert_eq!(
        h.orchestrator.submit_transaction().await,
        SubmitOutcome::WalletDisconnected
    );
    assert_eq!(h.wallet().submit_count(), 0);
    assert_eq!(h.count("serialize"), 1);

    let session = h.orchestrator.session();
    assert!(!session.transaction_in_flight);
    assert_eq!(session.notice, Some(Notice::WalletDisconnected));
    assert!(session.last_transaction.is_none());
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;

    let first = h.orchestrator.refresh_observed_value().await;
    let second = h.orchestrator.refresh_observed_value().await;
    assert_eq!(first, RefreshOutcome::Updated(Field::new(5)));
    assert_eq!(first, second);
    assert_eq!(h.orchestrator.session().observed_counter_value, Some(Field::new(5)));
}

#[tokio::test]
async fn test_refresh_picks_up_new_value() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;

    h.ledger.rescript(&zkapp_key(), vec![contract_with(7)]);
    assert_eq!(
        h.orchestrator.refresh_observed_value().await,
        RefreshOutcome::Updated(Field::new(7))
    );
    assert_eq!(
        h.orchestrator.status().counter.as_deref(),
        Some("Current Number in zkApp 7")
    );
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_value() {
    let h = Harness::ready(5);
    h.orchestrator.setup().await;

    h.ledger.rescript(&zkapp_key(), vec![AccountLookup::NotFound]);
    assert!(matches!(
        h.orchestrator.refresh_observed_value().await,
        RefreshOutcome::Failed(_)
    ));

    let session = h.orchestrator.session();
    assert_eq!(session.observed_counter_value, Some(Field::new(5)));
    assert!(matches!(session.notice, Some(Notice::RefreshFailed(_))));
    assert!(!session.refresh_in_progress);
}

#[tokio::test]
async fn test_declined_consent_then_retry() {
    let h = Harness::ready(5);
    h.wallet().decline.store(true, Ordering::SeqCst);

    assert!(matches!(
        h.orchestrator.setup().await,
        SetupOutcome::Incomplete(_)
    ));
    let session = h.orchestrator.session();
    assert!(!session.setup_complete);
    assert_eq!(session.phase(), Phase::SetupIncomplete);
    assert_eq!(h.orchestrator.poll_account_funding().await, PollOutcome::NotReady);

    h.wallet().decline.store(false, Ordering::SeqCst);
    assert!(matches!(
        h.orchestrator.setup().await,
        SetupOutcome::Ready { funded: true, .. }
    ));
    assert_eq!(h.count("initialize"), 1);
    assert_eq!(h.count("set_network"), 1);
    assert_eq!(h.count("compile_program"), 1);
    assert_eq!(h.orchestrator.session().notice, None);
}

#[tokio::test]
async fn test_unparsable_account_halts_setup() {
    let ledger = ScriptedLedger::new();
    let h = Harness::new(ledger, Some(StubWallet::with_account("not-a-mina-address")));

    assert!(matches!(
        h.orchestrator.setup().await,
        SetupOutcome::Incomplete(_)
    ));
    assert_eq!(h.ledger.total_lookups(), 0);
}

#[tokio::test]
async fn test_missing_contract_account() {
    let ledger = ScriptedLedger::new().script(&local_key(), vec![funded_local()]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));

    assert_eq!(
        h.orchestrator.setup().await,
        SetupOutcome::Ready {
            funded: true,
            counter: None
        }
    );
    let session = h.orchestrator.session();
    assert!(session.setup_complete);
    assert_eq!(session.observed_counter_value, None);
    assert_eq!(session.notice, Some(Notice::ContractNotFound));
    assert_eq!(h.count("read_observable"), 0);
    assert_eq!(
        h.orchestrator.status().counter.as_deref(),
        Some("Current Number in zkApp unknown")
    );

    // Building needs the contract snapshot.
    assert!(matches!(
        h.orchestrator.submit_transaction().await,
        SubmitOutcome::Failed {
            stage: PipelineStage::Build,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_contract_is_not_reported_missing() {
    let ledger = ScriptedLedger::new()
        .script(&local_key(), vec![funded_local()])
        .script(&zkapp_key(), vec![AccountLookup::TransientError("timeout".into())]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));

    assert_eq!(
        h.orchestrator.setup().await,
        SetupOutcome::Ready {
            funded: true,
            counter: None
        }
    );
    let session = h.orchestrator.session();
    assert!(matches!(
        &session.notice,
        Some(Notice::ContractUnavailable(reason)) if reason.contains("timeout")
    ));
    let notice = h.orchestrator.status().notice.unwrap();
    assert!(!notice.contains("not found"));

    // Once the node answers, a refresh fills the value in and clears the notice.
    h.ledger.rescript(&zkapp_key(), vec![contract_with(9)]);
    assert_eq!(
        h.orchestrator.refresh_observed_value().await,
        RefreshOutcome::Updated(Field::new(9))
    );
    assert_eq!(h.orchestrator.session().notice, None);
}

#[tokio::test]
async fn test_wallet_without_accounts_halts_setup() {
    let wallet = StubWallet {
        accounts: Vec::new(),
        ..StubWallet::with_account(LOCAL)
    };
    let h = Harness::new(ScriptedLedger::new(), Some(wallet));

    let SetupOutcome::Incomplete(reason) = h.orchestrator.setup().await else {
        panic!("setup should halt without an account");
    };
    assert!(reason.contains("Wallet disclosed no accounts"));
    assert!(!h.orchestrator.session().setup_complete);
    assert_eq!(h.ledger.total_lookups(), 0);
}

#[tokio::test]
async fn test_poll_after_shutdown_issues_no_lookup() {
    let ledger = ScriptedLedger::new()
        .script(&local_key(), vec![AccountLookup::NotFound])
        .script(&zkapp_key(), vec![contract_with(0)]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));
    h.orchestrator.setup().await;
    let before = h.ledger.lookups(&local_key());

    h.orchestrator.shutdown();
    assert_eq!(
        h.orchestrator.poll_account_funding().await,
        PollOutcome::Cancelled { attempts: 0 }
    );
    assert_eq!(
        h.orchestrator.spawn_funding_poll().await.unwrap(),
        PollOutcome::Cancelled { attempts: 0 }
    );
    assert_eq!(h.ledger.lookups(&local_key()), before);
    assert!(!h.orchestrator.session().poll_in_progress);
}

#[tokio::test]
async fn test_spawned_poll_ends_with_its_owner() {
    let ledger = ScriptedLedger::new()
        .script(&local_key(), vec![AccountLookup::NotFound])
        .script(&zkapp_key(), vec![contract_with(0)]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));
    h.orchestrator.setup().await;

    let poll = h.orchestrator.spawn_funding_poll();
    tokio::time::sleep(Duration::from_millis(40)).await;
    let ledger = h.ledger.clone();
    assert!(ledger.lookups(&local_key()) >= 2);
    drop(h);

    let outcome = tokio::time::timeout(Duration::from_millis(500), poll)
        .await
        .expect("poll outlived the orchestrator")
        .unwrap();
    assert!(matches!(outcome, PollOutcome::Cancelled { .. }));

    let after = ledger.lookups(&local_key());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ledger.lookups(&local_key()), after);
}

#[tokio::test]
async fn test_shutdown_cancels_poll() {
    let ledger = ScriptedLedger::new()
        .script(&local_key(), vec![AccountLookup::NotFound])
        .script(&zkapp_key(), vec![contract_with(0)]);
    let h = Harness::new(ledger, Some(StubWallet::with_account(LOCAL)));
    h.orchestrator.setup().await;

    let poll = h.orchestrator.spawn_funding_poll();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(h.orchestrator.session().poll_in_progress);
    assert_eq!(
        h.orchestrator.poll_account_funding().await,
        PollOutcome::AlreadyRunning
    );

    h.orchestrator.shutdown();
    let outcome = poll.await.unwrap();
    assert!(matches!(outcome, PollOutcome::Cancelled { attempts } if attempts >= 1));

    let session = h.orchestrator.session();
    assert!(!session.account_confirmed_funded);
    assert!(!session.poll_in_progress);
    assert!(h.orchestrator.is_shut_down());
}

#[tokio::test]
async fn test_concurrent_setup_runs_once() {
    let h = Harness::ready(5);

    let (first, second) = tokio::join!(h.orchestrator.setup(), h.orchestrator.setup());
    assert!(matches!(first, SetupOutcome::Ready { .. }));
    assert_eq!(second, SetupOutcome::AlreadyRunning);
    assert_eq!(h.count("initialize"), 1);
}
