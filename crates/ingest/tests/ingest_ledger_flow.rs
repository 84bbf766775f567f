//! Cross-crate flow: ingestion feeding the ledger, then admin reversal.

use std::sync::Arc;

use tally_core::{Actor, Amount, TallyConfig};
use tally_ingest::{IngestOutcome, IngestPipeline, LogNotifier, ParsedEvent, SourceKind};
use tally_ledger::{LedgerEngine, LedgerError, ReleaseOutcome};
use tally_store::{ProcessedStatus, Store, TrustState};

fn config() -> TallyConfig {
    TallyConfig {
        operators: vec![1001, 2002],
        ..TallyConfig::default()
    }
}

fn setup() -> (Store, IngestPipeline, LedgerEngine) {
    let store = Store::in_memory().unwrap();
    let config = config();
    let pipeline = IngestPipeline::new(store.clone(), &config, Arc::new(LogNotifier));
    let engine = LedgerEngine::new(store.clone(), &config);
    (store, pipeline, engine)
}

fn event(event_id: &str, identity_key: &str, minor: i64) -> ParsedEvent {
    ParsedEvent {
        event_id: event_id.to_string(),
        source_ref: None,
        identity_key: identity_key.to_string(),
        identity_display: None,
        amount: Amount::from_minor_units_unchecked(minor),
        event_time: None,
        source_kind: SourceKind::Email,
        secondary_key: None,
    }
}

#[test]
fn ingested_adds_release_like_manual_ones() {
    let (store, pipeline, engine) = setup();
    pipeline.process(&event("e1", "jane@bank", 60_000)).unwrap();
    pipeline.process(&event("e2", "sam@bank", 40_000)).unwrap();

    let ReleaseOutcome::Released(summary) = engine.release(Actor::Operator(1001)).unwrap() else {
        panic!("expected a release");
    };
    // $1000 at 2% + $0.30 flat
    assert_eq!(summary.breakdown.total.minor_units(), 100_000);
    assert_eq!(summary.breakdown.fee.minor_units(), 2_000);
    assert_eq!(summary.breakdown.net.minor_units(), 97_970);

    let state = store.with_tx(|tx| tx.global_state()).unwrap();
    assert_eq!(state.total.minor_units(), 0);
    assert_eq!(state.session_id, 2);
}

#[test]
fn reversal_of_ingested_add_blocks_the_sender() {
    let (store, pipeline, engine) = setup();
    let outcome = pipeline.process(&event("e1", "mallory@bank", 25_000)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Added { .. }));

    let receipt = engine
        .reverse("e1", Actor::Operator(1001), Some("charge disputed"), true)
        .unwrap();
    assert_eq!(receipt.amount.minor_units(), 25_000);
    assert_eq!(receipt.new_total.minor_units(), 0);
    assert!(receipt.sender_blocked);

    // A second reversal of the same event is a conflict
    let again = engine.reverse("e1", Actor::Operator(1001), None, false);
    assert!(matches!(again, Err(LedgerError::AlreadyReversed(_))));

    // The blocked sender's next event never reaches the ledger
    let next = pipeline.process(&event("e2", "mallory@bank", 9_000)).unwrap();
    assert_eq!(next, IngestOutcome::Blocked);
    let state = store.with_tx(|tx| tx.global_state()).unwrap();
    assert_eq!(state.total.minor_units(), 0);

    let trust = store
        .with_tx(|tx| tx.sender_trust("mallory@bank"))
        .unwrap()
        .unwrap();
    assert_eq!(trust.state, TrustState::Blocked);
}

#[test]
fn shadow_rows_are_not_reversible() {
    let (store, pipeline, engine) = setup();
    store
        .with_tx(|tx| tx.set_tracking_mode(tally_store::TrackingMode::Manual))
        .unwrap();
    let outcome = pipeline.process(&event("e1", "jane@bank", 5_000)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Shadow { .. }));

    let result = engine.reverse("e1", Actor::Operator(1001), None, false);
    assert!(matches!(result, Err(LedgerError::NotReversible(_))));

    let row = store
        .with_tx(|tx| tx.processed_message("e1"))
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ProcessedStatus::QuarantinedUnknownSender);
}
