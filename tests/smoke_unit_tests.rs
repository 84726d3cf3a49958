//! Smoke Screen Unit tests for receipt scan components
//!
//! These tests are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. These are intended as smoke-screen
//! and generally test the happy-path.
//!
#![allow(unused_imports)]

use chrono::{Datelike, Timelike, Utc};
use receipt_scan::{
    batch,
    config::ScanConfig,
    dialog::{self, Dialog, DialogKind, DialogPolicy, DialogResolution, TotalChoice},
    guard::{self, CaptureGate},
    migration::{self, LegacyBatchItem, LegacyBatchScan, LegacyRecord},
    persistence::{Envelope, SCHEMA_VERSION},
    reducer::{Action, reduce},
    request::{BatchReceipt, ImagePayload, Mode, Phase, ReceiptStatus, ScanRequest},
    transaction::{TimeStamp, Transaction},
    utils::new_prefixed_id,
};

fn image(n: u8) -> ImagePayload {
    ImagePayload::new("image/webp", vec![n; 8])
}

fn run(actions: Vec<Action>) -> ScanRequest {
    actions
        .into_iter()
        .fold(ScanRequest::idle(), |state, action| reduce(&state, action))
}

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_prefixed_id generates bech32 strings carrying the prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_prefixed_id("txn_").unwrap();
        assert!(encoded.starts_with("txn_1"));
        assert!(encoded.len() > 10);
    }

    /// Test that different HRPs produce different encoded strings
    #[test]
    fn different_hrps_produce_different_encodings() {
        let txn_id = new_prefixed_id("txn_").unwrap();
        let user_id = new_prefixed_id("user_").unwrap();

        assert!(user_id.starts_with("user_"));
        assert_ne!(txn_id, user_id);
    }
}

// TRANSACTION MODULE TESTS
#[cfg(test)]
mod transaction_tests {
    use super::*;

    /// Test that TimeStamp::new() creates a timestamp close to current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    /// Test that TimeStamp keeps calendar fields and survives epoch millis
    #[test]
    fn timestamp_new_with_specific_values() {
        let ts = TimeStamp::new_with(2025, 2, 14, 18, 30, 5);
        let dt = ts.to_datetime_utc();

        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 2, 14));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (18, 30, 5));
        assert_eq!(TimeStamp::from_millis(ts.as_millis()), Some(ts));
    }

    /// Test that the builder normalises currency codes
    #[test]
    fn builder_uppercases_currency() {
        let tx = Transaction::new()
            .set_merchant("Deli")
            .set_date("2025-02-14")
            .set_time("18:30")
            .set_currency("gbp")
            .set_category("food")
            .set_total(899);

        assert_eq!(tx.currency.as_deref(), Some("GBP"));
        assert_eq!(tx.date.as_deref(), Some("2025-02-14"));
        assert_eq!(tx.line_item_total(), None);
    }
}

// REQUEST MODULE TESTS
#[cfg(test)]
mod request_tests {
    use super::*;

    /// Test that a freshly started request is consistent
    #[test]
    fn started_request_is_consistent() {
        let state = run(vec![
            Action::StartBatch { at: TimeStamp::new() },
            Action::AddImage(image(1)),
        ]);
        assert!(state.is_consistent());
        assert_eq!(state.batch_receipts.as_ref().map(Vec::len), Some(1));
    }

    /// Test that the effective phase looks through an open dialog
    #[test]
    fn effective_phase_sees_through_dialog() {
        let state = run(vec![
            Action::StartSingle { at: TimeStamp::new() },
            Action::AddImage(image(1)),
            Action::ShowDialog(Dialog::CreditWarning { remaining: 1 }),
        ]);
        assert_eq!(state.phase, Phase::Dialog);
        assert_eq!(state.effective_phase(), Phase::Capturing);
    }
}

// BATCH MODULE TESTS
#[cfg(test)]
mod batch_tests {
    use super::*;

    /// Test that progress counts each terminal status once
    #[test]
    fn progress_counts_terminal_items() {
        let mut receipts = vec![
            BatchReceipt::pending("a"),
            BatchReceipt::pending("b"),
            BatchReceipt::pending("c"),
        ];
        receipts[0].status = ReceiptStatus::Done;
        receipts[1].status = ReceiptStatus::Error;

        let progress = batch::progress_of(&receipts);
        assert_eq!((progress.completed, progress.failed, progress.total), (1, 1, 3));
        assert!(!batch::is_complete(&receipts));
    }

    /// Test that an empty batch is never complete
    #[test]
    fn empty_batch_is_not_complete() {
        assert!(!batch::is_complete(&[]));
    }
}

// DIALOG MODULE TESTS
#[cfg(test)]
mod dialog_tests {
    use super::*;

    /// Test that a completed batch asks how to continue
    #[test]
    fn completed_batch_raises_batch_complete() {
        let mut state = run(vec![
            Action::StartBatch { at: TimeStamp::new() },
            Action::AddImage(image(1)),
            Action::BatchItemStart { index: 0 },
            Action::BatchItemError {
                index: 0,
                message: "blurry".into(),
            },
        ]);
        state = reduce(&state, Action::BatchComplete);

        assert_eq!(state.phase, Phase::Reviewing);
        assert_eq!(
            dialog::next_dialog(&state, &DialogPolicy::default()),
            Some(Dialog::BatchComplete {
                completed: 0,
                failed: 1
            })
        );
    }

    /// Test that resolutions report the kind they answer
    #[test]
    fn resolution_kinds_match_dialogs() {
        let resolution = DialogResolution::TotalMismatch(TotalChoice::KeepExtracted);
        let dialog = Dialog::TotalMismatch {
            extracted: 1,
            computed: 2,
        };
        assert_eq!(resolution.kind(), dialog.kind());
        assert_eq!(resolution.kind(), DialogKind::TotalMismatch);
    }
}

// GUARD MODULE TESTS
#[cfg(test)]
mod guard_tests {
    use super::*;

    /// Test that a capture request while idle may start a scan
    #[test]
    fn idle_allows_capture() {
        let state = ScanRequest::idle();
        assert!(guard::can_start_new_capture(&state));
        assert_eq!(guard::capture_gate(&state), CaptureGate::Start);
    }

    /// Test that a batch in progress redirects capture requests
    #[test]
    fn batch_in_progress_redirects() {
        let state = run(vec![Action::StartBatch { at: TimeStamp::new() }]);
        let CaptureGate::Resume { mode, notice, .. } = guard::capture_gate(&state) else {
            panic!("expected a resume gate");
        };
        assert_eq!(mode, Mode::Batch);
        assert!(notice.contains("batch scan"));
    }
}

// MIGRATION MODULE TESTS
#[cfg(test)]
mod migration_tests {
    use super::*;

    /// Test that a legacy batch with every item finished lands in review
    #[test]
    fn finished_legacy_batch_lands_in_review() {
        let legacy = LegacyBatchScan {
            items: vec![LegacyBatchItem {
                image: image(4),
                result: Some(Transaction::new().set_total(12)),
                error: None,
            }],
            saved_at: TimeStamp::new(),
        };
        let state = migration::legacy_to_current(LegacyRecord::Batch(legacy)).unwrap();

        assert_eq!(state.mode, Mode::Batch);
        assert_eq!(state.phase, Phase::Reviewing);
        assert_eq!(state.results.len(), 1);
    }
}

// PERSISTENCE MODULE TESTS
#[cfg(test)]
mod persistence_tests {
    use super::*;

    /// Test that an envelope decodes back to the request it carried
    #[test]
    fn envelope_carries_state() {
        let state = run(vec![
            Action::StartStatement {
                at: TimeStamp::new_with(2025, 1, 1, 0, 0, 0),
            },
            Action::AddImage(image(2)),
        ]);
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            saved_at: TimeStamp::new(),
            state: state.clone(),
        };

        let cbor = minicbor::to_vec(&envelope).unwrap();
        let decoded: Envelope = minicbor::decode(&cbor).unwrap();
        assert_eq!(decoded.state, state);
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;

    /// Test that config settings flow into dialog policy and hints
    #[test]
    fn config_feeds_policy_and_hints() {
        let config = ScanConfig::new()
            .set_default_currency("cad")
            .set_store_type("grocery")
            .set_quick_save(false);

        let policy = config.dialog_policy();
        assert_eq!(policy.default_currency.as_deref(), Some("CAD"));
        assert!(!policy.quick_save);
        assert_eq!(config.hints().store_type.as_deref(), Some("grocery"));
    }
}
