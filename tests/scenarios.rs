//! End-to-end scenarios over the reducer and the persistence adapter.

use receipt_scan::{
    dialog::Dialog,
    guard,
    persistence::{self, SessionStore},
    reducer::{Action, reduce},
    request::{BatchProgress, ImagePayload, Phase, ScanRequest},
    transaction::{TimeStamp, Transaction},
    utils,
};
use sled::open;

use tempfile::tempdir; // Use for test db cleanup.

fn image(tag: &str) -> ImagePayload {
    ImagePayload::new("image/jpeg", tag.as_bytes().to_vec())
}

fn apply_all(state: ScanRequest, actions: Vec<Action>) -> ScanRequest {
    actions
        .into_iter()
        .fold(state, |state, action| reduce(&state, action))
}

#[test]
fn single_scan_reaches_review() {
    let state = apply_all(
        ScanRequest::idle(),
        vec![
            Action::StartSingle { at: TimeStamp::new() },
            Action::AddImage(image("img1")),
            Action::ProcessStart,
            Action::ProcessSuccess(Transaction::new().set_merchant("Acme").set_total(10)),
        ],
    );

    assert_eq!(state.phase, Phase::Reviewing);
    assert_eq!(
        state.results,
        vec![Transaction::new().set_merchant("Acme").set_total(10)]
    );
}

#[test]
fn batch_of_three_becomes_completable() {
    let mut state = apply_all(
        ScanRequest::idle(),
        vec![
            Action::StartBatch { at: TimeStamp::new() },
            Action::AddImage(image("a")),
            Action::AddImage(image("b")),
            Action::AddImage(image("c")),
        ],
    );
    for index in 0..3 {
        state = apply_all(
            state,
            vec![
                Action::BatchItemStart { index },
                Action::BatchItemSuccess {
                    index,
                    transaction: Transaction::new().set_total(index as i64 + 1),
                },
            ],
        );
    }

    assert_eq!(
        state.batch_progress,
        Some(BatchProgress {
            completed: 3,
            failed: 0,
            total: 3
        })
    );

    let completed = reduce(&state, Action::BatchComplete);
    assert_ne!(completed, state);
    assert_eq!(completed.phase, Phase::Reviewing);
    assert_eq!(completed.results.len(), 3);
}

#[test]
fn second_dialog_is_rejected_while_one_is_open() {
    let reviewing = apply_all(
        ScanRequest::idle(),
        vec![
            Action::StartSingle { at: TimeStamp::new() },
            Action::AddImage(image("img1")),
            Action::ProcessStart,
            Action::ProcessSuccess(Transaction::new().set_currency("EUR").set_total(4)),
        ],
    );
    let mismatch = Dialog::CurrencyMismatch {
        detected: "EUR".into(),
        expected: "USD".into(),
    };

    let once = reduce(&reviewing, Action::ShowDialog(mismatch.clone()));
    let twice = reduce(&once, Action::ShowDialog(mismatch));

    assert_eq!(once.phase, Phase::Dialog);
    assert_eq!(twice, once);
    assert!(guard::is_blocking(&twice));
}

#[test]
fn corrupt_payload_loads_as_nothing() -> anyhow::Result<()> {
    // Sled locks its directory, so every test gets its own temp db.
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join("corrupt_payload.db"))?;
    let store = SessionStore::new(&db)?;
    let user_id = utils::new_prefixed_id("user_")?;

    let state = apply_all(
        ScanRequest::idle(),
        vec![
            Action::StartSingle { at: TimeStamp::new() },
            Action::AddImage(image("img1")),
        ],
    );
    store.save(&user_id, &state);
    assert_eq!(store.load(&user_id), Some(state));

    let tree = db.open_tree(persistence::SESSION_TREE)?;
    tree.insert(persistence::session_key(&user_id), &b"\x9f\xff\x00garbage"[..])?;

    assert_eq!(store.load(&user_id), None);
    assert!(tree.get(persistence::session_key(&user_id))?.is_none());

    Ok(())
}

#[test]
fn late_success_after_cancel_is_ignored() {
    let cancelled = apply_all(
        ScanRequest::idle(),
        vec![
            Action::StartSingle { at: TimeStamp::new() },
            Action::AddImage(image("img1")),
            Action::ProcessStart,
            Action::Cancel,
        ],
    );
    let late = reduce(
        &cancelled,
        Action::ProcessSuccess(Transaction::new().set_merchant("Acme")),
    );

    assert_eq!(late, ScanRequest::idle());
    assert!(late.is_idle());
}

#[test]
fn restart_resumes_unsaved_review() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join("restart_resumes.db"))?;
    let user_id = utils::new_prefixed_id("user_")?;

    let reviewing = apply_all(
        ScanRequest::idle(),
        vec![
            Action::StartSingle {
                at: TimeStamp::new_with(2024, 1, 2, 3, 4, 5),
            },
            Action::AddImage(image("img1")),
            Action::ProcessStart,
            Action::ProcessSuccess(Transaction::new().set_merchant("Corner Shop").set_total(250)),
        ],
    );
    SessionStore::new(&db)?.save(&user_id, &reviewing);
    db.flush()?;
    drop(db);

    // a fresh handle stands in for the restarted process
    let db = open(temp_dir.path().join("restart_resumes.db"))?;
    let restored = SessionStore::new(&db)?.load(&user_id);
    assert_eq!(restored, Some(reviewing));

    Ok(())
}
