//! Legacy session formats and crash recovery
//!
//! Before single and batch scans shared one request type, each kept its own
//! record under its own key. [`legacy_to_current`] turns either shape into a
//! [`ScanRequest`]; it runs once at load, ahead of the envelope decoder.
//! [`recover_interrupted`] then rewinds any step that was suspended when the
//! process died, since its async half is gone.
use super::batch;
use super::dialog::DialogKind;
use super::request::{
    BatchReceipt, ImagePayload, MAX_IMAGES, Mode, Phase, ReceiptStatus, ScanRequest,
};
use super::transaction::{TimeStamp, Transaction};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyStep {
    #[n(0)]
    Capture,
    #[n(1)]
    Analyzing,
    #[n(2)]
    Review,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LegacySingleScan {
    #[n(0)]
    pub images: Vec<ImagePayload>,
    #[n(1)]
    pub result: Option<Transaction>,
    #[n(2)]
    pub step: LegacyStep,
    #[n(3)]
    pub saved_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LegacyBatchItem {
    #[n(0)]
    pub image: ImagePayload,
    #[n(1)]
    pub result: Option<Transaction>,
    #[n(2)]
    pub error: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LegacyBatchScan {
    #[n(0)]
    pub items: Vec<LegacyBatchItem>,
    #[n(1)]
    pub saved_at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyRecord {
    Single(LegacySingleScan),
    Batch(LegacyBatchScan),
}

pub fn legacy_to_current(raw: LegacyRecord) -> Option<ScanRequest> {
    let migrated = match raw {
        LegacyRecord::Single(scan) => from_single(scan)?,
        LegacyRecord::Batch(scan) => from_batch(scan)?,
    };
    migrated.is_consistent().then_some(migrated)
}

fn from_single(scan: LegacySingleScan) -> Option<ScanRequest> {
    let images = dedup_capped(scan.images);
    if images.is_empty() && scan.result.is_none() {
        return None;
    }
    // a record that never got a result, analysing or not, restarts capture
    let (phase, results) = match scan.result {
        Some(result) => (Phase::Reviewing, vec![result]),
        None => (Phase::Capturing, vec![]),
    };
    Some(ScanRequest {
        phase,
        mode: Mode::Single,
        images,
        results,
        started_at: Some(scan.saved_at),
        ..ScanRequest::idle()
    })
}

fn from_batch(scan: LegacyBatchScan) -> Option<ScanRequest> {
    let mut images = Vec::new();
    let mut receipts = Vec::new();
    for item in scan.items {
        if images.len() == MAX_IMAGES {
            break;
        }
        if images.iter().any(|i: &ImagePayload| i.id == item.image.id) {
            continue;
        }
        let status = match (&item.result, &item.error) {
            (Some(_), _) => ReceiptStatus::Done,
            (None, Some(_)) => ReceiptStatus::Error,
            (None, None) => ReceiptStatus::Pending,
        };
        receipts.push(BatchReceipt {
            image_id: item.image.id.clone(),
            status,
            result: item.result,
            error: if status == ReceiptStatus::Done {
                None
            } else {
                item.error
            },
        });
        images.push(item.image);
    }
    if receipts.is_empty() {
        return None;
    }

    let complete = batch::is_complete(&receipts);
    Some(ScanRequest {
        phase: if complete {
            Phase::Reviewing
        } else {
            Phase::Capturing
        },
        mode: Mode::Batch,
        images,
        results: if complete {
            batch::done_results(&receipts)
        } else {
            vec![]
        },
        batch_progress: Some(batch::progress_of(&receipts)),
        batch_receipts: Some(receipts),
        started_at: Some(scan.saved_at),
        ..ScanRequest::idle()
    })
}

fn dedup_capped(images: Vec<ImagePayload>) -> Vec<ImagePayload> {
    let mut kept: Vec<ImagePayload> = Vec::with_capacity(images.len().min(MAX_IMAGES));
    for image in images {
        if kept.len() == MAX_IMAGES {
            break;
        }
        if !kept.iter().any(|k| k.id == image.id) {
            kept.push(image);
        }
    }
    kept
}

/// A restored request with its suspended steps rewound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub state: ScanRequest,
    /// Extraction calls that held a credit reservation when the process
    /// stopped. Their results will never arrive.
    pub interrupted: u32,
}

pub fn recover_interrupted(mut state: ScanRequest) -> Recovered {
    let mut interrupted = 0;

    // the completion prompt only appears once the store write succeeded
    if let Some(active) = &state.active_dialog {
        if active.return_to == Phase::Saving && active.dialog.kind() == DialogKind::ScanComplete {
            return Recovered {
                state: ScanRequest::idle(),
                interrupted,
            };
        }
    }

    if let Some(receipts) = state.batch_receipts.as_mut() {
        for receipt in receipts.iter_mut() {
            if receipt.status == ReceiptStatus::Processing {
                receipt.status = ReceiptStatus::Pending;
                interrupted += 1;
            }
        }
        state.batch_progress = Some(batch::progress_of(receipts));
    }

    match state.effective_phase() {
        Phase::Processing => {
            if state.mode != Mode::Batch {
                interrupted += 1;
            }
            state.active_dialog = None;
            state.phase = Phase::Capturing;

            // every item landed before the batch was marked complete
            if let Some(receipts) = state.batch_receipts.as_deref() {
                if batch::is_complete(receipts) {
                    state.results = batch::done_results(receipts);
                    state.resolved_dialogs.clear();
                    state.phase = Phase::Reviewing;
                }
            }
        }
        Phase::Saving => {
            state.active_dialog = None;
            state.phase = Phase::Reviewing;
        }
        _ => {}
    }

    Recovered { state, interrupted }
}
