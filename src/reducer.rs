//! Scan request transitions
//!
//! [`reduce`] is the only place a [`ScanRequest`] changes. It is pure: no
//! clock, no I/O. Every async step is bridged by the service as a pair of
//! actions (`*Start` then `*Success` / `*Error`). An action that does not
//! apply to the current phase returns a structurally equal request so
//! subscribers can skip re-rendering.
use super::batch;
use super::dialog::{self, Dialog, DialogResolution, Outcome};
use super::request::{
    BatchReceipt, ImagePayload, MAX_IMAGES, Mode, Phase, ReceiptStatus, ScanFault, ScanRequest,
};
use super::transaction::{TimeStamp, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StartSingle { at: TimeStamp },
    StartBatch { at: TimeStamp },
    StartStatement { at: TimeStamp },
    AddImage(ImagePayload),
    RemoveImage { index: usize },
    SetImages(Vec<ImagePayload>),
    ProcessStart,
    ProcessSuccess(Transaction),
    ProcessError { message: String },
    ShowDialog(Dialog),
    ResolveDialog(DialogResolution),
    DismissDialog,
    BatchItemStart { index: usize },
    BatchItemSuccess { index: usize, transaction: Transaction },
    BatchItemError { index: usize, message: String },
    BatchComplete,
    SetBatchEditingIndex(Option<usize>),
    UpdateResult { index: usize, transaction: Transaction },
    EditBatchReceipt { index: usize, transaction: Transaction },
    SaveStart,
    SaveSuccess,
    SaveError { message: String },
    Cancel,
    Reset,
    RestoreState(Box<ScanRequest>),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartSingle { .. } => "START_SINGLE",
            Action::StartBatch { .. } => "START_BATCH",
            Action::StartStatement { .. } => "START_STATEMENT",
            Action::AddImage(_) => "ADD_IMAGE",
            Action::RemoveImage { .. } => "REMOVE_IMAGE",
            Action::SetImages(_) => "SET_IMAGES",
            Action::ProcessStart => "PROCESS_START",
            Action::ProcessSuccess(_) => "PROCESS_SUCCESS",
            Action::ProcessError { .. } => "PROCESS_ERROR",
            Action::ShowDialog(_) => "SHOW_DIALOG",
            Action::ResolveDialog(_) => "RESOLVE_DIALOG",
            Action::DismissDialog => "DISMISS_DIALOG",
            Action::BatchItemStart { .. } => "BATCH_ITEM_START",
            Action::BatchItemSuccess { .. } => "BATCH_ITEM_SUCCESS",
            Action::BatchItemError { .. } => "BATCH_ITEM_ERROR",
            Action::BatchComplete => "BATCH_COMPLETE",
            Action::SetBatchEditingIndex(_) => "SET_BATCH_EDITING_INDEX",
            Action::UpdateResult { .. } => "UPDATE_RESULT",
            Action::EditBatchReceipt { .. } => "EDIT_BATCH_RECEIPT",
            Action::SaveStart => "SAVE_START",
            Action::SaveSuccess => "SAVE_SUCCESS",
            Action::SaveError { .. } => "SAVE_ERROR",
            Action::Cancel => "CANCEL",
            Action::Reset => "RESET",
            Action::RestoreState(_) => "RESTORE_STATE",
        }
    }
}

pub fn reduce(state: &ScanRequest, action: Action) -> ScanRequest {
    let mut next = state.clone();
    if apply(&mut next, action) {
        next
    } else {
        state.clone()
    }
}

// Returns false when the action does not apply; the caller then discards any
// partial edits made to `s`.
fn apply(s: &mut ScanRequest, action: Action) -> bool {
    match action {
        Action::StartSingle { at } => start(s, Mode::Single, at),
        Action::StartBatch { at } => start(s, Mode::Batch, at),
        Action::StartStatement { at } => start(s, Mode::Statement, at),

        Action::AddImage(image) => {
            if s.phase != Phase::Capturing || s.images.len() >= MAX_IMAGES || s.has_image(&image.id)
            {
                return false;
            }
            if let Some(receipts) = s.batch_receipts.as_mut() {
                receipts.push(BatchReceipt::pending(&image.id));
            }
            s.images.push(image);
            refresh_progress(s);
            true
        }
        Action::RemoveImage { index } => {
            if s.phase != Phase::Capturing || index >= s.images.len() {
                return false;
            }
            let removed = s.images.remove(index);
            if let Some(receipts) = s.batch_receipts.as_mut() {
                receipts.retain(|r| r.image_id != removed.id);
            }
            refresh_progress(s);
            true
        }
        Action::SetImages(images) => {
            if s.phase != Phase::Capturing || images.len() > MAX_IMAGES {
                return false;
            }
            let distinct = images
                .iter()
                .enumerate()
                .all(|(i, image)| images[..i].iter().all(|earlier| earlier.id != image.id));
            if !distinct {
                return false;
            }
            if let Some(receipts) = s.batch_receipts.as_mut() {
                *receipts = images.iter().map(|i| BatchReceipt::pending(&i.id)).collect();
            }
            s.images = images;
            refresh_progress(s);
            true
        }

        Action::ProcessStart => {
            // batch scans start per item
            if !matches!(s.phase, Phase::Capturing | Phase::Error)
                || s.mode == Mode::Batch
                || s.images.is_empty()
            {
                return false;
            }
            s.phase = Phase::Processing;
            s.error = None;
            true
        }
        Action::ProcessSuccess(transaction) => {
            if s.phase != Phase::Processing || s.mode == Mode::Batch {
                return false;
            }
            s.phase = Phase::Reviewing;
            s.results = vec![transaction];
            s.resolved_dialogs.clear();
            true
        }
        Action::ProcessError { message } => {
            if s.phase != Phase::Processing || s.mode == Mode::Batch {
                return false;
            }
            s.phase = Phase::Error;
            s.error = Some(ScanFault::recoverable(message));
            true
        }

        Action::ShowDialog(dialog) => {
            if s.is_idle() || s.active_dialog.is_some() || s.phase == Phase::Dialog {
                return false;
            }
            s.active_dialog = Some(dialog::ActiveDialog {
                dialog,
                return_to: s.phase,
            });
            s.phase = Phase::Dialog;
            true
        }
        Action::ResolveDialog(resolution) => {
            let Some(active) = s.active_dialog.take() else {
                return false;
            };
            // stale resolution
            if active.dialog.kind() != resolution.kind() {
                return false;
            }
            match dialog::apply_resolution(&mut s.results, &active.dialog, &resolution) {
                Outcome::Reset => *s = ScanRequest::idle(),
                Outcome::Return => {
                    s.phase = active.return_to;
                    if !s.resolved_dialogs.contains(&resolution.kind()) {
                        s.resolved_dialogs.push(resolution.kind());
                    }
                }
            }
            true
        }
        Action::DismissDialog => {
            let Some(active) = s.active_dialog.take() else {
                return false;
            };
            s.phase = active.return_to;
            true
        }

        Action::BatchItemStart { index } => {
            let resumable = match s.phase {
                Phase::Capturing | Phase::Processing | Phase::Reviewing => true,
                Phase::Dialog => s.effective_phase() == Phase::Processing,
                _ => false,
            };
            if s.mode != Mode::Batch || !resumable {
                return false;
            }
            let Some(receipts) = s.batch_receipts.as_mut() else {
                return false;
            };
            if !batch::start_item(receipts, index) {
                return false;
            }
            if s.phase != Phase::Dialog {
                s.phase = Phase::Processing;
            }
            s.batch_editing_index = None;
            refresh_progress(s);
            true
        }
        Action::BatchItemSuccess { index, transaction } => {
            if s.mode != Mode::Batch || s.effective_phase() != Phase::Processing {
                return false;
            }
            let Some(receipts) = s.batch_receipts.as_mut() else {
                return false;
            };
            if !batch::succeed_item(receipts, index, transaction) {
                return false;
            }
            refresh_progress(s);
            true
        }
        Action::BatchItemError { index, message } => {
            if s.mode != Mode::Batch || s.effective_phase() != Phase::Processing {
                return false;
            }
            let Some(receipts) = s.batch_receipts.as_mut() else {
                return false;
            };
            if !batch::fail_item(receipts, index, message) {
                return false;
            }
            refresh_progress(s);
            true
        }
        Action::BatchComplete => {
            if s.mode != Mode::Batch || s.phase != Phase::Processing {
                return false;
            }
            let Some(receipts) = s.batch_receipts.as_ref() else {
                return false;
            };
            if !batch::is_complete(receipts) {
                return false;
            }
            s.results = batch::done_results(receipts);
            s.phase = Phase::Reviewing;
            s.resolved_dialogs.clear();
            true
        }
        Action::SetBatchEditingIndex(index) => {
            if s.mode != Mode::Batch || s.is_idle() {
                return false;
            }
            match index {
                None => s.batch_editing_index = None,
                Some(i) => {
                    let editable = s.phase == Phase::Reviewing
                        && s
                            .batch_receipts
                            .as_ref()
                            .and_then(|receipts| receipts.get(i))
                            .map(|r| r.status == ReceiptStatus::Done)
                            .unwrap_or(false);
                    if !editable {
                        return false;
                    }
                    s.batch_editing_index = Some(i);
                }
            }
            true
        }
        Action::UpdateResult { index, transaction } => {
            if s.phase != Phase::Reviewing || s.mode == Mode::Batch {
                return false;
            }
            match s.results.get_mut(index) {
                Some(slot) => *slot = transaction,
                None => return false,
            }
            true
        }
        Action::EditBatchReceipt { index, transaction } => {
            if s.phase != Phase::Reviewing || s.mode != Mode::Batch {
                return false;
            }
            let Some(receipts) = s.batch_receipts.as_mut() else {
                return false;
            };
            match receipts.get_mut(index) {
                Some(receipt) if receipt.status == ReceiptStatus::Done => {
                    receipt.result = Some(transaction);
                }
                _ => return false,
            }
            s.results = batch::done_results(receipts);
            true
        }

        Action::SaveStart => {
            if s.phase != Phase::Reviewing || s.results.is_empty() {
                return false;
            }
            s.phase = Phase::Saving;
            s.error = None;
            s.batch_editing_index = None;
            true
        }
        Action::SaveSuccess => {
            if s.phase != Phase::Saving {
                return false;
            }
            *s = ScanRequest::idle();
            true
        }
        Action::SaveError { message } => {
            if s.phase != Phase::Saving {
                return false;
            }
            s.phase = Phase::Reviewing;
            s.error = Some(ScanFault::recoverable(message));
            true
        }

        Action::Cancel | Action::Reset => {
            *s = ScanRequest::idle();
            true
        }
        Action::RestoreState(restored) => {
            if !s.is_idle() || restored.is_idle() || !restored.is_consistent() {
                return false;
            }
            *s = *restored;
            true
        }
    }
}

fn start(s: &mut ScanRequest, mode: Mode, at: TimeStamp) -> bool {
    // one live request per user; the caller resumes instead
    if !s.is_idle() {
        return false;
    }
    *s = ScanRequest {
        phase: Phase::Capturing,
        mode,
        started_at: Some(at),
        ..ScanRequest::idle()
    };
    if mode == Mode::Batch {
        s.batch_receipts = Some(vec![]);
    }
    refresh_progress(s);
    true
}

fn refresh_progress(s: &mut ScanRequest) {
    s.batch_progress = s.batch_receipts.as_deref().map(batch::progress_of);
}
