//! Service layer API for scan workflow operations
//!
//! [`ScanService`] is the caller layer above the reducer. It validates input,
//! talks to the extraction service, transaction store and credit ledger, and
//! turns each suspension into a `*Start` / `*Success|*Error` action pair.
//!
//! The service is single-threaded and cooperative: its futures are not `Send`
//! and are meant to be driven on one task (or joined on one task when a view
//! needs to cancel while extraction is outstanding). Every async continuation
//! captures the epoch it was issued under; [`ScanService::cancel`] bumps the
//! epoch so results that arrive afterwards are dropped before they reach the
//! reducer.
use std::cell::{Cell, RefCell};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::config::ScanConfig;
use super::dialog::{
    self, BatchCompleteChoice, Dialog, DialogKind, DialogResolution, QuickSaveChoice,
    ScanCompleteChoice,
};
use super::distributor::{Listener, ScanStore, ScanView, SubscriptionId};
use super::error::{ScanError, ValidationError};
use super::guard::{self, CaptureGate};
use super::ledger::SledCreditLedger;
use super::migration::{self, Recovered};
use super::persistence::SessionStore;
use super::ports::{CreditLedger, ExtractionHints, Extractor, Reservation, TransactionStore};
use super::reducer::Action;
use super::request::{ImagePayload, Mode, Phase, ReceiptStatus, ScanRequest};
use super::transaction::{TimeStamp, Transaction};
use super::transactions::SledTransactionStore;
use super::batch;

pub struct ScanService {
    user_id: String,
    config: ScanConfig,
    store: RefCell<ScanStore>,
    sessions: SessionStore,
    extractor: Arc<dyn Extractor>,
    transactions: Arc<dyn TransactionStore>,
    ledger: Arc<dyn CreditLedger>,
    epoch: Cell<u64>,
    // reservations backing extractions that succeeded and still await a save
    held: Cell<u32>,
}

impl ScanService {
    /// Creates a service whose session, transactions and credits all live in
    /// `instance`.
    pub fn new(
        user_id: &str,
        instance: Arc<sled::Db>,
        config: ScanConfig,
        extractor: Arc<dyn Extractor>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let sessions = SessionStore::new(&instance)?;

        Ok(Self {
            user_id: user_id.to_string(),
            config,
            store: RefCell::new(ScanStore::new(user_id, Some(sessions.clone()))),
            sessions,
            extractor,
            transactions: Arc::new(SledTransactionStore::new(&instance)?),
            ledger: Arc::new(SledCreditLedger::new(&instance)?),
            epoch: Cell::new(0),
            held: Cell::new(0),
        })
    }

    pub fn with_transaction_store(mut self, transactions: Arc<dyn TransactionStore>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn CreditLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// A copy of the live request.
    pub fn snapshot(&self) -> ScanRequest {
        self.store.borrow().state().clone()
    }

    pub fn with_view<R>(&self, f: impl FnOnce(&ScanView<'_>) -> R) -> R {
        f(&self.store.borrow().view())
    }

    /// Registers a view. Listeners run inside dispatch and must not call back
    /// into the service.
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.store.borrow_mut().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.store.borrow_mut().unsubscribe(id)
    }

    fn dispatch(&self, action: Action) -> bool {
        self.store.borrow_mut().dispatch(action)
    }

    fn read<R>(&self, f: impl FnOnce(&ScanRequest) -> R) -> R {
        f(self.store.borrow().state())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.get() == epoch
    }

    /// Restores the user's unfinished scan from storage, rewinding any step
    /// the previous process was suspended in. Credits reserved for
    /// extractions that never returned are refunded only once the rewound
    /// request is on disk, so a second mount cannot refund them again.
    pub async fn mount(&self) -> anyhow::Result<Option<Phase>> {
        if !self.read(|s| s.is_idle()) {
            return Ok(Some(self.read(|s| s.phase)));
        }
        let Some(saved) = self.sessions.load(&self.user_id) else {
            return Ok(None);
        };

        let Recovered { state, interrupted } = migration::recover_interrupted(saved.clone());
        let persisted = state == saved || self.write_recovered(&state);
        if persisted {
            for _ in 0..interrupted {
                self.refund().await;
            }
        }
        if state.is_idle() {
            return Ok(None);
        }

        if !self.store.borrow_mut().hydrate(state, persisted) {
            self.sessions.clear(&self.user_id);
            return Ok(None);
        }
        self.held.set(self.read(settled_extractions));
        let phase = self.read(|s| s.phase);
        tracing::info!(user_id = %self.user_id, ?phase, interrupted, "restored scan session");
        Ok(Some(phase))
    }

    // Without this write the interrupted reservations stay held; refunding
    // them against a stale record would let the next mount refund them again.
    fn write_recovered(&self, state: &ScanRequest) -> bool {
        match self.sessions.try_save(&self.user_id, state) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to persist recovered scan session");
                false
            }
        }
    }

    /// Starts a new scan, or points the caller at the one already running.
    pub fn begin_capture(&self, mode: Mode) -> CaptureGate {
        let gate = self.read(guard::capture_gate);
        if gate == CaptureGate::Start {
            let at = TimeStamp::new();
            self.dispatch(match mode {
                Mode::Single => Action::StartSingle { at },
                Mode::Batch => Action::StartBatch { at },
                Mode::Statement => Action::StartStatement { at },
            });
            tracing::info!(user_id = %self.user_id, ?mode, "scan started");
        }
        gate
    }

    pub fn add_image(&self, image: ImagePayload) -> anyhow::Result<()> {
        self.require_phase(&[Phase::Capturing])?;
        image.validate()?;
        let (count, duplicate) = self.read(|s| (s.images.len(), s.has_image(&image.id)));
        if count >= self.config.max_images {
            return Err(ValidationError::TooManyImages {
                count,
                max: self.config.max_images,
            }
            .into());
        }
        if duplicate {
            return Err(ValidationError::DuplicateImage.into());
        }
        self.dispatch(Action::AddImage(image));
        Ok(())
    }

    pub fn remove_image(&self, index: usize) -> anyhow::Result<bool> {
        self.require_phase(&[Phase::Capturing])?;
        Ok(self.dispatch(Action::RemoveImage { index }))
    }

    pub fn set_images(&self, images: Vec<ImagePayload>) -> anyhow::Result<()> {
        self.require_phase(&[Phase::Capturing])?;
        if images.len() > self.config.max_images {
            return Err(ValidationError::TooManyImages {
                count: images.len(),
                max: self.config.max_images,
            }
            .into());
        }
        for (i, image) in images.iter().enumerate() {
            image.validate()?;
            if images[..i].iter().any(|earlier| earlier.id == image.id) {
                return Err(ValidationError::DuplicateImage.into());
            }
        }
        self.dispatch(Action::SetImages(images));
        Ok(())
    }

    /// Runs extraction over the captured images. Batch scans fan out per item.
    ///
    /// Extraction failures are not returned as errors: they land in
    /// `state.error` with the images kept for a retry.
    pub async fn process(&self) -> anyhow::Result<()> {
        if self.read(|s| s.mode) == Mode::Batch {
            return self.process_batch().await;
        }
        self.require_phase(&[Phase::Capturing, Phase::Error])?;
        if self.read(|s| s.images.is_empty()) {
            return Err(ScanError::NothingToProcess.into());
        }
        if self.warn_low_credits().await? {
            return Ok(());
        }
        if self.ledger.reserve(&self.user_id).await? == Reservation::Denied {
            return Err(ScanError::CreditsDenied.into());
        }

        let epoch = self.epoch.get();
        if !self.dispatch(Action::ProcessStart) {
            self.refund().await;
            return Err(ScanError::InvalidPhase(self.read(|s| s.phase)).into());
        }
        let images = self.read(|s| s.images.clone());
        let outcome = self.extractor.extract(&images, &self.config.hints()).await;

        if !self.is_current(epoch) {
            tracing::warn!(user_id = %self.user_id, "discarding extraction result for cancelled scan");
            self.settle_orphaned(outcome.is_ok()).await;
            return Ok(());
        }
        match outcome {
            Ok(transaction) => {
                self.held.set(self.held.get() + 1);
                self.dispatch(Action::ProcessSuccess(transaction));
                self.advance_dialogs();
            }
            Err(e) => {
                // refund lands before the error becomes visible
                self.refund().await;
                self.dispatch(Action::ProcessError {
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Extracts every pending receipt of a batch scan, at most
    /// `batch_concurrency` at a time, then completes the batch.
    pub async fn process_batch(&self) -> anyhow::Result<()> {
        self.require_batch()?;
        self.require_phase(&[Phase::Capturing, Phase::Processing])?;
        if self.read(|s| s.images.is_empty()) {
            return Err(ScanError::NothingToProcess.into());
        }
        let pending = self.receipts_with(ReceiptStatus::Pending);
        if pending.is_empty() {
            return Err(ScanError::NoPendingReceipts.into());
        }
        if self.warn_low_credits().await? {
            return Ok(());
        }
        self.run_batch(pending).await;
        Ok(())
    }

    /// Re-runs the receipts that failed in a completed batch.
    pub async fn retry_failed_items(&self) -> anyhow::Result<()> {
        self.require_batch()?;
        self.require_phase(&[Phase::Reviewing])?;
        let failed = self.receipts_with(ReceiptStatus::Error);
        if failed.is_empty() {
            return Err(ScanError::NoFailedReceipts.into());
        }
        self.run_batch(failed).await;
        Ok(())
    }

    async fn run_batch(&self, indices: Vec<usize>) {
        let epoch = self.epoch.get();
        let hints = self.config.hints();
        let items: Vec<(usize, ImagePayload)> = self.read(|s| {
            let receipts = s.batch_receipts.as_deref().unwrap_or_default();
            indices
                .iter()
                .filter_map(|&index| {
                    let receipt = receipts.get(index)?;
                    Some((index, s.image(&receipt.image_id)?.clone()))
                })
                .collect()
        });

        let hints = &hints;
        let mut runs = stream::iter(items)
            .map(move |(index, image)| self.run_item(epoch, index, image, hints))
            .buffer_unordered(self.config.batch_concurrency);
        while runs.next().await.is_some() {}
        drop(runs);

        if self.is_current(epoch) && self.dispatch(Action::BatchComplete) {
            self.advance_dialogs();
        }
    }

    async fn run_item(&self, epoch: u64, index: usize, image: ImagePayload, hints: &ExtractionHints) {
        if !self.is_current(epoch) {
            return;
        }
        let denial = match self.ledger.reserve(&self.user_id).await {
            Ok(Reservation::Granted) => None,
            Ok(Reservation::Denied) => Some(ScanError::CreditsDenied.to_string()),
            Err(e) => Some(e.to_string()),
        };
        if !self.is_current(epoch) {
            if denial.is_none() {
                self.refund().await;
            }
            return;
        }
        if let Some(message) = denial {
            self.dispatch(Action::BatchItemStart { index });
            self.dispatch(Action::BatchItemError { index, message });
            return;
        }
        if !self.dispatch(Action::BatchItemStart { index }) {
            self.refund().await;
            return;
        }

        let outcome = self
            .extractor
            .extract(std::slice::from_ref(&image), hints)
            .await;

        if !self.is_current(epoch) {
            tracing::warn!(user_id = %self.user_id, index, "discarding batch result for cancelled scan");
            self.settle_orphaned(outcome.is_ok()).await;
            return;
        }
        match outcome {
            Ok(transaction) => {
                self.held.set(self.held.get() + 1);
                self.dispatch(Action::BatchItemSuccess { index, transaction });
            }
            Err(e) => {
                self.refund().await;
                self.dispatch(Action::BatchItemError {
                    index,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Writes the reviewed results to the transaction store.
    ///
    /// Returns the new transaction ids, or `None` when the store rejected the
    /// write; the request is then back in review with `state.error` set.
    pub async fn save(&self) -> anyhow::Result<Option<Vec<String>>> {
        self.require_phase(&[Phase::Reviewing])?;
        let results = self.read(|s| s.results.clone());
        if results.is_empty() {
            return Err(ScanError::NothingToSave.into());
        }

        let epoch = self.epoch.get();
        self.dispatch(Action::SaveStart);
        let outcome = self.transactions.create_all(&self.user_id, &results).await;

        let ids = match outcome {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to save scanned transactions");
                if self.is_current(epoch) {
                    self.dispatch(Action::SaveError {
                        message: e.to_string(),
                    });
                }
                return Ok(None);
            }
        };
        self.confirm_held().await;
        tracing::info!(user_id = %self.user_id, saved = ids.len(), "scanned transactions saved");

        if self.is_current(epoch) && !self.advance_dialogs() {
            self.dispatch(Action::SaveSuccess);
        }
        Ok(Some(ids))
    }

    /// Answers the open dialog and carries out its follow-up. A resolution
    /// for a dialog that is no longer open is ignored.
    pub async fn resolve_dialog(&self, resolution: DialogResolution) -> anyhow::Result<()> {
        let mode = self.read(|s| s.mode);
        if !self.dispatch(Action::ResolveDialog(resolution)) {
            tracing::debug!(kind = ?resolution.kind(), "ignoring stale dialog resolution");
            return Ok(());
        }

        match resolution {
            DialogResolution::QuickSave(QuickSaveChoice::SaveNow)
            | DialogResolution::BatchComplete(BatchCompleteChoice::SaveAll) => {
                self.save().await?;
                return Ok(());
            }
            DialogResolution::ScanComplete(choice) => {
                self.dispatch(Action::SaveSuccess);
                if choice == ScanCompleteChoice::ScanAnother {
                    self.begin_capture(mode);
                }
                return Ok(());
            }
            DialogResolution::CreditWarning { proceed: true } => {
                return self.process().await;
            }
            DialogResolution::BatchCancel { confirmed: true }
            | DialogResolution::BatchDiscard { confirmed: true } => {
                self.abandon().await;
                return Ok(());
            }
            DialogResolution::BatchCancel { confirmed: false } => {
                self.complete_finished_batch();
                return Ok(());
            }
            _ => {}
        }
        self.advance_dialogs();
        Ok(())
    }

    /// Closes the open dialog without answering it. Dismissing a batch
    /// cancel prompt behaves like declining it.
    pub fn dismiss_dialog(&self) -> bool {
        if !self.dispatch(Action::DismissDialog) {
            return false;
        }
        self.complete_finished_batch();
        true
    }

    // The run loop skips completion while a prompt covers the batch, so
    // whoever closes the prompt finishes it.
    fn complete_finished_batch(&self) {
        let processing = self.read(|s| s.mode == Mode::Batch && s.phase == Phase::Processing);
        if processing && self.dispatch(Action::BatchComplete) {
            self.advance_dialogs();
        }
    }

    /// Asks the user to confirm stopping a batch that is still extracting.
    pub fn request_batch_cancel(&self) -> anyhow::Result<()> {
        self.require_batch()?;
        self.require_phase(&[Phase::Processing])?;
        let progress = self.read(|s| s.batch_progress.unwrap_or_default());
        let unfinished = progress.total - progress.completed - progress.failed;
        self.dispatch(Action::ShowDialog(Dialog::BatchCancel { unfinished }));
        Ok(())
    }

    /// Asks the user to confirm throwing away reviewed batch results.
    pub fn request_batch_discard(&self) -> anyhow::Result<()> {
        self.require_batch()?;
        self.require_phase(&[Phase::Reviewing])?;
        let results = self.read(|s| s.results.len());
        self.dispatch(Action::ShowDialog(Dialog::BatchDiscard { results }));
        Ok(())
    }

    /// Abandons the scan from any phase. Outstanding calls are orphaned.
    /// Credits spent on finished extractions are confirmed, not refunded.
    pub async fn cancel(&self) {
        self.abandon().await;
    }

    async fn abandon(&self) {
        self.epoch.set(self.epoch.get() + 1);
        self.dispatch(Action::Cancel);
        tracing::info!(user_id = %self.user_id, "scan cancelled");
        self.confirm_held().await;
    }

    pub fn update_result(&self, index: usize, transaction: Transaction) -> bool {
        self.dispatch(Action::UpdateResult { index, transaction })
    }

    pub fn edit_batch_receipt(&self, index: usize, transaction: Transaction) -> bool {
        self.dispatch(Action::EditBatchReceipt { index, transaction })
    }

    pub fn set_batch_editing_index(&self, index: Option<usize>) -> bool {
        self.dispatch(Action::SetBatchEditingIndex(index))
    }

    // Shows the next dialog in the chain, if any. Returns whether one opened.
    fn advance_dialogs(&self) -> bool {
        let next = self.read(|s| dialog::next_dialog(s, &self.config.dialog_policy()));
        match next {
            Some(dialog) => self.dispatch(Action::ShowDialog(dialog)),
            None => false,
        }
    }

    // Raises the credit warning once per scan when the balance is low.
    // Returns true when the caller should wait for the user's answer.
    async fn warn_low_credits(&self) -> anyhow::Result<bool> {
        let remaining = self.ledger.remaining(&self.user_id).await?;
        if remaining == 0 {
            return Err(ScanError::CreditsDenied.into());
        }
        let acknowledged = self.read(|s| s.resolved_dialogs.contains(&DialogKind::CreditWarning));
        if acknowledged || remaining > self.config.credit_warning_threshold {
            return Ok(false);
        }
        Ok(self.dispatch(Action::ShowDialog(Dialog::CreditWarning { remaining })))
    }

    async fn refund(&self) {
        match self.ledger.refund(&self.user_id).await {
            Ok(()) => tracing::debug!(user_id = %self.user_id, "scan credit refunded"),
            Err(e) => tracing::error!(user_id = %self.user_id, error = %e, "failed to refund scan credit"),
        }
    }

    async fn confirm(&self) {
        if let Err(e) = self.ledger.confirm(&self.user_id).await {
            tracing::error!(user_id = %self.user_id, error = %e, "failed to confirm scan credit");
        }
    }

    async fn confirm_held(&self) {
        for _ in 0..self.held.replace(0) {
            self.confirm().await;
        }
    }

    // A result for a cancelled scan still cost an extraction.
    async fn settle_orphaned(&self, extracted: bool) {
        if extracted {
            self.confirm().await;
        } else {
            self.refund().await;
        }
    }

    fn require_phase(&self, allowed: &[Phase]) -> Result<(), ScanError> {
        let phase = self.read(|s| s.phase);
        if allowed.contains(&phase) {
            Ok(())
        } else {
            Err(ScanError::InvalidPhase(phase))
        }
    }

    fn require_batch(&self) -> Result<(), ScanError> {
        if self.read(|s| s.mode == Mode::Batch && !s.is_idle()) {
            Ok(())
        } else {
            Err(ScanError::NotBatchMode)
        }
    }

    fn receipts_with(&self, status: ReceiptStatus) -> Vec<usize> {
        self.read(|s| {
            s.batch_receipts
                .as_deref()
                .map(|receipts| batch::indices_with(receipts, status))
                .unwrap_or_default()
        })
    }
}

// Extractions whose credit is still held, for a request restored from storage.
fn settled_extractions(state: &ScanRequest) -> u32 {
    match &state.batch_receipts {
        Some(receipts) => batch::indices_with(receipts, ReceiptStatus::Done).len() as u32,
        None => u32::from(!state.results.is_empty()),
    }
}
