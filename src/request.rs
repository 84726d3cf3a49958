//! The scan request aggregate and its component records
use super::dialog::{ActiveDialog, DialogKind};
use super::error::ValidationError;
use super::transaction::{TimeStamp, Transaction};

/// Upper bound on captured images in a single request.
pub const MAX_IMAGES: usize = 10;

const SUPPORTED_MIME: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/heic"];

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    #[n(0)]
    Idle,
    #[n(1)]
    Capturing,
    #[n(2)]
    Processing,
    #[n(3)]
    Reviewing,
    #[n(4)]
    Dialog,
    #[n(5)]
    Saving,
    #[n(6)]
    Error,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    #[n(0)]
    Single,
    #[n(1)]
    Batch,
    #[n(2)]
    Statement,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    #[n(0)]
    pub id: String, // sha256 of the bytes
    #[n(1)]
    pub mime: String,
    #[n(2)]
    #[cbor(with = "minicbor::bytes")]
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            id: sha256::digest(&bytes),
            mime: mime.to_ascii_lowercase(),
            bytes,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        if !SUPPORTED_MIME.contains(&self.mime.as_str()) {
            return Err(ValidationError::UnsupportedImage(self.mime.clone()));
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReceiptStatus {
    #[default]
    #[n(0)]
    Pending,
    #[n(1)]
    Processing,
    #[n(2)]
    Done,
    #[n(3)]
    Error,
}

impl ReceiptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiptStatus::Done | ReceiptStatus::Error)
    }
}

/// Per-item state of a batch scan.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReceipt {
    #[n(0)]
    pub image_id: String, // references [`ImagePayload::id`]
    #[n(1)]
    pub status: ReceiptStatus,
    #[n(2)]
    pub result: Option<Transaction>,
    #[n(3)]
    pub error: Option<String>,
}

impl BatchReceipt {
    pub fn pending(image_id: &str) -> Self {
        Self {
            image_id: image_id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    #[n(0)]
    pub completed: usize,
    #[n(1)]
    pub total: usize,
    #[n(2)]
    pub failed: usize,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ScanFault {
    #[n(0)]
    pub message: String,
    #[n(1)]
    pub recoverable: bool,
}

impl ScanFault {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: true,
        }
    }
}

/// One capture-and-review session. Exactly one is live per user; the idle
/// request is the default value.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    #[n(0)]
    pub phase: Phase,
    #[n(1)]
    pub mode: Mode,
    #[n(2)]
    pub images: Vec<ImagePayload>,
    #[n(3)]
    pub results: Vec<Transaction>,
    #[n(4)]
    pub batch_progress: Option<BatchProgress>,
    #[n(5)]
    pub batch_receipts: Option<Vec<BatchReceipt>>,
    #[n(6)]
    pub batch_editing_index: Option<usize>,
    #[n(7)]
    pub active_dialog: Option<ActiveDialog>,
    #[n(8)]
    pub resolved_dialogs: Vec<DialogKind>,
    #[n(9)]
    pub error: Option<ScanFault>,
    #[n(10)]
    pub started_at: Option<TimeStamp>,
}

impl ScanRequest {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// The phase the session is logically in, looking through an open dialog.
    pub fn effective_phase(&self) -> Phase {
        match &self.active_dialog {
            Some(active) => active.return_to,
            None => self.phase,
        }
    }

    pub fn has_image(&self, image_id: &str) -> bool {
        self.images.iter().any(|image| image.id == image_id)
    }

    pub fn image(&self, image_id: &str) -> Option<&ImagePayload> {
        self.images.iter().find(|image| image.id == image_id)
    }

    /// Structural checks applied to anything restored from outside the
    /// reducer. A request failing these is treated as corrupt.
    pub fn is_consistent(&self) -> bool {
        if self.is_idle() {
            return *self == Self::idle();
        }
        if self.started_at.is_none() || self.images.len() > MAX_IMAGES {
            return false;
        }
        match (&self.active_dialog, self.phase) {
            (Some(active), Phase::Dialog) => {
                if matches!(active.return_to, Phase::Idle | Phase::Dialog) {
                    return false;
                }
            }
            (None, Phase::Dialog) | (Some(_), _) => return false,
            (None, _) => {}
        }
        match self.mode {
            Mode::Batch => {
                let Some(receipts) = &self.batch_receipts else {
                    return false;
                };
                if self.batch_progress != Some(super::batch::progress_of(receipts)) {
                    return false;
                }
                if receipts.iter().any(|r| !self.has_image(&r.image_id)) {
                    return false;
                }
                self.batch_editing_index
                    .map(|index| index < receipts.len())
                    .unwrap_or(true)
            }
            Mode::Single | Mode::Statement => {
                self.batch_receipts.is_none()
                    && self.batch_progress.is_none()
                    && self.batch_editing_index.is_none()
                    && self.results.len() <= 1
            }
        }
    }
}
