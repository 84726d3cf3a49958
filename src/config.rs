//! Scan flow settings
use super::dialog::DialogPolicy;
use super::error::ValidationError;
use super::ports::ExtractionHints;
use super::request::MAX_IMAGES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Images accepted per scan, at most [`MAX_IMAGES`].
    pub max_images: usize,
    /// Extraction calls in flight at once during a batch scan.
    pub batch_concurrency: usize,
    /// The user's home currency; receipts in any other raise a prompt.
    pub default_currency: Option<String>,
    pub store_type: Option<String>,
    /// Warn before processing when this many credits or fewer remain.
    pub credit_warning_threshold: u32,
    pub quick_save: bool,
    pub show_completion: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_images: MAX_IMAGES,
            batch_concurrency: 3,
            default_currency: None,
            store_type: None,
            credit_warning_threshold: 1,
            quick_save: true,
            show_completion: true,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }
    pub fn set_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }
    pub fn set_default_currency(mut self, currency: &str) -> Self {
        self.default_currency = Some(currency.to_uppercase());
        self
    }
    pub fn set_store_type(mut self, store_type: &str) -> Self {
        self.store_type = Some(store_type.to_string());
        self
    }
    pub fn set_credit_warning_threshold(mut self, threshold: u32) -> Self {
        self.credit_warning_threshold = threshold;
        self
    }
    pub fn set_quick_save(mut self, enabled: bool) -> Self {
        self.quick_save = enabled;
        self
    }
    pub fn set_show_completion(mut self, enabled: bool) -> Self {
        self.show_completion = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_images == 0 || self.max_images > MAX_IMAGES {
            return Err(ValidationError::InvalidConfig(
                "max_images must be between 1 and MAX_IMAGES",
            ));
        }
        if self.batch_concurrency == 0 {
            return Err(ValidationError::InvalidConfig(
                "batch_concurrency must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn dialog_policy(&self) -> DialogPolicy {
        DialogPolicy {
            default_currency: self.default_currency.clone(),
            quick_save: self.quick_save,
            show_completion: self.show_completion,
        }
    }

    pub fn hints(&self) -> ExtractionHints {
        ExtractionHints {
            currency: self.default_currency.clone(),
            store_type: self.store_type.clone(),
        }
    }
}
