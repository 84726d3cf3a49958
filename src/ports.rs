//! Collaborators the scan flow consumes but does not implement
//!
//! The extraction service, transaction store and credit ledger sit behind
//! these traits. Sled-backed implementations of the store and ledger live in
//! [`crate::transactions`] and [`crate::ledger`].
use async_trait::async_trait;

use super::request::ImagePayload;
use super::transaction::Transaction;

/// Optional context passed along with images to improve extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionHints {
    pub currency: Option<String>,
    pub store_type: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Extraction service failed: {0}")]
    Service(String),
    #[error("No receipt could be read from the image")]
    Unreadable,
    #[error("Extraction service is rate limiting requests")]
    RateLimited,
}

/// The AI extraction service. Retries are the caller's concern.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        images: &[ImagePayload],
        hints: &ExtractionHints,
    ) -> Result<Transaction, ExtractionError>;
}

/// Durable home of finalized transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persists one transaction and returns its id.
    async fn create(&self, user_id: &str, transaction: &Transaction) -> anyhow::Result<String>;

    /// Persists several transactions. Stores that can write atomically should
    /// override this so a failed save leaves nothing behind.
    async fn create_all(
        &self,
        user_id: &str,
        transactions: &[Transaction],
    ) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            ids.push(self.create(user_id, transaction).await?);
        }
        Ok(ids)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    Denied,
}

/// Metered scan quota. One credit is reserved per extraction call.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn reserve(&self, user_id: &str) -> anyhow::Result<Reservation>;
    async fn confirm(&self, user_id: &str) -> anyhow::Result<()>;
    async fn refund(&self, user_id: &str) -> anyhow::Result<()>;
    /// Credits still available to reserve.
    async fn remaining(&self, user_id: &str) -> anyhow::Result<u32>;
}
