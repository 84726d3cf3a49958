//! Sled-backed transaction store
use async_trait::async_trait;
use sled::Batch;

use super::ports::TransactionStore;
use super::transaction::{TimeStamp, Transaction};
use super::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub saved_at: TimeStamp,
    #[n(3)]
    pub transaction: Transaction,
}

pub struct SledTransactionStore {
    tree: sled::Tree,
}

impl SledTransactionStore {
    pub fn new(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("transactions")?,
        })
    }

    fn record(user_id: &str, transaction: &Transaction) -> anyhow::Result<(String, Vec<u8>)> {
        let stored = StoredTransaction {
            id: utils::new_prefixed_id("txn_")?,
            user_id: user_id.to_string(),
            saved_at: TimeStamp::new(),
            transaction: transaction.clone(),
        };
        let cbor = minicbor::to_vec(&stored)?;
        Ok((stored.id, cbor))
    }

    pub fn get(&self, user_id: &str, id: &str) -> anyhow::Result<Option<StoredTransaction>> {
        match self.tree.get(format!("{user_id}/{id}"))? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All transactions saved for a user.
    pub fn list(&self, user_id: &str) -> anyhow::Result<Vec<StoredTransaction>> {
        let mut stored = Vec::new();
        for entry in self.tree.scan_prefix(format!("{user_id}/")) {
            let (_, bytes) = entry?;
            stored.push(minicbor::decode(&bytes)?);
        }
        Ok(stored)
    }
}

#[async_trait]
impl TransactionStore for SledTransactionStore {
    async fn create(&self, user_id: &str, transaction: &Transaction) -> anyhow::Result<String> {
        let (id, cbor) = Self::record(user_id, transaction)?;
        self.tree.insert(format!("{user_id}/{id}"), cbor)?;
        Ok(id)
    }

    async fn create_all(
        &self,
        user_id: &str,
        transactions: &[Transaction],
    ) -> anyhow::Result<Vec<String>> {
        let mut batch = Batch::default();
        let mut ids = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let (id, cbor) = Self::record(user_id, transaction)?;
            batch.insert(format!("{user_id}/{id}").as_bytes(), cbor);
            ids.push(id);
        }
        self.tree.apply_batch(batch)?;
        Ok(ids)
    }
}
