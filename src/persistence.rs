//! Durable per-user storage of the live scan request
//!
//! The only record ever written is an [`Envelope`] under the user's session
//! key. Nothing here surfaces an error to the caller: a failed write is
//! logged, and a record that cannot be read back is deleted and reported as
//! "nothing to restore". There is no expiry; an unfinished scan waits for the
//! user indefinitely.
use super::error::PersistError;
use super::migration::{self, LegacyBatchScan, LegacyRecord, LegacySingleScan};
use super::request::ScanRequest;
use super::transaction::TimeStamp;

/// Bumped whenever [`ScanRequest`]'s encoding changes. Envelopes written
/// under any other version are discarded on load.
pub const SCHEMA_VERSION: u32 = 2;

pub const SESSION_TREE: &str = "scan_sessions";

pub fn session_key(user_id: &str) -> String {
    format!("scan/{user_id}")
}
pub fn legacy_single_key(user_id: &str) -> String {
    format!("scan-single/{user_id}")
}
pub fn legacy_batch_key(user_id: &str) -> String {
    format!("scan-batch/{user_id}")
}

// schema_version is field 0 so it can be read before the state is decoded.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    #[n(0)]
    pub schema_version: u32,
    #[n(1)]
    pub saved_at: TimeStamp,
    #[n(2)]
    pub state: ScanRequest,
}

#[derive(Clone)]
pub struct SessionStore {
    tree: sled::Tree,
}

impl SessionStore {
    pub fn new(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree(SESSION_TREE)?,
        })
    }

    /// Writes the request, or clears the record when the request is idle.
    pub fn save(&self, user_id: &str, state: &ScanRequest) {
        if let Err(e) = self.try_save(user_id, state) {
            tracing::warn!(user_id, error = %e, "failed to persist scan session");
        }
    }

    pub fn try_save(&self, user_id: &str, state: &ScanRequest) -> Result<(), PersistError> {
        if state.is_idle() {
            self.tree.remove(session_key(user_id))?;
            return Ok(());
        }
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            saved_at: TimeStamp::new(),
            state: state.clone(),
        };
        self.tree
            .insert(session_key(user_id), minicbor::to_vec(&envelope)?)?;
        Ok(())
    }

    /// Restores the user's unfinished scan, if a readable one exists.
    pub fn load(&self, user_id: &str) -> Option<ScanRequest> {
        if let Err(e) = self.migrate_legacy(user_id) {
            tracing::warn!(user_id, error = %e, "dropping unreadable legacy scan");
        }
        match self.try_load(user_id) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "discarding persisted scan session");
                self.clear(user_id);
                None
            }
        }
    }

    pub fn clear(&self, user_id: &str) {
        if let Err(e) = self.tree.remove(session_key(user_id)) {
            tracing::warn!(user_id, error = %e, "failed to clear scan session");
        }
    }

    fn try_load(&self, user_id: &str) -> Result<Option<ScanRequest>, PersistError> {
        let Some(bytes) = self.tree.get(session_key(user_id))? else {
            return Ok(None);
        };

        let found = peek_schema_version(&bytes)?;
        if found != SCHEMA_VERSION {
            return Err(PersistError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        let envelope: Envelope = minicbor::decode(&bytes)?;
        if envelope.state.is_idle() || !envelope.state.is_consistent() {
            return Err(PersistError::Inconsistent);
        }
        Ok(Some(envelope.state))
    }

    // Converts a pre-unification record into an envelope when no current
    // record exists. Legacy keys are removed either way.
    fn migrate_legacy(&self, user_id: &str) -> Result<(), PersistError> {
        let single_key = legacy_single_key(user_id);
        let batch_key = legacy_batch_key(user_id);
        let single = self.tree.get(&single_key)?;
        let batch = self.tree.get(&batch_key)?;
        if single.is_none() && batch.is_none() {
            return Ok(());
        }

        let outcome = if self.tree.contains_key(session_key(user_id))? {
            Ok(())
        } else {
            self.decode_legacy(single.as_deref(), batch.as_deref())
                .and_then(|migrated| match migrated {
                    Some(state) => {
                        tracing::info!(user_id, mode = ?state.mode, "migrated legacy scan session");
                        self.try_save(user_id, &state)
                    }
                    None => Ok(()),
                })
        };

        self.tree.remove(single_key)?;
        self.tree.remove(batch_key)?;
        outcome
    }

    fn decode_legacy(
        &self,
        single: Option<&[u8]>,
        batch: Option<&[u8]>,
    ) -> Result<Option<ScanRequest>, PersistError> {
        let record = match (single, batch) {
            (Some(bytes), _) => LegacyRecord::Single(minicbor::decode::<LegacySingleScan>(bytes)?),
            (None, Some(bytes)) => LegacyRecord::Batch(minicbor::decode::<LegacyBatchScan>(bytes)?),
            (None, None) => return Ok(None),
        };
        Ok(migration::legacy_to_current(record))
    }
}

fn peek_schema_version(bytes: &[u8]) -> Result<u32, PersistError> {
    let mut d = minicbor::Decoder::new(bytes);
    d.array()?;
    Ok(d.u32()?)
}
