//! Sled-backed scan credit ledger
//!
//! A reservation moves one credit from `available` to `held`. Confirming it
//! drops the hold; refunding returns the credit to `available`.
use async_trait::async_trait;

use super::ports::{CreditLedger, Reservation};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditAccount {
    #[n(0)]
    pub available: u32,
    #[n(1)]
    pub held: u32,
}

pub struct SledCreditLedger {
    tree: sled::Tree,
}

impl SledCreditLedger {
    pub fn new(db: &sled::Db) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("credits")?,
        })
    }

    pub fn balance(&self, user_id: &str) -> anyhow::Result<CreditAccount> {
        match self.tree.get(user_id)? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Ok(CreditAccount::default()),
        }
    }

    /// Adds purchased or granted credits to a user's balance.
    pub fn grant(&self, user_id: &str, credits: u32) -> anyhow::Result<CreditAccount> {
        self.update(user_id, |account| {
            account.available = account.available.saturating_add(credits);
        })
    }

    // Read-modify-write through sled's CAS loop; `f` may run more than once.
    fn update<F>(&self, user_id: &str, mut f: F) -> anyhow::Result<CreditAccount>
    where
        F: FnMut(&mut CreditAccount),
    {
        let updated = self.tree.update_and_fetch(user_id, |old| {
            let mut account = old
                .and_then(|bytes| minicbor::decode::<CreditAccount>(bytes).ok())
                .unwrap_or_default();
            f(&mut account);
            minicbor::to_vec(account).ok()
        })?;
        match updated {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Err(anyhow::anyhow!("Failed to encode credit account for {user_id}")),
        }
    }
}

#[async_trait]
impl CreditLedger for SledCreditLedger {
    async fn reserve(&self, user_id: &str) -> anyhow::Result<Reservation> {
        let mut outcome = Reservation::Denied;
        self.update(user_id, |account| {
            if account.available > 0 {
                account.available -= 1;
                account.held += 1;
                outcome = Reservation::Granted;
            } else {
                outcome = Reservation::Denied;
            }
        })?;
        Ok(outcome)
    }

    async fn confirm(&self, user_id: &str) -> anyhow::Result<()> {
        self.update(user_id, |account| {
            account.held = account.held.saturating_sub(1);
        })?;
        Ok(())
    }

    async fn refund(&self, user_id: &str) -> anyhow::Result<()> {
        self.update(user_id, |account| {
            if account.held > 0 {
                account.held -= 1;
                account.available += 1;
            }
        })?;
        Ok(())
    }

    async fn remaining(&self, user_id: &str) -> anyhow::Result<u32> {
        Ok(self.balance(user_id)?.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reserve_refund_confirm() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = sled::open(temp_dir.path().join("credits.db"))?;
        let ledger = SledCreditLedger::new(&db)?;

        assert_eq!(ledger.reserve("u1").await?, Reservation::Denied);

        ledger.grant("u1", 2)?;
        assert_eq!(ledger.reserve("u1").await?, Reservation::Granted);
        assert_eq!(ledger.reserve("u1").await?, Reservation::Granted);
        assert_eq!(ledger.reserve("u1").await?, Reservation::Denied);

        ledger.refund("u1").await?;
        ledger.confirm("u1").await?;
        assert_eq!(
            ledger.balance("u1")?,
            CreditAccount {
                available: 1,
                held: 0
            }
        );
        Ok(())
    }
}
