//! Device-local transaction log
//!
//! Transactions never reach the data service. Each user's log is a JSON file
//! rewritten in full on every mutation: the change is applied to a copy, the copy
//! is written to a temp file and renamed over the log, and only then does the
//! in-memory list change. A failed write leaves both untouched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::entities::{NewTransaction, Transaction, TransactionPatch, TransactionStatus};
use crate::domain::value_objects::Money;
use crate::{Result, StoreError};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct LogFile {
    version: u32,
    transactions: Vec<Transaction>,
}

pub struct TransactionLog {
    path: PathBuf,
    items: RwLock<Vec<Transaction>>,
}

impl TransactionLog {
    /// Open the log at `path`, loading any previously persisted transactions.
    /// An unreadable log is moved aside to `<name>.json.corrupt` and the log
    /// starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let items = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<LogFile>(&bytes) {
                Ok(file) => file.transactions,
                Err(e) => {
                    let aside = path.with_extension("json.corrupt");
                    warn!(path = %path.display(), error = %e, "transaction log unreadable, starting empty");
                    fs::rename(&path, &aside).await?;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = items.len(), "transaction log opened");
        Ok(Self { path, items: RwLock::new(items) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All transactions, newest first.
    pub async fn transactions(&self) -> Vec<Transaction> {
        self.items.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<Transaction> {
        self.items.read().await.iter().find(|t| t.id == id).cloned()
    }

    #[tracing::instrument(skip(self, input), fields(kind = ?input.kind))]
    pub async fn add_transaction(&self, input: NewTransaction) -> Result<Transaction> {
        input.validate()?;
        let record = input.into_record();
        let mut items = self.items.write().await;
        let mut next = items.clone();
        next.insert(0, record.clone());
        self.persist(&next).await?;
        *items = next;
        info!(id = %record.id, "transaction recorded");
        Ok(record)
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_transaction(&self, id: Uuid, patch: TransactionPatch) -> Result<Transaction> {
        patch.validate()?;
        let mut items = self.items.write().await;
        let mut next = items.clone();
        let record = next.iter_mut().find(|t| t.id == id).ok_or(StoreError::NotFound { entity: "transaction", id })?;
        record.apply(patch);
        let updated = record.clone();
        self.persist(&next).await?;
        *items = next;
        info!(status = ?updated.status, "transaction updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_transaction(&self, id: Uuid) -> Result<()> {
        let mut items = self.items.write().await;
        if !items.iter().any(|t| t.id == id) {
            return Err(StoreError::NotFound { entity: "transaction", id });
        }
        let next: Vec<Transaction> = items.iter().filter(|t| t.id != id).cloned().collect();
        self.persist(&next).await?;
        *items = next;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        let mut items = self.items.write().await;
        self.persist(&[]).await?;
        items.clear();
        Ok(())
    }

    /// Net of completed transactions in `currency`: credits minus debits.
    pub async fn balance(&self, currency: &str) -> Result<Money> {
        self.items
            .read()
            .await
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed && t.currency.eq_ignore_ascii_case(currency))
            .try_fold(Money::zero(currency), |acc, t| {
                let next = if t.kind.is_credit() { acc.add(&t.money()) } else { acc.subtract(&t.money()) };
                next.map_err(StoreError::from)
            })
    }

    async fn persist(&self, items: &[Transaction]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(&LogFile { version: FORMAT_VERSION, transactions: items.to_vec() })?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}
