//! Payer directory backends.
//!
//! The resolver reads payer records through the [`PayerDirectory`] trait so
//! the directory source stays swappable: a SQLite `stedi_payers` table for
//! database-backed runs, or an in-memory set loaded from a payer CSV. Both
//! restrict the candidate set to payers enabled for claim-status inquiries
//! and optionally narrow it by a partial payer-id hint (suffix match). The
//! directory is read-only for the duration of a batch.

use anyhow::{Context, Result};
use rusqlite::Connection as SqliteConnection;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayerRecord {
    pub payer_id: String,
    pub display_name: String,
    pub aliases: String,
}

pub trait PayerDirectory {
    /// Claim-status-enabled payers, optionally narrowed by an id hint.
    /// An empty hint returns the full claim-status candidate set.
    fn claim_status_payers(&self, id_hint: &str) -> Result<Vec<PayerRecord>>;
}

impl PayerDirectory for Box<dyn PayerDirectory> {
    fn claim_status_payers(&self, id_hint: &str) -> Result<Vec<PayerRecord>> {
        (**self).claim_status_payers(id_hint)
    }
}

/// In-memory directory over records already filtered to claim-status payers.
pub struct StaticDirectory {
    records: Vec<PayerRecord>,
}

#[derive(Debug, Deserialize)]
struct PayerCsvRow {
    #[serde(rename = "PayerId")]
    payer_id: String,
    #[serde(rename = "DisplayName")]
    display_name: String,
    #[serde(rename = "Aliases", default)]
    aliases: String,
    #[serde(rename = "ClaimStatusInquiry", default)]
    claim_status_inquiry: String,
}

fn is_truthy(flag: &str) -> bool {
    matches!(flag.trim(), "1" | "true" | "True" | "TRUE" | "yes" | "Yes")
}

impl StaticDirectory {
    pub fn new(records: Vec<PayerRecord>) -> Self {
        Self { records }
    }

    /// Loads a payer CSV, keeping only claim-status-enabled rows.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed opening payer CSV {}", path.display()))?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            let row: PayerCsvRow = row
                .with_context(|| format!("Failed reading payer CSV row in {}", path.display()))?;
            if !is_truthy(&row.claim_status_inquiry) {
                continue;
            }
            records.push(PayerRecord {
                payer_id: row.payer_id.trim().to_string(),
                display_name: row.display_name,
                aliases: row.aliases,
            });
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PayerDirectory for StaticDirectory {
    fn claim_status_payers(&self, id_hint: &str) -> Result<Vec<PayerRecord>> {
        let hint = id_hint.trim();
        Ok(self
            .records
            .iter()
            .filter(|record| hint.is_empty() || record.payer_id.ends_with(hint))
            .cloned()
            .collect())
    }
}

/// Directory over a SQLite `stedi_payers` table.
pub struct SqlitePayerDirectory {
    conn: SqliteConnection,
}

impl SqlitePayerDirectory {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = SqliteConnection::open(path)
            .with_context(|| format!("Failed opening payer directory DB {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed setting payer directory journal mode")?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }
}

impl PayerDirectory for SqlitePayerDirectory {
    fn claim_status_payers(&self, id_hint: &str) -> Result<Vec<PayerRecord>> {
        let hint = id_hint.trim();
        let mut stmt = self
            .conn
            .prepare(
                "SELECT payer_id, display_name, COALESCE(aliases, '')
                 FROM stedi_payers
                 WHERE claim_status_inquiry = 1
                   AND (?1 = '' OR payer_id LIKE '%' || ?1)",
            )
            .context("Failed preparing payer directory query")?;
        let rows = stmt
            .query_map([hint], |row| {
                Ok(PayerRecord {
                    payer_id: row.get(0)?,
                    display_name: row.get(1)?,
                    aliases: row.get(2)?,
                })
            })
            .context("Failed querying payer directory")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed reading payer directory row")?);
        }
        Ok(records)
    }
}
