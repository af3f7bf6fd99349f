//! Input record access and request payload construction.
//!
//! Input rows arrive from operator-maintained spreadsheets whose column
//! names drift between exports, so every logical field is resolved through
//! an explicit ordered alias list instead of ad hoc per-column lookups.

use anyhow::{Context, Result};
use csv::StringRecord;
use serde::Serialize;
use std::path::Path;

use crate::common::to_request_date;

/// A payer id hint shorter than this is treated as insufficient and the
/// record goes through name resolution instead.
pub const MIN_TRUSTED_ID_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalField {
    PayerName,
    PayerId,
    FirstName,
    LastName,
    DateOfBirth,
    MemberId,
    Npi,
    FromDateOfService,
    ToDateOfService,
}

/// Accepted column spellings per logical field, in priority order.
fn aliases(field: LogicalField) -> &'static [&'static str] {
    match field {
        LogicalField::PayerName => &["Payor Name", "payer name", "Payer Name"],
        LogicalField::PayerId => &["ECS PAYOR ID", "ECS ID", "payer id", "Payer ID"],
        LogicalField::FirstName => &["First Name", "Sub First Name"],
        LogicalField::LastName => &["Last Name", "Sub Last Name"],
        LogicalField::DateOfBirth => &["DOB", "Sub DOB"],
        LogicalField::MemberId => &["Insured ID", "Member ID"],
        LogicalField::Npi => &["NPI", "Org npi"],
        LogicalField::FromDateOfService => &["From DOS", "Beginning DOS"],
        LogicalField::ToDateOfService => &["To DOS", "End DOS"],
    }
}

fn header_matches(header: &str, alias: &str) -> bool {
    header.trim().trim_matches('"').eq_ignore_ascii_case(alias)
}

/// One input CSV: headers plus rows in file order. Row index is the record's
/// identity for the whole batch.
pub struct RecordBatch {
    headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl RecordBatch {
    pub fn from_csv(path: &Path, max_records: Option<usize>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed opening input CSV {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed reading headers from {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for row in reader.records() {
            if let Some(limit) = max_records {
                if rows.len() >= limit {
                    break;
                }
            }
            rows.push(row.with_context(|| format!("Failed reading row from {}", path.display()))?);
        }
        Ok(Self { headers, rows })
    }

    pub fn from_parts(headers: Vec<String>, rows: Vec<StringRecord>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column index for a logical field, first matching alias wins.
    pub fn column(&self, field: LogicalField) -> Option<usize> {
        for alias in aliases(field) {
            if let Some(position) = self
                .headers
                .iter()
                .position(|header| header_matches(header, alias))
            {
                return Some(position);
            }
        }
        None
    }

    /// Trimmed field value, empty when the column is absent.
    pub fn field(&self, row_index: usize, field: LogicalField) -> &str {
        let Some(column) = self.column(field) else {
            return "";
        };
        self.rows
            .get(row_index)
            .and_then(|row| row.get(column))
            .map(str::trim)
            .unwrap_or("")
    }
}

/// True when the supplied payer id hint is long enough to route on as-is.
pub fn is_trusted_payer_id(id_hint: &str) -> bool {
    id_hint.trim().len() >= MIN_TRUSTED_ID_LEN
}

/// Strips the float artifact spreadsheet exports leave on numeric ids
/// ("1578592309.0" -> "1578592309").
fn clean_numeric(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(stripped) = trimmed.strip_suffix(".0") {
        if !stripped.is_empty() && stripped.bytes().all(|b| b.is_ascii_digit()) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct Encounter {
    #[serde(rename = "beginningDateOfService")]
    pub beginning_date_of_service: String,
    #[serde(rename = "endDateOfService")]
    pub end_date_of_service: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Provider {
    pub npi: String,
    #[serde(rename = "organizationName")]
    pub organization_name: String,
    #[serde(rename = "providerType")]
    pub provider_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscriber {
    #[serde(rename = "dateOfBirth")]
    pub date_of_birth: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "memberId")]
    pub member_id: String,
}

/// The claim-status inquiry request body.
#[derive(Debug, Clone, Serialize)]
pub struct InquiryPayload {
    pub encounter: Encounter,
    pub providers: Vec<Provider>,
    pub subscriber: Subscriber,
    #[serde(rename = "tradingPartnerServiceId")]
    pub trading_partner_service_id: String,
}

/// Builds the request payload for one row. Malformed or missing dates become
/// empty strings rather than failing construction.
pub fn build_payload(
    batch: &RecordBatch,
    row_index: usize,
    trading_partner_service_id: &str,
) -> InquiryPayload {
    InquiryPayload {
        encounter: Encounter {
            beginning_date_of_service: to_request_date(
                batch.field(row_index, LogicalField::FromDateOfService),
            ),
            end_date_of_service: to_request_date(
                batch.field(row_index, LogicalField::ToDateOfService),
            ),
        },
        providers: vec![Provider {
            npi: clean_numeric(batch.field(row_index, LogicalField::Npi)),
            organization_name: batch.field(row_index, LogicalField::PayerName).to_string(),
            provider_type: "BillingProvider".to_string(),
        }],
        subscriber: Subscriber {
            date_of_birth: to_request_date(batch.field(row_index, LogicalField::DateOfBirth)),
            first_name: batch.field(row_index, LogicalField::FirstName).to_string(),
            last_name: batch.field(row_index, LogicalField::LastName).to_string(),
            member_id: batch.field(row_index, LogicalField::MemberId).to_string(),
        },
        trading_partner_service_id: trading_partner_service_id.to_string(),
    }
}
