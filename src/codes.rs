use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Fallback label for any code the fixed tables do not carry.
pub const UNKNOWN_CODE: &str = "Unknown";

/// X12 claim status category codes (the letter-digit half of an STC
/// composite, e.g. the "F2" in "F2:542").
pub fn category_description(code: &str) -> &'static str {
    match code {
        "A0" => "Acknowledgement/Forwarded",
        "A1" => "Acknowledgement/Receipt",
        "A2" => "Acknowledgement/Acceptance into adjudication system",
        "A3" => "Acknowledgement/Returned as unprocessable claim",
        "A4" => "Acknowledgement/Not Found",
        "A5" => "Acknowledgement/Split Claim",
        "A6" => "Acknowledgement/Rejected for Missing Information",
        "A7" => "Acknowledgement/Rejected for Invalid Information",
        "A8" => "Acknowledgement/Rejected for relational field in error",
        "P0" => "Pending",
        "P1" => "Pending/In Process",
        "P2" => "Pending/Payer Review",
        "P3" => "Pending/Provider Requested Information",
        "P4" => "Pending/Patient Requested Information",
        "P5" => "Pending/Payer Administrative/System hold",
        "F0" => "Finalized",
        "F1" => "Finalized/Payment",
        "F2" => "Finalized/Denial",
        "F3" => "Finalized/Revised",
        "F4" => "Finalized/Adjudication Complete",
        "R0" => "Requests for additional information/General requests",
        "R1" => "Requests for additional information/Entity requests",
        "R3" => "Requests for additional information/Claim/line",
        "E0" => "Response not possible/Error on submitted request data",
        "E1" => "Response not possible/System status",
        "D0" => "Data Search Unsuccessful",
        _ => UNKNOWN_CODE,
    }
}

/// X12 claim status codes and the entity identifier codes that ride in the
/// same composite positions. One table serves both lookups, as the response
/// format interleaves them.
pub fn status_description(code: &str) -> &'static str {
    match code {
        "0" => "Cannot provide further status electronically",
        "1" => "For more detailed information, see remittance advice",
        "2" => "More detailed information in letter",
        "3" => "Claim has been adjudicated and is awaiting payment cycle",
        "12" => "One or more originally submitted procedure codes have been combined",
        "15" => "One or more originally submitted procedure code have been modified",
        "16" => "Claim/encounter has been forwarded to entity",
        "20" => "Accepted for processing",
        "21" => "Missing or invalid information",
        "65" => "Claim/line has been paid",
        "72" => "Claim/line has been denied",
        "85" => "Entity not eligible for benefits for submitted dates of service",
        "88" => "Entity not eligible for medical benefits for submitted dates of service",
        "107" => "Processed according to contract provisions",
        "171" => "Other insurance coverage information (health, liability, auto, etc.)",
        "204" => "Service not authorized",
        "252" => "Entity's authorization/certification number",
        "542" => "Payment reflects usual and customary charges",
        "585" => "Denied charge or non-covered charge",
        "608" => "Information submitted inconsistent with billing guidelines",
        // Entity identifier codes carried in the third composite position.
        "1P" => "Provider",
        "2B" => "Third-Party Administrator",
        "36" => "Employer",
        "40" => "Receiver",
        "41" => "Submitter",
        "IL" => "Insured or Subscriber",
        "PR" => "Payer",
        "QC" => "Patient",
        _ => UNKNOWN_CODE,
    }
}

/// One row of the denial code mapping table.
#[derive(Debug, Clone, Deserialize)]
pub struct DenialEntry {
    #[serde(rename = "DenialCode")]
    pub denial_code: String,
    #[serde(rename = "DenialCategory", default)]
    pub denial_category: String,
    #[serde(rename = "DenialReason", default)]
    pub denial_reason: String,
    #[serde(rename = "FinalSteps", default)]
    pub final_steps: String,
}

/// Denial code mapping, loaded once and read-only for the batch lifetime.
#[derive(Debug, Default)]
pub struct DenialTable {
    entries: Vec<DenialEntry>,
}

impl DenialTable {
    pub fn from_entries(entries: Vec<DenialEntry>) -> Self {
        Self { entries }
    }

    /// Loads the mapping CSV. A missing file yields an empty table so a run
    /// without the mapping still produces status text, just no denial columns.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            println!(
                "Denial code mapping not found at {}; denial enrichment disabled.",
                path.display()
            );
            return Ok(Self::default());
        }
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed opening denial code mapping {}", path.display()))?;
        let mut entries = Vec::new();
        for row in reader.deserialize() {
            let entry: DenialEntry = row.with_context(|| {
                format!("Failed reading denial code mapping row in {}", path.display())
            })?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    /// First entry whose code matches, whitespace-trimmed.
    pub fn lookup(&self, denial_code: &str) -> Option<&DenialEntry> {
        let wanted = denial_code.trim();
        if wanted.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.denial_code.trim() == wanted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
