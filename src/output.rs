//! Enriched output writing.

use anyhow::{Context, Result};
use csv::Writer;
use std::{fs, path::Path};

use crate::engine::{EnrichedRow, InquiryFailure};
use crate::records::{LogicalField, RecordBatch};

/// Columns appended after the original input columns.
const ENRICHMENT_COLUMNS: [&str; 5] = [
    "claim_status",
    "denial_code",
    "denial_category",
    "denial_reason",
    "final_steps",
];

/// Writes one output row per input row: the original columns (with the payer
/// id column overwritten by the id actually used for the inquiry) plus the
/// enrichment columns. Written to a temp file first, then renamed into place.
pub fn write_enriched_csv(
    output_path: &Path,
    batch: &RecordBatch,
    rows: &[EnrichedRow],
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed creating output directory {}", parent.display())
        })?;
    }

    let file_name = output_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("enriched.csv");
    let tmp_path = output_path.with_file_name(format!("{file_name}.tmp"));

    let mut writer = Writer::from_path(&tmp_path)
        .with_context(|| format!("Failed creating temp output CSV {}", tmp_path.display()))?;

    let mut header: Vec<&str> = batch.headers().iter().map(String::as_str).collect();
    header.extend(ENRICHMENT_COLUMNS);
    writer
        .write_record(&header)
        .context("Failed writing output CSV header")?;

    let payer_id_column = batch.column(LogicalField::PayerId);
    for (input_row, enriched) in batch.rows.iter().zip(rows) {
        let mut record: Vec<&str> = input_row.iter().collect();
        // Input rows can be ragged; pad to the header width.
        record.resize(batch.headers().len(), "");
        if let Some(column) = payer_id_column {
            record[column] = &enriched.payer_id;
        }
        record.push(&enriched.claim_status);
        record.push(&enriched.denial_code);
        record.push(&enriched.denial_category);
        record.push(&enriched.denial_reason);
        record.push(&enriched.final_steps);
        writer
            .write_record(&record)
            .context("Failed writing output CSV row")?;
    }
    writer.flush().context("Failed flushing output CSV")?;
    drop(writer);

    fs::rename(&tmp_path, output_path).with_context(|| {
        format!(
            "Failed moving temp output {} to {}",
            tmp_path.display(),
            output_path.display()
        )
    })?;
    Ok(())
}

/// Writes the per-record failure report.
pub fn write_failures_json(path: &Path, failures: &[InquiryFailure]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed creating failure report {}", path.display()))?;
    serde_json::to_writer_pretty(file, failures)
        .with_context(|| format!("Failed writing failure report {}", path.display()))?;
    Ok(())
}
