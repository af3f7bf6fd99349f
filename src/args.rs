use clap::Parser;

use crate::constants::DEFAULT_CLAIM_STATUS_API_URL;

#[derive(Debug, Parser)]
#[command(name = "claim_enricher")]
#[command(
    about = "Submit batched claim-status inquiries and enrich patient records with decoded results"
)]
pub struct Args {
    /// Input patient claims CSV.
    #[arg(long)]
    pub input_path: std::path::PathBuf,

    /// Enriched output CSV path. Defaults to <input stem>_enriched.csv next to the input.
    #[arg(long)]
    pub output_path: Option<std::path::PathBuf>,

    /// Failure report JSON path. Defaults to <input stem>_failures.json next to the input.
    #[arg(long)]
    pub failures_path: Option<std::path::PathBuf>,

    /// SQLite payer directory database (stedi_payers table).
    #[arg(long)]
    pub payer_db: Option<std::path::PathBuf>,

    /// Payer directory CSV, used when no database is given.
    #[arg(long)]
    pub payer_csv: Option<std::path::PathBuf>,

    /// Denial code mapping CSV (DenialCode, DenialCategory, DenialReason, FinalSteps).
    /// Missing file disables denial enrichment instead of failing.
    #[arg(long)]
    pub code_mapping_csv: Option<std::path::PathBuf>,

    /// Max concurrent in-flight claim-status requests.
    #[arg(long, default_value_t = 50)]
    pub concurrency: usize,

    /// Global request start rate for API calls. 0 disables the gate.
    #[arg(long, default_value_t = 0)]
    pub requests_per_second: u32,

    /// Max retry attempts for transient API failures.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Overall ceiling for the batch network phase, in seconds. Requests still
    /// pending at the ceiling fail individually.
    #[arg(long, default_value_t = 300)]
    pub batch_timeout_secs: u64,

    /// Optional cap on the number of input records submitted in this run.
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Claim-status API base URL.
    #[arg(long, default_value = DEFAULT_CLAIM_STATUS_API_URL)]
    pub api_url: String,

    /// API key. Falls back to the STEDI_API_KEY environment variable.
    #[arg(long)]
    pub api_key: Option<String>,
}
