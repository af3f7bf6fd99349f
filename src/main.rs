mod args;
mod client;
mod codes;
mod common;
mod constants;
mod decoder;
mod engine;
mod output;
mod payers;
mod records;
mod resolver;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::{sync::Arc, time::Duration};

use args::Args;
use client::StediClient;
use codes::DenialTable;
use common::sibling_path;
use constants::{API_KEY_ENV_VAR, STEDI_API_DOC_URL, STEDI_PAYER_NETWORK_URL};
use engine::{BatchEngine, EngineConfig};
use output::{write_enriched_csv, write_failures_json};
use payers::{PayerDirectory, SqlitePayerDirectory, StaticDirectory};
use records::RecordBatch;
use resolver::PayerResolver;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("Claim status API references:");
    println!("  - {STEDI_API_DOC_URL}");
    println!("  - {STEDI_PAYER_NETWORK_URL}");

    let api_key = match args.api_key.clone() {
        Some(key) => key,
        None => std::env::var(API_KEY_ENV_VAR)
            .with_context(|| format!("Pass --api-key or set {API_KEY_ENV_VAR}"))?,
    };

    let batch = RecordBatch::from_csv(&args.input_path, args.max_records)?;
    println!(
        "Loaded {} records from {}",
        batch.len(),
        args.input_path.display()
    );

    let directory: Box<dyn PayerDirectory> = if let Some(db_path) = &args.payer_db {
        println!("Using payer directory DB {}", db_path.display());
        Box::new(SqlitePayerDirectory::open(db_path)?)
    } else if let Some(csv_path) = &args.payer_csv {
        let directory = StaticDirectory::from_csv(csv_path)?;
        println!(
            "Loaded {} claim-status payers from {}",
            directory.len(),
            csv_path.display()
        );
        Box::new(directory)
    } else {
        println!("No payer directory given; short payer id hints will go out unresolved.");
        Box::new(StaticDirectory::new(Vec::new()))
    };

    let denial_table = match &args.code_mapping_csv {
        Some(path) => {
            let table = DenialTable::load(path)?;
            if !table.is_empty() {
                println!(
                    "Loaded {} denial code mappings from {}",
                    table.len(),
                    path.display()
                );
            }
            table
        }
        None => {
            println!("No denial code mapping given; denial enrichment disabled.");
            DenialTable::default()
        }
    };

    let http = Client::builder()
        .user_agent("claim-enricher/0.1")
        .build()
        .context("Failed creating HTTP client")?;
    let sender = Arc::new(StediClient::new(
        http,
        args.api_url.clone(),
        api_key,
        args.max_retries.max(1),
    ));

    let engine = BatchEngine::new(
        sender,
        PayerResolver::new(directory),
        denial_table,
        EngineConfig {
            concurrency: args.concurrency,
            requests_per_second: args.requests_per_second,
            batch_timeout: Duration::from_secs(args.batch_timeout_secs),
        },
    );

    println!(
        "Submitting {} claim status inquiries with max {} concurrent connections...",
        batch.len(),
        args.concurrency
    );
    let outcome = engine.submit(&batch).await?;

    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| sibling_path(&args.input_path, "_enriched", "csv"));
    write_enriched_csv(&output_path, &batch, &outcome.rows)?;
    println!("Wrote enriched output {}", output_path.display());

    let failures_path = args
        .failures_path
        .clone()
        .unwrap_or_else(|| sibling_path(&args.input_path, "_failures", "json"));
    write_failures_json(&failures_path, &outcome.failures)?;
    println!(
        "Completed: {} succeeded, {} failed. Failure report at {}",
        outcome.results.len(),
        outcome.failures.len(),
        failures_path.display()
    );

    Ok(())
}
