//! Batch submission engine.
//!
//! Fans one claim-status inquiry per input record out to the network under a
//! concurrency cap, then folds the replies back into index-aligned enriched
//! rows plus a failure list. Per-record failures are data, not control flow:
//! the engine always yields one row per input record, in input order, no
//! matter how individual requests fare. Only batch-level conditions (empty
//! input) abort before dispatch.

use anyhow::{Context, Result, anyhow};
use futures::{StreamExt, stream::FuturesUnordered};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::client::{InquiryReply, InquirySender};
use crate::codes::DenialTable;
use crate::constants::UNSUPPORTED_PAYER_STATUS;
use crate::decoder;
use crate::payers::PayerDirectory;
use crate::records::{
    InquiryPayload, LogicalField, RecordBatch, build_payload, is_trusted_payer_id,
};
use crate::resolver::PayerResolver;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub concurrency: usize,
    pub requests_per_second: u32,
    pub batch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            requests_per_second: 0,
            batch_timeout: Duration::from_secs(300),
        }
    }
}

/// One enriched output row; `index` ties it back to the input record.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRow {
    pub index: usize,
    /// Trading partner id used for the inquiry (resolved when the input's
    /// hint was insufficient).
    pub payer_id: String,
    pub claim_status: String,
    pub denial_code: String,
    pub denial_category: String,
    pub denial_reason: String,
    pub final_steps: String,
}

impl EnrichedRow {
    fn blank(index: usize, payer_id: String) -> Self {
        Self {
            index,
            payer_id,
            claim_status: String::new(),
            denial_code: String::new(),
            denial_category: String::new(),
            denial_reason: String::new(),
            final_steps: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InquiryFailure {
    pub index: usize,
    pub status_code: Option<u16>,
    pub error: String,
}

#[derive(Debug)]
pub struct InquiryResult {
    pub index: usize,
    pub payload: InquiryPayload,
    pub claim_status: String,
}

#[derive(Debug)]
pub struct BatchOutcome {
    /// Successful inquiries, sorted by original record index.
    pub results: Vec<InquiryResult>,
    /// Per-record failures, sorted by original record index.
    pub failures: Vec<InquiryFailure>,
    /// One row per input record, in input order. Failure rows carry the
    /// sentinel status or stay blank; they also appear in `failures`.
    pub rows: Vec<EnrichedRow>,
}

struct PreparedRecord {
    index: usize,
    payer_id: String,
    payload: InquiryPayload,
}

pub struct BatchEngine<D> {
    sender: Arc<dyn InquirySender>,
    resolver: PayerResolver<D>,
    denial_table: DenialTable,
    config: EngineConfig,
}

impl<D: PayerDirectory> BatchEngine<D> {
    pub fn new(
        sender: Arc<dyn InquirySender>,
        resolver: PayerResolver<D>,
        denial_table: DenialTable,
        config: EngineConfig,
    ) -> Self {
        Self {
            sender,
            resolver,
            denial_table,
            config,
        }
    }

    /// Builds one payload per record. A payer id hint shorter than the trust
    /// threshold goes through name resolution, and the resolved id replaces
    /// the hint in downstream reporting.
    fn prepare(&self, batch: &RecordBatch) -> Result<Vec<PreparedRecord>> {
        let mut prepared = Vec::with_capacity(batch.len());
        for index in 0..batch.len() {
            let hint = batch.field(index, LogicalField::PayerId);
            let payer_id = if is_trusted_payer_id(hint) {
                hint.trim().to_string()
            } else {
                let name = batch.field(index, LogicalField::PayerName);
                self.resolver
                    .resolve(name, hint)
                    .with_context(|| format!("Failed resolving payer for record {index}"))?
            };
            let payload = build_payload(batch, index, &payer_id);
            prepared.push(PreparedRecord {
                index,
                payer_id,
                payload,
            });
        }
        Ok(prepared)
    }

    /// Submits the whole batch and returns index-aligned rows, successful
    /// results, and the failure list.
    pub async fn submit(&self, batch: &RecordBatch) -> Result<BatchOutcome> {
        if batch.is_empty() {
            return Err(anyhow!("Input batch is empty; nothing to submit"));
        }

        let prepared = self.prepare(batch)?;
        let mut rows: Vec<EnrichedRow> = prepared
            .iter()
            .map(|record| EnrichedRow::blank(record.index, record.payer_id.clone()))
            .collect();
        let mut results = Vec::new();
        let mut failures = Vec::new();

        let total = prepared.len();
        let concurrency = self.config.concurrency.max(1);
        let min_interval = if self.config.requests_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.config.requests_per_second as f64)
        };
        let next_slot = Arc::new(Mutex::new(Instant::now()));
        // One ceiling for the whole network phase; requests still pending
        // when it elapses fail individually.
        let deadline = Instant::now() + self.config.batch_timeout;

        let progress = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [claims {elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ) {
            progress.set_style(style.progress_chars("=> "));
        }
        progress.set_message("submitting inquiries");

        let mut queue = prepared.into_iter();
        let mut in_flight = FuturesUnordered::new();

        for _ in 0..concurrency {
            if let Some(record) = queue.next() {
                in_flight.push(dispatch(
                    Arc::clone(&self.sender),
                    record,
                    deadline,
                    Arc::clone(&next_slot),
                    min_interval,
                ));
            }
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;

        while let Some((index, payload, outcome)) = in_flight.next().await {
            progress.inc(1);

            match outcome {
                Err(err) => {
                    failed += 1;
                    failures.push(InquiryFailure {
                        index,
                        status_code: None,
                        error: err.to_string(),
                    });
                }
                Ok(reply) if !reply.is_success() => {
                    failed += 1;
                    failures.push(InquiryFailure {
                        index,
                        status_code: Some(reply.status_code),
                        error: reply.error_message(),
                    });
                    rows[index].claim_status = UNSUPPORTED_PAYER_STATUS.to_string();
                }
                Ok(reply) => {
                    let body = reply.body.as_ref();
                    match body.and_then(|body| body.transaction_body()) {
                        None => {
                            failed += 1;
                            failures.push(InquiryFailure {
                                index,
                                status_code: Some(reply.status_code),
                                error: "No x12 data in response".to_string(),
                            });
                        }
                        Some(transaction) => {
                            succeeded += 1;
                            let claims = decoder::decode(transaction);
                            let rendered = decoder::render(&claims);
                            rows[index].claim_status = rendered.clone();

                            if let Some(code) =
                                body.and_then(|body| body.primary_status_code())
                            {
                                rows[index].denial_code = code.to_string();
                                if let Some(entry) = self.denial_table.lookup(code) {
                                    rows[index].denial_category = entry.denial_category.clone();
                                    rows[index].denial_reason = entry.denial_reason.clone();
                                    rows[index].final_steps = entry.final_steps.clone();
                                }
                            }

                            results.push(InquiryResult {
                                index,
                                payload,
                                claim_status: rendered,
                            });
                        }
                    }
                }
            }

            progress.set_message(format!("ok={succeeded} failed={failed}"));

            if let Some(record) = queue.next() {
                in_flight.push(dispatch(
                    Arc::clone(&self.sender),
                    record,
                    deadline,
                    Arc::clone(&next_slot),
                    min_interval,
                ));
            }
        }

        progress.finish_with_message(format!("done: ok={succeeded} failed={failed}"));

        results.sort_by_key(|result| result.index);
        failures.sort_by_key(|failure| failure.index);
        Ok(BatchOutcome {
            results,
            failures,
            rows,
        })
    }
}

async fn dispatch(
    sender: Arc<dyn InquirySender>,
    record: PreparedRecord,
    deadline: Instant,
    next_slot: Arc<Mutex<Instant>>,
    min_interval: Duration,
) -> (usize, InquiryPayload, Result<InquiryReply>) {
    crate::common::wait_for_rate_slot(&next_slot, min_interval).await;
    let outcome = match tokio::time::timeout_at(deadline, sender.send(&record.payload)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(anyhow!("Request still pending at the batch deadline")),
    };
    (record.index, record.payload, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClaimEnvelope, ClaimStatusInfo, ClaimStatusResponse};
    use crate::codes::DenialEntry;
    use crate::payers::{PayerRecord, StaticDirectory};
    use async_trait::async_trait;
    use csv::StringRecord;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Script {
        /// 200 with a decodable transaction whose TRN carries the member id.
        Transaction,
        /// 200 with a transaction plus a structured claim-status code.
        TransactionWithCode(&'static str),
        /// 200 without an x12 body.
        EmptyBody,
        HttpStatus(u16, &'static str),
        Transport(&'static str),
        /// Never completes within any test deadline.
        Hang,
    }

    struct MockSender {
        scripts: HashMap<String, Script>,
        /// Per-record completion delay in ms, keyed by member id; lets tests
        /// force a completion order different from submission order.
        delays: HashMap<String, u64>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockSender {
        fn new(scripts: HashMap<String, Script>, delays: HashMap<String, u64>) -> Self {
            Self {
                scripts,
                delays,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn transaction_for(member_id: &str) -> String {
            format!(
                "HL*4*3*22*0~TRN*2*TRN-{member_id}~STC*F2:542*20251031**100.00~SVC*HC:A4604*50*0~"
            )
        }
    }

    #[async_trait]
    impl InquirySender for MockSender {
        async fn send(&self, payload: &InquiryPayload) -> Result<InquiryReply> {
            let member_id = payload.subscriber.member_id.clone();
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay_ms) = self.delays.get(&member_id) {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let script = self
                .scripts
                .get(&member_id)
                .cloned()
                .unwrap_or(Script::Transaction);
            match script {
                Script::Transaction => Ok(InquiryReply {
                    status_code: 200,
                    body: Some(ClaimStatusResponse {
                        x12: Some(Self::transaction_for(&member_id)),
                        ..ClaimStatusResponse::default()
                    }),
                }),
                Script::TransactionWithCode(code) => Ok(InquiryReply {
                    status_code: 200,
                    body: Some(ClaimStatusResponse {
                        x12: Some(Self::transaction_for(&member_id)),
                        claims: vec![ClaimEnvelope {
                            claim_status: Some(ClaimStatusInfo {
                                status_code: Some(code.to_string()),
                            }),
                        }],
                        message: None,
                    }),
                }),
                Script::EmptyBody => Ok(InquiryReply {
                    status_code: 200,
                    body: Some(ClaimStatusResponse::default()),
                }),
                Script::HttpStatus(status_code, message) => Ok(InquiryReply {
                    status_code,
                    body: Some(ClaimStatusResponse {
                        message: Some(message.to_string()),
                        ..ClaimStatusResponse::default()
                    }),
                }),
                Script::Transport(message) => Err(anyhow!("{message}")),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(anyhow!("unreachable"))
                }
            }
        }
    }

    fn test_batch(count: usize) -> RecordBatch {
        let headers = vec![
            "Payor Name".to_string(),
            "ECS PAYOR ID".to_string(),
            "Insured ID".to_string(),
        ];
        let rows = (0..count)
            .map(|i| StringRecord::from(vec!["Aetna".to_string(), "60054".to_string(), i.to_string()]))
            .collect();
        RecordBatch::from_parts(headers, rows)
    }

    fn engine_with(
        sender: Arc<dyn InquirySender>,
        directory: StaticDirectory,
        denial_table: DenialTable,
        config: EngineConfig,
    ) -> BatchEngine<StaticDirectory> {
        BatchEngine::new(sender, PayerResolver::new(directory), denial_table, config)
    }

    fn quick_config() -> EngineConfig {
        EngineConfig {
            concurrency: 8,
            requests_per_second: 0,
            batch_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn results_realign_to_input_order_despite_scrambled_completion() {
        let count = 5;
        // Later records finish first.
        let delays: HashMap<String, u64> = (0..count)
            .map(|i| (i.to_string(), (count - i) as u64 * 20))
            .collect();
        let sender = Arc::new(MockSender::new(HashMap::new(), delays));
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            quick_config(),
        );

        let outcome = engine.submit(&test_batch(count)).await.unwrap();

        assert_eq!(outcome.rows.len(), count);
        assert!(outcome.failures.is_empty());
        for (i, row) in outcome.rows.iter().enumerate() {
            assert_eq!(row.index, i);
            assert!(row.claim_status.contains(&format!("Claim# TRN-{i}")));
        }
        let result_indices: Vec<usize> = outcome.results.iter().map(|r| r.index).collect();
        assert_eq!(result_indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn in_flight_requests_respect_the_concurrency_cap() {
        let delays: HashMap<String, u64> = (0..6).map(|i| (i.to_string(), 30)).collect();
        let sender = Arc::new(MockSender::new(HashMap::new(), delays));
        let engine = engine_with(
            Arc::clone(&sender) as Arc<dyn InquirySender>,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            EngineConfig {
                concurrency: 2,
                ..quick_config()
            },
        );

        engine.submit(&test_batch(6)).await.unwrap();
        assert!(sender.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn one_rejected_record_does_not_disturb_its_siblings() {
        let scripts = HashMap::from([(
            "1".to_string(),
            Script::HttpStatus(400, "Payer does not support claim status"),
        )]);
        let sender = Arc::new(MockSender::new(scripts, HashMap::new()));
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            quick_config(),
        );

        let outcome = engine.submit(&test_batch(3)).await.unwrap();

        assert_eq!(outcome.rows.len(), 3);
        assert_eq!(outcome.rows[1].claim_status, UNSUPPORTED_PAYER_STATUS);
        assert!(outcome.rows[0].claim_status.contains("Claim# TRN-0"));
        assert!(outcome.rows[2].claim_status.contains("Claim# TRN-2"));

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].status_code, Some(400));
        assert_eq!(
            outcome.failures[0].error,
            "Payer does not support claim status"
        );
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn success_without_a_transaction_body_is_a_failure_with_a_blank_row() {
        let scripts = HashMap::from([("0".to_string(), Script::EmptyBody)]);
        let sender = Arc::new(MockSender::new(scripts, HashMap::new()));
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            quick_config(),
        );

        let outcome = engine.submit(&test_batch(1)).await.unwrap();
        assert_eq!(outcome.rows[0].claim_status, "");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error, "No x12 data in response");
        assert_eq!(outcome.failures[0].status_code, Some(200));
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn transport_failures_are_isolated_per_record() {
        let scripts = HashMap::from([(
            "2".to_string(),
            Script::Transport("connection reset by peer"),
        )]);
        let sender = Arc::new(MockSender::new(scripts, HashMap::new()));
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            quick_config(),
        );

        let outcome = engine.submit(&test_batch(3)).await.unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 2);
        assert_eq!(outcome.failures[0].status_code, None);
        assert_eq!(outcome.rows[2].claim_status, "");
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn batch_deadline_fails_only_the_still_pending_record() {
        let scripts = HashMap::from([("1".to_string(), Script::Hang)]);
        let sender = Arc::new(MockSender::new(scripts, HashMap::new()));
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            EngineConfig {
                batch_timeout: Duration::from_millis(300),
                ..quick_config()
            },
        );

        let outcome = engine.submit(&test_batch(2)).await.unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert!(outcome.failures[0].error.contains("batch deadline"));
        assert!(outcome.rows[0].claim_status.contains("Claim# TRN-0"));
    }

    #[tokio::test]
    async fn denial_table_enriches_rows_with_a_structured_status_code() {
        let scripts = HashMap::from([
            ("0".to_string(), Script::TransactionWithCode("542")),
            ("1".to_string(), Script::TransactionWithCode("999")),
        ]);
        let sender = Arc::new(MockSender::new(scripts, HashMap::new()));
        let denial_table = DenialTable::from_entries(vec![DenialEntry {
            denial_code: "542".to_string(),
            denial_category: "Pricing".to_string(),
            denial_reason: "Usual and customary".to_string(),
            final_steps: "Review fee schedule".to_string(),
        }]);
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            denial_table,
            quick_config(),
        );

        let outcome = engine.submit(&test_batch(2)).await.unwrap();

        assert_eq!(outcome.rows[0].denial_code, "542");
        assert_eq!(outcome.rows[0].denial_category, "Pricing");
        assert_eq!(outcome.rows[0].final_steps, "Review fee schedule");
        // Code present but unmapped: code recorded, classification blank.
        assert_eq!(outcome.rows[1].denial_code, "999");
        assert_eq!(outcome.rows[1].denial_category, "");
    }

    #[tokio::test]
    async fn short_payer_id_hints_go_through_name_resolution() {
        let sender = Arc::new(MockSender::new(HashMap::new(), HashMap::new()));
        let directory = StaticDirectory::new(vec![PayerRecord {
            payer_id: "62308".to_string(),
            display_name: "Cigna".to_string(),
            aliases: String::new(),
        }]);
        let engine = engine_with(
            sender,
            directory,
            DenialTable::default(),
            quick_config(),
        );

        let headers = vec![
            "Payor Name".to_string(),
            "ECS PAYOR ID".to_string(),
            "Insured ID".to_string(),
        ];
        let rows = vec![
            // Hint too short: resolved via the directory.
            StringRecord::from(vec!["Cigna", "08", "0"]),
            // Hint long enough: trusted as-is, directory never consulted.
            StringRecord::from(vec!["Unknown Payer", "87726", "1"]),
            // Unresolvable: empty id, the remote service gets to reject it.
            StringRecord::from(vec!["No Such Payer", "", "2"]),
        ];
        let batch = RecordBatch::from_parts(headers, rows);

        let outcome = engine.submit(&batch).await.unwrap();
        assert_eq!(outcome.rows[0].payer_id, "62308");
        assert_eq!(outcome.rows[1].payer_id, "87726");
        assert_eq!(outcome.rows[2].payer_id, "");
        assert_eq!(
            outcome.results[0].payload.trading_partner_service_id,
            "62308"
        );
    }

    #[tokio::test]
    async fn empty_batches_abort_before_dispatch() {
        let sender = Arc::new(MockSender::new(HashMap::new(), HashMap::new()));
        let engine = engine_with(
            sender,
            StaticDirectory::new(vec![]),
            DenialTable::default(),
            quick_config(),
        );
        let batch = RecordBatch::from_parts(vec!["Payor Name".to_string()], vec![]);
        assert!(engine.submit(&batch).await.is_err());
    }
}
