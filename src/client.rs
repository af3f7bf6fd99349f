//! Claim-status API client.
//!
//! The batch engine talks to the network through [`InquirySender`] so tests
//! can inject a scripted sender; [`StediClient`] is the production
//! implementation over reqwest, with bounded retry for transient statuses.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{AUTHORIZATION, RETRY_AFTER},
};
use serde::Deserialize;
use std::time::Duration;

use crate::common::{is_retryable_status, parse_retry_after, truncate_for_log};
use crate::records::InquiryPayload;

/// Parsed claim-status response body. Only the fields the pipeline consumes
/// are modeled; everything else in the response is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimStatusResponse {
    /// The raw 277 transaction body, segment text under the `x12` key.
    #[serde(default)]
    pub x12: Option<String>,
    #[serde(default)]
    pub claims: Vec<ClaimEnvelope>,
    /// Error message carried by non-success replies.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimEnvelope {
    #[serde(rename = "claimStatus", default)]
    pub claim_status: Option<ClaimStatusInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimStatusInfo {
    #[serde(rename = "statusCode", default)]
    pub status_code: Option<String>,
}

impl ClaimStatusResponse {
    /// The decodable transaction body, if the response carries one.
    pub fn transaction_body(&self) -> Option<&str> {
        self.x12.as_deref().filter(|body| !body.trim().is_empty())
    }

    /// The structured claim-status code used for denial-table enrichment.
    pub fn primary_status_code(&self) -> Option<&str> {
        self.claims
            .first()?
            .claim_status
            .as_ref()?
            .status_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// One HTTP reply: status plus the parsed body when the body was valid JSON.
/// Transport failures never reach this type; they surface as `Err` from
/// [`InquirySender::send`].
#[derive(Debug)]
pub struct InquiryReply {
    pub status_code: u16,
    pub body: Option<ClaimStatusResponse>,
}

impl InquiryReply {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Best-effort failure message for the failure report.
    pub fn error_message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|body| body.message.clone())
            .unwrap_or_else(|| format!("HTTP status {}", self.status_code))
    }
}

#[async_trait]
pub trait InquirySender: Send + Sync {
    async fn send(&self, payload: &InquiryPayload) -> Result<InquiryReply>;
}

pub struct StediClient {
    http: Client,
    api_url: String,
    api_key: String,
    max_retries: u32,
}

impl StediClient {
    pub fn new(http: Client, api_url: String, api_key: String, max_retries: u32) -> Self {
        Self {
            http,
            api_url,
            api_key,
            max_retries,
        }
    }
}

#[async_trait]
impl InquirySender for StediClient {
    async fn send(&self, payload: &InquiryPayload) -> Result<InquiryReply> {
        let attempts = self.max_retries.max(1);
        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=attempts {
            let response = self
                .http
                .post(&self.api_url)
                .header(AUTHORIZATION, self.api_key.as_str())
                .json(payload)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if is_retryable_status(status) && attempt < attempts {
                        let retry_after = parse_retry_after(resp.headers().get(RETRY_AFTER));
                        tokio::time::sleep(retry_after.unwrap_or(backoff)).await;
                        backoff = (backoff + backoff).min(Duration::from_secs(60));
                        continue;
                    }

                    let status_code = status.as_u16();
                    let text = resp
                        .text()
                        .await
                        .with_context(|| format!("Failed reading response body ({status})"))?;
                    // A body that is not valid JSON still yields a reply;
                    // downstream decides whether that is a failure.
                    let body = serde_json::from_str::<ClaimStatusResponse>(&text).ok();
                    if body.is_none() && !text.is_empty() {
                        println!(
                            "Unparseable response body ({status}): {}",
                            truncate_for_log(&text)
                        );
                    }
                    return Ok(InquiryReply { status_code, body });
                }
                Err(err) => {
                    if attempt == attempts {
                        return Err(anyhow!("Claim status request failed: {err}"));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff + backoff).min(Duration::from_secs(60));
                }
            }
        }

        Err(anyhow!("Unexpected claim status request flow"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_body_requires_nonblank_x12() {
        let with_body = ClaimStatusResponse {
            x12: Some("HL*4*3*22*0~".to_string()),
            ..ClaimStatusResponse::default()
        };
        assert_eq!(with_body.transaction_body(), Some("HL*4*3*22*0~"));

        let blank = ClaimStatusResponse {
            x12: Some("   ".to_string()),
            ..ClaimStatusResponse::default()
        };
        assert_eq!(blank.transaction_body(), None);
        assert_eq!(ClaimStatusResponse::default().transaction_body(), None);
    }

    #[test]
    fn primary_status_code_reads_the_first_claim() {
        let parsed: ClaimStatusResponse = serde_json::from_str(
            r#"{
                "x12": "HL*4*3*22*0~",
                "claims": [
                    {"claimStatus": {"statusCode": " 542 "}},
                    {"claimStatus": {"statusCode": "171"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.primary_status_code(), Some("542"));

        let empty: ClaimStatusResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.primary_status_code(), None);
    }

    #[test]
    fn error_message_prefers_the_body_message() {
        let reply = InquiryReply {
            status_code: 422,
            body: Some(ClaimStatusResponse {
                message: Some("Payer does not support claim status".to_string()),
                ..ClaimStatusResponse::default()
            }),
        };
        assert_eq!(reply.error_message(), "Payer does not support claim status");

        let bare = InquiryReply {
            status_code: 502,
            body: None,
        };
        assert_eq!(bare.error_message(), "HTTP status 502");
        assert!(!bare.is_success());
    }
}
