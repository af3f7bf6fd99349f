use chrono::NaiveDate;
use reqwest::{StatusCode, header::HeaderValue};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

const MAX_LOG_BODY_CHARS: usize = 500;

/// Accepted calendar date layouts for input records, tried in order.
const INPUT_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%y"];

/// Reformats a locale calendar date to YYYYMMDD for the request payload.
/// Malformed or empty dates become an empty string rather than an error.
pub fn to_request_date(raw: &str) -> String {
    let token = match raw.trim().split_whitespace().next() {
        Some(token) => token,
        None => return String::new(),
    };
    for format in INPUT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(token, format) {
            return date.format("%Y%m%d").to_string();
        }
    }
    String::new()
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let seconds: u64 = header?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

pub fn truncate_for_log(body: &str) -> String {
    if body.chars().count() <= MAX_LOG_BODY_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
    format!("{truncated}... [truncated]")
}

/// Blocks until this task owns the next request start slot, spacing request
/// starts by `min_interval` across all tasks sharing `next_slot`.
pub async fn wait_for_rate_slot(next_slot: &Mutex<Instant>, min_interval: Duration) {
    if min_interval.is_zero() {
        return;
    }
    let scheduled = {
        let mut slot = next_slot.lock().await;
        let now = Instant::now();
        let scheduled = (*slot).max(now);
        *slot = scheduled + min_interval;
        scheduled
    };
    tokio::time::sleep_until(scheduled).await;
}

/// Builds "<input stem><suffix>.<ext>" next to the input file.
pub fn sibling_path(input_path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("batch");
    input_path.with_file_name(format!("{stem}{suffix}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_dates_accept_common_layouts() {
        assert_eq!(to_request_date("07/25/2025"), "20250725");
        assert_eq!(to_request_date("1/2/1980"), "19800102");
        assert_eq!(to_request_date("1980-01-02"), "19800102");
        assert_eq!(to_request_date("1/2/1980 0:00"), "19800102");
    }

    #[test]
    fn malformed_request_dates_become_empty() {
        assert_eq!(to_request_date(""), "");
        assert_eq!(to_request_date("not a date"), "");
        assert_eq!(to_request_date("13/45/2025"), "");
    }

    #[test]
    fn retry_after_header_parses_seconds() {
        let header = HeaderValue::from_static("7");
        assert_eq!(
            parse_retry_after(Some(&header)),
            Some(Duration::from_secs(7))
        );
        let bad = HeaderValue::from_static("soon");
        assert_eq!(parse_retry_after(Some(&bad)), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
