//! services/api/src/adapters/parse_api.rs
//!
//! Client for the hosted document parsing service. Implements the
//! `DocumentParsingService` port by uploading the PDF, polling the parse job
//! and fetching the extracted text.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use studius_core::{
    domain::{ParseMode, ParsedDocument},
    ports::{DocumentParsingService, PortError, PortResult},
};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: u32 = 90;

/// Rough characters-per-page used when the service omits a page count.
const CHARS_PER_PAGE_ESTIMATE: usize = 1_800;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `DocumentParsingService` against the hosted
/// parsing API.
#[derive(Clone)]
pub struct ParseApiAdapter {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ParseApiAdapter {
    /// Creates a new `ParseApiAdapter`.
    pub fn new(api_key: String, base_url: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn mode_value(mode: ParseMode) -> &'static str {
    match mode {
        ParseMode::Fast => "fast",
        ParseMode::Ocr => "ocr",
        ParseMode::Premium => "premium",
    }
}

fn estimate_page_count(text: &str) -> i32 {
    (text.len().div_ceil(CHARS_PER_PAGE_ESTIMATE)).max(1) as i32
}

fn request_failed(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("Parsing service request failed: {}", e))
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct JobStatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct JobResultResponse {
    text: String,
    #[serde(default)]
    job_metadata: Option<JobMetadata>,
}

#[derive(Deserialize)]
struct JobMetadata {
    #[serde(default)]
    job_pages: Option<i64>,
}

//=========================================================================================
// `DocumentParsingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentParsingService for ParseApiAdapter {
    async fn parse_pdf(
        &self,
        data: &[u8],
        filename: &str,
        mode: ParseMode,
    ) -> PortResult<ParsedDocument> {
        // 1. Upload the document and open a parse job.
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| PortError::Unexpected(format!("Invalid upload part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("parse_mode", mode_value(mode));

        let upload: UploadResponse = self
            .http
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;
        debug!(job_id = %upload.id, "parse job opened");

        // 2. Poll until the job settles.
        let mut succeeded = false;
        for _ in 0..MAX_POLLS {
            let status: JobStatusResponse = self
                .http
                .get(format!("{}/job/{}", self.base_url, upload.id))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(request_failed)?
                .error_for_status()
                .map_err(request_failed)?
                .json()
                .await
                .map_err(request_failed)?;

            match status.status.to_ascii_uppercase().as_str() {
                "SUCCESS" => {
                    succeeded = true;
                    break;
                }
                "ERROR" | "CANCELED" => {
                    return Err(PortError::Unexpected(format!(
                        "Parse job {} failed with status {}",
                        upload.id, status.status
                    )));
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        if !succeeded {
            return Err(PortError::Unexpected(format!(
                "Parse job {} did not finish in time",
                upload.id
            )));
        }

        // 3. Fetch the extracted text.
        let result: JobResultResponse = self
            .http
            .get(format!("{}/job/{}/result/text", self.base_url, upload.id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(request_failed)?
            .error_for_status()
            .map_err(request_failed)?
            .json()
            .await
            .map_err(request_failed)?;

        let page_count = result
            .job_metadata
            .and_then(|m| m.job_pages)
            .map(|p| p.max(1) as i32)
            .unwrap_or_else(|| estimate_page_count(&result.text));

        Ok(ParsedDocument {
            text: result.text,
            page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_values_match_the_service_contract() {
        assert_eq!(mode_value(ParseMode::Fast), "fast");
        assert_eq!(mode_value(ParseMode::Ocr), "ocr");
        assert_eq!(mode_value(ParseMode::Premium), "premium");
    }

    #[test]
    fn page_estimate_has_a_floor_of_one() {
        assert_eq!(estimate_page_count(""), 1);
        assert_eq!(estimate_page_count("breve"), 1);
        assert_eq!(estimate_page_count(&"x".repeat(1_800)), 1);
        assert_eq!(estimate_page_count(&"x".repeat(1_801)), 2);
        assert_eq!(estimate_page_count(&"x".repeat(9_000)), 5);
    }

    #[test]
    fn result_payload_parses_with_and_without_metadata() {
        let with: JobResultResponse = serde_json::from_str(
            r#"{"text": "contenuto", "job_metadata": {"job_pages": 12}}"#,
        )
        .unwrap();
        assert_eq!(with.job_metadata.and_then(|m| m.job_pages), Some(12));

        let without: JobResultResponse = serde_json::from_str(r#"{"text": "contenuto"}"#).unwrap();
        assert!(without.job_metadata.is_none());
    }

    #[test]
    fn status_payload_parses() {
        let status: JobStatusResponse = serde_json::from_str(r#"{"status": "PENDING"}"#).unwrap();
        assert_eq!(status.status, "PENDING");
    }
}
