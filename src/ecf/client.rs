// src/ecf/client.rs

//! HTTP client for the federation rating site
//!
//! Wraps reqwest's blocking client with retry support for the JSON
//! master-list downloads, the single-record lookups, and the multipart
//! submission upload.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for HTTP requests (60 seconds; the full ratings
/// download is large)
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Column schedule the players-ratings download must carry, in order.
/// A download with any other schedule is refused.
pub const PLAYERS_RATINGS_COLUMNS: [&str; 28] = [
    "ECF_code",
    "member_no",
    "FIDE_no",
    "full_name",
    "gender",
    "nation",
    "title",
    "age_category",
    "standard_original_rating",
    "standard_original_category",
    "standard_revised_rating",
    "standard_revised_category",
    "standard_games",
    "rapid_original_rating",
    "rapid_original_category",
    "rapid_revised_rating",
    "rapid_revised_category",
    "rapid_games",
    "blitz_original_rating",
    "blitz_original_category",
    "blitz_revised_rating",
    "blitz_revised_category",
    "blitz_games",
    "county",
    "membership_expiry",
    "FIDE_federation",
    "club_code",
    "club_name",
];

/// All-active-clubs download payload
#[derive(Debug, Clone, Deserialize)]
pub struct ClubsDownload {
    pub clubs: Vec<ClubRow>,
    pub success: bool,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub total_processing_time_today: Option<f64>,
    #[serde(default)]
    pub max_processing_time_daily: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClubRow {
    pub club_code: String,
    pub club_name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub assoc_code: Option<String>,
    #[serde(default)]
    pub assoc_name: Option<String>,
}

/// Players-ratings download payload. Player rows arrive as positional
/// arrays matching `column_names`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayersDownload {
    pub rating_effective_date: String,
    #[serde(default)]
    pub prior_rating_effective_date: Option<String>,
    pub column_names: Vec<String>,
    pub players: Vec<Vec<serde_json::Value>>,
    pub success: bool,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub total_processing_time_today: Option<f64>,
    #[serde(default)]
    pub max_processing_time_daily: Option<f64>,
}

impl PlayersDownload {
    /// Column index lookup against the fixed schedule
    pub fn column(name: &str) -> Option<usize> {
        PLAYERS_RATINGS_COLUMNS.iter().position(|c| *c == name)
    }

    /// Refuse a download whose column schedule differs from the one
    /// this program was written against.
    pub fn check_columns(&self) -> Result<()> {
        let matches = self.column_names.len() == PLAYERS_RATINGS_COLUMNS.len()
            && self
                .column_names
                .iter()
                .zip(PLAYERS_RATINGS_COLUMNS)
                .all(|(a, b)| a.as_str() == b);
        if !matches {
            return Err(Error::ValidationError(format!(
                "players download column schedule changed: {:?}",
                self.column_names
            )));
        }
        Ok(())
    }

    /// String value of a column in one player row
    pub fn cell<'a>(row: &'a [serde_json::Value], name: &str) -> Option<&'a str> {
        Self::column(name)
            .and_then(|i| row.get(i))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Single-club lookup payload
#[derive(Debug, Clone, Deserialize)]
pub struct SingleClub {
    pub club_code: String,
    pub club_name: String,
    #[serde(default)]
    pub assoc_name: Option<String>,
}

/// Single-player lookup payload
#[derive(Debug, Clone, Deserialize)]
pub struct SinglePlayer {
    #[serde(rename = "ECF_code")]
    pub ecf_code: String,
    pub full_name: String,
    #[serde(default)]
    pub club_code: Option<String>,
    #[serde(default)]
    pub club_name: Option<String>,
}

/// Flags accepted by the submit endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    pub email_graders: bool,
    pub report_only: bool,
    /// Documented as a guess at the federation's API; may have no
    /// server-side effect
    pub auto_create_players: bool,
}

/// HTTP client wrapper with retry support
pub struct EcfClient {
    client: reqwest::blocking::Client,
    max_retries: u32,
}

impl EcfClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// GET a URL with retry, returning the response body
    fn get_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return response
                        .text()
                        .map_err(|e| Error::DownloadError(format!("{url}: {e}")));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "{url} failed after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download the all-active-clubs list
    pub fn download_clubs(&self, url: &str) -> Result<ClubsDownload> {
        info!("Downloading club list from {}", url);
        let body = self.get_text(url)?;
        let download = parse_clubs(&body)?;
        info!("Downloaded {} clubs", download.clubs.len());
        Ok(download)
    }

    /// Download the players-ratings list, refusing a changed column
    /// schedule.
    pub fn download_players(&self, url: &str) -> Result<PlayersDownload> {
        info!("Downloading player ratings from {}", url);
        let body = self.get_text(url)?;
        let download = parse_players(&body)?;
        info!("Downloaded {} players", download.players.len());
        Ok(download)
    }

    /// Look up one club by federation club code
    pub fn lookup_club(&self, url: &str, code: &str) -> Result<SingleClub> {
        let body = self.get_text(&format!("{url}{code}"))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::DownloadError(format!("club lookup response: {e}")))
    }

    /// Look up one player by grading code
    pub fn lookup_player(&self, url: &str, code: &str) -> Result<SinglePlayer> {
        let body = self.get_text(&format!("{url}{code}"))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::DownloadError(format!("player lookup response: {e}")))
    }

    /// Upload a submission file. Returns the raw response body; the
    /// feedback applier decides whether the upload was committed.
    pub fn submit(
        &self,
        url: &str,
        username: &str,
        password: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
        options: SubmitOptions,
    ) -> Result<String> {
        info!("Submitting {} to {}", file_name, url);
        let part = reqwest::blocking::multipart::Part::bytes(file_bytes)
            .file_name(file_name.to_string());
        let mut form = reqwest::blocking::multipart::Form::new()
            .text("username", username.to_string())
            .text("password", password.to_string())
            .part("uploaded_file", part);
        if options.email_graders {
            form = form.text("email_graders", "on");
        }
        if options.report_only {
            form = form.text("report_only", "on");
        }
        if options.auto_create_players {
            form = form.text("auto_create_players", "on");
        }
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(|e| Error::DownloadError(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        response
            .text()
            .map_err(|e| Error::DownloadError(format!("{url}: {e}")))
    }
}

/// Decode and sanity-check a clubs download body
pub fn parse_clubs(body: &str) -> Result<ClubsDownload> {
    let download: ClubsDownload = serde_json::from_str(body)
        .map_err(|e| Error::DownloadError(format!("club list response: {e}")))?;
    if !download.success {
        return Err(Error::DownloadError(
            "club list download reported failure".to_string(),
        ));
    }
    Ok(download)
}

/// Decode and sanity-check a players download body
pub fn parse_players(body: &str) -> Result<PlayersDownload> {
    let download: PlayersDownload = serde_json::from_str(body)
        .map_err(|e| Error::DownloadError(format!("player list response: {e}")))?;
    if !download.success {
        return Err(Error::DownloadError(
            "player list download reported failure".to_string(),
        ));
    }
    download.check_columns()?;
    Ok(download)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players_body(columns: &[&str]) -> String {
        serde_json::json!({
            "rating_effective_date": "2024-08-01",
            "prior_rating_effective_date": "2024-07-01",
            "column_names": columns,
            "players": [],
            "success": true,
        })
        .to_string()
    }

    #[test]
    fn test_column_schedule_enforced() {
        let good: Vec<&str> = PLAYERS_RATINGS_COLUMNS.to_vec();
        assert!(parse_players(&players_body(&good)).is_ok());

        let mut bad = good.clone();
        bad.swap(0, 1);
        assert!(parse_players(&players_body(&bad)).is_err());
    }

    #[test]
    fn test_failed_download_flag() {
        let body = serde_json::json!({"clubs": [], "success": false}).to_string();
        assert!(parse_clubs(&body).is_err());
    }

    #[test]
    fn test_cell_extraction() {
        let mut row = vec![serde_json::Value::Null; 28];
        row[0] = serde_json::json!("123456A");
        row[3] = serde_json::json!("Smith, A");
        assert_eq!(PlayersDownload::cell(&row, "ECF_code"), Some("123456A"));
        assert_eq!(PlayersDownload::cell(&row, "full_name"), Some("Smith, A"));
        assert_eq!(PlayersDownload::cell(&row, "club_code"), None);
    }
}
