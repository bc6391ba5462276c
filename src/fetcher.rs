use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::{Config, FETCH_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{now_ns, Snapshot};

/// Pulls the current aggregate snapshot from the backend. One call, one
/// snapshot; retry policy belongs to the caller.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot>;
}

/// `GET {base}/stats` + `GET {base}/current-series`, issued together.
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.api_base_url.clone(), cfg.auth_token.clone())
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(FETCH_TIMEOUT_SECS)
            } else {
                AppError::Network(format!("GET {path}: {e}"))
            }
        })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            return Err(AppError::Network(format!("GET {path}: HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AppError::Network(format!("GET {path}: {e}")))?;
        serde_json::from_str(&body).map_err(|e| AppError::Parse(format!("GET {path}: {e}")))
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let (stats, series) = tokio::join!(self.get_json("/stats"), self.get_json("/current-series"));
        let snapshot = parse_snapshot(&stats?, &series?)?;
        debug!(
            total = snapshot.total_count,
            identifier = %snapshot.identifier,
            "Snapshot fetched"
        );
        Ok(snapshot)
    }
}

/// Combine the two backend payloads into one snapshot.
pub fn parse_snapshot(stats: &serde_json::Value, series: &serde_json::Value) -> Result<Snapshot> {
    let identifier = series
        .get("seriesId")
        .and_then(|s| s.as_str())
        .ok_or_else(|| AppError::Parse("current-series: missing seriesId".to_string()))?
        .to_string();

    Ok(Snapshot {
        total_count: count_field(stats, "totalRegistrations")?,
        identifier,
        today_count: count_field(stats, "todayRegistrations")?,
        period_count: count_field(stats, "monthRegistrations")?,
        total_amount: count_field(stats, "totalMoney")?,
        fetched_at_ns: now_ns(),
    })
}

/// Non-negative integer field. Money sums may arrive as floats; the fraction
/// is dropped.
fn count_field(v: &serde_json::Value, field: &str) -> Result<u64> {
    let raw = v
        .get(field)
        .ok_or_else(|| AppError::Parse(format!("stats: missing {field}")))?;
    if let Some(n) = raw.as_u64() {
        return Ok(n);
    }
    match raw.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Ok(f.trunc() as u64),
        _ => Err(AppError::Parse(format!("stats: {field} is not a non-negative number: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats() -> serde_json::Value {
        json!({
            "totalRegistrations": 100_250,
            "totalMoney": 4_512_000.75,
            "todayRegistrations": 310,
            "monthRegistrations": 9_040
        })
    }

    #[test]
    fn parses_both_payloads() {
        let snap = parse_snapshot(&stats(), &json!({ "seriesId": "MH26000105" })).unwrap();
        assert_eq!(snap.total_count, 100_250);
        assert_eq!(snap.identifier, "MH26000105");
        assert_eq!(snap.today_count, 310);
        assert_eq!(snap.period_count, 9_040);
        assert_eq!(snap.total_amount, 4_512_000);
    }

    #[test]
    fn missing_series_id_is_parse_error() {
        let err = parse_snapshot(&stats(), &json!({ "series": "MH26000105" })).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn negative_or_textual_counts_are_rejected() {
        let mut bad = stats();
        bad["totalRegistrations"] = json!(-4);
        assert!(matches!(
            parse_snapshot(&bad, &json!({ "seriesId": "MH26000001" })),
            Err(AppError::Parse(_))
        ));

        bad["totalRegistrations"] = json!("100");
        assert!(matches!(
            parse_snapshot(&bad, &json!({ "seriesId": "MH26000001" })),
            Err(AppError::Parse(_))
        ));
    }
}
