use std::time::Duration;

use api_types::{
    CategoryTree,
    rule::{Rule, RuleResponse},
    transaction::{
        ExcludeToggle, Transaction, TransactionCount, TransactionListResponse, TransactionNew,
        TransactionQuery,
    },
};
use chrono::{DateTime, SecondsFormat, Utc};
use dashboard::{ApiError, Backend};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{AppError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the budget backend.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        // `Url::join` replaces the last segment unless the base ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|err| AppError::InvalidConfig(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Transport(format!("invalid endpoint {path}: {err}")))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, ApiError> {
        let res = request
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<T>()
                .await
                .map_err(|err| ApiError::Decode(err.to_string()));
        }

        let detail = res
            .json::<serde_json::Value>()
            .await
            .ok()
            .map(detail_message)
            .unwrap_or_else(|| status.to_string());
        tracing::warn!(%status, "backend refused request: {detail}");
        Err(error_for_status(status, detail))
    }
}

impl Backend for Client {
    async fn fetch_transactions(
        &self,
        query: &TransactionQuery,
    ) -> std::result::Result<TransactionListResponse, ApiError> {
        let endpoint = self.endpoint("transactions")?;
        let params = query_params(query)?;
        tracing::debug!(?params, "GET transactions");
        self.send(self.http.get(endpoint).query(&params)).await
    }

    async fn transaction_count(
        &self,
        query: &TransactionQuery,
    ) -> std::result::Result<u64, ApiError> {
        let endpoint = self.endpoint("transactions/count")?;
        let params = query_params(query)?;
        let body: TransactionCount = self.send(self.http.get(endpoint).query(&params)).await?;
        Ok(body.count)
    }

    async fn categories(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<CategoryTree, ApiError> {
        // The list response carries the categories of the whole range, so a
        // one-row page is enough.
        let query = TransactionQuery {
            start_date: start,
            end_date: end,
            categories: Vec::new(),
            min_confidence: 0.0,
            limit: Some(1),
            offset: Some(0),
        };
        let page = self.fetch_transactions(&query).await?;
        Ok(page.categories)
    }

    async fn set_excluded(
        &self,
        id: Uuid,
        excluded: bool,
    ) -> std::result::Result<Transaction, ApiError> {
        let endpoint = self.endpoint(&format!("transactions/{id}/toggle-exclude"))?;
        let body = ExcludeToggle { excluded };
        self.send(self.http.patch(endpoint).json(&body)).await
    }

    async fn add_rule(&self, rule: &Rule) -> std::result::Result<RuleResponse, ApiError> {
        let endpoint = self.endpoint("rules")?;
        self.send(self.http.post(endpoint).json(rule)).await
    }

    async fn update_rule(&self, rule: &Rule) -> std::result::Result<RuleResponse, ApiError> {
        let endpoint = self.endpoint("rules")?;
        self.send(self.http.put(endpoint).json(rule)).await
    }

    async fn add_transaction(
        &self,
        transaction: &TransactionNew,
    ) -> std::result::Result<Transaction, ApiError> {
        let endpoint = self.endpoint("transactions")?;
        self.send(self.http.post(endpoint).json(transaction)).await
    }
}

fn query_params(
    query: &TransactionQuery,
) -> std::result::Result<Vec<(&'static str, String)>, ApiError> {
    let mut params = vec![
        ("startDate", wire_instant(query.start_date)),
        ("endDate", wire_instant(query.end_date)),
    ];
    for filter in &query.categories {
        let encoded = serde_json::to_string(filter)
            .map_err(|err| ApiError::Validation(format!("unencodable filter: {err}")))?;
        params.push(("categories", encoded));
    }
    if query.min_confidence > 0.0 {
        params.push(("min_confidence", query.min_confidence.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset", offset.to_string()));
    }
    Ok(params)
}

fn wire_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// FastAPI puts a string in `detail`, or a list of field errors for 422.
fn detail_message(body: serde_json::Value) -> String {
    match body.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
        None => body.to_string(),
    }
}

fn error_for_status(status: StatusCode, detail: String) -> ApiError {
    match status.as_u16() {
        400 | 422 => ApiError::Validation(detail),
        404 => ApiError::NotFound(detail),
        409 => ApiError::Conflict(detail),
        _ => ApiError::Server(detail),
    }
}

#[cfg(test)]
mod tests {
    use api_types::transaction::CategoryFilter;
    use chrono::TimeZone;

    use super::*;

    fn query() -> TransactionQuery {
        TransactionQuery {
            start_date: Utc.with_ymd_and_hms(2024, 4, 25, 5, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2024, 5, 11, 4, 59, 59).unwrap(),
            categories: vec![
                CategoryFilter {
                    category: "Food".to_string(),
                    subcategory: None,
                },
                CategoryFilter {
                    category: "Transport".to_string(),
                    subcategory: Some("Fuel".to_string()),
                },
            ],
            min_confidence: 0.0,
            limit: Some(100),
            offset: Some(200),
        }
    }

    #[test]
    fn categories_are_repeated_json_params() {
        let params = query_params(&query()).unwrap();
        let categories: Vec<&str> = params
            .iter()
            .filter(|(name, _)| *name == "categories")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(
            categories,
            [
                r#"{"category":"Food"}"#,
                r#"{"category":"Transport","subcategory":"Fuel"}"#
            ]
        );
        assert!(params.contains(&("startDate", "2024-04-25T05:00:00.000Z".to_string())));
        assert!(params.contains(&("offset", "200".to_string())));
        assert!(!params.iter().any(|(name, _)| *name == "min_confidence"));
    }

    #[test]
    fn count_query_omits_paging() {
        let mut count = query();
        count.limit = None;
        count.offset = None;
        count.min_confidence = 0.75;
        let params = query_params(&count).unwrap();
        assert!(!params.iter().any(|(name, _)| *name == "limit" || *name == "offset"));
        assert!(params.contains(&("min_confidence", "0.75".to_string())));
    }

    #[test]
    fn status_codes_map_to_api_errors() {
        let detail = || "x".to_string();
        assert_eq!(
            error_for_status(StatusCode::BAD_REQUEST, detail()),
            ApiError::Validation(detail())
        );
        assert_eq!(
            error_for_status(StatusCode::NOT_FOUND, detail()),
            ApiError::NotFound(detail())
        );
        assert_eq!(
            error_for_status(StatusCode::CONFLICT, detail()),
            ApiError::Conflict(detail())
        );
        assert!(error_for_status(StatusCode::BAD_GATEWAY, detail()).is_retryable());
        assert!(!error_for_status(StatusCode::UNPROCESSABLE_ENTITY, detail()).is_retryable());
    }

    #[test]
    fn detail_is_read_from_error_body() {
        let plain = serde_json::json!({ "detail": "Rule for 'HI-LO' already exists" });
        assert_eq!(detail_message(plain), "Rule for 'HI-LO' already exists");
        let fields = serde_json::json!({ "detail": [{ "loc": ["query", "limit"] }] });
        assert!(detail_message(fields).contains("limit"));
    }

    #[test]
    fn base_url_keeps_its_path() {
        let client = Client::new("http://127.0.0.1:8000/api/v1").unwrap();
        assert_eq!(
            client.endpoint("transactions/count").unwrap().as_str(),
            "http://127.0.0.1:8000/api/v1/transactions/count"
        );
    }
}
