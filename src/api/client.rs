use std::time::Duration;

use log::{debug, error};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::{ApiError, Result};

/// Thin JSON client for the backend REST API.
///
/// Every request carries the bearer token when one is configured. Non-2xx
/// responses are turned into [`ApiError::Backend`] with the backend's
/// `detail` message, so callers can surface it directly to the user.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.execute(self.request(Method::GET, endpoint)).await
    }

    pub async fn get_with_query<T, Q>(&self, endpoint: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(self.request(Method::GET, endpoint).query(query)).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(self.request(Method::POST, endpoint).json(body)).await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(self.request(Method::PUT, endpoint).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.execute(self.request(Method::DELETE, endpoint)).await
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = self.url(endpoint);
        debug!("➡️ {} {}", method, url);
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            error!("❌ API call error: {}", e);
            ApiError::Transport(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(status.as_u16(), &body);
            error!("❌ API call failed ({}): {}", status, detail);
            return Err(ApiError::Backend {
                status: status.as_u16(),
                detail,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);
        let body = response.text().await?;

        // Non-JSON success bodies read as null, like an empty acknowledgement.
        let value = if is_json && !body.trim().is_empty() {
            serde_json::from_str::<Value>(&body).map_err(|e| ApiError::Decode(e.to_string()))?
        } else {
            Value::Null
        };

        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Extracts the user-facing message from an error body.
///
/// FastAPI reports `detail` either as a string or as a list of validation
/// entries with a `msg` field.
pub fn error_detail(status: u16, body: &str) -> String {
    let fallback = format!("API Error: {}", status);

    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => return fallback,
    };

    match &json["detail"] {
        Value::String(detail) if !detail.trim().is_empty() => detail.clone(),
        Value::Array(entries) => {
            let messages: Vec<&str> = entries
                .iter()
                .filter_map(|entry| entry["msg"].as_str())
                .collect();
            if messages.is_empty() {
                fallback
            } else {
                messages.join("; ")
            }
        }
        _ => fallback,
    }
}

/// Builds an endpoint path from raw segments, percent-encoding each one so
/// a `/`, `#` or `?` inside a segment stays in that segment.
pub fn endpoint(segments: &[&str]) -> Result<String> {
    let mut url = Url::parse("http://localhost/").map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidBaseUrl("cannot-be-a-base URL".to_string()))?
        .clear()
        .extend(segments);
    Ok(url.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_string() {
        let body = r#"{"detail": "Invalid OTP"}"#;
        assert_eq!(error_detail(400, body), "Invalid OTP");
    }

    #[test]
    fn test_error_detail_validation_list() {
        let body = r#"{"detail": [{"loc": ["body", "email"], "msg": "field required"}, {"msg": "value is not a valid email"}]}"#;
        assert_eq!(error_detail(422, body), "field required; value is not a valid email");
    }

    #[test]
    fn test_error_detail_fallback() {
        assert_eq!(error_detail(500, "<html>oops</html>"), "API Error: 500");
        assert_eq!(error_detail(404, "{}"), "API Error: 404");
        assert_eq!(error_detail(400, r#"{"detail": ""}"#), "API Error: 400");
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:8000/", None, None).unwrap();
        assert_eq!(client.url("/coding/questions"), "http://localhost:8000/coding/questions");
        assert_eq!(client.url("assessments"), "http://localhost:8000/assessments");

        let prefixed = ApiClient::new("https://hr.example.com/backend", None, None).unwrap();
        assert_eq!(prefixed.url("/assignments"), "https://hr.example.com/backend/assignments");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        assert_eq!(
            endpoint(&["api", "assessment", "aptitude", "results", "by-email", "jane@example.com"]).unwrap(),
            "/api/assessment/aptitude/results/by-email/jane@example.com"
        );
        assert_eq!(
            endpoint(&["results", "by-email", "ja/ne#1?x@example.com"]).unwrap(),
            "/results/by-email/ja%2Fne%231%3Fx@example.com"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", None, None),
            Err(ApiError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let client = ApiClient::new("http://localhost:8000", Some("   ".to_string()), None).unwrap();
        assert!(!client.has_token());
    }
}
