//! Request execution
//!
//! The orchestrator fetches through the [`Executor`] trait, so transports
//! other than plain HTTP (headless browsers, fixtures in tests) can be
//! plugged in without touching the scheduling logic.

use crate::config::HttpConfig;
use crate::request::WorkItem;
use crate::session::Session;
use crate::DriftnetError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Result of one execution attempt
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers, lowercased names
    pub headers: HashMap<String, String>,

    /// Response body as text
    pub body: String,

    /// Final URL after redirects
    pub url: String,

    /// Content-Type header value, if present
    pub content_type: Option<String>,

    /// Wall-clock time of the attempt
    pub elapsed: Duration,
}

impl FetchResponse {
    /// True for 2xx status codes
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by the orchestrator to execute work items
///
/// An implementation returns `Ok` for any completed HTTP exchange, including
/// non-2xx statuses; the orchestrator decides what counts as a failure. `Err`
/// is reserved for transport problems (connection, timeout, protocol).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        item: &WorkItem,
        session: Option<&Session>,
    ) -> crate::Result<FetchResponse>;
}

/// Default executor on a shared `reqwest` client
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// Builds an executor from the HTTP configuration section
    pub fn new(config: &HttpConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// Wraps a preconfigured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(
        &self,
        item: &WorkItem,
        session: Option<&Session>,
    ) -> crate::Result<FetchResponse> {
        let method: Method = item.method.parse().unwrap_or(Method::GET);
        let mut request = self.client.request(method, &item.url);

        // Session identity first, then per-item headers on top
        if let Some(session) = session {
            for (name, value) in &session.headers {
                request = request.header(name, value);
            }
            if !session.cookies.is_empty() {
                let cookie_header = session
                    .cookies
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("; ");
                request = request.header("Cookie", cookie_header);
            }
        }
        for (name, value) in &item.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &item.body {
            request = request.body(body.clone());
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DriftnetError::Timeout {
                    url: item.url.clone(),
                }
            } else {
                DriftnetError::Http {
                    url: item.url.clone(),
                    source: e,
                }
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let body = response.text().await.map_err(|e| DriftnetError::Http {
            url: item.url.clone(),
            source: e,
        })?;

        Ok(FetchResponse {
            status,
            headers,
            body,
            url: final_url,
            content_type,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor() -> HttpExecutor {
        HttpExecutor::new(&HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_executes_simple_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>hi</html>", "text/html"))
            .mount(&server)
            .await;

        let item = WorkItem::new(format!("{}/page", server.uri()));
        let response = executor().execute(&item, None).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body, "<html>hi</html>");
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_ok_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let item = WorkItem::new(format!("{}/down", server.uri()));
        let response = executor().execute(&item, None).await.unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_session_headers_and_cookies_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-identity", "abc"))
            .and(header("cookie", "token=t1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let pool = crate::session::SessionPool::new(crate::session::SessionPoolOptions::default());
        let mut session = pool.get_session();
        session
            .headers
            .insert("x-identity".to_string(), "abc".to_string());
        session
            .cookies
            .insert("token".to_string(), "t1".to_string());

        let item = WorkItem::new(format!("{}/", server.uri()));
        let response = executor().execute(&item, Some(&session)).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_post_body_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(wiremock::matchers::body_string("payload"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let item = WorkItem::with_payload(
            format!("{}/submit", server.uri()),
            "POST",
            Some("payload".to_string()),
        );
        let response = executor().execute(&item, None).await.unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_connection_error_is_transport_error() {
        // Port 1 is essentially never listening
        let item = WorkItem::new("http://127.0.0.1:1/unreachable");
        let result = executor().execute(&item, None).await;
        assert!(matches!(result, Err(DriftnetError::Http { .. })));
    }
}
