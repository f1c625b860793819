use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves `html` at `url_path` as a news page.
pub async fn mock_news_page(url_path: &str, html: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_news_page(&server, url_path, html).await;
    server
}

/// Adds another page to an existing server.
pub async fn mount_news_page(server: &MockServer, url_path: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Creates a mock HTTP server that delays responses to simulate network timeouts.
pub async fn mock_timeout_server(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><title>late</title></html>")
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(&server)
        .await;

    server
}

/// Creates a mock HTTP server that returns the specified HTTP error status code.
pub async fn mock_error_server(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}

/// Custom Search API response body listing `links`.
pub fn search_response(links: &[String]) -> Value {
    let items: Vec<Value> = links
        .iter()
        .map(|link| json!({"kind": "customsearch#result", "title": "Notícia", "link": link}))
        .collect();
    json!({"kind": "customsearch#search", "items": items})
}

/// Chat completions response whose assistant message is `content`.
pub fn chat_response(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

/// A Slack `chat.postMessage` endpoint that accepts every message.
pub async fn mock_slack_ok() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": "C0123",
            "ts": "1718000000.000100"
        })))
        .mount(&server)
        .await;

    server
}

/// JSON bodies of every request the server received on `url_path`, in order.
pub async fn received_json(server: &MockServer, url_path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == url_path)
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_news_page_serves_html() {
        let html = "<html><body><h1>Notícias</h1></body></html>";
        let server = mock_news_page("/economia/materia", html).await;

        let response = reqwest::get(format!("{}/economia/materia", server.uri()))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Notícias"));
    }

    #[tokio::test]
    async fn test_mock_error_server_returns_status_code() {
        let server = mock_error_server(503).await;

        let response = reqwest::get(format!("{}/any-path", server.uri())).await.unwrap();

        assert_eq!(response.status(), 503);
    }
}
