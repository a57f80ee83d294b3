use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{NotificationSender, SenderError};
use crate::notifications::Notification;

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookSender {
    client: Client,
    url: String,
    method: Method,
    headers: header::HeaderMap,
    body_template: Option<String>,
}

impl WebhookSender {
    pub fn new(
        url: String,
        method: &str,
        headers: HashMap<String, String>,
        body_template: Option<String>,
    ) -> Result<Self, SenderError> {
        let method = match method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            _ => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {method}"
                )));
            }
        };

        let mut header_map = header::HeaderMap::new();
        for (key, value) in &headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
            })?;
            let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
            })?;
            header_map.insert(header_name, header_value);
        }

        Ok(Self {
            client: Client::new(),
            url,
            method,
            headers: header_map,
            body_template,
        })
    }

    /// Renders the POST body. Without a template the notification is sent as
    /// a small JSON object.
    fn render_body(&self, notification: &Notification) -> Result<String, SenderError> {
        let Some(template) = self.body_template.as_deref() else {
            return Ok(serde_json::json!({
                "caption": notification.caption,
                "body": notification.body,
            })
            .to_string());
        };

        let mut context = Context::new();
        context.insert("caption", &notification.caption);
        context.insert("body", &notification.body);
        context.insert("sent_at", &chrono::Utc::now().to_rfc3339());

        Tera::one_off(template, &context, false)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), SenderError> {
        let mut request_builder = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());

        if self.method == Method::POST {
            let rendered_body = self.render_body(notification)?;
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(rendered_body);
        } else {
            request_builder = request_builder.query(&[
                ("caption", notification.caption.as_str()),
                ("body", notification.body.as_str()),
            ]);
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn notification() -> Notification {
        Notification {
            caption: "Survival".to_string(),
            body: "Alex has logged in!".to_string(),
        }
    }

    /// Serves one HTTP request with `status_line` and returns the raw request.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!("{status_line}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    #[test]
    fn test_render_default_body_is_json() {
        let sender = WebhookSender::new("http://localhost/".to_string(), "POST", HashMap::new(), None).unwrap();
        let body: serde_json::Value = serde_json::from_str(&sender.render_body(&notification()).unwrap()).unwrap();
        assert_eq!(body["caption"], "Survival");
        assert_eq!(body["body"], "Alex has logged in!");
    }

    #[test]
    fn test_render_template() {
        let sender = WebhookSender::new(
            "http://localhost/".to_string(),
            "POST",
            HashMap::new(),
            Some(r#"{"text": "[{{ caption }}] {{ body }}"}"#.to_string()),
        )
        .unwrap();
        assert_eq!(
            sender.render_body(&notification()).unwrap(),
            r#"{"text": "[Survival] Alex has logged in!"}"#
        );
    }

    #[test]
    fn test_invalid_template_is_reported() {
        let sender = WebhookSender::new(
            "http://localhost/".to_string(),
            "POST",
            HashMap::new(),
            Some("{{ unclosed".to_string()),
        )
        .unwrap();
        assert!(matches!(
            sender.render_body(&notification()),
            Err(SenderError::TemplatingError(_))
        ));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            WebhookSender::new("http://localhost/".to_string(), "POST", headers, None),
            Err(SenderError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_send_posts_to_endpoint() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK").await;
        let mut headers = HashMap::new();
        headers.insert("X-Herald".to_string(), "1".to_string());
        let sender = WebhookSender::new(url, "POST", headers, None).unwrap();

        sender.send(&notification()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.to_lowercase().contains("x-herald: 1"));
        assert!(request.contains("Alex has logged in!"));
    }

    #[tokio::test]
    async fn test_send_reports_error_status() {
        let (url, _server) = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let sender = WebhookSender::new(url, "GET", HashMap::new(), None).unwrap();

        assert!(matches!(
            sender.send(&notification()).await,
            Err(SenderError::SendFailed(_))
        ));
    }
}
