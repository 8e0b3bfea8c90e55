use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;

use crate::{
    config::BackendConfig,
    domain::{MessageContent, SuggestedAction},
};

use super::{
    inference::{
        build_action_request, build_reply_request, extract_content, ChatCompletionRequest,
        ChatCompletionResponse,
    },
    BackendError, GenerativeBackend,
};

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    config: BackendConfig,
}

impl OpenAiClient {
    pub fn new(http: Client, config: BackendConfig) -> Self {
        Self { http, config }
    }

    async fn complete(&self, request: &ChatCompletionRequest) -> Result<String, BackendError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(BackendError::NotConfigured)?;

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .timeout(self.config.request_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "backend", status = status.as_u16(), "backend request failed");
            return Err(BackendError::Status(status.as_u16()));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        extract_content(completion)
    }
}

impl GenerativeBackend for OpenAiClient {
    fn suggest_action(
        &self,
        content: MessageContent,
    ) -> BoxFuture<'_, Result<SuggestedAction, BackendError>> {
        async move {
            let request = build_action_request(self.config.model.clone(), &content);
            let text = self.complete(&request).await?;
            text.parse::<SuggestedAction>()
                .map_err(BackendError::UnrecognizedAction)
        }
        .boxed()
    }

    fn draft_reply(&self, content: MessageContent) -> BoxFuture<'_, Result<String, BackendError>> {
        async move {
            let request = build_reply_request(self.config.model.clone(), &content);
            let reply = self.complete(&request).await?;
            tracing::debug!(target: "backend", chars = reply.len(), "reply drafted");
            Ok(reply)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::oneshot,
    };

    use super::*;

    fn content() -> MessageContent {
        MessageContent {
            sender: "ana@example.org".into(),
            sender_name: "Ana".into(),
            subject: "Budget".into(),
            body: "Can you send the numbers?".into(),
        }
    }

    fn client(endpoint: String, api_key: Option<&str>, timeout: Duration) -> OpenAiClient {
        OpenAiClient::new(
            Client::new(),
            BackendConfig {
                api_key: api_key.map(str::to_string),
                model: "gpt-4o-mini".into(),
                endpoint,
                request_timeout: timeout,
            },
        )
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Reads one request (head plus `Content-Length` body) and returns it lowercased.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_ascii_lowercase()
    }

    /// Serves a single canned response; `None` holds the connection open without answering.
    async fn serve_once(response: Option<String>) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);
            match response {
                Some(response) => {
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
        });
        (format!("http://{addr}/v1/chat/completions"), rx)
    }

    #[tokio::test]
    async fn suggestion_is_parsed_and_request_is_authenticated() {
        let body = r#"{"choices":[{"message":{"content":"  Forward\n"}}]}"#;
        let (endpoint, request) = serve_once(Some(http_response("200 OK", body))).await;
        let client = client(endpoint, Some("sk-test"), Duration::from_secs(5));

        let action = client.suggest_action(content()).await;
        assert_eq!(action, Ok(SuggestedAction::Forward));

        let request = request.await.unwrap();
        assert!(request.starts_with("post /v1/chat/completions"));
        assert!(request.contains("authorization: bearer sk-test"));
        assert!(request.contains("\"model\":\"gpt-4o-mini\""));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_status_error() {
        let (endpoint, _request) =
            serve_once(Some(http_response("503 Service Unavailable", "{}"))).await;
        let client = client(endpoint, Some("sk-test"), Duration::from_secs(5));

        assert_eq!(
            client.draft_reply(content()).await,
            Err(BackendError::Status(503))
        );
    }

    #[tokio::test]
    async fn silent_backend_maps_to_timeout() {
        let (endpoint, _request) = serve_once(None).await;
        let client = client(endpoint, Some("sk-test"), Duration::from_millis(200));

        assert_eq!(
            client.suggest_action(content()).await,
            Err(BackendError::Timeout)
        );
    }

    #[tokio::test]
    async fn empty_choices_map_to_empty_response() {
        let (endpoint, _request) =
            serve_once(Some(http_response("200 OK", r#"{"choices":[]}"#))).await;
        let client = client(endpoint, Some("sk-test"), Duration::from_secs(5));

        assert_eq!(
            client.draft_reply(content()).await,
            Err(BackendError::EmptyResponse)
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = client(
            "http://127.0.0.1:9/v1/chat/completions".into(),
            None,
            Duration::from_secs(5),
        );

        assert_eq!(
            client.suggest_action(content()).await,
            Err(BackendError::NotConfigured)
        );
    }
}
