use serde::{Deserialize, Serialize};

use crate::domain::MessageContent;

use super::BackendError;

const ANALYZER_PROMPT: &str = "You are an email analyzer that helps users manage their inbox efficiently.";
const ASSISTANT_PROMPT: &str =
    "You are a helpful email assistant that writes professional responses.";

const ACTION_GUIDELINES: &str = r#"Guidelines:
- Choose 'archive' for newsletters, promotions, notifications, receipts, order confirmations, FYI messages and automated alerts.
- Choose 'reply' for direct questions or requests, personal messages that need acknowledgment, business discussions, and messages ending with a question or call to action.
- Choose 'forward' for information that should be shared with others, requests that need someone else's input, and anything that should be escalated."#;

pub fn build_action_request(model: String, content: &MessageContent) -> ChatCompletionRequest {
    let prompt = format!(
        "Analyze this email and suggest ONE action from these three options ONLY: 'archive', 'reply', or 'forward'.\n\
         Only respond with one of these exact words.\n\n\
         From: {} <{}>\n\
         Subject: {}\n\
         Body: {}\n\n\
         {}",
        content.sender_name, content.sender, content.subject, content.body, ACTION_GUIDELINES
    );
    ChatCompletionRequest {
        model,
        messages: vec![ChatMessage::system(ANALYZER_PROMPT), ChatMessage::user(prompt)],
        temperature: 0.1,
        max_tokens: None,
    }
}

pub fn build_reply_request(model: String, content: &MessageContent) -> ChatCompletionRequest {
    let prompt = format!(
        "Please generate a professional and appropriate reply to the following email:\n\n\
         From: {} <{}>\n\
         Subject: {}\n\n\
         Email content:\n{}\n\n\
         Write a concise response that addresses the key points in the email. \
         Keep the tone friendly but professional. \
         Do not include any greeting or signature, only the body of the reply.",
        content.sender_name, content.sender, content.subject, content.body
    );
    ChatCompletionRequest {
        model,
        messages: vec![ChatMessage::system(ASSISTANT_PROMPT), ChatMessage::user(prompt)],
        temperature: 0.7,
        max_tokens: Some(1024),
    }
}

pub fn extract_content(completion: ChatCompletionResponse) -> Result<String, BackendError> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|msg| msg.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(BackendError::EmptyResponse)
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user".into(),
            content,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: Option<ChatCompletionMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
}
