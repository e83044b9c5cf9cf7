//! Bundled HTTP generation collaborator.
//!
//! Talks to any OpenAI-compatible chat-completions endpoint with `stream:
//! true` and accumulates the SSE deltas into one markup string. The
//! orchestrator treats the generator as opaque; this module is just the
//! default wiring for the CLI.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::error::FeedError;
use crate::orchestrator::ContentGenerator;
use crate::settings::GenerationSettings;

// -- SSE wire types ---------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

// -- HttpGenerator ----------------------------------------------------------

/// Streams a chat completion and returns the concatenated text.
pub struct HttpGenerator {
    client: Client,
    settings: GenerationSettings,
    api_key: String,
    system_prompt: Option<String>,
}

impl HttpGenerator {
    pub fn new(settings: GenerationSettings, api_key: String) -> Self {
        HttpGenerator {
            client: Client::new(),
            settings,
            api_key,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

impl ContentGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, FeedError> {
        let mut messages = Vec::new();
        if let Some(sys) = &self.system_prompt {
            messages.push(ChatMessage { role: "system".to_string(), content: sys.clone() });
        }
        messages.push(ChatMessage { role: "user".to_string(), content: prompt.to_string() });

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            stream: true,
            temperature: self.settings.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| FeedError::Generation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Generation(format!("endpoint returned {status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FeedError::Generation(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..=line_end);

                if line.starts_with("data: ") && line != "data: [DONE]" {
                    let json_str = line.strip_prefix("data: ").unwrap_or(&line);
                    if let Ok(parsed) = serde_json::from_str::<ChatChunk>(json_str) {
                        if let Some(choice) = parsed.choices.first() {
                            if let Some(content) = &choice.delta.content {
                                accumulated.push_str(content);
                            }
                        }
                    }
                }
            }
        }

        debug!(chars = accumulated.len(), "generation stream complete");
        Ok(accumulated)
    }
}
