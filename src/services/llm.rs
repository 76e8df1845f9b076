// src/services/llm.rs

//! OpenAI-compatible chat client and the model-backed collaborators.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::collaborators::{NavigationOracle, NavigationRequest, SearchAgent, SemanticExtractor};
use super::prompts;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::http::create_async_client;
use crate::utils::text::truncate_graphemes;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

/// Minimal `/chat/completions` client.
pub struct ChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl ChatClient {
    /// Build from config, reading the API key from the configured variable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = std::env::var(&config.llm.api_key_env).map_err(|_| {
            AppError::config(format!(
                "environment variable {} is not set",
                config.llm.api_key_env
            ))
        })?;

        Ok(Self {
            http: create_async_client(&config.crawler)?,
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            model: config.llm.model.clone(),
            api_key,
            temperature: config.llm.temperature,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| AppError::config(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// One system + user exchange; returns the assistant text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        debug!("Chat request to {} ({} prompt chars)", self.model, user.len());

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::collaborator(
                "chat completion",
                format!("{status}: {body}"),
            ));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .into_content()
            .ok_or_else(|| AppError::collaborator("chat completion", "response had no content"))
    }
}

/// The search, extraction and navigation collaborators over one chat client.
pub struct LlmAgents {
    chat: ChatClient,
    target_year: Option<i32>,
    max_text_chars: usize,
}

impl LlmAgents {
    pub fn new(chat: ChatClient, config: &Config) -> Self {
        Self {
            chat,
            target_year: config.discovery.target_year,
            max_text_chars: config.extraction.max_text_chars,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(ChatClient::from_config(config)?, config))
    }
}

#[async_trait]
impl SearchAgent for LlmAgents {
    async fn search(&self, query: &str) -> Result<String> {
        let user = prompts::search_user(query, self.target_year);
        self.chat.complete(prompts::SEARCH_SYSTEM, &user).await
    }
}

#[async_trait]
impl SemanticExtractor for LlmAgents {
    async fn extract(&self, text: &str, url: &str, title: &str) -> Result<String> {
        let text = truncate_graphemes(text, self.max_text_chars);
        let user = prompts::extraction_user(text, url, title, self.target_year);
        self.chat.complete(prompts::EXTRACTION_SYSTEM, &user).await
    }
}

#[async_trait]
impl NavigationOracle for LlmAgents {
    async fn decide(&self, request: &NavigationRequest) -> Result<String> {
        let user = prompts::navigation_user(request);
        self.chat.complete(prompts::NAVIGATION_SYSTEM, &user).await
    }
}
