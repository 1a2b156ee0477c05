use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use newsdb_core::config::GenerationConfig;
use newsdb_core::traits::TextGenerator;
use newsdb_core::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
	role: &'a str,
	content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
	model: &'a str,
	system: &'a str,
	messages: Vec<AnthropicMessage<'a>>,
	max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
	#[serde(default)]
	text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
	content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
	error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
	message: String,
}

/// Text generation through the Anthropic Messages API.
pub struct AnthropicGenerator {
	client: reqwest::Client,
	endpoint: String,
	model: String,
	api_key: String,
	max_tokens: u32,
}

impl AnthropicGenerator {
	/// Reads the API key from the environment variable named in `config`.
	pub fn from_config(config: &GenerationConfig) -> Result<Self> {
		let api_key = std::env::var(&config.api_key_env)
			.ok()
			.filter(|k| !k.trim().is_empty())
			.ok_or_else(|| Error::InvalidConfig(format!("API key not found; set the {} environment variable", config.api_key_env)))?;
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()
			.map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
		Ok(Self {
			client,
			endpoint: config.endpoint.trim_end_matches('/').to_string(),
			model: config.model.clone(),
			api_key,
			max_tokens: config.max_tokens,
		})
	}

	pub fn model(&self) -> &str {
		&self.model
	}
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
	async fn generate(&self, system: &str, prompt: &str, model: Option<&str>) -> Result<String> {
		let model = model.unwrap_or(&self.model);
		let request = AnthropicRequest {
			model,
			system,
			messages: vec![AnthropicMessage { role: "user", content: prompt }],
			max_tokens: self.max_tokens,
		};
		debug!(model, prompt_chars = prompt.len(), "anthropic request");

		let response = self
			.client
			.post(format!("{}/messages", self.endpoint))
			.header("x-api-key", &self.api_key)
			.header("anthropic-version", ANTHROPIC_VERSION)
			.header("content-type", "application/json")
			.json(&request)
			.send()
			.await
			.map_err(|e| Error::GenerationUnavailable(format!("network error: {e}")))?;

		let status = response.status();
		if !status.is_success() {
			let error_text = response.text().await.unwrap_or_default();
			let message = serde_json::from_str::<AnthropicErrorResponse>(&error_text)
				.map(|e| e.error.message)
				.unwrap_or(error_text);
			return Err(Error::GenerationUnavailable(format!("API error ({}): {message}", status.as_u16())));
		}

		let body: AnthropicResponse =
			response.json().await.map_err(|e| Error::GenerationUnavailable(format!("unreadable response: {e}")))?;
		let text: String = body.content.into_iter().filter_map(|b| b.text).collect::<Vec<_>>().join("");
		if text.trim().is_empty() {
			return Err(Error::GenerationUnavailable("empty response".into()));
		}
		Ok(text)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_key_is_a_config_error() {
		let config = GenerationConfig { api_key_env: "NEWSDB_TEST_KEY_THAT_IS_NOT_SET".into(), ..GenerationConfig::default() };
		match AnthropicGenerator::from_config(&config) {
			Err(Error::InvalidConfig(msg)) => assert!(msg.contains("NEWSDB_TEST_KEY_THAT_IS_NOT_SET")),
			other => panic!("expected InvalidConfig, got {:?}", other.map(|g| g.model().to_string())),
		}
	}

	#[test]
	fn request_carries_system_prompt_separately() {
		let request = AnthropicRequest {
			model: "m",
			system: "be brief",
			messages: vec![AnthropicMessage { role: "user", content: "hi" }],
			max_tokens: 16,
		};
		let json = serde_json::to_value(&request).unwrap();
		assert_eq!(json["system"], "be brief");
		assert_eq!(json["messages"][0]["role"], "user");
		assert_eq!(json["max_tokens"], 16);
	}
}
