//! AI provider layer.
//!
//! One `Provider` capability over four HTTP backends: OpenAI Responses,
//! Anthropic Messages, Mistral chat completions, and an OpenAI-compatible
//! local endpoint. All variants receive the identical prompt pair, run their
//! request on a background thread raced against the cancellation token, and
//! map transport/API failures into the same two error kinds.

use std::{
   sync::mpsc,
   thread,
   time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
   config::AiProviderConfig,
   error::{GitcommError, Result},
   prompts::{PromptPair, unified_prompt},
   signals::CancelToken,
   types::RepositoryState,
   validation::Validator,
};

const DEFAULT_MAX_TOKENS: u32 = 500;
const RACE_POLL: Duration = Duration::from_millis(50);

const OPENAI_RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MISTRAL_CHAT_URL: &str = "https://api.mistral.ai/v1/chat/completions";
const MISTRAL_DEFAULT_MODEL: &str = "mistral-small-latest";

/// Provider failure as the orchestrator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
   /// Could not produce a message; the workflow falls back to manual input.
   Unavailable(String),
   /// The supplied cancellation token tripped.
   Cancelled,
}

impl std::fmt::Display for ProviderError {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      match self {
         Self::Unavailable(reason) => write!(f, "{reason}"),
         Self::Cancelled => f.write_str("cancelled"),
      }
   }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// The single capability the orchestrator sees.
pub trait Provider {
   fn name(&self) -> &str;

   /// Whether enough configuration exists to attempt a request at all.
   fn configured(&self) -> bool;

   /// Send the prompt pair and return the raw message text.
   fn send(&self, prompt: &PromptPair, token: &CancelToken) -> ProviderResult<String>;

   /// Shared entry point: configuration gate, prompt generation, request,
   /// empty-response rejection.
   fn generate(
      &self,
      validator: &Validator,
      state: &RepositoryState,
      token: &CancelToken,
   ) -> ProviderResult<String> {
      if !self.configured() {
         return Err(ProviderError::Unavailable("not configured".to_string()));
      }
      let prompt = unified_prompt(validator, state);
      let response = self.send(&prompt, token)?;
      if response.trim().is_empty() {
         return Err(ProviderError::Unavailable("empty response from API".to_string()));
      }
      Ok(response)
   }
}

/// Build the provider for a configured name.
pub fn build_provider(config: AiProviderConfig) -> Result<Box<dyn Provider>> {
   match config.name.as_str() {
      "openai" => Ok(Box::new(OpenAiProvider { config })),
      "anthropic" => Ok(Box::new(AnthropicProvider { config })),
      "mistral" => Ok(Box::new(MistralProvider { config })),
      "local" => Ok(Box::new(LocalProvider { config })),
      other => Err(GitcommError::Config(format!(
         "unknown provider '{other}' (expected openai, anthropic, mistral, or local)"
      ))),
   }
}

// === Shared request machinery ===

/// Per-call budget: the configured timeout, capped by whatever remains on a
/// deadline-carrying token. The workflow's main token has no deadline, so
/// there the configured timeout stands alone.
fn call_budget(configured: Duration, token: &CancelToken) -> Duration {
   match token.remaining() {
      Some(remaining) => configured.min(remaining),
      None => configured,
   }
}

/// Run `request` on a background thread and race it against the token.
///
/// On cancellation the orphan request keeps running but its result is
/// discarded; the caller gets `Cancelled` promptly.
fn race_against_token<F>(
   token: &CancelToken,
   budget: Duration,
   request: F,
) -> ProviderResult<String>
where
   F: FnOnce() -> ProviderResult<String> + Send + 'static,
{
   let (tx, rx) = mpsc::channel();
   thread::spawn(move || {
      let _ = tx.send(request());
   });

   let deadline = Instant::now() + budget;
   loop {
      if token.is_cancelled() {
         return Err(ProviderError::Cancelled);
      }
      match rx.recv_timeout(RACE_POLL) {
         Ok(result) => return result,
         Err(mpsc::RecvTimeoutError::Timeout) => {
            if Instant::now() >= deadline {
               return Err(ProviderError::Unavailable("timeout".to_string()));
            }
         },
         Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(ProviderError::Unavailable(
               "request worker terminated unexpectedly".to_string(),
            ));
         },
      }
   }
}

fn build_client(timeout: Duration) -> ProviderResult<reqwest::blocking::Client> {
   reqwest::blocking::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))
}

/// Map an HTTP status plus response body to a `ProviderError`.
fn categorize_response(status: u16, body: &str, token: &CancelToken) -> ProviderError {
   let lower = body.to_lowercase();
   if status == 401 || status == 403 || lower.contains("invalid api key") || lower.contains("auth")
   {
      return ProviderError::Unavailable("API key invalid".to_string());
   }
   if status == 429 || lower.contains("rate limit") {
      return ProviderError::Unavailable("rate limit exceeded".to_string());
   }
   if lower.contains("timeout") || lower.contains("deadline") || lower.contains("context canceled")
   {
      if token.is_cancelled() {
         return ProviderError::Cancelled;
      }
      return ProviderError::Unavailable("timeout".to_string());
   }
   ProviderError::Unavailable(format!("HTTP {status}: {}", snippet(body, 200)))
}

/// Map a transport-level reqwest error.
fn categorize_transport(err: &reqwest::Error, token: &CancelToken) -> ProviderError {
   if err.is_timeout() {
      if token.is_cancelled() {
         return ProviderError::Cancelled;
      }
      return ProviderError::Unavailable("timeout".to_string());
   }
   ProviderError::Unavailable(err.to_string())
}

fn snippet(body: &str, limit: usize) -> String {
   let trimmed = body.trim();
   if trimmed.is_empty() {
      return "<empty response body>".to_string();
   }
   let mut s: String = trimmed.chars().take(limit).collect();
   if trimmed.chars().count() > limit {
      s.push_str("...");
   }
   s
}

/// POST a JSON body, collect status + text, categorize failures.
fn post_json(
   client: &reqwest::blocking::Client,
   url: &str,
   headers: &[(String, String)],
   body: serde_json::Value,
   token: &CancelToken,
) -> ProviderResult<String> {
   let mut request = client.post(url).json(&body);
   for (name, value) in headers {
      request = request.header(name.as_str(), value.as_str());
   }

   let response = request.send().map_err(|e| categorize_transport(&e, token))?;
   let status = response.status().as_u16();
   let text = response
      .text()
      .map_err(|e| categorize_transport(&e, token))?;

   if !(200..300).contains(&status) {
      return Err(categorize_response(status, &text, token));
   }
   Ok(text)
}

// === OpenAI (Responses API) ===

pub struct OpenAiProvider {
   config: AiProviderConfig,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
   model:             String,
   input:             Vec<ResponsesInput>,
   store:             bool,
   max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ResponsesInput {
   role:    String,
   content: String,
}

impl OpenAiProvider {
   fn request_body(&self, prompt: &PromptPair) -> ResponsesRequest {
      ResponsesRequest {
         model:             self
            .config
            .model
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
         input:             vec![
            ResponsesInput { role: "system".to_string(), content: prompt.system.clone() },
            ResponsesInput { role: "user".to_string(), content: prompt.user.clone() },
         ],
         store:             false,
         max_output_tokens: self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
      }
   }
}

/// Collect `output_text` content items from a Responses API payload.
fn extract_responses_text(raw: &str) -> ProviderResult<String> {
   let value: serde_json::Value = serde_json::from_str(raw)
      .map_err(|e| ProviderError::Unavailable(format!("malformed response JSON: {e}")))?;

   let mut parts = Vec::new();
   if let Some(output) = value.get("output").and_then(|v| v.as_array()) {
      for item in output {
         if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
            for block in content {
               if block.get("type").and_then(|v| v.as_str()) == Some("output_text")
                  && let Some(text) = block.get("text").and_then(|v| v.as_str())
               {
                  parts.push(text.to_string());
               }
            }
         }
      }
   }
   Ok(parts.join("\n"))
}

impl Provider for OpenAiProvider {
   fn name(&self) -> &str {
      "openai"
   }

   fn configured(&self) -> bool {
      !self.config.api_key.is_empty()
   }

   fn send(&self, prompt: &PromptPair, token: &CancelToken) -> ProviderResult<String> {
      let body = serde_json::to_value(self.request_body(prompt))
         .map_err(|e| ProviderError::Unavailable(format!("request encoding failed: {e}")))?;
      let headers = vec![(
         "authorization".to_string(),
         format!("Bearer {}", self.config.api_key),
      )];
      let timeout = call_budget(self.config.timeout, token);
      let worker_token = token.clone();

      race_against_token(token, timeout + RACE_POLL, move || {
         let client = build_client(timeout)?;
         let raw = post_json(&client, OPENAI_RESPONSES_URL, &headers, body, &worker_token)?;
         extract_responses_text(&raw)
      })
   }
}

// === Anthropic (Messages API) ===

pub struct AnthropicProvider {
   config: AiProviderConfig,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
   model:      String,
   max_tokens: u32,
   messages:   Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
   role:    String,
   content: String,
}

impl AnthropicProvider {
   fn request_body(&self, prompt: &PromptPair) -> MessagesRequest {
      // The Messages API takes no system role here; prepend the system text
      MessagesRequest {
         model:      self
            .config
            .model
            .clone()
            .unwrap_or_else(|| ANTHROPIC_DEFAULT_MODEL.to_string()),
         max_tokens: self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
         messages:   vec![ChatMessage {
            role:    "user".to_string(),
            content: format!("{}\n\n{}", prompt.system, prompt.user),
         }],
      }
   }
}

/// Collect `text` content blocks from a Messages API payload.
fn extract_messages_text(raw: &str) -> ProviderResult<String> {
   let value: serde_json::Value = serde_json::from_str(raw)
      .map_err(|e| ProviderError::Unavailable(format!("malformed response JSON: {e}")))?;

   let mut parts = Vec::new();
   if let Some(content) = value.get("content").and_then(|v| v.as_array()) {
      for block in content {
         if block.get("type").and_then(|v| v.as_str()) == Some("text")
            && let Some(text) = block.get("text").and_then(|v| v.as_str())
         {
            parts.push(text.to_string());
         }
      }
   }
   Ok(parts.join("\n"))
}

impl Provider for AnthropicProvider {
   fn name(&self) -> &str {
      "anthropic"
   }

   fn configured(&self) -> bool {
      !self.config.api_key.is_empty()
   }

   fn send(&self, prompt: &PromptPair, token: &CancelToken) -> ProviderResult<String> {
      let body = serde_json::to_value(self.request_body(prompt))
         .map_err(|e| ProviderError::Unavailable(format!("request encoding failed: {e}")))?;
      let headers = vec![
         ("x-api-key".to_string(), self.config.api_key.clone()),
         ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
      ];
      let timeout = call_budget(self.config.timeout, token);
      let worker_token = token.clone();

      race_against_token(token, timeout + RACE_POLL, move || {
         let client = build_client(timeout)?;
         let raw = post_json(&client, ANTHROPIC_MESSAGES_URL, &headers, body, &worker_token)?;
         extract_messages_text(&raw)
      })
   }
}

// === Mistral (chat completions) ===

pub struct MistralProvider {
   config: AiProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
   model:      String,
   max_tokens: u32,
   messages:   Vec<ChatMessage>,
}

fn chat_completions_body(model: String, max_tokens: u32, prompt: &PromptPair) -> ChatCompletionsRequest {
   ChatCompletionsRequest {
      model,
      max_tokens,
      messages: vec![
         ChatMessage { role: "system".to_string(), content: prompt.system.clone() },
         ChatMessage { role: "user".to_string(), content: prompt.user.clone() },
      ],
   }
}

/// Parse `choices[0].message.content` from a chat-completions payload.
fn extract_chat_text(raw: &str) -> ProviderResult<String> {
   let value: serde_json::Value = serde_json::from_str(raw)
      .map_err(|e| ProviderError::Unavailable(format!("malformed response JSON: {e}")))?;

   let text = value
      .get("choices")
      .and_then(|v| v.as_array())
      .and_then(|choices| choices.first())
      .and_then(|choice| choice.get("message"))
      .and_then(|msg| msg.get("content"))
      .and_then(|v| v.as_str())
      .unwrap_or_default();
   Ok(text.to_string())
}

impl Provider for MistralProvider {
   fn name(&self) -> &str {
      "mistral"
   }

   fn configured(&self) -> bool {
      !self.config.api_key.is_empty()
   }

   fn send(&self, prompt: &PromptPair, token: &CancelToken) -> ProviderResult<String> {
      let request = chat_completions_body(
         self
            .config
            .model
            .clone()
            .unwrap_or_else(|| MISTRAL_DEFAULT_MODEL.to_string()),
         self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
         prompt,
      );
      let body = serde_json::to_value(request)
         .map_err(|e| ProviderError::Unavailable(format!("request encoding failed: {e}")))?;
      let headers = vec![(
         "authorization".to_string(),
         format!("Bearer {}", self.config.api_key),
      )];
      let timeout = call_budget(self.config.timeout, token);
      let worker_token = token.clone();

      race_against_token(token, timeout + RACE_POLL, move || {
         let client = build_client(timeout)?;
         let raw = post_json(&client, MISTRAL_CHAT_URL, &headers, body, &worker_token)?;
         extract_chat_text(&raw)
      })
   }
}

// === Local (OpenAI-compatible endpoint) ===

pub struct LocalProvider {
   config: AiProviderConfig,
}

impl Provider for LocalProvider {
   fn name(&self) -> &str {
      "local"
   }

   /// Local needs an endpoint; the API key is optional.
   fn configured(&self) -> bool {
      self
         .config
         .endpoint
         .as_deref()
         .is_some_and(|e| !e.is_empty())
   }

   fn send(&self, prompt: &PromptPair, token: &CancelToken) -> ProviderResult<String> {
      let Some(endpoint) = self.config.endpoint.clone() else {
         return Err(ProviderError::Unavailable("not configured".to_string()));
      };
      let request = chat_completions_body(
         self.config.model.clone().unwrap_or_default(),
         self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
         prompt,
      );
      let body = serde_json::to_value(request)
         .map_err(|e| ProviderError::Unavailable(format!("request encoding failed: {e}")))?;

      let mut headers = Vec::new();
      if !self.config.api_key.is_empty() {
         headers.push((
            "authorization".to_string(),
            format!("Bearer {}", self.config.api_key),
         ));
      }
      let timeout = call_budget(self.config.timeout, token);
      let worker_token = token.clone();

      race_against_token(token, timeout + RACE_POLL, move || {
         let client = build_client(timeout)?;
         let raw = post_json(&client, &endpoint, &headers, body, &worker_token)?;
         extract_chat_text(&raw)
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn config(name: &str, api_key: &str) -> AiProviderConfig {
      AiProviderConfig {
         name:       name.to_string(),
         api_key:    api_key.to_string(),
         model:      None,
         endpoint:   None,
         timeout:    Duration::from_secs(30),
         max_tokens: None,
      }
   }

   fn prompt() -> PromptPair {
      PromptPair { system: "sys".to_string(), user: "usr".to_string() }
   }

   #[test]
   fn test_empty_api_key_short_circuits() {
      // Must not make a network call: generate returns before send
      let provider = OpenAiProvider { config: config("openai", "") };
      let err = provider
         .generate(&Validator::new(), &RepositoryState::default(), &CancelToken::new())
         .unwrap_err();
      assert_eq!(err, ProviderError::Unavailable("not configured".to_string()));
   }

   #[test]
   fn test_local_requires_endpoint_not_key() {
      let provider = LocalProvider { config: config("local", "") };
      assert!(!provider.configured());

      let mut with_endpoint = config("local", "");
      with_endpoint.endpoint = Some("http://localhost:8080/v1/chat/completions".to_string());
      let provider = LocalProvider { config: with_endpoint };
      assert!(provider.configured());
   }

   #[test]
   fn test_openai_request_shape() {
      let mut cfg = config("openai", "sk-x");
      cfg.max_tokens = Some(256);
      let provider = OpenAiProvider { config: cfg };
      let body = serde_json::to_value(provider.request_body(&prompt())).unwrap();

      assert_eq!(body["model"], "gpt-4o-mini");
      assert_eq!(body["store"], false);
      assert_eq!(body["max_output_tokens"], 256);
      assert_eq!(body["input"][0]["role"], "system");
      assert_eq!(body["input"][0]["content"], "sys");
      assert_eq!(body["input"][1]["role"], "user");
   }

   #[test]
   fn test_anthropic_request_shape() {
      let provider = AnthropicProvider { config: config("anthropic", "sk-a") };
      let body = serde_json::to_value(provider.request_body(&prompt())).unwrap();

      assert_eq!(body["model"], ANTHROPIC_DEFAULT_MODEL);
      assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
      // Single user message carrying system + user text
      assert_eq!(body["messages"].as_array().unwrap().len(), 1);
      assert_eq!(body["messages"][0]["role"], "user");
      assert_eq!(body["messages"][0]["content"], "sys\n\nusr");
   }

   #[test]
   fn test_chat_completions_request_shape() {
      let body = serde_json::to_value(chat_completions_body(
         "mistral-small-latest".to_string(),
         500,
         &prompt(),
      ))
      .unwrap();
      assert_eq!(body["messages"][0]["role"], "system");
      assert_eq!(body["messages"][1]["role"], "user");
      assert_eq!(body["max_tokens"], 500);
   }

   #[test]
   fn test_extract_chat_text() {
      let raw = r#"{"choices":[{"message":{"role":"assistant","content":"feat: add x"}}]}"#;
      assert_eq!(extract_chat_text(raw).unwrap(), "feat: add x");
      assert_eq!(extract_chat_text(r#"{"choices":[]}"#).unwrap(), "");
   }

   #[test]
   fn test_extract_messages_text() {
      let raw = r#"{"content":[{"type":"text","text":"fix: y"},{"type":"tool_use","id":"t"}]}"#;
      assert_eq!(extract_messages_text(raw).unwrap(), "fix: y");
   }

   #[test]
   fn test_extract_responses_text() {
      let raw = r#"{"output":[{"type":"message","content":[{"type":"output_text","text":"docs: z"}]}]}"#;
      assert_eq!(extract_responses_text(raw).unwrap(), "docs: z");
   }

   #[test]
   fn test_categorize_auth_and_rate_limit() {
      let token = CancelToken::new();
      assert_eq!(
         categorize_response(401, "unauthorized", &token),
         ProviderError::Unavailable("API key invalid".to_string())
      );
      assert_eq!(
         categorize_response(429, "slow down", &token),
         ProviderError::Unavailable("rate limit exceeded".to_string())
      );
      assert_eq!(
         categorize_response(500, "rate limit reached for requests", &token),
         ProviderError::Unavailable("rate limit exceeded".to_string())
      );
   }

   #[test]
   fn test_categorize_timeout_vs_cancelled() {
      let token = CancelToken::new();
      assert_eq!(
         categorize_response(504, "upstream timeout", &token),
         ProviderError::Unavailable("timeout".to_string())
      );

      token.cancel();
      assert_eq!(categorize_response(504, "upstream timeout", &token), ProviderError::Cancelled);
   }

   #[test]
   fn test_call_budget_capped_by_token_deadline() {
      let plain = CancelToken::new();
      assert_eq!(call_budget(Duration::from_secs(30), &plain), Duration::from_secs(30));

      let bounded = CancelToken::with_deadline(Duration::from_millis(200));
      let budget = call_budget(Duration::from_secs(30), &bounded);
      assert!(budget <= Duration::from_millis(200));

      // A short configured timeout is never stretched to the deadline
      let short = call_budget(Duration::from_millis(50), &bounded);
      assert!(short <= Duration::from_millis(50));
   }

   #[test]
   fn test_race_returns_worker_result() {
      let token = CancelToken::new();
      let result = race_against_token(&token, Duration::from_secs(1), || {
         Ok("feat: done".to_string())
      });
      assert_eq!(result.unwrap(), "feat: done");
   }

   #[test]
   fn test_race_cancelled_promptly() {
      let token = CancelToken::new();
      token.cancel();
      let start = Instant::now();
      let result = race_against_token(&token, Duration::from_secs(30), || {
         thread::sleep(Duration::from_secs(5));
         Ok("late".to_string())
      });
      assert_eq!(result.unwrap_err(), ProviderError::Cancelled);
      assert!(start.elapsed() < Duration::from_secs(1));
   }

   #[test]
   fn test_race_times_out() {
      let token = CancelToken::new();
      let result = race_against_token(&token, Duration::from_millis(80), || {
         thread::sleep(Duration::from_secs(5));
         Ok("late".to_string())
      });
      assert_eq!(result.unwrap_err(), ProviderError::Unavailable("timeout".to_string()));
   }

   #[test]
   fn test_build_unknown_provider() {
      let err = match build_provider(config("gemini", "k")) {
         Err(e) => e,
         Ok(_) => panic!("expected build_provider to fail"),
      };
      assert!(err.to_string().contains("unknown provider"));
   }

   #[test]
   fn test_empty_response_rejected() {
      struct Blank;
      impl Provider for Blank {
         fn name(&self) -> &str {
            "blank"
         }
         fn configured(&self) -> bool {
            true
         }
         fn send(&self, _: &PromptPair, _: &CancelToken) -> ProviderResult<String> {
            Ok("   \n".to_string())
         }
      }
      let err = Blank
         .generate(&Validator::new(), &RepositoryState::default(), &CancelToken::new())
         .unwrap_err();
      assert_eq!(err, ProviderError::Unavailable("empty response from API".to_string()));
   }
}
