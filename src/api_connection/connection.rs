use dotenv::dotenv;
use reqwest::Client;
use std::env;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Provider, ResponseFormat, DEFAULT_GEMINI_MODEL,
    DEFAULT_GROQ_MODEL, DEFAULT_OPENAI_MODEL,
};

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Why a completion backend gave no usable text.
#[derive(Debug)]
pub enum ApiConnectionError {
    /// Names the key variable that is unset or blank. Chains skip such backends.
    MissingApiKey(String),
    /// The request never got an HTTP answer, or the answer was not a chat completion.
    Transport { backend: String, source: reqwest::Error },
    /// Non-2xx answer, e.g. a bad key or an exhausted quota.
    Rejected { backend: String, status: reqwest::StatusCode, body: String },
    EmptyResponse(String),
    Timeout { backend: String, after: Duration },
    NoProvidersAvailable,
}

impl ApiConnectionError {
    /// The backend that failed, when one is known.
    pub fn backend(&self) -> Option<&str> {
        match self {
            ApiConnectionError::Transport { backend, .. }
            | ApiConnectionError::Rejected { backend, .. }
            | ApiConnectionError::Timeout { backend, .. } => Some(backend),
            ApiConnectionError::EmptyResponse(backend) => Some(backend),
            ApiConnectionError::MissingApiKey(_) | ApiConnectionError::NoProvidersAvailable => None,
        }
    }

    /// 401/403/429: retrying the same backend soon will not help.
    pub fn is_auth_or_quota(&self) -> bool {
        matches!(
            self,
            ApiConnectionError::Rejected { status, .. }
                if *status == reqwest::StatusCode::UNAUTHORIZED
                    || *status == reqwest::StatusCode::FORBIDDEN
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
        )
    }
}

fn body_preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let preview: String = trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
    format!("{}...", preview)
}

impl fmt::Display for ApiConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiConnectionError::MissingApiKey(key_name) => write!(f, "Completion key {} is not set", key_name),
            ApiConnectionError::Transport { backend, source } => write!(f, "{} unreachable: {}", backend, source),
            ApiConnectionError::Rejected { backend, status, body } => {
                write!(f, "{} rejected the completion request ({}): {}", backend, status, body_preview(body))
            }
            ApiConnectionError::EmptyResponse(backend) => write!(f, "{} answered without any text", backend),
            ApiConnectionError::Timeout { backend, after } => {
                write!(f, "{} gave no answer within {:?}", backend, after)
            }
            ApiConnectionError::NoProvidersAvailable => write!(f, "No completion backend is configured"),
        }
    }
}

impl Error for ApiConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiConnectionError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Opaque "system prompt + user prompt -> text" capability. The core consults it
/// opportunistically and never depends on it.
#[async_trait::async_trait]
pub trait TextCompletion: Send + Sync {
    fn name(&self) -> &str;

    async fn complete_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ApiConnectionError>;
}

impl Provider {
    pub fn gemini(api_key_env_var_name: &str, model: Option<&str>) -> Self {
        Self::Gemini {
            api_key: api_key_env_var_name.to_string(),
            model: model.unwrap_or(DEFAULT_GEMINI_MODEL).to_string(),
        }
    }

    pub fn groq(api_key_env_var_name: &str, model: Option<&str>) -> Self {
        Self::Groq {
            api_key: api_key_env_var_name.to_string(),
            model: model.unwrap_or(DEFAULT_GROQ_MODEL).to_string(),
        }
    }

    pub fn openai(api_key_env_var_name: &str, model: Option<&str>) -> Self {
        Self::OpenAi {
            api_key: api_key_env_var_name.to_string(),
            model: model.unwrap_or(DEFAULT_OPENAI_MODEL).to_string(),
        }
    }

    /// True when the key variable is set (after loading `.env`).
    pub fn is_configured(&self) -> bool {
        dotenv().ok();
        env::var(self.api_key_env_var()).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    pub fn build_request(&self, system_prompt: &str, user_prompt: &str, json_output: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model().to_string(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            response_format: json_output.then(ResponseFormat::json_object),
            temperature: Some(0.7),
            max_tokens: Some(1500),
        }
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        dotenv().ok();
        let api_key_env_var_name = self.api_key_env_var();
        let actual_api_key = env::var(api_key_env_var_name)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ApiConnectionError::MissingApiKey(api_key_env_var_name.to_string()))?;
        let transport = |source: reqwest::Error| ApiConnectionError::Transport { backend: self.name().to_string(), source };

        let client = Client::new();
        let response = client
            .post(self.url())
            .bearer_auth(actual_api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            response.json::<ChatCompletionResponse>().await.map_err(transport)
        } else {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(ApiConnectionError::Rejected { backend: self.name().to_string(), status, body })
        }
    }
}

#[async_trait::async_trait]
impl TextCompletion for Provider {
    fn name(&self) -> &str {
        Provider::name(self)
    }

    async fn complete_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ApiConnectionError> {
        let request = self.build_request(system_prompt, user_prompt, false);
        let response = self.call_chat_completion(request).await?;
        response
            .first_content()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiConnectionError::EmptyResponse(Provider::name(self).to_string()))
    }
}

/// Tries each backend in order, each bounded by `timeout`; the first non-empty
/// answer wins. Backends without a key are skipped quietly.
#[derive(Clone)]
pub struct ProviderChain {
    backends: Vec<Arc<dyn TextCompletion>>,
    timeout: Duration,
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("ProviderChain")
            .field("backends", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderChain {
    pub fn new(backends: Vec<Arc<dyn TextCompletion>>, timeout: Duration) -> Self {
        Self { backends, timeout }
    }

    /// Gemini, then Groq, then OpenAI, with the usual key variable names.
    pub fn from_env_defaults(timeout: Duration) -> Self {
        let backends: Vec<Arc<dyn TextCompletion>> = vec![
            Arc::new(Provider::gemini("GEMINI_API_KEY", None)),
            Arc::new(Provider::groq("GROQ_API_KEY", None)),
            Arc::new(Provider::openai("OPENAI_API_KEY", None)),
        ];
        Self::new(backends, timeout)
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait::async_trait]
impl TextCompletion for ProviderChain {
    fn name(&self) -> &str {
        "provider-chain"
    }

    async fn complete_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ApiConnectionError> {
        let mut last_error = ApiConnectionError::NoProvidersAvailable;

        for backend in &self.backends {
            let attempt = tokio::time::timeout(self.timeout, backend.complete_text(system_prompt, user_prompt)).await;
            match attempt {
                Ok(Ok(text)) => {
                    log::debug!("Completion served by {}", backend.name());
                    return Ok(text);
                }
                Ok(Err(ApiConnectionError::MissingApiKey(key))) => {
                    log::debug!("Skipping {}: {} not set", backend.name(), key);
                }
                Ok(Err(err)) if err.is_auth_or_quota() => {
                    log::warn!("Provider {} refused the request, check its key or quota: {}", backend.name(), err);
                    last_error = err;
                }
                Ok(Err(err)) => {
                    log::warn!("Provider {} failed: {}", backend.name(), err);
                    last_error = err;
                }
                Err(_) => {
                    log::warn!("Provider {} timed out after {:?}", backend.name(), self.timeout);
                    last_error = ApiConnectionError::Timeout {
                        backend: backend.name().to_string(),
                        after: self.timeout,
                    };
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        reply: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, reply: Option<&'static str>) -> Self {
            Self { name, reply, delay: Duration::ZERO, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait::async_trait]
    impl TextCompletion for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, ApiConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply
                .map(str::to_string)
                .ok_or_else(|| ApiConnectionError::EmptyResponse(self.name.to_string()))
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_backend() {
        let first = Arc::new(Scripted::new("first", None));
        let second = Arc::new(Scripted::new("second", Some("hello")));
        let backends: Vec<Arc<dyn TextCompletion>> = vec![first.clone(), second.clone()];
        let chain = ProviderChain::new(backends, Duration::from_secs(1));

        let text = chain.complete_text("sys", "user").await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_times_out_slow_backend() {
        let mut slow = Scripted::new("slow", Some("late"));
        slow.delay = Duration::from_millis(200);
        let backends: Vec<Arc<dyn TextCompletion>> = vec![Arc::new(slow)];
        let chain = ProviderChain::new(backends, Duration::from_millis(20));

        let err = chain.complete_text("sys", "user").await.unwrap_err();
        assert!(matches!(err, ApiConnectionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_chain_reports_no_providers() {
        let chain = ProviderChain::new(Vec::new(), Duration::from_secs(1));
        let err = chain.complete_text("sys", "user").await.unwrap_err();
        assert!(matches!(err, ApiConnectionError::NoProvidersAvailable));
    }

    #[tokio::test]
    async fn test_missing_keys_are_skipped() {
        let backends: Vec<Arc<dyn TextCompletion>> = vec![
            Arc::new(Provider::gemini("NUTRI_ENGINE_TEST_MISSING_KEY_A", None)),
            Arc::new(Provider::groq("NUTRI_ENGINE_TEST_MISSING_KEY_B", None)),
        ];
        let chain = ProviderChain::new(backends, Duration::from_secs(1));
        let err = chain.complete_text("sys", "user").await.unwrap_err();
        assert!(matches!(err, ApiConnectionError::NoProvidersAvailable));
    }

    #[test]
    fn test_build_request_json_mode() {
        let provider = Provider::groq("GROQ_API_KEY", None);
        let request = provider.build_request("sys", "user", true);
        assert_eq!(request.model, DEFAULT_GROQ_MODEL);
        assert_eq!(request.messages.len(), 2);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_error_names_backend_and_trims_body() {
        let err = ApiConnectionError::Rejected {
            backend: "groq".to_string(),
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: "x".repeat(500),
        };
        assert_eq!(err.backend(), Some("groq"));
        assert!(err.is_auth_or_quota());
        let message = err.to_string();
        assert!(message.starts_with("groq rejected the completion request (429 Too Many Requests)"));
        assert!(message.ends_with("..."));
        assert!(message.len() < 300);

        let timeout = ApiConnectionError::Timeout { backend: "gemini".to_string(), after: Duration::from_secs(2) };
        assert_eq!(timeout.backend(), Some("gemini"));
        assert!(!timeout.is_auth_or_quota());
        assert_eq!(ApiConnectionError::NoProvidersAvailable.backend(), None);
    }

    #[tokio::test]
    async fn test_blank_key_counts_as_missing() {
        std::env::set_var("NUTRI_ENGINE_TEST_BLANK_KEY", "   ");
        let provider = Provider::openai("NUTRI_ENGINE_TEST_BLANK_KEY", None);
        let err = provider.call_chat_completion(provider.build_request("sys", "user", false)).await.unwrap_err();
        assert!(matches!(err, ApiConnectionError::MissingApiKey(ref key) if key == "NUTRI_ENGINE_TEST_BLANK_KEY"));
        std::env::remove_var("NUTRI_ENGINE_TEST_BLANK_KEY");
    }
}
