//! Language-model arbitration: the authoritative tie-breaker for ambiguous
//! topic matches.
//!
//! Providers do the actual remote call; [`Arbiter`] wraps any provider with a
//! verdict cache, a daily call budget, a per-call timeout, and a bounded
//! retry policy. On exhaustion the caller falls back to keywords: an
//! arbitration failure must never abort batch processing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::ArbiterConfig;
use crate::error::EngineError;
use crate::fingerprint::short_hash;

/// Shortlisted topic passed to the model.
#[derive(Debug, Clone, Serialize)]
pub struct TopicCandidate {
    pub topic_id: String,
    pub name: String,
}

/// The model's decision. `topic_id: None` means "no match", and that is
/// final; keyword output does not override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterVerdict {
    pub topic_id: Option<String>,
    /// 0–1.
    pub confidence: f32,
    pub reason: String,
}

/// Low-level provider: one remote classification call.
#[async_trait]
pub trait ArbitrationProvider: Send + Sync {
    async fn classify(
        &self,
        signal_text: &str,
        candidates: &[TopicCandidate],
    ) -> Result<ArbiterVerdict, EngineError>;

    fn name(&self) -> &'static str;
}

/// Always fails; used when arbitration is switched off. Callers degrade to
/// the keyword fallback exactly as with a dead provider.
pub struct DisabledProvider;

#[async_trait]
impl ArbitrationProvider for DisabledProvider {
    async fn classify(
        &self,
        _signal_text: &str,
        _candidates: &[TopicCandidate],
    ) -> Result<ArbiterVerdict, EngineError> {
        Err(EngineError::Classification("arbitration disabled".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Scripted provider for tests: fixed verdict, optional leading failures.
pub struct MockProvider {
    pub verdict: ArbiterVerdict,
    fail_first: AtomicU32,
    pub calls: AtomicU32,
}

impl MockProvider {
    pub fn returning(verdict: ArbiterVerdict) -> Self {
        Self {
            verdict,
            fail_first: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` calls, then answer normally.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = AtomicU32::new(n);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArbitrationProvider for MockProvider {
    async fn classify(
        &self,
        _signal_text: &str,
        _candidates: &[TopicCandidate],
    ) -> Result<ArbiterVerdict, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::Classification("mock failure".into()));
        }
        Ok(self.verdict.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Chat-completions provider. Requires `ARBITER_API_KEY`; the endpoint and
/// model default to OpenAI but stay overridable for compatible gateways.
pub struct HttpProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl HttpProvider {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("ARBITER_API_KEY").unwrap_or_default();
        let endpoint = std::env::var("ARBITER_ENDPOINT")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let http = reqwest::Client::builder()
            .user_agent("signal-studio/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            endpoint,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
        }
    }

    fn prompt(signal_text: &str, candidates: &[TopicCandidate]) -> String {
        let list = candidates
            .iter()
            .map(|c| format!("- {}: {}", c.topic_id, c.name))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are classifying a news signal against a channel's topic list.\n\
             SIGNAL: \"{signal_text}\"\n\
             CANDIDATE TOPICS:\n{list}\n\
             Pick the single best topic id, or null if none truly fits. \
             Military and conflict stories belong to geopolitics topics, never technology. \
             When in doubt, answer null.\n\
             Reply with JSON only: {{\"topic_id\": <id or null>, \"confidence\": <0..1>, \"reason\": <short>}}"
        )
    }
}

#[async_trait]
impl ArbitrationProvider for HttpProvider {
    async fn classify(
        &self,
        signal_text: &str,
        candidates: &[TopicCandidate],
    ) -> Result<ArbiterVerdict, EngineError> {
        if self.api_key.is_empty() {
            return Err(EngineError::Classification("ARBITER_API_KEY not set".into()));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let prompt = Self::prompt(signal_text, candidates);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: "You classify content signals. Output strict JSON, nothing else.",
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.1,
            max_tokens: 120,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| EngineError::Classification(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(EngineError::Classification(format!(
                "provider returned {}",
                resp.status()
            )));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| EngineError::Classification(format!("bad response body: {e}")))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        parse_verdict(content, candidates)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Parse the model's JSON, tolerating surrounding prose, and reject topic ids
/// that were not in the shortlist.
fn parse_verdict(
    content: &str,
    candidates: &[TopicCandidate],
) -> Result<ArbiterVerdict, EngineError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => return Err(EngineError::Classification("no JSON in model output".into())),
    };
    let mut verdict: ArbiterVerdict = serde_json::from_str(json)
        .map_err(|e| EngineError::Classification(format!("unparseable verdict: {e}")))?;
    verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
    if let Some(id) = &verdict.topic_id {
        if !candidates.iter().any(|c| &c.topic_id == id) {
            warn!(topic_id = %id, "model picked a topic outside the shortlist, treating as no match");
            verdict.topic_id = None;
        }
    }
    Ok(verdict)
}

#[derive(Debug, Clone)]
struct DailyCounter {
    day: chrono::NaiveDate,
    count: u32,
}

/// Provider wrapper: cache, daily budget, timeout, bounded retries.
pub struct Arbiter<P: ArbitrationProvider> {
    provider: P,
    cfg: ArbiterConfig,
    cache: TtlCache<String, ArbiterVerdict>,
    counter: Mutex<DailyCounter>,
}

impl<P: ArbitrationProvider> Arbiter<P> {
    pub fn new(provider: P, cfg: ArbiterConfig) -> Self {
        let cache = TtlCache::new(Duration::from_secs(cfg.cache_ttl_secs), 1024);
        Self {
            provider,
            cfg,
            cache,
            counter: Mutex::new(DailyCounter {
                day: chrono::Utc::now().date_naive(),
                count: 0,
            }),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    #[cfg(test)]
    pub(crate) fn provider_ref(&self) -> &P {
        &self.provider
    }

    fn budget_exhausted(&self) -> bool {
        let mut guard = match self.counter.lock() {
            Ok(g) => g,
            Err(_) => return false,
        };
        let today = chrono::Utc::now().date_naive();
        if guard.day != today {
            guard.day = today;
            guard.count = 0;
        }
        guard.count >= self.cfg.daily_limit
    }

    fn count_call(&self) {
        if let Ok(mut guard) = self.counter.lock() {
            guard.count = guard.count.saturating_add(1);
        }
    }

    /// One arbitration with timeout + retries. Cache hits cost nothing and do
    /// not touch the daily budget.
    pub async fn arbitrate(
        &self,
        signal_text: &str,
        candidates: &[TopicCandidate],
    ) -> Result<ArbiterVerdict, EngineError> {
        let key = short_hash(&format!(
            "{}|{}",
            signal_text,
            candidates
                .iter()
                .map(|c| c.topic_id.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ));
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "arbiter cache hit");
            return Ok(hit);
        }
        if self.budget_exhausted() {
            return Err(EngineError::ArbitrationBudget);
        }

        let timeout = Duration::from_millis(self.cfg.timeout_ms);
        let mut last_err: Option<EngineError> = None;
        for attempt in 0..=self.cfg.max_retries {
            match tokio::time::timeout(timeout, self.provider.classify(signal_text, candidates))
                .await
            {
                Ok(Ok(verdict)) => {
                    self.count_call();
                    self.cache.insert(key, verdict.clone());
                    return Ok(verdict);
                }
                Ok(Err(e)) => {
                    debug!(attempt, error = %e, "arbitration attempt failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    debug!(attempt, timeout_ms = self.cfg.timeout_ms, "arbitration attempt timed out");
                    last_err = Some(EngineError::ArbitrationTimeout(self.cfg.timeout_ms));
                }
            }
        }
        self.count_call();
        Err(last_err.unwrap_or_else(|| EngineError::Classification("arbitration failed".into())))
    }
}
