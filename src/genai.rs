//! AI-assisted categorization for transactions the rule-based resolver
//! could not place.
//!
//! Uncertain transactions are chunked into bounded batch prompts; the model
//! must answer with a JSON array of category names, one per transaction, in
//! order. Every failure mode — missing API key, rate limit, network error,
//! malformed response — degrades to "General" and is never surfaced to the
//! caller.

mod api;
mod response;

use crate::model::Category;
use crate::ratelimit::{ActionKind, RateLimiter};
use crate::rules::GENERAL_LABEL;
use regex::Regex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const BATCH_CHUNK_SIZE: usize = 20;

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, Box<dyn std::error::Error + Send + Sync>>> + Send + 'a>>;

/// One completion call against a model backend. Production uses the Gemini
/// REST API; tests plug in scripted responses.
pub trait CompletionApi: Send + Sync {
    fn complete(&self, prompt: String) -> CompletionFuture<'_>;
}

pub struct GeminiApi {
    api_key: String,
}

impl GeminiApi {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }
}

impl CompletionApi for GeminiApi {
    fn complete(&self, prompt: String) -> CompletionFuture<'_> {
        Box::pin(api::call_gemini(&self.api_key, prompt))
    }
}

/// Returns queued responses in order; a drained queue is a backend error.
/// Used by tests and offline replays.
#[derive(Default)]
pub struct ScriptedCompletionApi {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedCompletionApi {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

impl CompletionApi for ScriptedCompletionApi {
    fn complete(&self, _prompt: String) -> CompletionFuture<'_> {
        let next = self.responses.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(text) => Ok(text),
                None => Err("no scripted response left".into()),
            }
        })
    }
}

#[derive(Clone)]
pub struct GeminiClassifier {
    api: Option<Arc<dyn CompletionApi>>,
    limiter: RateLimiter,
}

impl GeminiClassifier {
    pub fn new(api: Option<Arc<dyn CompletionApi>>, limiter: RateLimiter) -> Self {
        Self { api, limiter }
    }

    pub fn from_env(limiter: RateLimiter) -> Self {
        let api = dotenv::var("GEMINI_API_KEY")
            .ok()
            .map(|key| Arc::new(GeminiApi::new(key)) as Arc<dyn CompletionApi>);
        Self::new(api, limiter)
    }

    /// Classifies one transaction description against the pool. Returns a
    /// pool label, or "General" on any failure.
    pub async fn predict_category(&self, note: &str, pool: &[Category]) -> String {
        self.predict_categories_batch(&[note.to_string()], pool)
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| GENERAL_LABEL.to_string())
    }

    /// Classifies a batch of descriptions, one chunked request per
    /// [`BATCH_CHUNK_SIZE`] transactions, awaited sequentially. The result
    /// always has the same length as `notes`.
    pub async fn predict_categories_batch(
        &self,
        notes: &[String],
        pool: &[Category],
    ) -> Vec<String> {
        let Some(api) = &self.api else {
            info!("No Gemini API key configured, defaulting {} transactions to General", notes.len());
            return vec![GENERAL_LABEL.to_string(); notes.len()];
        };

        let mut labels = Vec::with_capacity(notes.len());

        for chunk in notes.chunks(BATCH_CHUNK_SIZE) {
            if let Err(e) = self.limiter.check_limit(ActionKind::AiCategorize) {
                warn!("AI categorization throttled, defaulting chunk to General: {}", e);
                labels.extend(std::iter::repeat_n(GENERAL_LABEL.to_string(), chunk.len()));
                continue;
            }

            let prompt = build_prompt(chunk, pool);

            let chunk_labels = match api.complete(prompt).await {
                Ok(text) => match extract_label_array(&text) {
                    Some(parsed) => {
                        info!("Gemini returned {} labels for chunk of {}", parsed.len(), chunk.len());
                        parsed
                    }
                    None => {
                        warn!("Could not parse Gemini response as a JSON array, defaulting chunk to General");
                        Vec::new()
                    }
                },
                Err(e) => {
                    warn!("Gemini call failed, defaulting chunk to General: {}", e);
                    Vec::new()
                }
            };

            for i in 0..chunk.len() {
                let label = chunk_labels
                    .get(i)
                    .map(|l| map_to_pool(l, pool))
                    .unwrap_or_else(|| GENERAL_LABEL.to_string());
                labels.push(label);
            }
        }

        labels
    }
}

fn build_prompt(notes: &[String], pool: &[Category]) -> String {
    let categories = pool
        .iter()
        .map(|c| c.label.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let numbered = notes
        .iter()
        .enumerate()
        .map(|(i, note)| format!("{}. {}", i + 1, scrub_note(note)))
        .collect::<Vec<_>>()
        .join("\n");

    PROMPT
        .to_string()
        .replace("{CATEGORIES}", &categories)
        .replace("{TRANSACTIONS}", &numbered)
        .replace("{COUNT}", &notes.len().to_string())
}

/// Masks account tails, long digit runs and dates before a note leaves the
/// process. Merchant words carry the classification signal; the numbers are
/// only identifying.
fn scrub_note(note: &str) -> String {
    let regex_replaces: [(Regex, &str); 3] = [
        (Regex::new(r"(?i)[x*]{2,}\d{2,6}\b").unwrap(), "X0000"),
        (Regex::new(r"\d{5,}").unwrap(), "00000"),
        (
            Regex::new(r"\b\d{1,2}[-/]\d{1,2}(?:[-/]\d{2,4})?\b").unwrap(),
            "01/01",
        ),
    ];

    let mut scrubbed = note.to_string();
    for (re, replacement) in &regex_replaces {
        scrubbed = re.replace_all(&scrubbed, *replacement).to_string();
    }
    scrubbed
}

/// Strips code-fence wrapping and stray surrounding text, then parses the
/// first top-level JSON array of strings.
fn extract_label_array(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let candidate = if unfenced.starts_with('[') {
        unfenced.to_string()
    } else {
        let re = Regex::new(r"(?s)\[.*?\]").unwrap();
        re.find(unfenced)?.as_str().to_string()
    };

    serde_json::from_str::<Vec<String>>(&candidate).ok()
}

/// Maps a model-returned label onto the pool, case-insensitive; anything
/// unknown becomes "General".
fn map_to_pool(label: &str, pool: &[Category]) -> String {
    pool.iter()
        .find(|c| c.matches_label(label.trim()))
        .map(|c| c.label.clone())
        .unwrap_or_else(|| GENERAL_LABEL.to_string())
}

const PROMPT: &str = r#"
You are a financial transaction classifier.

Allowed categories (use these names exactly):
{CATEGORIES}

Transactions:
{TRANSACTIONS}

Classify each numbered transaction into exactly one allowed category.
Respond with a JSON array of {COUNT} category-name strings, one per
transaction, in order. Output only the JSON array.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MemoryWindowStore;
    use std::sync::Arc;

    fn pool() -> Vec<Category> {
        vec![
            Category::new("Food", "🍔", "#FF7043", false),
            Category::new("Transport", "🚕", "#42A5F5", false),
            Category::new("General", "💳", "#9E9E9E", false),
        ]
    }

    fn classifier_without_key() -> GeminiClassifier {
        let limiter = RateLimiter::new(Arc::new(MemoryWindowStore::default()), true);
        GeminiClassifier::new(None, limiter)
    }

    #[test]
    fn parses_bare_array() {
        assert_eq!(
            extract_label_array(r#"["Food","Transport"]"#),
            Some(vec!["Food".to_string(), "Transport".to_string()])
        );
    }

    #[test]
    fn strips_code_fence() {
        let text = "```json\n[\"Food\", \"General\"]\n```";
        assert_eq!(
            extract_label_array(text),
            Some(vec!["Food".to_string(), "General".to_string()])
        );
    }

    #[test]
    fn extracts_array_from_surrounding_prose() {
        let text = "Sure! Here are the categories:\n[\"Transport\"]\nHope that helps.";
        assert_eq!(extract_label_array(text), Some(vec!["Transport".to_string()]));
    }

    #[test]
    fn malformed_response_yields_none() {
        assert_eq!(extract_label_array("Transport, Food"), None);
        assert_eq!(extract_label_array("[1, 2, 3]"), None);
    }

    #[test]
    fn unknown_labels_map_to_general() {
        assert_eq!(map_to_pool("food", &pool()), "Food");
        assert_eq!(map_to_pool(" Transport ", &pool()), "Transport");
        assert_eq!(map_to_pool("Cryptocurrency", &pool()), "General");
    }

    #[test]
    fn prompt_lists_pool_and_numbered_transactions() {
        let prompt = build_prompt(
            &["Zomato order".to_string(), "Uber ride".to_string()],
            &pool(),
        );
        assert!(prompt.contains("Food, Transport, General"));
        assert!(prompt.contains("1. Zomato order"));
        assert!(prompt.contains("2. Uber ride"));
    }

    #[test]
    fn scrub_masks_account_tails_digit_runs_and_dates() {
        assert_eq!(scrub_note("A/c XX1234 on 05/01"), "A/c X0000 on 01/01");
        assert_eq!(scrub_note("ref 881234567 Amazon"), "ref 00000 Amazon");
        assert_eq!(scrub_note("card **4321 at pos"), "card X0000 at pos");
        assert_eq!(scrub_note("Zomato"), "Zomato");
    }

    #[test]
    fn prompt_never_carries_account_tails_or_references() {
        let prompt = build_prompt(
            &["A/c XX1234 ref 881234567 Amazon".to_string()],
            &pool(),
        );
        assert!(!prompt.contains("XX1234"));
        assert!(!prompt.contains("881234567"));
        assert!(prompt.contains("Amazon"));
    }

    #[tokio::test]
    async fn scripted_labels_map_back_by_index() {
        let api = Arc::new(ScriptedCompletionApi::new([
            r#"["Food","General","Transport"]"#,
        ]));
        let limiter = RateLimiter::new(Arc::new(MemoryWindowStore::default()), true);
        let classifier = GeminiClassifier::new(Some(api), limiter);

        let labels = classifier
            .predict_categories_batch(
                &[
                    "Zomato".to_string(),
                    "mystery spend".to_string(),
                    "Uber".to_string(),
                ],
                &pool(),
            )
            .await;
        assert_eq!(labels, vec!["Food", "General", "Transport"]);
    }

    #[tokio::test]
    async fn backend_error_defaults_chunk_to_general() {
        // drained script: every call errors out
        let api = Arc::new(ScriptedCompletionApi::default());
        let limiter = RateLimiter::new(Arc::new(MemoryWindowStore::default()), true);
        let classifier = GeminiClassifier::new(Some(api), limiter);

        let labels = classifier
            .predict_categories_batch(&["Zomato".to_string()], &pool())
            .await;
        assert_eq!(labels, vec!["General"]);
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_to_general() {
        let labels = classifier_without_key()
            .predict_categories_batch(
                &["Zomato".to_string(), "Unknown thing".to_string()],
                &pool(),
            )
            .await;
        assert_eq!(labels, vec!["General", "General"]);
    }

    #[tokio::test]
    async fn single_prediction_defaults_to_general_without_key() {
        let label = classifier_without_key()
            .predict_category("mystery spend", &pool())
            .await;
        assert_eq!(label, "General");
    }
}
