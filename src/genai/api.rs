use crate::genai::response::GeminiResponse;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

/// One chat-style completion call. The system instruction pins the output
/// contract; the caller still treats the text as untrusted and re-parses it.
pub async fn call_gemini(
    api_key: &str,
    prompt: String,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    debug!("Prompt: \n{}", prompt);

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/gemma-3-27b-it:generateContent?key={}",
        api_key
    );

    let body = json!({
        "system_instruction": {
            "parts": [
                {
                    "text": "You classify financial transactions. Output only a JSON array of category-name strings, nothing else."
                }
            ]
        },
        "contents": [
            {
                "role": "user",
                "parts": [
                    {
                        "text": prompt
                    }
                ]
            }
        ],
        "generationConfig": {
            "temperature": 0.2,
            "topK": 64,
            "topP": 0.98,
            "maxOutputTokens": 1024,
            "responseMimeType": "text/plain"
        }
    });

    let client = Client::new();

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    if response.status().is_success() {
        let response: GeminiResponse = serde_json::from_str(&response.text().await?)?;
        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or("Gemini response contained no candidate text")?;
        Ok(text)
    } else {
        warn!(
            "Gemini call failed with status: {} {}",
            response.status(),
            response.text().await?
        );
        Err("Gemini call failed".into())
    }
}
