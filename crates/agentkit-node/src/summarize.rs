use std::sync::LazyLock;
use std::time::Duration;

use agentkit_store::Store;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{HandlerConfig, HandlerError, HandlerOutcome, NodeHandler, TokenUsage, non_empty_str, stringify};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TEMPERATURE: f64 = 0.3;

// Matches the OpenAI client's own default; the Sheets handler uses a much
// shorter timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert email analyst. Given an email (subject, body, and any attachments), \
produce a clean, structured summary with the following sections:\n\
1. **Summary** – 2-3 sentence overview\n\
2. **Key Points** – bullet list of important information\n\
3. **Action Items** – any tasks or follow-ups required\n\
4. **Sentiment** – overall tone (positive / neutral / negative)\n\
5. **Category** – classify as: support / sales / invoice / hr / general\n\
Be concise and professional.";

static SECTION_BOUNDARY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\n(?:#+|\d+\.|\*\*)").expect("section boundary pattern"));

/// Sends extracted email content to the OpenAI chat endpoint and returns a
/// structured summary.
///
/// The API key comes from the node data, falling back to the process-wide
/// `OPENAI_API_KEY`. The five structured fields are extracted from the
/// summary text by heading.
#[derive(Debug)]
pub struct SummarizeHandler {
  http: reqwest::Client,
  base_url: String,
  fallback_api_key: Option<String>,
}

impl SummarizeHandler {
  pub fn new(config: &HandlerConfig) -> Self {
    Self {
      http: reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("http client"),
      base_url: config.openai_base_url.trim_end_matches('/').to_string(),
      fallback_api_key: config
        .openai_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string),
    }
  }
}

#[async_trait]
impl NodeHandler for SummarizeHandler {
  async fn execute(
    &self,
    data: &Map<String, Value>,
    _context: &Map<String, Value>,
    _store: &dyn Store,
  ) -> Result<HandlerOutcome, HandlerError> {
    let api_key = non_empty_str(data, "api_key")
      .or(self.fallback_api_key.as_deref())
      .ok_or_else(|| {
        HandlerError::Config(
          "OpenAI API key is required. Set it in the Summarize node config.".to_string(),
        )
      })?;

    let model = non_empty_str(data, "model").unwrap_or(DEFAULT_MODEL);
    let temperature = temperature_from(data);
    let email_content = stringify(data.get("email_content"));
    let system_prompt = non_empty_str(data, "system_prompt").unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let request = ChatRequest {
      model,
      messages: vec![
        ChatMessage {
          role: "system",
          content: system_prompt.to_string(),
        },
        ChatMessage {
          role: "user",
          content: format!("Analyse this email:\n\n{}", email_content),
        },
      ],
      temperature,
    };

    let response = self
      .http
      .post(format!("{}/v1/chat/completions", self.base_url))
      .bearer_auth(api_key)
      .json(&request)
      .send()
      .await
      .map_err(|e| HandlerError::upstream("openai", e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(HandlerError::upstream(
        "openai",
        format!("chat completion returned {}: {}", status, body),
      ));
    }

    let completion: ChatResponse = response
      .json()
      .await
      .map_err(|e| HandlerError::upstream("openai", format!("malformed chat response: {}", e)))?;

    let summary = completion
      .choices
      .first()
      .and_then(|choice| choice.message.content.clone())
      .unwrap_or_default();

    let Value::Object(output) = json!({
      "summary": summary,
      "overview": extract_section(&summary, "Summary"),
      "key_points": extract_section(&summary, "Key Points"),
      "action_items": extract_section(&summary, "Action Items"),
      "sentiment": extract_section(&summary, "Sentiment"),
      "category": extract_section(&summary, "Category"),
      "model": model,
    }) else {
      unreachable!()
    };

    Ok(HandlerOutcome {
      output,
      token_usage: completion.usage.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
      }),
    })
  }
}

fn temperature_from(data: &Map<String, Value>) -> f64 {
  match data.get("temperature") {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_TEMPERATURE),
    Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_TEMPERATURE),
    _ => DEFAULT_TEMPERATURE,
  }
}

/// Capture the text under a heading up to the next heading-like boundary.
///
/// Tolerant of Markdown decoration around the heading (`## Key Points`,
/// `**Key Points:**`, `2. **Key Points**`) and case-insensitive.
fn extract_section(text: &str, heading: &str) -> String {
  let pattern = format!(r"(?i)(?:#+\s*|\*\*)?{}[:*]*\s*", regex::escape(heading));
  let heading_re = Regex::new(&pattern).expect("section heading pattern");

  let Some(found) = heading_re.find(text) else {
    return String::new();
  };

  let rest = &text[found.end()..];
  let section = match SECTION_BOUNDARY.find(rest) {
    Some(boundary) => &rest[..boundary.start()],
    None => rest,
  };
  section.trim().to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
  usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
  message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
  content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
  prompt_tokens: u64,
  completion_tokens: u64,
  total_tokens: u64,
}
