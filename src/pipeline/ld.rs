//! LLM Decomposer: splits a complex task into 2-5 ordered, ≤3h subtasks.
//! The validator, not the prompt, enforces the hard constraints.

use crate::llm::{repair_json, LlmBridgeClient};
use crate::types::{Classification, Decomposition, Subtask, TaskKind};
use once_cell::sync::Lazy;
use regex::Regex;

const TEMPERATURE: f32 = 0.3;
const MAX_SUBTASK_MINUTES: i64 = 180;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^PT(\d+H)?(\d+M)?$").unwrap());

const SYSTEM_PROMPT: &str = r#"You break down complex tasks into clear, schedulable subtasks.

Rules:
- Return STRICT JSON only.
- 2-5 subtasks, ordered first to last.
- Each duration must be <= PT3H, ISO-8601 format (PT30M, PT1H, PT2H30M, PT3H).
- No dates/times in titles.
- Include a parenthetical context phrase from the parent title at the end of each subtask title.

Return ONLY valid JSON: {"subtasks": [{"title": "...", "duration": "PT..."}]}"#;

#[derive(serde::Deserialize)]
struct RawSubtask {
    title: String,
    duration: String,
}

#[derive(serde::Deserialize)]
struct RawDecomposition {
    subtasks: Vec<RawSubtask>,
}

pub struct LlmDecomposer<'a> {
    llm: &'a LlmBridgeClient,
}

impl<'a> LlmDecomposer<'a> {
    pub fn new(llm: &'a LlmBridgeClient) -> Self {
        Self { llm }
    }

    /// Decompose `classification` (must be `TaskKind::Complex`) into
    /// subtasks. Never returns an error: LLM failure or a response that
    /// validates down to fewer than 2 usable subtasks both fall back to
    /// the default two-subtask template.
    pub async fn decompose(&self, classification: &Classification) -> Decomposition {
        debug_assert!(matches!(classification.kind, TaskKind::Complex));

        let user_prompt = format!(
            "Title: \"{}\"\nType: complex\nCalendar: {}\n\nDecompose into 2-5 subtasks with ISO-8601 durations (max PT3H each):",
            classification.title,
            classification.calendar.as_deref().unwrap_or("N/A"),
        );

        let raw_subtasks = match self.llm.chat(SYSTEM_PROMPT, &user_prompt, TEMPERATURE).await {
            Ok(raw) => {
                let repaired = repair_json(&raw);
                serde_json::from_str::<RawDecomposition>(&repaired)
                    .map(|d| d.subtasks)
                    .unwrap_or_default()
            }
            Err(_) => Vec::new(),
        };

        let subtasks = validate_and_fix(raw_subtasks);

        Decomposition {
            calendar: classification.calendar.clone(),
            title: classification.title.clone(),
            subtasks,
        }
    }
}

fn default_subtasks() -> Vec<Subtask> {
    vec![
        Subtask { title: "Plan and outline".to_string(), duration: "PT45M".to_string() },
        Subtask { title: "Execute and finalize".to_string(), duration: "PT1H".to_string() },
    ]
}

fn validate_and_fix(raw: Vec<RawSubtask>) -> Vec<Subtask> {
    let mut validated: Vec<Subtask> = Vec::new();

    for st in raw {
        let title = st.title.trim().to_string();
        if title.len() < 3 {
            continue;
        }

        let duration = st.duration.trim().to_uppercase();
        let Some(minutes) = parse_duration_minutes(&duration) else {
            continue;
        };

        let capped = if minutes > MAX_SUBTASK_MINUTES {
            "PT3H".to_string()
        } else {
            duration
        };

        validated.push(Subtask { title, duration: capped });
    }

    if validated.len() < 2 {
        return default_subtasks();
    }

    validated.truncate(5);
    validated
}

fn parse_duration_minutes(duration: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(duration)?;
    if caps.get(1).is_none() && caps.get(2).is_none() {
        return None;
    }
    let hours: i64 = caps
        .get(1)
        .map(|m| m.as_str().trim_end_matches(['H', 'h']).parse().unwrap_or(0))
        .unwrap_or(0);
    let minutes: i64 = caps
        .get(2)
        .map(|m| m.as_str().trim_end_matches(['M', 'm']).parse().unwrap_or(0))
        .unwrap_or(0);
    Some(hours * 60 + minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_overlong_duration_to_pt3h() {
        let raw = vec![
            RawSubtask { title: "Research everything thoroughly".into(), duration: "PT5H".into() },
            RawSubtask { title: "Write it up completely".into(), duration: "PT1H".into() },
        ];
        let fixed = validate_and_fix(raw);
        assert_eq!(fixed[0].duration, "PT3H");
    }

    #[test]
    fn drops_short_titles_and_falls_back_if_too_few_remain() {
        let raw = vec![RawSubtask { title: "Go".into(), duration: "PT1H".into() }];
        let fixed = validate_and_fix(raw);
        assert_eq!(fixed.len(), 2);
        assert_eq!(fixed[0].title, "Plan and outline");
    }

    #[test]
    fn truncates_to_five() {
        let raw = (0..7)
            .map(|i| RawSubtask { title: format!("Do step number {i}"), duration: "PT30M".into() })
            .collect();
        let fixed = validate_and_fix(raw);
        assert_eq!(fixed.len(), 5);
    }

    #[tokio::test]
    async fn decompose_parses_llm_subtasks_end_to_end() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"content": serde_json::json!({
                    "subtasks": [
                        {"title": "Research venues (plan offsite)", "duration": "PT1H"},
                        {"title": "Book venue (plan offsite)", "duration": "PT30M"},
                    ]
                }).to_string()}
            })))
            .mount(&server)
            .await;

        let llm = LlmBridgeClient::new(server.uri(), "llama3", std::time::Duration::from_secs(5));
        let ld = LlmDecomposer::new(&llm);
        let classification = Classification {
            calendar: Some("cal-work".into()),
            kind: TaskKind::Complex,
            title: "Plan offsite".into(),
            duration: None,
        };

        let decomposition = ld.decompose(&classification).await;
        assert_eq!(decomposition.subtasks.len(), 2);
        assert_eq!(decomposition.subtasks[0].duration, "PT1H");
    }

    #[tokio::test]
    async fn decompose_falls_back_on_llm_failure() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let llm = LlmBridgeClient::new(server.uri(), "llama3", std::time::Duration::from_secs(5));
        let ld = LlmDecomposer::new(&llm);
        let classification = Classification { calendar: None, kind: TaskKind::Complex, title: "Plan offsite".into(), duration: None };

        let decomposition = ld.decompose(&classification).await;
        assert_eq!(decomposition.subtasks.len(), 2);
        assert_eq!(decomposition.subtasks[0].title, "Plan and outline");
    }
}
