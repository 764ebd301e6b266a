//! Task Difficulty Analyzer: classifies a query as simple/complex, assigns
//! one of the two resolved calendars (work/home), and titles it. The hard
//! rules in this module are enforced post-LLM, not left to prompt
//! discipline, per the design notes.

use crate::bridge::{CalendarBridgeClient, CalendarInfo};
use crate::llm::{repair_json, LlmBridgeClient};
use crate::types::{Classification, TaskKind};

const TEMPERATURE: f32 = 0.2;

const WORK_KEYWORDS: &[&str] = &[
    "work", "office", "meeting", "project", "client", "deadline", "report", "presentation",
    "email", "call", "conference", "team", "boss", "colleague", "business", "proposal",
    "budget", "review", "interview", "deploy", "code", "bug", "ticket", "sprint", "standup",
];

const HOME_KEYWORDS: &[&str] = &[
    "home", "family", "personal", "grocery", "clean", "cook", "chore", "kids", "pet", "dog",
    "cat", "laundry", "repair", "garden", "appointment", "doctor", "dentist", "gym", "workout",
    "trip", "vacation", "birthday", "anniversary", "hobby",
];

const SYSTEM_PROMPT: &str = r#"You classify a task query as "simple" or "complex", pick a calendar, and generate a short imperative title (3-7 words, no dates/times).

A task is complex if it requires multiple distinct steps spread over time (planning, research, multi-part execution). It is simple if it can be done in one sitting.

Return ONLY valid JSON: {"calendar": "<calendar id or null>", "type": "simple"|"complex", "title": "...", "duration": string|null}"#;

#[derive(serde::Deserialize)]
struct RawClassification {
    calendar: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    title: String,
}

pub struct TaskDifficultyAnalyzer<'a> {
    llm: &'a LlmBridgeClient,
    bridge: &'a CalendarBridgeClient,
}

struct ResolvedCalendars {
    work: Option<String>,
    home: Option<String>,
}

impl<'a> TaskDifficultyAnalyzer<'a> {
    pub fn new(llm: &'a LlmBridgeClient, bridge: &'a CalendarBridgeClient) -> Self {
        Self { llm, bridge }
    }

    pub async fn analyze(&self, query: &str, duration: Option<&str>) -> Classification {
        let calendars = self.bridge.calendars().await.unwrap_or_default();
        let resolved = resolve_work_home(&calendars);

        let user_prompt = format!(
            "Query: \"{query}\"\nDuration (pass through unchanged, do not invent): {}\nAvailable calendars: work={:?}, home={:?}\n\nClassify and return JSON:",
            duration.unwrap_or("null"),
            resolved.work,
            resolved.home,
        );

        let classification = match self.llm.chat(SYSTEM_PROMPT, &user_prompt, TEMPERATURE).await {
            Ok(raw) => {
                let repaired = repair_json(&raw);
                serde_json::from_str::<RawClassification>(&repaired).ok()
            }
            Err(_) => None,
        };

        let (mut calendar, kind, title) = match classification {
            Some(c) => {
                let kind = if c.kind.eq_ignore_ascii_case("complex") {
                    TaskKind::Complex
                } else {
                    TaskKind::Simple
                };
                (c.calendar, kind, c.title)
            }
            None => (
                resolved.work.clone().or_else(|| resolved.home.clone()),
                TaskKind::Simple,
                first_n_words(query, 7),
            ),
        };

        // Hard rule: calendar must be one of the resolved {work, home} ids;
        // otherwise substitute by keyword match, defaulting to work (or
        // home if no work calendar exists).
        if !matches_either(&calendar, &resolved) {
            calendar = substitute_calendar(query, &resolved);
        }

        // Hard rule: duration present => type = simple.
        let kind = if duration.is_some() { TaskKind::Simple } else { kind };

        Classification {
            calendar,
            kind,
            title: enforce_title_shape(&title),
            // Hard rule: duration is pass-through, never what the LLM echoed.
            duration: duration.map(str::to_string),
        }
    }
}

fn resolve_work_home(calendars: &[CalendarInfo]) -> ResolvedCalendars {
    let writable: Vec<&CalendarInfo> = calendars.iter().filter(|c| c.allows_modifications).collect();

    let work = writable
        .iter()
        .find(|c| c.title.to_lowercase().contains("work"))
        .map(|c| c.id.clone());
    let home = writable
        .iter()
        .find(|c| c.title.to_lowercase().contains("home"))
        .map(|c| c.id.clone());

    ResolvedCalendars { work, home }
}

fn matches_either(calendar: &Option<String>, resolved: &ResolvedCalendars) -> bool {
    match calendar {
        Some(id) => Some(id) == resolved.work.as_ref() || Some(id) == resolved.home.as_ref(),
        None => false,
    }
}

fn substitute_calendar(query: &str, resolved: &ResolvedCalendars) -> Option<String> {
    let lowered = query.to_lowercase();
    if WORK_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        if let Some(work) = &resolved.work {
            return Some(work.clone());
        }
    }
    if HOME_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        if let Some(home) = &resolved.home {
            return Some(home.clone());
        }
    }
    resolved.work.clone().or_else(|| resolved.home.clone())
}

fn first_n_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

fn enforce_title_shape(title: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().take(7).collect();
    words.join(" ")
}

pub fn writable_calendars_available(calendars: &[CalendarInfo]) -> bool {
    calendars.iter().any(|c| c.allows_modifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn servers_with(
        calendars: serde_json::Value,
        llm_reply: serde_json::Value,
    ) -> (MockServer, MockServer, LlmBridgeClient, CalendarBridgeClient) {
        let llm_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"content": llm_reply.to_string()}
            })))
            .mount(&llm_server)
            .await;

        let bridge_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(calendars))
            .mount(&bridge_server)
            .await;

        let llm = LlmBridgeClient::new(llm_server.uri(), "llama3", Duration::from_secs(5));
        let bridge = CalendarBridgeClient::new(bridge_server.uri(), Duration::from_secs(5), Duration::from_secs(5));
        (llm_server, bridge_server, llm, bridge)
    }

    #[tokio::test]
    async fn llm_calendar_not_in_resolved_set_is_substituted_by_keyword() {
        let calendars = serde_json::json!([
            {"id": "cal-work", "title": "Work", "allows_modifications": true},
            {"id": "cal-home", "title": "Home", "allows_modifications": true},
        ]);
        let llm_reply = serde_json::json!({"calendar": "cal-nonexistent", "type": "simple", "title": "Finish quarterly report"});
        let (_l, _b, llm, bridge) = servers_with(calendars, llm_reply).await;

        let td = TaskDifficultyAnalyzer::new(&llm, &bridge);
        let classification = td.analyze("finish the quarterly report for my boss", None).await;

        assert_eq!(classification.calendar.as_deref(), Some("cal-work"));
    }

    #[tokio::test]
    async fn duration_present_forces_simple_and_is_passed_through_verbatim() {
        let calendars = serde_json::json!([{"id": "cal-work", "title": "Work", "allows_modifications": true}]);
        let llm_reply = serde_json::json!({"calendar": "cal-work", "type": "complex", "title": "Plan the offsite", "duration": "PT2H"});
        let (_l, _b, llm, bridge) = servers_with(calendars, llm_reply).await;

        let td = TaskDifficultyAnalyzer::new(&llm, &bridge);
        let classification = td.analyze("plan the team offsite", Some("PT45M")).await;

        assert!(matches!(classification.kind, TaskKind::Simple));
        assert_eq!(classification.duration.as_deref(), Some("PT45M"));
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_resolved_calendar_and_simple() {
        let llm_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&llm_server)
            .await;

        let bridge_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "cal-home", "title": "Home", "allows_modifications": true},
            ])))
            .mount(&bridge_server)
            .await;

        let llm = LlmBridgeClient::new(llm_server.uri(), "llama3", Duration::from_secs(5));
        let bridge = CalendarBridgeClient::new(bridge_server.uri(), Duration::from_secs(5), Duration::from_secs(5));

        let td = TaskDifficultyAnalyzer::new(&llm, &bridge);
        let classification = td.analyze("water the garden and walk the dog", None).await;

        assert_eq!(classification.calendar.as_deref(), Some("cal-home"));
        assert!(matches!(classification.kind, TaskKind::Simple));
    }

    #[test]
    fn substitute_calendar_prefers_work_keyword_match() {
        let resolved = ResolvedCalendars { work: Some("cal-work".into()), home: Some("cal-home".into()) };
        assert_eq!(substitute_calendar("prep slides for the client meeting", &resolved), Some("cal-work".into()));
    }

    #[test]
    fn substitute_calendar_falls_back_to_home_keyword_match() {
        let resolved = ResolvedCalendars { work: Some("cal-work".into()), home: Some("cal-home".into()) };
        assert_eq!(substitute_calendar("take the dog to the vet", &resolved), Some("cal-home".into()));
    }

    #[test]
    fn enforce_title_shape_truncates_to_seven_words() {
        let title = enforce_title_shape("this title has way more than seven words in it");
        assert_eq!(title.split_whitespace().count(), 7);
    }
}
