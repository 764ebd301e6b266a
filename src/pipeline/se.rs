//! Slot Extractor: asks the LLM to pull verbatim start/end/duration phrases
//! out of the query. Never invents times; on any failure it degrades to
//! all-null slots rather than guessing.

use crate::llm::{repair_json, LlmBridgeClient};
use crate::types::Slots;

const TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = r#"You are a slot extractor that extracts time-related information from user queries.

CRITICAL RULE: ONLY extract time information that is EXPLICITLY stated in the query. Do NOT infer, assume, or hallucinate time information.

Output contract (STRICT JSON):
- Keys: start_text, end_text, duration
- Values: each is string or null.
- It is OK (and preferred) to return null when something is not present or unclear. Do not invent values.
- Preserve the user's phrasing (e.g., "tomorrow", "Friday 2pm", "Nov 15", "EOM", "6pm", "in 2 hours").
- No absolute dates/times, no ISO, no defaults, no normalization.

Return ONLY valid JSON: {"start_text": string|null, "end_text": string|null, "duration": string|null}"#;

#[derive(serde::Deserialize)]
struct RawSlots {
    start_text: Option<String>,
    end_text: Option<String>,
    duration: Option<String>,
}

pub struct SlotExtractor<'a> {
    llm: &'a LlmBridgeClient,
}

impl<'a> SlotExtractor<'a> {
    pub fn new(llm: &'a LlmBridgeClient) -> Self {
        Self { llm }
    }

    /// Extract slots for `query`. Never returns an error: LLM failures and
    /// malformed JSON both degrade to all-null slots, per the SE contract.
    pub async fn extract(&self, query: &str, timezone: &str) -> Slots {
        let user_prompt = format!("User Query: \"{query}\"\nUser Timezone: {timezone}\n\nExtract the slots and return JSON:");

        let Ok(raw) = self.llm.chat(SYSTEM_PROMPT, &user_prompt, TEMPERATURE).await else {
            return Slots::default();
        };

        let repaired = repair_json(&raw);
        match serde_json::from_str::<RawSlots>(&repaired) {
            Ok(slots) => Slots {
                start_text: slots.start_text,
                end_text: slots.end_text,
                duration: slots.duration,
            },
            Err(_) => Slots::default(),
        }
    }
}
