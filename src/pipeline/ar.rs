//! Absolute Resolver: resolves SE's verbatim phrases to canonical absolute
//! datetime strings against a deterministic clock context. LLM-backed; the
//! exhaustive resolution rules are taught to the model as prompt text, and
//! on any failure AR falls back to the same deterministic defaults rule 4
//! describes (NOW / END_OF_TODAY, duration copied through unchanged).

use crate::clock::ClockContext;
use crate::llm::{repair_json, LlmBridgeClient};
use crate::types::{Resolution, Slots};

const TEMPERATURE: f32 = 0.7;
const CANONICAL_FMT: &str = "%B %d, %Y %I:%M %p";

const SYSTEM_PROMPT: &str = r#"You are an absolute date/time resolver. Given extracted phrases and a clock context, resolve each phrase to a canonical absolute datetime string of the form "Month DD, YYYY HH:MM AM/PM".

Resolution rules (apply in order, reproduce exactly):
1. Both start_text and end_text present: resolve each independently; if the resolved end is before the resolved start, advance end by one day.
2. Only end_text present (a deadline): start = NOW.
3. Only start_text present: end = 23:59 on the resolved start's date.
4. Neither present: start = NOW, end = END_OF_TODAY. Duration is never used to derive start/end.
5. Vague anchors: morning->09:00, afternoon->13:00, evening->18:00, tonight->20:00, noon->12:00, midnight->00:00, "tomorrow" with no time -> 00:00 the next day.
6. An unqualified weekday means its next occurrence (today counts if that time has not yet passed); "next <weekday>" means the following week's occurrence.
7. "next week" as a start means NEXT_MONDAY. "EOM"/"end of month" as a deadline means END_OF_MONTH. "end of week" means END_OF_WEEK.
8. Repair: if after resolution start is still after end, set end to 23:59 on start's date.

duration is copied through unchanged; never added to start or subtracted from end.

Return ONLY valid JSON: {"start_text": "<canonical>", "end_text": "<canonical>", "duration": string|null}"#;

#[derive(serde::Deserialize)]
struct RawResolution {
    start_text: String,
    end_text: String,
    duration: Option<String>,
}

pub struct AbsoluteResolver<'a> {
    llm: &'a LlmBridgeClient,
}

impl<'a> AbsoluteResolver<'a> {
    pub fn new(llm: &'a LlmBridgeClient) -> Self {
        Self { llm }
    }

    /// Resolve `slots` against `ctx`. Never returns an error: on LLM
    /// failure or malformed output it falls back to the rule-4 default.
    pub async fn resolve(&self, slots: &Slots, ctx: &ClockContext) -> Resolution {
        let user_prompt = self.build_prompt(slots, ctx);

        let Ok(raw) = self.llm.chat(SYSTEM_PROMPT, &user_prompt, TEMPERATURE).await else {
            return self.fallback(slots, ctx);
        };

        let repaired = repair_json(&raw);
        match serde_json::from_str::<RawResolution>(&repaired) {
            Ok(r) => Resolution {
                start_text: r.start_text,
                end_text: r.end_text,
                duration: r.duration,
            },
            Err(_) => self.fallback(slots, ctx),
        }
    }

    fn fallback(&self, slots: &Slots, ctx: &ClockContext) -> Resolution {
        Resolution {
            start_text: ctx.now.format(CANONICAL_FMT).to_string(),
            end_text: ctx.end_of_today.format(CANONICAL_FMT).to_string(),
            duration: slots.duration.clone(),
        }
    }

    fn build_prompt(&self, slots: &Slots, ctx: &ClockContext) -> String {
        let next_occurrences: Vec<String> = ctx
            .next_occurrences
            .iter()
            .map(|(day, date)| format!("{day:?}: {}", date.format("%B %d, %Y")))
            .collect();

        format!(
            "Clock context:\nNOW: {now}\nTIMEZONE: {tz}\nTODAY: {today}\nEND_OF_TODAY: {eot}\nEND_OF_WEEK: {eow}\nEND_OF_MONTH: {eom}\nNEXT_MONDAY: {nm}\nNEXT_OCCURRENCES: {{{occ}}}\n\nPhrases:\nstart_text: {start}\nend_text: {end}\nduration: {dur}\n\nResolve to canonical absolute datetimes and return JSON:",
            now = ctx.now.format(CANONICAL_FMT),
            tz = ctx.timezone,
            today = ctx.today_human,
            eot = ctx.end_of_today.format(CANONICAL_FMT),
            eow = ctx.end_of_week.format(CANONICAL_FMT),
            eom = ctx.end_of_month.format(CANONICAL_FMT),
            nm = ctx.next_monday.format(CANONICAL_FMT),
            occ = next_occurrences.join(", "),
            start = slots.start_text.as_deref().unwrap_or("null"),
            end = slots.end_text.as_deref().unwrap_or("null"),
            dur = slots.duration.as_deref().unwrap_or("null"),
        )
    }
}
