use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());
static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//[^\n]*$").unwrap());

/// Deterministic repair pass every LLM stage output runs through before it
/// is handed to `serde_json`: strip markdown code fences, pull out the
/// outermost `{...}` object, drop trailing commas and `//` line comments.
/// This is the one place stage modules should reach for when parsing LLM
/// JSON; stage-specific schema validation happens after, in the stage.
pub fn repair_json(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let mut text = text.trim().to_string();

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end >= start {
            text = text[start..=end].to_string();
        }
    }

    let text = LINE_COMMENT.replace_all(&text, "");
    let text = TRAILING_COMMA.replace_all(&text, "$1");
    text.trim().to_string()
}
