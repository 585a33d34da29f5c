use super::{AgentStep, ParseError, ResponseParserStrategy};
use crate::domain::tool::ToolCallRequest;
use serde::Deserialize;
use tracing::{debug, info, warn};

const STEP_TOOL: &str = "tool";
const STEP_FINAL: &str = "final";

/// Highest-priority strategy: decodes the structured
/// `{"step", "tool_calls", "answer"}` payload, repairing the malformed JSON
/// that models routinely emit. The repair heuristics are best-effort string
/// scans, not a sound JSON fixer; anything they cannot salvage falls through
/// to the plain-text strategy.
pub struct JsonResponseParser;

#[derive(Debug, Deserialize)]
struct StepPayload {
    step: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallRequest>,
    answer: Option<String>,
}

impl ResponseParserStrategy for JsonResponseParser {
    fn can_parse(&self, response: &str) -> bool {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return false;
        }
        if trimmed.starts_with("```json") || trimmed.starts_with("```JSON") {
            return true;
        }
        if trimmed.starts_with("```") && trimmed.contains('{') {
            return true;
        }

        let cleaned = clean(response);
        cleaned.starts_with('{') || cleaned.starts_with('[')
    }

    fn parse(&self, response: &str) -> Result<AgentStep, ParseError> {
        let cleaned = clean(response);

        let initial = match serde_json::from_str::<StepPayload>(&cleaned) {
            Ok(payload) => return Ok(to_step(payload, response)),
            Err(source) => source,
        };
        debug!(error = %initial, "JSON decode failed, applying repair heuristics");

        let repairs: [fn(&str) -> String; 3] =
            [strip_outer_noise, balance_braces, fix_unescaped_quotes];
        let mut candidate = cleaned;
        for repair in repairs {
            candidate = repair(&candidate);
            if let Ok(payload) = serde_json::from_str::<StepPayload>(&candidate) {
                info!("Parsed JSON response after repair");
                return Ok(to_step(payload, response));
            }
        }

        Err(ParseError::Json(initial))
    }
}

fn to_step(payload: StepPayload, raw: &str) -> AgentStep {
    match payload.step.as_deref() {
        Some(STEP_FINAL) => AgentStep::Final {
            answer: payload.answer.unwrap_or_default(),
        },
        Some(STEP_TOOL) if !payload.tool_calls.is_empty() => AgentStep::Tool {
            calls: payload.tool_calls,
        },
        _ => {
            warn!("Unknown step or empty tool_calls, treating as final");
            AgentStep::Final {
                answer: payload
                    .answer
                    .unwrap_or_else(|| raw.trim().to_string()),
            }
        }
    }
}

/// Strips markdown fences and escapes raw control characters that appear
/// inside string literals.
fn clean(response: &str) -> String {
    let mut cleaned = response.trim();

    if let Some(stripped) = cleaned.strip_prefix("```json") {
        cleaned = stripped;
    } else if let Some(stripped) = cleaned.strip_prefix("```JSON") {
        cleaned = stripped;
    } else if let Some(stripped) = cleaned.strip_prefix("```") {
        cleaned = stripped;
    }
    if let Some(stripped) = cleaned.strip_suffix("```") {
        cleaned = stripped;
    }

    fix_unescaped_control_chars(cleaned.trim())
}

/// Escapes unescaped control characters inside string literals. Tracks an
/// in-string flag toggled by unescaped quotes and only rewrites while inside
/// a string, so already-escaped sequences pass through untouched.
fn fix_unescaped_control_chars(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if escaped {
            result.push(c);
            escaped = false;
            continue;
        }
        if c == '\\' {
            result.push(c);
            escaped = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if in_string {
            match c {
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                '\t' => result.push_str("\\t"),
                '\u{0008}' => result.push_str("\\b"),
                '\u{000c}' => result.push_str("\\f"),
                c if c.is_control() => {
                    result.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => result.push(c),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Drops any text before the first `{` and after the last `}`.
fn strip_outer_noise(json: &str) -> String {
    let mut repaired = json;

    if let Some(first) = repaired.find('{') {
        if first > 0 {
            debug!(dropped = first, "Removing text before first brace");
            repaired = &repaired[first..];
        }
    }

    if let Some(last) = repaired.rfind('}') {
        if !repaired[last + 1..].trim().is_empty() {
            debug!("Removing text after last brace");
            repaired = &repaired[..=last];
        }
    }

    repaired.to_string()
}

/// Appends missing closing braces, or trims excess trailing ones, until the
/// open and close counts agree. Counts are naive (string contents included),
/// matching the tolerance of the rest of the repair pipeline.
fn balance_braces(json: &str) -> String {
    let open = json.matches('{').count();
    let close = json.matches('}').count();

    if open > close {
        let missing = open - close;
        debug!(missing, "Appending closing braces to balance JSON");
        let mut repaired = json.to_string();
        repaired.extend(std::iter::repeat('}').take(missing));
        return repaired;
    }

    if close > open {
        let excess = close - open;
        debug!(excess, "Trimming excess closing braces");
        let mut repaired = json.to_string();
        for _ in 0..excess {
            if let Some(index) = repaired.rfind('}') {
                repaired.remove(index);
            }
        }
        return repaired;
    }

    json.to_string()
}

/// Escapes quote characters that appear mid-string-value. A `"` is treated
/// as a real terminator only if the next non-whitespace character is `,`,
/// `}`, `]`, or end of input; otherwise it is escaped, but only when we are
/// confidently inside a value (after a colon, within an object). This
/// heuristic can misfire on legitimately quoted text and is applied last.
fn fix_unescaped_quotes(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut result = String::with_capacity(json.len());
    let mut in_string_value = false;
    let mut escaped = false;
    let mut after_colon = false;
    let mut nesting: i32 = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if escaped {
            result.push(c);
            escaped = false;
            i += 1;
            continue;
        }
        if c == '\\' {
            result.push(c);
            escaped = true;
            i += 1;
            continue;
        }

        if !in_string_value {
            match c {
                '{' => nesting += 1,
                '}' => nesting -= 1,
                ':' => {
                    after_colon = true;
                    result.push(c);
                    i += 1;
                    continue;
                }
                ',' => {
                    after_colon = false;
                    result.push(c);
                    i += 1;
                    continue;
                }
                _ => {}
            }
        }

        if c == '"' {
            if in_string_value {
                let mut next = i + 1;
                while next < chars.len() && chars[next].is_whitespace() {
                    next += 1;
                }
                let is_real_end =
                    next >= chars.len() || matches!(chars[next], ',' | '}' | ']');

                if is_real_end {
                    in_string_value = false;
                    after_colon = false;
                    result.push(c);
                } else if after_colon && nesting > 0 {
                    debug!(position = i, "Escaping stray quote inside string value");
                    result.push('\\');
                    result.push(c);
                } else {
                    result.push(c);
                }
            } else {
                if after_colon {
                    in_string_value = true;
                }
                result.push(c);
            }
        } else {
            result.push(c);
        }

        i += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_accepts_json_shapes() {
        let parser = JsonResponseParser;
        assert!(parser.can_parse(r#"{"step":"final"}"#));
        assert!(parser.can_parse("  [1, 2]"));
        assert!(parser.can_parse("```json\n{}\n```"));
        assert!(parser.can_parse("```\nsome {\"step\":\"final\"}\n```"));
        assert!(!parser.can_parse("just plain prose"));
        assert!(!parser.can_parse("   "));
    }

    #[test]
    fn control_char_escape_skips_text_outside_strings() {
        let fixed = fix_unescaped_control_chars("{\n\"answer\": \"a\tb\"\n}");
        assert_eq!(fixed, "{\n\"answer\": \"a\\tb\"\n}");
    }

    #[test]
    fn control_char_escape_leaves_existing_escapes_alone() {
        let input = r#"{"answer":"line\none"}"#;
        assert_eq!(fix_unescaped_control_chars(input), input);
    }

    #[test]
    fn balance_appends_missing_braces() {
        assert_eq!(balance_braces(r#"{"a":{"b":1}"#), r#"{"a":{"b":1}}"#);
    }

    #[test]
    fn balance_trims_excess_braces_from_the_end() {
        assert_eq!(balance_braces(r#"{"a":1}}}"#), r#"{"a":1}"#);
    }

    #[test]
    fn strip_outer_noise_keeps_balanced_payload() {
        assert_eq!(
            strip_outer_noise("noise {\"a\":1} trailing"),
            "{\"a\":1}"
        );
        assert_eq!(strip_outer_noise("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn quote_repair_only_fires_inside_values() {
        let fixed = fix_unescaped_quotes(r#"{"answer":"say "hi" now"}"#);
        assert_eq!(fixed, r#"{"answer":"say \"hi\" now"}"#);

        let untouched = r#"{"answer":"plain"}"#;
        assert_eq!(fix_unescaped_quotes(untouched), untouched);
    }

    #[test]
    fn unparseable_input_reports_json_error() {
        let parser = JsonResponseParser;
        let error = parser.parse("{\"step\": ???").expect_err("cannot repair");
        assert!(matches!(error, ParseError::Json(_)));
    }
}
