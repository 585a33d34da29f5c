mod json;
mod text;

pub use json::JsonResponseParser;
pub use text::TextResponseParser;

use crate::domain::tool::ToolCallRequest;
use thiserror::Error;
use tracing::debug;

/// The model's declared intent for one loop iteration: call tools, or hand
/// back the final answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Tool { calls: Vec<ToolCallRequest> },
    Final { answer: String },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

/// One parsing strategy in the ordered chain. The first strategy whose
/// `can_parse` accepts the input gets to try; on failure the chain moves on.
pub trait ResponseParserStrategy: Send + Sync {
    fn can_parse(&self, response: &str) -> bool;
    fn parse(&self, response: &str) -> Result<AgentStep, ParseError>;
}

/// Ordered strategy chain turning raw model output into an `AgentStep`.
pub struct ResponseParser {
    strategies: Vec<Box<dyn ResponseParserStrategy>>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(JsonResponseParser),
                Box::new(TextResponseParser),
            ],
        }
    }

    /// Total over `AgentStep`: the plain-text fallback always matches, so
    /// malformed output degrades to a final answer instead of an error.
    pub fn parse(&self, response: &str) -> AgentStep {
        for strategy in &self.strategies {
            if !strategy.can_parse(response) {
                continue;
            }
            match strategy.parse(response) {
                Ok(step) => return step,
                Err(error) => {
                    debug!(%error, "Parser strategy failed, trying next");
                }
            }
        }

        // Unreachable while the text fallback is registered; kept so the
        // chain stays total even if the strategy list is reconfigured.
        AgentStep::Final {
            answer: response.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> AgentStep {
        ResponseParser::new().parse(raw)
    }

    #[test]
    fn well_formed_final_step_parses() {
        let step = parse(r#"{"step":"final","answer":"X"}"#);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "X".to_string()
            }
        );
    }

    #[test]
    fn fenced_json_parses_same_as_unfenced() {
        let bare = parse(r#"{"step":"final","answer":"hello"}"#);
        let fenced = parse("```json\n{\"step\":\"final\",\"answer\":\"hello\"}\n```");
        assert_eq!(bare, fenced);
    }

    #[test]
    fn non_json_text_falls_back_to_final_answer() {
        let step = parse("Sure, here's your answer.");
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "Sure, here's your answer.".to_string()
            }
        );
    }

    #[test]
    fn missing_closing_brace_is_repaired() {
        let step = parse(r#"{"step":"final","answer":"hi""#);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "hi".to_string()
            }
        );
    }

    #[test]
    fn excess_closing_braces_are_trimmed() {
        let step = parse(r#"{"step":"final","answer":"hi"}}}"#);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "hi".to_string()
            }
        );
    }

    #[test]
    fn raw_newline_inside_string_is_escaped() {
        let step = parse("{\"step\":\"final\",\"answer\":\"line one\nline two\"}");
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "line one\nline two".to_string()
            }
        );
    }

    #[test]
    fn prose_inside_fenced_block_is_stripped() {
        let step = parse("```\nResult: {\"step\":\"final\",\"answer\":\"done\"} end\n```");
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "done".to_string()
            }
        );
    }

    #[test]
    fn leading_prose_without_fence_falls_back_to_text() {
        let raw = "Here is the plan:\n{\"step\":\"final\",\"answer\":\"done\"}";
        let step = parse(raw);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: raw.to_string()
            }
        );
    }

    #[test]
    fn stray_quote_inside_answer_is_escaped() {
        let step = parse(r#"{"step":"final","answer":"he said "hello" to me"}"#);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: r#"he said "hello" to me"#.to_string()
            }
        );
    }

    #[test]
    fn tool_step_carries_calls_with_arguments() {
        let step = parse(
            r#"{"step":"tool","tool_calls":[{"name":"rag:search_documents","arguments":{"query":"x"}}]}"#,
        );
        let AgentStep::Tool { calls } = step else {
            panic!("expected tool step");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "rag:search_documents");
        assert_eq!(calls[0].arguments.get("query"), Some(&json!("x")));
    }

    #[test]
    fn unknown_step_with_answer_is_treated_as_final() {
        let step = parse(r#"{"step":"plan","answer":"improvised"}"#);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: "improvised".to_string()
            }
        );
    }

    #[test]
    fn tool_step_with_empty_calls_falls_back_to_raw_text() {
        let raw = r#"{"step":"tool","tool_calls":[]}"#;
        let step = parse(raw);
        assert_eq!(
            step,
            AgentStep::Final {
                answer: raw.to_string()
            }
        );
    }

    #[test]
    fn multiple_tool_calls_preserve_request_order() {
        let step = parse(
            r#"{"step":"tool","tool_calls":[{"name":"add_numbers","arguments":{"numbers":[1,2]}},{"name":"rag:search_documents","arguments":{"query":"x"}}]}"#,
        );
        let AgentStep::Tool { calls } = step else {
            panic!("expected tool step");
        };
        let names: Vec<_> = calls.iter().map(|call| call.name.as_str()).collect();
        assert_eq!(names, vec!["add_numbers", "rag:search_documents"]);
    }
}
