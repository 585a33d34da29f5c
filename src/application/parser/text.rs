use super::{AgentStep, ParseError, ResponseParserStrategy};
use tracing::info;

/// Fallback strategy: accepts anything and treats the whole input as the
/// final answer. Its presence guarantees the chain always produces a step,
/// even when the model ignores the structured-output instruction entirely.
pub struct TextResponseParser;

impl ResponseParserStrategy for TextResponseParser {
    fn can_parse(&self, _response: &str) -> bool {
        true
    }

    fn parse(&self, response: &str) -> Result<AgentStep, ParseError> {
        info!("Parsing response as plain text");
        Ok(AgentStep::Final {
            answer: response.trim().to_string(),
        })
    }
}
