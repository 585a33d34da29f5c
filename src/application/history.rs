use crate::domain::types::{ChatMessage, MessageRole};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory conversation history keyed by session id. Each orchestrator run
/// reads a snapshot and appends one user/assistant exchange at the end, so
/// concurrent runs on distinct sessions never interleave.
pub struct ConversationHistory {
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    pub async fn append_exchange(&self, session_id: &str, user_prompt: &str, answer: &str) {
        let mut sessions = self.sessions.lock().await;
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatMessage::new(MessageRole::User, user_prompt));
        history.push(ChatMessage::new(MessageRole::Assistant, answer));
        debug!(
            session_id,
            total_messages = history.len(),
            "Persisted chat exchange to session history"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn histories_are_isolated_per_session() {
        let store = ConversationHistory::new();
        store.append_exchange("a", "hello", "hi there").await;
        store.append_exchange("b", "other", "answer").await;

        let first = store.history("a").await;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, MessageRole::User);
        assert_eq!(first[0].content, "hello");
        assert_eq!(first[1].role, MessageRole::Assistant);

        assert_eq!(store.history("b").await.len(), 2);
        assert!(store.history("unknown").await.is_empty());
    }

    #[tokio::test]
    async fn exchanges_accumulate_in_order() {
        let store = ConversationHistory::new();
        store.append_exchange("s", "first", "one").await;
        store.append_exchange("s", "second", "two").await;

        let history = store.history("s").await;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "one", "second", "two"]);
    }
}
