//! Events delivered to a streaming caller.
//!
//! A turn may run several attempts against different models. Text from an
//! attempt that later fails has already reached the caller, so the
//! orchestrator follows it with [`StreamEvent::Restart`] before the next
//! attempt writes anything.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Next piece of reply text.
    Delta(String),

    /// Drop everything received so far in this turn; the reply starts over.
    Restart,
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta(text.into())
    }

    /// Fold this event into the reply text shown so far.
    pub fn apply(&self, reply: &mut String) {
        match self {
            Self::Delta(text) => reply.push_str(text),
            Self::Restart => reply.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_discards_partial_text() {
        let events = [
            StreamEvent::delta("Hel"),
            StreamEvent::Restart,
            StreamEvent::delta("Hello"),
        ];
        let mut reply = String::new();
        for event in &events {
            event.apply(&mut reply);
        }
        assert_eq!(reply, "Hello");
    }

    #[test]
    fn event_serialization() {
        let json = serde_json::to_string(&StreamEvent::delta("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"delta","content":"Hi"}"#);
        let json = serde_json::to_string(&StreamEvent::Restart).unwrap();
        assert_eq!(json, r#"{"type":"restart"}"#);
    }
}
