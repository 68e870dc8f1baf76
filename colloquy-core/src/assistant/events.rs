//! Events broadcast by the assistant to embedding applications.

use serde::{Deserialize, Serialize};

/// One observable pipeline event.
///
/// Serialized with an internal `kind` tag so consumers can dispatch
/// without knowing every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AssistantEvent {
    /// Capture is active and the pipeline is waiting for speech.
    Listening,
    /// A transcript was accepted and handed to the conversation model.
    Heard { text: String },
    /// The conversation model produced a reply (or the canned apology).
    Reply { text: String },
    /// Playback of a reply began.
    SpeakingStarted,
    /// Playback of a reply finished or was cut short.
    SpeakingFinished,
    /// New user speech pre-empted the reply; queued replies were dropped.
    Interrupted,
    /// A recoverable pipeline error, for surfacing in a UI.
    Error { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_kind_tag() {
        let event = AssistantEvent::Heard {
            text: "what time is it".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "heard");
        assert_eq!(json["text"], "what time is it");

        let json = serde_json::to_value(AssistantEvent::SpeakingStarted).unwrap();
        assert_eq!(json["kind"], "speakingStarted");
    }

    #[test]
    fn events_round_trip() {
        let event = AssistantEvent::Reply {
            text: "It is three o'clock.".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AssistantEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
