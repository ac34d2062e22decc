use crate::chunk::{
    CHAT_CHUNK_KIND, ChatChoice, ChatChunk, ChatDelta, DEFAULT_ROLE, RawChoice, RawEvent,
};

/// Rewrites one upstream event into the provider-agnostic chunk shape.
///
/// Missing roles become `assistant`, missing content becomes empty. Finish
/// reasons and usage are dropped: a streamed chunk never claims completion.
pub fn normalize_event(event: &RawEvent, model: &str) -> ChatChunk {
    ChatChunk {
        id: event.id.clone(),
        object: CHAT_CHUNK_KIND.to_string(),
        created: event.created,
        model: model.to_string(),
        choices: event.choices.iter().map(normalize_choice).collect(),
        usage: None,
    }
}

fn normalize_choice(choice: &RawChoice) -> ChatChoice {
    ChatChoice {
        index: choice.index,
        delta: ChatDelta {
            role: choice
                .delta
                .role
                .clone()
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            content: choice.delta.content.clone().unwrap_or_default(),
        },
        finish_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{RawDelta, Usage};

    #[test]
    fn fills_missing_role_and_content() {
        let event = RawEvent {
            id: "evt-1".into(),
            created: 42,
            model: Some("upstream-name".into()),
            choices: vec![RawChoice::default()],
            usage: None,
        };
        let chunk = normalize_event(&event, "mistral-small");
        assert_eq!(chunk.object, "chat");
        assert_eq!(chunk.model, "mistral-small");
        assert_eq!(chunk.created, 42);
        assert_eq!(chunk.id, "evt-1");
        assert_eq!(chunk.choices[0].delta.role, "assistant");
        assert_eq!(chunk.choices[0].delta.content, "");
    }

    #[test]
    fn suppresses_finish_reason_and_usage() {
        let event = RawEvent {
            id: "evt-2".into(),
            created: 7,
            model: None,
            choices: vec![RawChoice {
                index: 1,
                delta: RawDelta {
                    role: Some("tool".into()),
                    content: Some("done".into()),
                },
                finish_reason: Some("stop".into()),
            }],
            usage: Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 4,
                total_tokens: 7,
            }),
        };
        let chunk = normalize_event(&event, "m");
        assert_eq!(chunk.choices[0].index, 1);
        assert_eq!(chunk.choices[0].delta.role, "tool");
        assert_eq!(chunk.choices[0].finish_reason, None);
        assert_eq!(chunk.usage, None);
    }

    #[test]
    fn preserves_choice_order() {
        let mut event = RawEvent::text("evt-3", 0, "first");
        event.choices.push(RawChoice {
            index: 1,
            delta: RawDelta {
                role: None,
                content: Some("second".into()),
            },
            finish_reason: None,
        });
        let chunk = normalize_event(&event, "m");
        let contents: Vec<_> = chunk
            .choices
            .iter()
            .map(|c| c.delta.content.as_str())
            .collect();
        assert_eq!(contents, ["first", "second"]);
    }

    #[test]
    fn normalizing_twice_yields_equal_chunks() {
        let event = RawEvent::text("evt-4", 9, "same");
        assert_eq!(normalize_event(&event, "m"), normalize_event(&event, "m"));
    }
}
