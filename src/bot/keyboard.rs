//! Inline topic-selection keyboard.

use serde::{Deserialize, Serialize};

use crate::db::TopicStatus;

/// Buttons per keyboard row.
const BUTTONS_PER_ROW: usize = 2;

/// Longest topic name that fits in a button's callback data.
pub const MAX_TOPIC_NAME_BYTES: usize = 64;

const SUBSCRIBED_MARK: &str = "✓";
const UNSUBSCRIBED_MARK: &str = "✗";

/// A single inline button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

/// Inline keyboard markup as sent to the Bot API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub inline_keyboard: Vec<Vec<Button>>,
}

impl Keyboard {
    /// All buttons, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.inline_keyboard.iter().flatten()
    }
}

/// One button per topic, marked with the chat's subscription state.
///
/// The callback data is the topic name.
pub fn topics_keyboard(topics: &[TopicStatus]) -> Keyboard {
    let inline_keyboard = topics
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            row.iter()
                .map(|status| {
                    let mark = if status.subscribed {
                        SUBSCRIBED_MARK
                    } else {
                        UNSUBSCRIBED_MARK
                    };
                    Button {
                        text: format!("{mark} {}", status.topic.name),
                        callback_data: status.topic.name.clone(),
                    }
                })
                .collect()
        })
        .collect();

    Keyboard { inline_keyboard }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Topic;

    fn status(name: &str, subscribed: bool) -> TopicStatus {
        TopicStatus {
            topic: Topic::new(name, format!("https://example.com/{name}")),
            subscribed,
        }
    }

    #[test]
    fn test_labels_and_callback_data() {
        let keyboard = topics_keyboard(&[status("biodiversity", true), status("climate", false)]);
        let buttons: Vec<&Button> = keyboard.buttons().collect();
        assert_eq!(buttons[0].text, "✓ biodiversity");
        assert_eq!(buttons[0].callback_data, "biodiversity");
        assert_eq!(buttons[1].text, "✗ climate");
    }

    #[test]
    fn test_two_buttons_per_row() {
        let keyboard = topics_keyboard(&[
            status("a", false),
            status("b", false),
            status("c", false),
        ]);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(keyboard.inline_keyboard[1].len(), 1);
    }

    #[test]
    fn test_empty() {
        assert!(topics_keyboard(&[]).inline_keyboard.is_empty());
    }

    #[test]
    fn test_serializes_as_inline_keyboard_markup() {
        let keyboard = topics_keyboard(&[status("biodiversity", false)]);
        let json = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "inline_keyboard": [[{"text": "✗ biodiversity", "callback_data": "biodiversity"}]]
            })
        );
    }
}
