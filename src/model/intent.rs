use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw output of an intent classifier: an intent label plus whatever
/// entities it extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: String,
    #[serde(default)]
    pub entities: Map<String, Value>,
}

/// Turns free chat text into a [`Classification`].
///
/// The crate ships no implementation; callers plug in whatever classifier
/// they use (pattern rules, a model call, ...).
pub trait IntentClassifier {
    fn classify(&self, text: &str) -> Classification;
}

/// Typed chat command decoded from a [`Classification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatIntent {
    GetPrompt,
    GetSummary,
    GetTreeOverview,
    ModifyEffect {
        effect_id: Option<String>,
        new_text: Option<String>,
    },
    ExpandEffect {
        effect_id: Option<String>,
        levels: i64,
        focus: Option<String>,
    },
    AskGeneralQuestion {
        question: String,
    },
    Unknown,
}

impl ChatIntent {
    /// Decodes a classifier result. `question` is the user's original text,
    /// used when the intent is a general question.
    ///
    /// Missing entities are kept as `None` so the session can tell the user
    /// what to supply; unrecognised intents decode to `Unknown`.
    pub fn from_classification(classification: &Classification, question: &str) -> Self {
        let entities = &classification.entities;
        match classification.intent.as_str() {
            "get_prompt" => ChatIntent::GetPrompt,
            "get_summary" => ChatIntent::GetSummary,
            "get_tree_overview" => ChatIntent::GetTreeOverview,
            "modify_effect" => ChatIntent::ModifyEffect {
                effect_id: string_entity(entities, "effect_id"),
                new_text: string_entity(entities, "new_text"),
            },
            "expand_effect" => ChatIntent::ExpandEffect {
                effect_id: string_entity(entities, "effect_id"),
                levels: levels_entity(entities),
                focus: string_entity(entities, "focus").filter(|f| !f.trim().is_empty()),
            },
            "ask_general_question" => ChatIntent::AskGeneralQuestion {
                question: question.to_string(),
            },
            _ => ChatIntent::Unknown,
        }
    }
}

fn string_entity(entities: &Map<String, Value>, key: &str) -> Option<String> {
    match entities.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `levels` defaults to 1; classifiers may emit it as a number or a string.
fn levels_entity(entities: &Map<String, Value>) -> i64 {
    match entities.get("levels") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(1),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(1),
        _ => 1,
    }
}
