//! Conversational state over one loaded futurecast.

use chrono::Local;
use tracing::{info, warn};

use crate::config::{Config, RegenerationPolicy};
use crate::engine::generation::TextGenerationClient;
use crate::engine::mutator;
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::tree_engine::{Prediction, RegenerateError, TreeGenerationEngine};
use crate::error::{GenerationError, SessionError};
use crate::model::effect::EffectTree;
use crate::model::intent::{ChatIntent, IntentClassifier};
use crate::model::message::{ChatMessage, Role};
use crate::model::save::SavedFuturecast;

const REPHRASE: &str = "I'm not sure how to help with that. Can you try rephrasing?";

#[derive(Debug, Clone, Default)]
pub struct Session {
    prompt: Option<String>,
    tree: Option<EffectTree>,
    summary: Option<String>,
    chat_history: Vec<ChatMessage>,
    /// `YYYYMMDD_HHMMSS` of the loaded prediction.
    generated_at: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the session with a fresh prediction. Chat history restarts.
    pub fn load(&mut self, prediction: Prediction) {
        let generated_at = Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.replace(prediction.tree, prediction.summary, generated_at);
    }

    pub fn load_saved(&mut self, saved: SavedFuturecast) {
        self.replace(saved.tree, saved.summary, saved.timestamp);
    }

    fn replace(&mut self, tree: EffectTree, summary: String, generated_at: String) {
        self.prompt = Some(tree.context.clone());
        self.tree = Some(tree);
        self.summary = Some(summary);
        self.generated_at = Some(generated_at);
        self.chat_history = vec![ChatMessage::new(
            Role::System,
            "FutureCast data has been loaded.",
        )];
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn tree(&self) -> Option<&EffectTree> {
        self.tree.as_ref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn generated_at(&self) -> Option<&str> {
        self.generated_at.as_deref()
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.chat_history.push(ChatMessage::new(role, content));
    }

    /// Everything the assistant knows, rendered for a general question.
    pub fn full_context(&self) -> String {
        let mut parts = Vec::with_capacity(4);

        parts.push(match &self.prompt {
            Some(p) if !p.is_empty() => format!("Original FutureCast Prompt: {p}"),
            _ => "Original FutureCast Prompt: Not available.".to_string(),
        });
        parts.push(match &self.tree {
            Some(tree) => format!("Effect Tree:\n{}", tree.outline().trim_end()),
            None => "Effect Tree: Not available.".to_string(),
        });
        parts.push(match &self.summary {
            Some(s) if !s.is_empty() => format!("FutureCast Summary: {s}"),
            _ => "FutureCast Summary: Not available.".to_string(),
        });

        if self.chat_history.is_empty() {
            parts.push("\nRecent Conversation: No history yet.".to_string());
        } else {
            let history: Vec<String> = self
                .chat_history
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect();
            parts.push(format!("\nRecent Conversation:\n{}", history.join("\n")));
        }

        parts.join("\n\n")
    }

    /// Records the user's text, classifies it and dispatches the result.
    pub async fn handle(
        &mut self,
        text: &str,
        classifier: &dyn IntentClassifier,
        client: &TextGenerationClient,
        config: &Config,
    ) -> String {
        self.add_message(Role::User, text);
        let classification = classifier.classify(text);
        info!(intent = %classification.intent, "classified chat input");
        let intent = ChatIntent::from_classification(&classification, text);
        self.dispatch(intent, client, config).await
    }

    /// Carries out one intent and returns the assistant's reply, which is
    /// also appended to the chat history. Failures become replies.
    pub async fn dispatch(
        &mut self,
        intent: ChatIntent,
        client: &TextGenerationClient,
        config: &Config,
    ) -> String {
        let reply = match intent {
            ChatIntent::GetPrompt => match self.prompt() {
                Some(p) => format!("The original prompt was: {p}"),
                None => "No prompt loaded yet.".to_string(),
            },
            ChatIntent::GetSummary => match self.summary() {
                Some(s) if !s.is_empty() => format!("The futurecast summary is: {s}"),
                _ => "No summary loaded yet.".to_string(),
            },
            ChatIntent::GetTreeOverview => self.overview(),
            ChatIntent::ModifyEffect {
                effect_id: Some(id),
                new_text: Some(text),
            } if !id.trim().is_empty() => {
                match self.modify_effect(&id, &text, client, config).await {
                    Ok(reply) => reply,
                    Err(e) => failure_reply("modify", &id, &e),
                }
            }
            ChatIntent::ModifyEffect { .. } => "I'm sorry, I can't modify the effect. \
Please provide both the effect ID and the new text."
                .to_string(),
            ChatIntent::ExpandEffect {
                effect_id: Some(id),
                levels,
                focus,
            } if !id.trim().is_empty() => match self.expand_effect(&id, levels, focus.as_deref()) {
                Ok(reply) => reply,
                Err(e) => failure_reply("expand", &id, &e),
            },
            ChatIntent::ExpandEffect { .. } => {
                "I'm sorry, I can't expand the effect. Please provide the effect ID.".to_string()
            }
            ChatIntent::AskGeneralQuestion { question } => self.answer(&question, client).await,
            ChatIntent::Unknown => REPHRASE.to_string(),
        };

        self.add_message(Role::Assistant, reply.clone());
        reply
    }

    fn overview(&self) -> String {
        match &self.tree {
            Some(tree) => format!(
                "The effect tree holds {} effects across {} orders:\n{}",
                tree.node_count(),
                tree.max_order(),
                tree.outline().trim_end()
            ),
            None => "No effect tree loaded yet.".to_string(),
        }
    }

    /// Edits one effect according to the configured regeneration policy.
    ///
    /// Under [`RegenerationPolicy::Regenerate`], effects whose children the
    /// service refused stay leaves and are named in the reply.
    pub async fn modify_effect(
        &mut self,
        id: &str,
        text: &str,
        client: &TextGenerationClient,
        config: &Config,
    ) -> Result<String, SessionError> {
        let tree = self.tree.as_ref().ok_or(SessionError::NothingLoaded)?;

        let (updated, outcome) = match config.regeneration {
            RegenerationPolicy::MarkStale => (
                mutator::modify_text(tree, id, text)?,
                "downstream effects are marked as regenerated".to_string(),
            ),
            RegenerationPolicy::Regenerate => {
                let engine =
                    TreeGenerationEngine::new(client, config.max_depth, config.num_effects);
                let regenerated = engine
                    .regenerate_subtree(tree, id, text)
                    .await
                    .map_err(|e| match e {
                        RegenerateError::Mutation(e) => SessionError::Mutation(e),
                        RegenerateError::Generation(e) => SessionError::Generation(e),
                    })?;

                let outcome = if regenerated.blocked.is_empty() {
                    "downstream effects were regenerated".to_string()
                } else {
                    let blocked: Vec<String> =
                        regenerated.blocked.iter().map(|p| p.to_string()).collect();
                    format!(
                        "regeneration was blocked below {}, which are kept without sub-effects",
                        blocked.join(", ")
                    )
                };
                (regenerated.tree, outcome)
            }
        };

        self.tree = Some(updated);
        self.add_message(
            Role::System,
            format!("Effect '{id}' was updated to '{text}'; {outcome}."),
        );
        info!(path = id, policy = ?config.regeneration, "effect modified");
        Ok(format!("Effect {id} has been updated; {outcome}."))
    }

    pub fn expand_effect(
        &mut self,
        id: &str,
        levels: i64,
        focus: Option<&str>,
    ) -> Result<String, SessionError> {
        let tree = self.tree.as_ref().ok_or(SessionError::NothingLoaded)?;
        let updated = mutator::expand_leaf(tree, id, levels, focus)?;
        self.tree = Some(updated);

        let mut operation = format!("Expanded effect '{id}' by {levels} level(s)");
        let mut reply = format!("Effect {id} has been expanded by {levels} level(s).");
        if let Some(focus) = focus {
            operation.push_str(&format!(" with focus on '{focus}'"));
            reply.push_str(&format!(" Focused on: '{focus}'."));
        }
        self.add_message(
            Role::System,
            format!("Effect tree updated. Operation: {operation}"),
        );
        Ok(reply)
    }

    async fn answer(&self, question: &str, client: &TextGenerationClient) -> String {
        let prompt = PromptBuilder::build_question_prompt(&self.full_context(), question);
        match client.generate(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(GenerationError::Blocked { reason }) => {
                warn!(%reason, "question blocked");
                format!("Content generation blocked by the API. Reason: {reason}")
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "question failed");
                format!("Error interacting with the generation service: {e}")
            }
        }
    }
}

fn failure_reply(action: &str, id: &str, err: &SessionError) -> String {
    warn!(action, path = id, error = %err, "chat edit failed");
    match err {
        SessionError::NothingLoaded => format!(
            "Cannot {action} effect: no effect tree is loaded. \
Please generate or load a futurecast first."
        ),
        SessionError::Mutation(e) => format!("Sorry, I couldn't {action} effect '{id}': {e}."),
        SessionError::Generation(e) => {
            format!("Sorry, regenerating below effect '{id}' failed: {e}.")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::engine::mock::{test_params, ScriptedGenerator};
    use crate::model::effect::{Effect, EffectPath};
    use crate::model::intent::Classification;

    fn client(generator: Arc<ScriptedGenerator>) -> TextGenerationClient {
        TextGenerationClient::new(generator, test_params(), 2)
    }

    fn config(policy: RegenerationPolicy) -> Config {
        Config {
            api_key: "key".into(),
            num_effects: 2,
            max_depth: 2,
            regeneration: policy,
            ..Config::default()
        }
    }

    fn loaded() -> Session {
        let mut tree = EffectTree::new("A bridge closes");
        let root = EffectPath::root(1);
        let mut first = Effect::new(&root, "Traffic diverts");
        first.children.push(Effect::new(&root.child(1), "Commutes lengthen"));
        tree.root_effects.push(first);
        tree.root_effects.push(Effect::new(&EffectPath::root(2), "Ferry demand rises"));

        let mut session = Session::new();
        session.load(Prediction {
            tree,
            summary: "Travel gets slower.".into(),
            blocked: Vec::new(),
        });
        session
    }

    struct FixedClassifier(Classification);

    impl IntentClassifier for FixedClassifier {
        fn classify(&self, _text: &str) -> Classification {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn read_only_intents_answer_from_state() {
        let generator = Arc::new(ScriptedGenerator::numbered(1));
        let client = client(generator.clone());
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = loaded();

        let reply = session.dispatch(ChatIntent::GetPrompt, &client, &config).await;
        assert_eq!(reply, "The original prompt was: A bridge closes");

        let reply = session.dispatch(ChatIntent::GetSummary, &client, &config).await;
        assert_eq!(reply, "The futurecast summary is: Travel gets slower.");

        let reply = session.dispatch(ChatIntent::GetTreeOverview, &client, &config).await;
        assert!(reply.starts_with("The effect tree holds 3 effects across 2 orders"));
        assert!(reply.contains("1.1 Commutes lengthen"));

        let reply = session.dispatch(ChatIntent::Unknown, &client, &config).await;
        assert_eq!(reply, REPHRASE);

        assert_eq!(generator.call_count(), 0);
        let last = session.chat_history().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, REPHRASE);
    }

    #[tokio::test]
    async fn empty_session_says_nothing_is_loaded() {
        let client = client(Arc::new(ScriptedGenerator::numbered(1)));
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = Session::new();

        assert_eq!(
            session.dispatch(ChatIntent::GetPrompt, &client, &config).await,
            "No prompt loaded yet."
        );
        assert_eq!(
            session.dispatch(ChatIntent::GetTreeOverview, &client, &config).await,
            "No effect tree loaded yet."
        );

        let reply = session
            .dispatch(
                ChatIntent::ExpandEffect {
                    effect_id: Some("1".into()),
                    levels: 1,
                    focus: None,
                },
                &client,
                &config,
            )
            .await;
        assert!(reply.starts_with("Cannot expand effect"));
    }

    #[tokio::test]
    async fn modify_marks_descendants_by_default() {
        let client = client(Arc::new(ScriptedGenerator::numbered(2)));
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = loaded();

        let reply = session
            .dispatch(
                ChatIntent::ModifyEffect {
                    effect_id: Some("1".into()),
                    new_text: Some("Traffic gridlocks".into()),
                },
                &client,
                &config,
            )
            .await;

        assert!(reply.starts_with("Effect 1 has been updated"));
        let tree = session.tree().unwrap();
        assert_eq!(tree.root_effects[0].content, "Traffic gridlocks");
        assert_eq!(tree.root_effects[0].children[0].content, "Commutes lengthen (regenerated)");

        let roles: Vec<Role> = session.chat_history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::System, Role::Assistant]);
    }

    #[tokio::test]
    async fn modify_can_regrow_the_subtree() {
        let generator = Arc::new(ScriptedGenerator::numbered(2));
        let client = client(generator.clone());
        let config = config(RegenerationPolicy::Regenerate);
        let mut session = loaded();

        let reply = session
            .dispatch(
                ChatIntent::ModifyEffect {
                    effect_id: Some("1".into()),
                    new_text: Some("Traffic gridlocks".into()),
                },
                &client,
                &config,
            )
            .await;

        assert!(reply.contains("downstream effects were regenerated"));
        assert_eq!(generator.call_count(), 1);
        let first = &session.tree().unwrap().root_effects[0];
        assert_eq!(first.content, "Traffic gridlocks");
        assert_eq!(first.children.len(), 2);
        assert_eq!(first.children[0].content, "Effect 0-1");
    }

    #[tokio::test]
    async fn blocked_regrowth_is_named_in_the_reply() {
        let generator = Arc::new(ScriptedGenerator::new(|_, prompt| {
            if prompt.contains("Effect to analyze: Rewritten\n") {
                return Err(GenerationError::Blocked {
                    reason: "SAFETY".into(),
                });
            }
            Ok("1. Unused".into())
        }));
        let client = client(generator);
        let config = config(RegenerationPolicy::Regenerate);
        let mut session = loaded();

        let reply = session
            .modify_effect("1", "Rewritten", &client, &config)
            .await
            .unwrap();

        assert!(reply.contains("regeneration was blocked below 1"), "{reply}");
        assert!(!reply.contains("were regenerated"));
        let first = &session.tree().unwrap().root_effects[0];
        assert_eq!(first.content, "Rewritten");
        assert!(first.is_leaf());

        let system = &session.chat_history().last().unwrap();
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("blocked below 1"));
    }

    #[tokio::test]
    async fn failed_edits_leave_the_tree_alone() {
        let client = client(Arc::new(ScriptedGenerator::numbered(1)));
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = loaded();
        let before = session.tree().cloned();

        let reply = session
            .dispatch(
                ChatIntent::ModifyEffect {
                    effect_id: Some("7".into()),
                    new_text: Some("x".into()),
                },
                &client,
                &config,
            )
            .await;
        assert!(reply.contains("couldn't modify effect '7'"));

        let reply = session
            .dispatch(
                ChatIntent::ExpandEffect {
                    effect_id: Some("1".into()),
                    levels: 1,
                    focus: None,
                },
                &client,
                &config,
            )
            .await;
        assert!(reply.contains("couldn't expand effect '1'"));

        let reply = session
            .dispatch(
                ChatIntent::ModifyEffect {
                    effect_id: Some("1".into()),
                    new_text: None,
                },
                &client,
                &config,
            )
            .await;
        assert!(reply.contains("provide both the effect ID and the new text"));

        assert_eq!(session.tree().cloned(), before);
    }

    #[tokio::test]
    async fn expand_grows_a_leaf_with_focus() {
        let client = client(Arc::new(ScriptedGenerator::numbered(1)));
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = loaded();

        let reply = session
            .dispatch(
                ChatIntent::ExpandEffect {
                    effect_id: Some("2".into()),
                    levels: 2,
                    focus: Some("tourism".into()),
                },
                &client,
                &config,
            )
            .await;

        assert_eq!(reply, "Effect 2 has been expanded by 2 level(s). Focused on: 'tourism'.");
        let leaf = mutator::find_by_path(session.tree().unwrap(), "2.1.1").unwrap();
        assert_eq!(leaf.content, "Generated Effect 2.1.1 (L2 Focus: tourism)");
    }

    #[tokio::test]
    async fn general_question_sends_the_session_context() {
        let generator = Arc::new(ScriptedGenerator::new(|_, _| Ok(" Ferries fill up. ".into())));
        let client = client(generator.clone());
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = loaded();
        let classifier = FixedClassifier(
            serde_json::from_value(json!({ "intent": "ask_general_question" })).unwrap(),
        );

        let reply = session
            .handle("What happens to ferries?", &classifier, &client, &config)
            .await;
        assert_eq!(reply, "Ferries fill up.");

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("Original FutureCast Prompt: A bridge closes"));
        assert!(prompt.contains("FutureCast Summary: Travel gets slower."));
        assert!(prompt.contains("User: What happens to ferries?"));
        assert!(prompt.ends_with("Question: What happens to ferries?\nAnswer:"));
    }

    #[tokio::test]
    async fn blocked_question_is_reported() {
        let generator = Arc::new(ScriptedGenerator::new(|_, _| {
            Err(GenerationError::Blocked { reason: "SAFETY".into() })
        }));
        let client = client(generator);
        let config = config(RegenerationPolicy::MarkStale);
        let mut session = loaded();

        let reply = session
            .dispatch(ChatIntent::AskGeneralQuestion { question: "Why?".into() }, &client, &config)
            .await;
        assert_eq!(reply, "Content generation blocked by the API. Reason: SAFETY");
    }

    #[test]
    fn loading_resets_history() {
        let mut session = loaded();
        session.add_message(Role::User, "hello");
        assert_eq!(session.chat_history().len(), 2);

        session.load_saved(SavedFuturecast::new(
            EffectTree::new("Another event"),
            String::new(),
            "20260101_000000".into(),
        ));
        assert_eq!(session.chat_history().len(), 1);
        assert_eq!(session.chat_history()[0].role, Role::System);
        assert_eq!(session.prompt(), Some("Another event"));
        assert_eq!(session.generated_at(), Some("20260101_000000"));
    }

    #[test]
    fn context_without_data_says_not_available() {
        let context = Session::new().full_context();
        assert!(context.contains("Original FutureCast Prompt: Not available."));
        assert!(context.contains("Effect Tree: Not available."));
        assert!(context.contains("Recent Conversation: No history yet."));
    }
}
