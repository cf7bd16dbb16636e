use std::collections::BTreeMap;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, instrument, warn};

use crate::engine::effect_parser::parse_effects_list;
use crate::engine::generation::TextGenerationClient;
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::summary::generate_summary;
use crate::error::{GenerationError, MutationError};
use crate::model::effect::{Effect, EffectPath, EffectTree};

/// Effect texts already generated, grouped by order.
pub type PriorEffects = BTreeMap<u32, Vec<String>>;

/// Total effects in a complete tree: `E + E² + … + E^D`.
pub fn estimate_node_count(effects_per_level: usize, max_depth: usize) -> usize {
    let mut total = 0usize;
    let mut level = 1usize;
    for _ in 0..max_depth {
        level = level.saturating_mul(effects_per_level);
        total = total.saturating_add(level);
    }
    total
}

/// Generation calls needed to build a complete tree: one for the first
/// order plus one per node that gets children. The summary call is extra.
pub fn estimate_generation_calls(effects_per_level: usize, max_depth: usize) -> usize {
    if max_depth == 0 {
        return 0;
    }
    1 + estimate_node_count(effects_per_level, max_depth - 1)
}

/// Outcome of a full tree build.
#[derive(Debug, Clone)]
pub struct GeneratedTree {
    pub tree: EffectTree,
    /// Effects whose children the service refused to generate. They are
    /// kept as leaves.
    pub blocked: Vec<EffectPath>,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub tree: EffectTree,
    pub summary: String,
    pub blocked: Vec<EffectPath>,
}

/// Builds effect trees by bounded recursive fan-out.
pub struct TreeGenerationEngine<'a> {
    client: &'a TextGenerationClient,
    max_depth: usize,
    effects_per_level: usize,
}

impl<'a> TreeGenerationEngine<'a> {
    pub fn new(
        client: &'a TextGenerationClient,
        max_depth: usize,
        effects_per_level: usize,
    ) -> Self {
        Self {
            client,
            max_depth,
            effects_per_level,
        }
    }

    pub fn estimated_node_count(&self) -> usize {
        estimate_node_count(self.effects_per_level, self.max_depth)
    }

    /// Tree plus narrative summary. Any transport failure, or a blocked
    /// first-order or summary call, fails the whole prediction.
    pub async fn predict(&self, context: &str) -> Result<Prediction, GenerationError> {
        let generated = self.generate_tree(context).await?;
        let summary = generate_summary(self.client, &generated.tree).await?;

        Ok(Prediction {
            tree: generated.tree,
            summary,
            blocked: generated.blocked,
        })
    }

    #[instrument(
        skip(self, context),
        fields(max_depth = self.max_depth, effects = self.effects_per_level)
    )]
    pub async fn generate_tree(&self, context: &str) -> Result<GeneratedTree, GenerationError> {
        let mut tree = EffectTree::new(context);
        let mut blocked = Vec::new();

        if self.max_depth == 0 || self.effects_per_level == 0 {
            return Ok(GeneratedTree { tree, blocked });
        }

        info!(estimated = self.estimated_node_count(), "generating effect tree");

        let prompt = PromptBuilder::build_first_order_prompt(context, self.effects_per_level);
        let response = self.client.generate(&prompt).await?;
        tree.root_effects = self.effects_from(&response, EffectPath::root);

        self.expand_group(
            context,
            &mut tree.root_effects,
            &PriorEffects::new(),
            0,
            &mut blocked,
        )
        .await?;

        info!(nodes = tree.node_count(), blocked = blocked.len(), "effect tree complete");
        Ok(GeneratedTree { tree, blocked })
    }

    /// Replaces an effect's text and regrows everything below it from the
    /// new text, down to the configured depth limit. The input tree is left
    /// untouched.
    ///
    /// A node already at the limit only has its text replaced. Effects whose
    /// children were refused are kept as leaves and listed in `blocked`.
    pub async fn regenerate_subtree(
        &self,
        tree: &EffectTree,
        path: &str,
        new_text: &str,
    ) -> Result<GeneratedTree, RegenerateError> {
        let path: EffectPath = path.parse().map_err(MutationError::from)?;
        let mut updated = tree.clone();

        // Prior effects follow the ancestor chain: each ancestor's sibling
        // group, keyed by its order.
        let mut prior = PriorEffects::new();
        let mut ancestor = path.parent();
        while let Some(p) = ancestor {
            let group = match p.parent() {
                Some(gp) => updated.get(&gp).map(|n| contents(&n.children)),
                None => Some(contents(&updated.root_effects)),
            };
            if let Some(group) = group {
                prior.insert(p.depth() as u32, group);
            }
            ancestor = p.parent();
        }

        let node = updated
            .get_mut(&path)
            .ok_or_else(|| MutationError::NodeNotFound(path.to_string()))?;
        node.content = new_text.to_string();
        node.children.clear();

        let siblings = match path.parent() {
            Some(p) => updated.get_mut(&p).map(|n| &mut n.children),
            None => Some(&mut updated.root_effects),
        }
        .ok_or_else(|| MutationError::NodeNotFound(path.to_string()))?;

        let depth = path.depth() - 1;
        let index = path.segments()[depth] - 1;
        let mut blocked = Vec::new();
        self.expand_one(&tree.context, siblings, index, &prior, depth, &mut blocked)
            .await?;

        if !blocked.is_empty() {
            warn!(
                path = %path,
                blocked = blocked.len(),
                "regeneration blocked below edited effect"
            );
        }
        Ok(GeneratedTree {
            tree: updated,
            blocked,
        })
    }

    fn effects_from(&self, response: &str, path_for: impl Fn(usize) -> EffectPath) -> Vec<Effect> {
        let texts = parse_effects_list(response);
        if texts.len() < self.effects_per_level {
            warn!(
                expected = self.effects_per_level,
                parsed = texts.len(),
                "fewer effects than requested"
            );
        }

        texts
            .into_iter()
            .take(self.effects_per_level)
            .enumerate()
            .map(|(i, text)| Effect::new(&path_for(i + 1), text))
            .collect()
    }

    /// Generates children for every member of a sibling group at `depth`,
    /// then descends into each member's children.
    ///
    /// `prior` is copied and extended with this group before use, so sibling
    /// subtrees never see each other's descendants.
    fn expand_group<'g>(
        &'g self,
        context: &'g str,
        group: &'g mut [Effect],
        prior: &'g PriorEffects,
        depth: usize,
        blocked: &'g mut Vec<EffectPath>,
    ) -> BoxFuture<'g, Result<(), GenerationError>> {
        async move {
            if depth + 1 >= self.max_depth || group.is_empty() {
                return Ok(());
            }

            let order = group[0].order;
            let mut prior = prior.clone();
            prior.insert(order, contents(group));

            let prompts: Vec<String> = (0..group.len())
                .map(|i| self.child_prompt(context, group, i, &prior))
                .collect();

            let responses = self.client.generate_batch_settled(&prompts).await;

            for (parent, response) in group.iter_mut().zip(responses) {
                match response {
                    Ok(text) => self.attach_children(parent, &text),
                    Err(e) if e.is_blocked() => {
                        warn!(
                            path = %parent.id,
                            error = %e,
                            "children blocked; keeping effect as a leaf"
                        );
                        if let Ok(path) = parent.id.parse() {
                            blocked.push(path);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            for parent in group.iter_mut() {
                self.expand_group(context, &mut parent.children, &prior, depth + 1, blocked)
                    .await?;
            }

            Ok(())
        }
        .boxed()
    }

    /// Regrows the children of one member of `group`.
    async fn expand_one(
        &self,
        context: &str,
        group: &mut [Effect],
        index: usize,
        prior: &PriorEffects,
        depth: usize,
        blocked: &mut Vec<EffectPath>,
    ) -> Result<(), GenerationError> {
        if depth + 1 >= self.max_depth {
            return Ok(());
        }

        let mut prior = prior.clone();
        prior.insert(group[index].order, contents(group));

        let prompt = self.child_prompt(context, group, index, &prior);
        let parent = &mut group[index];
        match self.client.generate(&prompt).await {
            Ok(text) => self.attach_children(parent, &text),
            Err(e) if e.is_blocked() => {
                warn!(
                    path = %parent.id,
                    error = %e,
                    "children blocked; keeping effect as a leaf"
                );
                if let Ok(path) = parent.id.parse() {
                    blocked.push(path);
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.expand_group(context, &mut parent.children, &prior, depth + 1, blocked)
            .await
    }

    fn child_prompt(
        &self,
        context: &str,
        group: &[Effect],
        index: usize,
        prior: &PriorEffects,
    ) -> String {
        let parent = &group[index];
        let siblings: Vec<String> = group
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, e)| e.content.clone())
            .collect();

        PromptBuilder::build_higher_order_prompt(
            context,
            &parent.content,
            &siblings,
            prior,
            self.effects_per_level,
            parent.order + 1,
        )
    }

    fn attach_children(&self, parent: &mut Effect, response: &str) {
        let parent_path: Option<EffectPath> = parent.id.parse().ok();
        let Some(parent_path) = parent_path else {
            warn!(id = %parent.id, "effect id is not a path; skipping children");
            return;
        };
        parent.children = self.effects_from(response, |i| parent_path.child(i));
    }
}

fn contents(effects: &[Effect]) -> Vec<String> {
    effects.iter().map(|e| e.content.clone()).collect()
}

/// Failure of [`TreeGenerationEngine::regenerate_subtree`].
#[derive(Debug, thiserror::Error)]
pub enum RegenerateError {
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
