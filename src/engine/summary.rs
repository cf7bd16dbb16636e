use tracing::info;

use crate::engine::generation::TextGenerationClient;
use crate::engine::prompt_builder::PromptBuilder;
use crate::error::GenerationError;
use crate::model::effect::EffectTree;

/// One synthesis call over a finished tree. The narrative is returned as
/// the service produced it.
pub async fn generate_summary(
    client: &TextGenerationClient,
    tree: &EffectTree,
) -> Result<String, GenerationError> {
    let grouped = tree.effects_by_order();
    let prompt = PromptBuilder::build_summary_prompt(&tree.context, &grouped);

    info!(orders = grouped.len(), effects = tree.node_count(), "generating summary");
    client.generate(&prompt).await
}
