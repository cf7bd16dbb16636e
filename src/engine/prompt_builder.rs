use std::collections::BTreeMap;

/// Builds the request text sent to the generation service.
/// Formats text only.
///
/// Every prompt asks for a numbered list, one item per line; the effect
/// parser depends on that format.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build_first_order_prompt(context: &str, count: usize) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an expert at predicting the effects of events. Given an initial event, \
your task is to predict the most likely immediate effects that would result from this event.\n\n",
        );
        push_initial_event(&mut prompt, context);
        prompt.push('\n');
        prompt.push_str(&format!(
            "Generate {count} different immediate likely effects that would result from this \
             event. Each effect should be distinct, plausible, and directly connected to the \
             initial event.\n\n"
        ));
        push_list_format(&mut prompt);

        prompt
    }

    pub fn build_higher_order_prompt(
        context: &str,
        parent_effect: &str,
        sibling_effects: &[String],
        prior_effects_by_order: &BTreeMap<u32, Vec<String>>,
        count: usize,
        order: u32,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an expert at predicting the cascading effects of events. Given an initial \
             event and a specific effect that resulted from it, your task is to predict the \
             next level of effects.\n\n",
        );
        push_initial_event(&mut prompt, context);
        push_prior_effects(&mut prompt, prior_effects_by_order);

        prompt.push_str(&format!("\nEffect to analyze: {parent_effect}\n\n"));

        prompt.push_str("Other concurrent effects happening at the same time:\n");
        if sibling_effects.is_empty() {
            prompt.push_str("- (none)\n");
        }
        for sibling in sibling_effects {
            prompt.push_str(&format!("- {sibling}\n"));
        }
        prompt.push('\n');

        let timeline = if prior_effects_by_order.is_empty() {
            ""
        } else {
            "the timeline of previous effects, "
        };
        prompt.push_str(&format!(
            "Generate {count} different likely {}-order effects that would result specifically \
             from the \"Effect to analyze\" above, while taking into account the initial \
             event, {timeline}and other concurrent effects. Each effect should be distinct, \
             plausible, and directly connected to the effect being analyzed.\n\n",
            ordinal(order)
        ));
        push_list_format(&mut prompt);

        prompt
    }

    pub fn build_summary_prompt(
        context: &str,
        effects_by_order: &BTreeMap<u32, Vec<String>>,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an expert at synthesizing complex scenarios and their implications. Given \
             an initial event and its cascading effects at different levels, your task is to \
             create a comprehensive summary of how this scenario would likely unfold over \
             time.\n\n",
        );
        push_initial_event(&mut prompt, context);

        prompt.push_str("\nCascading Effects:\n");
        for (order, effects) in effects_by_order {
            prompt.push_str(&format!("\n{}-order effects:\n", order_name(*order)));
            for (i, effect) in effects.iter().enumerate() {
                prompt.push_str(&format!("{}. {effect}\n", i + 1));
            }
        }

        prompt.push_str(
            "\nCreate a comprehensive summary that integrates the initial event and all of these \
effects into a coherent narrative. The summary should:\n\
1. Explain how the initial event would unfold over time through these various effects\n\
2. Highlight the most significant developments and their implications\n\
3. Identify any potential feedback loops or compounding effects\n\
4. Present a balanced view of both positive and negative outcomes\n\
5. Be written in a clear, engaging style accessible to a general audience\n\n\
Your summary should be 3-5 paragraphs long and should integrate all the major effects while \
maintaining logical coherence.\n",
        );

        prompt
    }

    /// Free-form question about a loaded futurecast. `session_context` is the
    /// rendered session state (prompt, summary, recent conversation).
    pub fn build_question_prompt(session_context: &str, question: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(session_context);
        prompt.push_str("\n\nQuestion: ");
        prompt.push_str(question);
        prompt.push_str("\nAnswer:");
        prompt
    }
}

fn push_initial_event(prompt: &mut String, context: &str) {
    prompt.push_str("Initial Event: ");
    prompt.push_str(context);
    prompt.push('\n');
}

fn push_prior_effects(prompt: &mut String, prior_effects_by_order: &BTreeMap<u32, Vec<String>>) {
    for (order, effects) in prior_effects_by_order {
        prompt.push_str(&format!(
            "\n{}-order effects that have already occurred:\n",
            order_name(*order)
        ));
        for effect in effects {
            prompt.push_str(&format!("- {effect}\n"));
        }
    }
}

fn push_list_format(prompt: &mut String) {
    prompt.push_str(
        "Format your response as a numbered list with each effect on a new line. Be concise \
         but specific. Do not include any explanations or additional text beyond the \
         numbered list of effects.\n\n\
Example format:\n\
1. [First effect]\n\
2. [Second effect]\n\
3. [Third effect]\n\
...\n",
    );
}

fn order_name(order: u32) -> String {
    match order {
        1 => "First".to_string(),
        2 => "Second".to_string(),
        3 => "Third".to_string(),
        n => ordinal(n),
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
