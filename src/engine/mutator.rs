//! Path-addressed edits over an effect tree.
//!
//! Every operation works on a copy: the caller's tree is returned untouched
//! on failure and never modified on success.

use tracing::{info, warn};

use crate::error::MutationError;
use crate::model::effect::{Effect, EffectPath, EffectTree};

/// Appended to every descendant of an edited effect.
pub const STALE_MARKER: &str = " (regenerated)";

/// Resolves a dotted path such as `"1.2.1"`. Unparsable paths resolve to
/// nothing.
pub fn find_by_path<'t>(tree: &'t EffectTree, path: &str) -> Option<&'t Effect> {
    let path: EffectPath = path.parse().ok()?;
    tree.get(&path)
}

/// Sets an effect's text and marks its whole subtree as stale.
pub fn modify_text(
    tree: &EffectTree,
    path: &str,
    new_text: &str,
) -> Result<EffectTree, MutationError> {
    let parsed: EffectPath = path.parse()?;
    let mut updated = tree.clone();

    let Some(node) = updated.get_mut(&parsed) else {
        warn!(path, "modify requested for unknown effect");
        return Err(MutationError::NodeNotFound(path.to_string()));
    };

    node.content = new_text.to_string();
    let mut stale = 0;
    for child in &mut node.children {
        mark_stale(child, &mut stale);
    }

    info!(path, stale, "effect text updated");
    Ok(updated)
}

fn mark_stale(effect: &mut Effect, count: &mut usize) {
    effect.content.push_str(STALE_MARKER);
    *count += 1;
    for child in &mut effect.children {
        mark_stale(child, count);
    }
}

/// Grows a single chain of `levels` effects below a leaf.
///
/// Each new effect is the only child of the one before it, so the chain is
/// `path.1`, `path.1.1`, ... Content is a placeholder naming the level and
/// the optional focus.
pub fn expand_leaf(
    tree: &EffectTree,
    path: &str,
    levels: i64,
    focus: Option<&str>,
) -> Result<EffectTree, MutationError> {
    if levels < 1 {
        return Err(MutationError::InvalidOperation(format!(
            "expansion levels must be 1 or greater, got {levels}"
        )));
    }

    let parsed: EffectPath = path.parse()?;
    let mut updated = tree.clone();

    let Some(node) = updated.get_mut(&parsed) else {
        warn!(path, "expand requested for unknown effect");
        return Err(MutationError::NodeNotFound(path.to_string()));
    };
    if !node.is_leaf() {
        return Err(MutationError::InvalidOperation(format!(
            "effect '{path}' has {} children; only leaves can be expanded",
            node.children.len()
        )));
    }

    let focus = focus.unwrap_or("N/A");
    let mut parent = node;
    let mut parent_path = parsed;
    for level in 1..=levels {
        let child_path = parent_path.child(parent.children.len() + 1);
        let content = format!("Generated Effect {child_path} (L{level} Focus: {focus})");
        parent.children.push(Effect::new(&child_path, content));

        parent = parent
            .children
            .last_mut()
            .ok_or_else(|| MutationError::InvalidOperation("expansion lost its chain".into()))?;
        parent_path = child_path;
    }

    info!(path, levels, "leaf expanded");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 ─┬─ 1.1
    ///    └─ 1.2 ─┬─ 1.2.1
    ///            └─ 1.2.2
    /// 2
    fn sample_tree() -> EffectTree {
        let mut tree = EffectTree::new("A port closes for a month");
        let p1 = EffectPath::root(1);
        let p12 = p1.child(2);

        let mut first = Effect::new(&p1, "Shipping reroutes");
        first.children.push(Effect::new(&p1.child(1), "Freight costs climb"));
        let mut second = Effect::new(&p12, "Local dock work stops");
        second.children.push(Effect::new(&p12.child(1), "Layoffs"));
        second.children.push(Effect::new(&p12.child(2), "Union protests"));
        first.children.push(second);

        tree.root_effects.push(first);
        tree.root_effects.push(Effect::new(&EffectPath::root(2), "Retail shortages"));
        tree
    }

    #[test]
    fn finds_nodes_by_path() {
        let tree = sample_tree();
        assert_eq!(find_by_path(&tree, "1.2.2").unwrap().content, "Union protests");
        assert_eq!(find_by_path(&tree, "2").unwrap().content, "Retail shortages");
    }

    #[test]
    fn missing_path_is_none_and_tree_is_untouched() {
        let tree = sample_tree();
        let before = serde_json::to_string(&tree).unwrap();

        assert!(find_by_path(&tree, "9.9").is_none());
        assert!(find_by_path(&tree, "1.2.3").is_none());
        assert!(find_by_path(&tree, "not a path").is_none());
        assert_eq!(serde_json::to_string(&tree).unwrap(), before);
    }

    #[test]
    fn modify_text_marks_every_descendant() {
        let tree = sample_tree();
        let updated = modify_text(&tree, "1.2", "new text").unwrap();

        assert_eq!(find_by_path(&updated, "1.2").unwrap().content, "new text");
        assert_eq!(find_by_path(&updated, "1.2.1").unwrap().content, "Layoffs (regenerated)");
        assert_eq!(
            find_by_path(&updated, "1.2.2").unwrap().content,
            "Union protests (regenerated)"
        );
        assert_eq!(find_by_path(&updated, "1.1").unwrap().content, "Freight costs climb");
        assert_eq!(find_by_path(&updated, "1").unwrap().content, "Shipping reroutes");

        assert_eq!(find_by_path(&tree, "1.2").unwrap().content, "Local dock work stops");
        assert_eq!(find_by_path(&tree, "1.2.1").unwrap().content, "Layoffs");
    }

    #[test]
    fn modify_text_marks_deep_subtrees() {
        let tree = sample_tree();
        let updated = modify_text(&tree, "1", "Shipping halts").unwrap();

        for path in ["1.1", "1.2", "1.2.1", "1.2.2"] {
            let content = &find_by_path(&updated, path).unwrap().content;
            assert!(content.ends_with(STALE_MARKER), "{path}");
        }
        assert_eq!(find_by_path(&updated, "2").unwrap().content, "Retail shortages");
    }

    #[test]
    fn modify_leaf_changes_only_that_leaf() {
        let tree = sample_tree();
        let updated = modify_text(&tree, "2", "").unwrap();
        assert_eq!(find_by_path(&updated, "2").unwrap().content, "");
        assert_eq!(updated.root_effects[0], tree.root_effects[0]);
    }

    #[test]
    fn modify_unknown_path_fails() {
        let tree = sample_tree();
        assert_eq!(
            modify_text(&tree, "3", "x").unwrap_err(),
            MutationError::NodeNotFound("3".into())
        );
        assert!(matches!(modify_text(&tree, "", "x"), Err(MutationError::NodeNotFound(_))));
    }

    #[test]
    fn expand_leaf_builds_a_linear_chain() {
        let tree = sample_tree();
        let updated = expand_leaf(&tree, "1.1", 2, None).unwrap();

        let leaf = find_by_path(&updated, "1.1").unwrap();
        assert_eq!(leaf.content, "Freight costs climb");
        assert_eq!(leaf.children.len(), 1);

        let child = find_by_path(&updated, "1.1.1").unwrap();
        assert_eq!(child.order, 3);
        assert_eq!(child.parent_id.as_deref(), Some("1.1"));
        assert_eq!(child.children.len(), 1);
        assert_eq!(child.content, "Generated Effect 1.1.1 (L1 Focus: N/A)");

        let grandchild = find_by_path(&updated, "1.1.1.1").unwrap();
        assert_eq!(grandchild.order, 4);
        assert_eq!(grandchild.parent_id.as_deref(), Some("1.1.1"));
        assert!(grandchild.is_leaf());
        assert_eq!(grandchild.content, "Generated Effect 1.1.1.1 (L2 Focus: N/A)");

        assert!(find_by_path(&tree, "1.1.1").is_none());
    }

    #[test]
    fn expand_leaf_records_focus() {
        let tree = sample_tree();
        let updated = expand_leaf(&tree, "2", 1, Some("supply chains")).unwrap();
        assert_eq!(
            find_by_path(&updated, "2.1").unwrap().content,
            "Generated Effect 2.1 (L1 Focus: supply chains)"
        );
    }

    #[test]
    fn expand_non_leaf_is_invalid_and_tree_unchanged() {
        let tree = sample_tree();
        let before = serde_json::to_vec(&tree).unwrap();

        let err = expand_leaf(&tree, "1.2", 1, None).unwrap_err();
        assert!(matches!(err, MutationError::InvalidOperation(_)));
        assert_eq!(serde_json::to_vec(&tree).unwrap(), before);
    }

    #[test]
    fn expand_requires_positive_levels() {
        let tree = sample_tree();
        for levels in [0, -3] {
            let err = expand_leaf(&tree, "2", levels, None).unwrap_err();
            assert!(matches!(err, MutationError::InvalidOperation(_)), "levels {levels}");
        }
    }

    #[test]
    fn expand_unknown_path_is_not_found() {
        let tree = sample_tree();
        assert_eq!(
            expand_leaf(&tree, "1.3", 1, None).unwrap_err(),
            MutationError::NodeNotFound("1.3".into())
        );
    }
}
