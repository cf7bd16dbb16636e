use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidPath;

/// Dotted position of an effect in its tree, e.g. `1.2.1` is the first
/// child of the second child of the first root effect.
///
/// Segments are 1-based sibling indices. The path doubles as the effect id,
/// so it never changes once the node exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectPath(Vec<usize>);

impl EffectPath {
    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.len() > 1 {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    pub fn segments(&self) -> &[usize] {
        &self.0
    }

    /// Number of segments; equals the `order` of the addressed effect.
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for EffectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for EffectPath {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidPath(s.to_string()));
        }

        let segments = trimmed
            .split('.')
            .map(|part| match part.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(InvalidPath(s.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(segments))
    }
}

/// One predicted consequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    #[serde(default)]
    pub id: String,
    pub content: String,
    /// Distance from the triggering event; first-order effects are 1.
    pub order: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<Effect>,
}

impl Effect {
    pub fn new(path: &EffectPath, content: impl Into<String>) -> Self {
        Self {
            id: path.to_string(),
            content: content.into(),
            order: path.depth() as u32,
            parent_id: path.parent().map(|p| p.to_string()),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Effect)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    fn reindex(&mut self, path: EffectPath) {
        self.id = path.to_string();
        self.order = path.depth() as u32;
        self.parent_id = path.parent().map(|p| p.to_string());
        for (i, child) in self.children.iter_mut().enumerate() {
            child.reindex(path.child(i + 1));
        }
    }
}

/// The full set of predicted effects for one triggering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectTree {
    pub context: String,
    #[serde(default)]
    pub root_effects: Vec<Effect>,
}

impl EffectTree {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            root_effects: Vec::new(),
        }
    }

    /// Resolves a path by indexing one level per segment.
    pub fn get(&self, path: &EffectPath) -> Option<&Effect> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.root_effects.get(first.checked_sub(1)?)?;
        for segment in rest {
            node = node.children.get(segment.checked_sub(1)?)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &EffectPath) -> Option<&mut Effect> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.root_effects.get_mut(first.checked_sub(1)?)?;
        for segment in rest {
            node = node.children.get_mut(segment.checked_sub(1)?)?;
        }
        Some(node)
    }

    /// Effect contents grouped by order, in depth-first order within each
    /// group.
    pub fn effects_by_order(&self) -> BTreeMap<u32, Vec<String>> {
        let mut grouped: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for root in &self.root_effects {
            root.visit(&mut |effect| {
                grouped
                    .entry(effect.order)
                    .or_default()
                    .push(effect.content.clone());
            });
        }
        grouped
    }

    pub fn node_count(&self) -> usize {
        self.root_effects
            .iter()
            .map(|r| 1 + r.descendant_count())
            .sum()
    }

    pub fn max_order(&self) -> u32 {
        let mut max = 0;
        for root in &self.root_effects {
            root.visit(&mut |effect| max = max.max(effect.order));
        }
        max
    }

    /// Rewrites every id, parent id and order from the node's position.
    ///
    /// Trees saved by older builds carry random ids; after this call every
    /// node is addressable by the id it reports.
    pub fn reindex(&mut self) {
        for (i, root) in self.root_effects.iter_mut().enumerate() {
            root.reindex(EffectPath::root(i + 1));
        }
    }

    /// Renders the tree as an indented outline, one effect per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for root in &self.root_effects {
            root.visit(&mut |effect| {
                let indent = "  ".repeat(effect.order.saturating_sub(1) as usize);
                out.push_str(&format!("{indent}{} {}\n", effect.id, effect.content));
            });
        }
        out
    }
}
