//! Scope layers: which entries a view reads, ordered most specific first.

use std::fmt;

use cfgsync_core::ConfigKey;
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    Node(String),
    Global,
}

impl Layer {
    pub fn matches(&self, key: &ConfigKey) -> bool {
        match (self, key) {
            (Layer::Global, ConfigKey::Global { .. }) => true,
            (Layer::Node(n), ConfigKey::PerNode { node, .. }) => n == node,
            _ => false,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Node(n) => write!(f, "node/{}", n),
            Layer::Global => f.write_str("global"),
        }
    }
}

/// Ordered overlay of layers. Never empty: the last layer is always `Global`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStack {
    layers: SmallVec<[Layer; 2]>,
}

impl ScopeStack {
    pub fn global() -> Self {
        Self { layers: smallvec::smallvec![Layer::Global] }
    }

    /// View from `node`; an absent or empty node name yields the global view.
    pub fn for_node(node: Option<&str>) -> Self {
        match node.filter(|n| !n.is_empty()) {
            Some(n) => Self { layers: smallvec::smallvec![Layer::Node(n.to_string()), Layer::Global] },
            None => Self::global(),
        }
    }

    /// The layer the composed resource is named after.
    pub fn target(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Position of the layer `key` belongs to; `None` when the key is outside this view.
    pub fn rank(&self, key: &ConfigKey) -> Option<usize> {
        self.layers.iter().position(|l| l.matches(key))
    }
}

impl fmt::Display for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, l) in self.layers.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}", l)?;
        }
        Ok(())
    }
}
