//! Whether raw-entry annotations reach the produced resource.

use cfgsync_core::Annotations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationPolicy {
    /// Copy entry annotations onto the resource metadata.
    Allow,
    /// Drop them.
    Disallow,
}

impl AnnotationPolicy {
    /// Annotations to carry over from `raw`. Always an owned copy.
    pub fn apply(&self, raw: &Annotations) -> Annotations {
        match self {
            AnnotationPolicy::Allow => raw.clone(),
            AnnotationPolicy::Disallow => Annotations::new(),
        }
    }
}
