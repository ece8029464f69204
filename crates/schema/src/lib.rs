//! cfgsync field binder: maps store setting names onto typed spec fields.
//!
//! A spec type declares its field table once via [`ConfigSpec::fields`]. [`bind`] validates
//! that table into a [`SpecDescriptor`] and caches it per type, so every processor for the
//! same spec shares one descriptor.

#![forbid(unsafe_code)]

use std::any::{Any, TypeId};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use tracing::debug;

pub mod field;

pub use field::{ConversionError, ConversionReason, FieldDecl, FieldKind};

/// A spec payload whose fields are populated from individual store settings.
pub trait ConfigSpec: Default + Send + Sync + 'static {
    /// Resource kind the spec belongs to; used in errors and logs.
    const KIND: &'static str;

    /// Field table, in the order settings are written back out.
    fn fields() -> Vec<FieldDecl<Self>>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("{spec}: field {field} (setting {setting}) has unsupported kind {kind}")]
    UnsupportedKind { spec: &'static str, setting: &'static str, field: &'static str, kind: &'static str },
    #[error("{spec}: setting {setting} declared more than once")]
    DuplicateSetting { spec: &'static str, setting: &'static str },
    #[error("{spec}: field {field} has an empty setting name")]
    EmptySetting { spec: &'static str, field: &'static str },
}

/// Outcome of applying one setting to a spec value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Set,
    /// No field is bound to the setting; the value was ignored.
    Unknown,
}

/// Validated field table for one spec type.
pub struct SpecDescriptor<S> {
    kind: &'static str,
    fields: Vec<FieldDecl<S>>,
    index: FxHashMap<&'static str, usize>,
}

impl<S: ConfigSpec> SpecDescriptor<S> {
    fn build() -> Result<Self, BindError> {
        let fields = S::fields();
        let mut index = FxHashMap::default();
        for (i, f) in fields.iter().enumerate() {
            if f.setting.is_empty() {
                return Err(BindError::EmptySetting { spec: S::KIND, field: f.field });
            }
            if let FieldKind::Unsupported(kind) = f.kind() {
                return Err(BindError::UnsupportedKind { spec: S::KIND, setting: f.setting, field: f.field, kind });
            }
            if index.insert(f.setting, i).is_some() {
                return Err(BindError::DuplicateSetting { spec: S::KIND, setting: f.setting });
            }
        }
        Ok(Self { kind: S::KIND, fields, index })
    }
}

impl<S> SpecDescriptor<S> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn fields(&self) -> &[FieldDecl<S>] {
        &self.fields
    }

    pub fn contains(&self, setting: &str) -> bool {
        self.index.contains_key(setting)
    }

    pub fn field(&self, setting: &str) -> Option<&FieldDecl<S>> {
        self.index.get(setting).map(|&i| &self.fields[i])
    }

    /// Convert `raw` and store it into the field bound to `setting`.
    pub fn apply(&self, spec: &mut S, setting: &str, raw: &str) -> Result<Applied, ConversionError> {
        match self.field(setting) {
            Some(f) => f.set(spec, raw).map(|_| Applied::Set),
            None => Ok(Applied::Unknown),
        }
    }

    /// Every set field as `(setting, value)` in declaration order.
    pub fn extract(&self, spec: &S) -> Vec<(&'static str, String)> {
        self.fields.iter().filter_map(|f| f.get(spec).map(|v| (f.setting, v))).collect()
    }
}

type Erased = Arc<dyn Any + Send + Sync>;

static REGISTRY: OnceCell<RwLock<FxHashMap<TypeId, Erased>>> = OnceCell::new();

fn registry() -> &'static RwLock<FxHashMap<TypeId, Erased>> {
    REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Bound descriptor for `S`, building and caching it on first use.
///
/// Concurrent first callers may each build a descriptor; only the first one inserted is
/// kept and all callers get that instance.
pub fn bind<S: ConfigSpec>() -> Result<Arc<SpecDescriptor<S>>, BindError> {
    let id = TypeId::of::<S>();
    let cached = registry().read().unwrap_or_else(PoisonError::into_inner).get(&id).cloned();
    if let Some(hit) = cached {
        if let Ok(d) = hit.downcast::<SpecDescriptor<S>>() {
            return Ok(d);
        }
    }

    let built = Arc::new(SpecDescriptor::<S>::build()?);
    let stored = {
        let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
        map.entry(id).or_insert_with(|| built.clone() as Erased).clone()
    };
    debug!(kind = S::KIND, fields = built.fields.len(), "spec descriptor bound");
    Ok(stored.downcast::<SpecDescriptor<S>>().unwrap_or(built))
}

/// Validate and cache `S` ahead of first use.
pub fn register<S: ConfigSpec>() -> Result<(), BindError> {
    bind::<S>().map(|_| ())
}
