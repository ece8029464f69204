//! Declared field slots and scalar conversion.

#![forbid(unsafe_code)]

use std::fmt;

/// Shape of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer { min: i64, max: i64 },
    Boolean,
    /// A kind the binder cannot map onto a single scalar setting (lists, nested objects).
    Unsupported(&'static str),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => f.write_str("text"),
            FieldKind::Integer { min, max } => write!(f, "integer[{}..={}]", min, max),
            FieldKind::Boolean => f.write_str("boolean"),
            FieldKind::Unsupported(what) => f.write_str(what),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionReason {
    #[error("not an integer")]
    NotAnInteger,
    #[error("out of range {min}..={max}")]
    OutOfRange { min: i64, max: i64 },
    #[error("not a boolean")]
    NotABoolean,
}

/// A store value that could not be converted for its field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("setting {setting}: cannot convert {value:?}: {reason}")]
pub struct ConversionError {
    pub setting: String,
    pub value: String,
    pub reason: ConversionReason,
}

pub(crate) enum Slot<S> {
    Text { get: fn(&S) -> Option<&str>, set: fn(&mut S, String) },
    Integer { min: i64, max: i64, get: fn(&S) -> Option<i64>, set: fn(&mut S, i64) },
    Boolean { get: fn(&S) -> Option<bool>, set: fn(&mut S, bool) },
    Unsupported(&'static str),
}

/// One row of a spec's field table: the store setting name, the serialized field name and
/// a typed accessor.
pub struct FieldDecl<S> {
    pub(crate) setting: &'static str,
    pub(crate) field: &'static str,
    pub(crate) slot: Slot<S>,
}

impl<S> FieldDecl<S> {
    pub fn text(setting: &'static str, field: &'static str, get: fn(&S) -> Option<&str>, set: fn(&mut S, String)) -> Self {
        Self { setting, field, slot: Slot::Text { get, set } }
    }

    pub fn integer(
        setting: &'static str,
        field: &'static str,
        min: i64,
        max: i64,
        get: fn(&S) -> Option<i64>,
        set: fn(&mut S, i64),
    ) -> Self {
        Self { setting, field, slot: Slot::Integer { min, max, get, set } }
    }

    pub fn boolean(setting: &'static str, field: &'static str, get: fn(&S) -> Option<bool>, set: fn(&mut S, bool)) -> Self {
        Self { setting, field, slot: Slot::Boolean { get, set } }
    }

    /// Declares a field the binder must refuse; binding the spec fails.
    pub fn unsupported(setting: &'static str, field: &'static str, what: &'static str) -> Self {
        Self { setting, field, slot: Slot::Unsupported(what) }
    }

    pub fn setting(&self) -> &'static str {
        self.setting
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn kind(&self) -> FieldKind {
        match &self.slot {
            Slot::Text { .. } => FieldKind::Text,
            Slot::Integer { min, max, .. } => FieldKind::Integer { min: *min, max: *max },
            Slot::Boolean { .. } => FieldKind::Boolean,
            Slot::Unsupported(what) => FieldKind::Unsupported(*what),
        }
    }

    /// Parse `raw` and store it into `spec`. On error `spec` is left untouched.
    pub(crate) fn set(&self, spec: &mut S, raw: &str) -> Result<(), ConversionError> {
        let fail = |reason| ConversionError { setting: self.setting.to_string(), value: raw.to_string(), reason };
        match &self.slot {
            Slot::Text { set, .. } => set(spec, raw.to_string()),
            Slot::Integer { min, max, set, .. } => {
                let v: i64 = raw.trim().parse().map_err(|_| fail(ConversionReason::NotAnInteger))?;
                if v < *min || v > *max {
                    return Err(fail(ConversionReason::OutOfRange { min: *min, max: *max }));
                }
                set(spec, v)
            }
            Slot::Boolean { set, .. } => set(spec, parse_bool(raw).ok_or_else(|| fail(ConversionReason::NotABoolean))?),
            // Rejected at bind time; a descriptor never holds one.
            Slot::Unsupported(_) => {}
        }
        Ok(())
    }

    /// Current value in store form; `None` when the slot is unset.
    pub(crate) fn get(&self, spec: &S) -> Option<String> {
        match &self.slot {
            Slot::Text { get, .. } => get(spec).map(str::to_string),
            Slot::Integer { get, .. } => get(spec).map(|v| v.to_string()),
            Slot::Boolean { get, .. } => get(spec).map(|v| v.to_string()),
            Slot::Unsupported(_) => None,
        }
    }
}

impl<S> fmt::Debug for FieldDecl<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDecl")
            .field("setting", &self.setting)
            .field("field", &self.field)
            .field("kind", &self.kind())
            .finish()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
