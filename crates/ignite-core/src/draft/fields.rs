use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::Draftable;
use crate::error::{IgniteError, Result};

pub type Fields = serde_json::Map<String, Value>;

/// Result of applying a client patch through a field whitelist.
#[derive(Debug, Clone)]
pub struct Patched<T> {
    pub record: T,
    /// Fields whose values were taken from the patch.
    pub applied: Vec<String>,
    /// Patch keys dropped because they are not writable here.
    pub ignored: Vec<String>,
}

pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(IgniteError::InvalidField {
            field: "<record>".to_string(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

pub fn from_fields<T: DeserializeOwned>(fields: Fields) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Data fields whose value in `draft` differs from `origin`.
pub fn diff_fields<T: Draftable>(draft: &T, origin: &T) -> Result<Vec<&'static str>> {
    let draft_fields = to_fields(draft)?;
    let origin_fields = to_fields(origin)?;
    Ok(T::DATA_FIELDS
        .iter()
        .copied()
        .filter(|f| draft_fields.get(*f) != origin_fields.get(*f))
        .collect())
}

/// A copy of `into` with the fields named in `names` taken from `from`.
pub fn copy_fields<T: Draftable>(from: &T, into: &T, names: &[&str]) -> Result<T> {
    let source = to_fields(from)?;
    let mut target = to_fields(into)?;
    for name in names {
        if let Some(value) = source.get(*name) {
            target.insert((*name).to_string(), value.clone());
        }
    }
    from_fields(target)
}

/// The current values of `names` on `record`.
pub fn values_of<T: Serialize>(record: &T, names: &[&str]) -> Result<Fields> {
    let all = to_fields(record)?;
    Ok(names
        .iter()
        .filter_map(|n| all.get(*n).map(|v| ((*n).to_string(), v.clone())))
        .collect())
}

/// Apply `patch` to `target`, accepting only keys listed in `allowed`.
///
/// Keys outside the whitelist are reported as ignored, matching how a
/// read-only field is treated. A value that does not fit the field's type is
/// an error naming that field.
pub fn apply_patch<T: Draftable>(target: &T, patch: &Fields, allowed: &[&str]) -> Result<Patched<T>> {
    let mut fields = to_fields(target)?;
    let mut applied = Vec::new();
    let mut ignored = Vec::new();

    for (key, value) in patch {
        if !allowed.contains(&key.as_str()) || !fields.contains_key(key) {
            ignored.push(key.clone());
            continue;
        }
        fields.insert(key.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<T>(Value::Object(fields.clone())) {
            return Err(IgniteError::InvalidField {
                field: key.clone(),
                reason: e.to_string(),
            });
        }
        applied.push(key.clone());
    }

    Ok(Patched {
        record: from_fields(fields)?,
        applied,
        ignored,
    })
}
