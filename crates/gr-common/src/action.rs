//! Actions: partial feature-value reassignments applied uniformly to a group.
//!
//! An action edits a subset of features and leaves the rest untouched.
//! Numeric edits are either an absolute replacement ([`Edit::SetNum`]) or an
//! additive delta ([`Edit::AddNum`]); categorical edits replace the category.
//! A categorical "no change" is expressed by simply not editing the feature,
//! which is what the sparse `-` token denotes in textual renderings.

use crate::error::{Error, Result};
use crate::schema::{CategoryId, FeatureId, FeatureKind, FeatureSchema, Instance, Value};
use serde::{Deserialize, Serialize};

/// A single feature edit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edit {
    /// Replace a numeric feature with an absolute target value.
    SetNum(f64),
    /// Offset a numeric feature by a delta.
    AddNum(f64),
    /// Replace a categorical feature's category.
    SetCat(CategoryId),
}

/// A non-empty, immutable set of feature edits, sorted by feature id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    edits: Vec<(FeatureId, Edit)>,
}

impl Action {
    /// Build an action from edits. Rejects empty edit lists and duplicate
    /// feature ids; edits are stored sorted by feature id.
    pub fn new(mut edits: Vec<(FeatureId, Edit)>) -> Result<Self> {
        if edits.is_empty() {
            return Err(Error::EmptyAction);
        }
        edits.sort_by_key(|(id, _)| *id);
        for window in edits.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(Error::Config(format!(
                    "action edits feature {} twice",
                    window[0].0
                )));
            }
        }
        Ok(Self { edits })
    }

    pub fn edits(&self) -> &[(FeatureId, Edit)] {
        &self.edits
    }

    pub fn edit_for(&self, id: FeatureId) -> Option<&Edit> {
        self.edits
            .binary_search_by_key(&id, |(f, _)| *f)
            .ok()
            .map(|i| &self.edits[i].1)
    }

    /// Feature ids this action touches, in ascending order.
    pub fn touched(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.edits.iter().map(|(id, _)| *id)
    }

    /// Validate every edit against the schema: the feature must exist, the
    /// edit kind must match the feature kind, and categorical targets must
    /// lie within the declared domain.
    pub fn validate(&self, schema: &FeatureSchema) -> Result<()> {
        for (id, edit) in &self.edits {
            let def = schema.feature(*id)?;
            match (&def.kind, edit) {
                (FeatureKind::Numeric, Edit::SetNum(v)) | (FeatureKind::Numeric, Edit::AddNum(v)) => {
                    if !v.is_finite() {
                        return Err(Error::FeatureKindMismatch {
                            feature: def.name.clone(),
                            message: format!("non-finite edit target {v}"),
                        });
                    }
                }
                (FeatureKind::Categorical { domain }, Edit::SetCat(c)) => {
                    if c.0 as usize >= domain.len() {
                        return Err(Error::UnknownCategory {
                            feature: def.name.clone(),
                            label: format!("#{}", c.0),
                        });
                    }
                }
                (FeatureKind::Numeric, Edit::SetCat(_)) => {
                    return Err(Error::FeatureKindMismatch {
                        feature: def.name.clone(),
                        message: "categorical edit on a numeric feature".into(),
                    });
                }
                (FeatureKind::Categorical { .. }, Edit::SetNum(_))
                | (FeatureKind::Categorical { .. }, Edit::AddNum(_)) => {
                    return Err(Error::FeatureKindMismatch {
                        feature: def.name.clone(),
                        message: "numeric edit on a categorical feature".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply this action to one instance, producing a new instance.
    /// Unedited features pass through unchanged.
    pub fn apply(&self, instance: &Instance) -> Result<Instance> {
        let mut out = instance.clone();
        for (id, edit) in &self.edits {
            let current = out.get(*id).ok_or(Error::UnknownFeatureId {
                id: id.0,
                len: instance.len(),
            })?;
            let next = match (edit, current) {
                (Edit::SetNum(v), Value::Num(_)) => Value::Num(*v),
                (Edit::AddNum(d), Value::Num(v)) => Value::Num(v + d),
                (Edit::SetCat(c), Value::Cat(_)) => Value::Cat(*c),
                _ => {
                    return Err(Error::FeatureKindMismatch {
                        feature: format!("feature {id}"),
                        message: "edit kind does not match instance value".into(),
                    })
                }
            };
            out = out.with_value(*id, next);
        }
        Ok(out)
    }

    /// Render the action sparsely by feature name, e.g.
    /// `income += 500, city = B`.
    pub fn describe(&self, schema: &FeatureSchema) -> Result<String> {
        let mut parts = Vec::with_capacity(self.edits.len());
        for (id, edit) in &self.edits {
            let name = schema.name(*id)?;
            let part = match edit {
                Edit::SetNum(v) => format!("{name} = {v}"),
                Edit::AddNum(d) if *d >= 0.0 => format!("{name} += {d}"),
                Edit::AddNum(d) => format!("{name} -= {}", -d),
                Edit::SetCat(c) => format!("{name} = {}", schema.category_label(*id, *c)?),
            };
            parts.push(part);
        }
        Ok(parts.join(", "))
    }
}

/// Apply an action to a batch of instances.
///
/// Pure, standalone primitive: downstream "show the result of applying
/// action X" surfaces consume this without going through the engine.
pub fn apply_action(action: &Action, instances: &[Instance]) -> Result<Vec<Instance>> {
    instances.iter().map(|i| action.apply(i)).collect()
}
