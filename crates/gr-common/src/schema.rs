//! Feature schema, interned feature ids, and immutable instances.
//!
//! The schema is process-lifetime configuration: an ordered list of feature
//! definitions, each tagged numeric or categorical. Instances and actions are
//! keyed by [`FeatureId`] (an index into the schema), never by free-form
//! strings, so a typo in a feature name is a construction-time error instead
//! of a silent mismatch at evaluation time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved token marking "no change" for a categorical feature when actions
/// are rendered or parsed in their sparse textual form.
pub const NO_ACTION_TOKEN: &str = "-";

/// Index of a feature within the schema.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FeatureId(pub usize);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a category within a categorical feature's declared domain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CategoryId(pub u32);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric or categorical tagging for a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical { domain: Vec<String> },
}

/// A single feature definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    pub kind: FeatureKind,
}

/// Ordered, immutable feature schema.
///
/// Validated at construction: at least one feature, unique names, and for
/// categorical features a non-empty domain of unique labels that does not
/// include the reserved [`NO_ACTION_TOKEN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<FeatureDef>,
}

impl FeatureSchema {
    pub fn new(features: Vec<FeatureDef>) -> Result<Self> {
        if features.is_empty() {
            return Err(Error::SchemaValidation("schema has no features".into()));
        }
        for (i, def) in features.iter().enumerate() {
            if def.name.is_empty() {
                return Err(Error::SchemaValidation(format!(
                    "feature {i} has an empty name"
                )));
            }
            if features[..i].iter().any(|d| d.name == def.name) {
                return Err(Error::SchemaValidation(format!(
                    "duplicate feature name '{}'",
                    def.name
                )));
            }
            if let FeatureKind::Categorical { domain } = &def.kind {
                if domain.is_empty() {
                    return Err(Error::SchemaValidation(format!(
                        "categorical feature '{}' has an empty domain",
                        def.name
                    )));
                }
                for (j, label) in domain.iter().enumerate() {
                    if label == NO_ACTION_TOKEN {
                        return Err(Error::SchemaValidation(format!(
                            "domain of '{}' uses the reserved token '{NO_ACTION_TOKEN}'",
                            def.name
                        )));
                    }
                    if domain[..j].contains(label) {
                        return Err(Error::SchemaValidation(format!(
                            "duplicate category '{label}' in feature '{}'",
                            def.name
                        )));
                    }
                }
            }
        }
        Ok(Self { features })
    }

    pub fn builder() -> FeatureSchemaBuilder {
        FeatureSchemaBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate all feature ids in schema order.
    pub fn ids(&self) -> impl Iterator<Item = FeatureId> {
        (0..self.features.len()).map(FeatureId)
    }

    pub fn feature(&self, id: FeatureId) -> Result<&FeatureDef> {
        self.features.get(id.0).ok_or(Error::UnknownFeatureId {
            id: id.0,
            len: self.features.len(),
        })
    }

    /// Resolve a feature name to its interned id.
    pub fn resolve(&self, name: &str) -> Result<FeatureId> {
        self.features
            .iter()
            .position(|d| d.name == name)
            .map(FeatureId)
            .ok_or_else(|| Error::UnknownFeature { name: name.into() })
    }

    pub fn name(&self, id: FeatureId) -> Result<&str> {
        Ok(&self.feature(id)?.name)
    }

    pub fn is_numeric(&self, id: FeatureId) -> Result<bool> {
        Ok(matches!(self.feature(id)?.kind, FeatureKind::Numeric))
    }

    /// Resolve a category label within a feature's domain.
    pub fn category(&self, id: FeatureId, label: &str) -> Result<CategoryId> {
        let def = self.feature(id)?;
        match &def.kind {
            FeatureKind::Categorical { domain } => domain
                .iter()
                .position(|l| l == label)
                .map(|i| CategoryId(i as u32))
                .ok_or_else(|| Error::UnknownCategory {
                    feature: def.name.clone(),
                    label: label.into(),
                }),
            FeatureKind::Numeric => Err(Error::FeatureKindMismatch {
                feature: def.name.clone(),
                message: "numeric feature has no categorical domain".into(),
            }),
        }
    }

    pub fn category_label(&self, id: FeatureId, cat: CategoryId) -> Result<&str> {
        let def = self.feature(id)?;
        match &def.kind {
            FeatureKind::Categorical { domain } => domain
                .get(cat.0 as usize)
                .map(String::as_str)
                .ok_or_else(|| Error::UnknownCategory {
                    feature: def.name.clone(),
                    label: format!("#{}", cat.0),
                }),
            FeatureKind::Numeric => Err(Error::FeatureKindMismatch {
                feature: def.name.clone(),
                message: "numeric feature has no categorical domain".into(),
            }),
        }
    }
}

/// Builder for [`FeatureSchema`].
#[derive(Debug, Default)]
pub struct FeatureSchemaBuilder {
    features: Vec<FeatureDef>,
}

impl FeatureSchemaBuilder {
    pub fn numeric(mut self, name: impl Into<String>) -> Self {
        self.features.push(FeatureDef {
            name: name.into(),
            kind: FeatureKind::Numeric,
        });
        self
    }

    pub fn categorical<I, S>(mut self, name: impl Into<String>, domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.push(FeatureDef {
            name: name.into(),
            kind: FeatureKind::Categorical {
                domain: domain.into_iter().map(Into::into).collect(),
            },
        });
        self
    }

    pub fn build(self) -> Result<FeatureSchema> {
        FeatureSchema::new(self.features)
    }
}

/// A single feature value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Num(f64),
    Cat(CategoryId),
}

impl Value {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            Value::Cat(_) => None,
        }
    }

    pub fn as_cat(&self) -> Option<CategoryId> {
        match self {
            Value::Num(_) => None,
            Value::Cat(c) => Some(*c),
        }
    }
}

/// An immutable feature vector, dense over the schema.
///
/// Instances never mutate after construction; applying an action produces a
/// new instance. Arity and per-feature value kinds are validated against the
/// schema at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    values: Vec<Value>,
}

impl Instance {
    pub fn new(schema: &FeatureSchema, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(Error::ArityMismatch {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        for (i, value) in values.iter().enumerate() {
            let def = schema.feature(FeatureId(i))?;
            match (&def.kind, value) {
                (FeatureKind::Numeric, Value::Num(v)) => {
                    if !v.is_finite() {
                        return Err(Error::FeatureKindMismatch {
                            feature: def.name.clone(),
                            message: format!("non-finite numeric value {v}"),
                        });
                    }
                }
                (FeatureKind::Categorical { domain }, Value::Cat(c)) => {
                    if c.0 as usize >= domain.len() {
                        return Err(Error::UnknownCategory {
                            feature: def.name.clone(),
                            label: format!("#{}", c.0),
                        });
                    }
                }
                (FeatureKind::Numeric, Value::Cat(_)) => {
                    return Err(Error::FeatureKindMismatch {
                        feature: def.name.clone(),
                        message: "expected numeric value, got categorical".into(),
                    });
                }
                (FeatureKind::Categorical { .. }, Value::Num(_)) => {
                    return Err(Error::FeatureKindMismatch {
                        feature: def.name.clone(),
                        message: "expected categorical value, got numeric".into(),
                    });
                }
            }
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: FeatureId) -> Option<&Value> {
        self.values.get(id.0)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Clone-and-replace a single feature value. Kind checks are the caller's
    /// responsibility (used by validated action application).
    pub(crate) fn with_value(&self, id: FeatureId, value: Value) -> Instance {
        let mut values = self.values.clone();
        values[id.0] = value;
        Instance { values }
    }
}
