//! JSON job files for the CLI.
//!
//! A job file bundles everything a run needs: the feature schema, the
//! affected/unaffected row sets, the features allowed to vary, a rule-based
//! stand-in predictor, the candidate source choice, and engine parameters.
//! Rows are arrays in schema order, numbers for numeric features and
//! category labels for categorical ones.

use crate::candidate::{CandidateSource, GlobalDirectionSource, NearestNeighborSource};
use crate::predict::Predictor;
use gr_common::{
    Action, CategoryId, Edit, Error, FeatureDef, FeatureId, FeatureSchema, Instance, Outcome,
    Result, Value, NO_ACTION_TOKEN,
};
use gr_config::EngineParams;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;

/// Raw job file shape.
#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub schema: Vec<FeatureDef>,
    /// Rows used to fit the distance function; defaults to
    /// affected ∪ unaffected when absent.
    #[serde(default)]
    pub reference: Vec<Vec<JsonValue>>,
    pub affected: Vec<Vec<JsonValue>>,
    #[serde(default)]
    pub unaffected: Vec<Vec<JsonValue>>,
    /// Feature names actions may touch; defaults to every feature.
    #[serde(default)]
    pub feat_to_vary: Vec<String>,
    pub predictor: RuleSet,
    #[serde(default)]
    pub source: SourceSpec,
    #[serde(default)]
    pub params: EngineParams,
}

/// Disjunctive rule predictor: favorable when ANY rule matches.
#[derive(Debug, Deserialize)]
pub struct RuleSet {
    pub favorable_if_any: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
pub struct Rule {
    pub feature: String,
    pub op: RuleOp,
    pub value: JsonValue,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

/// Candidate source selection.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceSpec {
    NearestNeighbor {
        #[serde(default = "default_neighbors")]
        neighbors_per_member: usize,
    },
    GlobalDirection {
        #[serde(default = "default_steps")]
        steps: usize,
    },
}

fn default_neighbors() -> usize {
    1
}

fn default_steps() -> usize {
    5
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::NearestNeighbor {
            neighbors_per_member: default_neighbors(),
        }
    }
}

/// A job file resolved against its own schema.
pub struct LoadedJob {
    pub schema: FeatureSchema,
    pub reference: Vec<Instance>,
    pub affected: Vec<Instance>,
    pub unaffected: Vec<Instance>,
    pub feat_to_vary: Vec<FeatureId>,
    pub predictor: RulePredictor,
    pub source: Box<dyn CandidateSource>,
    pub params: EngineParams,
}

/// Compiled rule predictor.
pub struct RulePredictor {
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    feature: FeatureId,
    op: RuleOp,
    target: CompiledTarget,
}

enum CompiledTarget {
    Num(f64),
    Cat(CategoryId),
}

impl RulePredictor {
    fn compile(schema: &FeatureSchema, rules: &RuleSet) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.favorable_if_any.len());
        for rule in &rules.favorable_if_any {
            let feature = schema.resolve(&rule.feature)?;
            let target = if schema.is_numeric(feature)? {
                let v = rule.value.as_f64().ok_or_else(|| {
                    Error::Config(format!(
                        "rule on numeric feature '{}' needs a numeric value",
                        rule.feature
                    ))
                })?;
                CompiledTarget::Num(v)
            } else {
                let label = rule.value.as_str().ok_or_else(|| {
                    Error::Config(format!(
                        "rule on categorical feature '{}' needs a string value",
                        rule.feature
                    ))
                })?;
                if !matches!(rule.op, RuleOp::Eq) {
                    return Err(Error::Config(format!(
                        "categorical rule on '{}' only supports eq",
                        rule.feature
                    )));
                }
                CompiledTarget::Cat(schema.category(feature, label)?)
            };
            compiled.push(CompiledRule {
                feature,
                op: rule.op,
                target,
            });
        }
        Ok(Self { rules: compiled })
    }

    fn matches(&self, instance: &Instance) -> bool {
        self.rules.iter().any(|rule| {
            match (&rule.target, instance.get(rule.feature)) {
                (CompiledTarget::Num(target), Some(Value::Num(v))) => match rule.op {
                    RuleOp::Gt => v > target,
                    RuleOp::Ge => v >= target,
                    RuleOp::Lt => v < target,
                    RuleOp::Le => v <= target,
                    RuleOp::Eq => v == target,
                },
                (CompiledTarget::Cat(target), Some(Value::Cat(c))) => c == target,
                _ => false,
            }
        })
    }
}

impl Predictor for RulePredictor {
    fn predict(&self, instances: &[Instance]) -> Result<Vec<Outcome>> {
        Ok(instances
            .iter()
            .map(|i| Outcome::from(self.matches(i)))
            .collect())
    }
}

fn parse_row(schema: &FeatureSchema, row: &[JsonValue]) -> Result<Instance> {
    if row.len() != schema.len() {
        return Err(Error::ArityMismatch {
            expected: schema.len(),
            actual: row.len(),
        });
    }
    let mut values = Vec::with_capacity(row.len());
    for (i, cell) in row.iter().enumerate() {
        let id = FeatureId(i);
        if schema.is_numeric(id)? {
            let name = schema.name(id)?.to_string();
            let v = cell.as_f64().ok_or_else(|| Error::FeatureKindMismatch {
                feature: name,
                message: format!("expected a number, got {cell}"),
            })?;
            values.push(Value::Num(v));
        } else {
            let name = schema.name(id)?.to_string();
            let label = cell.as_str().ok_or_else(|| Error::FeatureKindMismatch {
                feature: name,
                message: format!("expected a category label, got {cell}"),
            })?;
            values.push(Value::Cat(schema.category(id, label)?));
        }
    }
    Instance::new(schema, values)
}

fn parse_rows(schema: &FeatureSchema, rows: &[Vec<JsonValue>]) -> Result<Vec<Instance>> {
    rows.iter().map(|r| parse_row(schema, r)).collect()
}

/// Render instances back into job-file row form (numbers and labels).
pub fn render_rows(schema: &FeatureSchema, instances: &[Instance]) -> Result<Vec<Vec<JsonValue>>> {
    instances
        .iter()
        .map(|instance| {
            schema
                .ids()
                .map(|id| match instance.get(id) {
                    Some(Value::Num(v)) => Ok(JsonValue::from(*v)),
                    Some(Value::Cat(c)) => {
                        Ok(JsonValue::from(schema.category_label(id, *c)?.to_string()))
                    }
                    None => Err(Error::UnknownFeatureId {
                        id: id.0,
                        len: instance.len(),
                    }),
                })
                .collect()
        })
        .collect()
}

/// Parse a job from its JSON text.
pub fn parse_job(text: &str) -> Result<LoadedJob> {
    let raw: JobFile = serde_json::from_str(text)?;
    let schema = FeatureSchema::new(raw.schema)?;

    let affected = parse_rows(&schema, &raw.affected)?;
    let unaffected = parse_rows(&schema, &raw.unaffected)?;
    let reference = if raw.reference.is_empty() {
        let mut all = affected.clone();
        all.extend(unaffected.iter().cloned());
        all
    } else {
        parse_rows(&schema, &raw.reference)?
    };

    let feat_to_vary = if raw.feat_to_vary.is_empty() {
        schema.ids().collect()
    } else {
        raw.feat_to_vary
            .iter()
            .map(|name| schema.resolve(name))
            .collect::<Result<Vec<_>>>()?
    };

    let predictor = RulePredictor::compile(&schema, &raw.predictor)?;
    let source: Box<dyn CandidateSource> = match raw.source {
        SourceSpec::NearestNeighbor {
            neighbors_per_member,
        } => Box::new(NearestNeighborSource::fit(
            &schema,
            unaffected.clone(),
            neighbors_per_member,
        )?),
        SourceSpec::GlobalDirection { steps } => {
            Box::new(GlobalDirectionSource::new(unaffected.clone(), steps))
        }
    };

    Ok(LoadedJob {
        schema,
        reference,
        affected,
        unaffected,
        feat_to_vary,
        predictor,
        source,
        params: raw.params,
    })
}

/// Load and parse a job file from disk.
pub fn load_job(path: &Path) -> Result<LoadedJob> {
    let text = std::fs::read_to_string(path)?;
    parse_job(&text)
}

/// Parse a sparse action file: a map from feature name to either a number
/// (absolute numeric target), `{"add": delta}` / `{"set": target}` objects,
/// a category label, or the `-` no-op token.
pub fn parse_action(schema: &FeatureSchema, text: &str) -> Result<Action> {
    let raw: serde_json::Map<String, JsonValue> = serde_json::from_str(text)?;
    let mut edits = Vec::new();
    for (name, value) in &raw {
        let id = schema.resolve(name)?;
        if schema.is_numeric(id)? {
            let edit = match value {
                JsonValue::Number(n) => Edit::SetNum(n.as_f64().ok_or_else(|| {
                    Error::Config(format!("non-finite numeric target for '{name}'"))
                })?),
                JsonValue::Object(map) => {
                    if let Some(delta) = map.get("add").and_then(JsonValue::as_f64) {
                        Edit::AddNum(delta)
                    } else if let Some(target) = map.get("set").and_then(JsonValue::as_f64) {
                        Edit::SetNum(target)
                    } else {
                        return Err(Error::Config(format!(
                            "numeric edit for '{name}' needs an \"add\" or \"set\" entry"
                        )));
                    }
                }
                other => {
                    return Err(Error::FeatureKindMismatch {
                        feature: name.clone(),
                        message: format!("expected a numeric edit, got {other}"),
                    })
                }
            };
            edits.push((id, edit));
        } else {
            let label = value.as_str().ok_or_else(|| Error::FeatureKindMismatch {
                feature: name.clone(),
                message: format!("expected a category label, got {value}"),
            })?;
            if label == NO_ACTION_TOKEN {
                continue;
            }
            edits.push((id, Edit::SetCat(schema.category(id, label)?)));
        }
    }
    Action::new(edits)
}
