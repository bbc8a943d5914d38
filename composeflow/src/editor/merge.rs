//! Deep merge of JSON documents driven by a merge schema.
//!
//! Schemas use the JSON-merge-schema vocabulary:
//!
//! ```json
//! {
//!   "mergeStrategy": "objectMerge",
//!   "properties": {
//!     "plugins": { "mergeStrategy": "arrayMergeById", "mergeOptions": { "idRef": "name" } }
//!   },
//!   "additionalProperties": { "mergeStrategy": "overwrite" }
//! }
//! ```
//!
//! Without a schema, objects merge key by key and everything else in the
//! new document replaces the existing value. An array strategy declared on
//! an object applies to the arrays beneath it.

use crate::errors::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Default key identifying array items under `arrayMergeById`.
pub const DEFAULT_ID_REF: &str = "id";

/// How one node of the new document is combined with the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    /// The new value replaces the existing one.
    Overwrite,
    /// New array items are appended to the existing array.
    Append,
    /// Objects are merged key by key.
    ObjectMerge,
    /// The existing value is kept.
    Discard,
    /// Array items are matched by an id field and merged.
    ArrayMergeById,
}

impl MergeStrategy {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "overwrite" => Some(Self::Overwrite),
            "append" => Some(Self::Append),
            "objectMerge" => Some(Self::ObjectMerge),
            "discard" => Some(Self::Discard),
            "arrayMergeById" => Some(Self::ArrayMergeById),
            _ => None,
        }
    }

    fn is_array_strategy(self) -> bool {
        matches!(self, Self::Append | Self::ArrayMergeById)
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => write!(f, "overwrite"),
            Self::Append => write!(f, "append"),
            Self::ObjectMerge => write!(f, "objectMerge"),
            Self::Discard => write!(f, "discard"),
            Self::ArrayMergeById => write!(f, "arrayMergeById"),
        }
    }
}

/// A parsed merge schema node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeRule {
    strategy: Option<MergeStrategy>,
    id_ref: Option<String>,
    properties: BTreeMap<String, MergeRule>,
    additional: Option<Box<MergeRule>>,
    items: Option<Box<MergeRule>>,
}

impl MergeRule {
    /// A rule with only a strategy.
    #[must_use]
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..Self::default()
        }
    }

    /// Shorthand for `{"mergeStrategy": "append"}`.
    #[must_use]
    pub fn append() -> Self {
        Self::new(MergeStrategy::Append)
    }

    /// Sets the id field for `arrayMergeById`.
    #[must_use]
    pub fn with_id_ref(mut self, id_ref: impl Into<String>) -> Self {
        self.id_ref = Some(id_ref.into());
        self
    }

    /// Adds a rule for one property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, rule: MergeRule) -> Self {
        self.properties.insert(key.into(), rule);
        self
    }

    /// Sets the rule for properties without their own rule.
    #[must_use]
    pub fn with_additional(mut self, rule: MergeRule) -> Self {
        self.additional = Some(Box::new(rule));
        self
    }

    /// The declared strategy, if any.
    #[must_use]
    pub fn strategy(&self) -> Option<MergeStrategy> {
        self.strategy
    }

    /// Parses a merge schema document.
    pub fn from_schema(schema: &Value) -> Result<Self> {
        Ok(Self::parse_node(schema, "#")?)
    }

    fn parse_node(schema: &Value, at: &str) -> Result<Self, ValidationError> {
        let node = schema.as_object().ok_or_else(|| {
            ValidationError::new(format!("merge schema at {at} must be an object"))
        })?;

        let strategy = match node.get("mergeStrategy") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(MergeStrategy::parse(name).ok_or_else(|| {
                ValidationError::new(format!("unknown merge strategy '{name}' at {at}"))
            })?),
            Some(_) => {
                return Err(ValidationError::new(format!(
                    "mergeStrategy at {at} must be a string"
                )))
            }
        };

        let id_ref = node
            .get("mergeOptions")
            .and_then(|o| o.get("idRef"))
            .and_then(Value::as_str)
            .map(String::from);

        let mut properties = BTreeMap::new();
        if let Some(props) = node.get("properties").and_then(Value::as_object) {
            for (key, sub) in props {
                properties.insert(key.clone(), Self::parse_node(sub, &format!("{at}/properties/{key}"))?);
            }
        }

        let additional = match node.get("additionalProperties") {
            Some(sub @ Value::Object(_)) => Some(Box::new(Self::parse_node(
                sub,
                &format!("{at}/additionalProperties"),
            )?)),
            _ => None,
        };

        let items = match node.get("items") {
            Some(sub @ Value::Object(_)) => {
                Some(Box::new(Self::parse_node(sub, &format!("{at}/items"))?))
            }
            _ => None,
        };

        Ok(Self {
            strategy,
            id_ref,
            properties,
            additional,
            items,
        })
    }

    fn property(&self, key: &str) -> Option<&MergeRule> {
        self.properties
            .get(key)
            .or(self.additional.as_deref())
    }
}

/// Array strategy handed down from an enclosing object rule.
#[derive(Debug, Clone, Copy)]
struct ArrayPolicy<'a> {
    strategy: MergeStrategy,
    id_ref: &'a str,
}

/// Merges `head` into `base`.
///
/// Keys present only in `base` are kept. Conflicts resolve per `rule`;
/// without one, `head` wins and arrays are replaced.
#[must_use]
pub fn merge_documents(base: &Value, head: &Value, rule: Option<&MergeRule>) -> Value {
    merge_node(Some(base), head, rule, None).unwrap_or_else(|| base.clone())
}

fn merge_node(
    base: Option<&Value>,
    head: &Value,
    rule: Option<&MergeRule>,
    inherited: Option<ArrayPolicy<'_>>,
) -> Option<Value> {
    let declared = rule.and_then(MergeRule::strategy);

    match head {
        Value::Object(head_map) => match declared {
            Some(MergeStrategy::Overwrite) => Some(head.clone()),
            Some(MergeStrategy::Discard) => base.cloned(),
            Some(strategy) if strategy.is_array_strategy() => {
                let policy = ArrayPolicy {
                    strategy,
                    id_ref: id_ref_of(rule, inherited),
                };
                Some(merge_objects(base, head_map, rule, Some(policy)))
            }
            _ => Some(merge_objects(base, head_map, rule, inherited)),
        },
        Value::Array(head_items) => {
            let strategy = match declared {
                Some(s) if s != MergeStrategy::ObjectMerge => s,
                _ => inherited.map_or(MergeStrategy::Overwrite, |p| p.strategy),
            };
            match strategy {
                MergeStrategy::Discard => base.cloned(),
                MergeStrategy::Append => Some(append(base, head_items)),
                MergeStrategy::ArrayMergeById => Some(merge_by_id(
                    base,
                    head_items,
                    rule,
                    id_ref_of(rule, inherited),
                    inherited,
                )),
                MergeStrategy::Overwrite | MergeStrategy::ObjectMerge => Some(head.clone()),
            }
        }
        _ => match declared {
            Some(MergeStrategy::Discard) => base.cloned(),
            _ => Some(head.clone()),
        },
    }
}

fn id_ref_of<'a>(rule: Option<&'a MergeRule>, inherited: Option<ArrayPolicy<'a>>) -> &'a str {
    rule.and_then(|r| r.id_ref.as_deref())
        .or(inherited.map(|p| p.id_ref))
        .unwrap_or(DEFAULT_ID_REF)
}

fn merge_objects(
    base: Option<&Value>,
    head: &Map<String, Value>,
    rule: Option<&MergeRule>,
    inherited: Option<ArrayPolicy<'_>>,
) -> Value {
    let mut merged = match base {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };

    for (key, head_value) in head {
        let sub_rule = rule.and_then(|r| r.property(key));
        if let Some(value) = merge_node(merged.get(key), head_value, sub_rule, inherited) {
            merged.insert(key.clone(), value);
        }
    }
    Value::Object(merged)
}

fn append(base: Option<&Value>, head: &[Value]) -> Value {
    let mut items = match base {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    items.extend(head.iter().cloned());
    Value::Array(items)
}

fn item_id<'v>(item: &'v Value, id_ref: &str) -> Option<&'v Value> {
    if id_ref.starts_with('/') {
        item.pointer(id_ref)
    } else {
        item.get(id_ref)
    }
}

fn merge_by_id(
    base: Option<&Value>,
    head: &[Value],
    rule: Option<&MergeRule>,
    id_ref: &str,
    inherited: Option<ArrayPolicy<'_>>,
) -> Value {
    let mut items = match base {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    let item_rule = rule.and_then(|r| r.items.as_deref());

    for head_item in head {
        let position = item_id(head_item, id_ref).and_then(|id| {
            items
                .iter()
                .position(|existing| item_id(existing, id_ref) == Some(id))
        });
        match position {
            Some(index) => {
                if let Some(merged) = merge_node(Some(&items[index]), head_item, item_rule, inherited) {
                    items[index] = merged;
                }
            }
            None => items.push(head_item.clone()),
        }
    }
    Value::Array(items)
}
