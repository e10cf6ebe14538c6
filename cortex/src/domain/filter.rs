// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Filter Tree Builder
//!
//! Callers express search filters as a [`FilterExpr`] tree of `And` / `Or` /
//! `Not` groups over key/value leaves. Before a backend sees it the tree is
//! normalized into a [`BackendFilter`]:
//!
//! - built-in keys (scope ids, timestamps, text) stay first-class fields;
//! - every other key becomes a [`BackendFilter::Metadata`] leaf, rendered
//!   under a single `metadata` namespace;
//! - the scope id is injected as a top-level `And` leaf, so every query is
//!   scoped to one owner;
//! - single-child `And` / `Or` groups are collapsed.
//!
//! Operand/operator mismatches are rejected while building. Nothing is
//! silently dropped.
//!
//! The JSON form accepted by [`FilterExpr::from_json`] is the map shape most
//! memory stores use:
//!
//! ```json
//! {"AND": [{"topic": "openings"}, {"score": {"gte": 7}}, {"NOT": [{"draft": true}]}]}
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DEFAULT_SCOPE_KEY: &str = "user_id";

/// Keys that backends treat as first-class columns rather than payload.
pub const BUILTIN_KEYS: &[&str] = &[
    "user_id",
    "agent_id",
    "run_id",
    "actor_id",
    "created_at",
    "updated_at",
    "text",
    "memory",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Contains,
    Icontains,
    /// Key present with any value (`"*"` in the JSON form).
    Exists,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::Nin => "nin",
            FilterOp::Contains => "contains",
            FilterOp::Icontains => "icontains",
            FilterOp::Exists => "exists",
        }
    }

    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "eq" => FilterOp::Eq,
            "ne" => FilterOp::Ne,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "in" => FilterOp::In,
            "nin" => FilterOp::Nin,
            "contains" => FilterOp::Contains,
            "icontains" => FilterOp::Icontains,
            "exists" => FilterOp::Exists,
            _ => return None,
        })
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterExpr {
    Leaf { key: String, op: FilterOp, value: Value },
    And { children: Vec<FilterExpr> },
    Or { children: Vec<FilterExpr> },
    Not { children: Vec<FilterExpr> },
}

impl FilterExpr {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(key, FilterOp::Eq, value)
    }

    pub fn leaf(key: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        FilterExpr::Leaf { key: key.into(), op, value: value.into() }
    }

    pub fn and(children: Vec<FilterExpr>) -> Self {
        FilterExpr::And { children }
    }

    pub fn or(children: Vec<FilterExpr>) -> Self {
        FilterExpr::Or { children }
    }

    pub fn not(children: Vec<FilterExpr>) -> Self {
        FilterExpr::Not { children }
    }

    /// Parse the map-shaped JSON form. An object with several keys is an
    /// implicit `And` of its entries, in key order.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let object = value
            .as_object()
            .ok_or_else(|| FilterError::Malformed(format!("expected an object, got {value}")))?;
        if object.is_empty() {
            return Err(FilterError::EmptyGroup("AND"));
        }

        let mut parts = Vec::with_capacity(object.len());
        for (key, entry) in object {
            parts.push(Self::entry_from_json(key, entry)?);
        }

        Ok(if parts.len() == 1 { parts.remove(0) } else { FilterExpr::And { children: parts } })
    }

    fn entry_from_json(key: &str, entry: &Value) -> Result<Self, FilterError> {
        let group = |name: &'static str| -> Result<Vec<FilterExpr>, FilterError> {
            let items = entry
                .as_array()
                .ok_or_else(|| FilterError::Malformed(format!("{name} expects a list")))?;
            items.iter().map(Self::from_json).collect()
        };

        match key {
            "AND" => Ok(FilterExpr::And { children: group("AND")? }),
            "OR" => Ok(FilterExpr::Or { children: group("OR")? }),
            "NOT" => Ok(FilterExpr::Not { children: group("NOT")? }),
            _ => match entry {
                Value::String(s) if s == "*" => Ok(Self::leaf(key, FilterOp::Exists, Value::Null)),
                Value::Object(ops) => match (ops.len(), ops.iter().next()) {
                    (1, Some((op_name, operand))) => {
                        let op = FilterOp::parse(op_name)
                            .ok_or_else(|| FilterError::UnknownOperator(op_name.clone()))?;
                        Ok(Self::leaf(key, op, operand.clone()))
                    }
                    _ => Err(FilterError::Malformed(format!(
                        "operator object for '{key}' must hold exactly one operator"
                    ))),
                },
                other => Ok(Self::leaf(key, FilterOp::Eq, other.clone())),
            },
        }
    }
}

/// Backend-ready filter produced by [`FilterTreeBuilder::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendFilter {
    Field { key: String, op: FilterOp, value: Value },
    Metadata { key: String, op: FilterOp, value: Value },
    And { children: Vec<BackendFilter> },
    Or { children: Vec<BackendFilter> },
    Not { children: Vec<BackendFilter> },
}

impl BackendFilter {
    /// Render in the map-shaped query language vector stores accept.
    pub fn to_json(&self) -> Value {
        fn condition(op: FilterOp, value: &Value) -> Value {
            match op {
                FilterOp::Eq => value.clone(),
                FilterOp::Exists => Value::String("*".into()),
                other => json!({ other.as_str(): value }),
            }
        }

        match self {
            BackendFilter::Field { key, op, value } => json!({ key.as_str(): condition(*op, value) }),
            BackendFilter::Metadata { key, op, value } => {
                json!({ "metadata": { key.as_str(): condition(*op, value) } })
            }
            BackendFilter::And { children } => {
                json!({ "AND": children.iter().map(BackendFilter::to_json).collect::<Vec<_>>() })
            }
            BackendFilter::Or { children } => {
                json!({ "OR": children.iter().map(BackendFilter::to_json).collect::<Vec<_>>() })
            }
            BackendFilter::Not { children } => {
                json!({ "NOT": children.iter().map(BackendFilter::to_json).collect::<Vec<_>>() })
            }
        }
    }

    /// Evaluate against one record. Used by stores that filter in process.
    /// `Not` is true when none of its children match.
    pub fn matches(&self, fields: &Map<String, Value>, metadata: &Map<String, Value>) -> bool {
        match self {
            BackendFilter::Field { key, op, value } => leaf_matches(fields.get(key), *op, value),
            BackendFilter::Metadata { key, op, value } => leaf_matches(metadata.get(key), *op, value),
            BackendFilter::And { children } => children.iter().all(|c| c.matches(fields, metadata)),
            BackendFilter::Or { children } => children.iter().any(|c| c.matches(fields, metadata)),
            BackendFilter::Not { children } => !children.iter().any(|c| c.matches(fields, metadata)),
        }
    }

    /// The scope value injected by the builder, if present at the top level.
    pub fn scope_value(&self, scope_key: &str) -> Option<&str> {
        let BackendFilter::And { children } = self else {
            return None;
        };
        children.iter().find_map(|child| match child {
            BackendFilter::Field { key, op: FilterOp::Eq, value } if key == scope_key => value.as_str(),
            _ => None,
        })
    }
}

fn leaf_matches(actual: Option<&Value>, op: FilterOp, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return matches!(op, FilterOp::Ne | FilterOp::Nin);
    };

    match op {
        FilterOp::Exists => !actual.is_null(),
        FilterOp::Eq => actual == expected,
        FilterOp::Ne => actual != expected,
        FilterOp::In => expected.as_array().is_some_and(|items| items.contains(actual)),
        FilterOp::Nin => expected.as_array().is_some_and(|items| !items.contains(actual)),
        FilterOp::Contains => match (actual, expected.as_str()) {
            (Value::String(s), Some(needle)) => s.contains(needle),
            (Value::Array(items), Some(needle)) => items.iter().any(|i| i.as_str() == Some(needle)),
            _ => false,
        },
        FilterOp::Icontains => match (actual.as_str(), expected.as_str()) {
            (Some(s), Some(needle)) => s.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let ordering = match (actual, expected) {
                (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
                _ => None,
            };
            match ordering {
                Some(ord) => match op {
                    FilterOp::Gt => ord.is_gt(),
                    FilterOp::Gte => ord.is_ge(),
                    FilterOp::Lt => ord.is_lt(),
                    _ => ord.is_le(),
                },
                None => false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("{0} group must contain at least one condition")]
    EmptyGroup(&'static str),

    #[error("filter key must not be empty")]
    EmptyKey,

    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{op}' on '{key}' {reason}")]
    InvalidOperand { key: String, op: FilterOp, reason: &'static str },

    #[error("filter may not override the scope key '{0}'")]
    ScopeOverride(String),

    #[error("scope id must not be empty")]
    MissingScope,

    #[error("malformed filter: {0}")]
    Malformed(String),
}

/// Converts caller filters into scoped, backend-ready trees.
#[derive(Debug, Clone)]
pub struct FilterTreeBuilder {
    scope_key: String,
    builtin_keys: BTreeSet<String>,
}

impl Default for FilterTreeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE_KEY)
    }
}

impl FilterTreeBuilder {
    pub fn new(scope_key: impl Into<String>) -> Self {
        let scope_key = scope_key.into();
        let mut builtin_keys: BTreeSet<String> = BUILTIN_KEYS.iter().map(|k| k.to_string()).collect();
        builtin_keys.insert(scope_key.clone());
        Self { scope_key, builtin_keys }
    }

    pub fn with_builtin_key(mut self, key: impl Into<String>) -> Self {
        self.builtin_keys.insert(key.into());
        self
    }

    pub fn scope_key(&self) -> &str {
        &self.scope_key
    }

    pub fn is_builtin(&self, key: &str) -> bool {
        self.builtin_keys.contains(key)
    }

    pub fn normalize(&self, expr: Option<&FilterExpr>, scope_id: &str) -> Result<BackendFilter, FilterError> {
        let scope_id = scope_id.trim();
        if scope_id.is_empty() {
            return Err(FilterError::MissingScope);
        }

        let mut children = vec![BackendFilter::Field {
            key: self.scope_key.clone(),
            op: FilterOp::Eq,
            value: Value::String(scope_id.to_string()),
        }];

        if let Some(expr) = expr {
            match self.translate(expr, scope_id)? {
                // The caller's own AND merges into the scoping AND.
                BackendFilter::And { children: inner } => children.extend(inner),
                other => children.push(other),
            }
        }

        Ok(BackendFilter::And { children })
    }

    fn translate(&self, expr: &FilterExpr, scope_id: &str) -> Result<BackendFilter, FilterError> {
        match expr {
            FilterExpr::Leaf { key, op, value } => self.translate_leaf(key, *op, value, scope_id),
            FilterExpr::And { children } => {
                let children = self.translate_group("AND", children, scope_id)?;
                Ok(collapse(children, |children| BackendFilter::And { children }))
            }
            FilterExpr::Or { children } => {
                let children = self.translate_group("OR", children, scope_id)?;
                Ok(collapse(children, |children| BackendFilter::Or { children }))
            }
            FilterExpr::Not { children } => {
                let children = self.translate_group("NOT", children, scope_id)?;
                Ok(BackendFilter::Not { children })
            }
        }
    }

    fn translate_group(
        &self,
        name: &'static str,
        children: &[FilterExpr],
        scope_id: &str,
    ) -> Result<Vec<BackendFilter>, FilterError> {
        if children.is_empty() {
            return Err(FilterError::EmptyGroup(name));
        }
        children.iter().map(|child| self.translate(child, scope_id)).collect()
    }

    fn translate_leaf(&self, key: &str, op: FilterOp, value: &Value, scope_id: &str) -> Result<BackendFilter, FilterError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(FilterError::EmptyKey);
        }
        check_operand(key, op, value)?;

        if key == self.scope_key && !(op == FilterOp::Eq && value.as_str() == Some(scope_id)) {
            return Err(FilterError::ScopeOverride(key.to_string()));
        }

        let value = if op == FilterOp::Exists { Value::Null } else { value.clone() };
        if self.is_builtin(key) {
            Ok(BackendFilter::Field { key: key.to_string(), op, value })
        } else {
            Ok(BackendFilter::Metadata { key: key.to_string(), op, value })
        }
    }
}

fn collapse(mut children: Vec<BackendFilter>, group: impl FnOnce(Vec<BackendFilter>) -> BackendFilter) -> BackendFilter {
    if children.len() == 1 {
        children.remove(0)
    } else {
        group(children)
    }
}

fn check_operand(key: &str, op: FilterOp, value: &Value) -> Result<(), FilterError> {
    let invalid = |reason| Err(FilterError::InvalidOperand { key: key.to_string(), op, reason });

    match op {
        FilterOp::Eq | FilterOp::Ne => match value {
            Value::Object(_) => invalid("cannot compare against an object"),
            _ => Ok(()),
        },
        FilterOp::In | FilterOp::Nin => match value.as_array() {
            Some(items) if items.is_empty() => invalid("requires a non-empty list"),
            Some(items) if items.iter().any(|i| i.is_object() || i.is_array()) => {
                invalid("list items must be scalars")
            }
            Some(_) => Ok(()),
            None => invalid("requires a list"),
        },
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => match value {
            Value::Number(_) | Value::String(_) => Ok(()),
            _ => invalid("requires a number or string"),
        },
        FilterOp::Contains | FilterOp::Icontains => match value {
            Value::String(s) if !s.is_empty() => Ok(()),
            _ => invalid("requires a non-empty string"),
        },
        FilterOp::Exists => Ok(()),
    }
}
