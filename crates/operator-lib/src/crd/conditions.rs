//! Status conditions keyed by type

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three phase conditions managed on an Intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Solver,
    NamespaceOffloading,
    Deploy,
}

impl ConditionType {
    /// Evaluation order within one reconcile cycle
    pub const ORDERED: [ConditionType; 3] = [
        ConditionType::Solver,
        ConditionType::NamespaceOffloading,
        ConditionType::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Solver => "Solver",
            ConditionType::NamespaceOffloading => "NamespaceOffloading",
            ConditionType::Deploy => "Deploy",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// Generation of the object this condition was last derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: condition_type.as_str().to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation: None,
            last_transition_time: Utc::now(),
        }
    }

    pub fn with_observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Conditions list with at most one entry per type
///
/// Serialized as a plain list; insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn find(&self, condition_type: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == condition_type)
    }

    /// Insert or merge a condition, returning whether anything changed
    ///
    /// The transition time of an existing entry only moves when its status
    /// flips; reason, message and observed generation are always taken from
    /// the incoming condition.
    pub fn set(&mut self, condition: Condition) -> bool {
        let Some(existing) = self.0.iter_mut().find(|c| c.type_ == condition.type_) else {
            self.0.push(condition);
            return true;
        };

        let mut changed = false;

        if existing.status != condition.status {
            existing.status = condition.status;
            existing.last_transition_time = condition.last_transition_time;
            changed = true;
        }
        if existing.reason != condition.reason {
            existing.reason = condition.reason;
            changed = true;
        }
        if existing.message != condition.message {
            existing.message = condition.message;
            changed = true;
        }
        if existing.observed_generation != condition.observed_generation {
            existing.observed_generation = condition.observed_generation;
            changed = true;
        }

        changed
    }

    pub fn remove(&mut self, condition_type: &str) -> Option<Condition> {
        let index = self.0.iter().position(|c| c.type_ == condition_type)?;
        Some(self.0.remove(index))
    }
}
