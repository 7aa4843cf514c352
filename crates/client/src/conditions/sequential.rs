use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{is_identifier, Condition, ConditionError};

pub(crate) const CONDITION_TYPE: &str = "sequential";

/// Variable count limits for a sequence
pub const MIN_VARIABLES: usize = 2;
pub const MAX_VARIABLES: usize = 5;

/// A named step of a [`SequentialCondition`]
///
/// Later steps refer to this step's result as `:<varName>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionVariable {
    var_name: String,
    #[serde(deserialize_with = "super::deserialize_operand")]
    condition: Condition,
}

impl ConditionVariable {
    pub fn new(var_name: impl Into<String>, condition: impl Into<Condition>) -> Self {
        Self {
            var_name: var_name.into(),
            condition: condition.into(),
        }
    }

    pub fn var_name(&self) -> &str {
        &self.var_name
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    fn context_variable(&self) -> String {
        format!(":{}", self.var_name)
    }
}

/// Ordered conditions whose results feed later conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialCondition {
    condition_variables: Vec<ConditionVariable>,
}

impl SequentialCondition {
    pub fn new(condition_variables: Vec<ConditionVariable>) -> Result<Self, ConditionError> {
        let condition = Self {
            condition_variables,
        };
        Condition::Sequential(condition.clone()).validate()?;
        Ok(condition)
    }

    pub fn condition_variables(&self) -> &[ConditionVariable] {
        &self.condition_variables
    }

    pub(crate) fn validate(&self, depth: usize) -> Result<(), ConditionError> {
        let count = self.condition_variables.len();
        if !(MIN_VARIABLES..=MAX_VARIABLES).contains(&count) {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "conditionVariables",
                format!(
                    "expected {} to {} variables, got {}",
                    MIN_VARIABLES, MAX_VARIABLES, count
                ),
            ));
        }

        let mut names = BTreeSet::new();
        for (i, variable) in self.condition_variables.iter().enumerate() {
            if !is_identifier(&variable.var_name) {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    format!("conditionVariables[{}].varName", i),
                    format!("{:?} is not a valid variable name", variable.var_name),
                ));
            }
            if !names.insert(variable.var_name.as_str()) {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    format!("conditionVariables[{}].varName", i),
                    format!("{:?} is declared more than once", variable.var_name),
                ));
            }
        }

        // a step may only see the steps before it
        for (i, variable) in self.condition_variables.iter().enumerate() {
            let referenced = variable.condition.context_variables();
            if let Some(later) = self.condition_variables[i..]
                .iter()
                .find(|v| referenced.contains(&v.context_variable()))
            {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    format!("conditionVariables[{}].condition", i),
                    format!(
                        "references {} before it is declared",
                        later.context_variable()
                    ),
                ));
            }
            variable.condition.validate_at(depth + 1)?;
        }
        Ok(())
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        let declared: BTreeSet<String> = self
            .condition_variables
            .iter()
            .map(ConditionVariable::context_variable)
            .collect();
        for variable in &self.condition_variables {
            out.extend(
                variable
                    .condition
                    .context_variables()
                    .into_iter()
                    .filter(|name| !declared.contains(name)),
            );
        }
    }
}
