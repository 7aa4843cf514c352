use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Condition, ConditionError};

pub(crate) const CONDITION_TYPE: &str = "compound";

/// Operand limit for `and` / `or`
pub const MAX_OPERANDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
    Not,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("and"),
            Operator::Or => f.write_str("or"),
            Operator::Not => f.write_str("not"),
        }
    }
}

/// Boolean combination of conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundCondition {
    operator: Operator,
    #[serde(deserialize_with = "super::deserialize_operands")]
    operands: Vec<Condition>,
}

impl CompoundCondition {
    pub fn new(operator: Operator, operands: Vec<Condition>) -> Result<Self, ConditionError> {
        let condition = Self { operator, operands };
        Condition::Compound(condition.clone()).validate()?;
        Ok(condition)
    }

    pub fn and(operands: Vec<Condition>) -> Result<Self, ConditionError> {
        Self::new(Operator::And, operands)
    }

    pub fn or(operands: Vec<Condition>) -> Result<Self, ConditionError> {
        Self::new(Operator::Or, operands)
    }

    pub fn not(operand: Condition) -> Result<Self, ConditionError> {
        Self::new(Operator::Not, vec![operand])
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operands(&self) -> &[Condition] {
        &self.operands
    }

    pub(crate) fn validate(&self, depth: usize) -> Result<(), ConditionError> {
        let count = self.operands.len();
        let valid = match self.operator {
            Operator::Not => count == 1,
            Operator::And | Operator::Or => (2..=MAX_OPERANDS).contains(&count),
        };
        if !valid {
            let expected = match self.operator {
                Operator::Not => "exactly 1".to_string(),
                _ => format!("2 to {}", MAX_OPERANDS),
            };
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "operands",
                format!(
                    "operator {} takes {} operands, got {}",
                    self.operator, expected, count
                ),
            ));
        }

        for operand in &self.operands {
            operand.validate_at(depth + 1)?;
        }
        Ok(())
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        for operand in &self.operands {
            operand.collect_context_variables(out);
        }
    }
}
