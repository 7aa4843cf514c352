use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ConditionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// Expected-value check nodes apply to a condition's result
///
/// `index` selects one element when the call returns a tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnValueTest {
    pub comparator: Comparator,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl ReturnValueTest {
    pub fn new(comparator: Comparator, value: impl Into<Value>) -> Self {
        Self {
            comparator,
            value: value.into(),
            index: None,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn validate(&self, condition_type: &'static str) -> Result<(), ConditionError> {
        if self.value.is_null() {
            return Err(ConditionError::schema(
                condition_type,
                "returnValueTest.value",
                "must not be null",
            ));
        }
        Ok(())
    }
}
