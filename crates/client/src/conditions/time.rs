use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{collect_context_variables, ConditionError, ReturnValueTest};

pub(crate) const CONDITION_TYPE: &str = "time";

pub const BLOCKTIME_METHOD: &str = "blocktime";

/// A condition over the latest block timestamp of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCondition {
    chain: u64,
    method: String,
    return_value_test: ReturnValueTest,
}

impl TimeCondition {
    pub fn new(chain: u64, return_value_test: ReturnValueTest) -> Result<Self, ConditionError> {
        let condition = Self {
            chain,
            method: BLOCKTIME_METHOD.to_string(),
            return_value_test,
        };
        condition.validate()?;
        Ok(condition)
    }

    pub fn chain(&self) -> u64 {
        self.chain
    }

    pub fn return_value_test(&self) -> &ReturnValueTest {
        &self.return_value_test
    }

    pub(crate) fn validate(&self) -> Result<(), ConditionError> {
        if self.chain == 0 {
            return Err(ConditionError::schema(CONDITION_TYPE, "chain", "must be non-zero"));
        }
        if self.method != BLOCKTIME_METHOD {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "method",
                format!("expected {:?}, got {:?}", BLOCKTIME_METHOD, self.method),
            ));
        }
        self.return_value_test.validate(CONDITION_TYPE)
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        collect_context_variables(&self.return_value_test.value, out);
    }
}
