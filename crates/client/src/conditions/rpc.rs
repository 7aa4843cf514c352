use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{collect_context_variables, is_context_variable, ConditionError, ReturnValueTest};
use crate::chain::Address;

pub(crate) const CONDITION_TYPE: &str = "rpc";

/// JSON-RPC methods nodes are willing to evaluate
pub const RPC_METHODS: &[&str] = &["eth_getBalance"];

/// A condition over the result of a JSON-RPC call, e.g. an account balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCondition {
    chain: u64,
    method: String,
    parameters: Vec<Value>,
    return_value_test: ReturnValueTest,
}

impl RpcCondition {
    pub fn new(
        chain: u64,
        method: impl Into<String>,
        parameters: Vec<Value>,
        return_value_test: ReturnValueTest,
    ) -> Result<Self, ConditionError> {
        let condition = Self {
            chain,
            method: method.into(),
            parameters,
            return_value_test,
        };
        condition.validate()?;
        Ok(condition)
    }

    /// `eth_getBalance(address, "latest")`
    pub fn balance(
        chain: u64,
        address: impl Into<Value>,
        return_value_test: ReturnValueTest,
    ) -> Result<Self, ConditionError> {
        Self::new(
            chain,
            "eth_getBalance",
            vec![address.into(), Value::from("latest")],
            return_value_test,
        )
    }

    pub fn chain(&self) -> u64 {
        self.chain
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn return_value_test(&self) -> &ReturnValueTest {
        &self.return_value_test
    }

    pub(crate) fn validate(&self) -> Result<(), ConditionError> {
        if self.chain == 0 {
            return Err(ConditionError::schema(CONDITION_TYPE, "chain", "must be non-zero"));
        }
        if !RPC_METHODS.contains(&self.method.as_str()) {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "method",
                format!("{:?} is not one of {:?}", self.method, RPC_METHODS),
            ));
        }
        if self.parameters.is_empty() || self.parameters.len() > 2 {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "parameters",
                "expected an address and an optional block identifier",
            ));
        }
        match &self.parameters[0] {
            Value::String(s) if is_context_variable(s) || s.parse::<Address>().is_ok() => {}
            other => {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    "parameters[0]",
                    format!("expected an address or context variable, got {}", other),
                ))
            }
        }
        self.return_value_test.validate(CONDITION_TYPE)
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        for parameter in &self.parameters {
            collect_context_variables(parameter, out);
        }
        collect_context_variables(&self.return_value_test.value, out);
    }
}
