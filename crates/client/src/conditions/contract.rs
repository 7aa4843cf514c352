use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    collect_context_variables, Comparator, ConditionError, ReturnValueTest, USER_ADDRESS_PARAM,
};
use crate::chain::Address;

pub(crate) const CONDITION_TYPE: &str = "contract";

/// Token standards nodes know the ABI for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardContractType {
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "ERC721")]
    Erc721,
}

impl StandardContractType {
    /// View methods callable without supplying an ABI
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            StandardContractType::Erc20 => &["balanceOf"],
            StandardContractType::Erc721 => &["balanceOf", "ownerOf"],
        }
    }
}

impl fmt::Display for StandardContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StandardContractType::Erc20 => f.write_str("ERC20"),
            StandardContractType::Erc721 => f.write_str("ERC721"),
        }
    }
}

/// A condition over the return value of a contract view call
///
/// Either `standardContractType` or `functionAbi` tells the node how to encode
/// the call; exactly one must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCondition {
    contract_address: Address,
    chain: u64,
    method: String,
    parameters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    standard_contract_type: Option<StandardContractType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_abi: Option<Value>,
    return_value_test: ReturnValueTest,
}

impl ContractCondition {
    /// Build a condition against a standard token contract
    pub fn standard(
        contract_address: Address,
        chain: u64,
        standard_contract_type: StandardContractType,
        method: impl Into<String>,
        parameters: Vec<Value>,
        return_value_test: ReturnValueTest,
    ) -> Result<Self, ConditionError> {
        let condition = Self {
            contract_address,
            chain,
            method: method.into(),
            parameters,
            standard_contract_type: Some(standard_contract_type),
            function_abi: None,
            return_value_test,
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Build a condition against an arbitrary contract method described by its ABI fragment
    pub fn with_abi(
        contract_address: Address,
        chain: u64,
        function_abi: Value,
        parameters: Vec<Value>,
        return_value_test: ReturnValueTest,
    ) -> Result<Self, ConditionError> {
        let method = function_abi
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let condition = Self {
            contract_address,
            chain,
            method,
            parameters,
            standard_contract_type: None,
            function_abi: Some(function_abi),
            return_value_test,
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Requester must own `token_id`: `ownerOf(tokenId) == :userAddress`
    pub fn erc721_ownership(
        contract_address: Address,
        token_id: impl Into<Value>,
        chain: u64,
    ) -> Result<Self, ConditionError> {
        Self::standard(
            contract_address,
            chain,
            StandardContractType::Erc721,
            "ownerOf",
            vec![token_id.into()],
            ReturnValueTest::new(Comparator::Eq, USER_ADDRESS_PARAM),
        )
    }

    /// Check the requester's ERC721 balance, `> 0` when no test is given
    pub fn erc721_balance(
        contract_address: Address,
        chain: u64,
        return_value_test: Option<ReturnValueTest>,
    ) -> Result<Self, ConditionError> {
        Self::standard(
            contract_address,
            chain,
            StandardContractType::Erc721,
            "balanceOf",
            vec![Value::from(USER_ADDRESS_PARAM)],
            return_value_test.unwrap_or_else(|| ReturnValueTest::new(Comparator::Gt, 0)),
        )
    }

    /// Check the requester's ERC20 balance, `> 0` when no test is given
    pub fn erc20_balance(
        contract_address: Address,
        chain: u64,
        return_value_test: Option<ReturnValueTest>,
    ) -> Result<Self, ConditionError> {
        Self::standard(
            contract_address,
            chain,
            StandardContractType::Erc20,
            "balanceOf",
            vec![Value::from(USER_ADDRESS_PARAM)],
            return_value_test.unwrap_or_else(|| ReturnValueTest::new(Comparator::Gt, 0)),
        )
    }

    pub fn contract_address(&self) -> &Address {
        &self.contract_address
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

    pub fn standard_contract_type(&self) -> Option<StandardContractType> {
        self.standard_contract_type
    }

    pub fn return_value_test(&self) -> &ReturnValueTest {
        &self.return_value_test
    }

    pub(crate) fn validate(&self) -> Result<(), ConditionError> {
        if self.chain == 0 {
            return Err(ConditionError::schema(CONDITION_TYPE, "chain", "must be non-zero"));
        }
        if self.method.is_empty() {
            return Err(ConditionError::schema(CONDITION_TYPE, "method", "must not be empty"));
        }

        match (&self.standard_contract_type, &self.function_abi) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    "standardContractType",
                    "exactly one of standardContractType or functionAbi is required",
                ))
            }
            (Some(standard), None) => {
                if !standard.methods().contains(&self.method.as_str()) {
                    return Err(ConditionError::schema(
                        CONDITION_TYPE,
                        "method",
                        format!("{:?} is not a {} method", self.method, standard),
                    ));
                }
            }
            (None, Some(abi)) => self.validate_abi(abi)?,
        }

        self.return_value_test.validate(CONDITION_TYPE)
    }

    fn validate_abi(&self, abi: &Value) -> Result<(), ConditionError> {
        let field = |reason: &str| ConditionError::schema(CONDITION_TYPE, "functionAbi", reason);

        if abi.get("type").and_then(Value::as_str) != Some("function") {
            return Err(field("type must be \"function\""));
        }
        if abi.get("name").and_then(Value::as_str) != Some(self.method.as_str()) {
            return Err(field("name must match method"));
        }
        match abi.get("stateMutability").and_then(Value::as_str) {
            Some("view") | Some("pure") => {}
            _ => return Err(field("stateMutability must be view or pure")),
        }
        let inputs = abi
            .get("inputs")
            .and_then(Value::as_array)
            .ok_or_else(|| field("inputs must be an array"))?;
        if inputs.len() != self.parameters.len() {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "parameters",
                format!(
                    "abi declares {} inputs but {} parameters were given",
                    inputs.len(),
                    self.parameters.len()
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        for parameter in &self.parameters {
            collect_context_variables(parameter, out);
        }
        collect_context_variables(&self.return_value_test.value, out);
    }
}
