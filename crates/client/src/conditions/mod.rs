//! Access conditions
//!
//! A [`Condition`] is a tree of predicates every node evaluates before releasing
//! its decryption share. Leaves query chains, clocks, tokens and web APIs;
//! [`CompoundCondition`] and [`SequentialCondition`] combine them.
//!
//! Conditions are validated as they are built or parsed, so every value of
//! [`Condition`] is well formed. String values of the form `:name` are context
//! variables, filled in by the decrypting party through a
//! [`ConditionContext`].
//!
//! ```ignore
//! let condition = ContractCondition::erc721_ownership(nft_contract, 3591, 137)?;
//! let expression = ConditionExpression::new(condition.into());
//! let json = expression.to_json()?;
//! assert_eq!(ConditionExpression::from_json(&json)?, expression);
//! ```

mod compound;
pub mod context;
mod contract;
mod expression;
mod json_api;
mod jwt;
mod return_value;
mod rpc;
mod sequential;
mod time;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use compound::{CompoundCondition, Operator, MAX_OPERANDS};
pub use context::{
    AuthProvider, AuthSignature, ConditionContext, ContextError, ContextParameters,
    Eip4361AuthProvider, SingleSignOnEip4361AuthProvider,
};
pub use contract::{ContractCondition, StandardContractType};
pub use expression::{ConditionExpression, SemanticVersion, CONDITION_EXPRESSION_VERSION};
pub use json_api::JsonApiCondition;
pub use jwt::{JwtCondition, DEFAULT_JWT_PARAM};
pub use return_value::{Comparator, ReturnValueTest};
pub use rpc::{RpcCondition, RPC_METHODS};
pub use sequential::{ConditionVariable, SequentialCondition, MAX_VARIABLES, MIN_VARIABLES};
pub use time::TimeCondition;

/// Context variable resolved to the requester's address via a sign-in proof
pub const USER_ADDRESS_PARAM: &str = ":userAddress";
/// Context variable resolved from an existing EIP-4361 sign-in
pub const USER_ADDRESS_EXTERNAL_EIP4361_PARAM: &str = ":userAddressExternalEIP4361";
/// Context variables only an [`AuthProvider`] may satisfy
pub const RESERVED_CONTEXT_PARAMS: &[&str] = &[USER_ADDRESS_PARAM, USER_ADDRESS_EXTERNAL_EIP4361_PARAM];

/// How deep compound/sequential conditions may nest
pub const MAX_NESTED_DEPTH: usize = 2;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConditionError {
    /// A condition does not match its variant's schema
    #[error("invalid {condition_type} condition: `{field}` {reason}")]
    Schema {
        condition_type: &'static str,
        field: String,
        reason: String,
    },
    #[error("malformed condition document: {0}")]
    Json(String),
    #[error("condition expression version {expression} is not supported by this client (version {current})")]
    VersionIncompatible { expression: String, current: String },
    #[error("invalid version string {0:?}, expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),
}

impl ConditionError {
    pub(crate) fn schema(
        condition_type: &'static str,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConditionError::Schema {
            condition_type,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// True for `:name` where `name` is an identifier
pub fn is_context_variable(s: &str) -> bool {
    s.strip_prefix(':').is_some_and(is_identifier)
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Collect every context variable inside a JSON value, descending into arrays and objects
pub(crate) fn collect_context_variables(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) if is_context_variable(s) => {
            out.insert(s.clone());
        }
        Value::Array(items) => items.iter().for_each(|v| collect_context_variables(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_context_variables(v, out)),
        _ => {}
    }
}

/// An access condition
///
/// Serialized with a `conditionType` discriminant. Equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaggedCondition", into = "TaggedCondition")]
pub enum Condition {
    Rpc(RpcCondition),
    Contract(ContractCondition),
    Time(TimeCondition),
    Jwt(JwtCondition),
    JsonApi(JsonApiCondition),
    Compound(CompoundCondition),
    Sequential(SequentialCondition),
}

/// Wire representation, validated on the way into [`Condition`]
#[derive(Serialize, Deserialize)]
#[serde(tag = "conditionType")]
enum TaggedCondition {
    #[serde(rename = "rpc")]
    Rpc(RpcCondition),
    #[serde(rename = "contract")]
    Contract(ContractCondition),
    #[serde(rename = "time")]
    Time(TimeCondition),
    #[serde(rename = "jwt")]
    Jwt(JwtCondition),
    #[serde(rename = "json-api")]
    JsonApi(JsonApiCondition),
    #[serde(rename = "compound")]
    Compound(CompoundCondition),
    #[serde(rename = "sequential")]
    Sequential(SequentialCondition),
}

impl TryFrom<TaggedCondition> for Condition {
    type Error = ConditionError;

    fn try_from(tagged: TaggedCondition) -> Result<Self, Self::Error> {
        let condition = Condition::from_tagged(tagged);
        condition.validate()?;
        Ok(condition)
    }
}

impl Condition {
    /// Unwrap the wire form without validating; the root validates the whole tree
    fn from_tagged(tagged: TaggedCondition) -> Self {
        match tagged {
            TaggedCondition::Rpc(c) => Condition::Rpc(c),
            TaggedCondition::Contract(c) => Condition::Contract(c),
            TaggedCondition::Time(c) => Condition::Time(c),
            TaggedCondition::Jwt(c) => Condition::Jwt(c),
            TaggedCondition::JsonApi(c) => Condition::JsonApi(c),
            TaggedCondition::Compound(c) => Condition::Compound(c),
            TaggedCondition::Sequential(c) => Condition::Sequential(c),
        }
    }
}

/// Deserialize a nested operand, leaving validation to the enclosing root
pub(crate) fn deserialize_operand<'de, D>(deserializer: D) -> Result<Condition, D::Error>
where
    D: serde::Deserializer<'de>,
{
    TaggedCondition::deserialize(deserializer).map(Condition::from_tagged)
}

/// [`deserialize_operand`] over a list
pub(crate) fn deserialize_operands<'de, D>(deserializer: D) -> Result<Vec<Condition>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let tagged = Vec::<TaggedCondition>::deserialize(deserializer)?;
    Ok(tagged.into_iter().map(Condition::from_tagged).collect())
}

impl From<Condition> for TaggedCondition {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Rpc(c) => TaggedCondition::Rpc(c),
            Condition::Contract(c) => TaggedCondition::Contract(c),
            Condition::Time(c) => TaggedCondition::Time(c),
            Condition::Jwt(c) => TaggedCondition::Jwt(c),
            Condition::JsonApi(c) => TaggedCondition::JsonApi(c),
            Condition::Compound(c) => TaggedCondition::Compound(c),
            Condition::Sequential(c) => TaggedCondition::Sequential(c),
        }
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Condition {
                fn from(condition: $ty) -> Self {
                    Condition::$variant(condition)
                }
            }
        )*
    };
}

impl_from_variant! {
    Rpc => RpcCondition,
    Contract => ContractCondition,
    Time => TimeCondition,
    Jwt => JwtCondition,
    JsonApi => JsonApiCondition,
    Compound => CompoundCondition,
    Sequential => SequentialCondition,
}

impl Condition {
    /// The `conditionType` discriminant
    pub fn condition_type(&self) -> &'static str {
        match self {
            Condition::Rpc(_) => rpc::CONDITION_TYPE,
            Condition::Contract(_) => contract::CONDITION_TYPE,
            Condition::Time(_) => time::CONDITION_TYPE,
            Condition::Jwt(_) => jwt::CONDITION_TYPE,
            Condition::JsonApi(_) => json_api::CONDITION_TYPE,
            Condition::Compound(_) => compound::CONDITION_TYPE,
            Condition::Sequential(_) => sequential::CONDITION_TYPE,
        }
    }

    /// Validate the whole tree, including nesting limits and sequence scoping
    pub fn validate(&self) -> Result<(), ConditionError> {
        self.validate_at(1)
    }

    pub(crate) fn validate_at(&self, depth: usize) -> Result<(), ConditionError> {
        match self {
            Condition::Rpc(c) => c.validate(),
            Condition::Contract(c) => c.validate(),
            Condition::Time(c) => c.validate(),
            Condition::Jwt(c) => c.validate(),
            Condition::JsonApi(c) => c.validate(),
            Condition::Compound(_) | Condition::Sequential(_) if depth > MAX_NESTED_DEPTH => {
                Err(ConditionError::schema(
                    self.condition_type(),
                    "operands",
                    format!("nested deeper than {} levels", MAX_NESTED_DEPTH),
                ))
            }
            Condition::Compound(c) => c.validate(depth),
            Condition::Sequential(c) => c.validate(depth),
        }
    }

    /// Every context variable the tree needs at decryption time
    ///
    /// Variables declared by an enclosing [`SequentialCondition`] are resolved by
    /// the nodes and are not included.
    pub fn context_variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_context_variables(&mut out);
        out
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Condition::Rpc(c) => c.collect_context_variables(out),
            Condition::Contract(c) => c.collect_context_variables(out),
            Condition::Time(c) => c.collect_context_variables(out),
            Condition::Jwt(c) => c.collect_context_variables(out),
            Condition::JsonApi(c) => c.collect_context_variables(out),
            Condition::Compound(c) => c.collect_context_variables(out),
            Condition::Sequential(c) => c.collect_context_variables(out),
        }
    }

    /// Whether decrypting requires an authenticated requester address
    pub fn requires_authentication(&self) -> bool {
        self.context_variables()
            .iter()
            .any(|name| RESERVED_CONTEXT_PARAMS.contains(&name.as_str()))
    }

    pub fn to_value(&self) -> Result<Value, ConditionError> {
        serde_json::to_value(self).map_err(|e| ConditionError::Json(e.to_string()))
    }

    /// Parse and validate a condition object
    pub fn from_value(value: Value) -> Result<Self, ConditionError> {
        // keep schema errors structured rather than flattened into serde's message
        let tagged: TaggedCondition =
            serde_json::from_value(value).map_err(|e| ConditionError::Json(e.to_string()))?;
        Condition::try_from(tagged)
    }

    pub fn to_json(&self) -> Result<String, ConditionError> {
        serde_json::to_string(self).map_err(|e| ConditionError::Json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ConditionError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ConditionError::Json(e.to_string()))?;
        Self::from_value(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn nft() -> crate::chain::Address {
        "0x1e988ba4692e52bc4a2eb70c40b8f9c1b2df9b3a".parse().unwrap()
    }

    fn balance(param: &str) -> Condition {
        RpcCondition::balance(137, param, ReturnValueTest::new(Comparator::Gt, 0))
            .unwrap()
            .into()
    }

    fn time_after(ts: u64) -> Condition {
        TimeCondition::new(137, ReturnValueTest::new(Comparator::Ge, ts))
            .unwrap()
            .into()
    }

    #[test]
    fn test_nested_round_trip() {
        let sequence = SequentialCondition::new(vec![
            ConditionVariable::new("balance", balance(":userAddress")),
            ConditionVariable::new(
                "owner",
                ContractCondition::erc721_ownership(nft(), ":nftId", 137).unwrap(),
            ),
        ])
        .unwrap();
        let condition: Condition = CompoundCondition::or(vec![
            sequence.into(),
            CompoundCondition::not(time_after(1_700_000_000)).unwrap().into(),
        ])
        .unwrap()
        .into();

        let object = condition.to_value().unwrap();
        assert_eq!(object["conditionType"], "compound");
        assert_eq!(object["operands"][0]["conditionType"], "sequential");

        let recovered = Condition::from_value(object).unwrap();
        assert_eq!(recovered, condition);
        assert_eq!(Condition::from_json(&condition.to_json().unwrap()).unwrap(), condition);
    }

    #[test]
    fn test_property_order_irrelevant() {
        let a = json!({"conditionType": "time", "chain": 1, "method": "blocktime",
                       "returnValueTest": {"comparator": ">", "value": 5}});
        let b = json!({"returnValueTest": {"value": 5, "comparator": ">"},
                       "method": "blocktime", "chain": 1, "conditionType": "time"});
        assert_eq!(
            Condition::from_value(a).unwrap(),
            Condition::from_value(b).unwrap()
        );
    }

    #[test]
    fn test_required_parameters_through_compound() {
        let condition: Condition = CompoundCondition::and(vec![
            balance(":userAddress"),
            ContractCondition::erc721_ownership(nft(), ":nftId", 137)
                .unwrap()
                .into(),
        ])
        .unwrap()
        .into();

        let expected: BTreeSet<String> = [":userAddress", ":nftId"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(condition.context_variables(), expected);
        assert!(condition.requires_authentication());
    }

    #[test]
    fn test_sequential_variables_are_not_context_parameters() {
        let sequence = SequentialCondition::new(vec![
            ConditionVariable::new("firstBalance", balance(":userAddress")),
            ConditionVariable::new(
                "second",
                RpcCondition::balance(
                    137,
                    ":userAddress",
                    ReturnValueTest::new(Comparator::Gt, ":firstBalance"),
                )
                .unwrap(),
            ),
        ])
        .unwrap();

        let variables = Condition::from(sequence).context_variables();
        assert!(variables.contains(":userAddress"));
        assert!(!variables.contains(":firstBalance"));
    }

    #[test]
    fn test_sequential_forward_reference_rejected() {
        let result = SequentialCondition::new(vec![
            ConditionVariable::new(
                "first",
                RpcCondition::balance(
                    137,
                    ":userAddress",
                    ReturnValueTest::new(Comparator::Gt, ":second"),
                )
                .unwrap(),
            ),
            ConditionVariable::new("second", balance(":userAddress")),
        ]);
        assert!(matches!(result, Err(ConditionError::Schema { .. })));
    }

    #[test]
    fn test_sequential_duplicate_names_rejected() {
        let result = SequentialCondition::new(vec![
            ConditionVariable::new("same", balance(":userAddress")),
            ConditionVariable::new("same", time_after(1)),
        ]);
        assert!(result.is_err());

        let too_short = SequentialCondition::new(vec![ConditionVariable::new("only", time_after(1))]);
        assert!(too_short.is_err());
    }

    #[test]
    fn test_compound_operand_counts() {
        assert!(CompoundCondition::and(vec![time_after(1)]).is_err());
        assert!(CompoundCondition::new(Operator::Not, vec![time_after(1), time_after(2)]).is_err());
        assert!(CompoundCondition::or(vec![time_after(1); 6]).is_err());
        assert!(CompoundCondition::or(vec![time_after(1); 5]).is_ok());
    }

    #[test]
    fn test_nesting_depth_limit() {
        let inner: Condition = CompoundCondition::and(vec![time_after(1), time_after(2)])
            .unwrap()
            .into();
        let middle: Condition = CompoundCondition::or(vec![inner, time_after(3)])
            .unwrap()
            .into();
        assert!(CompoundCondition::and(vec![middle, time_after(4)]).is_err());
    }

    #[test]
    fn test_invalid_operand_fails_whole_tree() {
        let raw = json!({
            "conditionType": "compound",
            "operator": "and",
            "operands": [
                {"conditionType": "time", "chain": 1, "method": "blocktime",
                 "returnValueTest": {"comparator": ">", "value": 0}},
                {"conditionType": "rpc", "chain": 1, "method": "eth_sendTransaction",
                 "parameters": [":userAddress"],
                 "returnValueTest": {"comparator": ">", "value": 0}},
            ],
        });
        match Condition::from_value(raw) {
            Err(ConditionError::Schema {
                condition_type: "rpc",
                field,
                ..
            }) => assert_eq!(field, "method"),
            other => panic!("expected an rpc schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_sequence_step_error_is_structured() {
        let raw = json!({
            "conditionType": "compound",
            "operator": "or",
            "operands": [
                {"conditionType": "time", "chain": 1, "method": "blocktime",
                 "returnValueTest": {"comparator": ">", "value": 0}},
                {"conditionType": "sequential", "conditionVariables": [
                    {"varName": "first", "condition": {"conditionType": "time", "chain": 1,
                     "method": "blocktime", "returnValueTest": {"comparator": ">", "value": 0}}},
                    {"varName": "second", "condition": {"conditionType": "time", "chain": 1,
                     "method": "blockhash", "returnValueTest": {"comparator": ">", "value": 0}}},
                ]},
            ],
        });
        assert!(matches!(
            Condition::from_value(raw),
            Err(ConditionError::Schema { condition_type: "time", .. })
        ));
    }

    #[test]
    fn test_nesting_depth_checked_from_root_when_parsed() {
        let leaf = json!({"conditionType": "time", "chain": 1, "method": "blocktime",
                          "returnValueTest": {"comparator": ">", "value": 0}});
        let inner = json!({"conditionType": "compound", "operator": "and", "operands": [leaf, leaf]});
        let middle = json!({"conditionType": "compound", "operator": "or", "operands": [inner, leaf]});
        let outer = json!({"conditionType": "compound", "operator": "and", "operands": [middle, leaf]});

        assert!(Condition::from_value(middle).is_ok());
        assert!(matches!(
            Condition::from_value(outer),
            Err(ConditionError::Schema { condition_type: "compound", .. })
        ));
    }

    #[test]
    fn test_unknown_condition_type_rejected() {
        let result = Condition::from_value(json!({"conditionType": "telepathy"}));
        assert!(matches!(result, Err(ConditionError::Json(_))));
    }

    #[test]
    fn test_context_variable_syntax() {
        assert!(is_context_variable(":userAddress"));
        assert!(is_context_variable(":_x1"));
        assert!(!is_context_variable("userAddress"));
        assert!(!is_context_variable(":1abc"));
        assert!(!is_context_variable(":"));
        assert!(!is_context_variable(":bad-name"));
    }
}
