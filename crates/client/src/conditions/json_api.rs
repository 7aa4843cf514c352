use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::{collect_context_variables, is_context_variable, ConditionError, ReturnValueTest};

pub(crate) const CONDITION_TYPE: &str = "json-api";

/// A condition over a value extracted from an HTTPS JSON endpoint
///
/// `query` is a JSONPath expression selecting the value to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonApiCondition {
    endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_token: Option<String>,
    return_value_test: ReturnValueTest,
}

impl JsonApiCondition {
    pub fn new(
        endpoint: Url,
        query: Option<String>,
        return_value_test: ReturnValueTest,
    ) -> Result<Self, ConditionError> {
        let condition = Self {
            endpoint,
            query,
            parameters: None,
            authorization_token: None,
            return_value_test,
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Query-string parameters sent with the request; values may be context variables
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Result<Self, ConditionError> {
        self.parameters = Some(parameters);
        self.validate()?;
        Ok(self)
    }

    /// Bearer token read from a context variable at decryption time
    pub fn with_authorization_token(
        mut self,
        context_variable: impl Into<String>,
    ) -> Result<Self, ConditionError> {
        self.authorization_token = Some(context_variable.into());
        self.validate()?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn return_value_test(&self) -> &ReturnValueTest {
        &self.return_value_test
    }

    pub(crate) fn validate(&self) -> Result<(), ConditionError> {
        if self.endpoint.scheme() != "https" {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "endpoint",
                "must be an https URL",
            ));
        }
        if let Some(query) = &self.query {
            if !query.starts_with('$') {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    "query",
                    "must be a JSONPath expression starting with '$'",
                ));
            }
        }
        if let Some(token) = &self.authorization_token {
            if !is_context_variable(token) {
                return Err(ConditionError::schema(
                    CONDITION_TYPE,
                    "authorizationToken",
                    format!("{:?} is not a context variable", token),
                ));
            }
        }
        self.return_value_test.validate(CONDITION_TYPE)
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        if let Some(parameters) = &self.parameters {
            for value in parameters.values() {
                collect_context_variables(value, out);
            }
        }
        if let Some(token) = &self.authorization_token {
            out.insert(token.clone());
        }
        collect_context_variables(&self.return_value_test.value, out);
    }
}
