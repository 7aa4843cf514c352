use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{is_context_variable, ConditionError};

pub(crate) const CONDITION_TYPE: &str = "jwt";

/// Context variable nodes read the token from unless told otherwise
pub const DEFAULT_JWT_PARAM: &str = ":jwtToken";

/// Requester must present a JWT signed by `publicKey`
///
/// The token itself is supplied at decryption time through a context variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtCondition {
    jwt_token: String,
    public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expected_issuer: Option<String>,
}

impl JwtCondition {
    /// `public_key` is a PEM-encoded verification key
    pub fn new(
        public_key: impl Into<String>,
        expected_issuer: Option<String>,
    ) -> Result<Self, ConditionError> {
        Self::with_token_param(DEFAULT_JWT_PARAM, public_key, expected_issuer)
    }

    pub fn with_token_param(
        jwt_token: impl Into<String>,
        public_key: impl Into<String>,
        expected_issuer: Option<String>,
    ) -> Result<Self, ConditionError> {
        let condition = Self {
            jwt_token: jwt_token.into(),
            public_key: public_key.into(),
            expected_issuer,
        };
        condition.validate()?;
        Ok(condition)
    }

    pub fn jwt_token(&self) -> &str {
        &self.jwt_token
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn expected_issuer(&self) -> Option<&str> {
        self.expected_issuer.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<(), ConditionError> {
        if !is_context_variable(&self.jwt_token) {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "jwtToken",
                format!("{:?} is not a context variable", self.jwt_token),
            ));
        }
        if !self.public_key.trim_start().starts_with("-----BEGIN") {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "publicKey",
                "expected a PEM-encoded key",
            ));
        }
        if matches!(&self.expected_issuer, Some(issuer) if issuer.is_empty()) {
            return Err(ConditionError::schema(
                CONDITION_TYPE,
                "expectedIssuer",
                "must not be empty when present",
            ));
        }
        Ok(())
    }

    pub(crate) fn collect_context_variables(&self, out: &mut BTreeSet<String>) {
        out.insert(self.jwt_token.clone());
    }
}
