//! Runtime values for the context variables a condition references
//!
//! A [`ConditionContext`] is built fresh for each decryption attempt: the
//! caller registers literal values and auth providers, then calls
//! [`ConditionContext::to_context_parameters`] once to resolve every variable
//! the condition needs. Building takes `&mut self` and resolving takes
//! `&self`, so registration cannot race resolution.

mod auth;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use auth::{
    AuthError, AuthProvider, AuthScheme, AuthSignature, Eip4361AuthProvider,
    SingleSignOnEip4361AuthProvider,
};

use super::{
    is_context_variable, Condition, ConditionExpression, RESERVED_CONTEXT_PARAMS,
};
use crate::message_kit::ThresholdMessageKit;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    /// Every required parameter that has neither a value nor a provider
    #[error("missing context parameters: {}", names.join(", "))]
    MissingContextParameters { names: Vec<String> },
    #[error("{0} is reserved for authentication and cannot take a literal value")]
    ReservedParameter(String),
    #[error("{0} is not a reserved authentication parameter")]
    NotAnAuthParameter(String),
    #[error("invalid context parameter name {0:?}, expected :name")]
    InvalidParameterName(String),
    #[error("auth provider for {parameter} failed: {source}")]
    AuthProvider {
        parameter: String,
        #[source]
        source: AuthError,
    },
    #[error("context parameters could not be encoded: {0}")]
    Json(String),
}

/// Resolved context: parameter name to literal value or auth payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContextParameters(BTreeMap<String, Value>);

impl ContextParameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    /// JSON document sent to nodes alongside a decryption request
    pub fn to_json(&self) -> Result<String, ContextError> {
        serde_json::to_string(&self.0).map_err(|e| ContextError::Json(e.to_string()))
    }
}

/// Builder for the context of one decryption attempt
#[derive(Debug, Clone)]
pub struct ConditionContext {
    required: BTreeSet<String>,
    custom: BTreeMap<String, Value>,
    providers: BTreeMap<String, Arc<dyn AuthProvider>>,
}

impl ConditionContext {
    pub fn new(expression: &ConditionExpression) -> Self {
        Self::from_condition(expression.condition())
    }

    pub fn from_condition(condition: &Condition) -> Self {
        Self {
            required: Self::required_parameters_of(condition),
            custom: BTreeMap::new(),
            providers: BTreeMap::new(),
        }
    }

    /// Context for the conditions embedded in a message kit
    pub fn from_message_kit(kit: &ThresholdMessageKit) -> Self {
        Self::new(kit.acp().conditions())
    }

    /// Every `:name` a condition tree needs at decryption time
    pub fn required_parameters_of(condition: &Condition) -> BTreeSet<String> {
        condition.context_variables()
    }

    pub fn required_parameters(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Whether any reserved authentication parameter is required
    pub fn requires_authentication(&self) -> bool {
        self.required
            .iter()
            .any(|name| RESERVED_CONTEXT_PARAMS.contains(&name.as_str()))
    }

    /// Register an auth provider for a reserved parameter
    pub fn add_auth_provider(
        &mut self,
        parameter: impl Into<String>,
        provider: Arc<dyn AuthProvider>,
    ) -> Result<&mut Self, ContextError> {
        let parameter = parameter.into();
        if !RESERVED_CONTEXT_PARAMS.contains(&parameter.as_str()) {
            return Err(ContextError::NotAnAuthParameter(parameter));
        }
        if !self.required.contains(&parameter) {
            tracing::debug!(%parameter, "auth provider registered for a parameter the condition does not use");
        }
        self.providers.insert(parameter, provider);
        Ok(self)
    }

    /// Register literal values for custom parameters
    ///
    /// Names must be well-formed context variables and not reserved. Values for
    /// parameters the condition does not reference are accepted but never sent.
    pub fn add_custom_context_parameter_values<I, K>(
        &mut self,
        values: I,
    ) -> Result<&mut Self, ContextError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: Vec<(String, Value)> = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (name, _) in &values {
            if RESERVED_CONTEXT_PARAMS.contains(&name.as_str()) {
                return Err(ContextError::ReservedParameter(name.clone()));
            }
            if !is_context_variable(name) {
                return Err(ContextError::InvalidParameterName(name.clone()));
            }
        }
        self.custom.extend(values);
        Ok(self)
    }

    /// Resolve every required parameter
    ///
    /// Missing parameters are reported together. Auth providers run
    /// concurrently; the first failing one (in parameter order) is returned.
    pub async fn to_context_parameters(&self) -> Result<ContextParameters, ContextError> {
        let mut resolved = BTreeMap::new();
        let mut pending = Vec::new();
        let mut missing = Vec::new();

        for name in &self.required {
            if let Some(value) = self.custom.get(name) {
                resolved.insert(name.clone(), value.clone());
            } else if let Some(provider) = self.providers.get(name) {
                pending.push((name.clone(), provider.clone()));
            } else {
                missing.push(name.clone());
            }
        }

        if !missing.is_empty() {
            return Err(ContextError::MissingContextParameters { names: missing });
        }

        tracing::debug!(
            literals = resolved.len(),
            providers = pending.len(),
            "resolving condition context"
        );

        let results = futures::future::join_all(pending.iter().map(|(_, provider)| {
            let provider = provider.clone();
            async move { provider.auth_signature().await }
        }))
        .await;

        for ((parameter, _), result) in pending.into_iter().zip(results) {
            let proof = result.map_err(|source| ContextError::AuthProvider {
                parameter: parameter.clone(),
                source,
            })?;
            let value =
                serde_json::to_value(&proof).map_err(|e| ContextError::Json(e.to_string()))?;
            resolved.insert(parameter, value);
        }

        Ok(ContextParameters(resolved))
    }
}
