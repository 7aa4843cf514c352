use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Condition, ConditionError};

/// Version of the expression format this client writes
pub const CONDITION_EXPRESSION_VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);

/// `MAJOR.MINOR.PATCH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a client at `self` can read documents written at `other`
    ///
    /// Only the major version gates compatibility; newer minor and patch
    /// versions are accepted.
    pub fn can_read(&self, other: &SemanticVersion) -> bool {
        other.major <= self.major
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConditionError::InvalidVersion(s.to_string());
        let mut parts = s.split('.');
        let mut next = || -> Result<u32, ConditionError> {
            parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())
        };
        let version = SemanticVersion::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A versioned condition document: `{"version": "1.0.0", "condition": {...}}`
///
/// Every deserialize path goes through [`ConditionExpression::from_value`], so
/// the version is checked before the condition is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct ConditionExpression {
    version: SemanticVersion,
    condition: Condition,
}

impl ConditionExpression {
    /// Wrap a condition at the current format version
    pub fn new(condition: Condition) -> Self {
        Self {
            version: CONDITION_EXPRESSION_VERSION,
            condition,
        }
    }

    pub fn version(&self) -> SemanticVersion {
        self.version
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn into_condition(self) -> Condition {
        self.condition
    }

    pub fn to_value(&self) -> Result<Value, ConditionError> {
        serde_json::to_value(self).map_err(|e| ConditionError::Json(e.to_string()))
    }

    /// Parse an expression object, checking the version before the condition
    ///
    /// A document from a newer major version fails with
    /// [`ConditionError::VersionIncompatible`] even if its condition would
    /// parse, since its schema may mean something different.
    pub fn from_value(value: Value) -> Result<Self, ConditionError> {
        Self::from_value_for(value, &CONDITION_EXPRESSION_VERSION)
    }

    pub(crate) fn from_value_for(
        mut value: Value,
        current: &SemanticVersion,
    ) -> Result<Self, ConditionError> {
        let object = value
            .as_object_mut()
            .ok_or_else(|| ConditionError::Json("expected a JSON object".to_string()))?;

        let version = match object.get("version") {
            Some(Value::String(s)) => s.parse::<SemanticVersion>()?,
            Some(other) => return Err(ConditionError::InvalidVersion(other.to_string())),
            None => return Err(ConditionError::Json("missing field `version`".to_string())),
        };
        if !current.can_read(&version) {
            return Err(ConditionError::VersionIncompatible {
                expression: version.to_string(),
                current: current.to_string(),
            });
        }

        let condition = object
            .remove("condition")
            .ok_or_else(|| ConditionError::Json("missing field `condition`".to_string()))?;
        Ok(Self {
            version,
            condition: Condition::from_value(condition)?,
        })
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

impl TryFrom<Value> for ConditionExpression {
    type Error = ConditionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Condition> for ConditionExpression {
    fn from(condition: Condition) -> Self {
        Self::new(condition)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conditions::{Comparator, ReturnValueTest, TimeCondition};
    use serde_json::json;

    fn expression() -> ConditionExpression {
        ConditionExpression::new(
            TimeCondition::new(137, ReturnValueTest::new(Comparator::Gt, 100))
                .unwrap()
                .into(),
        )
    }

    fn with_version(version: &str) -> Value {
        let mut value = expression().to_value().unwrap();
        value["version"] = json!(version);
        value
    }

    #[test]
    fn test_round_trip() {
        let expr = expression();
        let json = expr.to_json().unwrap();
        assert!(json.contains("\"version\":\"1.0.0\""));
        assert_eq!(ConditionExpression::from_json(&json).unwrap(), expr);
    }

    #[test]
    fn test_newer_major_rejected() {
        let err = ConditionExpression::from_value(with_version("2.0.0")).unwrap_err();
        assert_eq!(
            err,
            ConditionError::VersionIncompatible {
                expression: "2.0.0".to_string(),
                current: "1.0.0".to_string(),
            }
        );
    }

    #[test]
    fn test_deserialize_impl_rejects_newer_major() {
        let err = serde_json::from_value::<ConditionExpression>(with_version("2.0.0")).unwrap_err();
        assert!(err.to_string().contains("2.0.0"));

        let parsed: ConditionExpression = serde_json::from_value(with_version("1.2.0")).unwrap();
        assert_eq!(parsed.version(), SemanticVersion::new(1, 2, 0));
    }

    #[test]
    fn test_newer_minor_accepted() {
        let expr = ConditionExpression::from_value(with_version("1.9.0")).unwrap();
        assert_eq!(expr.version(), SemanticVersion::new(1, 9, 0));
        assert_eq!(expr.condition(), expression().condition());
    }

    #[test]
    fn test_current_version_gates_on_major_only() {
        let current = SemanticVersion::new(1, 4, 2);
        assert!(ConditionExpression::from_value_for(with_version("1.0.0"), &current).is_ok());
        assert!(ConditionExpression::from_value_for(with_version("1.99.7"), &current).is_ok());
        assert!(ConditionExpression::from_value_for(with_version("2.0.0"), &current).is_err());
    }

    #[test]
    fn test_version_checked_before_condition() {
        let value = json!({"version": "3.0.0", "condition": {"conditionType": "future"}});
        assert!(matches!(
            ConditionExpression::from_value(value),
            Err(ConditionError::VersionIncompatible { .. })
        ));
    }

    #[test]
    fn test_malformed_version() {
        for bad in ["1.0", "1.0.0.0", "one.two.three", ""] {
            assert!(matches!(
                ConditionExpression::from_value(with_version(bad)),
                Err(ConditionError::InvalidVersion(_))
            ));
        }
    }
}
