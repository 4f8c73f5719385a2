//! Future configuration.
//!
//! One [`FutureConfig`] is installed per interpreter; `future(...)` and
//! `defer(...)` options override a copy of it for a single creation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::strategy::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Eager,
    Lazy,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Re-raise the stored error on every read.
    #[default]
    Throw,
    /// Hand the stored error back as a condition value.
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnReference {
    #[default]
    Ignore,
    Warning,
    Error,
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eager" => Ok(StrategyKind::Eager),
            "lazy" => Ok(StrategyKind::Lazy),
            "sequential" => Ok(StrategyKind::Sequential),
            _ => Err(Error::evaluation(format!(
                "unknown strategy {s:?} (expected eager, lazy or sequential)"
            ))),
        }
    }
}

impl FromStr for OnError {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "throw" => Ok(OnError::Throw),
            "return" => Ok(OnError::Return),
            _ => Err(Error::evaluation(format!(
                "unknown error policy {s:?} (expected throw or return)"
            ))),
        }
    }
}

impl FromStr for OnReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(OnReference::Ignore),
            "warning" => Ok(OnReference::Warning),
            "error" => Ok(OnReference::Error),
            _ => Err(Error::evaluation(format!(
                "unknown reference policy {s:?} (expected ignore, warning or error)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FutureConfig {
    pub strategy: StrategyKind,
    /// For `Sequential`: defer evaluation like `Lazy` instead of running now.
    pub lazy: bool,
    /// Evaluate in an isolated child scope (true) or in the calling scope.
    pub local: bool,
    pub on_error: OnError,
    pub on_reference: OnReference,
    /// Packages attached in addition to the inferred ones.
    pub packages: Vec<String>,
    /// Externally supplied strategy; takes precedence over `strategy`.
    #[serde(skip)]
    pub custom: Option<Plan>,
}

impl Default for FutureConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Eager,
            lazy: false,
            local: true,
            on_error: OnError::Throw,
            on_reference: OnReference::Ignore,
            packages: Vec::new(),
            custom: None,
        }
    }
}

impl FutureConfig {
    pub fn from_json_str(src: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    /// The strategy futures created under this config go through.
    pub fn plan(&self) -> Plan {
        match &self.custom {
            Some(plan) => plan.clone(),
            None => Plan::builtin(self.strategy, self.lazy),
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self.custom = None;
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.custom = Some(plan);
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_on_reference(mut self, policy: OnReference) -> Self {
        self.on_reference = policy;
        self
    }

    /// Apply one `name: value` option given as a string (strategy, onError,
    /// onReference, packages) or boolean (local, lazy).
    pub fn set_option(&mut self, name: &str, value: OptionValue<'_>) -> Result<()> {
        match (name, value) {
            ("strategy", OptionValue::Str(s)) => {
                self.strategy = parse_enum(name, s)?;
                self.custom = None;
            }
            ("local", OptionValue::Bool(b)) => self.local = b,
            ("lazy", OptionValue::Bool(b)) => self.lazy = b,
            ("on_error" | "onError", OptionValue::Str(s)) => self.on_error = parse_enum(name, s)?,
            ("on_reference" | "onReference", OptionValue::Str(s)) => {
                self.on_reference = parse_enum(name, s)?
            }
            ("packages", OptionValue::Str(s)) => self.packages.extend(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            ),
            (_, value) => {
                return Err(Error::evaluation(format!(
                    "invalid future option `{name}: {value}`"
                )))
            }
        }
        Ok(())
    }
}

/// Option value as written in source.
#[derive(Debug, Clone, Copy)]
pub enum OptionValue<'a> {
    Str(&'a str),
    Bool(bool),
}

impl std::fmt::Display for OptionValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Str(s) => write!(f, "{s:?}"),
            OptionValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

fn parse_enum<T: FromStr>(name: &str, s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| Error::evaluation(format!("invalid value {s:?} for future option `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = FutureConfig::default();
        assert_eq!(c.strategy, StrategyKind::Eager);
        assert!(c.local);
        assert_eq!(c.on_error, OnError::Throw);
        assert_eq!(c.on_reference, OnReference::Ignore);
        assert!(c.packages.is_empty());
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let c = FutureConfig::from_json_str(
            r#"{ "strategy": "lazy", "onReference": "error", "packages": ["math"] }"#,
        )
        .unwrap();
        assert_eq!(c.strategy, StrategyKind::Lazy);
        assert_eq!(c.on_reference, OnReference::Error);
        assert_eq!(c.packages, vec!["math".to_string()]);
        assert!(c.local);
    }

    #[test]
    fn set_option_parses_values() {
        let mut c = FutureConfig::default();
        c.set_option("strategy", OptionValue::Str("Lazy")).unwrap();
        c.set_option("local", OptionValue::Bool(false)).unwrap();
        c.set_option("onError", OptionValue::Str("return")).unwrap();
        c.set_option("packages", OptionValue::Str("math, io")).unwrap();
        assert_eq!(c.strategy, StrategyKind::Lazy);
        assert!(!c.local);
        assert_eq!(c.on_error, OnError::Return);
        assert_eq!(c.packages, vec!["math".to_string(), "io".to_string()]);
    }

    #[test]
    fn set_option_rejects_unknown_values() {
        let mut c = FutureConfig::default();
        assert!(c.set_option("strategy", OptionValue::Str("cluster")).is_err());
        assert!(c.set_option("local", OptionValue::Str("yes")).is_err());
        assert!(c.set_option("colour", OptionValue::Bool(true)).is_err());
    }

    #[test]
    fn policy_names_parse_case_insensitively() {
        assert_eq!("SEQUENTIAL".parse::<StrategyKind>().unwrap(), StrategyKind::Sequential);
        assert_eq!("Return".parse::<OnError>().unwrap(), OnError::Return);
        assert_eq!("warning".parse::<OnReference>().unwrap(), OnReference::Warning);
        let err = "loud".parse::<OnReference>().unwrap_err();
        assert!(err.message.contains("ignore, warning or error"), "{}", err.message);
    }
}
