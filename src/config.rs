//! Typed, string-keyed option bag consumed once at engine construction
//! (spec §4.C).

use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Recognized config keys (spec §4.C). Engines ignore keys they don't
/// consume; unrecognized keys are retained as opaque entries (spec §6).
pub mod keys {
    pub const PATH: &str = "path";
    pub const SIZE: &str = "size";
    pub const FORCE_CREATE: &str = "force_create";
    pub const COMPARATOR: &str = "comparator";
    pub const OID: &str = "oid";
}

/// A boxed, type-erased config object value, for the `object`/`object ref`
/// variants of spec §3 ("owned object with deleter, object-via-getter").
pub type ConfigObject = Arc<dyn std::any::Any + Send + Sync>;

#[derive(Clone)]
enum ConfigValue {
    Int64(i64),
    UInt64(u64),
    String(String),
    Data(Vec<u8>),
    Object(ConfigObject),
}

impl ConfigValue {
    fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Int64(_) => "int64",
            ConfigValue::UInt64(_) => "uint64",
            ConfigValue::String(_) => "string",
            ConfigValue::Data(_) => "data",
            ConfigValue::Object(_) => "object",
        }
    }
}

/// An insertion-order-irrelevant mapping from option name to typed value.
///
/// Consumed exactly once at engine construction; the registry (§4.H) hands
/// ownership of a `Config` to the engine constructor it invokes.
#[derive(Clone, Default)]
pub struct Config {
    entries: HashMap<String, ConfigValue>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            entries: HashMap::new(),
        }
    }

    pub fn set_int64(&mut self, key: impl Into<String>, value: i64) {
        self.entries.insert(key.into(), ConfigValue::Int64(value));
    }

    pub fn set_uint64(&mut self, key: impl Into<String>, value: u64) {
        self.entries.insert(key.into(), ConfigValue::UInt64(value));
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), ConfigValue::String(value.into()));
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries
            .insert(key.into(), ConfigValue::Data(value.into()));
    }

    pub fn set_object(&mut self, key: impl Into<String>, value: ConfigObject) {
        self.entries.insert(key.into(), ConfigValue::Object(value));
    }

    fn get(&self, key: &str) -> Result<&ConfigValue> {
        self.entries
            .get(key)
            .ok_or(EngineError::NotFound)
    }

    pub fn get_int64(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            ConfigValue::Int64(v) => Ok(*v),
            ConfigValue::UInt64(v) => i64::try_from(*v)
                .map_err(|_| EngineError::ConfigType(format!("{} overflows i64", key))),
            other => Err(EngineError::ConfigType(format!(
                "{} is {}, not an integer",
                key,
                other.type_name()
            ))),
        }
    }

    pub fn get_uint64(&self, key: &str) -> Result<u64> {
        match self.get(key)? {
            ConfigValue::UInt64(v) => Ok(*v),
            ConfigValue::Int64(v) => u64::try_from(*v)
                .map_err(|_| EngineError::ConfigType(format!("{} is negative", key))),
            other => Err(EngineError::ConfigType(format!(
                "{} is {}, not an integer",
                key,
                other.type_name()
            ))),
        }
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            ConfigValue::String(v) => Ok(v.as_str()),
            other => Err(EngineError::ConfigType(format!(
                "{} is {}, not a string",
                key,
                other.type_name()
            ))),
        }
    }

    pub fn get_data(&self, key: &str) -> Result<&[u8]> {
        match self.get(key)? {
            ConfigValue::Data(v) => Ok(v.as_slice()),
            other => Err(EngineError::ConfigType(format!(
                "{} is {}, not data",
                key,
                other.type_name()
            ))),
        }
    }

    pub fn get_object(&self, key: &str) -> Result<&ConfigObject> {
        match self.get(key)? {
            ConfigValue::Object(v) => Ok(v),
            other => Err(EngineError::ConfigType(format!(
                "{} is {}, not an object",
                key,
                other.type_name()
            ))),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Convenience accessor for `force_create`, defaulting to `false` when
    /// absent (spec §4.C).
    pub fn force_create(&self) -> Result<bool> {
        match self.get_uint64(keys::FORCE_CREATE) {
            Ok(v) => Ok(v != 0),
            Err(EngineError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_types() {
        let mut cfg = Config::new();
        cfg.set_string(keys::PATH, "/tmp/pool");
        cfg.set_uint64(keys::SIZE, 1 << 20);
        assert_eq!(cfg.get_string(keys::PATH).unwrap(), "/tmp/pool");
        assert_eq!(cfg.get_uint64(keys::SIZE).unwrap(), 1 << 20);
    }

    #[test]
    fn missing_key_is_not_found() {
        let cfg = Config::new();
        assert!(matches!(
            cfg.get_string(keys::PATH),
            Err(EngineError::NotFound)
        ));
    }

    #[test]
    fn type_mismatch_is_config_type_error() {
        let mut cfg = Config::new();
        cfg.set_string(keys::SIZE, "not a number");
        assert!(matches!(
            cfg.get_uint64(keys::SIZE),
            Err(EngineError::ConfigType(_))
        ));
    }

    #[test]
    fn signed_unsigned_conversion_is_range_checked() {
        let mut cfg = Config::new();
        cfg.set_int64("neg", -1);
        assert!(matches!(
            cfg.get_uint64("neg"),
            Err(EngineError::ConfigType(_))
        ));

        let mut cfg = Config::new();
        cfg.set_uint64("big", u64::MAX);
        assert!(matches!(cfg.get_int64("big"), Err(EngineError::ConfigType(_))));
    }

    #[test]
    fn force_create_defaults_to_false() {
        let cfg = Config::new();
        assert_eq!(cfg.force_create().unwrap(), false);
    }
}
