//! Engine registry / factory (spec §4.H).
//!
//! A process-wide mapping from engine name to a constructor that takes
//! ownership of a [`Config`] and returns a boxed [`Engine`]. The registry
//! is the only place that knows the concrete engine types; everything
//! downstream uses the `Engine` trait. Two engines are registered by
//! default, `"btree"` (spec §4.E) and `"cmap"` (spec §4.F), named after
//! the original project's `stree`/`cmap` engine identifiers.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::btree::BTreeEngine;
use crate::cmap::CMapEngine;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{EngineError, Result};

type EngineCtor = Box<dyn Fn(Config) -> Result<Box<dyn Engine>> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<&'static str, EngineCtor>>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, EngineCtor> = HashMap::new();
    map.insert(
        "btree",
        Box::new(|cfg| BTreeEngine::open(cfg).map(|e| Box::new(e) as Box<dyn Engine>)),
    );
    map.insert(
        "cmap",
        Box::new(|cfg| CMapEngine::open(cfg).map(|e| Box::new(e) as Box<dyn Engine>)),
    );
    RwLock::new(map)
});

/// Registers (or replaces) the constructor for `name`. Exposed so
/// embedders can add engines beyond the two built-ins (spec §4.H, §9
/// "Polymorphism": "any additional engine registered with the factory").
pub fn register_engine(
    name: &'static str,
    ctor: impl Fn(Config) -> Result<Box<dyn Engine>> + Send + Sync + 'static,
) {
    REGISTRY.write().unwrap().insert(name, Box::new(ctor));
}

/// Opens an engine by name, handing it ownership of `config`.
///
/// `Err(WrongEngine)` if `name` is not registered.
pub fn open(name: &str, config: Config) -> Result<Box<dyn Engine>> {
    log::debug!("opening engine '{}'", name);
    let registry = REGISTRY.read().unwrap();
    match registry.get(name) {
        Some(ctor) => ctor(config),
        None => Err(EngineError::WrongEngine(format!(
            "no engine registered under name '{}'",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_engine_name_is_wrong_engine() {
        let result = open("nonexistent", Config::new());
        assert!(matches!(result, Err(EngineError::WrongEngine(_))));
    }
}
