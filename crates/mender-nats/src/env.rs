//! Environment access behind a trait so configuration loading can be tested
//! without touching the process environment.

use std::env::VarError;

#[cfg(any(test, feature = "test-support"))]
use std::{cell::RefCell, collections::HashMap};

/// Read a single environment variable.
///
/// Does **not** require `Send + Sync`; configuration is read once at startup.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;

    /// Read `key` and parse it, falling back to `default` when the variable is
    /// unset. Unparseable values also fall back, with a warning.
    fn parsed_or<T>(&self, key: &str, default: T) -> T
    where
        T: std::str::FromStr + std::fmt::Debug,
    {
        match self.var(key) {
            Ok(raw) => match raw.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(key, value = %raw, ?default, "Unparseable env var, using default");
                    default
                }
            },
            Err(_) => default,
        }
    }
}

/// Reads the process environment through `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }
}

/// Won't touch the global process environment.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct InMemoryEnv {
    vars: RefCell<HashMap<String, String>>,
}

#[cfg(any(test, feature = "test-support"))]
impl InMemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.borrow_mut().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.vars.borrow_mut().remove(key);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ReadEnv for InMemoryEnv {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.vars
            .borrow()
            .get(key)
            .cloned()
            .ok_or(VarError::NotPresent)
    }
}
