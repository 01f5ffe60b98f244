//! Environment lookup capability.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An opaque resource handle published by the hosting environment.
pub type Resource = Arc<dyn Any + Send + Sync>;

/// Errors returned by an environment lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// A required entry is absent.
    #[error("required environment entry `{name}` is missing")]
    Missing { name: String },
}

/// Read access to named strings and resources.
///
/// A missing *required* entry is an error; a missing optional entry is `Ok(None)`.
pub trait EnvironmentLookup: Send + Sync {
    fn lookup_env_string(&self, name: &str, required: bool) -> Result<Option<String>, LookupError>;

    fn lookup_resource(&self, name: &str, required: bool) -> Result<Option<Resource>, LookupError>;
}

fn absent<T>(name: &str, required: bool) -> Result<Option<T>, LookupError> {
    if required {
        Err(LookupError::Missing { name: name.to_string() })
    } else {
        Ok(None)
    }
}

/// In-memory environment.
#[derive(Clone, Default)]
pub struct MapEnvironment {
    strings: HashMap<String, String>,
    resources: HashMap<String, Resource>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_string(name, value);
        self
    }

    pub fn with_resource<T: Any + Send + Sync>(mut self, name: impl Into<String>, resource: T) -> Self {
        self.insert_resource(name, resource);
        self
    }

    pub fn insert_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(name.into(), value.into());
    }

    pub fn insert_resource<T: Any + Send + Sync>(&mut self, name: impl Into<String>, resource: T) {
        self.resources.insert(name.into(), Arc::new(resource));
    }
}

impl EnvironmentLookup for MapEnvironment {
    fn lookup_env_string(&self, name: &str, required: bool) -> Result<Option<String>, LookupError> {
        match self.strings.get(name) {
            Some(value) => Ok(Some(value.clone())),
            None => absent(name, required),
        }
    }

    fn lookup_resource(&self, name: &str, required: bool) -> Result<Option<Resource>, LookupError> {
        match self.resources.get(name) {
            Some(resource) => Ok(Some(resource.clone())),
            None => absent(name, required),
        }
    }
}

impl fmt::Debug for MapEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapEnvironment")
            .field("strings", &self.strings)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_vs_optional_missing() {
        let env = MapEnvironment::new();

        assert_eq!(env.lookup_env_string("x", false), Ok(None));
        assert_eq!(
            env.lookup_env_string("x", true),
            Err(LookupError::Missing { name: "x".into() })
        );
        assert!(env.lookup_resource("r", false).unwrap().is_none());
        assert!(env.lookup_resource("r", true).is_err());
    }

    #[test]
    fn test_resource_downcast() {
        let env = MapEnvironment::new().with_resource("n", 42u32);
        let resource = env.lookup_resource("n", true).unwrap().unwrap();

        assert_eq!(resource.downcast_ref::<u32>(), Some(&42));
        assert!(resource.downcast_ref::<String>().is_none());
    }
}
