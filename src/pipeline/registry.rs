//! Immutable `(package, function)` → pipeline lookup table.
//!
//! Built once at startup through [`RegistryBuilder`] and shared by
//! reference afterwards. [`SkillRegistry`] exposes no mutating methods, so
//! concurrent lookups need no synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use super::Pipeline;
use crate::models::result::RESERVED_FIELDS;
use crate::{AppError, Result};

/// Frozen skill table.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    packages: HashMap<String, HashMap<String, Arc<Pipeline>>>,
}

impl SkillRegistry {
    /// Start collecting registrations.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolve the pipeline for `(package, function)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownSkill` when nothing is registered for the pair.
    pub fn lookup(&self, package: &str, function: &str) -> Result<Arc<Pipeline>> {
        let Some(functions) = self.packages.get(package) else {
            return Err(AppError::UnknownSkill(format!("package '{package}' is not registered")));
        };

        functions.get(function).map(Arc::clone).ok_or_else(|| {
            let mut available: Vec<&str> = functions.keys().map(String::as_str).collect();
            available.sort_unstable();
            AppError::UnknownSkill(format!(
                "function '{function}' not found in package '{package}' (available: {})",
                available.join(", ")
            ))
        })
    }

    /// Registered package names, sorted.
    #[must_use]
    pub fn packages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Total number of registered `(package, function)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.values().map(HashMap::len).sum()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutable staging area for a [`SkillRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    packages: HashMap<String, HashMap<String, Arc<Pipeline>>>,
}

impl RegistryBuilder {
    /// Register `pipeline` under `(package, function)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pair is already taken, the
    /// pipeline has no stages, or a stage field collides with a reserved
    /// response field or another stage's field.
    pub fn register(
        mut self,
        package: impl Into<String>,
        function: impl Into<String>,
        pipeline: Pipeline,
    ) -> Result<Self> {
        let package = package.into();
        let function = function.into();
        validate_pipeline(&package, &function, &pipeline)?;

        let functions = self.packages.entry(package.clone()).or_default();
        if functions.contains_key(&function) {
            return Err(AppError::Config(format!(
                "skill {package}/{function} registered twice"
            )));
        }
        functions.insert(function, Arc::new(pipeline));
        Ok(self)
    }

    /// Register the same pipeline under several packages.
    ///
    /// # Errors
    ///
    /// Same conditions as [`RegistryBuilder::register`].
    pub fn register_all(
        mut self,
        packages: &[&str],
        function: &str,
        pipeline: &Pipeline,
    ) -> Result<Self> {
        for package in packages {
            self = self.register(*package, function, pipeline.clone())?;
        }
        Ok(self)
    }

    /// Freeze the registrations.
    #[must_use]
    pub fn build(self) -> SkillRegistry {
        SkillRegistry {
            packages: self.packages,
        }
    }
}

fn validate_pipeline(package: &str, function: &str, pipeline: &Pipeline) -> Result<()> {
    if pipeline.is_empty() {
        return Err(AppError::Config(format!(
            "skill {package}/{function} has no stages"
        )));
    }

    let mut seen: Vec<&str> = Vec::with_capacity(pipeline.len());
    for field in pipeline.fields() {
        if field.is_empty() || RESERVED_FIELDS.contains(&field) || seen.contains(&field) {
            return Err(AppError::Config(format!(
                "skill {package}/{function} has invalid stage field '{field}'"
            )));
        }
        seen.push(field);
    }
    Ok(())
}
