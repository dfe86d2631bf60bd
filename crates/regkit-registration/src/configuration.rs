//! Configuration source: parameter map plus command-line arguments.
//!
//! Parameters hold one value per resolution level where that makes sense;
//! lookups take an `entry` (usually the level) and fall back to a default
//! entry. Component-specific overrides use the component label as a prefix,
//! e.g. `Metric1Weight` before `Weight`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use regkit_core::ParameterMap;

use crate::component::ComponentLabel;
use crate::error::{RegistrationError, Result};

/// Parameters and command-line arguments of one registration run.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    parameters: ParameterMap,
    arguments: IndexMap<String, String>,
    elastix_level: usize,
    total_elastix_levels: usize,
}

impl Configuration {
    pub fn new(parameters: ParameterMap) -> Self {
        Self {
            parameters,
            arguments: IndexMap::new(),
            elastix_level: 0,
            total_elastix_levels: 1,
        }
    }

    /// Add a command-line argument such as `("-out", "results/")`. The flag
    /// `-f` is stored as `-f0` and `-m` as `-m0`.
    pub fn with_argument(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_argument(flag, value);
        self
    }

    pub fn set_argument(&mut self, flag: impl Into<String>, value: impl Into<String>) {
        let flag = flag.into();
        let flag = match flag.as_str() {
            "-f" => "-f0".to_string(),
            "-m" => "-m0".to_string(),
            _ => flag,
        };
        self.arguments.insert(flag, value.into());
    }

    /// Index of this parameter set in a chain of registrations.
    pub fn with_elastix_level(mut self, level: usize, total: usize) -> Self {
        self.elastix_level = level;
        self.total_elastix_levels = total.max(level + 1);
        self
    }

    pub fn elastix_level(&self) -> usize {
        self.elastix_level
    }

    pub fn total_elastix_levels(&self) -> usize {
        self.total_elastix_levels
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    pub fn command_line_argument(&self, flag: &str) -> Option<&str> {
        self.arguments.get(flag).map(String::as_str)
    }

    pub fn arguments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.arguments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values of `-<prefix>0`, `-<prefix>1`, ... up to the first gap.
    pub fn indexed_arguments(&self, prefix: &str) -> Vec<PathBuf> {
        (0..)
            .map_while(|i| self.command_line_argument(&format!("-{prefix}{i}")))
            .map(PathBuf::from)
            .collect()
    }

    pub fn output_directory(&self) -> Option<PathBuf> {
        self.command_line_argument("-out").map(PathBuf::from)
    }

    /// Read entry `entry` of `key`. A missing required parameter is an error;
    /// a missing optional one is `Ok(None)`.
    pub fn read_parameter<T>(&self, key: &str, entry: usize, required: bool) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let value = self.parameters.get_as::<T>(key, entry)?;
        if value.is_none() && required {
            return Err(RegistrationError::missing_parameter(key));
        }
        Ok(value)
    }

    /// Read entry `entry` of `key`, falling back to entry 0 and then to
    /// `default`.
    pub fn read_parameter_or<T>(&self, key: &str, entry: usize, default: T) -> Result<T>
    where
        T: FromStr + fmt::Debug,
        T::Err: fmt::Display,
    {
        if let Some(value) = self.parameters.get_as::<T>(key, entry)? {
            return Ok(value);
        }
        if let Some(value) = self.parameters.get_as::<T>(key, 0)? {
            return Ok(value);
        }
        tracing::debug!(parameter = key, ?default, "parameter not found, using default");
        Ok(default)
    }

    /// Read a component parameter. Tried in order: `<label><key>` at
    /// `entry`, `<label><key>` at `default_entry`, `key` at `entry`, `key` at
    /// `default_entry`.
    pub fn read_component_parameter<T>(
        &self,
        key: &str,
        label: Option<&ComponentLabel>,
        entry: usize,
        default_entry: usize,
    ) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let prefixed = label.map(|l| format!("{l}{key}"));
        let keys = prefixed.as_deref().into_iter().chain(std::iter::once(key));
        for candidate in keys {
            for e in [entry, default_entry] {
                if let Some(value) = self.parameters.get_as::<T>(candidate, e)? {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    pub fn read_component_parameter_or<T>(
        &self,
        key: &str,
        label: Option<&ComponentLabel>,
        entry: usize,
        default: T,
    ) -> Result<T>
    where
        T: FromStr + fmt::Debug,
        T::Err: fmt::Display,
    {
        match self.read_component_parameter(key, label, entry, 0)? {
            Some(value) => Ok(value),
            None => {
                tracing::debug!(parameter = key, ?default, "parameter not found, using default");
                Ok(default)
            }
        }
    }

    /// Parameters named like booleans accept `"true"`/`"false"`.
    pub fn read_flag(&self, key: &str, label: Option<&ComponentLabel>, default: bool) -> Result<bool> {
        self.read_component_parameter_or(key, label, 0, default)
    }

    /// Configuration hook, run before every component in each `BeforeAll`
    /// fan-out.
    pub fn before_all(&self) -> Result<()> {
        for (flag, value) in &self.arguments {
            tracing::info!(argument = %flag, %value, "command-line argument");
        }
        tracing::debug!(parameters = %self.parameters, "parameter map");
        Ok(())
    }

    /// Configuration hook for `BeforeRegistration`.
    pub fn before_registration(&self) -> Result<()> {
        tracing::info!(
            elastix_level = self.elastix_level,
            total = self.total_elastix_levels,
            output = ?self.output_directory(),
            "starting registration"
        );
        Ok(())
    }

    /// Configuration hook for `BeforeEachResolution`.
    pub fn before_each_resolution(&self, level: usize) -> Result<()> {
        tracing::info!(level, "resolution {level}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Category, ComponentLabel};

    fn config(text: &str) -> Configuration {
        Configuration::new(ParameterMap::parse(text).unwrap())
    }

    #[test]
    fn test_read_parameter_required_and_optional() {
        let config = config("(NumberOfResolutions 2)");
        assert_eq!(config.read_parameter::<usize>("NumberOfResolutions", 0, true).unwrap(), Some(2));
        assert_eq!(config.read_parameter::<usize>("Missing", 0, false).unwrap(), None);
        assert!(matches!(
            config.read_parameter::<usize>("Missing", 0, true),
            Err(RegistrationError::Parameter(_))
        ));
    }

    #[test]
    fn test_per_level_fallback() {
        let config = config("(MaximumNumberOfIterations 100 50)");
        assert_eq!(config.read_parameter_or("MaximumNumberOfIterations", 1, 10usize).unwrap(), 50);
        assert_eq!(config.read_parameter_or("MaximumNumberOfIterations", 3, 10usize).unwrap(), 100);
        assert_eq!(config.read_parameter_or("SP_a", 3, 1.5f64).unwrap(), 1.5);
    }

    #[test]
    fn test_component_prefix_preferred() {
        let config = config("(Metric1Weight 0.25)\n(Weight 2.0)");
        let second = ComponentLabel::new(Category::Metric, 1);
        let first = ComponentLabel::new(Category::Metric, 0);
        assert_eq!(
            config.read_component_parameter::<f64>("Weight", Some(&second), 0, 0).unwrap(),
            Some(0.25)
        );
        assert_eq!(
            config.read_component_parameter::<f64>("Weight", Some(&first), 0, 0).unwrap(),
            Some(2.0)
        );
    }

    #[test]
    fn test_arguments() {
        let config = Configuration::default()
            .with_argument("-f", "fixed.nii")
            .with_argument("-f1", "fixed2.nii")
            .with_argument("-out", "out");
        assert_eq!(config.command_line_argument("-f0"), Some("fixed.nii"));
        assert_eq!(config.indexed_arguments("f").len(), 2);
        assert!(config.indexed_arguments("m").is_empty());
        assert_eq!(config.output_directory(), Some(PathBuf::from("out")));
    }
}
