//! Builds component collections from the configuration.

use crate::component::Category;
use crate::configuration::Configuration;
use crate::error::CategoryFailure;
use crate::registry::{AnyComponent, ComponentRegistry, SignatureIndex};

/// How one category is configured: the parameter key naming its
/// components, the default used when the key is absent, and whether the run
/// needs at least one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentCategoryConfig {
    pub key: String,
    pub default_name: Option<String>,
    pub mandatory: bool,
}

impl ComponentCategoryConfig {
    pub fn new(key: impl Into<String>, default_name: Option<&str>, mandatory: bool) -> Self {
        Self {
            key: key.into(),
            default_name: default_name.map(str::to_string),
            mandatory,
        }
    }
}

impl From<Category> for ComponentCategoryConfig {
    fn from(category: Category) -> Self {
        Self::new(category.key(), category.default_component(), category.is_mandatory())
    }
}

/// Creates components for a fixed signature index.
#[derive(Debug)]
pub struct ComponentAssembler<'a> {
    registry: &'a ComponentRegistry,
    configuration: &'a Configuration,
    index: SignatureIndex,
}

impl<'a> ComponentAssembler<'a> {
    pub fn new(
        registry: &'a ComponentRegistry,
        configuration: &'a Configuration,
        index: SignatureIndex,
    ) -> Self {
        Self {
            registry,
            configuration,
            index,
        }
    }

    pub fn index(&self) -> SignatureIndex {
        self.index
    }

    /// Create every component named under `key`, in declaration order.
    ///
    /// Entry 0 names the first component; when absent, `default_name` is used
    /// with a warning, and with no default a mandatory category fails while
    /// an optional one yields an empty collection. Entries 1, 2, ... are then
    /// created until the first missing entry. Names are not deduplicated.
    pub fn create_category(
        &self,
        key: &str,
        default_name: Option<&str>,
        mandatory: bool,
    ) -> (Vec<AnyComponent>, Option<CategoryFailure>) {
        let parameters = self.configuration.parameters();
        let first = match parameters.get_entry(key, 0) {
            Some(name) => name.to_string(),
            None => match default_name {
                Some(name) => {
                    tracing::warn!(category = key, default = name, "no component specified, using default");
                    name.to_string()
                }
                None if mandatory => {
                    return (
                        Vec::new(),
                        Some(CategoryFailure::new(key, format!("no {key} specified"))),
                    );
                }
                None => {
                    tracing::debug!(category = key, "optional category not specified");
                    return (Vec::new(), None);
                }
            },
        };

        let mut created = Vec::new();
        let names = std::iter::once(first)
            .chain((1..).map_while(|entry| parameters.get_entry(key, entry).map(str::to_string)));
        for (entry, name) in names.enumerate() {
            match self.registry.create(&name, self.index) {
                Some(component) => {
                    tracing::debug!(category = key, entry, component = %name, "component created");
                    created.push(component);
                }
                None => {
                    let reason = if self.registry.lookup(&name, self.index).is_some() {
                        format!("factory for \"{name}\" declined to create a component")
                    } else {
                        format!(
                            "component \"{name}\" is not installed for signature index {}",
                            self.index
                        )
                    };
                    return (created, Some(CategoryFailure::new(key, reason)));
                }
            }
        }
        (created, None)
    }

    pub fn create(&self, config: &ComponentCategoryConfig) -> (Vec<AnyComponent>, Option<CategoryFailure>) {
        self.create_category(&config.key, config.default_name.as_deref(), config.mandatory)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use regkit_core::{ParameterMap, PixelType, TypeSignature};

    use super::*;

    fn registry() -> (ComponentRegistry, SignatureIndex) {
        let mut registry = ComponentRegistry::new();
        let index = registry.register_signature(TypeSignature::symmetric(PixelType::Float, 3));
        for name in ["A", "B", "C", "Default"] {
            registry.register(name, index, Arc::new(move || Some(Box::new(name) as AnyComponent)));
        }
        registry.register("Declines", index, Arc::new(|| None));
        (registry, index)
    }

    fn names(components: Vec<AnyComponent>) -> Vec<&'static str> {
        components
            .into_iter()
            .map(|c| *c.downcast::<&'static str>().unwrap())
            .collect()
    }

    fn configuration(text: &str) -> Configuration {
        Configuration::new(ParameterMap::parse(text).unwrap())
    }

    #[test]
    fn test_declaration_order_without_dedup() {
        let (registry, index) = registry();
        let config = configuration("(Metric \"A\" \"B\" \"A\")");
        let assembler = ComponentAssembler::new(&registry, &config, index);
        let (created, failure) = assembler.create_category("Metric", None, true);
        assert!(failure.is_none());
        assert_eq!(names(created), ["A", "B", "A"]);
    }

    #[test]
    fn test_default_used_when_absent() {
        let (registry, index) = registry();
        let config = configuration("");
        let assembler = ComponentAssembler::new(&registry, &config, index);
        let (created, failure) = assembler.create_category("Optimizer", Some("Default"), true);
        assert!(failure.is_none());
        assert_eq!(names(created), ["Default"]);
    }

    #[test]
    fn test_absent_mandatory_fails_and_optional_is_empty() {
        let (registry, index) = registry();
        let config = configuration("");
        let assembler = ComponentAssembler::new(&registry, &config, index);

        let (created, failure) = assembler.create_category("Transform", None, true);
        assert!(created.is_empty());
        assert_eq!(failure.unwrap().category, "Transform");

        let (created, failure) = assembler.create_category("ImageSampler", None, false);
        assert!(created.is_empty());
        assert!(failure.is_none());
    }

    #[test]
    fn test_unknown_and_declining_factories_fail() {
        let (registry, index) = registry();
        let config = configuration("(Metric \"A\" \"Nope\")\n(Transform \"Declines\")");
        let assembler = ComponentAssembler::new(&registry, &config, index);

        let (_, failure) = assembler.create_category("Metric", None, true);
        assert!(failure.unwrap().reason.contains("Nope"));
        let (_, failure) = assembler.create_category("Transform", None, true);
        assert!(failure.unwrap().reason.contains("declined"));
    }
}
