//! Process-wide component registry.
//!
//! Factories are keyed by `(family name, signature index)`. Each supported
//! [`TypeSignature`] gets a dense index starting at 1; a family name such as
//! `"AdvancedMeanSquares"` is registered once per signature it is compiled
//! for. The registry is populated from an explicit list
//! ([`crate::builtin::install`]) on first access and is read-only afterwards.

use std::any::Any;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use regkit_core::TypeSignature;

/// A type-erased component instance; the creator downcasts it.
pub type AnyComponent = Box<dyn Any>;

/// Creates one fresh component instance per call. `None` means the factory
/// declined to build.
pub type ComponentFactory = Arc<dyn Fn() -> Option<AnyComponent> + Send + Sync>;

/// Dense, non-zero index of a registered type signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureIndex(NonZeroU32);

impl SignatureIndex {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SignatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mapping from `(family, signature index)` to component factories.
#[derive(Default)]
pub struct ComponentRegistry {
    signatures: Vec<TypeSignature>,
    factories: IndexMap<(String, SignatureIndex), ComponentFactory>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("signatures", &self.signatures)
            .field("factories", &self.factories.len())
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a supported signature and return its index. Registering the
    /// same signature again returns the existing index.
    pub fn register_signature(&mut self, signature: TypeSignature) -> SignatureIndex {
        if let Some(index) = self.index_for(&signature) {
            return index;
        }
        self.signatures.push(signature);
        let raw = u32::try_from(self.signatures.len()).unwrap_or(u32::MAX);
        SignatureIndex(NonZeroU32::MIN.saturating_add(raw - 1))
    }

    /// Index of a registered signature; `None` when no pipeline is compiled
    /// for it.
    pub fn index_for(&self, signature: &TypeSignature) -> Option<SignatureIndex> {
        self.signatures
            .iter()
            .position(|s| s == signature)
            .and_then(|pos| u32::try_from(pos + 1).ok())
            .and_then(NonZeroU32::new)
            .map(SignatureIndex)
    }

    pub fn signature(&self, index: SignatureIndex) -> Option<&TypeSignature> {
        self.signatures.get(index.get() as usize - 1)
    }

    pub fn signatures(&self) -> impl Iterator<Item = (SignatureIndex, &TypeSignature)> {
        self.signatures.iter().enumerate().filter_map(|(pos, sig)| {
            let raw = u32::try_from(pos + 1).ok()?;
            Some((SignatureIndex(NonZeroU32::new(raw)?), sig))
        })
    }

    /// Add a factory. The first registration of a `(family, index)` pair
    /// wins; later ones are ignored with a warning. Returns whether the
    /// factory was stored.
    pub fn register(
        &mut self,
        family: impl Into<String>,
        index: SignatureIndex,
        factory: ComponentFactory,
    ) -> bool {
        let key = (family.into(), index);
        if self.factories.contains_key(&key) {
            tracing::warn!(
                family = %key.0,
                index = index.get(),
                "duplicate component registration ignored"
            );
            return false;
        }
        self.factories.insert(key, factory);
        true
    }

    pub fn lookup(&self, family: &str, index: SignatureIndex) -> Option<&ComponentFactory> {
        self.factories.get(&(family.to_string(), index))
    }

    /// Invoke the factory for `(family, index)`, if any.
    pub fn create(&self, family: &str, index: SignatureIndex) -> Option<AnyComponent> {
        self.lookup(family, index).and_then(|factory| factory())
    }

    /// Family names registered for a signature, in registration order.
    pub fn families(&self, index: SignatureIndex) -> Vec<&str> {
        self.factories
            .keys()
            .filter(|(_, i)| *i == index)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

static REGISTRY: OnceLock<ComponentRegistry> = OnceLock::new();

/// The process-wide registry with every built-in component installed.
///
/// Built exactly once, on first call, even under concurrent first access.
pub fn global() -> &'static ComponentRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = ComponentRegistry::new();
        crate::builtin::install(&mut registry);
        tracing::debug!(
            signatures = registry.signatures.len(),
            factories = registry.len(),
            "component registry initialised"
        );
        registry
    })
}
