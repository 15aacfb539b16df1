//! Capability registry with lazy, decorated, cached resolution.
//!
//! # Resolution
//!
//! ```text
//! Fast Path (instance already built):
//!   1. Look up the per-name cell
//!   2. If initialized → return cached Arc
//!
//! Slow Path (first resolution of a name):
//!   1. Under the descriptors read lock: look up the factory
//!      (UnknownExtension if absent) and get or create the per-name cell
//!   2. cell.get_or_init: exactly one caller runs factory + wrapper chain,
//!      concurrent callers block on the cell and observe the result
//! ```
//!
//! Wrappers are applied innermost-first: the first registered wrapper that
//! matches the name wraps the raw implementation, each later match wraps the
//! previous result.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use super::{Capability, ExtensionDescriptor, ExtensionFactory, ExtensionSource, WrapperDescriptor};
use crate::config::{DuplicatePolicy, RegistryConfig};
use crate::error::ExtensionError;

type InstanceCell<C> = Arc<OnceLock<Arc<C>>>;

/// Type-erased view of an [`ExtensionLoader`] so the registry can hold
/// loaders for unrelated capabilities in one map.
trait ErasedLoader: Send + Sync {
    fn clear_instances(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Per-capability state: descriptors, wrappers, default name and instance cache.
struct ExtensionLoader<C: ?Sized> {
    descriptors: RwLock<BTreeMap<String, ExtensionFactory<C>>>,
    wrappers: RwLock<Vec<WrapperDescriptor<C>>>,
    instances: Mutex<HashMap<String, InstanceCell<C>>>,
    default_name: RwLock<Option<String>>,
}

impl<C: ?Sized + Capability> ExtensionLoader<C> {
    fn new() -> Self {
        Self {
            descriptors: RwLock::new(BTreeMap::new()),
            wrappers: RwLock::new(Vec::new()),
            instances: Mutex::new(HashMap::new()),
            default_name: RwLock::new(C::DEFAULT_EXTENSION.map(str::to_string)),
        }
    }

    fn register(
        &self,
        name: &str,
        factory: ExtensionFactory<C>,
        policy: DuplicatePolicy,
    ) -> Result<(), ExtensionError> {
        validate_name::<C>(name)?;

        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(name) {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(ExtensionError::DuplicateName {
                        capability: C::NAME,
                        name: name.to_string(),
                    });
                }
                DuplicatePolicy::Replace => {
                    tracing::debug!(capability = C::NAME, name, "replacing extension");
                    self.instances.lock().remove(name);
                }
            }
        }
        descriptors.insert(name.to_string(), factory);
        Ok(())
    }

    fn register_wrapper(&self, wrapper: WrapperDescriptor<C>) {
        self.wrappers.write().push(wrapper);
    }

    fn cached(&self, name: &str) -> Option<Arc<C>> {
        self.instances
            .lock()
            .get(name)
            .and_then(|cell| cell.get())
            .cloned()
    }

    fn resolve(&self, name: &str) -> Result<Arc<C>, ExtensionError> {
        if let Some(instance) = self.cached(name) {
            return Ok(instance);
        }

        // Factory and cell are taken under one descriptors read guard, so a
        // replace lands either before the lookup or after the cell exists.
        let (factory, cell) = {
            let descriptors = self.descriptors.read();
            let factory = descriptors.get(name).cloned().ok_or_else(|| {
                ExtensionError::UnknownExtension {
                    capability: C::NAME,
                    name: name.to_string(),
                }
            })?;
            let cell = Arc::clone(self.instances.lock().entry(name.to_string()).or_default());
            (factory, cell)
        };
        let instance = cell.get_or_init(|| self.build(name, &factory));
        Ok(Arc::clone(instance))
    }

    fn build(&self, name: &str, factory: &ExtensionFactory<C>) -> Arc<C> {
        // Snapshot so user code never runs under the wrappers lock.
        let wrappers = self.wrappers.read().clone();

        let mut instance = factory();
        let mut applied = 0usize;
        for wrapper in &wrappers {
            if wrapper.predicate().applies(name) {
                instance = wrapper.apply(instance);
                applied += 1;
            }
        }

        tracing::debug!(
            capability = C::NAME,
            name,
            wrappers = applied,
            "extension instantiated"
        );
        instance
    }

    fn default_name(&self) -> Option<String> {
        self.default_name.read().clone()
    }

    fn set_default(&self, name: &str) -> Result<(), ExtensionError> {
        validate_name::<C>(name)?;
        *self.default_name.write() = Some(name.to_string());
        Ok(())
    }

    fn has_extension(&self, name: &str) -> bool {
        self.descriptors.read().contains_key(name)
    }

    fn supported(&self) -> Vec<String> {
        self.descriptors.read().keys().cloned().collect()
    }

    fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .lock()
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl<C: ?Sized + Capability> ErasedLoader for ExtensionLoader<C> {
    fn clear_instances(&self) {
        self.instances.lock().clear();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn validate_name<C: ?Sized + Capability>(name: &str) -> Result<(), ExtensionError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ',') {
        return Err(ExtensionError::InvalidName {
            capability: C::NAME,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Registry of named capability implementations.
///
/// One registry is typically created at process start and shared as
/// `Arc<ExtensionRegistry>`. All methods take `&self` and are safe to call
/// from many threads.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use switchyard_core::{Capability, ExtensionRegistry, WrapperDescriptor};
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// impl Capability for dyn Greeter {
///     const NAME: &'static str = "greeter";
///     const DEFAULT_EXTENSION: Option<&'static str> = Some("plain");
/// }
///
/// struct Plain;
/// impl Greeter for Plain {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// struct Loud(Arc<dyn Greeter>);
/// impl Greeter for Loud {
///     fn greet(&self) -> String {
///         self.0.greet().to_uppercase()
///     }
/// }
///
/// let registry = ExtensionRegistry::new();
/// registry
///     .register::<dyn Greeter, _>("plain", || Arc::new(Plain) as Arc<dyn Greeter>)
///     .unwrap();
/// registry.register_wrapper(WrapperDescriptor::new(|inner: Arc<dyn Greeter>| {
///     Arc::new(Loud(inner)) as Arc<dyn Greeter>
/// }));
///
/// let greeter = registry.resolve_default::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "HELLO");
/// ```
pub struct ExtensionRegistry {
    config: RegistryConfig,
    loaders: RwLock<HashMap<TypeId, Arc<dyn ErasedLoader>>>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// The registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn loader<C: ?Sized + Capability>(&self) -> Arc<ExtensionLoader<C>> {
        let key = TypeId::of::<C>();
        let existing = self.loaders.read().get(&key).cloned();
        let erased = match existing {
            Some(loader) => loader,
            None => Arc::clone(
                self.loaders
                    .write()
                    .entry(key)
                    .or_insert_with(|| {
                        Arc::new(ExtensionLoader::<C>::new()) as Arc<dyn ErasedLoader>
                    }),
            ),
        };

        match erased.into_any().downcast::<ExtensionLoader<C>>() {
            Ok(loader) => loader,
            Err(_) => unreachable!("loader for {} stored under a foreign TypeId", C::NAME),
        }
    }

    /// Register a named implementation of `C`.
    ///
    /// # Errors
    ///
    /// - [`ExtensionError::InvalidName`] if the name is empty or contains
    ///   whitespace or commas.
    /// - [`ExtensionError::DuplicateName`] if the name exists and the registry
    ///   is configured with [`DuplicatePolicy::Reject`].
    pub fn register<C, F>(&self, name: &str, factory: F) -> Result<(), ExtensionError>
    where
        C: ?Sized + Capability,
        F: Fn() -> Arc<C> + Send + Sync + 'static,
    {
        self.loader::<C>()
            .register(name, Arc::new(factory), self.config.duplicate_policy)
    }

    /// Register an [`ExtensionDescriptor`].
    ///
    /// # Errors
    ///
    /// Same as [`ExtensionRegistry::register`].
    pub fn register_descriptor<C: ?Sized + Capability>(
        &self,
        descriptor: ExtensionDescriptor<C>,
    ) -> Result<(), ExtensionError> {
        self.loader::<C>().register(
            &descriptor.name,
            descriptor.factory,
            self.config.duplicate_policy,
        )
    }

    /// Append a wrapper to `C`'s decorator list.
    ///
    /// Wrappers only affect instances built after registration; call
    /// [`ExtensionRegistry::clear_instances`] to rebuild cached ones.
    pub fn register_wrapper<C: ?Sized + Capability>(&self, wrapper: WrapperDescriptor<C>) {
        self.loader::<C>().register_wrapper(wrapper);
    }

    /// Resolve `name` to its fully decorated, cached instance.
    ///
    /// A factory must not resolve its own name, as that would wait on itself.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::UnknownExtension`] if nothing is registered
    /// under `name`.
    pub fn resolve<C: ?Sized + Capability>(&self, name: &str) -> Result<Arc<C>, ExtensionError> {
        self.loader::<C>().resolve(name)
    }

    /// Resolve the capability's default extension.
    ///
    /// # Errors
    ///
    /// - [`ExtensionError::NoDefaultConfigured`] if `C` has no default.
    /// - [`ExtensionError::UnknownExtension`] if the default name is not registered.
    pub fn resolve_default<C: ?Sized + Capability>(&self) -> Result<Arc<C>, ExtensionError> {
        let loader = self.loader::<C>();
        let name = loader
            .default_name()
            .ok_or(ExtensionError::NoDefaultConfigured {
                capability: C::NAME,
            })?;
        loader.resolve(&name)
    }

    /// The default extension name for `C`, if one is designated.
    pub fn default_extension_name<C: ?Sized + Capability>(&self) -> Option<String> {
        self.loader::<C>().default_name()
    }

    /// Override `C`'s default extension name.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidName`] for malformed names.
    pub fn set_default<C: ?Sized + Capability>(&self, name: &str) -> Result<(), ExtensionError> {
        self.loader::<C>().set_default(name)
    }

    /// Whether an implementation is registered under `name`.
    pub fn has_extension<C: ?Sized + Capability>(&self, name: &str) -> bool {
        self.loader::<C>().has_extension(name)
    }

    /// All registered names for `C`, sorted.
    pub fn supported_extensions<C: ?Sized + Capability>(&self) -> Vec<String> {
        self.loader::<C>().supported()
    }

    /// Names for `C` that have been instantiated, sorted.
    pub fn loaded_extensions<C: ?Sized + Capability>(&self) -> Vec<String> {
        self.loader::<C>().loaded()
    }

    /// Drop every cached instance; registrations are kept.
    pub fn clear_instances(&self) {
        for loader in self.loaders.read().values() {
            loader.clear_instances();
        }
    }

    /// Drop every registration, wrapper, default override and cached instance.
    pub fn reset(&self) {
        self.loaders.write().clear();
        tracing::debug!("extension registry reset");
    }

    /// Populate the registry from an [`ExtensionSource`].
    ///
    /// # Errors
    ///
    /// Propagates the first registration failure reported by the source.
    pub fn load(&self, source: &dyn ExtensionSource) -> Result<(), ExtensionError> {
        source.populate(self)
    }
}
