//! Pluggable extensions: named implementations of a capability.
//!
//! A *capability* is a trait-object type (e.g. `dyn Exchanger`) that
//! implements [`Capability`]. Implementations are registered by name with a
//! factory, optionally decorated by [`WrapperDescriptor`]s, and resolved to a
//! cached, fully decorated `Arc<C>` by the [`ExtensionRegistry`].
//!
//! ```text
//! register("standard", factory) ──┐
//! register_wrapper(w1)            ├─► resolve("standard")
//! register_wrapper(w2)            │      factory() → raw
//!                                 │      w1(raw)   → inner layer
//!                                 └───── w2(..)    → outer layer (cached)
//! ```
//!
//! [`AdaptiveDispatcher`] adds per-call selection: the name is read from the
//! call's configuration instead of being fixed up front.

mod adaptive;
mod predicate;
mod registry;
mod wrapper;

use std::sync::Arc;

pub use adaptive::AdaptiveDispatcher;
pub use predicate::WrapperPredicate;
pub use registry::ExtensionRegistry;
pub use wrapper::{WrapperDescriptor, WrapperFactory};

use crate::ExtensionError;

/// A family of interchangeable named implementations behind one contract.
///
/// Implement this on the trait-object type of the contract:
///
/// ```
/// use switchyard_core::Capability;
///
/// pub trait Compressor: Send + Sync {
///     fn compress(&self, input: &[u8]) -> Vec<u8>;
/// }
///
/// impl Capability for dyn Compressor {
///     const NAME: &'static str = "compressor";
///     const DEFAULT_EXTENSION: Option<&'static str> = Some("identity");
/// }
/// ```
pub trait Capability: Send + Sync + 'static {
    /// Human-readable capability name used in logs and errors.
    const NAME: &'static str;

    /// Extension used when no name is supplied. Can be overridden per
    /// registry with [`ExtensionRegistry::set_default`].
    const DEFAULT_EXTENSION: Option<&'static str> = None;
}

/// Builds a raw (undecorated) implementation of a capability.
pub type ExtensionFactory<C> = Arc<dyn Fn() -> Arc<C> + Send + Sync>;

/// A named implementation of capability `C`.
pub struct ExtensionDescriptor<C: ?Sized> {
    /// Unique name within the capability.
    pub name: String,
    /// Factory invoked on first resolution.
    pub factory: ExtensionFactory<C>,
}

impl<C: ?Sized> ExtensionDescriptor<C> {
    /// Create a descriptor from a name and a factory closure.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<C> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }
}

impl<C: ?Sized> Clone for ExtensionDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for ExtensionDescriptor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Something that can populate a registry with extensions and wrappers.
///
/// The registry does not care where names come from; a static list, a
/// configuration file or hand-written calls are all fine.
pub trait ExtensionSource {
    /// Register everything this source knows about.
    ///
    /// # Errors
    ///
    /// Propagates registration failures (e.g. strict-mode duplicates).
    fn populate(&self, registry: &ExtensionRegistry) -> Result<(), ExtensionError>;
}
