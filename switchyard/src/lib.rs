//! # Switchyard
//!
//! Pluggable extensions and request/response exchange for RPC runtimes.
//!
//! Switchyard lets a runtime pick implementations of its pluggable pieces by
//! name, decorate them with conditional wrappers, and choose among them per
//! call from url parameters. On top of that registry sits an exchange layer
//! that correlates asynchronous responses with the requests that caused them.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              switchyard (this crate)                        │
//! │   Re-exports both crates + default_registry() wiring        │
//! ├─────────────────────────────────────────────────────────────┤
//! │              switchyard-exchange                            │
//! │  • Correlator, ResponseFuture                               │
//! │  • ExchangeChannel + ExchangeHandler                        │
//! │  • Exchanger / ExchangeServer / ExchangeClient              │
//! │  • Transport traits + in-memory transport                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │              switchyard-core                                │
//! │  ExtensionRegistry, wrappers, AdaptiveDispatcher, Url       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use switchyard::prelude::*;
//!
//! let registry = switchyard::default_registry()?;
//! let exchanger = AdaptiveExchanger::new(registry);
//!
//! let url = Url::parse("exchange://orders:9000?timeout=500")?;
//! let server = exchanger.bind(&url, Arc::new(MyHandler)).await?;
//! let client = exchanger.connect(&url, Arc::new(MyHandler)).await?;
//!
//! let response = client.request_default(Bytes::from_static(b"ping"))?.await;
//! ```
//!
//! ## Documentation
//!
//! - [`switchyard_core`] - Extension registry and adaptive dispatch
//! - [`switchyard_exchange`] - Exchange layer and transport abstraction

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

// Re-export all public items from sub-crates
pub use switchyard_core::*;
pub use switchyard_exchange::*;

/// Commonly used types.
pub mod prelude {
    pub use std::sync::Arc;

    pub use bytes::Bytes;
    pub use switchyard_core::{
        AdaptiveDispatcher, Capability, ExtensionError, ExtensionRegistry, Url, WrapperDescriptor,
    };
    pub use switchyard_exchange::{
        AdaptiveExchanger, ExchangeChannel, ExchangeClient, ExchangeError, ExchangeHandler,
        ExchangeServer, Exchanger, HandlerError, Request, Response, Status,
    };
}

/// A registry pre-populated with the builtin extensions, using the default
/// [`RegistryConfig`].
///
/// # Errors
///
/// Propagates registration failures from [`BuiltinExtensions`].
pub fn default_registry() -> Result<Arc<ExtensionRegistry>, ExtensionError> {
    default_registry_with_config(RegistryConfig::default())
}

/// A registry pre-populated with the builtin extensions.
///
/// # Errors
///
/// Propagates registration failures from [`BuiltinExtensions`].
pub fn default_registry_with_config(
    config: RegistryConfig,
) -> Result<Arc<ExtensionRegistry>, ExtensionError> {
    let registry = Arc::new(ExtensionRegistry::with_config(config));
    registry.load(&BuiltinExtensions::new(&registry))?;
    tracing::debug!(
        exchangers = ?registry.supported_extensions::<dyn Exchanger>(),
        transporters = ?registry.supported_extensions::<dyn Transporter>(),
        "default registry ready"
    );
    Ok(registry)
}
