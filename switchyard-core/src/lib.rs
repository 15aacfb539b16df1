//! # switchyard-core
//!
//! Extension resolution for the switchyard RPC runtime.
//!
//! This crate provides:
//!
//! - **[`Capability`]**: marker for a family of interchangeable implementations
//!   (implemented on the trait-object type, e.g. `dyn Exchanger`)
//! - **[`ExtensionRegistry`]**: name → factory mapping with lazy, cached,
//!   wrapper-decorated resolution
//! - **[`WrapperPredicate`] / [`WrapperDescriptor`]**: conditional decorators
//!   applied innermost-first
//! - **[`AdaptiveDispatcher`]**: per-call selection driven by a configuration
//!   value such as a [`Url`] parameter
//!
//! The registry never discovers implementations by itself. Whatever produces
//! the name → factory mapping (a static list, a config file, manual calls)
//! feeds it through [`ExtensionRegistry::register`] or an [`ExtensionSource`].

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod config;
mod error;
mod extension;
mod url;

// Configuration exports
pub use config::{DuplicatePolicy, RegistryConfig};

// Error exports
pub use error::ExtensionError;

// Extension exports
pub use extension::{
    AdaptiveDispatcher, Capability, ExtensionDescriptor, ExtensionFactory, ExtensionRegistry,
    ExtensionSource, WrapperDescriptor, WrapperFactory, WrapperPredicate,
};

// Url exports
pub use url::{Parameters, Url, UrlParseError};
