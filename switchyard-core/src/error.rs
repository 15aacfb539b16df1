//! Error types for extension resolution and dispatch.

/// Errors that can occur while registering, resolving or dispatching extensions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    /// No extension is registered under the requested name.
    #[error("unknown extension '{name}' for capability {capability}")]
    UnknownExtension {
        /// Capability the lookup was made against.
        capability: &'static str,
        /// The name that was not found.
        name: String,
    },

    /// A default was requested but the capability does not designate one.
    #[error("no default extension configured for capability {capability}")]
    NoDefaultConfigured {
        /// Capability without a default.
        capability: &'static str,
    },

    /// Adaptive dispatch found no selector value and no default to fall back on.
    #[error("missing selector {keys:?} for capability {capability} and no default configured")]
    MissingSelector {
        /// Capability being dispatched.
        capability: &'static str,
        /// Selector keys that were looked up, in lookup order.
        keys: Vec<String>,
    },

    /// The name is already registered and the registry rejects duplicates.
    #[error("extension '{name}' already registered for capability {capability}")]
    DuplicateName {
        /// Capability the registration targeted.
        capability: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// The name is empty or contains whitespace or commas.
    #[error("invalid extension name '{name}' for capability {capability}")]
    InvalidName {
        /// Capability the registration targeted.
        capability: &'static str,
        /// The rejected name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_error_display() {
        let err = ExtensionError::UnknownExtension {
            capability: "exchanger",
            name: "carrier-pigeon".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown extension 'carrier-pigeon' for capability exchanger"
        );

        let err = ExtensionError::MissingSelector {
            capability: "exchanger",
            keys: vec!["exchanger".to_string()],
        };
        assert!(err.to_string().contains("missing selector"));
    }
}
