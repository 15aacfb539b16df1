//! Configuration for the extension registry.

/// What happens when a name is registered twice for the same capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Last registration wins. Any cached instance for the name is evicted.
    #[default]
    Replace,
    /// Registration fails with [`crate::ExtensionError::DuplicateName`].
    Reject,
}

/// Configuration for [`crate::ExtensionRegistry`].
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Policy applied to duplicate extension names.
    pub duplicate_policy: DuplicatePolicy,
}

impl RegistryConfig {
    /// Strict configuration: duplicate names are rejected.
    pub fn strict() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Reject,
        }
    }

    /// Set the duplicate name policy.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_config_default_replaces() {
        assert_eq!(
            RegistryConfig::default().duplicate_policy,
            DuplicatePolicy::Replace
        );
        assert_eq!(
            RegistryConfig::strict().duplicate_policy,
            DuplicatePolicy::Reject
        );
    }
}
