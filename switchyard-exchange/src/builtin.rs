//! Extensions shipped with the exchange layer.

use std::sync::{Arc, Weak};

use switchyard_core::{ExtensionError, ExtensionRegistry, ExtensionSource};

use crate::exchanger::{Exchanger, StandardExchanger};
use crate::transport::{MemoryNetwork, MemoryTransporter, Transporter};

/// Registers the `memory` transporter and the `standard` exchanger.
///
/// The `standard` exchanger runs over the registry's default
/// [`Transporter`], so transporter wrappers and `set_default` apply to it.
/// The registry is held weakly; if it is gone when the exchanger is built,
/// a plain `memory` transporter over the same network is used.
#[derive(Clone)]
pub struct BuiltinExtensions {
    registry: Weak<ExtensionRegistry>,
    network: Arc<MemoryNetwork>,
}

impl BuiltinExtensions {
    /// Builtins for `registry` over a fresh network.
    pub fn new(registry: &Arc<ExtensionRegistry>) -> Self {
        Self::with_network(registry, Arc::default())
    }

    /// Builtins for `registry` over an existing network.
    pub fn with_network(registry: &Arc<ExtensionRegistry>, network: Arc<MemoryNetwork>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            network,
        }
    }

    /// The network shared by the registered extensions.
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }
}

fn registered_transporter(
    registry: &Weak<ExtensionRegistry>,
    network: &Arc<MemoryNetwork>,
) -> Arc<dyn Transporter> {
    let resolved = registry
        .upgrade()
        .map(|registry| registry.resolve_default::<dyn Transporter>());
    match resolved {
        Some(Ok(transporter)) => transporter,
        Some(Err(err)) => {
            tracing::warn!(error = %err, "default transporter unavailable, using memory");
            Arc::new(MemoryTransporter::new(Arc::clone(network)))
        }
        None => Arc::new(MemoryTransporter::new(Arc::clone(network))),
    }
}

impl ExtensionSource for BuiltinExtensions {
    fn populate(&self, registry: &ExtensionRegistry) -> Result<(), ExtensionError> {
        let network = Arc::clone(&self.network);
        registry.register::<dyn Transporter, _>(MemoryTransporter::NAME, move || {
            Arc::new(MemoryTransporter::new(Arc::clone(&network))) as Arc<dyn Transporter>
        })?;

        let owner = self.registry.clone();
        let network = Arc::clone(&self.network);
        registry.register::<dyn Exchanger, _>(StandardExchanger::NAME, move || {
            let transporter = registered_transporter(&owner, &network);
            Arc::new(StandardExchanger::new(transporter)) as Arc<dyn Exchanger>
        })?;
        Ok(())
    }
}
