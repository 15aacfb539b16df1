//! Per-call extension selection from call-site configuration.
//!
//! An [`AdaptiveDispatcher`] stands in for "whichever implementation this
//! call's configuration names". Nothing is cached on the dispatcher itself:
//! every call reads the selector again, so two urls passed through the same
//! dispatcher may land on different implementations. Instances themselves
//! are still the registry's cached singletons.

use std::marker::PhantomData;
use std::sync::Arc;

use super::{Capability, ExtensionRegistry};
use crate::error::ExtensionError;
use crate::url::Parameters;

/// Capability-typed handle that resolves its target per call.
pub struct AdaptiveDispatcher<C: ?Sized> {
    registry: Arc<ExtensionRegistry>,
    keys: Vec<String>,
    _capability: PhantomData<fn() -> Arc<C>>,
}

impl<C: ?Sized> Clone for AdaptiveDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            keys: self.keys.clone(),
            _capability: PhantomData,
        }
    }
}

impl<C: ?Sized + Capability> AdaptiveDispatcher<C> {
    /// Dispatcher reading a single selector key.
    pub fn new(registry: Arc<ExtensionRegistry>, key: &str) -> Self {
        Self::with_keys(registry, [key])
    }

    /// Dispatcher trying several selector keys in order; the first present wins.
    pub fn with_keys<I, S>(registry: Arc<ExtensionRegistry>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registry,
            keys: keys.into_iter().map(Into::into).collect(),
            _capability: PhantomData,
        }
    }

    /// Selector keys in lookup order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The registry used for resolution.
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Extension name selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::MissingSelector`] if no key is present and
    /// the capability has no default.
    pub fn selected_name<P: Parameters + ?Sized>(&self, config: &P) -> Result<String, ExtensionError> {
        let selected = self
            .keys
            .iter()
            .find_map(|key| config.parameter(key).filter(|value| !value.is_empty()));
        if let Some(name) = selected {
            return Ok(name.to_string());
        }

        self.registry
            .default_extension_name::<C>()
            .ok_or_else(|| ExtensionError::MissingSelector {
                capability: C::NAME,
                keys: self.keys.clone(),
            })
    }

    /// Resolve the implementation selected by `config`.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::MissingSelector`] as for
    /// [`AdaptiveDispatcher::selected_name`], or
    /// [`ExtensionError::UnknownExtension`] if the selected name is not registered.
    pub fn select<P: Parameters + ?Sized>(&self, config: &P) -> Result<Arc<C>, ExtensionError> {
        let name = self.selected_name(config)?;
        tracing::trace!(capability = C::NAME, name = %name, "adaptive selection");
        self.registry.resolve::<C>(&name)
    }

    /// Select per `config` and invoke `op` on the selected implementation.
    ///
    /// # Errors
    ///
    /// Same as [`AdaptiveDispatcher::select`]; `op` is not called on error.
    pub fn dispatch<P, R, F>(&self, config: &P, op: F) -> Result<R, ExtensionError>
    where
        P: Parameters + ?Sized,
        F: FnOnce(Arc<C>) -> R,
    {
        let target = self.select(config)?;
        Ok(op(target))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::Url;

    trait Codec: Send + Sync {
        fn name(&self) -> &'static str;
    }

    impl Capability for dyn Codec {
        const NAME: &'static str = "codec";
        const DEFAULT_EXTENSION: Option<&'static str> = Some("json");
    }

    trait Balancer: Send + Sync {
        fn pick(&self) -> usize;
    }

    impl Capability for dyn Balancer {
        const NAME: &'static str = "balancer";
    }

    struct Named(&'static str);

    impl Codec for Named {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    fn registry() -> Arc<ExtensionRegistry> {
        let registry = ExtensionRegistry::new();
        for name in ["json", "cbor"] {
            registry
                .register::<dyn Codec, _>(name, move || Arc::new(Named(name)) as Arc<dyn Codec>)
                .expect("register");
        }
        Arc::new(registry)
    }

    #[test]
    fn test_selection_varies_per_call() {
        let dispatcher = AdaptiveDispatcher::<dyn Codec>::new(registry(), "codec");

        let cbor = Url::new("exchange", "a", 1).with_parameter("codec", "cbor");
        let json = Url::new("exchange", "b", 2).with_parameter("codec", "json");

        assert_eq!(dispatcher.dispatch(&cbor, |c| c.name()), Ok("cbor"));
        assert_eq!(dispatcher.dispatch(&json, |c| c.name()), Ok("json"));
        assert_eq!(dispatcher.dispatch(&cbor, |c| c.name()), Ok("cbor"));
    }

    #[test]
    fn test_missing_key_falls_back_to_default() {
        let dispatcher = AdaptiveDispatcher::<dyn Codec>::new(registry(), "codec");
        let url = Url::new("exchange", "a", 1);
        assert_eq!(dispatcher.dispatch(&url, |c| c.name()), Ok("json"));

        let empty = url.with_parameter("codec", "");
        assert_eq!(dispatcher.dispatch(&empty, |c| c.name()), Ok("json"));
    }

    #[test]
    fn test_missing_selector_without_default() {
        let dispatcher = AdaptiveDispatcher::<dyn Balancer>::new(registry(), "loadbalance");
        let config: HashMap<String, String> = HashMap::new();

        let err = dispatcher
            .dispatch(&config, |b| b.pick())
            .err()
            .expect("should fail");
        assert_eq!(
            err,
            ExtensionError::MissingSelector {
                capability: "balancer",
                keys: vec!["loadbalance".to_string()],
            }
        );
    }

    #[test]
    fn test_unknown_selected_name() {
        let dispatcher = AdaptiveDispatcher::<dyn Codec>::new(registry(), "codec");
        let url = Url::new("exchange", "a", 1).with_parameter("codec", "protobuf");

        let err = dispatcher.select(&url).err().expect("should fail");
        assert!(matches!(err, ExtensionError::UnknownExtension { .. }));
    }

    #[test]
    fn test_first_present_key_wins() {
        let dispatcher =
            AdaptiveDispatcher::<dyn Codec>::with_keys(registry(), ["client.codec", "codec"]);

        let both = Url::new("exchange", "a", 1)
            .with_parameter("codec", "json")
            .with_parameter("client.codec", "cbor");
        assert_eq!(dispatcher.selected_name(&both), Ok("cbor".to_string()));

        let fallback = Url::new("exchange", "a", 1).with_parameter("codec", "cbor");
        assert_eq!(dispatcher.selected_name(&fallback), Ok("cbor".to_string()));
    }

    #[test]
    fn test_selected_instance_is_registry_singleton() {
        let registry = registry();
        let dispatcher = AdaptiveDispatcher::<dyn Codec>::new(Arc::clone(&registry), "codec");
        let url = Url::new("exchange", "a", 1).with_parameter("codec", "cbor");

        let selected = dispatcher.select(&url).expect("select");
        let direct = registry.resolve::<dyn Codec>("cbor").expect("resolve");
        assert!(Arc::ptr_eq(&selected, &direct));
    }
}
