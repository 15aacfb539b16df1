//! Decorators applied around resolved extensions.

use std::sync::Arc;

use super::WrapperPredicate;

/// Wraps an implementation of capability `C` in another implementation of `C`.
pub type WrapperFactory<C> = Arc<dyn Fn(Arc<C>) -> Arc<C> + Send + Sync>;

/// A conditionally applied decorator.
///
/// # Example
///
/// ```ignore
/// let logging = WrapperDescriptor::new(|inner: Arc<dyn Exchanger>| {
///     Arc::new(LoggingExchanger::new(inner)) as Arc<dyn Exchanger>
/// })
/// .excluding(["mock"]);
/// registry.register_wrapper(logging);
/// ```
pub struct WrapperDescriptor<C: ?Sized> {
    factory: WrapperFactory<C>,
    predicate: WrapperPredicate,
}

impl<C: ?Sized> WrapperDescriptor<C> {
    /// Create a wrapper that applies to every extension name.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Arc<C>) -> Arc<C> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            predicate: WrapperPredicate::all(),
        }
    }

    /// Restrict the wrapper to the given names.
    pub fn matching<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicate = self.predicate.matching(names);
        self
    }

    /// Never apply the wrapper to the given names.
    pub fn excluding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicate = self.predicate.excluding(names);
        self
    }

    /// Replace the predicate wholesale.
    pub fn with_predicate(mut self, predicate: WrapperPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// The applicability predicate.
    pub fn predicate(&self) -> &WrapperPredicate {
        &self.predicate
    }

    /// Wrap `inner` if the predicate applies to `name`, otherwise return it unchanged.
    pub fn wrap(&self, name: &str, inner: Arc<C>) -> Arc<C> {
        if self.predicate.applies(name) {
            self.apply(inner)
        } else {
            inner
        }
    }

    /// Run the wrapper factory without consulting the predicate.
    pub(crate) fn apply(&self, inner: Arc<C>) -> Arc<C> {
        (self.factory)(inner)
    }
}

impl<C: ?Sized> Clone for WrapperDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            predicate: self.predicate.clone(),
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for WrapperDescriptor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperDescriptor")
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}
