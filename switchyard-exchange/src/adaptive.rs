//! Exchanger that picks the concrete exchanger per call.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{AdaptiveDispatcher, ExtensionRegistry, Url};

use crate::client::ExchangeClient;
use crate::error::ExchangeError;
use crate::exchanger::{EXCHANGER_KEY, Exchanger};
use crate::handler::ExchangeHandler;
use crate::server::ExchangeServer;

/// [`Exchanger`] selecting its implementation from the url's `exchanger`
/// parameter on every call, falling back to the registry default.
#[derive(Clone)]
pub struct AdaptiveExchanger {
    dispatcher: AdaptiveDispatcher<dyn Exchanger>,
}

impl AdaptiveExchanger {
    /// Create an adaptive exchanger over `registry`.
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            dispatcher: AdaptiveDispatcher::new(registry, EXCHANGER_KEY),
        }
    }
}

#[async_trait]
impl Exchanger for AdaptiveExchanger {
    async fn bind(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeServer, ExchangeError> {
        let exchanger = self.dispatcher.select(url)?;
        exchanger.bind(url, handler).await
    }

    async fn connect(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeClient, ExchangeError> {
        let exchanger = self.dispatcher.select(url)?;
        exchanger.connect(url, handler).await
    }
}
