//! The exchanger capability and its standard implementation.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{Capability, Url};

use crate::channel::ExchangeChannel;
use crate::client::ExchangeClient;
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::handler::ExchangeHandler;
use crate::server::ExchangeServer;
use crate::transport::Transporter;

/// Url parameter naming the exchanger to use.
pub const EXCHANGER_KEY: &str = "exchanger";

/// Establishes servers and clients for urls.
#[async_trait]
pub trait Exchanger: Send + Sync {
    /// Bind a server at the url's address.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Bind`] if the endpoint cannot be established.
    async fn bind(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeServer, ExchangeError>;

    /// Connect a client to the url's address.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Connect`] if the connection cannot be established.
    async fn connect(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeClient, ExchangeError>;
}

impl Capability for dyn Exchanger {
    const NAME: &'static str = "exchanger";
    const DEFAULT_EXTENSION: Option<&'static str> = Some(StandardExchanger::NAME);
}

/// Exchanger that runs channels directly over a [`Transporter`].
///
/// Channel settings come from the url via [`ExchangeConfig::from_url`].
#[derive(Clone)]
pub struct StandardExchanger {
    transporter: Arc<dyn Transporter>,
}

impl StandardExchanger {
    /// Extension name of the standard exchanger.
    pub const NAME: &'static str = "standard";

    /// Create an exchanger over `transporter`.
    pub fn new(transporter: Arc<dyn Transporter>) -> Self {
        Self { transporter }
    }
}

#[async_trait]
impl Exchanger for StandardExchanger {
    async fn bind(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeServer, ExchangeError> {
        let listener = self
            .transporter
            .bind(url)
            .await
            .map_err(|source| ExchangeError::Bind {
                url: url.to_string(),
                source,
            })?;
        Ok(ExchangeServer::start(
            url.clone(),
            listener,
            handler,
            ExchangeConfig::from_url(url),
        ))
    }

    async fn connect(
        &self,
        url: &Url,
        handler: Arc<dyn ExchangeHandler>,
    ) -> Result<ExchangeClient, ExchangeError> {
        let connection =
            self.transporter
                .connect(url)
                .await
                .map_err(|source| ExchangeError::Connect {
                    url: url.to_string(),
                    source,
                })?;
        let channel =
            ExchangeChannel::open(url.clone(), connection, handler, ExchangeConfig::from_url(url));
        Ok(ExchangeClient::new(channel))
    }
}
