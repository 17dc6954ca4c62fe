//! Backend access seam used by the caches
//!
//! The caches never talk to the transport directly. The node cache takes a
//! fetch closure per call, and the catalog refresher goes through a
//! [`BesBackend`], so either can run against a real BES or a test double.

use crate::document::{Document, Element};
use crate::error::{BesError, Result};
use crate::ppt::{Client, TransportConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Issues one request to the BES and returns its parsed response.
///
/// A response the BES flags as an error must come back as
/// [`BesError::Backend`]; any other error is treated as a transport or parse
/// failure.
#[async_trait]
pub trait BesBackend: Send + Sync {
    async fn transaction(&self, request: &Document) -> Result<Document>;
}

/// Turns response bytes into a [`Document`].
pub trait DocumentParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Document>;
}

impl<F> DocumentParser for F
where
    F: Fn(&[u8]) -> Result<Document> + Send + Sync,
{
    fn parse(&self, bytes: &[u8]) -> Result<Document> {
        self(bytes)
    }
}

/// Wraps the UTF-8 response body as the text of a `<response>` element.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextResponseParser;

impl DocumentParser for TextResponseParser {
    fn parse(&self, bytes: &[u8]) -> Result<Document> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BesError::Parse(format!("response is not valid UTF-8: {}", e)))?;
        Ok(Element::new("response").with_text(text).into())
    }
}

/// [`BesBackend`] that opens a fresh PPT connection per transaction.
pub struct PptBackend {
    host: String,
    port: u16,
    config: TransportConfig,
    parser: Arc<dyn DocumentParser>,
}

impl PptBackend {
    pub fn new(host: impl Into<String>, port: u16, parser: Arc<dyn DocumentParser>) -> Self {
        Self {
            host: host.into(),
            port,
            config: TransportConfig::default(),
            parser,
        }
    }

    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl BesBackend for PptBackend {
    async fn transaction(&self, request: &Document) -> Result<Document> {
        let mut client =
            Client::connect_with_config(&self.host, self.port, self.config.clone()).await?;

        let outcome = client.request_bytes(request.to_xml().as_bytes()).await;
        client.close(true).await?;

        let body = outcome?;
        debug!(bytes = body.len(), "Parsing BES response");
        self.parser.parse(&body)
    }
}
