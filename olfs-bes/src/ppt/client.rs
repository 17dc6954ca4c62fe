//! Transport client: one connection, one outstanding request
//!
//! A [`Client`] owns a single connection to the BES. Each request is written
//! as one chunked message and the matching response is read before the call
//! returns; taking `&mut self` keeps the exchange half-duplex. There is no
//! reconnect or retry here. Any transport fault drops the connection and the
//! error goes straight back to the caller.

use crate::document::Document;
use crate::error::{BackendError, BesError, Result};
use crate::ppt::config::TransportConfig;
use crate::ppt::framed::FramedStream;
use crate::ppt::handshake;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

async fn within<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            BesError::TransportMessage(format!("no response from the BES within {:?}", limit))
        })?,
        None => fut.await,
    }
}

fn classify_read_error(e: io::Error) -> BesError {
    let backend = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<BackendError>())
        .cloned();
    match backend {
        Some(backend) => BesError::Backend(backend),
        None => BesError::Transport(e),
    }
}

/// A connected PPT client.
pub struct Client<S = TcpStream> {
    id: String,
    peer: String,
    framed: Option<FramedStream<S>>,
    commands_sent: u64,
    config: TransportConfig,
    /// Set while a request has been started but its response not fully read
    in_flight: bool,
}

impl Client<TcpStream> {
    /// Connect to a BES with the default [`TransportConfig`].
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_config(host, port, TransportConfig::default()).await
    }

    pub async fn connect_with_config(
        host: &str,
        port: u16,
        config: TransportConfig,
    ) -> Result<Self> {
        config.validate().map_err(BesError::BadConfiguration)?;

        let peer = format!("{}:{}", host, port);
        debug!(peer = %peer, "Connecting to BES");

        let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&peer))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!(peer = %peer, error = %e, "Failed to connect to BES");
                return Err(BesError::Transport(e));
            }
            Err(_) => {
                error!(
                    peer = %peer,
                    timeout = ?config.connect_timeout,
                    "Timed out connecting to BES"
                );
                return Err(BesError::TransportMessage(format!(
                    "timed out connecting to {}",
                    peer
                )));
            }
        };

        // requests are small header/payload/closing writes followed by a read
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Could not disable Nagle's algorithm");
        }

        Self::from_stream(stream, peer, config).await
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the handshake over an already connected stream.
    ///
    /// If the handshake fails the stream is shut down and dropped before the
    /// error is returned.
    pub async fn from_stream(
        mut stream: S,
        peer: impl Into<String>,
        config: TransportConfig,
    ) -> Result<Self> {
        let peer = peer.into();

        if let Err(e) = handshake::initiate(&mut stream, &config).await {
            error!(peer = %peer, error = %e, "Handshake failed, closing connection");
            if let Err(shutdown_err) = stream.shutdown().await {
                debug!(error = %shutdown_err, "Shutdown after failed handshake also failed");
            }
            drop(stream);
            return Err(match e {
                BesError::HandshakeFailed(_) => e,
                other => BesError::HandshakeFailed(other.to_string()),
            });
        }

        let client = Self {
            id: Uuid::new_v4().to_string(),
            peer,
            framed: Some(FramedStream::with_buffer_size(
                stream,
                config.read_buffer_size,
            )),
            commands_sent: 0,
            config,
            in_flight: false,
        };
        info!(id = %client.id, peer = %client.peer, "Connected to BES");
        Ok(client)
    }

    /// Replace the generated client id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Number of requests written on this connection
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// True while the connection is usable.
    ///
    /// A request whose future was dropped before the response was fully read
    /// leaves the stream mid-message, so the client no longer counts as
    /// running.
    pub fn is_running(&self) -> bool {
        !self.in_flight && self.framed.as_ref().is_some_and(|f| !f.is_closed())
    }

    pub fn is_closed(&self) -> bool {
        !self.is_running()
    }

    fn framed_mut(&mut self) -> Result<&mut FramedStream<S>> {
        match self.framed.as_mut() {
            Some(framed) if !framed.is_closed() => Ok(framed),
            _ => Err(BesError::ConnectionClosed(format!(
                "client {} is not connected",
                self.id
            ))),
        }
    }

    fn teardown(&mut self, reason: &str) {
        self.in_flight = false;
        if self.framed.take().is_some() {
            warn!(id = %self.id, peer = %self.peer, reason = reason, "Dropping BES connection");
        }
    }

    /// Drop the connection after a fatal error or a peer-initiated exit.
    fn settle<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Err(e) if e.is_connection_fatal() => self.teardown(&e.to_string()),
            _ => {
                if self.framed.as_ref().is_some_and(FramedStream::is_closed) {
                    self.teardown("connection closed by the BES");
                }
            }
        }
        outcome
    }

    /// Refuse to start a request on a stream left mid-message.
    fn begin_request(&mut self) -> Result<()> {
        if self.in_flight {
            self.teardown("previous request was abandoned");
            return Err(BesError::ConnectionClosed(format!(
                "client {} abandoned a request before reading its response",
                self.id
            )));
        }
        self.framed_mut()?;
        self.in_flight = true;
        Ok(())
    }

    async fn write_request(&mut self, payload: &[u8]) -> Result<()> {
        self.begin_request()?;
        let framed = self.framed_mut()?;
        let result = framed.write_message(payload).await;
        if result.is_ok() {
            self.commands_sent += 1;
            debug!(
                id = %self.id,
                command = self.commands_sent,
                bytes = payload.len(),
                "Request sent"
            );
        }
        self.settle(result)
    }

    /// Send `request` and read the response into the two sinks.
    ///
    /// Returns `Ok(false)` when the BES flagged the response as an error; the
    /// diagnostic text is then in `errors`.
    pub async fn send<D, E>(
        &mut self,
        request: &Document,
        data: &mut D,
        errors: &mut E,
    ) -> Result<bool>
    where
        D: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        self.send_bytes(request.to_xml().as_bytes(), data, errors)
            .await
    }

    /// Like [`send`](Self::send) for a pre-serialised request.
    pub async fn send_bytes<D, E>(
        &mut self,
        payload: &[u8],
        data: &mut D,
        errors: &mut E,
    ) -> Result<bool>
    where
        D: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        self.write_request(payload).await?;

        let read_timeout = self.config.read_timeout;
        let framed = self.framed_mut()?;
        let outcome = within(read_timeout, framed.read_message(data, errors)).await;
        self.in_flight = false;
        self.settle(outcome)
    }

    /// Send `payload` and collect the whole response body.
    ///
    /// A response flagged with `status=error` becomes [`BesError::Backend`]
    /// and leaves the connection usable.
    pub async fn request_bytes(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.write_request(payload).await?;

        let read_timeout = self.config.read_timeout;
        let framed = self.framed_mut()?;
        let outcome = within(read_timeout, async {
            let mut body = Vec::new();
            framed
                .message_reader()
                .read_to_end(&mut body)
                .await
                .map_err(classify_read_error)?;
            Ok::<_, BesError>(body)
        })
        .await;
        self.in_flight = false;
        self.settle(outcome)
    }

    /// Send a plain text BES command as one message.
    pub async fn execute_command<D, E>(
        &mut self,
        command: &str,
        data: &mut D,
        errors: &mut E,
    ) -> Result<bool>
    where
        D: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        debug!(id = %self.id, command = command, "Executing command");
        self.send_bytes(command.as_bytes(), data, errors).await
    }

    /// Run a `;`-separated command list, one message per command.
    ///
    /// Stops at the first command the BES reports as failed and returns
    /// `Ok(false)`.
    pub async fn execute_commands<D, E>(
        &mut self,
        commands: &str,
        data: &mut D,
        errors: &mut E,
    ) -> Result<bool>
    where
        D: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        for command in commands.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let command = format!("{};", command);
            if !self.execute_command(&command, data, errors).await? {
                warn!(
                    id = %self.id,
                    command = %command,
                    "BES reported an error, skipping remaining commands"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Close the connection, optionally sending the exit token first.
    ///
    /// Idempotent. Failures while informing the peer or shutting down are
    /// logged and not returned. The exit token is skipped when an abandoned
    /// request left the stream mid-message.
    pub async fn close(&mut self, inform_peer: bool) -> Result<()> {
        let abandoned = std::mem::take(&mut self.in_flight);
        let Some(mut framed) = self.framed.take() else {
            return Ok(());
        };

        if inform_peer && !abandoned && !framed.is_closed() {
            if let Err(e) = handshake::farewell(framed.get_mut()).await {
                error!(
                    id = %self.id,
                    error = %e,
                    "Failed to inform BES that the client is exiting"
                );
            }
        }
        if let Err(e) = framed.get_mut().shutdown().await {
            debug!(id = %self.id, error = %e, "Error shutting down BES connection");
        }

        info!(
            id = %self.id,
            peer = %self.peer,
            commands = self.commands_sent,
            "Connection to BES closed"
        );
        Ok(())
    }

    /// Drop the connection without the exit handshake.
    pub fn kill(&mut self) {
        self.in_flight = false;
        if self.framed.take().is_some() {
            warn!(id = %self.id, peer = %self.peer, "Client killed");
        }
    }
}
