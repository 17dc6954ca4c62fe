//! Connection handshake and farewell
//!
//! Both exchanges use bare ASCII sentinels written directly to the socket,
//! before (or after) any chunk framing is in play.

use crate::error::{BesError, Result};
use crate::ppt::config::TransportConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

/// Liveness probe sent by the client on connect
pub const CLIENT_TESTING: &str = "<client-testing>";

/// Reply from a BES ready to accept requests
pub const SERVER_OK: &str = "<server-ok>";

/// Reply from a BES that is not ready (down, busy, or overloaded)
pub const PROTOCOL_UNDEFINED: &str = "<protocol-undefined>";

/// Token sent by the client before it hangs up
pub const EXIT_NOW: &str = "<exit-now>";

const REPLY_BUFFER_SIZE: usize = 4096;

enum Reply {
    Ok { surplus: usize },
    Undefined,
    Partial,
    Invalid,
}

fn classify(reply: &[u8]) -> Reply {
    let ok = SERVER_OK.as_bytes();
    let undefined = PROTOCOL_UNDEFINED.as_bytes();

    if reply.starts_with(ok) {
        Reply::Ok {
            surplus: reply.len() - ok.len(),
        }
    } else if reply.starts_with(undefined) {
        Reply::Undefined
    } else if ok.starts_with(reply) || undefined.starts_with(reply) {
        Reply::Partial
    } else {
        Reply::Invalid
    }
}

/// Run the connect-time liveness exchange.
///
/// The reply may arrive split across several reads. An end-of-stream before
/// any reply byte is retried `handshake_eof_retries` times.
pub async fn initiate<S>(stream: &mut S, config: &TransportConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(CLIENT_TESTING.as_bytes()).await?;
    stream.flush().await?;
    debug!("Sent {} to server", CLIENT_TESTING);

    let mut reply = Vec::with_capacity(PROTOCOL_UNDEFINED.len());
    let mut buf = vec![0u8; REPLY_BUFFER_SIZE];
    let mut eof_attempts = 0u32;

    loop {
        let n = stream.read(&mut buf).await?;

        if n == 0 {
            if reply.is_empty() && eof_attempts < config.handshake_eof_retries {
                eof_attempts += 1;
                debug!(
                    attempt = eof_attempts,
                    "End of stream while waiting for handshake reply, retrying after {:?}",
                    config.handshake_retry_delay
                );
                tokio::time::sleep(config.handshake_retry_delay).await;
                continue;
            }
            error!("Connection closed before the handshake completed");
            return Err(BesError::HandshakeFailed(
                "connection closed before the server replied".to_string(),
            ));
        }

        reply.extend_from_slice(&buf[..n]);

        match classify(&reply) {
            Reply::Ok { surplus } => {
                if surplus > 0 {
                    warn!(bytes = surplus, "Discarding bytes that followed the handshake reply");
                }
                debug!("Received {} from server", SERVER_OK);
                return Ok(());
            }
            Reply::Undefined => {
                error!("Received {} from server", PROTOCOL_UNDEFINED);
                return Err(BesError::HandshakeFailed(
                    "could not connect to server, server may be down or busy".to_string(),
                ));
            }
            Reply::Invalid => {
                let status = String::from_utf8_lossy(&reply).into_owned();
                error!(status = %status, "Received unrecognized handshake status");
                return Err(BesError::HandshakeFailed(format!(
                    "server reported an invalid connection status {:?}",
                    status
                )));
            }
            Reply::Partial => continue,
        }
    }
}

/// Tell the peer the client is leaving.
pub async fn farewell<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(EXIT_NOW.as_bytes()).await?;
    stream.flush().await?;
    debug!("Sent {} to server", EXIT_NOW);
    Ok(())
}
