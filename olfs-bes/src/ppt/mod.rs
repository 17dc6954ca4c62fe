//! PPT: the chunked point-to-point transport spoken by the BES
//!
//! Layers, bottom up:
//!
//! - [`chunk`]: 8-byte chunk headers and the closing chunk
//! - [`extension`]: `name=value;` control records carried in extension chunks
//! - [`framed`]: whole messages over a byte stream, with error demultiplexing
//! - [`handshake`]: the un-framed connect and exit exchanges
//! - [`client`]: one connection, one request at a time

pub mod chunk;
pub mod client;
pub mod config;
pub mod extension;
pub mod framed;
pub mod handshake;

pub use chunk::{ChunkHeader, ChunkKind, CLOSING_CHUNK, MAX_CHUNK_SIZE};
pub use client::Client;
pub use config::{TransportConfig, TransportConfigBuilder};
pub use extension::{ExtensionRecord, Status};
pub use framed::{FramedStream, MessageReader};
