//! Chunk-framed message stream
//!
//! [`FramedStream`] wraps a connected byte stream and moves whole messages
//! across it. Outbound data is split into chunks no larger than
//! [`MAX_CHUNK_SIZE`] and terminated with the closing chunk. Inbound messages
//! can be consumed two ways:
//!
//! - [`FramedStream::read_message`] demultiplexes data and error detail into
//!   two sinks and reports whether the peer signalled `status=error`.
//! - [`FramedStream::message_reader`] exposes the message as a plain
//!   [`AsyncRead`] that ends at the closing chunk, for handing to a parser.
//!
//! Any I/O failure or malformed header marks the stream closed; a partially
//! read message is never resumed.

use crate::error::{BackendError, BesError, Result};
use crate::ppt::chunk::{
    decode_header, encode_header, ChunkHeader, ChunkKind, CLOSING_CHUNK, HEADER_SIZE,
    MAX_CHUNK_SIZE,
};
use crate::ppt::extension::{ExtensionRecord, Status};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, error};

const DEFAULT_BUFFER_SIZE: usize = 10_240;

/// What an extension record asks the reader to do
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ExtensionEffect {
    error: bool,
    emergency_exit: bool,
    exit: bool,
}

fn interpret_extension(record: &ExtensionRecord) -> ExtensionEffect {
    let mut effect = ExtensionEffect::default();
    for status in record.statuses() {
        match status {
            Status::Error => effect.error = true,
            Status::EmergencyExit => effect.emergency_exit = true,
            Status::Exit => effect.exit = true,
            Status::Other(value) => debug!(status = %value, "Received status extension"),
        }
    }
    for (name, value) in record.unrecognized() {
        debug!(name = %name, value = %value, "Ignoring unrecognized extension");
    }
    effect
}

/// A byte stream carrying chunk-framed messages in both directions.
pub struct FramedStream<S> {
    inner: S,
    buffer: Vec<u8>,
    current: ChunkHeader,
    position: usize,
    closed: bool,
    peer_exiting: bool,
}

impl<S> FramedStream<S> {
    pub fn new(inner: S) -> Self {
        Self::with_buffer_size(inner, DEFAULT_BUFFER_SIZE)
    }

    /// `buffer_size` bounds how many payload bytes move per read.
    pub fn with_buffer_size(inner: S, buffer_size: usize) -> Self {
        Self {
            inner,
            buffer: vec![0u8; buffer_size.max(1)],
            current: ChunkHeader::closing(),
            position: 0,
            closed: false,
            peer_exiting: false,
        }
    }

    /// True when the most recently read header was the closing chunk.
    pub fn is_last_chunk(&self) -> bool {
        self.current.is_closing()
    }

    /// Unread payload bytes left in the current chunk.
    pub fn available_in_current_chunk(&self) -> usize {
        self.current.size.saturating_sub(self.position)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the stream unusable without touching the underlying transport.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(BesError::ConnectionClosed(
                "framed stream is closed".to_string(),
            ));
        }
        Ok(())
    }

    fn fail(&mut self, e: io::Error) -> BesError {
        self.closed = true;
        BesError::Transport(e)
    }

    fn set_current(&mut self, header: ChunkHeader) {
        self.current = header;
        self.position = 0;
    }

    /// Apply the connection-level part of an extension. Returns the effect so
    /// callers can latch the error state.
    fn apply_extension(&mut self, payload: &[u8]) -> ExtensionEffect {
        let record = ExtensionRecord::parse(&String::from_utf8_lossy(payload));
        let effect = interpret_extension(&record);
        if effect.emergency_exit {
            error!("Stream source requested an emergency exit, closing connection");
            self.closed = true;
        }
        if effect.exit {
            debug!("Stream source announced it is exiting");
            self.peer_exiting = true;
        }
        effect
    }

    fn finish_message(&mut self) {
        if self.peer_exiting {
            debug!("Stream closed by source");
            self.closed = true;
        }
    }
}

impl<S> FramedStream<S>
where
    S: AsyncWrite + Unpin,
{
    /// Write one chunk. Empty data chunks are skipped because a zero-length
    /// data chunk would terminate the message.
    pub async fn write_chunk(&mut self, kind: ChunkKind, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if payload.is_empty() && kind == ChunkKind::Data {
            return Ok(());
        }

        let header = encode_header(payload.len(), kind)?;
        debug!(size = payload.len(), kind = %kind, "Writing chunk");

        if let Err(e) = self.inner.write_all(&header).await {
            return Err(self.fail(e));
        }
        if let Err(e) = self.inner.write_all(payload).await {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Write application data, split into as many chunks as needed.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write_data_in_pieces(data, MAX_CHUNK_SIZE).await
    }

    pub(crate) async fn write_data_in_pieces(
        &mut self,
        data: &[u8],
        max_piece: usize,
    ) -> Result<()> {
        for piece in data.chunks(max_piece.clamp(1, MAX_CHUNK_SIZE)) {
            self.write_chunk(ChunkKind::Data, piece).await?;
        }
        Ok(())
    }

    pub async fn write_extension(&mut self, record: &ExtensionRecord) -> Result<()> {
        self.write_chunk(ChunkKind::Extension, record.to_payload().as_bytes())
            .await
    }

    /// Terminate the current message with the closing chunk and flush.
    pub async fn finish(&mut self) -> Result<()> {
        self.ensure_open()?;
        debug!("Writing closing chunk");
        if let Err(e) = self.inner.write_all(&CLOSING_CHUNK).await {
            return Err(self.fail(e));
        }
        if let Err(e) = self.inner.flush().await {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Write `data` as one complete message.
    pub async fn write_message(&mut self, data: &[u8]) -> Result<()> {
        self.write_data(data).await?;
        self.finish().await
    }

    /// Write a message flagged with `status=error` carrying `detail`.
    pub async fn write_error_message(&mut self, detail: &[u8]) -> Result<()> {
        self.write_extension(&ExtensionRecord::status(Status::Error))
            .await?;
        self.write_data(detail).await?;
        self.finish().await
    }

    /// Shut down the write half of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.closed = true;
        self.inner.shutdown().await?;
        Ok(())
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + Unpin,
{
    async fn read_header(&mut self) -> Result<ChunkHeader> {
        let mut raw = [0u8; HEADER_SIZE];
        if let Err(e) = self.inner.read_exact(&mut raw).await {
            return Err(self.fail(e));
        }
        let header = match decode_header(&raw) {
            Ok(header) => header,
            Err(e) => {
                self.closed = true;
                return Err(e);
            }
        };
        debug!(size = header.size, kind = %header.kind, "Read chunk header");
        self.set_current(header);
        Ok(header)
    }

    async fn read_payload(&mut self, len: usize) -> Result<()> {
        let result = self.inner.read_exact(&mut self.buffer[..len]).await;
        if let Err(e) = result {
            return Err(self.fail(e));
        }
        self.position += len;
        Ok(())
    }

    /// Read one message, routing data to `data` and, once the peer has
    /// signalled `status=error`, to `errors` for the rest of the message.
    ///
    /// Returns `false` if the error state was latched at any point.
    pub async fn read_message<D, E>(&mut self, data: &mut D, errors: &mut E) -> Result<bool>
    where
        D: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        self.ensure_open()?;

        let mut is_error = false;
        let mut bytes_read: u64 = 0;

        loop {
            let header = self.read_header().await?;
            if header.is_closing() {
                break;
            }

            match header.kind {
                ChunkKind::Data => {
                    while self.available_in_current_chunk() > 0 {
                        let n = self.available_in_current_chunk().min(self.buffer.len());
                        self.read_payload(n).await?;
                        bytes_read += n as u64;

                        let written = if is_error {
                            errors.write_all(&self.buffer[..n]).await
                        } else {
                            data.write_all(&self.buffer[..n]).await
                        };
                        if let Err(e) = written {
                            return Err(self.fail(e));
                        }
                    }
                }
                ChunkKind::Extension => {
                    // grows only as bytes arrive, never to the advertised size up front
                    let mut payload = Vec::new();
                    while self.available_in_current_chunk() > 0 {
                        let n = self.available_in_current_chunk().min(self.buffer.len());
                        self.read_payload(n).await?;
                        payload.extend_from_slice(&self.buffer[..n]);
                    }

                    let effect = self.apply_extension(&payload);
                    is_error |= effect.error;
                    if effect.emergency_exit {
                        return Err(BesError::ConnectionClosed(
                            "peer requested an emergency exit".to_string(),
                        ));
                    }
                }
            }
        }

        if let Err(e) = data.flush().await {
            return Err(self.fail(e));
        }
        if let Err(e) = errors.flush().await {
            return Err(self.fail(e));
        }

        debug!(bytes = bytes_read, error = is_error, "Message read complete");
        self.finish_message();
        Ok(!is_error)
    }

    /// Byte-stream view over the next inbound message.
    ///
    /// The reader yields data bytes until the closing chunk, then reports
    /// end-of-stream. Extension chunks are consumed transparently. If the
    /// peer flags the message with `status=error`, the remaining data is
    /// collected as diagnostic detail and the read that reaches the closing
    /// chunk fails with an `io::Error` wrapping a [`BackendError`].
    pub fn message_reader(&mut self) -> MessageReader<'_, S> {
        MessageReader {
            stream: self,
            state: ReadState::Header,
            header: [0u8; HEADER_SIZE],
            header_filled: 0,
            extension: Vec::new(),
            error_detail: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Header,
    Data,
    Extension,
    Done,
}

/// [`AsyncRead`] over a single chunked message. See
/// [`FramedStream::message_reader`].
pub struct MessageReader<'a, S> {
    stream: &'a mut FramedStream<S>,
    state: ReadState,
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    extension: Vec<u8>,
    error_detail: Option<Vec<u8>>,
}

impl<S> MessageReader<'_, S> {
    /// True once a `status=error` extension has been seen.
    pub fn error_latched(&self) -> bool {
        self.error_detail.is_some()
    }

    /// True once the closing chunk has been consumed.
    pub fn is_done(&self) -> bool {
        self.state == ReadState::Done
    }
}

fn eof_mid_message() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed in the middle of a chunked message",
    )
}

impl<S> AsyncRead for MessageReader<'_, S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            match this.state {
                ReadState::Done => return Poll::Ready(Ok(())),

                ReadState::Header => {
                    if this.stream.closed {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::NotConnected,
                            "framed stream is closed",
                        )));
                    }
                    while this.header_filled < HEADER_SIZE {
                        let filled = this.header_filled;
                        let mut rb = ReadBuf::new(&mut this.header[filled..]);
                        if let Err(e) =
                            ready!(Pin::new(&mut this.stream.inner).poll_read(cx, &mut rb))
                        {
                            this.stream.closed = true;
                            return Poll::Ready(Err(e));
                        }
                        let n = rb.filled().len();
                        if n == 0 {
                            this.stream.closed = true;
                            return Poll::Ready(Err(eof_mid_message()));
                        }
                        this.header_filled += n;
                    }
                    this.header_filled = 0;

                    let header = match decode_header(&this.header) {
                        Ok(header) => header,
                        Err(e) => {
                            this.stream.closed = true;
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                e.to_string(),
                            )));
                        }
                    };
                    debug!(size = header.size, kind = %header.kind, "Read chunk header");
                    this.stream.set_current(header);

                    if header.is_closing() {
                        this.state = ReadState::Done;
                        this.stream.finish_message();
                        if let Some(detail) = this.error_detail.take() {
                            return Poll::Ready(Err(io::Error::other(
                                BackendError::from_detail(&detail),
                            )));
                        }
                        return Poll::Ready(Ok(()));
                    }

                    this.state = match header.kind {
                        ChunkKind::Data => ReadState::Data,
                        ChunkKind::Extension => {
                            this.extension.clear();
                            ReadState::Extension
                        }
                    };
                }

                ReadState::Data => {
                    let remaining = this.stream.available_in_current_chunk();
                    if remaining == 0 {
                        this.state = ReadState::Header;
                        continue;
                    }

                    let stream = &mut *this.stream;
                    let latched = this.error_detail.is_some();
                    let mut want = remaining.min(stream.buffer.len());
                    if !latched {
                        if out.remaining() == 0 {
                            return Poll::Ready(Ok(()));
                        }
                        want = want.min(out.remaining());
                    }

                    let mut rb = ReadBuf::new(&mut stream.buffer[..want]);
                    if let Err(e) = ready!(Pin::new(&mut stream.inner).poll_read(cx, &mut rb)) {
                        stream.closed = true;
                        return Poll::Ready(Err(e));
                    }
                    let n = rb.filled().len();
                    if n == 0 {
                        stream.closed = true;
                        return Poll::Ready(Err(eof_mid_message()));
                    }
                    stream.position += n;

                    match this.error_detail.as_mut() {
                        Some(detail) => detail.extend_from_slice(&stream.buffer[..n]),
                        None => {
                            out.put_slice(&stream.buffer[..n]);
                            return Poll::Ready(Ok(()));
                        }
                    }
                }

                ReadState::Extension => {
                    let stream = &mut *this.stream;
                    while stream.available_in_current_chunk() > 0 {
                        let want = stream.available_in_current_chunk().min(stream.buffer.len());
                        let mut rb = ReadBuf::new(&mut stream.buffer[..want]);
                        if let Err(e) =
                            ready!(Pin::new(&mut stream.inner).poll_read(cx, &mut rb))
                        {
                            stream.closed = true;
                            return Poll::Ready(Err(e));
                        }
                        let n = rb.filled().len();
                        if n == 0 {
                            stream.closed = true;
                            return Poll::Ready(Err(eof_mid_message()));
                        }
                        stream.position += n;
                        this.extension.extend_from_slice(&stream.buffer[..n]);
                    }

                    let effect = stream.apply_extension(&this.extension);
                    if effect.error && this.error_detail.is_none() {
                        this.error_detail = Some(Vec::new());
                    }
                    if effect.emergency_exit {
                        this.state = ReadState::Done;
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::ConnectionAborted,
                            "peer requested an emergency exit",
                        )));
                    }
                    this.state = ReadState::Header;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn framed_pair(
        buffer_size: usize,
    ) -> (
        FramedStream<tokio::io::DuplexStream>,
        FramedStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            FramedStream::with_buffer_size(a, buffer_size),
            FramedStream::with_buffer_size(b, buffer_size),
        )
    }

    #[tokio::test]
    async fn test_write_message_wire_format() {
        let mut framed = FramedStream::new(Vec::new());
        framed.write_message(b"This Is The First Chunk!").await.unwrap();
        assert_eq!(
            framed.get_ref().as_slice(),
            b"0000018dThis Is The First Chunk!0000000d"
        );
    }

    #[tokio::test]
    async fn test_write_error_message_wire_format() {
        let mut framed = FramedStream::new(Vec::new());
        framed.write_error_message(b"bad").await.unwrap();
        assert_eq!(
            framed.get_ref().as_slice(),
            b"000000dxstatus=error;0000003dbad0000000d"
        );
    }

    #[tokio::test]
    async fn test_empty_message_is_just_closing_chunk() {
        let mut framed = FramedStream::new(Vec::new());
        framed.write_message(b"").await.unwrap();
        assert_eq!(framed.get_ref().as_slice(), &CLOSING_CHUNK);
    }

    #[tokio::test]
    async fn test_read_message_across_chunks() {
        let mut writer = FramedStream::new(Vec::new());
        writer.write_chunk(ChunkKind::Data, b"This Is The First Chunk!").await.unwrap();
        writer.write_chunk(ChunkKind::Data, b"This Is The Second Chunk!").await.unwrap();
        writer.finish().await.unwrap();
        let bytes = writer.into_inner();

        let mut reader = FramedStream::with_buffer_size(bytes.as_slice(), 7);
        let mut data = Vec::new();
        let mut errors = Vec::new();
        let ok = reader.read_message(&mut data, &mut errors).await.unwrap();

        assert!(ok);
        assert_eq!(data, b"This Is The First Chunk!This Is The Second Chunk!");
        assert!(errors.is_empty());
        assert!(reader.is_last_chunk());
        assert_eq!(reader.available_in_current_chunk(), 0);
    }

    #[tokio::test]
    async fn test_error_latch_is_monotonic() {
        let mut writer = FramedStream::new(Vec::new());
        writer.write_chunk(ChunkKind::Data, b"before;").await.unwrap();
        writer
            .write_extension(&ExtensionRecord::status(Status::Error))
            .await
            .unwrap();
        writer.write_chunk(ChunkKind::Data, b"first;").await.unwrap();
        writer
            .write_extension(&ExtensionRecord::status(Status::Other("ok".into())))
            .await
            .unwrap();
        writer.write_chunk(ChunkKind::Data, b"second").await.unwrap();
        writer.finish().await.unwrap();
        let bytes = writer.into_inner();

        let mut reader = FramedStream::new(bytes.as_slice());
        let mut data = Vec::new();
        let mut errors = Vec::new();
        let ok = reader.read_message(&mut data, &mut errors).await.unwrap();

        assert!(!ok);
        assert_eq!(data, b"before;");
        assert_eq!(errors, b"first;second");
        assert!(!reader.is_closed());
    }

    #[tokio::test]
    async fn test_unrecognized_extension_is_ignored() {
        let mut writer = FramedStream::new(Vec::new());
        writer
            .write_extension(&ExtensionRecord::new().with("count", "7"))
            .await
            .unwrap();
        writer.write_message(b"payload").await.unwrap();

        let bytes = writer.into_inner();
        let mut reader = FramedStream::new(bytes.as_slice());
        let mut data = Vec::new();
        let mut errors = Vec::new();
        assert!(reader.read_message(&mut data, &mut errors).await.unwrap());
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn test_malformed_header_closes_stream() {
        let bytes: &[u8] = b"00000zzdpayload0000000d";
        let mut reader = FramedStream::new(bytes);
        let mut data = Vec::new();
        let mut errors = Vec::new();

        let err = reader.read_message(&mut data, &mut errors).await.unwrap_err();
        assert!(matches!(err, BesError::MalformedHeader(_)));
        assert!(reader.is_closed());

        let again = reader.read_message(&mut data, &mut errors).await.unwrap_err();
        assert!(matches!(again, BesError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_truncated_message_is_transport_error() {
        let bytes: &[u8] = b"0000010dshort";
        let mut reader = FramedStream::new(bytes);
        let mut data = Vec::new();
        let mut errors = Vec::new();

        let err = reader.read_message(&mut data, &mut errors).await.unwrap_err();
        assert!(matches!(err, BesError::Transport(_)));
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_exit_status_closes_after_message() {
        let mut writer = FramedStream::new(Vec::new());
        writer
            .write_extension(&ExtensionRecord::status(Status::Exit))
            .await
            .unwrap();
        writer.write_message(b"bye").await.unwrap();

        let bytes = writer.into_inner();
        let mut reader = FramedStream::new(bytes.as_slice());
        let mut data = Vec::new();
        let mut errors = Vec::new();
        assert!(reader.read_message(&mut data, &mut errors).await.unwrap());
        assert_eq!(data, b"bye");
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_emergency_exit_aborts_message() {
        let mut writer = FramedStream::new(Vec::new());
        writer.write_chunk(ChunkKind::Data, b"partial").await.unwrap();
        writer
            .write_extension(&ExtensionRecord::status(Status::EmergencyExit))
            .await
            .unwrap();
        writer.write_message(b"never read").await.unwrap();

        let bytes = writer.into_inner();
        let mut reader = FramedStream::new(bytes.as_slice());
        let mut data = Vec::new();
        let mut errors = Vec::new();
        let err = reader.read_message(&mut data, &mut errors).await.unwrap_err();
        assert!(matches!(err, BesError::ConnectionClosed(_)));
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_message_reader_stream_view() {
        let (mut server, mut client) = framed_pair(5).await;

        server.write_chunk(ChunkKind::Data, b"<response>").await.unwrap();
        server
            .write_extension(&ExtensionRecord::new().with("count", "1"))
            .await
            .unwrap();
        server.write_chunk(ChunkKind::Data, b"catalog").await.unwrap();
        server.write_chunk(ChunkKind::Data, b"</response>").await.unwrap();
        server.finish().await.unwrap();
        server.write_message(b"next message").await.unwrap();

        let mut body = Vec::new();
        {
            let mut reader = client.message_reader();
            reader.read_to_end(&mut body).await.unwrap();
            assert!(reader.is_done());
        }
        assert_eq!(body, b"<response>catalog</response>");
        assert!(client.is_last_chunk());

        let mut data = Vec::new();
        let mut errors = Vec::new();
        assert!(client.read_message(&mut data, &mut errors).await.unwrap());
        assert_eq!(data, b"next message");
    }

    #[tokio::test]
    async fn test_message_reader_reports_backend_error() {
        let (mut server, mut client) = framed_pair(64).await;
        server
            .write_error_message(b"<BESError>Unable to open file</BESError>")
            .await
            .unwrap();

        let mut body = Vec::new();
        let err = client
            .message_reader()
            .read_to_end(&mut body)
            .await
            .unwrap_err();

        assert!(body.is_empty());
        let backend = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<BackendError>())
            .expect("backend error payload");
        assert!(backend.message().contains("Unable to open file"));
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_write_data_splits_into_pieces() {
        let mut writer = FramedStream::new(Vec::new());
        writer.write_data_in_pieces(b"abcdefghij", 4).await.unwrap();
        writer.finish().await.unwrap();
        assert_eq!(
            writer.get_ref().as_slice(),
            b"0000004dabcd0000004defgh0000002dij0000000d"
        );

        let bytes = writer.into_inner();
        let mut reader = FramedStream::new(bytes.as_slice());
        let mut data = Vec::new();
        let mut errors = Vec::new();
        assert!(reader.read_message(&mut data, &mut errors).await.unwrap());
        assert_eq!(data, b"abcdefghij");
    }

    #[tokio::test]
    async fn test_extension_read_through_small_buffer() {
        let mut writer = FramedStream::new(Vec::new());
        writer
            .write_extension(&ExtensionRecord::status(Status::Error).with("count", "12"))
            .await
            .unwrap();
        writer.write_message(b"denied").await.unwrap();

        let bytes = writer.into_inner();
        let mut reader = FramedStream::with_buffer_size(bytes.as_slice(), 3);
        let mut data = Vec::new();
        let mut errors = Vec::new();
        assert!(!reader.read_message(&mut data, &mut errors).await.unwrap());
        assert!(data.is_empty());
        assert_eq!(errors, b"denied");
    }

    #[tokio::test]
    async fn test_oversized_extension_header_with_short_payload() {
        // advertises a 256 MiB extension but the stream ends after a few bytes
        let bytes: &[u8] = b"fffffffxstatus=";
        let mut reader = FramedStream::new(bytes);
        let mut data = Vec::new();
        let mut errors = Vec::new();

        let err = reader.read_message(&mut data, &mut errors).await.unwrap_err();
        assert!(matches!(err, BesError::Transport(_)));
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_write_after_close_is_rejected() {
        let (mut framed, _peer) = framed_pair(16).await;
        framed.shutdown().await.unwrap();
        let err = framed.write_message(b"late").await.unwrap_err();
        assert!(matches!(err, BesError::ConnectionClosed(_)));
    }
}
