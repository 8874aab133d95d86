//! Format v4: chunked streaming encryption.
//!
//! Every chunk is `4 ‖ varint(chunk_size) ‖ resource_id(16) ‖ iv_seed(24) ‖
//! ciphertext ‖ mac(16)` and all chunk headers are byte-identical; the chunk
//! IV is the seed with the chunk index XOR-folded in, which pins every chunk
//! to its position. A chunk shorter than `chunk_size` terminates the stream;
//! when the plaintext fills the last chunk exactly, an empty terminal chunk
//! follows.

use std::collections::VecDeque;

use async_trait::async_trait;

use cv_chain::ser::{varint_size, write_varint, Reader};
use cv_chain::ResourceId;
use cv_crypto::{aead, rand, AeadIv, Mac, SymmetricKey};

use crate::error::Error;

pub const STREAM_VERSION: u64 = 4;
pub const DEFAULT_ENCRYPTED_CHUNK_SIZE: usize = 1024 * 1024;

fn stream_error(message: &str) -> Error {
    Error::DecryptionFailed(message.into())
}

// ── Input sources ────────────────────────────────────────────────────────────

/// A pull source of bytes. `read` returns 0 only at end of stream.
#[async_trait(?Send)]
pub trait InputSource {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error>;
}

pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

#[async_trait(?Send)]
impl InputSource for SliceSource<'_> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let n = out.len().min(self.data.len());
        out[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Buffering adapter providing lookahead over any source: `peek` without
/// consuming, `read` replays peeked bytes first-in-first-out.
pub struct PeekableSource<S> {
    inner: S,
    buffer: VecDeque<u8>,
    eof: bool,
}

impl<S: InputSource> PeekableSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: VecDeque::new(),
            eof: false,
        }
    }

    async fn fill(&mut self, target: usize) -> Result<(), Error> {
        let mut scratch = [0u8; 4096];
        while self.buffer.len() < target && !self.eof {
            let want = (target - self.buffer.len()).min(scratch.len());
            let n = self.inner.read(&mut scratch[..want]).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buffer.extend(&scratch[..n]);
            }
        }
        Ok(())
    }

    /// Up to `count` bytes of lookahead; shorter only at end of stream.
    pub async fn peek(&mut self, count: usize) -> Result<Vec<u8>, Error> {
        self.fill(count).await?;
        Ok(self
            .buffer
            .iter()
            .copied()
            .take(count)
            .collect())
    }
}

#[async_trait(?Send)]
impl<S: InputSource> InputSource for PeekableSource<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if self.buffer.is_empty() {
            if self.eof {
                return Ok(0);
            }
            return self.inner.read(out).await;
        }
        let n = out.len().min(self.buffer.len());
        for slot in out.iter_mut().take(n) {
            *slot = self.buffer.pop_front().expect("checked non-empty");
        }
        Ok(n)
    }
}

/// Read exactly `buf.len()` bytes or report how many were available.
async fn read_full<S: InputSource>(source: &mut S, buf: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub encrypted_chunk_size: usize,
    pub resource_id: ResourceId,
    pub iv_seed: AeadIv,
}

impl StreamHeader {
    pub fn serialized_size(&self) -> usize {
        varint_size(STREAM_VERSION)
            + varint_size(self.encrypted_chunk_size as u64)
            + ResourceId::SIZE
            + AeadIv::SIZE
    }

    /// Bytes of a chunk that are not plaintext: header plus trailing MAC.
    pub fn chunk_overhead(&self) -> usize {
        self.serialized_size() + Mac::SIZE
    }

    pub fn clear_chunk_size(&self) -> usize {
        self.encrypted_chunk_size - self.chunk_overhead()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        write_varint(&mut out, STREAM_VERSION);
        write_varint(&mut out, self.encrypted_chunk_size as u64);
        out.extend_from_slice(self.resource_id.as_ref());
        out.extend_from_slice(self.iv_seed.as_ref());
        out
    }

    pub fn from_reader(reader: &mut Reader<'_>) -> Result<Self, Error> {
        let version = reader
            .read_varint()
            .map_err(|_| stream_error("truncated stream header"))?;
        if version != STREAM_VERSION {
            return Err(stream_error("bad stream version"));
        }
        let encrypted_chunk_size = reader
            .read_varint()
            .map_err(|_| stream_error("truncated stream header"))?
            as usize;
        let resource_id = ResourceId::try_from(
            reader
                .read_exact(ResourceId::SIZE)
                .map_err(|_| stream_error("truncated stream header"))?,
        )?;
        let iv_seed = AeadIv::try_from(
            reader
                .read_exact(AeadIv::SIZE)
                .map_err(|_| stream_error("truncated stream header"))?,
        )?;
        let header = Self {
            encrypted_chunk_size,
            resource_id,
            iv_seed,
        };
        if encrypted_chunk_size <= header.chunk_overhead() {
            return Err(stream_error("invalid encrypted chunk size"));
        }
        Ok(header)
    }
}

/// XOR the chunk index into the IV seed.
fn chunk_iv(seed: &AeadIv, chunk_index: u64) -> AeadIv {
    let mut bytes = *seed.as_bytes();
    for (slot, byte) in bytes.iter_mut().zip(chunk_index.to_le_bytes()) {
        *slot ^= byte;
    }
    AeadIv::from(bytes)
}

// ── Size probes (invalid_argument on malformed buffers) ──────────────────────

fn parse_header_prefix(encrypted: &[u8]) -> Result<StreamHeader, Error> {
    let mut reader = Reader::new(encrypted);
    StreamHeader::from_reader(&mut reader)
        .map_err(|_| Error::InvalidArgument("truncated encrypted buffer".into()))
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, Error> {
    Ok(parse_header_prefix(encrypted)?.resource_id)
}

pub fn encrypted_size(clear_size: usize, encrypted_chunk_size: usize) -> usize {
    let header = StreamHeader {
        encrypted_chunk_size,
        resource_id: ResourceId::from([0u8; 16]),
        iv_seed: AeadIv::default(),
    };
    let clear_chunk = header.clear_chunk_size();
    let full_chunks = clear_size / clear_chunk;
    let remainder = clear_size % clear_chunk;
    full_chunks * encrypted_chunk_size + header.serialized_size() + remainder + Mac::SIZE
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<usize, Error> {
    let header = parse_header_prefix(encrypted)?;
    let chunk_size = header.encrypted_chunk_size;
    let full_chunks = encrypted.len() / chunk_size;
    let remainder = encrypted.len() % chunk_size;
    if remainder == 0 {
        // A stream always ends on a short chunk.
        return Err(Error::InvalidArgument("missing terminal chunk".into()));
    }
    if remainder < header.chunk_overhead() {
        return Err(Error::InvalidArgument("truncated encrypted buffer".into()));
    }
    Ok(full_chunks * header.clear_chunk_size() + remainder - header.chunk_overhead())
}

// ── Encryption stream ────────────────────────────────────────────────────────

pub struct EncryptionStream<S> {
    source: S,
    key: SymmetricKey,
    header: StreamHeader,
    header_bytes: Vec<u8>,
    chunk_index: u64,
    pending: VecDeque<u8>,
    done: bool,
}

impl<S: InputSource> EncryptionStream<S> {
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_ENCRYPTED_CHUNK_SIZE)
            .expect("default chunk size is valid")
    }

    pub fn with_chunk_size(source: S, encrypted_chunk_size: usize) -> Result<Self, Error> {
        let mut resource_id = [0u8; ResourceId::SIZE];
        rand::random_fill(&mut resource_id);
        let header = StreamHeader {
            encrypted_chunk_size,
            resource_id: ResourceId::from(resource_id),
            iv_seed: rand::make_aead_iv(),
        };
        if encrypted_chunk_size <= header.chunk_overhead() {
            return Err(Error::InvalidArgument("encrypted chunk size too small".into()));
        }
        let header_bytes = header.to_bytes();
        Ok(Self {
            source,
            key: rand::make_symmetric_key(),
            header,
            header_bytes,
            chunk_index: 0,
            pending: VecDeque::new(),
            done: false,
        })
    }

    pub fn resource_id(&self) -> ResourceId {
        self.header.resource_id
    }

    pub fn symmetric_key(&self) -> SymmetricKey {
        self.key.clone()
    }

    async fn produce_chunk(&mut self) -> Result<(), Error> {
        let mut clear = vec![0u8; self.header.clear_chunk_size()];
        let got = read_full(&mut self.source, &mut clear).await?;
        clear.truncate(got);

        let iv = chunk_iv(&self.header.iv_seed, self.chunk_index);
        let ciphertext = aead::aead_encrypt(&self.key, &iv, &clear, &[])?;
        self.pending.extend(self.header_bytes.iter());
        self.pending.extend(ciphertext.iter());
        self.chunk_index += 1;
        if got < self.header.clear_chunk_size() {
            self.done = true;
        }
        Ok(())
    }

    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

#[async_trait(?Send)]
impl<S: InputSource> InputSource for EncryptionStream<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        while self.pending.is_empty() {
            if self.done {
                return Ok(0);
            }
            self.produce_chunk().await?;
        }
        let n = out.len().min(self.pending.len());
        for slot in out.iter_mut().take(n) {
            *slot = self.pending.pop_front().expect("checked non-empty");
        }
        Ok(n)
    }
}

// ── Decryption stream ────────────────────────────────────────────────────────

/// First phase: the header is read and validated, the resource id is known,
/// but no key has been resolved yet.
pub struct DecryptionStreamInit<S> {
    source: PeekableSource<S>,
    header: StreamHeader,
    header_bytes: Vec<u8>,
}

impl<S: InputSource> DecryptionStreamInit<S> {
    pub async fn read_header(source: S) -> Result<Self, Error> {
        let mut source = PeekableSource::new(source);
        // Longest possible header: version + 10-byte varint + ids.
        let lookahead = source
            .peek(1 + 10 + ResourceId::SIZE + AeadIv::SIZE)
            .await?;
        let mut reader = Reader::new(&lookahead);
        let header = StreamHeader::from_reader(&mut reader)?;
        let header_bytes = header.to_bytes();
        let mut consumed = vec![0u8; header_bytes.len()];
        read_full(&mut source, &mut consumed).await?;
        Ok(Self {
            source,
            header,
            header_bytes,
        })
    }

    pub fn resource_id(&self) -> ResourceId {
        self.header.resource_id
    }

    /// Second phase: decrypt the first chunk eagerly so a wrong key or a
    /// corrupt stream fails here, not on the first read.
    pub async fn into_stream(self, key: SymmetricKey) -> Result<DecryptionStream<S>, Error> {
        let mut stream = DecryptionStream {
            source: self.source,
            key,
            header: self.header,
            header_bytes: self.header_bytes,
            chunk_index: 0,
            pending: VecDeque::new(),
            done: false,
        };
        stream.read_body().await?;
        Ok(stream)
    }
}

pub struct DecryptionStream<S> {
    source: PeekableSource<S>,
    key: SymmetricKey,
    header: StreamHeader,
    header_bytes: Vec<u8>,
    chunk_index: u64,
    pending: VecDeque<u8>,
    done: bool,
}

impl<S: InputSource> DecryptionStream<S> {
    /// Read and decrypt one chunk body (the header was already consumed).
    async fn read_body(&mut self) -> Result<(), Error> {
        let body_size = self.header.encrypted_chunk_size - self.header_bytes.len();
        let mut body = vec![0u8; body_size];
        let got = read_full(&mut self.source, &mut body).await?;
        body.truncate(got);
        if body.len() < Mac::SIZE {
            return Err(stream_error("truncated chunk"));
        }

        let iv = chunk_iv(&self.header.iv_seed, self.chunk_index);
        let clear = aead::aead_decrypt(&self.key, &iv, &body, &[])
            .map_err(|_| stream_error("chunk authentication failed"))?;
        self.pending.extend(clear.iter());
        self.chunk_index += 1;

        if self.header_bytes.len() + body.len() < self.header.encrypted_chunk_size {
            // Terminal chunk: nothing may follow it.
            self.done = true;
            if !self.source.peek(1).await?.is_empty() {
                return Err(stream_error("trailing data after terminal chunk"));
            }
        }
        Ok(())
    }

    /// Read and check the next chunk's header, which must be byte-identical
    /// to the first one.
    async fn read_next_chunk(&mut self) -> Result<(), Error> {
        let mut header = vec![0u8; self.header_bytes.len()];
        let got = read_full(&mut self.source, &mut header).await?;
        if got < header.len() {
            return Err(stream_error("truncated chunk header"));
        }
        if header != self.header_bytes {
            return Err(stream_error("chunk headers differ"));
        }
        self.read_body().await
    }

    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

#[async_trait(?Send)]
impl<S: InputSource> InputSource for DecryptionStream<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        while self.pending.is_empty() {
            if self.done {
                return Ok(0);
            }
            self.read_next_chunk().await?;
        }
        let n = out.len().min(self.pending.len());
        for slot in out.iter_mut().take(n) {
            *slot = self.pending.pop_front().expect("checked non-empty");
        }
        Ok(n)
    }
}

/// Decrypt a whole v4 buffer with a known key.
pub async fn decrypt_buffer<S: InputSource>(
    key: SymmetricKey,
    source: S,
) -> Result<Vec<u8>, Error> {
    let init = DecryptionStreamInit::read_header(source).await?;
    let mut stream = init.into_stream(key).await?;
    stream.read_to_end().await
}
