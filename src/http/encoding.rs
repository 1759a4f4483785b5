//! Content-encoding negotiation and streaming compression
//!
//! The client's `Accept-Encoding` is read as an unweighted token set and the
//! first of gzip, br, deflate it accepts wins. The chosen encoder is applied
//! chunk by chunk while the file is streamed, so a response never holds more
//! than one read buffer plus the encoder's window in memory.

use brotli::CompressorWriter;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use futures_util::{stream, Stream, StreamExt};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_LG_WINDOW: u32 = 22;

/// Response content coding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Brotli,
    Deflate,
    Identity,
}

impl ContentEncoding {
    /// Preference order on tie, first match wins
    const PREFERENCE: [Self; 3] = [Self::Gzip, Self::Brotli, Self::Deflate];

    pub const fn token(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Brotli => "br",
            Self::Deflate => "deflate",
            Self::Identity => "identity",
        }
    }

    /// Value for the `Content-Encoding` header, `None` for identity
    pub fn header_value(self) -> Option<HeaderValue> {
        match self {
            Self::Identity => None,
            other => Some(HeaderValue::from_static(other.token())),
        }
    }

    pub fn encoder(self) -> Option<ChunkEncoder> {
        ChunkEncoder::new(self)
    }
}

/// Choose a content coding from the request's `Accept-Encoding`
pub fn negotiate(request_headers: &HeaderMap) -> ContentEncoding {
    let accepted: Vec<String> = request_headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| {
            token
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect();

    ContentEncoding::PREFERENCE
        .into_iter()
        .find(|encoding| accepted.iter().any(|t| t == encoding.token()))
        .unwrap_or(ContentEncoding::Identity)
}

/// Write target the encoders emit into; drained after every chunk
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn drain(&self) -> io::Result<Bytes> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("encoder sink poisoned"))?;
        Ok(Bytes::from(std::mem::take(&mut *buf)))
    }
}

impl Write for SharedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("encoder sink poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Inner {
    Gzip(GzEncoder<SharedSink>),
    Deflate(ZlibEncoder<SharedSink>),
    Brotli(Box<CompressorWriter<SharedSink>>),
}

/// Incremental compressor: feed chunks, collect whatever output is ready
pub struct ChunkEncoder {
    inner: Inner,
    sink: SharedSink,
}

impl ChunkEncoder {
    fn new(encoding: ContentEncoding) -> Option<Self> {
        let sink = SharedSink::default();
        let inner = match encoding {
            ContentEncoding::Gzip => Inner::Gzip(GzEncoder::new(sink.clone(), Compression::default())),
            ContentEncoding::Deflate => {
                Inner::Deflate(ZlibEncoder::new(sink.clone(), Compression::default()))
            }
            ContentEncoding::Brotli => Inner::Brotli(Box::new(CompressorWriter::new(
                sink.clone(),
                BROTLI_BUFFER_SIZE,
                BROTLI_QUALITY,
                BROTLI_LG_WINDOW,
            ))),
            ContentEncoding::Identity => return None,
        };
        Some(Self { inner, sink })
    }

    /// Compress one chunk, returning the output produced so far (may be empty)
    pub fn encode(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        match &mut self.inner {
            Inner::Gzip(w) => w.write_all(chunk)?,
            Inner::Deflate(w) => w.write_all(chunk)?,
            Inner::Brotli(w) => w.write_all(chunk)?,
        }
        self.sink.drain()
    }

    /// Terminate the compressed stream and return the trailing bytes
    pub fn finish(self) -> io::Result<Bytes> {
        match self.inner {
            Inner::Gzip(w) => {
                w.finish()?;
            }
            Inner::Deflate(w) => {
                w.finish()?;
            }
            Inner::Brotli(w) => {
                // into_inner writes the final brotli block
                let _ = (*w).into_inner();
            }
        }
        self.sink.drain()
    }
}

/// Interpose `encoder` in a byte stream; the trailer is emitted after the
/// source ends. Errors end the stream.
pub fn compress_stream<S>(
    source: S,
    encoder: ChunkEncoder,
) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    stream::unfold(Some((source, encoder)), |state| async move {
        let (mut source, mut encoder) = state?;
        loop {
            match source.next().await {
                Some(Ok(chunk)) => match encoder.encode(&chunk) {
                    Ok(out) if out.is_empty() => {}
                    Ok(out) => return Some((Ok(out), Some((source, encoder)))),
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(e), None)),
                None => return Some((encoder.finish(), None)),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_preference_order() {
        assert_eq!(negotiate(&accept("gzip, br")), ContentEncoding::Gzip);
        assert_eq!(negotiate(&accept("br, gzip")), ContentEncoding::Gzip);
        assert_eq!(negotiate(&accept("deflate, br")), ContentEncoding::Brotli);
        assert_eq!(negotiate(&accept("deflate")), ContentEncoding::Deflate);
    }

    #[test]
    fn test_identity() {
        assert_eq!(negotiate(&accept("identity")), ContentEncoding::Identity);
        assert_eq!(negotiate(&HeaderMap::new()), ContentEncoding::Identity);
        assert_eq!(negotiate(&accept("zstd")), ContentEncoding::Identity);
        assert!(ContentEncoding::Identity.header_value().is_none());
        assert!(ContentEncoding::Identity.encoder().is_none());
    }

    #[test]
    fn test_tokens_ignore_params_and_case() {
        assert_eq!(negotiate(&accept("GZIP;q=0.5")), ContentEncoding::Gzip);
        assert_eq!(negotiate(&accept("x-gzip")), ContentEncoding::Identity);
    }

    async fn run(encoding: ContentEncoding, chunks: Vec<&'static [u8]>) -> Vec<u8> {
        let source = stream::iter(chunks.into_iter().map(|c| Ok::<_, io::Error>(Bytes::from_static(c))));
        let encoder = encoding.encoder().unwrap();
        let parts: Vec<io::Result<Bytes>> = compress_stream(source, encoder).collect().await;
        parts
            .into_iter()
            .flat_map(|p| p.unwrap().to_vec())
            .collect()
    }

    #[tokio::test]
    async fn test_gzip_stream_decodes() {
        let out = run(ContentEncoding::Gzip, vec![&b"hello "[..], &b"world"[..]]).await;
        let mut decoded = String::new();
        GzDecoder::new(out.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "hello world");
    }

    #[tokio::test]
    async fn test_deflate_stream_decodes() {
        let out = run(ContentEncoding::Deflate, vec![&b"abc"[..]; 3]).await;
        let mut decoded = String::new();
        ZlibDecoder::new(out.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "abcabcabc");
    }

    #[tokio::test]
    async fn test_brotli_stream_decodes() {
        let out = run(ContentEncoding::Brotli, vec![&b"brotli "[..], &b"body"[..]]).await;
        let mut decoded = String::new();
        brotli::Decompressor::new(out.as_slice(), 4096)
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "brotli body");
    }

    #[tokio::test]
    async fn test_empty_source_still_terminates_stream() {
        let out = run(ContentEncoding::Gzip, vec![]).await;
        let mut decoded = Vec::new();
        GzDecoder::new(out.as_slice()).read_to_end(&mut decoded).unwrap();
        assert!(decoded.is_empty());
    }
}
