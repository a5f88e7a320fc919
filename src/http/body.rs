//! Message body framing
//!
//! `BodyDecoder` turns the bytes that follow a head into body pieces for
//! all three framings; `ChunkedEncoder` produces chunked transfer coding for
//! bodies of unknown length. `relay_body` drives a decoder between a socket
//! and an output without ever holding more than one read buffer.

use super::protocol::{BodyFraming, HttpProtocolError};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Longest chunk-size or trailer line accepted
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkDataEnd,
    Trailer,
    UntilClose,
    Done,
}

/// Decoder yielding the pieces of one message body
///
/// Bytes after the end of the body are left untouched in the source buffer.
#[derive(Debug)]
pub struct BodyDecoder {
    state: State,
}

impl BodyDecoder {
    pub fn new(framing: BodyFraming) -> Self {
        let state = match framing {
            BodyFraming::Length(0) => State::Done,
            BodyFraming::Length(n) => State::Length { remaining: n },
            BodyFraming::Chunked => State::ChunkSize,
            BodyFraming::UntilClose => State::UntilClose,
        };
        Self { state }
    }

    /// True once the whole body, including any chunked trailer, was consumed
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }
}

fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, HttpProtocolError> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = src.split_to(pos);
            src.advance(2);
            Ok(Some(line))
        }
        None if src.len() > MAX_CHUNK_LINE => Err(HttpProtocolError::InvalidChunk(format!(
            "line longer than {MAX_CHUNK_LINE} bytes"
        ))),
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, HttpProtocolError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| HttpProtocolError::InvalidChunk("non-ASCII chunk size".to_string()))?;
    // extensions after ';' are ignored
    let size = line.split(';').next().unwrap_or_default().trim();
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HttpProtocolError::InvalidChunk(format!(
            "invalid chunk size line: {line:?}"
        )));
    }
    u64::from_str_radix(size, 16)
        .map_err(|e| HttpProtocolError::InvalidChunk(format!("chunk size {size}: {e}")))
}

/// Splits at most `remaining` bytes off the front of `src`
fn take_data(src: &mut BytesMut, remaining: u64) -> (Bytes, u64) {
    let take = remaining.min(src.len() as u64) as usize;
    (src.split_to(take).freeze(), remaining - take as u64)
}

impl Decoder for BodyDecoder {
    type Item = Bytes;
    type Error = HttpProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, HttpProtocolError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Length { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let (data, left) = take_data(src, remaining);
                    self.state = if left == 0 {
                        State::Done
                    } else {
                        State::Length { remaining: left }
                    };
                    return Ok(Some(data));
                }
                State::UntilClose => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(src.split().freeze()));
                }
                State::ChunkSize => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::ChunkData { remaining: size }
                    };
                }
                State::ChunkData { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let (data, left) = take_data(src, remaining);
                    self.state = if left == 0 {
                        State::ChunkDataEnd
                    } else {
                        State::ChunkData { remaining: left }
                    };
                    return Ok(Some(data));
                }
                State::ChunkDataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(HttpProtocolError::InvalidChunk(
                            "missing CRLF after chunk data".to_string(),
                        ));
                    }
                    src.advance(2);
                    self.state = State::ChunkSize;
                }
                State::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = State::Done;
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, HttpProtocolError> {
        if let Some(data) = self.decode(src)? {
            return Ok(Some(data));
        }
        match self.state {
            State::Done => Ok(None),
            State::UntilClose => {
                self.state = State::Done;
                Ok(None)
            }
            _ => Err(HttpProtocolError::IncompleteBody),
        }
    }
}

/// Encoder for chunked transfer coding
///
/// Empty items are skipped, since a zero-size chunk ends the body. Call
/// [`ChunkedEncoder::finish`] once the input is exhausted.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkedEncoder;

impl ChunkedEncoder {
    /// Writes the last-chunk marker and the empty trailer section
    pub fn finish(&self, dst: &mut BytesMut) {
        dst.put_slice(b"0\r\n\r\n");
    }
}

impl Encoder<Bytes> for ChunkedEncoder {
    type Error = HttpProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), HttpProtocolError> {
        if item.is_empty() {
            return Ok(());
        }
        let size_line = format!("{:x}\r\n", item.len());
        dst.reserve(size_line.len() + item.len() + 2);
        dst.put_slice(size_line.as_bytes());
        dst.put_slice(&item);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Streams one message body from `reader` to `writer`
///
/// `buf` holds whatever was read past the head; on return it holds whatever
/// followed the body. Each decoded piece is written as soon as it is
/// available. Returns the number of body bytes relayed.
pub async fn relay_body<R, W>(
    reader: &mut R,
    buf: &mut BytesMut,
    framing: BodyFraming,
    writer: &mut W,
    read_size: usize,
) -> Result<u64, HttpProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut decoder = BodyDecoder::new(framing);
    let mut relayed = 0u64;

    loop {
        if let Some(data) = decoder.decode(buf)? {
            writer.write_all(&data).await?;
            relayed += data.len() as u64;
            continue;
        }
        if decoder.is_done() {
            break;
        }

        buf.reserve(read_size);
        if reader.read_buf(buf).await? == 0 {
            while let Some(data) = decoder.decode_eof(buf)? {
                writer.write_all(&data).await?;
                relayed += data.len() as u64;
            }
            break;
        }
    }

    writer.flush().await?;
    Ok(relayed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(framing: BodyFraming, raw: &[u8]) -> (Vec<u8>, BytesMut, bool) {
        let mut decoder = BodyDecoder::new(framing);
        let mut src = BytesMut::from(raw);
        let mut body = Vec::new();
        while let Some(data) = decoder.decode(&mut src).unwrap() {
            body.extend_from_slice(&data);
        }
        (body, src, decoder.is_done())
    }

    #[test]
    fn test_length_body_leaves_pipelined_bytes() {
        let (body, rest, done) = decode_all(BodyFraming::Length(5), b"helloGET / HTTP/1.1");
        assert_eq!(body, b"hello");
        assert_eq!(&rest[..], b"GET / HTTP/1.1");
        assert!(done);
    }

    #[test]
    fn test_length_body_across_reads() {
        let mut decoder = BodyDecoder::new(BodyFraming::Length(6));
        let mut src = BytesMut::from(&b"abc"[..]);

        assert_eq!(decoder.decode(&mut src).unwrap().unwrap(), &b"abc"[..]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(!decoder.is_done());

        src.extend_from_slice(b"defg");
        assert_eq!(decoder.decode(&mut src).unwrap().unwrap(), &b"def"[..]);
        assert!(decoder.is_done());
        assert_eq!(&src[..], b"g");
    }

    #[test]
    fn test_zero_length_is_done() {
        let decoder = BodyDecoder::new(BodyFraming::Length(0));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_chunked_with_extensions_and_trailers() {
        let raw = b"5;name=value\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: yes\r\n\r\nnext";
        let (body, rest, done) = decode_all(BodyFraming::Chunked, raw);
        assert_eq!(body, b"hello world");
        assert_eq!(&rest[..], b"next");
        assert!(done);
    }

    #[test]
    fn test_chunked_uppercase_hex() {
        let mut raw = b"1A\r\n".to_vec();
        raw.extend_from_slice(&[b'z'; 26]);
        raw.extend_from_slice(b"\r\n0\r\n\r\n");
        let (body, _, done) = decode_all(BodyFraming::Chunked, &raw);
        assert_eq!(body.len(), 26);
        assert!(done);
    }

    #[test]
    fn test_chunked_partial_size_line() {
        let (body, rest, done) = decode_all(BodyFraming::Chunked, b"5\r\nhello\r\n1");
        assert_eq!(body, b"hello");
        assert_eq!(&rest[..], b"1");
        assert!(!done);
    }

    #[test]
    fn test_chunked_invalid_size() {
        let mut decoder = BodyDecoder::new(BodyFraming::Chunked);
        let mut src = BytesMut::from(&b"zz\r\n"[..]);
        let err = decoder.decode(&mut src).unwrap_err();
        assert!(matches!(err, HttpProtocolError::InvalidChunk(_)));
    }

    #[test]
    fn test_chunked_missing_crlf() {
        let mut decoder = BodyDecoder::new(BodyFraming::Chunked);
        let mut src = BytesMut::from(&b"3\r\nabcXY"[..]);
        assert_eq!(decoder.decode(&mut src).unwrap().unwrap(), &b"abc"[..]);
        let err = decoder.decode(&mut src).unwrap_err();
        assert!(matches!(err, HttpProtocolError::InvalidChunk(_)));
    }

    #[test]
    fn test_chunk_line_too_long() {
        let mut decoder = BodyDecoder::new(BodyFraming::Chunked);
        let mut src = BytesMut::from(vec![b'1'; MAX_CHUNK_LINE + 1].as_slice());
        assert!(decoder.decode(&mut src).is_err());
    }

    #[test]
    fn test_until_close_ends_at_eof() {
        let mut decoder = BodyDecoder::new(BodyFraming::UntilClose);
        let mut src = BytesMut::from(&b"all of it"[..]);
        assert_eq!(decoder.decode(&mut src).unwrap().unwrap(), &b"all of it"[..]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(!decoder.is_done());

        assert!(decoder.decode_eof(&mut src).unwrap().is_none());
        assert!(decoder.is_done());
    }

    #[test]
    fn test_eof_mid_body_is_incomplete() {
        let mut decoder = BodyDecoder::new(BodyFraming::Length(10));
        let mut src = BytesMut::from(&b"short"[..]);
        assert_eq!(decoder.decode_eof(&mut src).unwrap().unwrap(), &b"short"[..]);
        let err = decoder.decode_eof(&mut src).unwrap_err();
        assert!(matches!(err, HttpProtocolError::IncompleteBody));
    }

    #[test]
    fn test_chunked_encoder_output() {
        let mut encoder = ChunkedEncoder;
        let mut dst = BytesMut::new();
        encoder.encode(Bytes::from_static(b"hello world"), &mut dst).unwrap();
        encoder.encode(Bytes::new(), &mut dst).unwrap();
        encoder.finish(&mut dst);
        assert_eq!(&dst[..], b"b\r\nhello world\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn test_relay_body_streams_to_writer() {
        let mut reader: &[u8] = b" world\r\n0\r\n\r\n";
        let mut buf = BytesMut::from(&b"b\r\nhello"[..]);
        let mut out = Vec::new();

        let relayed = relay_body(&mut reader, &mut buf, BodyFraming::Chunked, &mut out, 16)
            .await
            .unwrap();
        assert_eq!(relayed, 11);
        assert_eq!(out, b"hello world");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_relay_body_truncated() {
        let mut reader: &[u8] = b"lo";
        let mut buf = BytesMut::from(&b"hel"[..]);
        let mut out = Vec::new();

        let err = relay_body(&mut reader, &mut buf, BodyFraming::Length(10), &mut out, 16)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpProtocolError::IncompleteBody));
        // the prefix that did arrive was still relayed
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_relay_body_until_close() {
        let mut reader: &[u8] = b"rest of the stream";
        let mut buf = BytesMut::new();
        let mut out = Vec::new();

        let relayed = relay_body(&mut reader, &mut buf, BodyFraming::UntilClose, &mut out, 4)
            .await
            .unwrap();
        assert_eq!(relayed, 18);
        assert_eq!(out, b"rest of the stream");
    }
}
