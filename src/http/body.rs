//! Request/response body framing beyond a fixed `Content-Length`.
//!
//! [RFC 7230 §3.3.3](https://datatracker.ietf.org/doc/html/rfc7230#section-3.3.3)
//! lists three ways a message body's length is determined; this module
//! covers the two the parser's `Content-Length` fast path doesn't:
//! chunked transfer-coding and close-delimited (HTTP/1.0, no
//! `Content-Length`, body runs until the connection closes).
use crate::errors::ErrorKind;
use memchr::memchr;

/// Which framing a message body uses, decided from the presence of
/// `Transfer-Encoding: chunked` / `Content-Length` on the parsed headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyMode {
    /// No body at all (e.g. `GET` with neither header).
    Empty,
    /// Exactly `len` bytes, already fully buffered.
    Identity(usize),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// No `Content-Length`, no chunking: body is everything read until
    /// the peer closes the connection. Only valid on responses read by
    /// the client engine; a server never emits this as a *request*
    /// framing since the client can't signal close-based bodies.
    Close,
}

impl BodyMode {
    #[inline]
    pub(crate) fn select(content_length: Option<usize>, chunked: bool) -> Self {
        match (chunked, content_length) {
            (true, _) => BodyMode::Chunked,
            (false, Some(len)) => BodyMode::Identity(len),
            (false, None) => BodyMode::Empty,
        }
    }
}

/// Decodes a chunked-transfer-coded body in place, compacting the
/// buffer so the decoded payload ends up contiguous at its front
/// (overwriting the chunk-size lines and trailer bytes it consumes).
///
/// This keeps the connection engine's zero-allocation design intact:
/// decoding reuses the same read buffer `Parser` already owns instead
/// of assembling the body into a fresh `Vec`.
///
/// Trailers are scanned (to correctly locate the end of the message
/// and keep connection framing intact) but discarded: they are not
/// surfaced on [`Request`](crate::Request).
///
/// Returns `(body_len, consumed_len)`: the decoded payload occupies
/// `buffer[..body_len]`, and `consumed_len` is how many bytes of the
/// original (pre-decode) buffer the chunked message took up.
pub(crate) fn decode_in_place(buffer: &mut [u8]) -> Result<(usize, usize), ErrorKind> {
    let mut read = 0;
    let mut write = 0;

    loop {
        let line_end = find_line_end(buffer, read)?;
        let size = parse_hex_size(strip_extensions(&buffer[read..line_end]))?;
        read = line_end + 1;

        if size == 0 {
            read = skip_trailers(buffer, read)?;
            return Ok((write, read));
        }

        let chunk_end = read.checked_add(size).ok_or(ErrorKind::InvalidChunkSize)?;
        if chunk_end > buffer.len() {
            return Err(ErrorKind::InvalidChunkSize);
        }

        buffer.copy_within(read..chunk_end, write);
        write += size;
        read = chunk_end;

        match buffer.get(read..read + 2) {
            Some(b"\r\n") => read += 2,
            _ => return Err(ErrorKind::InvalidChunkSize),
        }
    }
}

#[inline]
fn find_line_end(buffer: &[u8], from: usize) -> Result<usize, ErrorKind> {
    let rest = buffer.get(from..).ok_or(ErrorKind::InvalidChunkSize)?;
    let nl = memchr(b'\n', rest).ok_or(ErrorKind::InvalidChunkSize)?;
    Ok(from + nl)
}

/// Drains header-shaped trailer lines up to the terminating blank
/// line, returning the position just past it. Grammar matches a
/// normal header line; malformed trailers are rejected the same way
/// malformed headers are.
fn skip_trailers(buffer: &[u8], mut pos: usize) -> Result<usize, ErrorKind> {
    loop {
        let line_end = find_line_end(buffer, pos)?;
        let line = &buffer[pos..line_end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        pos = line_end + 1;

        if line.is_empty() {
            return Ok(pos);
        }
        if memchr(b':', line).is_none() {
            return Err(ErrorKind::MalformedTrailer);
        }
    }
}

#[inline]
fn strip_extensions(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match memchr(b';', line) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

#[inline]
fn parse_hex_size(line: &[u8]) -> Result<usize, ErrorKind> {
    if line.is_empty() || line.len() > 16 {
        return Err(ErrorKind::InvalidChunkSize);
    }

    let mut size: usize = 0;
    for &byte in line {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => return Err(ErrorKind::InvalidChunkSize),
        };
        size = size
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit as usize))
            .ok_or(ErrorKind::InvalidChunkSize)?;
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_chunk() {
        let mut buf = *b"5\r\nhello\r\n0\r\n\r\n";
        let (len, consumed) = decode_in_place(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn decodes_multiple_chunks() {
        let mut buf = *b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let (len, _) = decode_in_place(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"Wikipedia");
    }

    #[test]
    fn strips_chunk_extensions() {
        let mut buf = *b"5;name=value\r\nhello\r\n0\r\n\r\n";
        let (len, _) = decode_in_place(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
    }

    #[test]
    fn drains_trailers() {
        let mut buf = *b"3\r\nabc\r\n0\r\nX-Checksum: deadbeef\r\n\r\n";
        let (len, consumed) = decode_in_place(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"abc");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn rejects_bad_trailer() {
        let mut buf = *b"3\r\nabc\r\n0\r\nnot-a-header\r\n\r\n";
        assert_eq!(decode_in_place(&mut buf), Err(ErrorKind::MalformedTrailer));
    }

    #[test]
    fn rejects_truncated_chunk() {
        let mut buf = *b"10\r\nshort\r\n";
        assert_eq!(decode_in_place(&mut buf), Err(ErrorKind::InvalidChunkSize));
    }

    #[test]
    fn rejects_non_hex_size() {
        let mut buf = *b"zz\r\nhello\r\n0\r\n\r\n";
        assert_eq!(decode_in_place(&mut buf), Err(ErrorKind::InvalidChunkSize));
    }

    #[test]
    fn body_mode_selection() {
        assert_eq!(BodyMode::select(None, false), BodyMode::Empty);
        assert_eq!(BodyMode::select(Some(10), false), BodyMode::Identity(10));
        assert_eq!(BodyMode::select(Some(10), true), BodyMode::Chunked);
        assert_eq!(BodyMode::select(None, true), BodyMode::Chunked);
    }
}
