use crate::{CsvPipelineError, CsvResult};
use bytes::{Bytes, BytesMut};
use futures::{ready, Stream, StreamExt};
use memchr::memchr;
use std::borrow::Cow;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::codec::Decoder;

/// Splits a byte buffer at `\n`, keeping the terminator on each line.
///
/// Bytes after the last `\n` stay in the source buffer until more input
/// arrives or `decode_eof` flushes them as the final line.
#[derive(Debug, Default)]
pub(crate) struct LineCodec {
    // Bytes already scanned without finding a newline.
    next_index: usize,
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = CsvPipelineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match memchr(b'\n', &src[self.next_index..]) {
            Some(pos) => {
                let end = self.next_index + pos + 1;
                self.next_index = 0;
                Ok(Some(src.split_to(end).freeze()))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.split().freeze()))
        }
    }
}

/// Line content without its `\n` / `\r\n` terminator.
pub(crate) fn line_content(raw: &[u8]) -> &[u8] {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub(crate) fn line_text(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(line_content(raw))
}

/// Re-frames a stream of byte chunks into logical lines.
///
/// Upstream errors are passed through as-is; the owning stage decides
/// whether to stop.
pub(crate) struct LineFramer<S> {
    upstream: S,
    codec: LineCodec,
    buffer: BytesMut,
    eof: bool,
}

impl<S> LineFramer<S> {
    pub(crate) fn new(upstream: S) -> Self {
        Self {
            upstream,
            codec: LineCodec::default(),
            buffer: BytesMut::new(),
            eof: false,
        }
    }
}

impl<S, B> Stream for LineFramer<S>
where
    S: Stream<Item = CsvResult<B>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = CsvResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.eof {
                return Poll::Ready(this.codec.decode_eof(&mut this.buffer).transpose());
            }
            match this.codec.decode(&mut this.buffer) {
                Ok(Some(line)) => return Poll::Ready(Some(Ok(line))),
                Ok(None) => {}
                Err(e) => return Poll::Ready(Some(Err(e))),
            }
            match ready!(this.upstream.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => this.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => this.eof = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn frame(parts: &[&'static str]) -> Vec<String> {
        let chunks: Vec<CsvResult<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        LineFramer::new(stream::iter(chunks))
            .map(|line| String::from_utf8(line.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[test]
    fn decode_keeps_partial_line_buffered() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"a,b\nc,"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Bytes::from_static(b"a,b\n"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"c,");

        buf.extend_from_slice(b"d\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Bytes::from_static(b"c,d\n"));
    }

    #[test]
    fn decode_eof_flushes_unterminated_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"tail"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), Bytes::from_static(b"tail"));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn line_content_strips_terminators() {
        assert_eq!(line_content(b"x,y\r\n"), b"x,y");
        assert_eq!(line_content(b"x,y\n"), b"x,y");
        assert_eq!(line_content(b"x,y"), b"x,y");
    }

    #[tokio::test]
    async fn lines_straddling_chunks_are_rejoined() {
        let lines = frame(&["na", "me,age\nJo", "hn,3", "0\n", "Jane,25"]).await;
        assert_eq!(lines, vec!["name,age\n", "John,30\n", "Jane,25"]);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        assert!(frame(&[]).await.is_empty());
        assert!(frame(&["", ""]).await.is_empty());
    }
}
