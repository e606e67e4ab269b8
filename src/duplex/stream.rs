//! Framed byte-stream duplex.
//!
//! Adapts any Tokio `AsyncRead`/`AsyncWrite` pair (a TCP connection, a pipe,
//! an in-process `tokio::io::duplex`) into a message [`Duplex`]. Each message
//! is framed as a 4-byte big-endian length followed by the UTF-8 payload.

use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::macros::{log_debug, log_warn};
use crate::sync::lock_ignore_poison;
use crate::{Duplex, Error, Inbox, Result};

/// Maximum payload size of a single frame (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

type Sink = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Message duplex over a byte stream.
///
/// Two background tasks own the stream halves: one decodes inbound frames
/// into the registered inbox, the other encodes queued messages. Must be
/// created inside a Tokio runtime.
pub struct StreamDuplex {
    // ---
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    sink: Sink,
    reader_task: JoinHandle<()>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamDuplex {
    /// Wrap a reader/writer pair.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // ---
        let sink: Sink = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(Self::read_loop(reader, sink.clone()));
        let writer_task = tokio::spawn(Self::write_loop(writer, rx));

        Self {
            outbound: Mutex::new(Some(tx)),
            sink,
            reader_task,
            writer_task: Mutex::new(Some(writer_task)),
        }
    }

    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        // ---
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }

    async fn read_loop<R>(mut reader: R, sink: Sink)
    where
        R: AsyncRead + Unpin,
    {
        // ---
        let mut buf = BytesMut::with_capacity(8 * 1024);

        loop {
            match read_frame(&mut reader, &mut buf).await {
                Ok(Some(body)) => {
                    // The frame is already consumed, so a bad body costs only itself.
                    let payload = match String::from_utf8(body.to_vec()) {
                        Ok(payload) => payload,
                        Err(e) => {
                            log_warn!("stream duplex: dropping frame that is not valid UTF-8: {e}");
                            continue;
                        }
                    };
                    let delivered = match lock_ignore_poison(&sink).as_ref() {
                        Some(tx) => tx.send(payload).is_ok(),
                        None => false,
                    };
                    if !delivered {
                        log_debug!("stream duplex: no inbox registered, frame dropped");
                    }
                }
                Ok(None) => {
                    log_debug!("stream duplex: remote closed the stream");
                    break;
                }
                Err(e) => {
                    log_warn!("stream duplex: read failed: {e}");
                    break;
                }
            }
        }

        // Closing the sink ends the consumer's receive loop.
        lock_ignore_poison(&sink).take();
    }

    async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        // ---
        while let Some(payload) = rx.recv().await {
            let frame = match encode_frame(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    log_warn!("stream duplex: {e}");
                    continue;
                }
            };

            if let Err(e) = write_frame(&mut writer, &frame).await {
                log_warn!("stream duplex: write failed: {e}");
                return;
            }
        }

        if let Err(_e) = writer.shutdown().await {
            log_debug!("stream duplex: shutting the writer down failed: {_e}");
        }
        log_debug!("stream duplex: writer stopped");
    }
}

#[async_trait::async_trait]
impl Duplex for StreamDuplex {
    // ---
    fn send(&self, payload: String) -> Result<()> {
        // ---
        if payload.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let outbound = lock_ignore_poison(&self.outbound);
        let tx = outbound
            .as_ref()
            .ok_or_else(|| Error::Duplex("stream duplex closed".into()))?;
        tx.send(payload)
            .map_err(|_| Error::Duplex("stream duplex writer stopped".into()))
    }

    fn on_message(&self) -> Result<Inbox> {
        // ---
        if self.reader_task.is_finished() {
            return Err(Error::Duplex("stream duplex closed".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock_ignore_poison(&self.sink) = Some(tx);
        Ok(Inbox { messages: rx })
    }

    /// Flush queued messages, shut the writer down and stop reading.
    async fn close(&self) -> Result<()> {
        // ---
        lock_ignore_poison(&self.outbound).take();

        let writer_task = lock_ignore_poison(&self.writer_task).take();
        if let Some(task) = writer_task {
            if let Err(_e) = task.await {
                log_debug!("stream duplex: writer task ended abnormally: {_e}");
            }
        }

        self.reader_task.abort();
        lock_ignore_poison(&self.sink).take();
        Ok(())
    }
}

impl Drop for StreamDuplex {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Encode one payload as a length-prefixed frame.
fn encode_frame(payload: &str) -> Result<Bytes> {
    // ---
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload.as_bytes());
    Ok(frame.freeze())
}

/// Split one complete frame body off the front of `buf`, if there is one.
fn decode_frame(buf: &mut BytesMut) -> Result<Option<BytesMut>> {
    // ---
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    if buf.len() < HEADER_LEN + len {
        buf.reserve(HEADER_LEN + len - buf.len());
        return Ok(None);
    }

    buf.advance(HEADER_LEN);
    Ok(Some(buf.split_to(len)))
}

/// Read the next frame body; `Ok(None)` on a clean end of stream.
async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<BytesMut>>
where
    R: AsyncRead + Unpin,
{
    // ---
    loop {
        if let Some(body) = decode_frame(buf)? {
            return Ok(Some(body));
        }

        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame",
            )));
        }
    }
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // ---
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn connected_pair() -> (StreamDuplex, StreamDuplex) {
        let (a, b) = tokio::io::duplex(1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            StreamDuplex::new(a_read, a_write),
            StreamDuplex::new(b_read, b_write),
        )
    }

    #[test]
    fn test_frame_layout() {
        // ---
        let frame = encode_frame("hi").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_decode_waits_for_whole_frame() {
        // ---
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 5, b'h', b'e']);
        assert_eq!(decode_frame(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"llo");
        buf.extend_from_slice(&[0, 0]);
        assert_eq!(decode_frame(&mut buf).unwrap().as_deref(), Some(&b"hello"[..]));
        // The start of the next header stays buffered.
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_rejects_oversize_header() {
        // ---
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE as u32 + 1);
        assert!(matches!(
            decode_frame(&mut buf),
            Err(Error::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_messages_cross_the_stream() {
        // ---
        let (left, right) = connected_pair();
        let mut left_inbox = left.on_message().unwrap();
        let mut right_inbox = right.on_message().unwrap();

        left.send("one".into()).unwrap();
        left.send("two".into()).unwrap();
        right.send("back".into()).unwrap();

        let wait = Duration::from_secs(1);
        assert_eq!(timeout(wait, right_inbox.messages.recv()).await.unwrap().as_deref(), Some("one"));
        assert_eq!(timeout(wait, right_inbox.messages.recv()).await.unwrap().as_deref(), Some("two"));
        assert_eq!(timeout(wait, left_inbox.messages.recv()).await.unwrap().as_deref(), Some("back"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_frame_is_skipped() {
        // ---
        let (mut raw, stream) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(stream);
        let duplex = StreamDuplex::new(read_half, write_half);
        let mut inbox = duplex.on_message().unwrap();

        raw.write_all(&[0, 0, 0, 2, 0xff, 0xfe]).await.unwrap();
        raw.write_all(&encode_frame("still reading").unwrap()).await.unwrap();

        let wait = Duration::from_secs(1);
        assert_eq!(
            timeout(wait, inbox.messages.recv()).await.unwrap().as_deref(),
            Some("still reading")
        );
    }

    #[tokio::test]
    async fn test_send_rejects_oversize_payload() {
        // ---
        let (left, _right) = connected_pair();
        let payload = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(left.send(payload), Err(Error::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_close_ends_remote_inbox() {
        // ---
        let (left, right) = connected_pair();
        let mut right_inbox = right.on_message().unwrap();

        left.send("last".into()).unwrap();
        left.close().await.unwrap();

        let wait = Duration::from_secs(1);
        assert_eq!(timeout(wait, right_inbox.messages.recv()).await.unwrap().as_deref(), Some("last"));
        assert_eq!(timeout(wait, right_inbox.messages.recv()).await.unwrap(), None);
        assert!(left.send("late".into()).is_err());
    }
}
