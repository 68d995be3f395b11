//! Mock line transport for testing the PHY driver without real hardware.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::loramac::phy::LineTransport;

/// A mock half-duplex transport: bytes written are captured, and bytes to
/// read back can be queued up front (simulating the radio module's
/// responses).
#[derive(Clone)]
pub struct MockLineTransport {
    pub tx_buffer: Arc<Mutex<Vec<u8>>>,
    pub rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    pub next_error: Arc<Mutex<Option<io::Error>>>,
    read_waker: Arc<Mutex<Option<Waker>>>,
}

impl Default for MockLineTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLineTransport {
    pub fn new() -> Self {
        MockLineTransport {
            tx_buffer: Arc::new(Mutex::new(Vec::new())),
            rx_buffer: Arc::new(Mutex::new(VecDeque::new())),
            next_error: Arc::new(Mutex::new(None)),
            read_waker: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue a bare line (without CR-LF) to be read back, as the radio
    /// module would send it.
    pub fn queue_line(&self, line: &str) {
        let mut rx = self.rx_buffer.lock().unwrap();
        rx.extend(line.as_bytes());
        rx.push_back(b'\r');
        rx.push_back(b'\n');
        drop(rx);
        if let Some(waker) = self.read_waker.lock().unwrap().take() {
            waker.wake();
        }
    }

    pub fn get_tx_data(&self) -> Vec<u8> {
        self.tx_buffer.lock().unwrap().clone()
    }

    /// Return everything written to the transport as complete lines, with
    /// the trailing CR-LF stripped.
    pub fn tx_lines(&self) -> Vec<String> {
        let data = self.get_tx_data();
        String::from_utf8_lossy(&data)
            .split("\r\n")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    pub fn set_next_error(&self, error: io::Error) {
        *self.next_error.lock().unwrap() = Some(error);
    }
}

impl AsyncRead for MockLineTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Poll::Ready(Err(error));
        }

        let mut rx = self.rx_buffer.lock().unwrap();
        if rx.is_empty() {
            // An empty queue means "nothing queued yet", not EOF — a 0-byte
            // `Ready` here reads as EOF to `read_exact` and kills the reader
            // task for good. Park the waker and let `queue_line` wake it.
            *self.read_waker.lock().unwrap() = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let available = rx.len().min(buf.remaining());
        let data: Vec<u8> = rx.drain(..available).collect();
        buf.put_slice(&data);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockLineTransport {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Poll::Ready(Err(error));
        }
        self.tx_buffer.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl LineTransport for MockLineTransport {
    async fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_line_appends_crlf() {
        let transport = MockLineTransport::new();
        transport.queue_line("ok");
        let rx = transport.rx_buffer.lock().unwrap();
        assert_eq!(*rx, VecDeque::from(vec![b'o', b'k', b'\r', b'\n']));
    }

    #[test]
    fn tx_lines_splits_on_crlf() {
        let transport = MockLineTransport::new();
        transport
            .tx_buffer
            .lock()
            .unwrap()
            .extend_from_slice(b"mac pause\r\nradio rx 0\r\n");
        assert_eq!(transport.tx_lines(), vec!["mac pause", "radio rx 0"]);
    }
}
