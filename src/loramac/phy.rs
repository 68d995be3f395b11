//! The PHY driver: a half-duplex ASCII command/response pipeline to the
//! radio module, over any [`LineTransport`].
//!
//! The transport is CR-LF terminated ASCII, one command or response per
//! line. Only one command may be outstanding at a time; `PhyDriver` tracks
//! this with a `ready` flag rather than letting the caller race two writes
//! onto the same half-duplex link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use crate::constants;
use crate::error::LoraMacError;
use crate::loramac::frame::Frame;
use crate::loramac::framer;
use crate::util::iobuffer::IoBuffer;

/// A duplex, line-oriented connection to the radio module.
#[async_trait]
pub trait LineTransport: AsyncRead + AsyncWrite + Unpin + Send {
    async fn flush(&mut self) -> Result<(), std::io::Error>;
}

#[async_trait]
impl LineTransport for tokio_serial::SerialStream {
    async fn flush(&mut self) -> Result<(), std::io::Error> {
        AsyncWriteExt::flush(self).await
    }
}

/// The six programmable radio parameters, plus the watchdog timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioParam {
    Bw,
    Cr,
    Freq,
    Mode,
    Pwr,
    Sf,
    Wdt,
}

impl RadioParam {
    fn token(self) -> &'static str {
        match self {
            RadioParam::Bw => "bw",
            RadioParam::Cr => "cr",
            RadioParam::Freq => "freq",
            RadioParam::Mode => "mod",
            RadioParam::Pwr => "pwr",
            RadioParam::Sf => "sf",
            RadioParam::Wdt => "wdt",
        }
    }
}

/// The radio parameter set programmed at startup.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub bw: String,
    pub cr: String,
    pub freq: String,
    pub mode: String,
    pub pwr: String,
    pub sf: String,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            bw: constants::DEFAULT_RADIO_BW.to_string(),
            cr: constants::DEFAULT_RADIO_CR.to_string(),
            freq: constants::DEFAULT_RADIO_FREQ.to_string(),
            mode: constants::DEFAULT_RADIO_MODE.to_string(),
            pwr: constants::DEFAULT_RADIO_PWR.to_string(),
            sf: constants::DEFAULT_RADIO_SF.to_string(),
        }
    }
}

/// A command issued to the radio module.
#[derive(Debug, Clone)]
pub enum PhyCommand {
    Pause,
    SetParam { param: RadioParam, value: String },
    Rx,
    Tx { payload_hex: String },
    Sleep { duration_ms: String },
}

impl PhyCommand {
    fn to_line(&self) -> String {
        match self {
            PhyCommand::Pause => "mac pause".to_string(),
            PhyCommand::SetParam { param, value } => format!("radio set {} {value}", param.token()),
            PhyCommand::Rx => "radio rx 0".to_string(),
            PhyCommand::Tx { payload_hex } => format!("radio tx {payload_hex}"),
            PhyCommand::Sleep { duration_ms } => format!("sys sleep {duration_ms}"),
        }
    }
}

/// A recognised response token, matched against the first whitespace-
/// delimited word of a reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseToken {
    Ok,
    InvalidParam,
    RadioErr,
    RadioRx,
    Busy,
    RadioTxOk,
    /// Filler for commands that only expect a single response token.
    None,
}

impl ResponseToken {
    fn word(self) -> Option<&'static str> {
        match self {
            ResponseToken::Ok => Some("ok"),
            ResponseToken::InvalidParam => Some("invalid_param"),
            ResponseToken::RadioErr => Some("radio_err"),
            ResponseToken::RadioRx => Some("radio_rx"),
            ResponseToken::Busy => Some("busy"),
            ResponseToken::RadioTxOk => Some("radio_tx_ok"),
            ResponseToken::None => None,
        }
    }
}

/// An event delivered from the PHY driver to the MAC engine.
#[derive(Debug, Clone)]
pub enum PhyEvent {
    /// A command's expected non-data response token was matched.
    SendDone,
    /// A `radio_rx` line was matched and decoded into a frame.
    DataReceived(Frame),
}

/// Counters tracking PHY driver activity, logged at `debug` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhyStats {
    pub commands_sent: u64,
    pub responses_matched: u64,
    pub timeouts: u64,
}

struct Shared {
    ready: AtomicBool,
    expected: Mutex<[ResponseToken; 2]>,
}

/// Drives the half-duplex ASCII command pipeline to a radio module.
pub struct PhyDriver<T> {
    writer: WriteHalf<T>,
    shared: Arc<Shared>,
    events: mpsc::Receiver<PhyEvent>,
    stats: Arc<Mutex<PhyStats>>,
    _reader: tokio::task::JoinHandle<()>,
}

impl<T> PhyDriver<T>
where
    T: LineTransport + 'static,
{
    pub fn new(transport: T) -> Self {
        let (reader_half, writer) = tokio::io::split(transport);
        let shared = Arc::new(Shared {
            ready: AtomicBool::new(true),
            expected: Mutex::new([ResponseToken::None, ResponseToken::None]),
        });
        let stats = Arc::new(Mutex::new(PhyStats::default()));
        let (tx, rx) = mpsc::channel(16);

        let reader_shared = Arc::clone(&shared);
        let reader_stats = Arc::clone(&stats);
        let reader = tokio::spawn(read_loop(reader_half, reader_shared, reader_stats, tx));

        PhyDriver {
            writer,
            shared,
            events: rx,
            stats,
            _reader: reader,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Release the outstanding-command lock after giving up on a response
    /// that may still arrive late, or never at all. Without this, a single
    /// unanswered command would leave the driver permanently `PhyNotReady`.
    pub fn clear_ready(&self) {
        self.shared.ready.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> PhyStats {
        *self.stats.lock().unwrap()
    }

    /// Issue a command without waiting for its response; the response
    /// arrives later via [`PhyDriver::recv_event`], so the caller can race
    /// it against other deadlines.
    pub async fn send_command(
        &mut self,
        cmd: PhyCommand,
        expect: [ResponseToken; 2],
    ) -> Result<(), LoraMacError> {
        if !self.is_ready() {
            return Err(LoraMacError::PhyNotReady);
        }
        *self.shared.expected.lock().unwrap() = expect;
        self.shared.ready.store(false, Ordering::Release);
        let line = cmd.to_line();
        log::debug!("phy tx: {line}");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        LineTransport::flush(&mut IdentityTransport(&mut self.writer)).await.ok();
        self.stats.lock().unwrap().commands_sent += 1;
        Ok(())
    }

    /// Receive the next PHY event, for use alongside timers in a `select!`.
    pub async fn recv_event(&mut self) -> Option<PhyEvent> {
        self.events.recv().await
    }

    /// Issue a command and wait for its single-token response; used only
    /// for the deterministic startup/configuration sequence where nothing
    /// else needs to run concurrently.
    async fn issue_and_await(&mut self, cmd: PhyCommand, expect: ResponseToken) -> Result<(), LoraMacError> {
        self.send_command(cmd, [expect, ResponseToken::None]).await?;
        match tokio::time::timeout(Duration::from_secs(5), self.events.recv()).await {
            Ok(Some(PhyEvent::SendDone)) => Ok(()),
            Ok(Some(PhyEvent::DataReceived(_))) => Err(LoraMacError::MalformedLine(
                "unexpected data frame during configuration".to_string(),
            )),
            Ok(None) => {
                self.clear_ready();
                Err(LoraMacError::PhyTimeout)
            }
            Err(_) => {
                self.stats.lock().unwrap().timeouts += 1;
                self.clear_ready();
                Err(LoraMacError::PhyTimeout)
            }
        }
    }

    /// `mac pause`, then a fixed settle window replacing the embedded
    /// busy-wait loop (the radio's startup banner never matches a
    /// recognised token, so there is nothing meaningful to await here).
    pub async fn startup(&mut self) -> Result<(), LoraMacError> {
        let line = PhyCommand::Pause.to_line();
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.shared.ready.store(false, Ordering::Release);
        tokio::time::sleep(Duration::from_millis(250)).await;
        self.shared.ready.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn set_param(&mut self, param: RadioParam, value: &str) -> Result<(), LoraMacError> {
        self.issue_and_await(
            PhyCommand::SetParam {
                param,
                value: value.to_string(),
            },
            ResponseToken::Ok,
        )
        .await
    }

    /// Program all six radio parameters plus the watchdog timeout.
    pub async fn configure_radio(&mut self, cfg: &RadioConfig) -> Result<(), LoraMacError> {
        self.set_param(RadioParam::Bw, &cfg.bw).await?;
        self.set_param(RadioParam::Cr, &cfg.cr).await?;
        self.set_param(RadioParam::Freq, &cfg.freq).await?;
        self.set_param(RadioParam::Mode, &cfg.mode).await?;
        self.set_param(RadioParam::Pwr, &cfg.pwr).await?;
        self.set_param(RadioParam::Sf, &cfg.sf).await?;
        // Derived from RETRANSMIT_TIMEOUT rather than a second literal, so
        // the radio's own watchdog can never drift out of step with the
        // engine's retransmit deadline.
        let wdt_ms = constants::RETRANSMIT_TIMEOUT.as_millis().to_string();
        self.set_param(RadioParam::Wdt, &wdt_ms).await
    }

    /// Put the radio to sleep for a fixed duration (JOIN back-off path).
    pub async fn sleep_radio(&mut self, duration_ms: &str) -> Result<(), LoraMacError> {
        self.issue_and_await(
            PhyCommand::Sleep {
                duration_ms: duration_ms.to_string(),
            },
            ResponseToken::Ok,
        )
        .await
    }

    /// Transmit a frame. The caller races the eventual response through
    /// [`PhyDriver::recv_event`].
    pub async fn tx(&mut self, frame: &Frame) -> Result<(), LoraMacError> {
        let payload_hex = framer::encode(frame);
        self.send_command(
            PhyCommand::Tx { payload_hex },
            [ResponseToken::RadioTxOk, ResponseToken::RadioErr],
        )
        .await
    }

    /// Arm the radio to receive. The caller races the eventual response
    /// through [`PhyDriver::recv_event`].
    pub async fn request_rx(&mut self) -> Result<(), LoraMacError> {
        self.send_command(PhyCommand::Rx, [ResponseToken::RadioRx, ResponseToken::RadioErr])
            .await
    }
}

/// Adapter letting us call the trait's `flush` through a `&mut WriteHalf<T>`
/// without requiring `WriteHalf<T>` itself to implement `LineTransport`.
struct IdentityTransport<'a, T>(&'a mut WriteHalf<T>);

#[async_trait]
impl<T: AsyncWrite + Unpin + Send> LineTransport for IdentityTransport<'_, T> {
    async fn flush(&mut self) -> Result<(), std::io::Error> {
        self.0.flush().await
    }
}

impl<T> AsyncRead for IdentityTransport<'_, T> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        unreachable!("IdentityTransport is write-only")
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for IdentityTransport<'_, T> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut *self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut *self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut *self.get_mut().0).poll_shutdown(cx)
    }
}

/// Control bytes the radio module may interleave with line data; filtered
/// out rather than treated as content, mirroring the embedded UART ISR.
fn is_control_byte(byte: u8) -> bool {
    matches!(byte, 254 | 248 | 240 | 192)
}

async fn read_loop<R>(
    mut reader: ReadHalf<R>,
    shared: Arc<Shared>,
    stats: Arc<Mutex<PhyStats>>,
    events: mpsc::Sender<PhyEvent>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut inbuf = IoBuffer::new();
    let mut cr_seen = false;
    let mut byte = [0u8; 1];

    loop {
        match reader.read_exact(&mut byte).await {
            Ok(_) => {}
            Err(_) => return,
        }
        let c = byte[0];

        if c == b'\r' {
            cr_seen = true;
            continue;
        }
        if c == b'\n' && cr_seen {
            cr_seen = false;
            let line_bytes = inbuf.consume(inbuf.len());
            inbuf.clear();
            let line = String::from_utf8_lossy(&line_bytes).into_owned();
            handle_line(&line, &shared, &stats, &events).await;
            continue;
        }
        cr_seen = false;
        if !is_control_byte(c) {
            let _ = inbuf.write_byte(c);
        }
    }
}

async fn handle_line(line: &str, shared: &Arc<Shared>, stats: &Arc<Mutex<PhyStats>>, events: &mpsc::Sender<PhyEvent>) {
    log::debug!("phy rx: {line}");
    let first_token = line.split_whitespace().next().unwrap_or("");

    let expected = *shared.expected.lock().unwrap();
    let matched = expected.iter().find(|t| t.word() == Some(first_token)).copied();

    match matched {
        Some(ResponseToken::RadioRx) => {
            shared.ready.store(true, Ordering::Release);
            stats.lock().unwrap().responses_matched += 1;
            let rest = line
                .split_once(' ')
                .map(|(_, rest)| rest)
                .unwrap_or("");
            match framer::decode(rest) {
                Ok(frame) => {
                    let _ = events.send(PhyEvent::DataReceived(frame)).await;
                }
                Err(err) => log::warn!("dropping malformed radio_rx line: {err}"),
            }
        }
        Some(_) => {
            shared.ready.store(true, Ordering::Release);
            stats.lock().unwrap().responses_matched += 1;
            let _ = events.send(PhyEvent::SendDone).await;
        }
        None => {
            if first_token == ResponseToken::RadioErr.word().unwrap() {
                log::info!("unexpected radio_err; radio is ready");
                shared.ready.store(true, Ordering::Release);
            } else {
                log::debug!("unmatched response line: {line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loramac::addr::Addr;
    use crate::loramac::frame::{Command, FrameHeader};
    use crate::loramac::phy_mock::MockLineTransport;

    fn sample_frame() -> Frame {
        Frame::new(
            FrameHeader {
                confirmed: true,
                seqno: 1,
                has_next: false,
                command: Command::Data,
                src: Addr::new(3, 10),
                dst: Addr::ROOT,
            },
            vec![1, 2, 3],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn tx_then_radio_tx_ok_produces_send_done() {
        let transport = MockLineTransport::new();
        transport.queue_line("radio_tx_ok");
        let mut phy = PhyDriver::new(transport);

        phy.tx(&sample_frame()).await.unwrap();
        let event = phy.recv_event().await.unwrap();
        assert!(matches!(event, PhyEvent::SendDone));
        assert!(phy.is_ready());
    }

    #[tokio::test]
    async fn request_rx_then_radio_rx_decodes_frame() {
        let transport = MockLineTransport::new();
        let line = format!("radio_rx {}", framer::encode(&sample_frame()));
        transport.queue_line(&line);
        let mut phy = PhyDriver::new(transport);

        phy.request_rx().await.unwrap();
        let event = phy.recv_event().await.unwrap();
        match event {
            PhyEvent::DataReceived(frame) => assert_eq!(frame, sample_frame()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_command_rejects_when_not_ready() {
        let transport = MockLineTransport::new();
        let mut phy = PhyDriver::new(transport);

        phy.tx(&sample_frame()).await.unwrap();
        let result = phy.tx(&sample_frame()).await;
        assert!(matches!(result, Err(LoraMacError::PhyNotReady)));
    }

    #[tokio::test]
    async fn unexpected_radio_err_clears_ready_without_event() {
        let transport = MockLineTransport::new();
        transport.queue_line("radio_err");
        let mut phy = PhyDriver::new(transport);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(phy.is_ready());
    }

    #[tokio::test]
    async fn clear_ready_recovers_driver_after_an_unanswered_command() {
        let transport = MockLineTransport::new();
        let mut phy = PhyDriver::new(transport);

        phy.tx(&sample_frame()).await.unwrap();
        assert!(!phy.is_ready());

        phy.clear_ready();
        assert!(phy.is_ready());
        phy.tx(&sample_frame()).await.unwrap();
    }
}
