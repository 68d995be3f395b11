//! The MAC engine: the JOIN/DATA/ACK/QUERY state machine, its timers, and
//! the single `run()` task that drives them.
//!
//! Every state transition happens inside one `select!` arm, so a late PHY
//! completion that arrives after the engine has already moved on is simply
//! absorbed by matching on the *current* state rather than trusting the
//! event blindly.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::constants;
use crate::error::LoraMacError;
use crate::loramac::addr::Addr;
use crate::loramac::bridge::{self, RoutingStack};
use crate::loramac::frame::{Command, Frame, FrameHeader};
use crate::loramac::phy::{LineTransport, PhyDriver, PhyEvent, RadioConfig};

/// Runtime-configurable protocol timers and defaults, overriding the
/// [`constants`] defaults for a given engine instance.
#[derive(Debug, Clone)]
pub struct LoraMacConfig {
    pub confirmed_default: bool,
    pub max_retransmit: u32,
    pub retransmit_timeout: Duration,
    pub query_timeout: Duration,
    pub join_sleep_time: Duration,
    pub max_join_sleep_time: Duration,
}

impl Default for LoraMacConfig {
    fn default() -> Self {
        LoraMacConfig {
            confirmed_default: constants::DEFAULT_CONFIRMED,
            max_retransmit: constants::MAX_RETRANSMIT,
            retransmit_timeout: constants::RETRANSMIT_TIMEOUT,
            query_timeout: constants::QUERY_TIMEOUT,
            join_sleep_time: constants::JOIN_SLEEP_TIME,
            max_join_sleep_time: constants::MAX_JOIN_SLEEP_TIME,
        }
    }
}

/// The MAC's three states (root variant only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Alone,
    Ready,
    WaitResponse,
}

/// A cloneable handle other tasks use to submit outbound packets into a
/// running [`MacEngine`] without owning it.
#[derive(Clone)]
pub struct MacHandle {
    tx: mpsc::Sender<Frame>,
}

impl MacHandle {
    pub async fn submit(&self, frame: Frame) -> Result<(), LoraMacError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| LoraMacError::SerialPortError("MAC engine task has stopped".to_string()))
    }
}

/// The LoRaMAC state machine, owning the PHY driver and the routing-stack
/// collaborator.
pub struct MacEngine<T: LineTransport, R: RoutingStack> {
    state: MacState,
    node_addr: Addr,
    next_seq: u8,
    expected_seq: u8,
    retransmit_attempt: u32,
    last_sent: Option<(FrameHeader, Vec<u8>)>,
    pending_query: bool,
    retransmit_deadline: Option<Instant>,
    query_deadline: Option<Instant>,
    phy: PhyDriver<T>,
    routing: R,
    config: LoraMacConfig,
    radio_config: RadioConfig,
    inbound_rx: mpsc::Receiver<Frame>,
    inbound_tx: mpsc::Sender<Frame>,
}

impl<T, R> MacEngine<T, R>
where
    T: LineTransport + 'static,
    R: RoutingStack,
{
    /// Set up a root-variant engine for `node_id`, per spec: initial
    /// address is `{node_id, node_id}` (truncated to the 1-byte prefix).
    pub fn init_root(
        node_id: u16,
        phy: PhyDriver<T>,
        routing: R,
        config: LoraMacConfig,
        radio_config: RadioConfig,
    ) -> (Self, MacHandle) {
        let (tx, rx) = mpsc::channel(32);
        let engine = MacEngine {
            state: MacState::Alone,
            node_addr: Addr::new(node_id as u8, node_id),
            next_seq: 0,
            expected_seq: 0,
            retransmit_attempt: 0,
            last_sent: None,
            pending_query: false,
            retransmit_deadline: None,
            query_deadline: None,
            phy,
            routing,
            config,
            radio_config,
            inbound_rx: rx,
            inbound_tx: tx.clone(),
        };
        (engine, MacHandle { tx })
    }

    pub fn handle(&self) -> MacHandle {
        MacHandle {
            tx: self.inbound_tx.clone(),
        }
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn node_addr(&self) -> Addr {
        self.node_addr
    }

    /// Configure the radio, issue the initial JOIN, then drive the
    /// orchestration loop forever.
    pub async fn run(mut self) -> ! {
        if let Err(err) = self.phy.startup().await {
            log::error!("phy startup failed: {err}");
        }
        let radio_config = self.radio_config.clone();
        if let Err(err) = self.phy.configure_radio(&radio_config).await {
            log::error!("radio configuration failed: {err}");
        }
        if let Err(err) = self.emit_join().await {
            log::error!("initial join failed: {err}");
        }

        loop {
            let retransmit_sleep = async {
                match self.retransmit_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            let query_sleep = async {
                match self.query_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                Some(frame) = self.inbound_rx.recv() => {
                    if let Err(err) = self.send(frame).await {
                        log::warn!("outbound send rejected: {err}");
                    }
                }
                Some(event) = self.phy.recv_event() => {
                    self.handle_phy_event(event).await;
                }
                _ = retransmit_sleep => {
                    self.handle_retransmit_timeout().await;
                }
                _ = query_sleep => {
                    self.handle_query_timeout().await;
                }
            }
        }
    }

    /// Submit a user payload for transmission. Valid only in `Ready`;
    /// stamps `command = Data`, `dst = Addr::ROOT`, `src = self.node_addr`.
    /// `src` is always this node's *current* address, overwriting whatever
    /// the caller filled in — a caller that captured `node_addr()` before
    /// JOIN_RESPONSE landed would otherwise transmit under a stale prefix.
    pub async fn send(&mut self, mut frame: Frame) -> Result<(), LoraMacError> {
        if self.state != MacState::Ready {
            return Err(LoraMacError::PhyNotReady);
        }
        frame.header.command = Command::Data;
        frame.header.dst = Addr::ROOT;
        frame.header.src = self.node_addr;
        self.stage_and_transmit(frame.header, frame.payload, false).await
    }

    /// Dispatch an inbound, already-decoded frame per the state table.
    pub async fn input(&mut self, frame: Frame) {
        if frame.header.dst.prefix != self.node_addr.prefix {
            log::debug!(
                "dropping frame for foreign DAG prefix {} (ours is {})",
                frame.header.dst.prefix,
                self.node_addr.prefix
            );
            return;
        }
        match (self.state, frame.header.command) {
            (MacState::Alone, Command::JoinResponse) => self.handle_join_response(frame).await,
            (state, Command::Data) if state != MacState::Alone => self.handle_data(frame).await,
            (state, Command::Ack) if state != MacState::Alone => self.handle_ack(frame).await,
            (state, command) => {
                log::debug!("dropping unexpected {command:?} frame in state {state:?}");
            }
        }
    }

    async fn handle_phy_event(&mut self, event: PhyEvent) {
        match event {
            PhyEvent::DataReceived(frame) => self.input(frame).await,
            PhyEvent::SendDone => log::debug!("stray send-done event outside a dispatch"),
        }
    }

    async fn handle_join_response(&mut self, frame: Frame) {
        if frame.header.dst != self.node_addr || frame.payload.len() != 1 || frame.header.seqno != 0 {
            log::debug!("dropping malformed join response");
            return;
        }
        let new_prefix = frame.payload[0];
        self.node_addr = Addr::new(new_prefix, self.node_addr.id);
        self.retransmit_deadline = None;
        self.retransmit_attempt = 0;
        self.expected_seq = 1;
        self.routing.on_joined(new_prefix);
        self.transition_to_ready().await;
    }

    async fn handle_data(&mut self, frame: Frame) {
        if frame.header.seqno < self.expected_seq {
            log::debug!(
                "dropping duplicate DATA seqno={} expected={}",
                frame.header.seqno,
                self.expected_seq
            );
            return;
        }
        if frame.header.seqno > self.expected_seq {
            log::warn!(
                "SN greater than expected (seqno={}, expected={}); accepting anyway",
                frame.header.seqno,
                self.expected_seq
            );
        }
        self.retransmit_deadline = None;
        self.query_deadline = None;
        self.expected_seq = frame.header.seqno.wrapping_add(1);
        let has_next = frame.header.has_next;
        self.routing.deliver(bridge::bridge_input(&frame));
        if has_next {
            if let Err(err) = self.emit_query().await {
                log::warn!("failed to pull next frame: {err}");
            }
        } else {
            self.transition_to_ready().await;
        }
    }

    async fn handle_ack(&mut self, frame: Frame) {
        let Some((header, _)) = &self.last_sent else {
            log::debug!("dropping ACK with no outstanding send");
            return;
        };
        if frame.header.dst != self.node_addr || frame.header.seqno != header.seqno {
            log::debug!("dropping unmatched ACK");
            return;
        }
        self.retransmit_deadline = None;
        self.transition_to_ready().await;
    }

    async fn handle_retransmit_timeout(&mut self) {
        self.retransmit_deadline = None;
        // The response to whatever we last sent never arrived; release the
        // PHY's outstanding-command lock so the retry below (or the next
        // JOIN/QUERY) can actually transmit instead of failing PhyNotReady.
        self.phy.clear_ready();
        let Some((header, payload)) = self.last_sent.clone() else {
            return;
        };

        if self.retransmit_attempt < self.config.max_retransmit {
            self.retransmit_attempt += 1;
            log::debug!(
                "retransmit attempt {} of {} for {:?}",
                self.retransmit_attempt,
                self.config.max_retransmit,
                header.command
            );
            if let Err(err) = self.stage_and_transmit(header, payload, true).await {
                log::warn!("retransmit failed: {err}");
            }
            return;
        }

        self.retransmit_attempt = 0;
        match header.command {
            Command::Join => {
                let base_ms = self.config.join_sleep_time.as_millis() as u64;
                let ceiling_ms = self.config.max_join_sleep_time.as_millis() as u64;
                // Jitter is added on top of the base, never wrapped back below
                // it: a modulo over the sum could otherwise produce a sleep
                // shorter than `join_sleep_time`, defeating the back-off floor.
                let jitter_range = ceiling_ms.saturating_sub(base_ms).max(1);
                let jitter = rand::random::<u64>() % jitter_range;
                let next_attempt_ms = base_ms + jitter;
                if let Err(err) = self.phy.sleep_radio(&base_ms.to_string()).await {
                    log::warn!("radio sleep command failed: {err}");
                }
                self.retransmit_deadline = Some(Instant::now() + Duration::from_millis(next_attempt_ms));
                self.state = MacState::Alone;
            }
            Command::Query => self.transition_to_ready().await,
            _ => self.transition_to_ready().await,
        }
    }

    async fn handle_query_timeout(&mut self) {
        self.query_deadline = None;
        if self.state == MacState::Ready {
            if let Err(err) = self.emit_query().await {
                log::warn!("query emission failed: {err}");
            }
        } else {
            self.pending_query = true;
        }
    }

    async fn transition_to_ready(&mut self) {
        self.state = MacState::Ready;
        self.retransmit_attempt = 0;
        if self.pending_query {
            self.pending_query = false;
            if let Err(err) = self.emit_query().await {
                log::warn!("pending query emission failed: {err}");
            }
        } else {
            self.restart_query_timer();
        }
    }

    fn restart_query_timer(&mut self) {
        self.query_deadline = Some(Instant::now() + self.config.query_timeout);
    }

    async fn emit_join(&mut self) -> Result<(), LoraMacError> {
        let header = FrameHeader {
            confirmed: false,
            seqno: 0,
            has_next: false,
            command: Command::Join,
            src: self.node_addr,
            dst: Addr::ROOT,
        };
        self.stage_and_transmit(header, vec![], false).await
    }

    async fn emit_query(&mut self) -> Result<(), LoraMacError> {
        let header = FrameHeader {
            confirmed: false,
            seqno: 0,
            has_next: false,
            command: Command::Query,
            src: self.node_addr,
            dst: Addr::ROOT,
        };
        self.stage_and_transmit(header, vec![], false).await
    }

    /// Assign a sequence number (unless retransmitting), snapshot
    /// `last_sent`, dispatch the TX command, await its local UART ack, then
    /// arm the RX window and retransmit timer if this exchange expects a
    /// response.
    async fn stage_and_transmit(
        &mut self,
        mut header: FrameHeader,
        payload: Vec<u8>,
        is_retransmit: bool,
    ) -> Result<(), LoraMacError> {
        if !is_retransmit && !matches!(header.command, Command::Join) {
            header.seqno = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
        }

        let frame = Frame::new(header, payload.clone())?;
        self.last_sent = Some((header, payload));

        if !matches!(header.command, Command::Join) {
            self.state = MacState::WaitResponse;
        }

        self.phy.tx(&frame).await?;
        self.await_tx_ack().await?;

        let needs_response = header.confirmed || matches!(header.command, Command::Join | Command::Query);
        if needs_response {
            self.phy.request_rx().await?;
            self.retransmit_deadline = Some(Instant::now() + self.config.retransmit_timeout);
        } else {
            self.transition_to_ready().await;
        }
        Ok(())
    }

    /// Await the local UART turnaround for the command just dispatched
    /// (`radio_tx_ok`/`radio_err`), routing any inbound data that happens
    /// to interleave with it.
    async fn await_tx_ack(&mut self) -> Result<(), LoraMacError> {
        let budget = Duration::from_secs(2);
        let deadline = Instant::now() + budget;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.phy.recv_event()).await {
                Ok(Some(PhyEvent::SendDone)) => return Ok(()),
                Ok(Some(PhyEvent::DataReceived(frame))) => {
                    // `input` can recurse back into `stage_and_transmit`
                    // (JOIN_RESPONSE -> transition_to_ready -> emit_query),
                    // so this call must be boxed to give the cycle a
                    // finite state-machine size.
                    Box::pin(self.input(frame)).await
                }
                Ok(None) => {
                    self.phy.clear_ready();
                    return Err(LoraMacError::PhyTimeout);
                }
                Err(_) => {
                    self.phy.clear_ready();
                    return Err(LoraMacError::PhyTimeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loramac::bridge::Ipv6Packet;
    use crate::loramac::phy_mock::MockLineTransport;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct TestRouting {
        joined: Arc<Mutex<Vec<u8>>>,
        delivered: Arc<Mutex<Vec<Ipv6Packet>>>,
    }

    impl RoutingStack for TestRouting {
        fn on_joined(&mut self, prefix: u8) {
            self.joined.lock().unwrap().push(prefix);
        }

        fn deliver(&mut self, packet: Ipv6Packet) {
            self.delivered.lock().unwrap().push(packet);
        }
    }

    fn test_engine() -> MacEngine<MockLineTransport, TestRouting> {
        let phy = PhyDriver::new(MockLineTransport::new());
        let config = LoraMacConfig {
            retransmit_timeout: Duration::from_millis(10),
            query_timeout: Duration::from_millis(10),
            join_sleep_time: Duration::from_millis(10),
            max_join_sleep_time: Duration::from_millis(20),
            max_retransmit: 3,
            ..LoraMacConfig::default()
        };
        let (engine, _handle) = MacEngine::init_root(7, phy, TestRouting::default(), config, RadioConfig::default());
        engine
    }

    fn data_frame(seqno: u8, has_next: bool, dst: Addr) -> Frame {
        Frame::new(
            FrameHeader {
                confirmed: false,
                seqno,
                has_next,
                command: Command::Data,
                src: Addr::ROOT,
                dst,
            },
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0xAB],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn join_response_adopts_prefix_and_goes_ready() {
        let mut engine = test_engine();
        engine.state = MacState::Alone;
        let dst = engine.node_addr();

        let response = Frame::new(
            FrameHeader {
                confirmed: false,
                seqno: 0,
                has_next: false,
                command: Command::JoinResponse,
                src: Addr::ROOT,
                dst,
            },
            vec![7],
        )
        .unwrap();

        engine.handle_join_response(response).await;

        assert_eq!(engine.state(), MacState::Ready);
        assert_eq!(engine.node_addr().prefix, 7);
        assert_eq!(engine.expected_seq, 1);
        assert_eq!(engine.routing.joined.lock().unwrap().as_slice(), &[7]);
    }

    #[tokio::test]
    async fn out_of_order_data_is_accepted_and_advances_expected_seq() {
        let mut engine = test_engine();
        engine.state = MacState::Ready;
        engine.expected_seq = 4;
        let dst = engine.node_addr();

        engine.input(data_frame(7, false, dst)).await;

        assert_eq!(engine.expected_seq, 8);
        assert_eq!(engine.routing.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_data_is_dropped() {
        let mut engine = test_engine();
        engine.state = MacState::Ready;
        engine.expected_seq = 8;
        let dst = engine.node_addr();

        engine.input(data_frame(7, false, dst)).await;

        assert_eq!(engine.expected_seq, 8);
        assert!(engine.routing.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ack_matching_last_sent_returns_to_ready() {
        let mut engine = test_engine();
        engine.state = MacState::WaitResponse;
        let dst = engine.node_addr();
        engine.last_sent = Some((
            FrameHeader {
                confirmed: true,
                seqno: 10,
                has_next: false,
                command: Command::Data,
                src: engine.node_addr(),
                dst: Addr::ROOT,
            },
            vec![],
        ));

        let ack = Frame::new(
            FrameHeader {
                confirmed: false,
                seqno: 10,
                has_next: false,
                command: Command::Ack,
                src: Addr::ROOT,
                dst,
            },
            vec![],
        )
        .unwrap();

        engine.handle_ack(ack).await;

        assert_eq!(engine.state(), MacState::Ready);
    }

    #[tokio::test]
    async fn retransmit_exhaustion_for_data_returns_to_ready_and_resets_attempt() {
        let mut engine = test_engine();
        engine.state = MacState::WaitResponse;
        engine.retransmit_attempt = engine.config.max_retransmit;
        engine.last_sent = Some((
            FrameHeader {
                confirmed: true,
                seqno: 3,
                has_next: false,
                command: Command::Data,
                src: engine.node_addr(),
                dst: Addr::ROOT,
            },
            vec![],
        ));

        engine.handle_retransmit_timeout().await;

        assert_eq!(engine.state(), MacState::Ready);
        assert_eq!(engine.retransmit_attempt, 0);
    }

    #[tokio::test]
    async fn foreign_prefix_frames_are_dropped_before_dispatch() {
        let mut engine = test_engine();
        engine.state = MacState::WaitResponse;
        let foreign = Addr::new(engine.node_addr().prefix.wrapping_add(1), 0);

        engine.input(data_frame(1, false, foreign)).await;

        assert!(engine.routing.delivered.lock().unwrap().is_empty());
    }
}
