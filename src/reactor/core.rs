//! The reactor loop: single task owning socket, pool and factories.
//!
//! Everything mutable lives here. Commands arrive over the mpsc channel,
//! socket bytes feed the assembler, the heartbeat drives pool trimming and
//! ping expiry, and outbound frames drain after every iteration. No other
//! task touches the socket, so the single-writer invariant holds by
//! construction.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::config::ReactorConfig;
use crate::error::{Result, TunnelError};
use crate::intf::{ControlFrameConsumer, FrameProvider};
use crate::ping::PingFactory;
use crate::protocol::codec::{self, flags, frame_type, version};
use crate::protocol::{ControlHeader, Frame, FrameAssembler, FramePool, InboundFrame, WireHeader};
use crate::stream::StreamFactory;

use super::command::Command;
use super::event::{ConnState, TunnelEvent};

/// Outbound frame sources polled in registration order.
enum ProviderKind {
    /// One queued PING (or echo); the slot retires after yielding it.
    Ping,
    /// The stream factory's RST queue; persistent.
    Stream,
    /// An externally registered provider.
    External(Box<dyn FrameProvider>),
}

struct ProviderSlot {
    kind: ProviderKind,
    single: bool,
}

pub(super) struct ReactorCore {
    config: ReactorConfig,
    state: ConnState,
    socket: Option<TcpStream>,
    pool: FramePool,
    assembler: FrameAssembler,
    ping_factory: PingFactory,
    stream_factory: StreamFactory,
    providers: Vec<ProviderSlot>,
    consumers: Vec<Box<dyn ControlFrameConsumer>>,
    outbound: VecDeque<Frame>,
    cmd_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<TunnelEvent>,
}

impl ReactorCore {
    pub(super) fn new(
        config: ReactorConfig,
        cmd_rx: mpsc::Receiver<Command>,
        event_tx: broadcast::Sender<TunnelEvent>,
    ) -> Self {
        let pool = FramePool::new(
            config.frame_capacity,
            config.pool_preferred,
            config.pool_capacity,
            config.pool_keep_idle,
        );
        let assembler = FrameAssembler::new(config.frame_capacity as u32 - codec::HEADER_SIZE as u32);
        let ping_factory = PingFactory::new(config.ping_expiry);

        Self {
            config,
            state: ConnState::Disconnected,
            socket: None,
            pool,
            assembler,
            ping_factory,
            stream_factory: StreamFactory::new(),
            providers: vec![ProviderSlot {
                kind: ProviderKind::Stream,
                single: false,
            }],
            consumers: Vec::new(),
            outbound: VecDeque::new(),
            cmd_rx,
            event_tx,
        }
    }

    pub(super) async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut read_buf = vec![0u8; self.config.read_buffer_size];

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        tracing::debug!("all reactor handles dropped, stopping");
                        break;
                    };
                    if let Err(e) = self.handle_command(cmd).await {
                        tracing::warn!(error = %e, "command failed");
                    }
                }

                read = Self::read_socket(&mut self.socket, &mut read_buf) => {
                    match read {
                        Ok(0) => self.handle_transport_loss("gateway closed the connection"),
                        Ok(n) => {
                            let data = read_buf[..n].to_vec();
                            if let Err(e) = self.process_inbound(&data) {
                                tracing::error!(error = %e, "inbound processing failed, resetting");
                                self.reset();
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "socket read failed");
                            self.handle_transport_loss("read failure");
                        }
                    }
                }

                _ = heartbeat.tick() => self.heart_beat(),
            }

            if let Err(e) = self.flush_outbound().await {
                match e {
                    TunnelError::Io(err) => {
                        tracing::warn!(error = %err, "socket write failed");
                        self.handle_transport_loss("write failure");
                    }
                    other => tracing::warn!(error = %other, "outbound flush failed"),
                }
            }
        }
    }

    /// Pending read on the gateway socket, or forever when disconnected.
    async fn read_socket(
        socket: &mut Option<TcpStream>,
        buf: &mut [u8],
    ) -> std::io::Result<usize> {
        match socket {
            Some(sock) => sock.read(buf).await,
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Connect => self.connect().await,
            Command::Disconnect => {
                self.disconnect();
                Ok(())
            }
            Command::Reset => {
                self.reset();
                Ok(())
            }
            Command::Renew => self.renew(),
            Command::Ping(delegate) => {
                self.ping_factory.ping(delegate, Instant::now());
                self.ensure_ping_slots();
                Ok(())
            }
            Command::RegisterStream(handler, reply) => {
                let result = self.stream_factory.register_stream(handler);
                let _ = reply.send(result);
                Ok(())
            }
            Command::RegisterProvider(provider, single) => {
                self.providers.push(ProviderSlot {
                    kind: ProviderKind::External(provider),
                    single,
                });
                Ok(())
            }
            Command::RegisterConsumer(consumer) => {
                self.consumers.push(consumer);
                Ok(())
            }
            Command::QueryState(reply) => {
                let _ = reply.send(self.state);
                Ok(())
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            tracing::debug!("already connected");
            return Ok(());
        }

        self.set_state(ConnState::Connecting);
        match TcpStream::connect(&self.config.gateway_addr).await {
            Ok(sock) => {
                tracing::info!(addr = %self.config.gateway_addr, "gateway connected");
                self.socket = Some(sock);
                self.set_state(ConnState::Connected);
                let _ = self.event_tx.send(TunnelEvent::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(addr = %self.config.gateway_addr, error = %e, "connect failed");
                self.set_state(ConnState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Close the socket; stream and ping state stays intact so the next
    /// connect resumes with the same registrations. Frames still queued for
    /// the dead socket are reclaimed, not carried over.
    fn disconnect(&mut self) {
        if self.socket.is_none() && self.state == ConnState::Disconnected {
            return;
        }
        self.socket = None;
        self.assembler.clear();
        self.drain_outbound();
        self.set_state(ConnState::Disconnected);
    }

    /// Full teardown: factories reset, queued frames reclaimed, socket gone.
    fn reset(&mut self) {
        self.set_state(ConnState::Resetting);

        self.ping_factory.reset();
        self.stream_factory.reset_all();
        self.providers
            .retain(|slot| !matches!(slot.kind, ProviderKind::Ping));

        self.drain_outbound();
        self.assembler.clear();
        self.socket = None;

        let _ = self.event_tx.send(TunnelEvent::ConnectionReset);
        self.set_state(ConnState::Disconnected);
    }

    /// Ask the gateway to reissue the client certificate.
    fn renew(&mut self) -> Result<()> {
        if self.state != ConnState::Connected {
            return Err(TunnelError::InvalidState(
                "certificate renewal requires a connected gateway",
            ));
        }
        let mut frame = self.pool.borrow("cert_query")?;
        codec::build_alx1_cert_query(&mut frame, 1)?;
        self.outbound.push_back(frame);
        Ok(())
    }

    /// Return queued outbound frames to the pool.
    fn drain_outbound(&mut self) {
        while let Some(frame) = self.outbound.pop_front() {
            if let Err(e) = self.pool.give_back(frame) {
                tracing::warn!(error = %e, "dropping unreturnable queued frame");
            }
        }
    }

    fn handle_transport_loss(&mut self, reason: &str) {
        tracing::info!(reason, "connection lost");
        self.disconnect();
    }

    fn set_state(&mut self, state: ConnState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?state, "state change");
        self.state = state;
        let _ = self.event_tx.send(TunnelEvent::StateChanged(state));
    }

    fn heart_beat(&mut self) {
        let now = Instant::now();
        self.pool.heart_beat(now);
        self.ping_factory.heart_beat(now);
    }

    /// Keep one one-shot ping provider slot per queued ping id.
    fn ensure_ping_slots(&mut self) {
        let have = self
            .providers
            .iter()
            .filter(|slot| matches!(slot.kind, ProviderKind::Ping))
            .count();
        for _ in have..self.ping_factory.queued_count() {
            self.providers.push(ProviderSlot {
                kind: ProviderKind::Ping,
                single: true,
            });
        }
    }

    fn process_inbound(&mut self, data: &[u8]) -> Result<()> {
        for inbound in self.assembler.push(data)? {
            self.dispatch(inbound)?;
        }
        self.ensure_ping_slots();
        Ok(())
    }

    /// Copy an inbound payload into a pooled frame and route it. The frame
    /// goes back to the pool in every case.
    fn dispatch(&mut self, inbound: InboundFrame) -> Result<()> {
        let mut frame = self.pool.borrow("inbound")?;
        frame.store_slice(&inbound.payload)?;
        frame.flip();

        let result = match inbound.header {
            WireHeader::Control(header) => self.dispatch_control(&mut frame, header),
            WireHeader::Data(header) => self
                .stream_factory
                .received_data_frame(&mut frame, header)
                .map(|_| ()),
        };

        self.pool.give_back(frame)?;
        result
    }

    /// Offer a control frame to consumers in order until one claims it:
    /// ping factory, built-in handling, stream factory, then externally
    /// registered consumers. The payload cursor rewinds between offers.
    fn dispatch_control(&mut self, frame: &mut Frame, header: ControlHeader) -> Result<()> {
        let payload_len = frame.length();

        if self.ping_factory.received_control_frame(frame, header)? {
            return Ok(());
        }

        frame.flip_to(payload_len)?;
        if self.received_core_frame(frame, header)? {
            return Ok(());
        }

        frame.flip_to(payload_len)?;
        if self
            .stream_factory
            .received_control_frame(frame, header)?
        {
            return Ok(());
        }

        for consumer in self.consumers.iter_mut() {
            frame.flip_to(payload_len)?;
            if consumer.received_control_frame(frame, header)? {
                return Ok(());
            }
        }

        tracing::warn!(
            version = header.version,
            frame_type = header.frame_type,
            "unclaimed control frame dropped"
        );
        Ok(())
    }

    /// Control frames the reactor itself answers: CERT delivery and
    /// gateway statistics requests.
    fn received_core_frame(&mut self, frame: &mut Frame, header: ControlHeader) -> Result<bool> {
        if header.version != version::ALX1 {
            return Ok(false);
        }

        match header.frame_type {
            frame_type::CERT => {
                if flags::has_flag(header.flags, flags::CSR_NOT_FOUND) {
                    tracing::info!("gateway holds no certificate, CSR required");
                    let _ = self.event_tx.send(TunnelEvent::CsrNeeded);
                } else {
                    let client_id = frame.load_vle()?;
                    let client_tag = frame.load_vle()?;
                    tracing::info!(%client_id, %client_tag, "client identity received");
                    let _ = self
                        .event_tx
                        .send(TunnelEvent::ClientIdChanged { client_id, client_tag });
                }
                Ok(true)
            }

            frame_type::STATS_REQ => {
                let mut reply = self.pool.borrow("stats_rep")?;
                let rep_header =
                    ControlHeader::new(version::ALX1, frame_type::STATS_REP, 0, 12);
                reply.store_slice(&rep_header.encode())?;
                reply.store32(self.pool.size() as u32)?;
                reply.store32(self.pool.capacity() as u32)?;
                reply.store32(self.stream_factory.stream_count() as u32)?;
                reply.flip();
                self.outbound.push_back(reply);
                Ok(true)
            }

            _ => Ok(false),
        }
    }

    /// Poll providers for fresh frames, then write the whole queue.
    async fn flush_outbound(&mut self) -> Result<()> {
        if self.socket.is_none() {
            return Ok(());
        }
        self.poll_providers()?;

        while let Some(frame) = self.outbound.pop_front() {
            let written = match self.socket.as_mut() {
                Some(sock) => sock.write_all(frame.readable()).await,
                None => break,
            };
            self.pool.give_back(frame)?;
            written?;
        }
        Ok(())
    }

    fn poll_providers(&mut self) -> Result<()> {
        let mut i = 0;
        while i < self.providers.len() {
            let frame = match &mut self.providers[i].kind {
                ProviderKind::Ping => self.ping_factory.build_frame(&mut self.pool)?,
                ProviderKind::Stream => self.stream_factory.build_frame(&mut self.pool)?,
                ProviderKind::External(provider) => provider.build_frame(&mut self.pool)?,
            };

            let retire = match frame {
                Some(frame) => {
                    self.outbound.push_back(frame);
                    self.providers[i].single
                }
                // A spent one-shot slot has nothing left to offer.
                None => self.providers[i].single,
            };

            if retire {
                self.providers.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }
}
