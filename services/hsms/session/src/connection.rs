//! HSMS connection state machine.
//!
//! The machine performs no I/O. Every method takes the current time and
//! returns the [`Action`]s the driver has to carry out: open a connection,
//! write a message, deliver an event or close the socket.
//!
//! # State Machine
//!
//! ```text
//!            start                connected              Select.rsp(0) / Select.req
//! ┌─────────┐─────>┌──────────────┐──────>┌──────────────┐─────────────────>┌──────────┐
//! │ Stopped │      │ NotConnected │       │ NotSelected  │                  │ Selected │
//! └─────────┘<─────└──────────────┘<──────└──────────────┘<─────────────────└──────────┘
//!            stop       ^   failure (T5 armed)              Deselect                │
//!                       └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Timers
//!
//! - **T3**: reply timeout for data transactions
//! - **T5**: separation between connect attempts
//! - **T6**: reply timeout for control transactions
//! - **T7**: time allowed between connect and select
//! - **T8**: time allowed between bytes of one message
//! - **Link test**: interval between Linktest.req while selected

use bytes::BytesMut;
use hsms_wire::{reason, status, ControlMessage, FrameDecoder, Message, MessageType};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Failure, SessionError};
use crate::timers::{Timer, Timers};
use crate::transaction::TransactionTable;

/// Which side opens the TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connects to the peer
    Active,
    /// Accepts the peer's connection
    Passive,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Role::Active),
            "passive" => Ok(Role::Passive),
            other => Err(format!("unknown mode '{}', expected active or passive", other)),
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or stopped
    Stopped,
    /// Waiting for a TCP connection
    NotConnected,
    /// Connected, select procedure not completed
    NotSelected,
    /// Select procedure completed, data may flow
    Selected,
}

impl ConnectionState {
    /// Lowercase state name
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Stopped => "stopped",
            ConnectionState::NotConnected => "not-connected",
            ConnectionState::NotSelected => "not-selected",
            ConnectionState::Selected => "selected",
        }
    }

    /// Whether a TCP connection is up
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::NotSelected | ConnectionState::Selected)
    }
}

/// Switches for exercising a peer's error handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    /// Do not send Select.req after connecting (active role)
    pub suppress_select_req: bool,
    /// Ignore incoming Select.req
    pub suppress_select_rsp: bool,
    /// Ignore incoming Linktest.req
    pub suppress_link_test_rsp: bool,
}

/// Events delivered to the application
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// TCP connection established
    Connected,
    /// Select procedure completed
    Established,
    /// Deselect procedure completed
    Deselected,
    /// Peer answered Select.req with a non-zero status
    SelectFailed {
        /// Select status from the peer
        status: u8,
    },
    /// Peer answered Deselect.req with a non-zero status
    DeselectFailed {
        /// Deselect status from the peer
        status: u8,
    },
    /// Connection torn down
    Dropped {
        /// Why the connection was dropped
        reason: Failure,
    },
    /// Message received from the peer
    Received(Message),
    /// Message written to the peer
    Sent(Message),
    /// A timer expired
    Timeout {
        /// The timer
        timer: Timer,
        /// Request that went unanswered, for T3/T6
        message: Option<Message>,
    },
    /// Linktest.rsp received
    Alive,
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Connect (active) or accept (passive)
    Open,
    /// Write this message
    Send(Message),
    /// Deliver this event
    Emit(SessionEvent),
    /// Close the socket
    Close,
}

/// Counters for one connection
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// Total bytes received
    pub bytes_in: u64,
    /// Total bytes sent
    pub bytes_out: u64,
    /// Timestamp of last received message
    pub last_message_in: Option<Instant>,
    /// Timestamp of last sent message
    pub last_message_out: Option<Instant>,
    /// Number of messages received
    pub messages_received: u64,
    /// Number of messages sent
    pub messages_sent: u64,
}

/// HSMS connection state machine
#[derive(Debug)]
pub struct Connection {
    role: Role,
    device: u16,
    timers: Timers,
    debug: DebugOptions,
    state: ConnectionState,
    transactions: TransactionTable,
    decoder: FrameDecoder,
    buffer: BytesMut,
    t5: Option<Instant>,
    t7: Option<Instant>,
    t8: Option<Instant>,
    link_test: Option<Instant>,
    stats: SessionStats,
}

impl Connection {
    /// Create a stopped connection
    pub fn new(role: Role, device: u16, timers: Timers, debug: DebugOptions) -> Self {
        Self {
            role,
            device,
            timers,
            debug,
            state: ConnectionState::Stopped,
            transactions: TransactionTable::new(),
            decoder: FrameDecoder::new(),
            buffer: BytesMut::new(),
            t5: None,
            t7: None,
            t8: None,
            link_test: None,
            stats: SessionStats::default(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configured role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Configured device id
    pub fn device(&self) -> u16 {
        self.device
    }

    /// Counters
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Open transactions
    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    /// Leave `Stopped` and ask the driver to open a connection
    pub fn start(&mut self, _now: Instant) -> Result<Vec<Action>, SessionError> {
        if self.state != ConnectionState::Stopped {
            return Err(SessionError::AlreadyStarted);
        }
        info!("Starting {:?} session for device {}", self.role, self.device);
        self.state = ConnectionState::NotConnected;
        self.transactions.clear();
        Ok(vec![Action::Open])
    }

    /// The driver established a TCP connection
    pub fn on_connected(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state != ConnectionState::NotConnected {
            warn!("Connection reported while {}", self.state.as_str());
            return actions;
        }

        self.state = ConnectionState::NotSelected;
        self.t5 = None;
        self.t7 = Some(now + self.timers.t7());
        actions.push(Action::Emit(SessionEvent::Connected));

        if self.role == Role::Active {
            if self.debug.suppress_select_req {
                debug!("Select.req suppressed");
            } else {
                let req = Message::select_req(self.device, self.transactions.allocate_context());
                self.transmit(now, req, &mut actions);
            }
        }
        actions
    }

    /// The driver failed to connect or accept
    pub fn on_connect_failed(&mut self, now: Instant, reason: &str) -> Vec<Action> {
        if self.state == ConnectionState::NotConnected {
            warn!("Connect failed: {}; retrying in {:?}", reason, self.timers.t5());
            self.t5 = Some(now + self.timers.t5());
        }
        Vec::new()
    }

    /// The socket closed or failed
    pub fn on_disconnected(&mut self, now: Instant, reason: &str) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::NotSelected {
            // the not-selected period ends without a select
            warn!("Connection lost before select: {}", reason);
            actions.push(Action::Emit(SessionEvent::Timeout {
                timer: Timer::T7,
                message: None,
            }));
        }
        if self.state.is_connected() {
            self.fail(now, Failure::Transport(reason.to_string()), &mut actions);
        }
        actions
    }

    /// Bytes arrived from the socket
    pub fn on_bytes(&mut self, now: Instant, data: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.state.is_connected() {
            return actions;
        }

        self.stats.bytes_in += data.len() as u64;
        self.buffer.extend_from_slice(data);

        loop {
            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(msg)) => {
                    self.handle_message(now, msg, &mut actions);
                    if !self.state.is_connected() {
                        return actions;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Undecodable message: {}", e);
                    self.fail(now, Failure::Malformed(e), &mut actions);
                    return actions;
                }
            }
        }

        // T8 runs while a message is partially received
        self.t8 = if self.buffer.is_empty() {
            None
        } else {
            Some(now + self.timers.t8())
        };
        actions
    }

    /// Send a message
    ///
    /// Returns the message as written, with its final context.
    pub fn send(
        &mut self,
        now: Instant,
        mut msg: Message,
    ) -> Result<(Message, Vec<Action>), SessionError> {
        match self.state {
            ConnectionState::Stopped => return Err(SessionError::NotStarted),
            ConnectionState::NotConnected => return Err(SessionError::NotConnected),
            ConnectionState::NotSelected if msg.kind() == MessageType::Data => {
                return Err(SessionError::NotSelected)
            }
            _ => {}
        }

        let mut actions = Vec::new();
        if msg.kind() == MessageType::SeparateReq {
            self.transmit(now, msg.clone(), &mut actions);
            self.fail(now, Failure::Separated, &mut actions);
            return Ok((msg, actions));
        }

        let context = msg.context();
        if msg.is_reply_required() && (context == 0 || self.transactions.contains(context)) {
            msg = msg.with_context(self.transactions.allocate_context());
        }
        self.transmit(now, msg.clone(), &mut actions);
        Ok((msg, actions))
    }

    /// Start the select procedure
    pub fn select(&mut self, now: Instant) -> Result<Vec<Action>, SessionError> {
        match self.state {
            ConnectionState::NotSelected => {}
            ConnectionState::Selected => return Err(SessionError::AlreadySelected),
            ConnectionState::NotConnected => return Err(SessionError::NotConnected),
            ConnectionState::Stopped => return Err(SessionError::NotStarted),
        }
        let (_, actions) = self.send(now, Message::select_req(self.device, 0))?;
        Ok(actions)
    }

    /// Start the deselect procedure
    pub fn deselect(&mut self, now: Instant) -> Result<Vec<Action>, SessionError> {
        match self.state {
            ConnectionState::Selected => {}
            ConnectionState::NotSelected => return Err(SessionError::NotSelected),
            ConnectionState::NotConnected => return Err(SessionError::NotConnected),
            ConnectionState::Stopped => return Err(SessionError::NotStarted),
        }
        let (_, actions) = self.send(now, Message::deselect_req(self.device, 0))?;
        Ok(actions)
    }

    /// Send a Linktest.req
    pub fn link_test(&mut self, now: Instant) -> Result<Vec<Action>, SessionError> {
        let (_, actions) = self.send(now, Message::link_test_req(0))?;
        Ok(actions)
    }

    /// Send Separate.req and drop the connection
    pub fn separate(&mut self, now: Instant) -> Result<Vec<Action>, SessionError> {
        let (_, actions) = self.send(now, Message::separate_req(0))?;
        Ok(actions)
    }

    /// Stop the session, cancelling every timer and transaction
    pub fn stop(&mut self, _now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == ConnectionState::Stopped {
            return actions;
        }

        if self.state == ConnectionState::Selected {
            let msg = Message::separate_req(0);
            self.stats.messages_sent += 1;
            actions.push(Action::Send(msg));
        }
        if self.state.is_connected() {
            actions.push(Action::Close);
        }

        info!("Stopping session for device {}", self.device);
        self.state = ConnectionState::Stopped;
        self.reset();
        self.t5 = None;
        actions
    }

    /// Earliest armed deadline
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        [
            self.t5,
            self.t7,
            self.t8,
            self.link_test,
            self.transactions.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Process every timer that expired at or before `now`
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if expired(self.t5, now) {
            self.t5 = None;
            if self.state == ConnectionState::NotConnected {
                debug!("T5 elapsed, opening connection");
                actions.push(Action::Open);
            }
        }

        if !self.state.is_connected() {
            return actions;
        }

        if expired(self.t8, now) {
            warn!("T8 expired with {} bytes buffered", self.buffer.len());
            self.timeout(now, Timer::T8, None, &mut actions);
            return actions;
        }

        if expired(self.t7, now) && self.state == ConnectionState::NotSelected {
            warn!("T7 expired before select");
            self.timeout(now, Timer::T7, None, &mut actions);
            return actions;
        }

        if let Some(tx) = self.transactions.take_expired(now) {
            warn!("{} expired for {}", tx.timer, tx.primary);
            self.timeout(now, tx.timer, Some(tx.primary), &mut actions);
            return actions;
        }

        if expired(self.link_test, now) && self.state == ConnectionState::Selected {
            self.link_test = self.timers.link_test().map(|interval| now + interval);
            let req = Message::link_test_req(self.transactions.allocate_context());
            self.transmit(now, req, &mut actions);
        }

        actions
    }

    fn timeout(
        &mut self,
        now: Instant,
        timer: Timer,
        message: Option<Message>,
        actions: &mut Vec<Action>,
    ) {
        actions.push(Action::Emit(SessionEvent::Timeout { timer, message }));
        self.fail(now, Failure::Timeout(timer), actions);
    }

    fn transmit(&mut self, now: Instant, msg: Message, actions: &mut Vec<Action>) {
        debug!("Sending {}", msg);
        if msg.is_reply_required() {
            let timer = if msg.kind() == MessageType::Data {
                Timer::T3
            } else {
                Timer::T6
            };
            self.transactions
                .open(msg.clone(), timer, now, self.timers.duration(timer));
        }
        self.stats.messages_sent += 1;
        self.stats.bytes_out += msg.encoded_len() as u64;
        self.stats.last_message_out = Some(now);
        actions.push(Action::Send(msg.clone()));
        actions.push(Action::Emit(SessionEvent::Sent(msg)));
    }

    fn reject(&mut self, now: Instant, msg: &Message, reason: u8, actions: &mut Vec<Action>) {
        warn!("Rejecting {} with reason {}", msg, reason);
        self.transmit(now, Message::reject_req(msg.device(), msg.context(), reason), actions);
    }

    fn selected(&mut self, now: Instant, actions: &mut Vec<Action>) {
        info!("Session selected");
        self.state = ConnectionState::Selected;
        self.t7 = None;
        self.link_test = self.timers.link_test().map(|interval| now + interval);
        actions.push(Action::Emit(SessionEvent::Established));
    }

    fn deselected(&mut self, now: Instant, actions: &mut Vec<Action>) {
        info!("Session deselected");
        self.state = ConnectionState::NotSelected;
        self.link_test = None;
        self.t7 = Some(now + self.timers.t7());
        actions.push(Action::Emit(SessionEvent::Deselected));
    }

    fn handle_message(&mut self, now: Instant, msg: Message, actions: &mut Vec<Action>) {
        debug!("Received {}", msg);
        self.stats.messages_received += 1;
        self.stats.last_message_in = Some(now);

        let control = match msg.as_control().copied() {
            Some(control) => control,
            None => {
                self.handle_data(now, msg, actions);
                return;
            }
        };

        actions.push(Action::Emit(SessionEvent::Received(msg.clone())));

        match control {
            ControlMessage::SelectReq => {
                if self.debug.suppress_select_rsp {
                    debug!("Select.rsp suppressed");
                } else if self.state == ConnectionState::Selected {
                    self.transmit(
                        now,
                        Message::select_rsp(msg.device(), msg.context(), status::ALREADY_ACTIVE),
                        actions,
                    );
                } else {
                    let rsp = Message::select_rsp(msg.device(), msg.context(), status::OK);
                    self.transmit(now, rsp, actions);
                    self.selected(now, actions);
                }
            }
            ControlMessage::SelectRsp { status: code } => {
                if self.transactions.close(msg.context()).is_none() {
                    self.reject(now, &msg, reason::TRANSACTION_NOT_OPEN, actions);
                } else if code != status::OK {
                    warn!("Select rejected with status {}", code);
                    actions.push(Action::Emit(SessionEvent::SelectFailed { status: code }));
                } else if self.state == ConnectionState::NotSelected {
                    self.selected(now, actions);
                }
            }
            ControlMessage::DeselectReq => {
                if self.state == ConnectionState::Selected {
                    let rsp = Message::deselect_rsp(msg.device(), msg.context(), status::OK);
                    self.transmit(now, rsp, actions);
                    self.deselected(now, actions);
                } else {
                    self.transmit(
                        now,
                        Message::deselect_rsp(msg.device(), msg.context(), status::ALREADY_ACTIVE),
                        actions,
                    );
                }
            }
            ControlMessage::DeselectRsp { status: code } => {
                if self.transactions.close(msg.context()).is_none() {
                    self.reject(now, &msg, reason::TRANSACTION_NOT_OPEN, actions);
                } else if code != status::OK {
                    warn!("Deselect rejected with status {}", code);
                    actions.push(Action::Emit(SessionEvent::DeselectFailed { status: code }));
                } else if self.state == ConnectionState::Selected {
                    self.deselected(now, actions);
                }
            }
            ControlMessage::LinkTestReq => {
                if self.debug.suppress_link_test_rsp {
                    debug!("Linktest.rsp suppressed");
                } else {
                    self.transmit(now, Message::link_test_rsp(msg.context()), actions);
                }
            }
            ControlMessage::LinkTestRsp => {
                if self.transactions.close(msg.context()).is_none() {
                    self.reject(now, &msg, reason::TRANSACTION_NOT_OPEN, actions);
                } else {
                    actions.push(Action::Emit(SessionEvent::Alive));
                }
            }
            ControlMessage::SeparateReq => {
                info!("Peer separated");
                self.fail(now, Failure::Separated, actions);
            }
            ControlMessage::RejectReq { reason: code } => {
                warn!("Peer rejected context {} with reason {}", msg.context(), code);
                self.transactions.close(msg.context());
            }
        }
    }

    fn handle_data(&mut self, now: Instant, msg: Message, actions: &mut Vec<Action>) {
        if self.state != ConnectionState::Selected {
            self.reject(now, &msg, reason::ENTITY_NOT_SELECTED, actions);
            return;
        }
        let is_reply = msg.as_data().is_some_and(|d| !d.is_primary());
        if is_reply && self.transactions.close(msg.context()).is_none() {
            debug!("Reply {} matches no open transaction", msg);
        }
        actions.push(Action::Emit(SessionEvent::Received(msg)));
    }

    fn reset(&mut self) {
        self.transactions.clear();
        self.buffer.clear();
        self.t7 = None;
        self.t8 = None;
        self.link_test = None;
    }

    /// Tear down the connection and schedule the next attempt
    fn fail(&mut self, now: Instant, reason: Failure, actions: &mut Vec<Action>) {
        if self.state.is_connected() {
            warn!("Connection dropped: {}", reason);
            actions.push(Action::Close);
            actions.push(Action::Emit(SessionEvent::Dropped { reason }));
        }
        self.state = ConnectionState::NotConnected;
        self.reset();
        self.t5 = Some(now + self.timers.t5());
    }
}

fn expired(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|d| d <= now)
}
