//! Session driver.
//!
//! A [`Session`] runs one [`Connection`] on a tokio task. The task owns the
//! socket and serialises socket reads, connect/accept completion, timer
//! expiry and application commands through a single `select!` loop, executing
//! the actions the state machine returns.

use bytes::BytesMut;
use hsms_wire::Message;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connection::{Action, Connection, ConnectionState, DebugOptions, Role, SessionEvent};
use crate::error::SessionError;
use crate::timers::Timers;
use crate::transport::Endpoint;

/// Configuration for an HSMS session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Remote address (active) or listen address (passive)
    pub address: SocketAddr,
    /// Session id used for data and select messages
    pub device: u16,
    /// Whether this side connects or accepts
    pub role: Role,
    /// Protocol timers
    pub timers: Timers,
    /// Debug switches
    pub debug: DebugOptions,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000),
            device: 0,
            role: Role::Active,
            timers: Timers::default(),
            debug: DebugOptions::default(),
            event_capacity: 100,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Send(Message, Reply<Message>),
    Select(Reply<()>),
    Deselect(Reply<()>),
    LinkTest(Reply<()>),
    Separate(Reply<()>),
    Stop,
}

/// Handle to a running session
pub struct SessionHandle {
    /// Channel for receiving events
    pub events: mpsc::Receiver<SessionEvent>,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Wait for the next event
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `state`
    pub async fn wait_for(&mut self, state: ConnectionState) -> Result<(), SessionError> {
        self.state
            .wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Send a message; returns it with the context it was sent under
    pub async fn send(&self, message: Message) -> Result<Message, SessionError> {
        self.request(|tx| Command::Send(message, tx)).await
    }

    /// Start the select procedure
    pub async fn select(&self) -> Result<(), SessionError> {
        self.request(Command::Select).await
    }

    /// Start the deselect procedure
    pub async fn deselect(&self) -> Result<(), SessionError> {
        self.request(Command::Deselect).await
    }

    /// Send a Linktest.req
    pub async fn link_test(&self) -> Result<(), SessionError> {
        self.request(Command::LinkTest).await
    }

    /// Send Separate.req and drop the connection
    pub async fn separate(&self) -> Result<(), SessionError> {
        self.request(Command::Separate).await
    }

    /// Stop the session and wait for its task to finish
    pub async fn stop(self) -> Result<(), SessionError> {
        let SessionHandle {
            events,
            commands,
            task,
            ..
        } = self;
        // unblock a task waiting on a full event channel
        drop(events);
        let _ = commands.send(Command::Stop).await;
        task.await.map_err(|e| {
            error!("Session task failed: {}", e);
            SessionError::Closed
        })
    }
}

/// HSMS session
pub struct Session {
    config: SessionConfig,
    endpoint: Endpoint,
}

impl Session {
    /// Create a session from its configuration
    pub fn new(config: SessionConfig) -> Self {
        let endpoint = Endpoint::new(config.role, config.address);
        Self { config, endpoint }
    }

    /// Create a passive session on an already bound listener
    pub fn with_listener(
        mut config: SessionConfig,
        listener: TcpListener,
    ) -> Result<Self, SessionError> {
        let endpoint = Endpoint::with_listener(listener)?;
        config.role = Role::Passive;
        config.address = endpoint.address();
        Ok(Self { config, endpoint })
    }

    /// Start the session on the current tokio runtime
    pub fn start(self) -> Result<SessionHandle, SessionError> {
        let Session { config, endpoint } = self;
        let mut machine = Connection::new(config.role, config.device, config.timers, config.debug);
        let actions = machine.start(Instant::now())?;

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(machine.state());

        let driver = Driver {
            machine,
            endpoint,
            stream: None,
            opening: false,
            pending: actions.into(),
            events: event_tx,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run(command_rx));

        Ok(SessionHandle {
            events: event_rx,
            commands: command_tx,
            state: state_rx,
            task,
        })
    }
}

struct Driver {
    machine: Connection,
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    opening: bool,
    pending: VecDeque<Action>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<ConnectionState>,
}

async fn read_some(stream: &mut Option<TcpStream>, buf: &mut BytesMut) -> std::io::Result<usize> {
    match stream {
        Some(stream) => stream.read_buf(buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let address = self.endpoint.address();
        info!("Session task started ({:?}, {})", self.endpoint.role(), address);
        let mut read_buffer = BytesMut::with_capacity(64 * 1024);

        loop {
            self.execute().await;
            let state = self.machine.state();
            self.state.send_if_modified(|s| {
                let changed = *s != state;
                *s = state;
                changed
            });

            let deadline = self.machine.poll_timeout();

            tokio::select! {
                biased;

                command = commands.recv() => {
                    let now = Instant::now();
                    match command {
                        Some(Command::Send(message, reply)) => {
                            let result = self.machine.send(now, message).map(|(message, actions)| {
                                self.pending.extend(actions);
                                message
                            });
                            let _ = reply.send(result);
                        }
                        Some(Command::Select(reply)) => {
                            let result = self.machine.select(now);
                            let _ = reply.send(self.queue(result));
                        }
                        Some(Command::Deselect(reply)) => {
                            let result = self.machine.deselect(now);
                            let _ = reply.send(self.queue(result));
                        }
                        Some(Command::LinkTest(reply)) => {
                            let result = self.machine.link_test(now);
                            let _ = reply.send(self.queue(result));
                        }
                        Some(Command::Separate(reply)) => {
                            let result = self.machine.separate(now);
                            let _ = reply.send(self.queue(result));
                        }
                        Some(Command::Stop) | None => {
                            let actions = self.machine.stop(now);
                            self.pending.extend(actions);
                            self.execute().await;
                            self.state.send_replace(ConnectionState::Stopped);
                            break;
                        }
                    }
                }

                result = self.endpoint.open(), if self.opening => {
                    self.opening = false;
                    let now = Instant::now();
                    match result {
                        Ok((stream, peer)) => {
                            info!("Connected to {}", peer);
                            self.stream = Some(stream);
                            let actions = self.machine.on_connected(now);
                            self.pending.extend(actions);
                        }
                        Err(e) => {
                            let actions = self.machine.on_connect_failed(now, &e.to_string());
                            self.pending.extend(actions);
                        }
                    }
                }

                result = read_some(&mut self.stream, &mut read_buffer),
                    if self.stream.is_some() =>
                {
                    let now = Instant::now();
                    let actions = match result {
                        Ok(0) => self.machine.on_disconnected(now, "connection closed by peer"),
                        Ok(n) => {
                            let actions = self.machine.on_bytes(now, &read_buffer[..n]);
                            read_buffer.clear();
                            actions
                        }
                        Err(e) => self.machine.on_disconnected(now, &e.to_string()),
                    };
                    self.pending.extend(actions);
                }

                _ = sleep_until(deadline), if deadline.is_some() => {
                    let actions = self.machine.handle_timeout(Instant::now());
                    self.pending.extend(actions);
                }
            }
        }

        info!(
            "Session with {} ended. Stats: {:?}",
            address,
            self.machine.stats()
        );
    }

    fn queue(&mut self, result: Result<Vec<Action>, SessionError>) -> Result<(), SessionError> {
        result.map(|actions| self.pending.extend(actions))
    }

    async fn execute(&mut self) {
        while let Some(action) = self.pending.pop_front() {
            match action {
                Action::Open => self.opening = true,
                Action::Send(message) => self.write(message).await,
                Action::Emit(event) => {
                    if self.events.send(event).await.is_err() {
                        debug!("Event receiver dropped");
                    }
                }
                Action::Close => {
                    if let Some(mut stream) = self.stream.take() {
                        if let Err(e) = stream.shutdown().await {
                            debug!("Shutdown failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn write(&mut self, message: Message) {
        let Some(stream) = self.stream.as_mut() else {
            debug!("Dropping {} (no connection)", message);
            return;
        };
        if let Err(e) = stream.write_all(&message.encode()).await {
            warn!("Failed to send {}: {}", message, e);
            let actions = self.machine.on_disconnected(Instant::now(), &e.to_string());
            self.pending.extend(actions);
        }
    }
}
