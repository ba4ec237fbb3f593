//! HSMS session: connection state machine, timers and the tokio driver.
//!
//! The protocol logic lives in [`Connection`], a sans-io state machine that
//! consumes socket bytes, timer expiries and application requests and returns
//! [`Action`]s. [`Session`] runs a connection on a tokio task over TCP.
//!
//! ## Features
//!
//! - **Active and passive roles**: connect out or accept one peer at a time
//! - **Select/deselect**: SELECT and DESELECT procedures with status codes
//! - **Timers**: T3 reply, T5 connect separation, T6 control, T7 not-selected,
//!   T8 inter-character and periodic linktest
//! - **Transactions**: outstanding requests keyed by context
//!
//! ## Example
//!
//! ```rust,no_run
//! use hsms_session::{Role, Session, SessionConfig, SessionEvent};
//! use hsms_wire::{DataItem, Message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig {
//!     address: "127.0.0.1:5000".parse()?,
//!     device: 1,
//!     role: Role::Passive,
//!     ..Default::default()
//! };
//!
//! let mut handle = Session::new(config).start()?;
//!
//! while let Some(event) = handle.next_event().await {
//!     match event {
//!         SessionEvent::Established => println!("selected"),
//!         SessionEvent::Received(msg) if msg.is_reply_required() => {
//!             let reply = Message::reply_to(&msg, vec![DataItem::text("OK")?])?;
//!             handle.send(reply).await?;
//!         }
//!         SessionEvent::Dropped { reason } => println!("dropped: {}", reason),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod error;
pub mod session;
pub mod timers;
pub mod transaction;
pub mod transport;

// Re-export main types
pub use connection::{
    Action, Connection, ConnectionState, DebugOptions, Role, SessionEvent, SessionStats,
};
pub use error::{Failure, SessionError};
pub use session::{Session, SessionConfig, SessionHandle};
pub use timers::{Timer, Timers};
pub use transaction::{Transaction, TransactionTable};
pub use transport::{connect_tcp, listen_tcp, Endpoint};
