//! Open request/reply transactions.

use crate::timers::Timer;
use hsms_wire::{generate_context, Message, MAX_GENERATED_CONTEXT};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A sent request waiting for its reply
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Context shared by request and reply
    pub context: u32,
    /// When the request was sent
    pub sent_at: Instant,
    /// The request
    pub primary: Message,
    /// T3 for data, T6 for control
    pub timer: Timer,
    /// Reply deadline
    pub deadline: Instant,
}

/// Transactions keyed by context
#[derive(Debug, Default)]
pub struct TransactionTable {
    open: HashMap<u32, Transaction>,
}

impl TransactionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a sent request
    pub fn open(&mut self, primary: Message, timer: Timer, now: Instant, timeout: Duration) {
        let context = primary.context();
        self.open.insert(
            context,
            Transaction {
                context,
                sent_at: now,
                primary,
                timer,
                deadline: now + timeout,
            },
        );
    }

    /// Remove the transaction for `context`
    pub fn close(&mut self, context: u32) -> Option<Transaction> {
        self.open.remove(&context)
    }

    /// Whether `context` is in use
    pub fn contains(&self, context: u32) -> bool {
        self.open.contains_key(&context)
    }

    /// Number of open transactions
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// True when nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Earliest reply deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.open.values().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest transaction whose deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Option<Transaction> {
        let context = self
            .open
            .values()
            .filter(|t| t.deadline <= now)
            .min_by_key(|t| t.deadline)
            .map(|t| t.context)?;
        self.open.remove(&context)
    }

    /// A context not used by any open transaction
    pub fn allocate_context(&self) -> u32 {
        if self.open.len() < MAX_GENERATED_CONTEXT as usize / 2 {
            loop {
                let context = generate_context();
                if !self.contains(context) {
                    return context;
                }
            }
        }
        (1..=u32::MAX).find(|c| !self.contains(*c)).unwrap_or(1)
    }

    /// Drop every transaction
    pub fn clear(&mut self) {
        self.open.clear();
    }
}
