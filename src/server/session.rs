//! Per-client session state (§3): a protocol parser plus the set of
//! `(id, timestamp)` pairs this client currently has in flight, so a
//! disconnect can publish an interrupt for each of them.

use crate::protocol::Protocol;
use std::collections::HashSet;

pub struct Session {
    pub parser: Protocol,
    pub enqueued: HashSet<u64>,
}

impl Session {
    pub fn new(parser: Protocol) -> Self {
        Self {
            parser,
            enqueued: HashSet::new(),
        }
    }
}
