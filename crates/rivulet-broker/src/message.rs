//! Wire messages: a JSON header map plus an opaque body.
//!
//! The header map carries the channel envelope (see
//! `rivulet_core::envelope`); the body is the UTF-8 row payload. The
//! broker itself never looks inside either.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub headers: Map<String, Value>,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(headers: Map<String, Value>, body: Vec<u8>) -> Self {
        Self { headers, body }
    }
}

/// One consumed message plus the tag used to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub tag: u64,
}
