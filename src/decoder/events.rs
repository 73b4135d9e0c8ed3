//! Anchor discriminators and `Program data:` log events.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::BorshDeserialize;
use solana_sdk::hash::hashv;
use std::collections::HashMap;

pub const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// First 8 bytes of `sha256("{namespace}:{name}")`.
pub fn anchor_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let hash = hashv(&[namespace.as_bytes(), b":", name.as_bytes()]);
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.to_bytes()[..8]);
    out
}

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    anchor_discriminator("global", name)
}

pub fn event_discriminator(name: &str) -> [u8; 8] {
    anchor_discriminator("event", name)
}

/// Split instruction data into its 8-byte discriminator and argument bytes.
pub fn split_discriminator(data: &[u8]) -> Option<([u8; 8], &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&data[..8]);
    Some((disc, &data[8..]))
}

/// Borsh-decode `T` from the front of `bytes`, ignoring any trailing fields
/// newer program versions append.
pub fn decode_prefix<T: BorshDeserialize>(bytes: &[u8]) -> Option<T> {
    let mut cursor = bytes;
    T::deserialize(&mut cursor).ok()
}

/// Base64 payload of a `Program data:` log line.
pub fn program_data(line: &str) -> Option<Vec<u8>> {
    let encoded = line.strip_prefix(PROGRAM_DATA_PREFIX)?;
    STANDARD.decode(encoded.trim()).ok()
}

/// All events in log order whose discriminator matches, with the
/// discriminator stripped.
pub fn events_with_discriminator(logs: &[String], discriminator: &[u8; 8]) -> Vec<Vec<u8>> {
    logs.iter()
        .filter_map(|line| program_data(line))
        .filter(|bytes| bytes.len() > 8 && bytes[..8] == discriminator[..])
        .map(|bytes| bytes[8..].to_vec())
        .collect()
}

/// Per-run ordering of log events. Each call to `next` for the same
/// `(tx_hash, instruction, pool)` returns the following index, so the N-th
/// instruction on a pool consumes the N-th matching event.
#[derive(Debug, Default)]
pub struct EventCounter {
    next: HashMap<(String, &'static str, String), usize>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, tx_hash: &str, instruction: &'static str, pool: &str) -> usize {
        let slot = self
            .next
            .entry((tx_hash.to_string(), instruction, pool.to_string()))
            .or_insert(0);
        let index = *slot;
        *slot += 1;
        index
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}
