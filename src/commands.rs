//! Movement tokens and the per-connection command log.
//!
//! The log is keyed by connection id and only ever grows. Entries outlive the
//! connection that wrote them and stay readable through
//! `GET /api/connections/{id}`. Nothing prunes them; memory grows with the
//! number of connections that ever moved.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::connection::ConnectionId;

/// One of the four single-character movement commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Movement {
    W,
    A,
    S,
    D,
}

impl Movement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W => "W",
            Self::A => "A",
            Self::S => "S",
            Self::D => "D",
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a movement token: {0:?}")]
pub struct ParseMovementError(String);

/// Exact, case-sensitive match.
impl FromStr for Movement {
    type Err = ParseMovementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "W" => Ok(Self::W),
            "A" => Ok(Self::A),
            "S" => Ok(Self::S),
            "D" => Ok(Self::D),
            _ => Err(ParseMovementError(s.to_string())),
        }
    }
}

/// Append-only movement history per connection.
///
/// Appends to one key hold that key's shard lock for the push, so concurrent
/// appends never lose updates. Different keys on different shards proceed in
/// parallel. Cloneable — all clones share the same map.
#[derive(Clone, Default)]
pub struct CommandLog {
    entries: Arc<DashMap<ConnectionId, Vec<Movement>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `movement`, creating the entry on first use.
    pub fn append(&self, id: ConnectionId, movement: Movement) {
        self.entries.entry(id).or_default().push(movement);
    }

    /// Snapshot of the history in arrival order. Empty if nothing was recorded.
    pub fn read(&self, id: &ConnectionId) -> Vec<Movement> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// History rendered as tokens joined by single spaces.
    pub fn render(&self, id: &ConnectionId) -> String {
        self.entries.get(id).map_or_else(String::new, |entry| {
            entry
                .value()
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    /// Whether any movement was ever recorded for `id`.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of connections with recorded history.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_movement() {
        assert_eq!("W".parse::<Movement>(), Ok(Movement::W));
        assert_eq!("A".parse::<Movement>(), Ok(Movement::A));
        assert_eq!("S".parse::<Movement>(), Ok(Movement::S));
        assert_eq!("D".parse::<Movement>(), Ok(Movement::D));
        assert!("w".parse::<Movement>().is_err());
        assert!("WA".parse::<Movement>().is_err());
        assert!(" W".parse::<Movement>().is_err());
        assert!("".parse::<Movement>().is_err());
    }

    #[test]
    fn test_append_preserves_order() {
        let log = CommandLog::new();
        let id = ConnectionId::new();

        assert!(log.read(&id).is_empty());
        assert_eq!(log.render(&id), "");

        log.append(id, Movement::W);
        assert_eq!(log.render(&id), "W");

        log.append(id, Movement::A);
        log.append(id, Movement::D);
        assert_eq!(log.read(&id), vec![Movement::W, Movement::A, Movement::D]);
        assert_eq!(log.render(&id), "W A D");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let log = CommandLog::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        log.append(a, Movement::W);
        log.append(b, Movement::S);
        log.append(a, Movement::D);

        assert_eq!(log.render(&a), "W D");
        assert_eq!(log.render(&b), "S");
        assert!(log.contains(&a));
        assert!(!log.contains(&ConnectionId::new()));
    }

    #[test]
    fn test_concurrent_appends_same_key_lose_nothing() {
        let log = CommandLog::new();
        let id = ConnectionId::new();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        log.append(id, Movement::S);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(log.read(&id).len(), 8 * 500);
    }

    #[test]
    fn test_concurrent_appends_distinct_keys_keep_order() {
        let log = CommandLog::new();
        let sequence = [Movement::W, Movement::A, Movement::S, Movement::D];

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    let id = ConnectionId::new();
                    for _ in 0..100 {
                        for m in sequence {
                            log.append(id, m);
                        }
                    }
                    id
                })
            })
            .collect();

        for t in threads {
            let id = t.join().unwrap();
            let history = log.read(&id);
            assert_eq!(history.len(), 400);
            assert!(history.chunks(4).all(|chunk| chunk == sequence));
        }
    }
}
