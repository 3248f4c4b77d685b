//! Request/reply correlation.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ClientError;

/// Prefix reserved for heartbeat references.
pub const HEARTBEAT_REF_PREFIX: &str = "hb:";

/// Fresh, process-unique request reference.
pub fn next_reference() -> String {
    Uuid::new_v4().to_string()
}

/// Fresh heartbeat reference carrying [`HEARTBEAT_REF_PREFIX`].
pub fn heartbeat_reference() -> String {
    format!("{HEARTBEAT_REF_PREFIX}{}", Uuid::new_v4())
}

pub fn is_heartbeat_reference(reference: &str) -> bool {
    reference.starts_with(HEARTBEAT_REF_PREFIX)
}

/// A pending entry that can be failed in bulk.
pub trait Pending {
    /// Consume the entry with a client-side error.
    fn fail(self, error: ClientError);
}

/// Pending request table keyed by reference.
///
/// Every entry is handed out at most once: `resolve` removes it, so a second
/// reply with the same reference finds nothing.
#[derive(Debug)]
pub struct Correlator<P> {
    pending: HashMap<String, P>,
}

impl<P> Default for Correlator<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Correlator<P> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Store an entry under `reference`, replacing any previous one.
    pub fn register(&mut self, reference: impl Into<String>, entry: P) {
        self.pending.insert(reference.into(), entry);
    }

    /// Remove and return the entry for `reference`.
    pub fn resolve(&mut self, reference: &str) -> Option<P> {
        self.pending.remove(reference)
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.pending.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<P: Pending> Correlator<P> {
    /// Remove every entry, failing each with `error`. Returns how many were
    /// cleared.
    pub fn clear_all(&mut self, error: &ClientError) -> usize {
        let drained: Vec<P> = self.pending.drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            entry.fail(error.clone());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<ClientError>>>);

    impl Pending for Recorder {
        fn fail(self, error: ClientError) {
            self.0.lock().unwrap().push(error);
        }
    }

    #[test]
    fn test_resolve_is_at_most_once() {
        let mut correlator = Correlator::new();
        correlator.register("1", "first");

        assert_eq!(correlator.resolve("1"), Some("first"));
        assert_eq!(correlator.resolve("1"), None);
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_unknown_reference_resolves_nothing() {
        let mut correlator = Correlator::new();
        correlator.register("1", ());

        assert_eq!(correlator.resolve("2"), None);
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_clear_all_fails_every_entry() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let mut correlator = Correlator::new();
        correlator.register("a", Recorder(failures.clone()));
        correlator.register("b", Recorder(failures.clone()));

        let cleared = correlator.clear_all(&ClientError::Disconnected);

        assert_eq!(cleared, 2);
        assert!(correlator.is_empty());
        assert_eq!(
            *failures.lock().unwrap(),
            vec![ClientError::Disconnected, ClientError::Disconnected]
        );
    }

    #[test]
    fn test_references_are_unique() {
        let refs: std::collections::HashSet<_> = (0..1000).map(|_| next_reference()).collect();
        assert_eq!(refs.len(), 1000);
    }

    #[test]
    fn test_heartbeat_reference_prefix() {
        let reference = heartbeat_reference();
        assert!(is_heartbeat_reference(&reference));
        assert!(!is_heartbeat_reference(&next_reference()));
    }
}
