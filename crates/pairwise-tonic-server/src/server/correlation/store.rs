//! The shared key-to-pairing-state store.
//!
//! One [`CorrelationStore`] instance is shared by every stream session in the
//! process. A key moves through `absent -> OnePending -> ResultsReady` and is
//! removed again when drained; it never re-enters `OnePending` once reduced.
//!
//! All mutating operations take the store's single mutex, so the
//! check-and-transition in [`CorrelationStore::observe`] is indivisible: two
//! streams racing to pair the same key cannot both reduce it, and a lost
//! update cannot drop a pairing. Streams only ever share a key when clients
//! intentionally send two requests with identical timestamp strings.

use pairwise_tonic_core::{
    Error,
    proto::{Request, Response},
    reduce::reduce,
    types::CorrelationKey,
};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Pairing state held for one correlation key.
///
/// Key absence is the implicit `Empty` state; it is never materialized.
#[derive(Debug)]
enum PairingEntry {
    /// Exactly one request seen for this key, awaiting its partner. The
    /// stored request is the eventual dividend.
    OnePending(Request),
    /// A completed pair has been reduced; results await a drain.
    ResultsReady(Vec<Response>),
}

/// Outcome of observing one request against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// First arrival for the key; a partner is still outstanding.
    StillPending,
    /// Second arrival; the pair was reduced and its results parked.
    PairedNow,
    /// Third or later arrival for an already-reduced key. The store was left
    /// untouched and the request dropped.
    ProtocolViolation,
    /// The pair completed but reduction failed (bad payload or zero
    /// divisor). The key was cleared so it does not pend forever.
    ReductionFailed(Error),
}

/// Process-wide mapping from [`CorrelationKey`] to pairing state.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    entries: Mutex<HashMap<CorrelationKey, PairingEntry>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one request into the pairing state for `key`.
    ///
    /// The first arrival is stored as the pending dividend. The second
    /// arrival completes the pair: the stored payload is divided by the
    /// incoming one and the results (carrying the incoming request's service
    /// name) replace the entry. Any further arrival is a protocol violation
    /// and leaves the entry as-is.
    ///
    /// The whole transition runs under one lock acquisition.
    pub fn observe(&self, key: CorrelationKey, request: Request) -> Observed {
        let mut entries = self.entries.lock();

        match entries.remove(&key) {
            None => {
                entries.insert(key, PairingEntry::OnePending(request));
                Observed::StillPending
            }
            Some(PairingEntry::OnePending(first)) => {
                match reduce(&request.service_name, &first.payload, &request.payload) {
                    Ok(results) => {
                        entries.insert(key, PairingEntry::ResultsReady(results));
                        Observed::PairedNow
                    }
                    // The entry stays removed: a half of a failed pair must
                    // not linger as OnePending.
                    Err(err) => Observed::ReductionFailed(err),
                }
            }
            Some(ready @ PairingEntry::ResultsReady(_)) => {
                entries.insert(key, ready);
                Observed::ProtocolViolation
            }
        }
    }

    /// Removes and returns the completed results for `key`, in reduction
    /// order.
    ///
    /// Returns an empty sequence if the key is absent or still awaiting its
    /// partner; a `OnePending` entry is left in place for a prospective later
    /// pairing. Draining is idempotent: a second drain for the same key
    /// yields nothing.
    pub fn drain(&self, key: CorrelationKey) -> Vec<Response> {
        let mut entries = self.entries.lock();

        match entries.remove(&key) {
            Some(PairingEntry::ResultsReady(results)) => results,
            Some(pending @ PairingEntry::OnePending(_)) => {
                entries.insert(key, pending);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Number of keys still awaiting a partner.
    ///
    /// Such keys persist for the life of the process; there is no eviction.
    /// Reported at shutdown so the leak is at least visible.
    pub fn pending_keys(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| matches!(entry, PairingEntry::OnePending(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: CorrelationKey = 1_717_236_930_000;

    fn request(payload: &str) -> Request {
        Request {
            service_name: "calc".to_owned(),
            payload: payload.to_owned(),
            timestamp: "2024-06-01 10:15:30".to_owned(),
        }
    }

    fn payloads(responses: &[Response]) -> Vec<&str> {
        responses.iter().map(|r| r.payload.as_str()).collect()
    }

    #[test]
    fn first_arrival_pends_second_pairs() {
        let store = CorrelationStore::new();

        assert_eq!(store.observe(KEY, request("10")), Observed::StillPending);
        assert_eq!(store.observe(KEY, request("3")), Observed::PairedNow);
        assert_eq!(payloads(&store.drain(KEY)), ["quotient:3", "remainder:1"]);
    }

    #[test]
    fn third_arrival_is_a_protocol_violation() {
        let store = CorrelationStore::new();

        store.observe(KEY, request("10"));
        store.observe(KEY, request("2"));
        assert_eq!(
            store.observe(KEY, request("7")),
            Observed::ProtocolViolation
        );

        // The existing results survive the violation untouched.
        assert_eq!(payloads(&store.drain(KEY)), ["quotient:5"]);
    }

    #[test]
    fn drain_is_idempotent() {
        let store = CorrelationStore::new();

        store.observe(KEY, request("10"));
        store.observe(KEY, request("2"));

        assert_eq!(store.drain(KEY).len(), 1);
        assert!(store.drain(KEY).is_empty());
    }

    #[test]
    fn drain_leaves_a_pending_entry_in_place() {
        let store = CorrelationStore::new();

        store.observe(KEY, request("10"));
        assert!(store.drain(KEY).is_empty());
        assert_eq!(store.pending_keys(), 1);

        // The partner can still arrive after an early drain attempt.
        assert_eq!(store.observe(KEY, request("2")), Observed::PairedNow);
        assert_eq!(payloads(&store.drain(KEY)), ["quotient:5"]);
    }

    #[test]
    fn drain_of_an_absent_key_is_empty() {
        let store = CorrelationStore::new();
        assert!(store.drain(KEY).is_empty());
    }

    #[test]
    fn failed_reduction_clears_the_key() {
        let store = CorrelationStore::new();

        store.observe(KEY, request("ten"));
        let outcome = store.observe(KEY, request("2"));
        assert!(matches!(
            outcome,
            Observed::ReductionFailed(Error::PayloadParse { .. })
        ));

        assert_eq!(store.pending_keys(), 0);
        assert!(store.drain(KEY).is_empty());
    }

    #[test]
    fn zero_divisor_clears_the_key() {
        let store = CorrelationStore::new();

        store.observe(KEY, request("10"));
        let outcome = store.observe(KEY, request("0"));
        assert!(matches!(
            outcome,
            Observed::ReductionFailed(Error::DivisionByZero { dividend: 10 })
        ));
        assert_eq!(store.pending_keys(), 0);
    }

    #[test]
    fn distinct_keys_never_pair() {
        let store = CorrelationStore::new();

        assert_eq!(store.observe(KEY, request("10")), Observed::StillPending);
        assert_eq!(
            store.observe(KEY + 1_000, request("3")),
            Observed::StillPending
        );
        assert_eq!(store.pending_keys(), 2);
    }

    // Two threads racing the same key must produce exactly one pairing:
    // one observer sees StillPending, the other PairedNow, and the drained
    // results appear exactly once.
    #[test]
    fn concurrent_observes_pair_exactly_once() {
        use std::thread::scope;

        const ROUNDS: i64 = 256;

        let store = CorrelationStore::new();

        for round in 0..ROUNDS {
            let key = KEY + round;

            let (a, b) = scope(|s| {
                let a = s.spawn(|| store.observe(key, request("10")));
                let b = s.spawn(|| store.observe(key, request("3")));
                (a.join().unwrap(), b.join().unwrap())
            });

            let mut outcomes = [a, b];
            outcomes.sort_by_key(|o| matches!(o, Observed::PairedNow));
            assert_eq!(outcomes[0], Observed::StillPending);
            assert_eq!(outcomes[1], Observed::PairedNow);

            let drained = store.drain(key);
            assert_eq!(drained.len(), 2, "round {round}: one reduction expected");
            assert!(store.drain(key).is_empty());
        }

        assert_eq!(store.pending_keys(), 0);
    }
}
