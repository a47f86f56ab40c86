//! The per-stream state machine.
//!
//! One [`StreamSession`] exists per accepted client stream. It owns no shared
//! state directly; it is the sole driver of [`CorrelationStore`] transitions
//! for the keys it touches. A session moves `Open -> Closing -> Closed`:
//! requests are consumed one at a time while `Open`, the observed keys are
//! drained into the outbound sink while `Closing`, and `Closed` ends the
//! task. A transport error or a shutdown cancellation closes the session
//! without draining, leaving pending entries for a prospective later pairing
//! on another stream.

use crate::server::{
    correlation::store::{CorrelationStore, Observed},
    telemetry::{
        increment_pairings, increment_protocol_violations, increment_requests,
        increment_responses,
    },
};
use futures::{Stream, StreamExt};
use pairwise_tonic_core::{
    Error,
    key::derive_key,
    proto::{Request, Response},
    types::CorrelationKey,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Lifecycle of one client stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Consuming inbound requests.
    Open,
    /// Inbound half-closed; draining observed keys to the outbound sink.
    Closing,
    /// Finished; no further store access.
    Closed,
}

/// Drives one client stream against the shared correlation store.
pub struct StreamSession {
    store: Arc<CorrelationStore>,
    /// Keys seen on this stream, in first-observed order. Recorded for every
    /// derivable key regardless of the observe outcome, so the close-time
    /// drain covers them all.
    keys_observed: Vec<CorrelationKey>,
    state: SessionState,
}

impl StreamSession {
    pub fn new(store: Arc<CorrelationStore>) -> Self {
        Self {
            store,
            keys_observed: Vec::new(),
            state: SessionState::Open,
        }
    }

    /// Consumes the inbound stream until it half-closes, errors, or the
    /// server shuts down, then drains and forwards any completed results.
    ///
    /// Dropping `resp_tx` on return is the stream's single completion
    /// signal; it happens only after every drain has been forwarded.
    pub async fn run<S>(
        mut self,
        mut inbound: S,
        resp_tx: mpsc::Sender<Result<Response, Status>>,
        shutdown: CancellationToken,
    ) where
        S: Stream<Item = Result<Request, Status>> + Unpin,
    {
        while self.state == SessionState::Open {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::warn!("session cancelled by shutdown; skipping drain");
                    self.state = SessionState::Closed;
                    return;
                }
                item = inbound.next() => match item {
                    Some(Ok(request)) => self.handle_request(request),
                    Some(Err(status)) => {
                        tracing::warn!(%status, "inbound stream error; skipping drain");
                        self.state = SessionState::Closed;
                        return;
                    }
                    None => self.state = SessionState::Closing,
                },
            }
        }

        self.forward_drained(&resp_tx).await;
        self.state = SessionState::Closed;
    }

    /// Processes one inbound request while `Open`.
    ///
    /// Core logic is synchronous with respect to this stream: key
    /// derivation, the store transition, and reduction all complete before
    /// the next inbound item is polled.
    fn handle_request(&mut self, request: Request) {
        tracing::info!(
            service_name = %request.service_name,
            payload = %request.payload,
            timestamp = %request.timestamp,
            "request accepted"
        );
        increment_requests();

        let key = match derive_key(&request.timestamp) {
            Ok(key) => key,
            Err(err) => {
                // Malformed timestamps never reach the store.
                tracing::warn!(%err, "dropping request with malformed timestamp");
                return;
            }
        };

        if !self.keys_observed.contains(&key) {
            self.keys_observed.push(key);
        }

        match self.store.observe(key, request) {
            Observed::StillPending => {
                tracing::debug!(key, "first arrival; awaiting partner");
            }
            Observed::PairedNow => {
                tracing::debug!(key, "pair completed");
                increment_pairings();
            }
            Observed::ProtocolViolation => {
                let err = Error::ProtocolViolation { key };
                tracing::warn!(%err, "extra request dropped");
                increment_protocol_violations();
            }
            Observed::ReductionFailed(err) => {
                tracing::error!(key, %err, "reduction failed; key cleared");
            }
        }
    }

    /// Drains every key this session observed and forwards the results, in
    /// key-observation order and reduction order within a key.
    async fn forward_drained(&mut self, resp_tx: &mpsc::Sender<Result<Response, Status>>) {
        for &key in &self.keys_observed {
            for response in self.store.drain(key) {
                tracing::info!(
                    service_name = %response.service_name,
                    payload = %response.payload,
                    timestamp = %response.timestamp,
                    "response emitted"
                );
                if let Err(e) = resp_tx.send(Ok(response)).await {
                    // Client went away mid-drain; remaining results for this
                    // key are already removed from the store and are lost.
                    let err = Error::ChannelError {
                        context: format!("Failed to forward response: {e}"),
                    };
                    tracing::warn!(key, %err, "client disconnected during drain");
                    return;
                }
                increment_responses();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio_stream::wrappers::ReceiverStream;

    const TS: &str = "2024-06-01 10:15:30";
    const OTHER_TS: &str = "2024-06-01 10:15:31";

    fn request(payload: &str, timestamp: &str) -> Result<Request, Status> {
        Ok(Request {
            service_name: "calc".to_owned(),
            payload: payload.to_owned(),
            timestamp: timestamp.to_owned(),
        })
    }

    async fn run_to_completion(
        store: &Arc<CorrelationStore>,
        items: Vec<Result<Request, Status>>,
    ) -> Vec<String> {
        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        let session = StreamSession::new(Arc::clone(store));
        session
            .run(stream::iter(items), resp_tx, CancellationToken::new())
            .await;

        let mut payloads = Vec::new();
        while let Some(item) = resp_rx.recv().await {
            payloads.push(item.unwrap().payload);
        }
        payloads
    }

    #[tokio::test]
    async fn drains_quotient_then_remainder_in_order() {
        let store = Arc::new(CorrelationStore::new());
        let payloads =
            run_to_completion(&store, vec![request("10", TS), request("3", TS)]).await;
        assert_eq!(payloads, ["quotient:3", "remainder:1"]);
    }

    #[tokio::test]
    async fn exact_division_drains_a_single_response() {
        let store = Arc::new(CorrelationStore::new());
        let payloads =
            run_to_completion(&store, vec![request("10", TS), request("2", TS)]).await;
        assert_eq!(payloads, ["quotient:5"]);
    }

    #[tokio::test]
    async fn mismatched_keys_never_pair() {
        let store = Arc::new(CorrelationStore::new());
        let payloads =
            run_to_completion(&store, vec![request("10", TS), request("3", OTHER_TS)]).await;

        assert!(payloads.is_empty());
        // Both halves stay pending for partners that may arrive on another
        // stream.
        assert_eq!(store.pending_keys(), 2);
    }

    #[tokio::test]
    async fn malformed_timestamp_is_dropped_without_store_mutation() {
        let store = Arc::new(CorrelationStore::new());
        let payloads = run_to_completion(&store, vec![request("10", "not a time")]).await;

        assert!(payloads.is_empty());
        assert_eq!(store.pending_keys(), 0);
    }

    #[tokio::test]
    async fn extra_request_for_a_paired_key_is_dropped() {
        let store = Arc::new(CorrelationStore::new());
        let payloads = run_to_completion(
            &store,
            vec![request("10", TS), request("3", TS), request("99", TS)],
        )
        .await;

        // The third request neither mutates nor duplicates the results.
        assert_eq!(payloads, ["quotient:3", "remainder:1"]);
    }

    #[tokio::test]
    async fn stream_error_skips_the_drain() {
        let store = Arc::new(CorrelationStore::new());
        let payloads = run_to_completion(
            &store,
            vec![
                request("10", TS),
                request("3", TS),
                Err(Status::aborted("connection reset")),
            ],
        )
        .await;

        assert!(payloads.is_empty());
        // The completed pair stays parked; only a drain removes it.
        assert_eq!(store.drain(derive_key(TS).unwrap()).len(), 2);
    }

    #[tokio::test]
    async fn shutdown_cancellation_skips_the_drain() {
        let store = Arc::new(CorrelationStore::new());
        // Capacity 1 so each send below only completes once the session has
        // pulled the previous request off the channel and processed it.
        let (req_tx, req_rx) = mpsc::channel(1);
        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let session = StreamSession::new(Arc::clone(&store));
        let task = tokio::spawn(session.run(
            ReceiverStream::new(req_rx),
            resp_tx,
            shutdown.clone(),
        ));

        req_tx.send(request("10", TS)).await.unwrap();
        req_tx.send(request("3", TS)).await.unwrap();
        // Once this send completes, both halves of the pair have left the
        // channel: the session is committed to reducing them before it can
        // observe the cancel. The extra request may or may not be seen.
        req_tx.send(request("99", TS)).await.unwrap();
        shutdown.cancel();
        task.await.unwrap();

        // Cancellation forwards nothing; the reduced pair stays parked.
        assert!(resp_rx.recv().await.is_none());
        assert_eq!(store.drain(derive_key(TS).unwrap()).len(), 2);
    }

    #[tokio::test]
    async fn pairing_across_sessions_drains_on_the_completing_stream() {
        let store = Arc::new(CorrelationStore::new());

        // First stream contributes one half and closes; nothing to drain yet.
        let first = run_to_completion(&store, vec![request("10", TS)]).await;
        assert!(first.is_empty());

        // Second stream completes the pair and receives the results.
        let second = run_to_completion(&store, vec![request("2", TS)]).await;
        assert_eq!(second, ["quotient:5"]);
    }
}
