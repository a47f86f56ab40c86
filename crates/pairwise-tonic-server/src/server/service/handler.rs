//! gRPC service implementation for pairwise request reduction.
//!
//! This module defines [`PairService`], the concrete implementation of the
//! `PairReducer` gRPC service defined in the protobuf specification. It
//! exposes a bidirectional streaming endpoint: each accepted stream gets its
//! own session task that feeds the shared correlation store and, on
//! half-close, streams the buffered results back to the client.
//!
//! ## Responsibilities
//!
//! - Accept `ReducePairs` streams and spawn one session task per stream.
//! - Share a single [`CorrelationStore`] across all concurrent sessions.
//! - Refuse new streams once shutdown has begun.
//! - Handle backpressure, cancellation, and graceful shutdown.

use crate::server::{
    config::ServerConfig,
    correlation::store::CorrelationStore,
    session::StreamSession,
    telemetry::{
        decrement_streams_inflight, increment_stream_errors, increment_streams,
        increment_streams_inflight, record_stream_duration,
    },
};
use core::pin::Pin;
use core::time::Duration;
use futures::TryStreamExt;
use pairwise_tonic_core::{
    Error,
    proto::{Request as PairRequest, Response as PairResponse, pair_reducer_server::PairReducer},
};
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);
static STREAMS_INFLIGHT: AtomicUsize = AtomicUsize::new(0);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// Marks the service as shutting down; subsequent streams are refused.
pub fn set_global_shutdown() {
    SHUTTING_DOWN.store(true, Ordering::SeqCst);
}

pub fn is_shutting_down() -> bool {
    SHUTTING_DOWN.load(Ordering::SeqCst)
}

/// Number of streams whose session task has not finished yet.
pub fn get_streams_inflight() -> usize {
    STREAMS_INFLIGHT.load(Ordering::SeqCst)
}

/// gRPC service pairing streamed requests by timestamp-derived key.
///
/// Implements the `PairReducer` service defined in the protobuf schema. All
/// sessions spawned by one instance share its correlation store, so two
/// streams carrying identical timestamp strings pair with each other exactly
/// as two requests on one stream do.
#[derive(Clone)]
pub struct PairService {
    config: ServerConfig,
    store: Arc<CorrelationStore>,
    shutdown_token: CancellationToken,
}

impl PairService {
    /// Creates a new `PairService` with an empty correlation store.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            store: Arc::new(CorrelationStore::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Initiates a graceful shutdown.
    ///
    /// New streams are refused immediately; in-flight sessions get a bounded
    /// window to finish on their own before the shared cancellation token
    /// closes them without draining.
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new streams ===
        tracing::info!("Refusing new streams");
        set_global_shutdown();

        // === Phase 1: Wait for in-flight streams to finish ===
        tracing::info!(
            "Draining in-flight streams ({} active)",
            get_streams_inflight()
        );
        let drain_result = timeout(
            Duration::from_secs(self.config.shutdown_timeout_secs),
            async {
                while get_streams_inflight() > 0 {
                    sleep(Duration::from_millis(100)).await;
                }
            },
        )
        .await;

        match drain_result {
            Ok(()) => {
                tracing::debug!("All in-flight streams finished");
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    get_streams_inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining sessions ===
        self.shutdown_token.cancel();

        let leftover = self.store.pending_keys();
        if leftover > 0 {
            // Unpaired keys are never evicted; make the leak visible.
            tracing::warn!(leftover, "unpaired keys left in the store at shutdown");
        }

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

#[tonic::async_trait]
impl PairReducer for PairService {
    type ReducePairsStream = Pin<Box<dyn Stream<Item = Result<PairResponse, Status>> + Send>>;

    /// Handles one bidirectional pairing stream.
    ///
    /// Spawns a session task that consumes the inbound requests, drives the
    /// shared store, and on half-close drains the observed keys back through
    /// the returned stream. The response stream completes only after every
    /// drained result has been forwarded.
    #[tracing::instrument(skip_all)]
    async fn reduce_pairs(
        &self,
        req: Request<Streaming<PairRequest>>,
    ) -> Result<Response<Self::ReducePairsStream>, Status> {
        let start = std::time::Instant::now();

        if is_shutting_down() {
            increment_stream_errors();
            return Err(Error::ServiceShutdown.into());
        }

        increment_streams();
        STREAMS_INFLIGHT.fetch_add(1, Ordering::SeqCst);
        increment_streams_inflight();

        let inbound = req.into_inner();
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<PairResponse, Status>>(self.config.stream_buffer_size);

        let session = StreamSession::new(Arc::clone(&self.store));
        let shutdown = self.shutdown_token.clone();
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);

        let fut = async move {
            session.run(inbound, resp_tx, shutdown).await;
            STREAMS_INFLIGHT.fetch_sub(1, Ordering::SeqCst);
            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_millis() as f64);
        };
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("session", id = session_id);
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx).inspect_err(|_e: &Status| {
            increment_stream_errors();
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
