//! Shared-engine decode pool.
//!
//! One loaded model serves every session. The pool bounds how many decode
//! calls run at once (waiting sessions are backpressured at the semaphore),
//! runs the blocking inference on tokio's blocking thread pool, and applies
//! a per-call timeout. The admission permit travels into the blocking
//! closure: a timed-out call keeps its slot until the engine actually
//! returns, so a slow session can neither over-subscribe nor poison the
//! engine for everyone else.

use crate::defaults::{DECODE_TIMEOUT_MS, MAX_DECODE_CONCURRENCY};
use crate::engine::{DecodeContext, DecodeOutput, SpeechEngine};
use crate::error::{Result, SottoError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Pool sizing and timeout policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Decode calls allowed to run concurrently on the engine.
    pub max_concurrent: usize,
    /// Per-call deadline; an overrun is reported as a failed decode.
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_DECODE_CONCURRENCY,
            timeout: Duration::from_millis(DECODE_TIMEOUT_MS),
        }
    }
}

/// Handle multiplexing sessions onto one shared engine.
#[derive(Clone)]
pub struct EnginePool {
    engine: Arc<dyn SpeechEngine>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl EnginePool {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: PoolConfig) -> Self {
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: config.timeout,
        }
    }

    /// The underlying engine, for capability and model queries.
    pub fn engine(&self) -> &Arc<dyn SpeechEngine> {
        &self.engine
    }

    /// Run one decode call through the pool.
    ///
    /// Suspends until a slot is free, then until the engine returns or the
    /// deadline passes.
    pub async fn decode(&self, window: Vec<i16>, ctx: DecodeContext) -> Result<DecodeOutput> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SottoError::EngineUnavailable {
                message: "decode pool is shut down".to_string(),
            })?;

        let engine = Arc::clone(&self.engine);
        let handle = tokio::task::spawn_blocking(move || {
            // Hold the permit for the full blocking call, even if the
            // awaiting session timed out or went away.
            let _permit = permit;
            engine.decode(&window, &ctx)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(SottoError::DecodeTimeout {
                ms: self.timeout.as_millis() as u64,
            }),
            Ok(Err(join_err)) => Err(SottoError::DecodeFailed {
                message: format!("decode task panicked: {join_err}"),
            }),
            Ok(Ok(result)) => result,
        }
    }
}

impl std::fmt::Debug for EnginePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool")
            .field("model", &self.engine.model_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
