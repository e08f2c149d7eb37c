//! Connection dispatcher.
//!
//! Accepts connections on a `tcp://` or `unix://` URI and drives one
//! independent session per connection. A configurable session limit is
//! enforced at accept time with an explicit overflow policy; sessions are
//! isolated, so one failing connection never disturbs the others.

use crate::defaults::{MAX_SESSIONS, QUEUE_WAIT_MS};
use crate::engine::{EnginePool, SpeechEngine};
use crate::error::{Result, SottoError};
use crate::protocol::codec::{EventDecoder, encode};
use crate::protocol::{Event, InfoData};
use crate::session::{Session, SessionConfig, SessionState};
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Parsed bind target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindUri {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for BindUri {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            Ok(BindUri::Tcp(addr.to_string()))
        } else if let Some(path) = s.strip_prefix("unix://") {
            Ok(BindUri::Unix(PathBuf::from(path)))
        } else {
            Err(SottoError::ConfigInvalidValue {
                key: "server.uri".to_string(),
                message: format!("expected tcp://host:port or unix://path, got '{s}'"),
            })
        }
    }
}

impl std::fmt::Display for BindUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindUri::Tcp(addr) => write!(f, "tcp://{addr}"),
            BindUri::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// What happens to connections past the session limit.
///
/// This is an explicit configuration choice, not a hidden default: `reject`
/// answers immediately with a `resource-exhausted` Error event and closes,
/// `queue` holds the connection for a bounded wait first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Reject,
    Queue,
}

impl FromStr for OverflowPolicy {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(OverflowPolicy::Reject),
            "queue" => Ok(OverflowPolicy::Queue),
            other => Err(SottoError::ConfigInvalidValue {
                key: "server.overflow".to_string(),
                message: format!("expected 'reject' or 'queue', got '{other}'"),
            }),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind URI (`tcp://host:port` or `unix://path`).
    pub uri: String,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Policy for connections past the limit.
    pub overflow: OverflowPolicy,
    /// How long a queued connection waits before rejection.
    pub queue_wait: Duration,
    /// Per-session tunables.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uri: crate::defaults::DEFAULT_URI.to_string(),
            max_sessions: MAX_SESSIONS,
            overflow: OverflowPolicy::default(),
            queue_wait: Duration::from_millis(QUEUE_WAIT_MS),
            session: SessionConfig::default(),
        }
    }
}

/// Bound listener, either kind of socket.
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    pub async fn bind(uri: &BindUri) -> Result<Self> {
        match uri {
            BindUri::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr).await?)),
            BindUri::Unix(path) => {
                // Clean up any stale socket file from a previous run.
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Ok(Listener::Unix(UnixListener::bind(path)?))
            }
        }
    }

    /// Bound address, for tests binding port 0.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Unix(_) => None,
        }
    }

    async fn accept(&self) -> std::io::Result<(Box<dyn Connection>, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((Box::new(stream), peer.to_string()))
            }
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), "unix".to_string()))
            }
        }
    }
}

/// Byte stream a session can be driven over.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// The event server.
pub struct Server {
    config: ServerConfig,
    pool: EnginePool,
    info: Arc<InfoData>,
    next_session_id: Arc<AtomicU64>,
}

impl Server {
    /// Create a server around a ready engine pool.
    ///
    /// # Errors
    /// `EngineUnavailable` if the engine reports not-ready; the process
    /// must not begin accepting connections it cannot serve.
    pub fn new(pool: EnginePool, config: ServerConfig) -> Result<Self> {
        let engine = pool.engine();
        if !engine.is_ready() {
            return Err(SottoError::EngineUnavailable {
                message: format!("engine '{}' is not ready", engine.model_name()),
            });
        }

        let info = Arc::new(InfoData::for_engine(
            engine.model_name(),
            engine.capabilities().languages,
        ));

        Ok(Self {
            config,
            pool,
            info,
            next_session_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Bind the configured URI and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let uri: BindUri = self.config.uri.parse()?;
        let listener = Listener::bind(&uri).await?;
        info!(%uri, model = self.pool.engine().model_name(), "listening");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve(self, listener: Listener, shutdown: impl Future<Output = ()>) -> Result<()> {
        let limiter = Arc::new(Semaphore::new(self.config.max_sessions.max(1)));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer, Arc::clone(&limiter)),
                        Err(err) => {
                            // Transient accept failures must not kill the server.
                            warn!(%err, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    fn spawn_connection(
        &self,
        mut stream: Box<dyn Connection>,
        peer: String,
        limiter: Arc<Semaphore>,
    ) {
        let pool = self.pool.clone();
        let info = Arc::clone(&self.info);
        let session_config = self.config.session.clone();
        let ids = Arc::clone(&self.next_session_id);
        let overflow = self.config.overflow;
        let queue_wait = self.config.queue_wait;
        let max_sessions = self.config.max_sessions;

        tokio::spawn(async move {
            let permit = match overflow {
                OverflowPolicy::Reject => limiter.try_acquire_owned().ok(),
                OverflowPolicy::Queue => tokio::time::timeout(queue_wait, limiter.acquire_owned())
                    .await
                    .ok()
                    .and_then(|r| r.ok()),
            };

            let Some(_permit) = permit else {
                let err = SottoError::ResourceExhausted {
                    limit: max_sessions,
                };
                warn!(%peer, %err, "connection rejected");
                let bytes = encode(&Event::error(&err));
                let _ = stream.write_all(&bytes).await;
                let _ = stream.flush().await;
                return;
            };

            debug!(%peer, "connection accepted");
            match drive_connection(stream.as_mut(), pool, info, session_config, ids).await {
                Ok(()) => debug!(%peer, "connection closed"),
                Err(err) => warn!(%peer, %err, "connection closed with error"),
            }
        });
    }
}

/// Read, decode, and answer events on one connection until it closes.
///
/// A Closed session is replaced with a fresh one so a client can run
/// multiple transcription passes over one connection; every pass is still
/// exactly one Session.
async fn drive_connection<S>(
    mut stream: S,
    pool: EnginePool,
    info: Arc<InfoData>,
    session_config: SessionConfig,
    ids: Arc<AtomicU64>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let new_session = |ids: &AtomicU64| {
        Session::new(
            ids.fetch_add(1, Ordering::Relaxed),
            pool.clone(),
            Arc::clone(&info),
            session_config.clone(),
        )
    };

    let mut decoder = EventDecoder::new();
    let mut session = new_session(&ids);
    let mut buf = vec![0u8; 8192];

    loop {
        // Drain every frame already buffered before reading again.
        loop {
            let frame = match decoder.next() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    send_fatal(&mut stream, &err).await;
                    return Err(err);
                }
            };

            let replies = match session.handle(frame).await {
                Ok(replies) => replies,
                Err(err) => {
                    send_fatal(&mut stream, &err).await;
                    return Err(err);
                }
            };

            for event in &replies {
                stream.write_all(&encode(event)).await?;
            }
            if !replies.is_empty() {
                stream.flush().await?;
            }

            if session.state() == SessionState::Closed {
                session = new_session(&ids);
            }
        }

        let n = stream.read(&mut buf).await?;
        if n == 0 {
            // Peer closed. Leftover buffered bytes mean it died mid-event.
            decoder.finish()?;
            return Ok(());
        }
        decoder.extend(&buf[..n]);
    }
}

/// Best-effort Error event before closing a corrupted connection.
async fn send_fatal<S>(stream: &mut S, err: &SottoError)
where
    S: AsyncWrite + Unpin + Send,
{
    let bytes = encode(&Event::error(err));
    let _ = stream.write_all(&bytes).await;
    let _ = stream.flush().await;
}
