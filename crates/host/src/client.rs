//! Single-flight framed TCP client to the Blender host.
//!
//! Exactly one request may be outstanding: the host is non-reentrant, so a
//! second `send` while one is pending fails fast with `Busy` rather than
//! queueing. On socket loss the client reconnects with exponential backoff
//! (5 s doubling to 60 s, ten attempts) and then parks in a sticky
//! `Exhausted` state until an operator calls [`HostClient::reconnect_now`].

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use meshpilot_config::HostConfig;
use meshpilot_core::error::HostError;
use meshpilot_core::host::{HostPort, commands};

use crate::framing::{FrameBuffer, MAX_IDLE_BUFFER};

/// Transport tuning, derived from [`HostConfig`].
#[derive(Debug, Clone)]
pub struct HostClientConfig {
    pub addr: String,
    pub command_timeout: Duration,
    pub execute_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_cap: Duration,
    pub reconnect_attempts: u32,
}

impl From<&HostConfig> for HostClientConfig {
    fn from(c: &HostConfig) -> Self {
        Self {
            addr: c.addr.clone(),
            command_timeout: Duration::from_secs(c.command_timeout_secs),
            execute_timeout: Duration::from_secs(c.execute_timeout_secs),
            reconnect_initial: Duration::from_secs(c.reconnect_initial_secs),
            reconnect_cap: Duration::from_secs(c.reconnect_cap_secs),
            reconnect_attempts: c.reconnect_attempts,
        }
    }
}

impl Default for HostClientConfig {
    fn default() -> Self {
        Self::from(&HostConfig::default())
    }
}

/// Link lifecycle. `Exhausted` is terminal until operator intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Exhausted,
}

struct Pending {
    command: String,
    tx: oneshot::Sender<Result<Value, HostError>>,
}

struct Shared {
    config: HostClientConfig,
    state: StdMutex<LinkState>,
    pending: StdMutex<Option<Pending>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Bumped on every new connection so a stale reader can't trigger a
    /// reconnect after a fresh link is already up.
    generation: AtomicU64,
}

/// The framed, single-flight TCP client.
#[derive(Clone)]
pub struct HostClient {
    shared: Arc<Shared>,
}

impl HostClient {
    /// Dial the host and start the reader task.
    pub async fn connect(config: HostClientConfig) -> Result<Self, HostError> {
        let shared = Arc::new(Shared {
            config,
            state: StdMutex::new(LinkState::Connecting),
            pending: StdMutex::new(None),
            writer: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        let stream = TcpStream::connect(&shared.config.addr)
            .await
            .map_err(|e| HostError::Io(format!("connect {}: {e}", shared.config.addr)))?;
        install(shared.clone(), stream).await;
        info!(addr = %shared.config.addr, "Connected to Blender host");

        Ok(Self { shared })
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.shared.state.lock().expect("state lock poisoned")
    }

    /// Operator intervention: leave `Exhausted` and dial once immediately.
    /// A success resets the reconnect budget.
    pub async fn reconnect_now(&self) -> Result<(), HostError> {
        *self.shared.state.lock().expect("state lock poisoned") = LinkState::Connecting;
        let stream = TcpStream::connect(&self.shared.config.addr)
            .await
            .map_err(|e| {
                *self.shared.state.lock().expect("state lock poisoned") =
                    LinkState::Disconnected;
                HostError::Io(format!("connect {}: {e}", self.shared.config.addr))
            })?;
        install(self.shared.clone(), stream).await;
        info!(addr = %self.shared.config.addr, "Reconnected to Blender host");
        Ok(())
    }

    fn take_pending(&self) -> Option<Pending> {
        self.shared.pending.lock().expect("pending lock poisoned").take()
    }
}

#[async_trait]
impl HostPort for HostClient {
    async fn send(&self, command: &str, params: Value) -> Result<Value, HostError> {
        match self.state() {
            LinkState::Connected => {}
            LinkState::Exhausted => {
                return Err(HostError::Exhausted {
                    attempts: self.shared.config.reconnect_attempts,
                });
            }
            _ => return Err(HostError::NotConnected),
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().expect("pending lock poisoned");
            if pending.is_some() {
                return Err(HostError::Busy);
            }
            *pending = Some(Pending {
                command: command.to_string(),
                tx,
            });
        }

        let request = json!({"type": command, "params": params}).to_string();
        {
            let mut writer = self.shared.writer.lock().await;
            let Some(w) = writer.as_mut() else {
                self.take_pending();
                return Err(HostError::NotConnected);
            };
            if let Err(e) = w.write_all(request.as_bytes()).await {
                self.take_pending();
                return Err(HostError::Io(format!("write failed: {e}")));
            }
        }

        let deadline = if command == commands::EXECUTE_CODE {
            self.shared.config.execute_timeout
        } else {
            self.shared.config.command_timeout
        };

        debug!(command, timeout_secs = deadline.as_secs(), "Host request dispatched");

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Reader dropped the sender: the link went down mid-request.
            Ok(Err(_)) => Err(HostError::NotConnected),
            Err(_) => {
                // Socket stays open; a late reply becomes an orphan frame.
                self.take_pending();
                warn!(command, "Host command timed out");
                Err(HostError::Timeout {
                    command: command.to_string(),
                    timeout_secs: deadline.as_secs(),
                })
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }
}

/// Wire up a fresh TCP stream: store the write half, mark connected, spawn
/// the reader.
///
/// Returns a boxed future to break the recursive `Send` auto-trait cycle
/// (`read_loop` -> `handle_disconnect` -> `install` -> spawn(`read_loop`)).
fn install(
    shared: Arc<Shared>,
    stream: TcpStream,
) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let (read, write) = stream.into_split();
        *shared.writer.lock().await = Some(write);
        *shared.state.lock().expect("state lock poisoned") = LinkState::Connected;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(read_loop(shared.clone(), read, generation));
    })
}

async fn read_loop(shared: Arc<Shared>, mut read: OwnedReadHalf, generation: u64) {
    let mut fb = FrameBuffer::new();
    let mut chunk = [0u8; 4096];

    loop {
        match read.read(&mut chunk).await {
            Ok(0) => {
                debug!("Host closed the connection");
                break;
            }
            Ok(n) => {
                fb.extend(&chunk[..n]);
                loop {
                    match fb.next_frame() {
                        Ok(Some(frame)) => route_frame(&shared, frame),
                        Ok(None) => break,
                        Err(e) => {
                            // Buffer already cleared by the scanner.
                            warn!(error = %e, "Malformed frame from host");
                            fail_pending(&shared, HostError::Protocol(e.to_string()));
                            break;
                        }
                    }
                }
                if should_clear_idle(fb.pending_len(), has_pending(&shared)) {
                    warn!(
                        bytes = fb.pending_len(),
                        "Clearing stray host output with no request pending"
                    );
                    fb.clear();
                }
            }
            Err(e) => {
                warn!(error = %e, "Host socket read failed");
                break;
            }
        }
    }

    // Only the reader of the current connection may drive reconnects.
    if shared.generation.load(Ordering::SeqCst) == generation {
        handle_disconnect(shared).await;
    }
}

fn has_pending(shared: &Shared) -> bool {
    shared.pending.lock().expect("pending lock poisoned").is_some()
}

fn fail_pending(shared: &Shared, error: HostError) {
    if let Some(p) = shared.pending.lock().expect("pending lock poisoned").take() {
        let _ = p.tx.send(Err(error));
    }
}

/// Route one parsed frame to the single pending request, or discard it.
fn route_frame(shared: &Shared, frame: Value) {
    let Some(p) = shared.pending.lock().expect("pending lock poisoned").take() else {
        debug!("Orphan frame discarded");
        return;
    };
    debug!(command = %p.command, "Host response routed");
    let _ = p.tx.send(interpret_frame(frame));
}

/// `status: "error"` fails the request with the host's message; otherwise
/// the `result` field (or the whole document) resolves it.
fn interpret_frame(frame: Value) -> Result<Value, HostError> {
    if frame.get("status").and_then(|s| s.as_str()) == Some("error") {
        let message = frame
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown host error")
            .to_string();
        return Err(HostError::ExecFailed { message });
    }
    match frame.get("result") {
        Some(result) => Ok(result.clone()),
        None => Ok(frame),
    }
}

async fn handle_disconnect(shared: Arc<Shared>) {
    *shared.state.lock().expect("state lock poisoned") = LinkState::Disconnected;
    *shared.writer.lock().await = None;
    fail_pending(&shared, HostError::NotConnected);

    let mut delay = shared.config.reconnect_initial;
    for attempt in 1..=shared.config.reconnect_attempts {
        *shared.state.lock().expect("state lock poisoned") = LinkState::Connecting;
        tokio::time::sleep(delay).await;

        match TcpStream::connect(&shared.config.addr).await {
            Ok(stream) => {
                // Success resets the attempt counter for the next outage.
                install(shared.clone(), stream).await;
                info!(attempt, addr = %shared.config.addr, "Reconnected to Blender host");
                return;
            }
            Err(e) => {
                warn!(attempt, error = %e, "Reconnect attempt failed");
                delay = std::cmp::min(delay * 2, shared.config.reconnect_cap);
            }
        }
    }

    warn!(
        attempts = shared.config.reconnect_attempts,
        "Reconnect budget exhausted, operator intervention required"
    );
    *shared.state.lock().expect("state lock poisoned") = LinkState::Exhausted;
}

/// Idle-buffer guard, split out for direct testing.
pub(crate) fn should_clear_idle(buffered: usize, has_pending: bool) -> bool {
    !has_pending && buffered > MAX_IDLE_BUFFER
}
