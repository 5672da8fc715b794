//! TCP server for remote control clients.
//!
//! Listens on the configured address, accepts line-protocol clients and runs
//! the poll loop that pushes memory changes and expires controller hijacks.
//!
//! # Thread Safety
//!
//! The server runs on the tokio runtime. The accept loop, the poll loop and
//! each connection's reader and writer are separate tasks. All sessions and
//! the hijack table live in one [`ServerState`] behind a mutex that is never
//! held across an `.await`; sessions queue outbound lines on a channel so no
//! socket is written while the lock is held.

use crate::config::WatchConfig;
use crate::dispatch::{CommandContext, CommandRegistry};
use crate::hijack::HijackTable;
use crate::host::Host;
use crate::poll;
use crate::session::{SessionId, SessionRegistry};
use crate::{Result, WatchError};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Mutable state shared by the connection handlers and the poll loop.
#[derive(Debug)]
pub struct ServerState {
    pub sessions: SessionRegistry,
    pub hijacks: HijackTable,
}

impl ServerState {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            hijacks: HijackTable::new(
                config.remote_slots,
                config.pad_slots,
                config.hijack_timeout(),
            ),
        }
    }
}

/// Everything the server tasks share.
struct ServerContext {
    config: WatchConfig,
    host: Arc<dyn Host>,
    state: Mutex<ServerState>,
    registry: CommandRegistry,
}

impl ServerContext {
    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed bytes read from a session's socket and run every completed line.
    ///
    /// Returns `false` once the session should stop reading.
    fn receive(&self, id: SessionId, bytes: &[u8]) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(session) = state.sessions.get_mut(id) else {
            return false;
        };
        if session.is_disconnected() {
            return false;
        }

        let lines = match session.receive(bytes) {
            Ok(lines) => lines,
            Err(e) if e.is_terminal_for_session() => {
                warn!("Dropping client {}: {}", session.peer(), e);
                session.mark_disconnected("protocol error");
                return false;
            }
            Err(e) => {
                warn!("Discarding input from {}: {}", session.peer(), e);
                Vec::new()
            }
        };

        for line in lines {
            let mut ctx = CommandContext {
                session: &mut *session,
                hijacks: &mut state.hijacks,
                host: &*self.host,
                max_range_bytes: self.config.max_range_bytes,
            };
            self.registry.execute_line(&mut ctx, &line);
        }
        !session.is_disconnected()
    }

    fn is_live(&self, id: SessionId) -> bool {
        self.lock()
            .sessions
            .get(id)
            .is_some_and(|s| !s.is_disconnected())
    }
}

/// Handle to a running server. Dropping shuts down the server.
pub struct WatchServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    context: Arc<ServerContext>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WatchServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of sessions currently in the live set.
    pub fn session_count(&self) -> usize {
        self.context.lock().sessions.len()
    }

    /// Shut down the server gracefully.
    ///
    /// Signals every loop to stop and waits for the accept loop (which joins
    /// its connections) and the poll loop to finish.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Server task failed during shutdown: {}", e);
            }
        }
        info!("Server on {} stopped", self.addr);
    }
}

impl Drop for WatchServerHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Remote control server.
pub struct WatchServer;

impl WatchServer {
    /// Start the server with the given configuration and host.
    ///
    /// Binds the listener and spawns the accept and poll loops as background
    /// tokio tasks. A port of 0 binds an OS-assigned port.
    pub async fn start<H: Host>(config: WatchConfig, host: Arc<H>) -> Result<WatchServerHandle> {
        config.validate()?;
        let bind_addr = config.bind_addr()?;
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| WatchError::Io {
            message: format!("failed to bind {}: {}", bind_addr, e),
            path: None,
            source: Some(e),
        })?;
        let addr = listener.local_addr()?;
        let port = addr.port();

        info!("Listening on {}", addr);

        let host: Arc<dyn Host> = host;
        let context = Arc::new(ServerContext {
            state: Mutex::new(ServerState::new(&config)),
            config,
            host,
            registry: CommandRegistry::new(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(Self::accept_loop(
                context.clone(),
                listener,
                shutdown_rx.clone(),
            )),
            tokio::spawn(Self::poll_loop(context.clone(), shutdown_rx)),
        ];

        Ok(WatchServerHandle {
            addr,
            port,
            context,
            shutdown_tx,
            tasks,
        })
    }

    async fn accept_loop(
        context: Arc<ServerContext>,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut connections = JoinSet::new();

        while !*shutdown_rx.borrow() {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = timeout(context.config.accept_wait(), listener.accept()) => {
                    match accepted {
                        Ok(Ok((stream, peer))) => {
                            if let Some((id, outbound)) = Self::open_session(&context, peer) {
                                connections.spawn(Self::handle_connection(
                                    context.clone(),
                                    stream,
                                    id,
                                    outbound,
                                    shutdown_rx.clone(),
                                ));
                            }
                        }
                        Ok(Err(e)) => {
                            error!("Accept error: {}", e);
                        }
                        // Accept wait elapsed; fall through to the sweep.
                        Err(_) => {}
                    }
                }
            }

            let retired = context.lock().sessions.retire_disconnected();
            if retired > 0 {
                debug!("Retired {} disconnected session(s)", retired);
            }
            while connections.try_join_next().is_some() {}
        }

        info!("Server shutting down");
        context.lock().sessions.clear();
        while let Some(result) = connections.join_next().await {
            if let Err(e) = result {
                debug!("Connection task ended abnormally: {}", e);
            }
        }
    }

    /// Register a new session, or refuse it when the server is full.
    fn open_session(
        context: &ServerContext,
        peer: SocketAddr,
    ) -> Option<(SessionId, mpsc::Receiver<String>)> {
        let mut state = context.lock();
        if state.sessions.len() >= context.config.max_sessions {
            warn!(
                "Rejecting connection from {}: at max capacity ({})",
                peer, context.config.max_sessions
            );
            return None;
        }

        let (tx, rx) = mpsc::channel(context.config.outbound_capacity);
        let id = state
            .sessions
            .open(peer, tx, context.config.max_line_bytes);
        info!("Client connected: {}", peer);
        Some((id, rx))
    }

    async fn handle_connection(
        context: Arc<ServerContext>,
        stream: TcpStream,
        id: SessionId,
        outbound: mpsc::Receiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let (mut reader, writer) = stream.into_split();
        let mut writer_task = tokio::spawn(Self::write_loop(
            context.clone(),
            id,
            writer,
            outbound,
            shutdown_rx.clone(),
        ));

        let reason = Self::read_loop(&context, id, &mut reader, &mut shutdown_rx).await;
        context.lock().sessions.mark_disconnected(id, reason);

        // Give the writer one wait period to flush what is queued, then drop it.
        match timeout(context.config.accept_wait(), &mut writer_task).await {
            Ok(Err(e)) => debug!("Writer task for session {} failed: {}", id, e),
            Ok(Ok(())) => {}
            Err(_) => {
                debug!("Writer for session {} still busy, aborting", id);
                writer_task.abort();
            }
        }
    }

    async fn read_loop(
        context: &ServerContext,
        id: SessionId,
        reader: &mut OwnedReadHalf,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> &'static str {
        let mut buf = vec![0u8; context.config.read_chunk_size];

        loop {
            if *shutdown_rx.borrow() {
                return "server shutting down";
            }

            let read = tokio::select! {
                changed = shutdown_rx.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => return "server shutting down",
                },
                read = timeout(context.config.accept_wait(), reader.read(&mut buf)) => read,
            };

            match read {
                Err(_) => {
                    if !context.is_live(id) {
                        return "session closed";
                    }
                }
                Ok(Ok(0)) => return "closed by peer",
                Ok(Ok(n)) => {
                    if !context.receive(id, &buf[..n]) {
                        return "session closed";
                    }
                }
                Ok(Err(e)) => {
                    debug!("Read error on session {}: {}", id, e);
                    return "read error";
                }
            }
        }
    }

    /// Drain the session's outbound queue into the socket.
    ///
    /// A write that cannot complete within the accept wait means the client
    /// stopped reading; the session is dropped rather than left blocking.
    async fn write_loop(
        context: Arc<ServerContext>,
        id: SessionId,
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::Receiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let wait = context.config.accept_wait();

        while !*shutdown_rx.borrow() {
            let line = tokio::select! {
                _ = shutdown_rx.changed() => break,
                line = outbound.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
            };

            let written = tokio::select! {
                _ = shutdown_rx.changed() => break,
                written = timeout(wait, writer.write_all(line.as_bytes())) => written,
            };

            let reason = match written {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => {
                    debug!("Write error on session {}: {}", id, e);
                    "write error"
                }
                Err(_) => {
                    warn!("Client {} stopped reading, dropping session", id);
                    "write timed out"
                }
            };
            context.lock().sessions.mark_disconnected(id, reason);
            return;
        }
        let _ = timeout(wait, writer.shutdown()).await;
    }

    async fn poll_loop(context: Arc<ServerContext>, mut shutdown_rx: watch::Receiver<bool>) {
        let tick = context.config.tick_interval();
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown_rx.borrow() {
            tokio::select! {
                changed = shutdown_rx.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                _ = interval.tick() => {}
            }

            let report = poll::tick(&mut context.lock(), &*context.host, tick);
            if report.released > 0 {
                debug!("Released {} controller hijack(s)", report.released);
            }
        }
        debug!("Poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{GuestMemory, SimulatedHost, Width};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn test_config() -> WatchConfig {
        WatchConfig {
            port: 0,
            accept_wait_ms: 20,
            ..WatchConfig::default()
        }
    }

    async fn wait_for_sessions(handle: &WatchServerHandle, expected: usize) {
        for _ in 0..200 {
            if handle.session_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} sessions, have {}",
            expected,
            handle.session_count()
        );
    }

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let host = Arc::new(SimulatedHost::new(0, 1024));
        let handle = WatchServer::start(test_config(), host).await.unwrap();

        assert!(handle.port > 0);
        assert_eq!(handle.addr().port(), handle.port);
        assert_eq!(handle.session_count(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let host = Arc::new(SimulatedHost::new(0, 1024));
        let config = WatchConfig {
            tick_interval_ms: 0,
            ..test_config()
        };
        assert!(matches!(
            WatchServer::start(config, host).await,
            Err(WatchError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_round_trip() {
        let host = Arc::new(SimulatedHost::new(0, 1024));
        host.write(Width::W16, 100, 0x1234);
        let handle = WatchServer::start(test_config(), host).await.unwrap();

        let stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"READ 16 100\r\n").await.unwrap();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some("MEM 100 4660"));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_max_sessions_enforced() {
        let host = Arc::new(SimulatedHost::new(0, 1024));
        let config = WatchConfig {
            max_sessions: 1,
            ..test_config()
        };
        let handle = WatchServer::start(config, host).await.unwrap();

        let _first = TcpStream::connect(handle.addr()).await.unwrap();
        wait_for_sessions(&handle, 1).await;

        let mut second = TcpStream::connect(handle.addr()).await.unwrap();
        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(handle.session_count(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_overlong_line_drops_session() {
        let host = Arc::new(SimulatedHost::new(0, 1024));
        let config = WatchConfig {
            max_line_bytes: 32,
            ..test_config()
        };
        let handle = WatchServer::start(config, host).await.unwrap();

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        wait_for_sessions(&handle, 1).await;
        stream.write_all(&[b'A'; 64]).await.unwrap();
        wait_for_sessions(&handle, 0).await;

        handle.shutdown().await;
    }
}
