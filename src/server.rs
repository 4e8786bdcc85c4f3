//! Listener lifecycle: bind, serve, drain, stop.

use std::{io, net::SocketAddr, time::Duration};

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::shutdown::{listen_for_signals, shutdown_channel, ShutdownToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
    #[error("in-flight requests did not finish within {0:?}")]
    ShutdownTimedOut(Duration),
}

impl ServerError {
    /// A drain that overran its deadline still ends in an orderly stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ShutdownTimedOut(_))
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_timeout: Duration,
    state: watch::Sender<LifecycleState>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, shutdown_timeout: Duration) -> Result<Self, ServerError> {
        let (state, _) = watch::channel(LifecycleState::Starting);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
            shutdown_timeout,
            state,
        })
    }

    pub async fn from_config(config: &Config) -> Result<Self, ServerError> {
        Self::bind(config.bind_socket()?, config.shutdown_timeout).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serves `app` until `shutdown` is cancelled, then waits for in-flight
    /// requests for at most the configured shutdown timeout. Connections still
    /// open at the deadline are aborted before this returns.
    pub async fn serve(self, app: Router, shutdown: ShutdownToken) -> Result<(), ServerError> {
        let Self {
            listener,
            local_addr,
            shutdown_timeout,
            state,
        } = self;

        transition(&state, LifecycleState::Running, local_addr);

        let mut connections = JoinSet::new();
        let accepted = accept_until_cancelled(&listener, &app, &shutdown, &mut connections).await;
        drop(listener);

        let result = match accepted {
            Ok(()) => {
                transition(&state, LifecycleState::ShuttingDown, local_addr);
                drain(&mut connections, shutdown_timeout).await
            }
            Err(err) => {
                connections.abort_all();
                while connections.join_next().await.is_some() {}
                Err(err)
            }
        };

        transition(&state, LifecycleState::Stopped, local_addr);
        result
    }

    /// Serves `app` until SIGINT or SIGTERM.
    pub async fn run_until_signal(self, app: Router) -> Result<(), ServerError> {
        let (trigger, token) = shutdown_channel();
        let signals = tokio::spawn(listen_for_signals(trigger));

        let result = self.serve(app, token).await;
        signals.abort();
        result
    }
}

async fn accept_until_cancelled(
    listener: &TcpListener,
    app: &Router,
    shutdown: &ShutdownToken,
    connections: &mut JoinSet<()>,
) -> Result<(), ServerError> {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, app.clone(), shutdown.clone()));
                }
                Err(err) if is_connection_error(&err) => {
                    debug!(error = %err, "dropping connection that failed during accept");
                }
                Err(err) => return Err(ServerError::Serve(err)),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        error!(error = %err, "connection task panicked");
                    }
                }
            }
        }
    }
}

/// Serves one connection; once shutdown starts, finishes the request in
/// progress and closes instead of waiting for the next one.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, app: Router, shutdown: ShutdownToken) {
    let connection = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(app));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(err) = result {
        debug!(peer = %peer, error = %err, "connection closed with error");
    }
}

async fn drain(connections: &mut JoinSet<()>, shutdown_timeout: Duration) -> Result<(), ServerError> {
    let drained = tokio::time::timeout(shutdown_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_ok() {
        return Ok(());
    }

    warn!(
        timeout_ms = shutdown_timeout.as_millis(),
        abandoned = connections.len(),
        "shutdown deadline elapsed, abandoning in-flight requests"
    );
    connections.abort_all();
    while connections.join_next().await.is_some() {}
    Err(ServerError::ShutdownTimedOut(shutdown_timeout))
}

fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

fn transition(state: &watch::Sender<LifecycleState>, next: LifecycleState, addr: SocketAddr) {
    let previous = state.send_replace(next);
    info!(addr = %addr, from = ?previous, to = ?next, "lifecycle transition");
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use axum::routing::get;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    use super::*;

    fn slow_app(delay: Duration) -> Router {
        Router::new().route(
            "/slow",
            get(move || async move {
                tokio::time::sleep(delay).await;
                "done"
            }),
        )
    }

    async fn try_send_get(addr: SocketAddr, path: &str) -> io::Result<String> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }

    async fn send_get(addr: SocketAddr, path: &str) -> String {
        try_send_get(addr, path).await.expect("request round trip")
    }

    async fn bind_loopback(shutdown_timeout: Duration) -> Server {
        Server::bind("127.0.0.1:0".parse().expect("valid addr"), shutdown_timeout)
            .await
            .expect("bind loopback")
    }

    #[tokio::test]
    async fn idle_server_moves_through_all_states() {
        let server = bind_loopback(Duration::from_secs(5)).await;
        let mut states = server.state();
        assert_eq!(*states.borrow(), LifecycleState::Starting);

        let (trigger, token) = shutdown_channel();
        let serving = tokio::spawn(server.serve(Router::new(), token));

        states
            .wait_for(|state| *state == LifecycleState::Running)
            .await
            .expect("server should start running");

        trigger.fire();
        tokio::time::timeout(Duration::from_secs(2), serving)
            .await
            .expect("server should stop promptly")
            .expect("serve task")
            .expect("clean shutdown");
        assert_eq!(*states.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn in_flight_request_completes_during_shutdown() {
        let server = bind_loopback(Duration::from_secs(5)).await;
        let addr = server.local_addr();
        let (trigger, token) = shutdown_channel();
        let serving = tokio::spawn(server.serve(slow_app(Duration::from_millis(300)), token));

        let request = tokio::spawn(async move { send_get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.fire();

        let response = request.await.expect("request task");
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("done"), "{response}");

        serving
            .await
            .expect("serve task")
            .expect("shutdown should finish within the deadline");
    }

    #[tokio::test]
    async fn request_outliving_deadline_times_out_shutdown() {
        let server = bind_loopback(Duration::from_millis(100)).await;
        let addr = server.local_addr();
        let (trigger, token) = shutdown_channel();
        let serving = tokio::spawn(server.serve(slow_app(Duration::from_secs(5)), token));

        let request = tokio::spawn(async move { send_get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.fire();

        let err = tokio::time::timeout(Duration::from_secs(2), serving)
            .await
            .expect("serve should return at the deadline")
            .expect("serve task")
            .expect_err("expected shutdown timeout");
        assert!(matches!(err, ServerError::ShutdownTimedOut(_)));
        assert!(!err.is_fatal());

        request.abort();
    }

    #[tokio::test]
    async fn abandoned_request_is_dropped_without_a_response() {
        let finished = Arc::new(AtomicBool::new(false));
        let app = {
            let finished = finished.clone();
            Router::new().route(
                "/slow",
                get(move || async move {
                    tokio::time::sleep(Duration::from_millis(600)).await;
                    finished.store(true, Ordering::SeqCst);
                    "done"
                }),
            )
        };

        let server = bind_loopback(Duration::from_millis(100)).await;
        let addr = server.local_addr();
        let (trigger, token) = shutdown_channel();
        let serving = tokio::spawn(server.serve(app, token));

        let request = tokio::spawn(async move { try_send_get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.fire();

        let err = serving
            .await
            .expect("serve task")
            .expect_err("expected shutdown timeout");
        assert!(matches!(err, ServerError::ShutdownTimedOut(_)));

        let reply = tokio::time::timeout(Duration::from_secs(2), request)
            .await
            .expect("client should see the connection close")
            .expect("request task");
        if let Ok(response) = reply {
            assert!(!response.starts_with("HTTP/1.1 200"), "{response}");
        }

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bind_conflict_is_fatal() {
        let first = bind_loopback(Duration::from_secs(5)).await;
        let err = Server::bind(first.local_addr(), Duration::from_secs(5))
            .await
            .err()
            .expect("second bind should fail");

        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.is_fatal());
    }
}
