//! Server lifecycle
//!
//! A `Server` moves through `Stopped -> Listening -> Draining -> Stopped`.
//! Draining starts on SIGTERM, Ctrl-C or `ShutdownHandle::stop`; it ends
//! once every open connection has finished, or when the optional drain
//! timeout expires.

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;

use crate::error::ServerError;
use crate::state::{current_environment, AppState};
use crate::{create_router, ServerConfig};

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Where a server is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Stopped,
    Listening,
    Draining,
}

/// Cloneable trigger that starts the drain of a running server
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Ask the server to stop accepting connections and drain.
    /// Calling this before the server starts makes it drain immediately.
    pub fn stop(&self) {
        self.notify.notify_one();
    }
}

/// HTTP server with an explicit start/stop lifecycle
pub struct Server {
    config: ServerConfig,
    state: Arc<AppState>,
    phase: Arc<watch::Sender<Lifecycle>>,
    stop: Arc<Notify>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_state(config, Arc::new(AppState::new()))
    }

    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        let (phase, _) = watch::channel(Lifecycle::Stopped);
        Self {
            config,
            state,
            phase: Arc::new(phase),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Router with every route and layer, without binding a socket
    pub fn router(&self) -> Router {
        create_router(&self.config, Arc::clone(&self.state))
    }

    pub fn phase(&self) -> Lifecycle {
        *self.phase.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.phase.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: Arc::clone(&self.stop),
        }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_addr();
        let bound = TcpListener::bind(&addr).await;
        bound.map_err(|source| ServerError::Bind { addr, source })
    }

    /// Bind, serve until a shutdown signal, then drain
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until a shutdown signal, then drain
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        tracing::info!("Static files served from: {}", self.config.static_dir.display());
        tracing::info!("Environment: {}", current_environment());

        let stop = Arc::clone(&self.stop);
        let trigger = async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = stop.notified() => {
                    tracing::info!("Shutdown requested: closing HTTP server");
                }
            }
        };

        serve_until(
            listener,
            self.router(),
            Arc::clone(&self.phase),
            self.config.shutdown_timeout,
            trigger,
        )
        .await
    }
}

/// Run `router` on `listener` until `trigger` resolves, then drain.
///
/// Connections live in a `JoinSet` owned by this function, so nothing
/// outlives it: on drain timeout the stragglers are aborted before the
/// phase moves to `Stopped`.
pub(crate) async fn serve_until<F>(
    listener: TcpListener,
    router: Router,
    phase: Arc<watch::Sender<Lifecycle>>,
    drain_timeout: Option<Duration>,
    trigger: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    phase.send_replace(Lifecycle::Listening);
    tracing::info!("Server is running on {}", addr);

    let (drain_tx, drain_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    let mut trigger = std::pin::pin!(trigger);

    loop {
        tokio::select! {
            _ = &mut trigger => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = TowerToHyperService::new(router.clone());
                    connections.spawn(serve_connection(stream, peer, service, drain_rx.clone()));
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    phase.send_replace(Lifecycle::Draining);
    tracing::info!("Draining {} open connection(s)", connections.len());
    drain_tx.send_replace(true);

    let result = match drain_timeout {
        None => {
            join_all(&mut connections).await;
            Ok(())
        }
        Some(limit) => match tokio::time::timeout(limit, join_all(&mut connections)).await {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::warn!(
                    "Drain did not finish within {:?}, dropping {} connection(s)",
                    limit,
                    connections.len()
                );
                connections.abort_all();
                join_all(&mut connections).await;
                Err(ServerError::DrainTimedOut(limit))
            }
        },
    };

    phase.send_replace(Lifecycle::Stopped);
    if result.is_ok() {
        tracing::info!("HTTP server closed");
    }
    result
}

/// Serve one HTTP/1.1 connection, finishing gracefully once `drain` flips
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: TowerToHyperService<Router>,
    mut drain: watch::Receiver<bool>,
) {
    let mut conn = std::pin::pin!(
        http1::Builder::new().serve_connection(TokioIo::new(stream), service)
    );

    let finished = tokio::select! {
        res = conn.as_mut() => Some(res),
        _ = drain.changed() => None,
    };

    let res = match finished {
        Some(res) => res,
        None => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = res {
        tracing::debug!("Connection from {} ended with error: {}", peer, e);
    }
}

async fn join_all(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}

/// Resolves on SIGTERM (unix) or Ctrl-C
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl-C received: closing HTTP server"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("SIGTERM signal received: closing HTTP server");
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn send_request(addr: SocketAddr, path: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        stream
    }

    #[tokio::test]
    async fn test_router_needs_no_socket() {
        let server = Server::new(local_config());
        assert_eq!(server.phase(), Lifecycle::Stopped);

        let response = server
            .router()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.phase(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        let config = ServerConfig {
            host: "not an address".to_string(),
            ..local_config()
        };
        let err = Server::new(config).bind().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains("not an address"));
    }

    #[tokio::test]
    async fn test_stop_drains_and_releases_socket() {
        let server = Arc::new(Server::new(local_config()));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let mut phases = server.subscribe();

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.serve(listener).await });

        phases
            .wait_for(|phase| *phase == Lifecycle::Listening)
            .await
            .map(|_| ())
            .unwrap();

        let mut stream = send_request(addr, "/ready").await;
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with(r#"{"status":"ready"}"#));

        handle.stop();
        task.await.unwrap().unwrap();

        assert_eq!(server.phase(), Lifecycle::Stopped);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    /// Router with a `/slow` route that signals `entered`, then takes `delay`
    fn slow_router(entered: Arc<Notify>, delay: Duration) -> Router {
        Router::new().route(
            "/slow",
            get(move || {
                let entered = Arc::clone(&entered);
                async move {
                    entered.notify_one();
                    tokio::time::sleep(delay).await;
                    "done"
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_drain_timeout_closes_stuck_connection() {
        let entered = Arc::new(Notify::new());
        let router = slow_router(Arc::clone(&entered), Duration::from_millis(600));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (phase, _) = watch::channel(Lifecycle::Stopped);
        let phase = Arc::new(phase);
        let stop = Arc::new(Notify::new());

        let trigger_stop = Arc::clone(&stop);
        let task = tokio::spawn(serve_until(
            listener,
            router,
            Arc::clone(&phase),
            Some(Duration::from_millis(100)),
            async move { trigger_stop.notified().await },
        ));

        let mut stream = send_request(addr, "/slow").await;
        entered.notified().await;
        stop.notify_one();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ServerError::DrainTimedOut(limit) if limit == Duration::from_millis(100)));
        assert_eq!(*phase.borrow(), Lifecycle::Stopped);

        // The handler would have answered after 600ms; the connection must
        // already be gone instead.
        let mut received = Vec::new();
        let read = tokio::time::timeout(
            Duration::from_secs(2),
            stream.read_to_end(&mut received),
        )
        .await
        .expect("connection left open after drain timeout");
        assert!(read.is_err() || received.is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_request() {
        let entered = Arc::new(Notify::new());
        let router = slow_router(Arc::clone(&entered), Duration::from_millis(200));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (phase, _) = watch::channel(Lifecycle::Stopped);
        let phase = Arc::new(phase);
        let mut phases = phase.subscribe();
        let stop = Arc::new(Notify::new());

        let trigger_stop = Arc::clone(&stop);
        let task = tokio::spawn(serve_until(
            listener,
            router,
            Arc::clone(&phase),
            None,
            async move { trigger_stop.notified().await },
        ));

        let mut stream = send_request(addr, "/slow").await;
        entered.notified().await;
        stop.notify_one();

        phases
            .wait_for(|phase| *phase == Lifecycle::Draining)
            .await
            .map(|_| ())
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("done"));

        task.await.unwrap().unwrap();
        assert_eq!(*phase.borrow(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start_drains_immediately() {
        let server = Server::new(local_config());
        server.shutdown_handle().stop();

        let listener = server.bind().await.unwrap();
        server.serve(listener).await.unwrap();
        assert_eq!(server.phase(), Lifecycle::Stopped);
    }
}
