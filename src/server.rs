//! HTTP front that keeps the process alive and serves the subscription
//!
//! Two routes: a static greeting at `/`, and the subscription route that
//! only starts answering once the orchestrator has published the encoded
//! descriptor. Connections are served concurrently and never block on the
//! launch pipeline.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Version information for the launcher
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Write-once cell holding the encoded connection descriptor.
///
/// The orchestrator publishes at most once per run; request handlers only
/// read. The first write wins, so the route serves identical bytes for the
/// lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct PublishedSubscription {
    inner: Arc<RwLock<Option<String>>>,
}

impl PublishedSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the encoded descriptor. Later writes are ignored.
    pub fn publish(&self, encoded: String) {
        let mut guard = self.inner.write();
        if guard.is_none() {
            *guard = Some(encoded);
        } else {
            debug!("Subscription already published, ignoring repeated publish");
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    pub fn is_published(&self) -> bool {
        self.inner.read().is_some()
    }
}

/// Helper to create a simple response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum")
}

/// Helper to create the plain-text subscription response
fn subscription_response(body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

/// The always-on HTTP front
pub struct SubscriptionServer {
    bind_addr: SocketAddr,
    sub_route: Arc<String>,
    published: PublishedSubscription,
    shutdown_rx: watch::Receiver<bool>,
}

impl SubscriptionServer {
    pub fn new(
        bind_addr: SocketAddr,
        sub_route: String,
        published: PublishedSubscription,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            sub_route: Arc::new(sub_route),
            published,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening (HTTP/1.1 and HTTP/2)");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener (tests bind port 0 and
    /// pass the listener in)
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let sub_route = Arc::clone(&self.sub_route);
                            let published = self.published.clone();

                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, sub_route, published).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("HTTP server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection<S>(
    stream: S,
    sub_route: Arc<String>,
    published: PublishedSubscription,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
        let sub_route = Arc::clone(&sub_route);
        let published = published.clone();
        async move {
            let res = respond(req.method(), req.uri().path(), &sub_route, &published);
            Ok::<_, std::convert::Infallible>(res)
        }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

fn respond(
    method: &Method,
    path: &str,
    sub_route: &str,
    published: &PublishedSubscription,
) -> Response<Full<Bytes>> {
    debug!(%method, path, "HTTP request");

    match (method, path) {
        (&Method::GET, "/") => response(StatusCode::OK, "Hello world!"),

        // The subscription route exists only once the descriptor has been
        // published; before that the path is indistinguishable from any
        // other unknown path.
        (&Method::GET, p) if p == sub_route => match published.get() {
            Some(encoded) => subscription_response(encoded),
            None => response(StatusCode::NOT_FOUND, "not found"),
        },

        _ => response(StatusCode::NOT_FOUND, "not found"),
    }
}
