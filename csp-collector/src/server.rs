use crate::routes::{self, AppState};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// HTTP server for CSP reports and the rendered pages
pub struct CollectorServer {
    listener: TcpListener,
    state: AppState,
}

impl CollectorServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, state: AppState) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Each connection is served on its own task, so a slow client or a long
    /// ledger rewrite never holds up other requests.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("CSP collector listening on {}", self.listener.local_addr()?);

        tokio::pin!(shutdown);
        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                () = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            };

            debug!("Client connected: {}", peer_addr);
            let state = self.state.clone();

            // Spawn a task for each connection
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(routes::handle(state, req).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
