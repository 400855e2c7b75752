//! Relay server for the Bing image of the day.

#[cfg(feature = "rustls-tls")]
#[cfg(feature = "native-tls")]
compile_error!("You can only enable one TLS backend");

mod http_client;
mod params;
mod routes;
mod upstream;

use anyhow::Result;
use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self as axum_middleware, Next},
    response::Response,
};
use core::{net::SocketAddr, time::Duration};
use http_client::{BuildHttpClientArgs, build_http_client};
use reqwest::header;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    catch_panic::CatchPanicLayer,
    normalize_path::NormalizePathLayer,
    timeout::TimeoutLayer,
    trace::{self, TraceLayer},
};
use tracing::{Level, info};
use upstream::UpstreamClient;
use url::Url;

#[derive(Debug)]
pub struct Server {
    router_inner: Router,
}

/// Settings to run the relay server with.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// How many seconds that can elapse before a request is abandoned for taking too long.
    pub request_timeout: u64,

    /// See [`RelaySettings`].
    pub relay_settings: RelaySettings,

    /// See [`UpstreamSettings`].
    pub upstream_settings: UpstreamSettings,
}

/// Configuration options for the relay handler itself.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Shared secret that every request path must begin with, compared
    /// case-insensitively as `/<secret>`.
    ///
    /// An empty string disables the gate entirely (open access).
    pub access_secret: String,
}

/// Configuration options used when making any call to the upstream image archive.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base URL of the image-of-the-day archive.
    pub base_url: Url,

    /// How many seconds that can elapse after sending a request to the upstream
    /// before it's abandoned and considered failed.
    pub request_timeout: u64,

    /// The maximum amount of redirects to follow when making a request to the upstream
    /// before abandoning the request.
    pub max_redirects: usize,
}

#[derive(Debug)]
struct AppState {
    upstream: UpstreamClient,
    settings: ServerSettings,
}

impl Server {
    /// Create a new server with the provided settings.
    pub fn new(settings: ServerSettings) -> Result<Self> {
        let upstream = UpstreamClient::new(
            build_http_client(BuildHttpClientArgs {
                max_redirects: settings.upstream_settings.max_redirects,
                request_timeout: Duration::from_secs(settings.upstream_settings.request_timeout),
            })?,
            settings.upstream_settings.base_url.clone(),
        );
        let router = Router::new()
            // The secret gate and the `get_image` path pattern mean any path
            // can be meaningful, so every path and method funnels into the
            // one handler.
            .fallback(routes::relay_handler)
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(TimeoutLayer::new(Duration::from_secs(
                settings.request_timeout,
            )))
            .layer(NormalizePathLayer::trim_trailing_slash())
            .layer(CatchPanicLayer::new())
            .layer(axum_middleware::from_fn(Server::header_middleware))
            .with_state(Arc::new(AppState { upstream, settings }));

        Ok(Self {
            router_inner: router,
        })
    }

    /// Start the server and expose it locally on the provided [`SocketAddr`].
    pub async fn start(self, address: &SocketAddr) -> Result<()> {
        let tcp_listener = TcpListener::bind(&address).await?;
        info!("Listening on http://{}", tcp_listener.local_addr()?);
        axum::serve(tcp_listener, self.router_inner)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await?;
        Ok(())
    }

    // https://github.com/tokio-rs/axum/blob/15917c6dbcb4a48707a20e9cfd021992a279a662/examples/graceful-shutdown/src/main.rs#L55
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    async fn header_middleware(request: Request, next: Next) -> Response {
        let mut response = next.run(request).await;
        response.headers_mut().append(
            header::SERVER,
            HeaderValue::from_static(env!("CARGO_PKG_NAME")),
        );
        response
            .headers_mut()
            .append("X-Robots-Tag", HeaderValue::from_static("none"));
        response
    }
}
