mod server;

use anyhow::Result;
use clap::Parser;
use core::net::SocketAddr;
use dotenvy::dotenv;
use server::{RelaySettings, Server, ServerSettings, UpstreamSettings};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(author, version, about, long_about)]
struct Arguments {
    /// Internet socket address that the server should be ran on.
    #[arg(
        long = "address",
        env = "BINGDAY_ADDRESS",
        default_value = "127.0.0.1:3500"
    )]
    address: SocketAddr,

    /// Shared secret that request paths must begin with (compared
    /// case-insensitively as `/<secret>`).
    ///
    /// When left empty the relay is open to anyone who can reach it.
    #[arg(long = "access-secret", env = "BINGDAY_ACCESS_SECRET", default_value = "")]
    access_secret: String,

    /// Maximum time in seconds before an incoming request is abandoned for
    /// taking too long.
    #[arg(
        long = "request-timeout",
        env = "BINGDAY_REQUEST_TIMEOUT",
        default_value_t = 15
    )]
    request_timeout: u64,

    /// Base URL of the image-of-the-day archive to relay from.
    #[arg(
        long = "upstream-base-url",
        env = "BINGDAY_UPSTREAM_BASE_URL",
        default_value = "https://www.bing.com"
    )]
    upstream_base_url: Url,

    /// Maximum time in seconds before a request to the upstream is abandoned
    /// and considered failed.
    #[arg(
        long = "upstream-request-timeout",
        env = "BINGDAY_UPSTREAM_REQUEST_TIMEOUT",
        default_value_t = 10
    )]
    upstream_request_timeout: u64,

    /// Maximum amount of redirects to follow when making upstream requests
    /// before aborting.
    #[arg(
        long = "upstream-max-redirects",
        env = "BINGDAY_UPSTREAM_MAX_REDIRECTS",
        default_value_t = 5
    )]
    upstream_max_redirects: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();
    let args = Arguments::parse();

    if args.access_secret.is_empty() {
        println!(
            "WARNING: Running without 'access-secret' leaves the relay open to anyone who can reach it."
        );
    }

    Server::new(ServerSettings {
        request_timeout: args.request_timeout,
        relay_settings: RelaySettings {
            access_secret: args.access_secret,
        },
        upstream_settings: UpstreamSettings {
            base_url: args.upstream_base_url,
            request_timeout: args.upstream_request_timeout,
            max_redirects: args.upstream_max_redirects,
        },
    })?
    .start(&args.address)
    .await
}
