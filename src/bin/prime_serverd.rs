//! HTTP frontend daemon for the prime demo (§14.4): the only component
//! that speaks HTTP to clients. A direct health-check short-circuit
//! answers `GET /health` without occupying a worker.

use log::{error, info};
use meshrelay::limits::{ReqLimits, ServerLimits};
use meshrelay::protocol::http::response::Response;
use meshrelay::protocol::http::types::Version;
use meshrelay::server::quiesce::Quiesce;
use meshrelay::server::HealthCheck;
use meshrelay::transport::{Context, Endpoint};
use meshrelay::{Protocol, Request, Server};
use std::time::Duration;

fn usage() -> ! {
    eprintln!(
        "usage: prime_serverd <client-endpoint> <upstream-endpoint> <loopback-endpoint> \
         <interrupt-endpoint> [request_history_capacity] [drain_seconds,shutdown_seconds]"
    );
    std::process::exit(1);
}

fn parse_drain_shutdown(arg: Option<&String>) -> (u64, u64) {
    let Some(arg) = arg else { return (5, 5) };
    let Some((drain, shutdown)) = arg.split_once(',') else {
        usage()
    };
    let (Ok(drain), Ok(shutdown)) = (drain.parse(), shutdown.parse()) else {
        usage()
    };
    (drain, shutdown)
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        usage();
    }
    let client_endpoint = Endpoint::new(args[1].clone());
    let upstream = Endpoint::new(args[2].clone());
    let loopback = Endpoint::new(args[3].clone());
    let interrupt = Endpoint::new(args[4].clone());

    let mut limits = ServerLimits::default();
    if let Some(capacity) = args.get(5) {
        let Ok(capacity) = capacity.parse::<usize>() else {
            usage()
        };
        limits.request_history_capacity = capacity;
    }
    let (drain, shutdown) = parse_drain_shutdown(args.get(6));

    let ctx = Context::new();
    let quiesce = Quiesce::new();
    if let Err(err) =
        quiesce.install_signal_handler(Duration::from_secs(drain), Duration::from_secs(shutdown))
    {
        error!("installing signal handler: {err}");
        std::process::exit(1);
    }

    let mut server = match Server::new(
        &ctx,
        &client_endpoint,
        &upstream,
        &loopback,
        &interrupt,
        Protocol::http(ReqLimits::default()),
        limits,
        quiesce,
    ) {
        Ok(server) => server,
        Err(err) => {
            error!("binding frontend server: {err}");
            std::process::exit(1);
        }
    };
    server.set_health_check(HealthCheck {
        matches: Box::new(|request| matches!(request, Request::Http(r) if r.path == "/health")),
        response: Response::text(Version::Http11, "ok").to_bytes(),
    });

    info!("prime_serverd: listening on {client_endpoint}");
    server.run().await;
}
