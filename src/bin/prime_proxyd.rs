//! Load-balancing proxy daemon (§4.4), reused unmodified as the boundary
//! between any two stages (parse→compute in the prime demo, §14.4); no
//! `choose` callback is installed, so dispatch is strict FIFO order.

use log::{error, info};
use meshrelay::limits::ProxyLimits;
use meshrelay::proxy::Proxy;
use meshrelay::server::quiesce::Quiesce;
use meshrelay::transport::{Context, Endpoint};
use std::time::Duration;

fn usage() -> ! {
    eprintln!(
        "usage: prime_proxyd <upstream-endpoint> <downstream-endpoint> \
         [drain_seconds,shutdown_seconds]"
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
    if args.len() < 3 {
        usage();
    }
    let upstream = Endpoint::new(args[1].clone());
    let downstream = Endpoint::new(args[2].clone());
    let (drain, shutdown) = parse_drain_shutdown(args.get(3));

    let ctx = Context::new();
    let quiesce = Quiesce::new();
    if let Err(err) =
        quiesce.install_signal_handler(Duration::from_secs(drain), Duration::from_secs(shutdown))
    {
        error!("installing signal handler: {err}");
        std::process::exit(1);
    }

    let mut proxy = Proxy::new(&ctx, &upstream, &downstream, ProxyLimits::default());
    info!("prime_proxyd: routing {upstream} -> {downstream}");
    proxy.run(&quiesce).await;
}
