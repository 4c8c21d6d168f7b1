//! Compute-stage worker for the prime demo (§14.1): receives one integer
//! per job, trial-divides it, and publishes the terminal HTTP response
//! (§14.2's resolved rule: non-prime → `"2"`, prime → its own value).

use log::{error, info};
use meshrelay::limits::WorkerLimits;
use meshrelay::protocol::http::response::Response;
use meshrelay::protocol::http::types::Version;
use meshrelay::server::quiesce::Quiesce;
use meshrelay::transport::{Context, Endpoint};
use meshrelay::worker::{WorkFn, WorkOutput, Worker};
use std::time::Duration;

fn usage() -> ! {
    eprintln!(
        "usage: prime_computed <upstream-endpoint> <loopback-endpoint> <interrupt-endpoint> \
         <concurrency> [drain_seconds,shutdown_seconds]"
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

fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3i64;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

fn make_work() -> WorkFn {
    Box::new(|payload, info, _interrupt_fn| {
        let version = info.http_version.unwrap_or(Version::Http11);
        let text = std::str::from_utf8(payload).unwrap_or("0");
        let n: i64 = text.trim().parse().unwrap_or(0);
        let body = if is_prime(n) { n.to_string() } else { "2".to_string() };
        Ok(WorkOutput::terminal(Response::text(version, body).to_bytes(), Vec::new()))
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        usage();
    }
    let upstream = Endpoint::new(args[1].clone());
    let loopback = Endpoint::new(args[2].clone());
    let interrupt = Endpoint::new(args[3].clone());
    let Ok(concurrency) = args[4].parse::<usize>() else {
        usage()
    };
    if concurrency == 0 {
        usage();
    }
    let (drain, shutdown) = parse_drain_shutdown(args.get(5));

    let ctx = Context::new();
    let quiesce = Quiesce::new();
    if let Err(err) =
        quiesce.install_signal_handler(Duration::from_secs(drain), Duration::from_secs(shutdown))
    {
        error!("installing signal handler: {err}");
        std::process::exit(1);
    }

    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let ctx = ctx.clone();
        let upstream = upstream.clone();
        let loopback = loopback.clone();
        let interrupt = interrupt.clone();
        let quiesce = quiesce.clone();
        handles.push(tokio::spawn(async move {
            let mut worker = match Worker::new(
                &ctx,
                &upstream,
                None,
                &loopback,
                &interrupt,
                WorkerLimits::default(),
                b"compute".to_vec(),
                make_work(),
            ) {
                Ok(worker) => worker,
                Err(err) => {
                    error!("connecting compute worker: {err}");
                    return;
                }
            };
            worker.run(&quiesce).await;
        }));
    }
    info!("prime_computed: {concurrency} worker(s) running");
    for handle in handles {
        let _ = handle.await;
    }
}
