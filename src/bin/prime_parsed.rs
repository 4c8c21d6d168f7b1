//! Parse-stage worker for the prime demo (§14.1): validates
//! `GET /is_prime?possible_prime=<int>` and forwards the single integer
//! as an intermediate job to the compute stage's proxy.
//!
//! Matches `original_source/src/prime_serverd.cpp:63`: the path must be
//! `/is_prime` and `possible_prime` must appear exactly once in the query
//! (`prime_str->second.size() != 1` in the original throws, which is
//! caught and turned into a `400`); there is no CSV of values to split.

use log::{error, info};
use meshrelay::limits::WorkerLimits;
use meshrelay::protocol::http::request::Request as HttpRequest;
use meshrelay::protocol::http::response::Response;
use meshrelay::protocol::http::types::Version;
use meshrelay::server::quiesce::Quiesce;
use meshrelay::transport::{Context, Endpoint};
use meshrelay::worker::{WorkFn, WorkOutput, Worker};
use std::time::Duration;

fn usage() -> ! {
    eprintln!(
        "usage: prime_parsed <upstream-endpoint> <downstream-endpoint> <loopback-endpoint> \
         <interrupt-endpoint> <concurrency> [drain_seconds,shutdown_seconds]"
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

/// Reads the request line out of the raw HTTP wire bytes and validates it
/// the way `prime_serverd.cpp:63` does: `path == "/is_prime"` and exactly
/// one `possible_prime` query value, which must parse as an integer.
fn parse_possible_prime(raw: &str) -> Result<i64, ()> {
    let line_end = raw.find("\r\n").ok_or(())?;
    let line = &raw[..line_end];
    let mut parts = line.split(' ');
    let _method = parts.next().ok_or(())?;
    let target = parts.next().ok_or(())?;
    let (path, query) = HttpRequest::split_target(target);
    if path != "/is_prime" {
        return Err(());
    }
    let mut values = query.get_all("possible_prime");
    let only = values.next().ok_or(())?;
    if values.next().is_some() {
        return Err(());
    }
    only.trim().parse::<i64>().map_err(|_| ())
}

fn make_work() -> WorkFn {
    Box::new(|payload, info, _interrupt_fn| {
        let version = info.http_version.unwrap_or(Version::Http11);
        let possible_prime = std::str::from_utf8(payload)
            .ok()
            .and_then(|raw| parse_possible_prime(raw).ok());
        let Some(possible_prime) = possible_prime else {
            return Ok(WorkOutput::terminal(
                Response::new(400, version, Vec::new()).to_bytes(),
                Vec::new(),
            ));
        };
        Ok(WorkOutput::forward(vec![possible_prime.to_string().into_bytes()], Vec::new()))
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 6 {
        usage();
    }
    let upstream = Endpoint::new(args[1].clone());
    let downstream = Endpoint::new(args[2].clone());
    let loopback = Endpoint::new(args[3].clone());
    let interrupt = Endpoint::new(args[4].clone());
    let Ok(concurrency) = args[5].parse::<usize>() else {
        usage()
    };
    if concurrency == 0 {
        usage();
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

    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let ctx = ctx.clone();
        let upstream = upstream.clone();
        let downstream = downstream.clone();
        let loopback = loopback.clone();
        let interrupt = interrupt.clone();
        let quiesce = quiesce.clone();
        handles.push(tokio::spawn(async move {
            let mut worker = match Worker::new(
                &ctx,
                &upstream,
                Some(&downstream),
                &loopback,
                &interrupt,
                WorkerLimits::default(),
                b"parse".to_vec(),
                make_work(),
            ) {
                Ok(worker) => worker,
                Err(err) => {
                    error!("connecting parse worker: {err}");
                    return;
                }
            };
            worker.run(&quiesce).await;
        }));
    }
    info!("prime_parsed: {concurrency} worker(s) running");
    for handle in handles {
        let _ = handle.await;
    }
}
