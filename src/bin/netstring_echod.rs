//! Minimal netstring worker (§14.4): echoes the job payload back as the
//! terminal result, unchanged. Used by the S2-S5 scenario tests and as a
//! simpler second worked example of the worker loop against the
//! lightweight protocol.

use log::{error, info};
use meshrelay::limits::WorkerLimits;
use meshrelay::server::quiesce::Quiesce;
use meshrelay::transport::{Context, Endpoint};
use meshrelay::worker::{WorkFn, WorkOutput, Worker};
use std::time::Duration;

fn usage() -> ! {
    eprintln!(
        "usage: netstring_echod <upstream-endpoint> <loopback-endpoint> <interrupt-endpoint> \
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

fn make_work() -> WorkFn {
    Box::new(|payload, _info, _interrupt_fn| {
        Ok(WorkOutput::terminal(payload.to_vec(), Vec::new()))
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
                b"echo".to_vec(),
                make_work(),
            ) {
                Ok(worker) => worker,
                Err(err) => {
                    error!("connecting echo worker: {err}");
                    return;
                }
            };
            worker.run(&quiesce).await;
        }));
    }
    info!("netstring_echod: {concurrency} worker(s) running");
    for handle in handles {
        let _ = handle.await;
    }
}
