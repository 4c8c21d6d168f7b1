//! Cross-component scenario tests (§13): a frontend server, proxy, one or
//! more workers and a batching client wired entirely in-process over the
//! `inproc` transport, no real network needed.

use meshrelay::client::{Client, CollectFn, RequestFn};
use meshrelay::limits::{ClientLimits, NetstringLimits, ProxyLimits, ReqLimits, ServerLimits, WorkerLimits};
use meshrelay::protocol::netstring::Parser as NetstringParser;
use meshrelay::proxy::{FifoEntry, Proxy};
use meshrelay::server::HealthCheck;
use meshrelay::server::quiesce::Quiesce;
use meshrelay::transport::inproc::{DealerSocket, RouterSocket, StreamClient};
use meshrelay::transport::{Context, Endpoint};
use meshrelay::worker::{WorkFn, WorkOutput, Worker};
use meshrelay::{Protocol, Request};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn response_body(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.find("\r\n\r\n") {
        Some(pos) => text[pos + 4..].to_string(),
        None => text.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fifo_fairness_dispatches_in_advertise_order() {
    let ctx = Context::new();
    let upstream = Endpoint::new("inproc://fifo-upstream");
    let downstream = Endpoint::new("inproc://fifo-downstream");

    let mut proxy = Proxy::new(&ctx, &upstream, &downstream, ProxyLimits::default());
    let quiesce = Quiesce::new();
    tokio::spawn(async move { proxy.run(&quiesce).await });

    let w1 = DealerSocket::connect(&downstream).unwrap();
    let mut w2 = DealerSocket::connect(&downstream).unwrap();
    let mut w3 = DealerSocket::connect(&downstream).unwrap();
    w1.send(vec![b"w1".to_vec()]).unwrap();
    w2.send(vec![b"w2".to_vec()]).unwrap();
    w3.send(vec![b"w3".to_vec()]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let submitter = DealerSocket::connect(&upstream).unwrap();
    submitter.send(vec![b"job-a".to_vec(), b"payload".to_vec()]).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // w1 advertised first, so it receives the first dispatched job.
    let mut w1 = w1;
    let got = tokio::time::timeout(Duration::from_secs(1), w1.recv()).await.unwrap();
    assert!(got.is_some());
    assert!(tokio::time::timeout(Duration::from_millis(100), w2.recv()).await.is_err());
    assert!(tokio::time::timeout(Duration::from_millis(100), w3.recv()).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn preference_honored_routing_matches_choose_callback() {
    let ctx = Context::new();
    let upstream = Endpoint::new("inproc://pref-upstream");
    let downstream = Endpoint::new("inproc://pref-downstream");

    let mut proxy = Proxy::new(&ctx, &upstream, &downstream, ProxyLimits::default());
    proxy.set_choose(Box::new(|fifo: &VecDeque<FifoEntry>, payload: &[u8]| {
        fifo.iter().find(|entry| entry.heartbeat == payload).map(|entry| entry.token)
    }));
    let quiesce = Quiesce::new();
    tokio::spawn(async move { proxy.run(&quiesce).await });

    let mut worker_a = DealerSocket::connect(&downstream).unwrap();
    let mut worker_b = DealerSocket::connect(&downstream).unwrap();
    worker_a.send(vec![b"A".to_vec()]).unwrap();
    worker_b.send(vec![b"B".to_vec()]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let submitter = DealerSocket::connect(&upstream).unwrap();
    submitter.send(vec![b"job".to_vec(), b"B".to_vec()]).unwrap();

    let got = tokio::time::timeout(Duration::from_secs(1), worker_b.recv()).await.unwrap();
    assert!(got.is_some());
    assert!(tokio::time::timeout(Duration::from_millis(100), worker_a.recv()).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupt_propagation_on_client_disconnect() {
    let ctx = Context::new();
    let client_ep = Endpoint::new("inproc://interrupt-client");
    let upstream_ep = Endpoint::new("inproc://interrupt-upstream");
    let result_ep = Endpoint::new("inproc://interrupt-result");
    let interrupt_ep = Endpoint::new("inproc://interrupt-interrupt");

    // A bare router stands in for a proxy: the server only needs somewhere
    // to connect its upstream dealer, it never needs a reply for this test.
    let _dummy_proxy = RouterSocket::bind(&upstream_ep);

    let quiesce = Quiesce::new();
    let mut server = meshrelay::Server::new(
        &ctx,
        &client_ep,
        &upstream_ep,
        &result_ep,
        &interrupt_ep,
        Protocol::netstring(NetstringLimits::default()),
        ServerLimits::default(),
        quiesce.clone(),
    )
    .unwrap();
    tokio::spawn(async move { server.run().await });

    let mut interrupts = meshrelay::transport::inproc::SubSocket::connect(&interrupt_ep).unwrap();

    let client = StreamClient::connect(&client_ep).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.send(NetstringParser::serialize(b"in flight")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(client);

    let got = tokio::time::timeout(Duration::from_secs(1), interrupts.recv()).await.unwrap();
    assert!(got.is_some());
    assert_eq!(got.unwrap().len(), 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn size_limit_yields_413_and_closes_session() {
    let ctx = Context::new();
    let client_ep = Endpoint::new("inproc://oversize-client");
    let upstream_ep = Endpoint::new("inproc://oversize-upstream");
    let result_ep = Endpoint::new("inproc://oversize-result");
    let interrupt_ep = Endpoint::new("inproc://oversize-interrupt");

    let _dummy_proxy = RouterSocket::bind(&upstream_ep);

    let quiesce = Quiesce::new();
    let mut server = meshrelay::Server::new(
        &ctx,
        &client_ep,
        &upstream_ep,
        &result_ep,
        &interrupt_ep,
        Protocol::http(ReqLimits { max_request_size: 32, ..ReqLimits::default() }),
        ServerLimits::default(),
        quiesce.clone(),
    )
    .unwrap();
    tokio::spawn(async move { server.run().await });

    let mut client = StreamClient::connect(&client_ep).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client
        .send(b"GET /this-path-is-long-enough-to-overflow HTTP/1.1\r\n\r\n".to_vec())
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(1), client.recv()).await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 413"));
    // Session close follows as a second, empty frame.
    let close = tokio::time::timeout(Duration::from_secs(1), client.recv()).await.unwrap();
    assert_eq!(close, Some(Vec::new()));
}

#[tokio::test(flavor = "multi_thread")]
async fn netstring_echo_round_trip_via_batching_client() {
    let ctx = Context::new();
    let client_ep = Endpoint::new("inproc://echo-client");
    let upstream_ep = Endpoint::new("inproc://echo-upstream");
    let downstream_ep = Endpoint::new("inproc://echo-downstream");
    let result_ep = Endpoint::new("inproc://echo-result");
    let interrupt_ep = Endpoint::new("inproc://echo-interrupt");

    let mut proxy = Proxy::new(&ctx, &upstream_ep, &downstream_ep, ProxyLimits::default());
    let proxy_quiesce = Quiesce::new();
    tokio::spawn(async move { proxy.run(&proxy_quiesce).await });

    let quiesce = Quiesce::new();
    let mut server = meshrelay::Server::new(
        &ctx,
        &client_ep,
        &upstream_ep,
        &result_ep,
        &interrupt_ep,
        Protocol::netstring(NetstringLimits::default()),
        ServerLimits::default(),
        quiesce.clone(),
    )
    .unwrap();
    tokio::spawn(async move { server.run().await });

    let echo: WorkFn = Box::new(|payload, _info, _interrupt_fn| {
        Ok(WorkOutput::terminal(payload.to_vec(), Vec::new()))
    });
    let mut worker = Worker::new(
        &ctx,
        &downstream_ep,
        None,
        &result_ep,
        &interrupt_ep,
        WorkerLimits::default(),
        b"echo".to_vec(),
        echo,
    )
    .unwrap();
    let worker_quiesce = Quiesce::new();
    tokio::spawn(async move { worker.run(&worker_quiesce).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = Client::connect(&client_ep, ClientLimits::default()).unwrap();
    let mut remaining: Vec<Vec<u8>> = (0..5).map(|i| format!("payload-{i}").into_bytes()).collect();
    remaining.reverse();
    let request_fn: RequestFn = Box::new(move || remaining.pop());

    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected2 = collected.clone();
    let collect_fn: CollectFn = Box::new(move |body| {
        collected2.lock().unwrap().push(body);
        true
    });

    tokio::time::timeout(Duration::from_secs(2), client.run_netstring(request_fn, collect_fn))
        .await
        .unwrap();

    let mut got = collected.lock().unwrap().clone();
    got.sort();
    let mut expected: Vec<Vec<u8>> = (0..5).map(|i| format!("payload-{i}").into_bytes()).collect();
    expected.sort();
    assert_eq!(got, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn http_prime_demo_two_stage_pipeline() {
    let ctx = Context::new();
    let client_ep = Endpoint::new("inproc://prime-client");
    let stage1_upstream = Endpoint::new("inproc://prime-stage1-upstream");
    let stage1_downstream = Endpoint::new("inproc://prime-stage1-downstream");
    let stage2_downstream = Endpoint::new("inproc://prime-stage2-downstream");
    let result_ep = Endpoint::new("inproc://prime-result");
    let interrupt_ep = Endpoint::new("inproc://prime-interrupt");

    let mut proxy1 = Proxy::new(&ctx, &stage1_upstream, &stage1_downstream, ProxyLimits::default());
    let q1 = Quiesce::new();
    tokio::spawn(async move { proxy1.run(&q1).await });

    // The parse worker forwards its intermediate result to a second proxy
    // rather than back onto stage1_downstream (which is the parse worker's
    // own advertise/job-receipt endpoint, not a forwarding target).
    let parse_forward_ep = Endpoint::new("inproc://prime-parse-forward");
    let mut proxy2 = Proxy::new(&ctx, &parse_forward_ep, &stage2_downstream, ProxyLimits::default());
    let q2 = Quiesce::new();
    tokio::spawn(async move { proxy2.run(&q2).await });

    let quiesce = Quiesce::new();
    let mut server = meshrelay::Server::new(
        &ctx,
        &client_ep,
        &stage1_upstream,
        &result_ep,
        &interrupt_ep,
        Protocol::http(ReqLimits::default()),
        ServerLimits::default(),
        quiesce.clone(),
    )
    .unwrap();
    server.set_health_check(HealthCheck {
        matches: Box::new(|request| matches!(request, Request::Http(r) if r.path == "/health")),
        response: b"health-ok".to_vec(),
    });
    tokio::spawn(async move { server.run().await });

    let parse_work: WorkFn = Box::new(|payload, _info, _interrupt_fn| {
        let raw = std::str::from_utf8(payload).unwrap_or("");
        let line = raw.split("\r\n").next().unwrap_or("");
        let target = line.split(' ').nth(1).unwrap_or("");
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
        let value = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("possible_prime="))
            .unwrap_or("0");
        Ok(WorkOutput::forward(vec![value.as_bytes().to_vec()], Vec::new()))
    });
    let mut parse_worker = Worker::new(
        &ctx,
        &stage1_downstream,
        Some(&parse_forward_ep),
        &result_ep,
        &interrupt_ep,
        WorkerLimits::default(),
        b"parse".to_vec(),
        parse_work,
    )
    .unwrap();
    tokio::spawn(async move {
        let q = Quiesce::new();
        parse_worker.run(&q).await
    });

    let compute_work: WorkFn = Box::new(|payload, info, _interrupt_fn| {
        let n: i64 = std::str::from_utf8(payload).unwrap_or("0").parse().unwrap_or(0);
        let is_prime = n >= 2
            && (n == 2 || (n % 2 != 0 && (3..).step_by(2).take_while(|i| i * i <= n).all(|i| n % i != 0)));
        let body = if is_prime { n.to_string() } else { "2".to_string() };
        let version = info.http_version.unwrap_or(meshrelay::protocol::http::types::Version::Http11);
        Ok(WorkOutput::terminal(
            meshrelay::protocol::http::response::Response::text(version, body).to_bytes(),
            Vec::new(),
        ))
    });
    let mut compute_worker = Worker::new(
        &ctx,
        &stage2_downstream,
        None,
        &result_ep,
        &interrupt_ep,
        WorkerLimits::default(),
        b"compute".to_vec(),
        compute_work,
    )
    .unwrap();
    tokio::spawn(async move {
        let q = Quiesce::new();
        compute_worker.run(&q).await
    });

    tokio::time::sleep(Duration::from_millis(150)).await;

    let mut client = Client::connect(&client_ep, ClientLimits::default()).unwrap();
    let mut requests = vec![
        b"GET /is_prime?possible_prime=7 HTTP/1.1\r\nhost: x\r\n\r\n".to_vec(),
        b"GET /is_prime?possible_prime=8 HTTP/1.1\r\nhost: x\r\n\r\n".to_vec(),
    ];
    requests.reverse();
    let request_fn: RequestFn = Box::new(move || requests.pop());

    let bodies = Arc::new(Mutex::new(Vec::new()));
    let bodies2 = bodies.clone();
    let collect_fn: CollectFn = Box::new(move |bytes| {
        bodies2.lock().unwrap().push(response_body(&bytes));
        true
    });

    tokio::time::timeout(Duration::from_secs(2), client.run_http(request_fn, collect_fn))
        .await
        .unwrap();

    let mut got = bodies.lock().unwrap().clone();
    got.sort();
    assert_eq!(got, vec!["2".to_string(), "7".to_string()]);
}
