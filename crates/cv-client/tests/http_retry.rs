//! Retry taxonomy against a local canned-response HTTP stub: rate limits
//! honor `Retry-After`, 5xx retries, 4xx fails fast, timeouts retry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use cv_client::{BinanceClient, ClientConfig, ClientError, RateLimitConfig, RetryConfig};
use cv_core::interval::Interval;

const KLINES_BODY: &str = r#"[[1700000000000,"35000.1","35100.0","34950.5","35050.25","123.4",1700000059999,"4325001.7",987,"61.5","2156000.1","0"]]"#;

fn http_response(status_line: &str, headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{headers}Connection: close\r\n\r\n{body}",
        body.len()
    )
}

enum Canned {
    Respond(String),
    /// Accept the connection but stall longer than the client timeout.
    Stall(Duration),
}

/// One canned action per incoming connection; the last entry repeats.
async fn spawn_stub(script: Vec<Canned>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_bg = Arc::clone(&hits);

    tokio::spawn(async move {
        let script = Arc::new(script);
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            let n = hits_bg.fetch_add(1, Ordering::SeqCst);
            let script = Arc::clone(&script);
            tokio::spawn(async move {
                let action = &script[n.min(script.len() - 1)];
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                match action {
                    Canned::Respond(resp) => {
                        let _ = sock.write_all(resp.as_bytes()).await;
                        let _ = sock.shutdown().await;
                    }
                    Canned::Stall(for_long) => {
                        tokio::time::sleep(*for_long).await;
                    }
                }
            });
        }
    });

    (addr, hits)
}

fn client_for(addr: SocketAddr, timeout_ms: u64) -> BinanceClient {
    BinanceClient::new(ClientConfig {
        rate_limit: RateLimitConfig {
            requests_per_minute: 6_000,
            max_concurrent: 2,
            retry: RetryConfig {
                base_ms: 50,
                max_ms: 200,
                max_retries: 3,
            },
        },
        timeout_ms,
        base_url: format!("http://{addr}"),
    })
    .unwrap()
}

#[tokio::test]
async fn rate_limit_sleeps_per_retry_after_then_succeeds() {
    let (addr, hits) = spawn_stub(vec![
        Canned::Respond(http_response(
            "429 Too Many Requests",
            "Retry-After: 1\r\n",
            "{}",
        )),
        Canned::Respond(http_response("200 OK", "", KLINES_BODY)),
    ])
    .await;

    let client = client_for(addr, 5_000);
    let started = Instant::now();
    let klines = client
        .get_klines("BTCUSDT", Interval::M1, None, None, 1_000)
        .await
        .unwrap();

    assert_eq!(klines.len(), 1);
    assert_eq!(klines[0].open_time, 1_700_000_000_000);
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "Retry-After pause was skipped ({:?})",
        started.elapsed()
    );
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_are_permanent_and_not_retried() {
    let (addr, hits) = spawn_stub(vec![Canned::Respond(http_response(
        "404 Not Found",
        "",
        r#"{"code":-1121,"msg":"Invalid symbol."}"#,
    ))])
    .await;

    let client = client_for(addr, 5_000);
    let err = client
        .get_klines("NOPEUSDT", Interval::M1, None, None, 10)
        .await
        .unwrap_err();

    match err {
        ClientError::Permanent { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("Invalid symbol"));
        }
        other => panic!("expected permanent error, got {other}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let (addr, hits) = spawn_stub(vec![
        Canned::Respond(http_response("500 Internal Server Error", "", "oops")),
        Canned::Respond(http_response("502 Bad Gateway", "", "oops")),
        Canned::Respond(http_response("200 OK", "", KLINES_BODY)),
    ])
    .await;

    let client = client_for(addr, 5_000);
    let klines = client
        .get_klines("BTCUSDT", Interval::M1, None, None, 10)
        .await
        .unwrap();
    assert_eq!(klines.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_budget_exhaustion_escalates() {
    let (addr, hits) = spawn_stub(vec![Canned::Respond(http_response(
        "503 Service Unavailable",
        "",
        "down",
    ))])
    .await;

    let client = client_for(addr, 5_000);
    let err = client
        .get_klines("BTCUSDT", Interval::M1, None, None, 10)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::Permanent { status: 0, .. }),
        "expected escalated permanent error, got {err}"
    );
    // Initial attempt plus max_retries.
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn timeouts_abort_and_retry() {
    let (addr, hits) = spawn_stub(vec![
        Canned::Stall(Duration::from_secs(5)),
        Canned::Respond(http_response("200 OK", "", KLINES_BODY)),
    ])
    .await;

    let client = client_for(addr, 300);
    let started = Instant::now();
    let klines = client
        .get_klines("BTCUSDT", Interval::M1, None, None, 10)
        .await
        .unwrap();
    assert_eq!(klines.len(), 1);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
