//! Structural invariants from the connection's lifecycle contract: at most
//! one exchange in flight, retry safety tied to whether body bytes reached
//! the wire, safe reuse across a keep-alive pair of requests (including one
//! that forces the large-body buffer swap), and idempotent folded-header
//! rewriting.

use bytes::Bytes;
use h1conn::{Config, Connection};
use http::{HeaderValue, Method, Request, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn read_request_head(client: &mut tokio::io::DuplexStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 256];
    loop {
        let n = client.read(&mut scratch).await.unwrap();
        assert!(n > 0);
        buf.extend_from_slice(&scratch[..n]);
        if buf.ends_with(b"\r\n\r\n") {
            return buf;
        }
    }
}

async fn drain_body(conn: &mut Connection<tokio::io::DuplexStream>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut scratch = [0u8; 256];
    loop {
        let n = conn.read_body(&mut scratch).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&scratch[..n]);
    }
    out
}

fn get(uri: &str) -> Request<Option<Bytes>> {
    Request::builder().method(Method::GET).uri(uri).body(None).unwrap()
}

/// Invariant 1: a second `send` can't start while the first exchange's
/// response body hasn't been drained yet -- the type only gives out one
/// `&mut Connection` at a time, and the state machine rejects a `send` from
/// anywhere but `Idle`.
#[tokio::test]
async fn at_most_one_request_in_flight() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        client
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc")
            .await
            .unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    conn.send(get("http://example.com/")).await.unwrap();

    let err = conn.send(get("http://example.com/")).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(!err.is_cancelled());
    assert!(!err.is_parse());
    assert!(format!("{}", err).contains("invalid operation"));
}

/// Invariant 2: once any request-body byte has reached the transport, a
/// failure from that point on is no longer safely retryable on a fresh
/// connection.
#[tokio::test]
async fn retry_safety_tracks_body_bytes_sent() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let head = read_request_head(&mut client).await;
        assert!(String::from_utf8_lossy(&head).contains("Content-Length: 3"));
        let mut scratch = [0u8; 3];
        client.read_exact(&mut scratch).await.unwrap();
        drop(client);
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let request = Request::builder()
        .method(Method::POST)
        .uri("http://example.com/")
        .header(http::header::CONTENT_LENGTH, HeaderValue::from_static("3"))
        .body(Some(Bytes::from_static(b"abc")))
        .unwrap();
    let err = conn.send(request).await.unwrap_err();
    assert!(err.is_incomplete_message());
    assert!(!err.is_retryable());
    assert!(!conn.can_retry());
}

/// Invariant 3: a connection that finishes one exchange cleanly (no
/// `connection_close` directive) can be driven through a second one -- which
/// only works if the write buffer, read cursor, and current-request slot
/// were all reset to their idle state after the first.
#[tokio::test]
async fn connection_is_reusable_after_clean_exchange() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        for _ in 0..2 {
            read_request_head(&mut client).await;
            client
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        }
    });

    let mut conn = Connection::unpooled(server, Config::default());

    let r1 = conn.send(get("http://example.com/one")).await.unwrap();
    assert_eq!(r1.status(), StatusCode::OK);
    assert_eq!(drain_body(&mut conn).await, b"ok");
    assert!(conn.is_idle());

    let r2 = conn.send(get("http://example.com/two")).await.unwrap();
    assert_eq!(r2.status(), StatusCode::OK);
    assert_eq!(drain_body(&mut conn).await, b"ok");
    assert!(conn.is_idle());
}

/// Invariant 4: reading a content-length body large enough to trigger the
/// temporary large-buffer swap in `read_large` must leave the connection in
/// exactly the same reusable state as a small one -- the swapped-out buffer
/// has to come back.
#[tokio::test]
async fn large_body_buffer_swap_does_not_leak() {
    let big = vec![b'z'; 64 * 1024];
    let (mut client, server) = tokio::io::duplex(128 * 1024);
    let expected = big.clone();
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        let header = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", expected.len());
        client.write_all(header.as_bytes()).await.unwrap();
        client.write_all(&expected).await.unwrap();

        read_request_head(&mut client).await;
        client
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    conn.send(get("http://example.com/big")).await.unwrap();

    // A single read sized to swallow the whole body in one call is what
    // forces `read_large`'s buffer swap (it only kicks in once the caller's
    // destination slice outgrows the steady-state buffer).
    let mut got = vec![0u8; big.len()];
    let mut filled = 0;
    loop {
        let n = conn.read_body(&mut got[filled..]).await.unwrap();
        if n == 0 {
            break;
        }
        filled += n;
    }
    assert_eq!(&got[..filled], &big[..]);
    assert!(conn.is_idle());

    // The buffer restored from the large-copy swap must behave like any
    // other idle connection for the next request.
    conn.send(get("http://example.com/small")).await.unwrap();
    assert_eq!(drain_body(&mut conn).await, b"ok");
    assert!(conn.is_idle());
}

/// Invariant 5: an obsolete-folded header line, once flattened to a single
/// space on read, yields the same logical value a well-formed single-line
/// header would have -- and doesn't disturb the rest of the exchange.
#[tokio::test]
async fn folded_header_is_idempotent_with_unfolded_equivalent() {
    async fn fetch_foo(reply: &'static [u8]) -> HeaderValue {
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            read_request_head(&mut client).await;
            client.write_all(reply).await.unwrap();
        });
        let mut conn = Connection::unpooled(server, Config::default());
        let response = conn.send(get("http://example.com/")).await.unwrap();
        response.headers().get("x-foo").unwrap().clone()
    }

    let folded = fetch_foo(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-Foo: a\r\n bc\r\n\r\n").await;
    let unfolded = fetch_foo(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-Foo: a bc\r\n\r\n").await;
    assert_eq!(folded, unfolded);
}
