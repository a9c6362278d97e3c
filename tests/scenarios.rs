//! End-to-end scenarios against a duplex-stream stand-in for a server,
//! covering the round-trip cases a real peer can produce: plain and chunked
//! bodies, Expect:100-continue in both outcomes, obsolete header folding,
//! premature close, a CONNECT tunnel, and an oversize header block.

use bytes::Bytes;
use h1conn::{Config, Connection};
use http::{HeaderValue, Method, Request, StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn read_request_head(client: &mut tokio::io::DuplexStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 256];
    loop {
        let n = client.read(&mut scratch).await.unwrap();
        assert!(n > 0, "peer closed before sending a full request head");
        buf.extend_from_slice(&scratch[..n]);
        if buf.ends_with(b"\r\n\r\n") {
            return buf;
        }
    }
}

async fn read_body_bytes(client: &mut tokio::io::DuplexStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    client.read_exact(&mut buf).await.unwrap();
    buf
}

async fn drain_body(conn: &mut Connection<tokio::io::DuplexStream>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut scratch = [0u8; 64];
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

#[tokio::test]
async fn s1_plain_get() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        client
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .await
            .unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let response = conn.send(get("http://example.com/hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(drain_body(&mut conn).await, b"hello");
    assert!(conn.is_idle());
}

#[tokio::test]
async fn s2_chunked() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        client
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n")
            .await
            .unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    conn.send(get("http://example.com/")).await.unwrap();
    assert_eq!(drain_body(&mut conn).await, b"hello");
    assert!(conn.is_idle());
}

#[tokio::test]
async fn s3_continue_accepted() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        client.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.unwrap();
        let body = read_body_bytes(&mut client, 1).await;
        assert_eq!(body, b"X");
        client
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let request = Request::builder()
        .method(Method::POST)
        .uri("http://example.com/")
        .header(http::header::EXPECT, HeaderValue::from_static("100-continue"))
        .header(http::header::CONTENT_LENGTH, HeaderValue::from_static("1"))
        .body(Some(Bytes::from_static(b"X")))
        .unwrap();
    let response = conn.send(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn s4_continue_rejected_big_body() {
    let (mut client, server) = tokio::io::duplex(8192);
    tokio::spawn(async move {
        let head = read_request_head(&mut client).await;
        assert!(String::from_utf8_lossy(&head).contains("Content-Length: 4096"));
        client
            .write_all(b"HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        // The body is never sent; a read here would hang forever on a
        // well-behaved client, so there's nothing further to assert from
        // the server side besides having already replied.
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let body = Bytes::from(vec![0u8; 4096]);
    let request = Request::builder()
        .method(Method::POST)
        .uri("http://example.com/")
        .header(http::header::EXPECT, HeaderValue::from_static("100-continue"))
        .header(http::header::CONTENT_LENGTH, HeaderValue::from_static("4096"))
        .body(Some(body))
        .unwrap();
    let response = conn.send(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    drain_body(&mut conn).await;
    assert!(conn.is_disposed());
}

#[tokio::test]
async fn s5_folded_header() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        client
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-Foo: a\r\n bc\r\n\r\n")
            .await
            .unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let response = conn.send(get("http://example.com/")).await.unwrap();
    assert_eq!(response.headers().get("x-foo").unwrap(), "a bc");
}

#[tokio::test]
async fn s6_premature_eof_before_response() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        drop(client);
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let err = conn.send(get("http://example.com/")).await.unwrap_err();
    assert!(err.is_incomplete_message());
    assert!(err.is_retryable());
}

#[tokio::test]
async fn s7_connect_tunnel() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        client.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
        client.write_all(b"tunnel-bytes").await.unwrap();
    });

    let mut conn = Connection::unpooled(server, Config::default());
    let request = Request::builder()
        .method(Method::CONNECT)
        .uri("example.com:443")
        .version(Version::HTTP_11)
        .body(None)
        .unwrap();
    let response = conn.send(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut tunnel_bytes = Vec::new();
    let mut scratch = [0u8; 32];
    while tunnel_bytes.len() < b"tunnel-bytes".len() {
        let n = conn.read_body(&mut scratch).await.unwrap();
        assert!(n > 0, "tunnel closed before all bytes arrived");
        tunnel_bytes.extend_from_slice(&scratch[..n]);
    }
    assert_eq!(tunnel_bytes, b"tunnel-bytes");

    conn.release().await.unwrap();
    assert!(conn.is_disposed());
}

#[tokio::test]
async fn s8_oversize_header() {
    let (mut client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        read_request_head(&mut client).await;
        let mut reply = b"HTTP/1.1 200 OK\r\n".to_vec();
        reply.extend(std::iter::repeat(b'a').take(256));
        client.write_all(&reply).await.unwrap();
    });

    let cfg = Config::default().max_response_headers_length(32);
    let mut conn = Connection::unpooled(server, cfg);
    let err = conn.send(get("http://example.com/")).await.unwrap_err();
    assert!(err.is_too_large());
    assert!(conn.is_disposed());
}
