//! Integration tests over real TCP connections: the server side evaluates the
//! preamble and echoes back what it extracted and what it read afterwards.

use std::{net::SocketAddr, time::Duration};

use proxy_preamble::{Config, ProxyError, read_proxy_header};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Build PROXY protocol v1 header
fn build_proxy_v1_header(src_ip: &str, dst_ip: &str, src_port: u16, dst_port: u16) -> String {
    let protocol = if src_ip.contains(':') { "TCP6" } else { "TCP4" };
    format!(
        "PROXY {} {} {} {} {}\r\n",
        protocol, src_ip, dst_ip, src_port, dst_port
    )
}

/// Accept one connection and echo `<remote>|<payload>`, rejected connections are closed
async fn serve_once(listener: TcpListener, payload_len: usize) {
    let (stream, _) = listener.accept().await.unwrap();
    let config = Config {
        timeout: Duration::from_secs(5),
        ..Default::default()
    };

    match read_proxy_header(stream, config).await {
        Ok((mut stream, remote)) => {
            let mut payload = vec![0u8; payload_len];
            stream.read_exact(&mut payload).await.unwrap();

            let remote = remote
                .and_then(|r| r.socket_addr())
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "direct".to_owned());
            let mut reply = format!("{}|", remote).into_bytes();
            reply.extend_from_slice(&payload);
            stream.write_all(&reply).await.unwrap();
        }
        Err(e) => {
            let reason = match e {
                ProxyError::Malformed(_) => "malformed",
                ProxyError::ConnectionReset => "reset",
                ProxyError::Timeout => "timeout",
                _ => "other",
            };
            // the client only observes a closed connection
            log::debug!("server rejected connection: {}", reason);
        }
    }
}

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn round_trip(parts: Vec<Vec<u8>>, payload_len: usize) -> Vec<u8> {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(serve_once(listener, payload_len));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.set_nodelay(true).unwrap();
    for part in parts {
        stream.write_all(&part).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut reply = Vec::new();
    // a rejected connection may be reset rather than closed
    let _ = stream.read_to_end(&mut reply).await;
    server.await.unwrap();
    reply
}

#[test]
fn test_proxy_protocol_v1_ipv4() {
    let _ = env_logger::try_init();
    let rt = tokio::runtime::Runtime::new().unwrap();

    let reply = rt.block_on(async {
        let header = build_proxy_v1_header("203.0.113.50", "192.168.1.1", 54321, 80);
        let mut data = header.into_bytes();
        data.extend_from_slice(b"hello");
        round_trip(vec![data], 5).await
    });

    assert_eq!(reply, b"203.0.113.50:54321|hello");
}

#[test]
fn test_proxy_protocol_v1_ipv6() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let reply = rt.block_on(async {
        let header = build_proxy_v1_header("2001:db8::1", "2001:db8::2", 4000, 443);
        let mut data = header.into_bytes();
        data.extend_from_slice(b"ping");
        round_trip(vec![data], 4).await
    });

    assert_eq!(reply, b"[2001:db8::1]:4000|ping");
}

#[test]
fn test_proxy_protocol_v1_fragmented() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let reply = rt.block_on(async {
        let header = build_proxy_v1_header("10.20.30.40", "192.168.1.1", 12345, 80);
        let mut data = header.into_bytes();
        data.extend_from_slice(b"payload");
        let parts = data.chunks(3).map(<[u8]>::to_vec).collect();
        round_trip(parts, 7).await
    });

    assert_eq!(reply, b"10.20.30.40:12345|payload");
}

#[test]
fn test_without_proxy_protocol() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let reply = rt.block_on(async { round_trip(vec![b"hello world".to_vec()], 11).await });

    assert_eq!(reply, b"direct|hello world");
}

#[test]
fn test_malformed_header_closes_connection() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let reply = rt.block_on(async {
        let data = b"PROXY UDP4 192.168.0.1 192.168.0.11 56324 443\r\nhello".to_vec();
        round_trip(vec![data], 5).await
    });

    assert!(reply.is_empty());
}
