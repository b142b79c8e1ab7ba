//! Websocket dialing for agents, directly or through an HTTP proxy tunnel

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use log::debug;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{CACHE_CONTROL, ORIGIN, PRAGMA, USER_AGENT};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::{client_async, WebSocketStream};

use crate::proxy::{HttpProxy, ProxyError, ProxyRoute};

pub type WsStream = WebSocketStream<TcpStream>;

const GAME_PATH: &str = "/slither";
const DEFAULT_SERVER_PORT: u16 = 80;
const MAX_TUNNEL_RESPONSE: usize = 8192;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";
const GAME_ORIGIN: &str = "http://slither.com";

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("handshake with {0} timed out")]
    Timeout(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad proxy route: {0}")]
    Proxy(#[from] ProxyError),
    #[error("proxy tunnel failed: {0}")]
    Tunnel(String),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("server answered {0} instead of switching protocols")]
    UnexpectedStatus(StatusCode),
}

/// Opens the game websocket for `server_address` over `route`.
///
/// The whole exchange (TCP connect, proxy tunnel and upgrade) shares one
/// `timeout`.
pub async fn dial(
    server_address: &str,
    route: &ProxyRoute,
    timeout: Duration,
) -> Result<WsStream, ConnectError> {
    tokio::time::timeout(timeout, dial_inner(server_address, route))
        .await
        .map_err(|_| ConnectError::Timeout(server_address.to_string()))?
}

async fn dial_inner(server_address: &str, route: &ProxyRoute) -> Result<WsStream, ConnectError> {
    let request = game_request(server_address)?;
    let target = server_authority(server_address);

    let stream = match route.resolve()? {
        ProxyRoute::Http(proxy) => {
            debug!("Tunnelling to {} through {}", target, proxy.authority());
            open_tunnel(&proxy, &target).await?
        }
        _ => TcpStream::connect(&target).await?,
    };
    stream.set_nodelay(true)?;

    let (socket, response) = client_async(request, stream).await?;
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(ConnectError::UnexpectedStatus(response.status()));
    }

    Ok(socket)
}

/// Builds the upgrade request with the header set a desktop browser would send.
pub fn game_request(server_address: &str) -> Result<Request, ConnectError> {
    let mut request = format!("ws://{server_address}{GAME_PATH}").into_client_request()?;

    let headers = request.headers_mut();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ORIGIN, HeaderValue::from_static(GAME_ORIGIN));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok(request)
}

/// `host:port` to open the TCP connection to, defaulting to port 80.
pub fn server_authority(server_address: &str) -> String {
    match server_address.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => server_address.to_string(),
        _ => format!("{server_address}:{DEFAULT_SERVER_PORT}"),
    }
}

async fn open_tunnel(proxy: &HttpProxy, target: &str) -> Result<TcpStream, ConnectError> {
    let mut stream = TcpStream::connect(proxy.authority()).await?;

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(credentials) = &proxy.credentials {
        let token = BASE64_ENGINE.encode(format!(
            "{}:{}",
            credentials.username, credentials.password
        ));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let head = read_response_head(&mut stream).await?;
    match parse_status(&head) {
        Some(200) => Ok(stream),
        Some(status) => Err(ConnectError::Tunnel(format!("proxy answered {status}"))),
        None => Err(ConnectError::Tunnel("malformed proxy response".to_string())),
    }
}

// Reads byte by byte so nothing after the blank line is consumed; the
// websocket handshake follows directly on the same stream.
async fn read_response_head(stream: &mut TcpStream) -> Result<String, ConnectError> {
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_TUNNEL_RESPONSE {
            return Err(ConnectError::Tunnel("proxy response too large".to_string()));
        }
        head.push(stream.read_u8().await?);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn parse_status(head: &str) -> Option<u16> {
    let mut parts = head.lines().next()?.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Credentials;
    use tokio::net::TcpListener;

    #[test]
    fn test_server_authority() {
        assert_eq!(server_authority("1.2.3.4:444"), "1.2.3.4:444");
        assert_eq!(server_authority("game.example"), "game.example:80");
    }

    #[test]
    fn test_game_request_headers() {
        let request = game_request("1.2.3.4:444").unwrap();
        assert_eq!(request.uri().to_string(), "ws://1.2.3.4:444/slither");
        assert_eq!(request.headers()[ORIGIN], "http://slither.com");
        assert!(request.headers()[USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status("HTTP/1.1 200 Connection established\r\n\r\n"),
            Some(200)
        );
        assert_eq!(parse_status("HTTP/1.0 407 Auth\r\n\r\n"), Some(407));
        assert_eq!(parse_status("garbage\r\n\r\n"), None);
        assert_eq!(parse_status(""), None);
    }

    async fn fake_proxy(reply: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            while !request.ends_with(b"\r\n\r\n") {
                request.push(socket.read_u8().await.unwrap());
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8(request).unwrap()
        });

        (port, handle)
    }

    #[tokio::test]
    async fn test_open_tunnel_sends_credentials() {
        let (port, handle) = fake_proxy("HTTP/1.1 200 Connection established\r\n\r\n").await;
        let proxy = HttpProxy {
            host: "127.0.0.1".to_string(),
            port,
            credentials: Some(Credentials {
                username: "alice".to_string(),
                password: "secret".to_string(),
            }),
        };

        assert!(open_tunnel(&proxy, "game.example:444").await.is_ok());

        let request = handle.await.unwrap();
        assert!(request.starts_with("CONNECT game.example:444 HTTP/1.1\r\n"));
        // base64("alice:secret")
        assert!(request.contains("Proxy-Authorization: Basic YWxpY2U6c2VjcmV0\r\n"));
    }

    #[tokio::test]
    async fn test_open_tunnel_rejected() {
        let (port, _handle) = fake_proxy("HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        let proxy = HttpProxy {
            host: "127.0.0.1".to_string(),
            port,
            credentials: None,
        };

        let error = open_tunnel(&proxy, "game.example:444").await.unwrap_err();
        assert!(matches!(error, ConnectError::Tunnel(_)));
    }

    #[tokio::test]
    async fn test_dial_times_out() {
        // Accepts the TCP connection but never answers the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let error = dial(&address, &ProxyRoute::Direct, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(error, ConnectError::Timeout(_)));
    }
}
