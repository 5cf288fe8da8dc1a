/// Host startup and shutdown in direct mode
use remotelink_host::{EventSink, Host, HostConfig, HostError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

/// Echo server that holds connections open until the peer closes
async fn start_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

fn direct_config(upstream: String) -> HostConfig {
    HostConfig {
        host_id: "desk-42".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        upstream_addr: upstream,
        shutdown_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_direct_mode_forwards_and_shuts_down_once() {
    let upstream = start_echo_server().await;
    let host = Host::start(direct_config(upstream), EventSink::disabled())
        .await
        .unwrap();

    // Direct mode knows its identity immediately
    assert_eq!(
        host.identity().borrow().as_ref().map(|id| id.as_str().to_string()),
        Some("desk-42".to_string())
    );

    let mut conn = TcpStream::connect(host.local_addr()).await.unwrap();
    conn.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    timeout(Duration::from_secs(5), conn.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hello");
    drop(conn);

    let coordinator = host.shutdown_coordinator();
    assert!(host.shutdown().await);
    assert!(!coordinator.try_graceful_shutdown().await);
}

#[tokio::test]
async fn test_idle_connection_is_forced_closed() {
    let upstream = start_echo_server().await;
    let host = Host::start(direct_config(upstream), EventSink::disabled())
        .await
        .unwrap();
    let listen_addr = host.local_addr();

    // An idle connection keeps the graceful stop from completing
    let mut conn = TcpStream::connect(listen_addr).await.unwrap();
    conn.write_all(b"x").await.unwrap();
    let mut buf = [0u8; 1];
    conn.read_exact(&mut buf).await.unwrap();

    let coordinator = host.shutdown_coordinator();
    let stopped = timeout(Duration::from_secs(5), coordinator.try_graceful_shutdown())
        .await
        .expect("shutdown did not respect its timeout");
    assert!(stopped);

    let mut rest = Vec::new();
    let read = timeout(Duration::from_secs(5), conn.read_to_end(&mut rest))
        .await
        .expect("connection was left open");
    assert!(read.is_err() || rest.is_empty());

    // The listener is gone
    assert!(TcpStream::connect(listen_addr).await.is_err());
}

#[tokio::test]
async fn test_invalid_password_hash_is_fatal() {
    let config = HostConfig {
        password_hash: "plaintext-password".to_string(),
        ..direct_config("127.0.0.1:5900".to_string())
    };
    let result = Host::start(config, EventSink::disabled()).await;
    assert!(matches!(result, Err(HostError::Credential(_))));
}

#[tokio::test]
async fn test_listener_in_use_is_fatal() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = HostConfig {
        listen_addr: taken.local_addr().unwrap().to_string(),
        ..direct_config("127.0.0.1:5900".to_string())
    };
    let result = Host::start(config, EventSink::disabled()).await;
    assert!(matches!(result, Err(HostError::Service(_))));
}
