/// Session initiation and client proxying against a scripted relay
use futures::StreamExt;
use remotelink_client::{ClientProxy, SessionFailure, SessionGrant, SessionInitiator};
use remotelink_proto::{HostIdentity, RelayCodec, SessionToken};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::codec::Framed;

const STEP: Duration = Duration::from_secs(5);

/// Relay that answers a single session request with `response`, returning
/// the request line it received
async fn start_relay(response: Option<&'static str>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut control = Framed::new(stream, RelayCodec::new());
        let request = control.next().await.unwrap().unwrap();

        match response {
            Some(line) => {
                control
                    .get_mut()
                    .write_all(format!("{}\n", line).as_bytes())
                    .await
                    .unwrap();
                // The client closes after reading its single line
                assert!(control.next().await.is_none());
            }
            None => {
                // Stay silent until the client gives up
                let _ = timeout(STEP, control.next()).await;
            }
        }
        request
    });
    (addr, handle)
}

async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
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

#[tokio::test]
async fn test_session_ready() {
    let (relay_addr, relay) = start_relay(Some("SESSION_READY 41000 tok-ready")).await;

    let grant = SessionInitiator::new(relay_addr)
        .unwrap()
        .initiate(&HostIdentity::from("host-1"), Some("my pass"))
        .await
        .unwrap();

    assert_eq!(grant.data_addr, "127.0.0.1:41000");
    assert_eq!(grant.token, SessionToken::from("tok-ready"));
    assert_eq!(
        relay.await.unwrap(),
        "INITIATE_CLIENT_SESSION host-1 my pass"
    );
}

#[tokio::test]
async fn test_request_without_password() {
    let (relay_addr, relay) = start_relay(Some("ERROR_HOST_NOT_FOUND")).await;

    let err = SessionInitiator::new(relay_addr)
        .unwrap()
        .initiate(&HostIdentity::from("nobody"), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SessionFailure::HostNotFound);
    assert_eq!(relay.await.unwrap(), "INITIATE_CLIENT_SESSION nobody");
}

#[tokio::test]
async fn test_authentication_failed() {
    let (relay_addr, _relay) = start_relay(Some("ERROR_AUTHENTICATION_FAILED")).await;

    let err = SessionInitiator::new(relay_addr)
        .unwrap()
        .initiate(&HostIdentity::from("host-1"), Some("wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionFailure::AuthenticationFailed);
}

#[tokio::test]
async fn test_garbage_response_is_protocol_error() {
    let (relay_addr, _relay) = start_relay(Some("HELLO THERE")).await;

    let err = SessionInitiator::new(relay_addr)
        .unwrap()
        .initiate(&HostIdentity::from("host-1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionFailure::Protocol);
}

#[tokio::test]
async fn test_silent_relay_times_out() {
    let (relay_addr, _relay) = start_relay(None).await;

    let err = SessionInitiator::new(relay_addr)
        .unwrap()
        .with_response_timeout(Duration::from_millis(200))
        .initiate(&HostIdentity::from("host-1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionFailure::Transport);
}

#[tokio::test]
async fn test_relay_closing_early_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let err = SessionInitiator::new(relay_addr)
        .unwrap()
        .initiate(&HostIdentity::from("host-1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionFailure::Transport);
}

#[tokio::test]
async fn test_unreachable_relay_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = SessionInitiator::new(relay_addr)
        .unwrap()
        .with_connect_timeout(Duration::from_secs(1))
        .initiate(&HostIdentity::from("host-1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionFailure::Transport);
}

#[tokio::test]
async fn test_proxy_identifies_as_client_and_bridges() {
    let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let grant = SessionGrant {
        host_id: HostIdentity::from("host-1"),
        data_addr: data.local_addr().unwrap().to_string(),
        token: SessionToken::from("tok-client"),
    };

    let proxy = ClientProxy::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr();
    let serving = tokio::spawn(async move { proxy.serve_relay(&grant, STEP).await });

    let mut app = TcpStream::connect(proxy_addr).await.unwrap();
    let (relay_side, _) = timeout(STEP, data.accept()).await.unwrap().unwrap();
    let mut relay_side = BufReader::new(relay_side);

    let mut line = String::new();
    relay_side.read_line(&mut line).await.unwrap();
    assert_eq!(line, "SESSION_TOKEN tok-client CLIENT_PROXY\n");

    app.write_all(b"from app").await.unwrap();
    let mut buf = [0u8; 8];
    relay_side.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from app");

    relay_side.get_mut().write_all(b"from host").await.unwrap();
    let mut buf = [0u8; 9];
    app.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from host");

    drop(app);
    let report = timeout(STEP, serving).await.unwrap().unwrap().unwrap();
    assert_eq!(report.bytes_to_data, 8);
    assert_eq!(report.bytes_to_local, 9);
}

#[tokio::test]
async fn test_direct_proxy_forwards_to_host() {
    let host_addr = echo_server().await;

    let proxy = ClientProxy::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr();
    let serving = tokio::spawn(async move { proxy.serve_direct(&host_addr, STEP).await });

    let mut app = TcpStream::connect(proxy_addr).await.unwrap();
    app.write_all(b"direct").await.unwrap();
    let mut buf = [0u8; 6];
    timeout(STEP, app.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"direct");

    drop(app);
    timeout(STEP, serving).await.unwrap().unwrap().unwrap();
}
