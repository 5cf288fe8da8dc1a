use std::io;
use std::time::Duration;

use tokio::net::TcpStream;

/// Open a TCP connection, failing with `TimedOut` once `timeout` elapses
pub async fn dial(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {} timed out after {:?}", addr, timeout),
        )),
    }
}
