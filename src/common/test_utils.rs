use crate::Result;
use crate::behavior::BehaviorSource;
use crate::http::{HttpConfig, HttpEchoServer};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Starts an HTTP echo server on an ephemeral loopback port for tests
///
/// Returns the server task and the address it is bound to. The listener is
/// bound before this returns, so clients can connect immediately.
pub async fn spawn_test_server<S: BehaviorSource + 'static>(
    source: S,
) -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
    let config = HttpConfig::default().with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)));
    spawn_test_server_with_config(config, source).await
}

/// Like [`spawn_test_server`], with explicit limits and timeouts
///
/// `config.bind_addr` is honoured, so pass port 0 to get an ephemeral port.
pub async fn spawn_test_server_with_config<S: BehaviorSource + 'static>(
    config: HttpConfig,
    source: S,
) -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    let server = HttpEchoServer::new(config, source);
    let server_handle = tokio::spawn(async move { server.serve(listener).await });

    Ok((server_handle, addr))
}
