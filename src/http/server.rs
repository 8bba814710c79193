use super::codec::{CONTINUE_RESPONSE, HttpCodec, Inbound, Outbound};
use super::config::HttpConfig;
use super::handler::EchoHandler;
use crate::behavior::{BehaviorSource, EnvSource};
use crate::common::EchoServerTrait;
use crate::{EchoError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, time::timeout};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, warn, Instrument};

/// HTTP echo server
///
/// Every connection runs in its own task. Requests on one connection are
/// answered in order; requests on different connections are independent, so
/// a delayed request never holds up anyone else.
///
/// # Examples
///
/// ```no_run
/// use httpecho::behavior::EnvSource;
/// use httpecho::common::EchoServerTrait;
/// use httpecho::http::{HttpConfig, HttpEchoServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = HttpConfig::default().with_port(8080);
///     let server = HttpEchoServer::new(config, EnvSource);
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct HttpEchoServer<S = EnvSource> {
    config: HttpConfig,
    handler: Arc<EchoHandler<S>>,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl<S: BehaviorSource + 'static> HttpEchoServer<S> {
    /// Creates a server whose behavior overrides come from `source`
    pub fn new(config: HttpConfig, source: S) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        let handler = EchoHandler::new(source).with_max_response_size(config.max_response_size);
        Self {
            config,
            handler: Arc::new(handler),
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Accepts connections from an already bound listener until shut down
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "HTTP echo server listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            let new_count = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                            debug!(%addr, current = new_count, "Accepted connection");

                            let handler = self.handler.clone();
                            let config = self.config.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, handler, config).instrument(span).await {
                                    warn!(%addr, error = %e, "Error handling connection");
                                }
                                let final_count = connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
                                debug!(%addr, current = final_count, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP echo server stopped");
        Ok(())
    }
}

/// Serves requests on one connection until either side closes it
async fn handle_connection<S: BehaviorSource>(
    mut stream: TcpStream,
    addr: SocketAddr,
    handler: Arc<EchoHandler<S>>,
    config: HttpConfig,
) -> Result<()> {
    let mut codec = HttpCodec::new(&config);
    let mut read_buf = BytesMut::with_capacity(config.buffer_size);
    let mut write_buf = BytesMut::with_capacity(config.buffer_size);
    let mut eof = false;

    loop {
        let inbound = if eof {
            codec.decode_eof(&mut read_buf)?
        } else {
            codec.decode(&mut read_buf)?
        };

        let Some(inbound) = inbound else {
            if eof {
                debug!(%addr, "Client closed connection");
                break;
            }
            if codec.take_continue() {
                write_with_timeout(&mut stream, CONTINUE_RESPONSE, &config).await?;
            }

            match timeout(config.read_timeout, stream.read_buf(&mut read_buf)).await {
                Ok(Ok(0)) => eof = true,
                Ok(Ok(n)) => debug!(%addr, size = n, "Received data"),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!(%addr, "Read timeout");
                    break;
                }
            }
            continue;
        };

        let outbound = match inbound {
            Inbound::Request { request, close } => {
                let keep_alive = !close && !eof && request.keep_alive();
                let method = request.method.clone();
                let response = handler.handle(request).await;
                Outbound::echo(response, &method, keep_alive)
            }
            Inbound::Rejected(status) => {
                warn!(%addr, status = status.as_u16(), "Rejected malformed request");
                Outbound::rejection(status)
            }
        };
        let keep_alive = outbound.keep_alive;

        codec.encode(outbound, &mut write_buf)?;
        write_with_timeout(&mut stream, &write_buf, &config).await?;
        write_buf.clear();

        if !keep_alive {
            break;
        }
    }

    // The peer may already be gone; nothing left to report either way.
    let _ = stream.shutdown().await;
    Ok(())
}

async fn write_with_timeout(stream: &mut TcpStream, data: &[u8], config: &HttpConfig) -> Result<()> {
    timeout(config.write_timeout, async {
        stream.write_all(data).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| EchoError::Timeout("Write timeout".to_string()))??;
    Ok(())
}

#[async_trait]
impl<S: BehaviorSource + 'static> EchoServerTrait for HttpEchoServer<S> {
    /// Binds the configured address and serves until shut down
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
