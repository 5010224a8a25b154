use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use my_rusty_proxy_shared::ConnStateEvent;
use crate::config::ProxyConfig;
use crate::monitoring::EventSink;
use crate::protocol::{PacketFramer, TrafficDirection};
use super::gate::GateError;
use super::observer::{query_clock, Observer, RequestObserver, ResponseObserver};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Rejected(GateError),

    #[error("handshake with {client} failed: {source}")]
    Handshake {
        client: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to upstream {addr}: {source}")]
    Upstream {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Binds the listen address and serves forever. `ready` receives the bound
/// address once the listener is up.
pub async fn start_proxy_server(
    config: Arc<ProxyConfig>,
    events: EventSink,
    ready: Option<oneshot::Sender<SocketAddr>>,
) -> io::Result<()> {
    let listener = TcpListener::bind(config.downstream).await?;
    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, "Proxy server listening");

    if let Some(ready) = ready {
        let _ = ready.send(local_addr);
    }

    serve(listener, config, events).await
}

/// Accept loop. One task per connection; an optional semaphore caps how many
/// run at once.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    events: EventSink,
) -> io::Result<()> {
    let limiter = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));

    loop {
        let permit = match &limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let (client_stream, client_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        debug!(client = %client_addr, "New connection accepted");

        let config = config.clone();
        let events = events.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match handle_client(client_stream, client_addr, config, events).await {
                Ok(()) => {}
                Err(ConnectionError::Rejected(e)) => {
                    warn!(client = %client_addr, reason = %e, "Connection rejected");
                }
                Err(e) => {
                    error!(client = %client_addr, error = %e, "Error handling client");
                }
            }
        });
    }
}

async fn handle_client(
    mut client: TcpStream,
    client_addr: SocketAddr,
    config: Arc<ProxyConfig>,
    events: EventSink,
) -> Result<(), ConnectionError> {
    config
        .allow_list
        .check(client_addr.ip())
        .map_err(ConnectionError::Rejected)?;

    let upstream_addr = config.upstream;
    let mut server = TcpStream::connect(upstream_addr)
        .await
        .map_err(|source| ConnectionError::Upstream { addr: upstream_addr, source })?;

    if let Some(gate) = &config.password_gate {
        gate.check(&mut client, &mut server)
            .await
            .map_err(|e| gate_failure(client_addr, e))?;
    }

    let conn_id = format!(
        "{} => {}",
        client_addr,
        server.peer_addr().unwrap_or(upstream_addr)
    );

    info!(
        client = %client_addr,
        upstream = %upstream_addr,
        conn_id = %conn_id,
        "Connected to upstream"
    );

    relay(client, server, &conn_id, &events).await;

    events.conn_state(ConnStateEvent::finished(conn_id.clone())).await;

    info!(client = %client_addr, conn_id = %conn_id, "Connection closed");

    Ok(())
}

/// Socket errors during the handshake are transport failures, not rejections.
fn gate_failure(client: SocketAddr, error: GateError) -> ConnectionError {
    match error {
        GateError::Io(source) => ConnectionError::Handshake { client, source },
        rejected => ConnectionError::Rejected(rejected),
    }
}

/// Copies both directions until one of them ends, then tears down the other.
async fn relay(client: TcpStream, server: TcpStream, conn_id: &str, events: &EventSink) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut server_read, mut server_write) = server.into_split();

    let (clock_writer, clock_reader) = query_clock();
    let request = Observer::Request(RequestObserver::new(
        conn_id.to_string(),
        clock_writer,
        events.clone(),
    ));
    let response = Observer::Response(ResponseObserver::new(
        conn_id.to_string(),
        clock_reader,
        events.clone(),
    ));

    // Client -> Server
    let mut client_to_server = tokio::spawn(async move {
        copy_with_observer(&mut client_read, &mut server_write, &request).await
    });

    // Server -> Client
    let mut server_to_client = tokio::spawn(async move {
        copy_with_observer(&mut server_read, &mut client_write, &response).await
    });

    let (direction, result) = tokio::select! {
        result = &mut client_to_server => {
            server_to_client.abort();
            let _ = server_to_client.await;
            (TrafficDirection::ClientToServer, result)
        }
        result = &mut server_to_client => {
            client_to_server.abort();
            let _ = client_to_server.await;
            (TrafficDirection::ServerToClient, result)
        }
    };

    match result {
        Ok(Ok(bytes)) => debug!(conn_id = %conn_id, ?direction, bytes, "Relay finished"),
        Ok(Err(e)) => debug!(conn_id = %conn_id, ?direction, error = %e, "Relay ended with error"),
        Err(e) => error!(conn_id = %conn_id, ?direction, error = %e, "Relay task failed"),
    }
}

/// Relays bytes unchanged and feeds every completed packet to the observer
/// before the chunk carrying its end is forwarded.
async fn copy_with_observer<R, W>(
    reader: &mut R,
    writer: &mut W,
    observer: &Observer,
) -> io::Result<u64>
where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut buffer = vec![0u8; 8192];
    let mut framer = PacketFramer::new();
    let mut total_bytes = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;

        if n == 0 {
            break;
        }

        total_bytes += n as u64;

        framer.push(&buffer[..n]);
        while let Some(packet) = framer.next_packet() {
            observer.observe(&packet).await;
        }

        writer.write_all(&buffer[..n]).await?;
    }

    debug!(
        direction = ?observer.direction(),
        pending = framer.buffered(),
        "Source reached end of stream"
    );
    let _ = writer.shutdown().await;

    Ok(total_bytes)
}
