use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use my_rusty_proxy_shared::{CommandEvent, CommandResultEvent, ConnStateEvent, ResultStatus};
use crate::monitoring::EventSink;
use crate::protocol::{classify, decode_err_response, decode_query, PacketKind, TrafficDirection};

/// Query number and start time of the latest request on a connection.
#[derive(Debug, Clone, Copy)]
pub struct QueryStamp {
    pub query_id: u64,
    pub started_at: Instant,
}

/// Single-slot exchange for the latest `QueryStamp` of one connection.
///
/// Only the request direction writes; the response direction reads
/// consistent snapshots. Responses are paired with the most recent request,
/// so pipelined requests still get attributed to the last one sent.
pub fn query_clock() -> (QueryClockWriter, QueryClockReader) {
    let (tx, rx) = watch::channel(QueryStamp {
        query_id: 0,
        started_at: Instant::now(),
    });
    (QueryClockWriter { tx }, QueryClockReader { rx })
}

pub struct QueryClockWriter {
    tx: watch::Sender<QueryStamp>,
}

impl QueryClockWriter {
    pub fn advance(&self) -> QueryStamp {
        let current = *self.tx.borrow();
        let next = QueryStamp {
            query_id: current.query_id + 1,
            started_at: Instant::now(),
        };
        self.tx.send_replace(next);
        next
    }
}

#[derive(Clone)]
pub struct QueryClockReader {
    rx: watch::Receiver<QueryStamp>,
}

impl QueryClockReader {
    pub fn snapshot(&self) -> QueryStamp {
        *self.rx.borrow()
    }
}

/// Watches client -> server packets.
pub struct RequestObserver {
    conn_id: String,
    clock: QueryClockWriter,
    events: EventSink,
}

impl RequestObserver {
    pub fn new(conn_id: String, clock: QueryClockWriter, events: EventSink) -> Self {
        Self { conn_id, clock, events }
    }

    /// Every request packet advances the clock, whatever its kind.
    pub async fn observe(&self, packet: &[u8]) {
        let stamp = self.clock.advance();

        match classify(packet) {
            PacketKind::Query => match decode_query(packet) {
                Ok(query) => {
                    self.events
                        .command(CommandEvent::query(self.conn_id.clone(), stamp.query_id, query))
                        .await;
                }
                Err(e) => {
                    debug!(conn_id = %self.conn_id, error = %e, "Undecodable query packet");
                }
            },
            PacketKind::Quit => {
                self.events
                    .conn_state(ConnStateEvent::finished(self.conn_id.clone()))
                    .await;
            }
            PacketKind::StmtPrepare => {
                debug!(conn_id = %self.conn_id, query_id = stamp.query_id, "Prepare statement");
            }
            _ => {}
        }
    }
}

/// Watches server -> client packets.
pub struct ResponseObserver {
    conn_id: String,
    clock: QueryClockReader,
    events: EventSink,
}

impl ResponseObserver {
    pub fn new(conn_id: String, clock: QueryClockReader, events: EventSink) -> Self {
        Self { conn_id, clock, events }
    }

    /// Every response packet yields exactly one result event.
    pub async fn observe(&self, packet: &[u8]) {
        let stamp = self.clock.snapshot();
        let duration = format!("{:.3}", stamp.started_at.elapsed().as_secs_f64());

        let (status, error) = match classify(packet) {
            PacketKind::ErrResponse => {
                let error = match decode_err_response(packet) {
                    Ok(err) => err.to_string(),
                    Err(e) => {
                        debug!(conn_id = %self.conn_id, error = %e, "Undecodable error packet");
                        String::new()
                    }
                };
                (ResultStatus::Error, error)
            }
            _ => (ResultStatus::Ok, String::new()),
        };

        self.events
            .result(CommandResultEvent {
                conn_id: self.conn_id.clone(),
                query_id: stamp.query_id,
                status,
                error,
                duration,
            })
            .await;
    }
}

/// Tap installed on one relay direction.
pub enum Observer {
    Request(RequestObserver),
    Response(ResponseObserver),
}

impl Observer {
    pub async fn observe(&self, packet: &[u8]) {
        match self {
            Observer::Request(request) => request.observe(packet).await,
            Observer::Response(response) => response.observe(packet).await,
        }
    }

    pub fn direction(&self) -> TrafficDirection {
        match self {
            Observer::Request(_) => TrafficDirection::ClientToServer,
            Observer::Response(_) => TrafficDirection::ServerToClient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::event_channels;
    use crate::protocol::packet;
    use my_rusty_proxy_shared::ConnState;
    use std::time::Duration;

    fn observers() -> (RequestObserver, ResponseObserver, crate::monitoring::EventStreams) {
        let (sink, streams) = event_channels(16);
        let (writer, reader) = query_clock();
        (
            RequestObserver::new("c => s".to_string(), writer, sink.clone()),
            ResponseObserver::new("c => s".to_string(), reader, sink),
            streams,
        )
    }

    #[test]
    fn test_clock_advances_monotonically() {
        let (writer, reader) = query_clock();
        assert_eq!(reader.snapshot().query_id, 0);
        assert_eq!(writer.advance().query_id, 1);
        assert_eq!(writer.advance().query_id, 2);
        assert_eq!(reader.snapshot().query_id, 2);
    }

    #[tokio::test]
    async fn test_counter_advances_on_every_request() {
        let (request, _response, mut streams) = observers();

        request.observe(&packet(0, b"\x16SELECT ?")).await;
        request.observe(&packet(0, b"\x0e")).await;
        request.observe(&packet(0, b"\x03SELECT 1")).await;

        let cmd = streams.commands.recv().await.unwrap();
        assert_eq!(cmd.query_id, 3);
        assert_eq!(cmd.query, "SELECT 1");
        assert_eq!(cmd.conn_id, "c => s");
        assert!(streams.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_undecodable_query_emits_nothing() {
        let (request, response, mut streams) = observers();

        request.observe(&packet(0, b"\x03\xff\xfe")).await;
        assert!(streams.commands.try_recv().is_err());

        // clock still moved
        response.observe(&packet(1, b"\x00\x00\x00")).await;
        assert_eq!(streams.results.recv().await.unwrap().query_id, 1);
    }

    #[tokio::test]
    async fn test_quit_emits_finished() {
        let (request, _response, mut streams) = observers();

        request.observe(&packet(0, b"\x01")).await;

        let state = streams.states.recv().await.unwrap();
        assert_eq!(state.state, ConnState::Finished);
        assert_eq!(state.conn_id, "c => s");
        assert!(streams.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_response_status() {
        let (request, response, mut streams) = observers();

        request.observe(&packet(0, b"\x03SELEC 1")).await;
        response.observe(&packet(1, b"\xff\x28\x04#42000You have an error")).await;
        request.observe(&packet(0, b"\x03SELECT 1")).await;
        response.observe(&packet(1, b"\x01")).await;
        response.observe(&packet(2, b"\xfe\x00\x00\x02\x00")).await;

        let failed = streams.results.recv().await.unwrap();
        assert_eq!(failed.status, ResultStatus::Error);
        assert_eq!(failed.query_id, 1);
        assert_eq!(failed.error, "ERROR 1064 (42000): You have an error");

        for _ in 0..2 {
            let ok = streams.results.recv().await.unwrap();
            assert_eq!(ok.status, ResultStatus::Ok);
            assert_eq!(ok.query_id, 2);
            assert!(ok.error.is_empty());
        }
    }

    #[tokio::test]
    async fn test_undecodable_error_packet_is_still_error() {
        let (request, response, mut streams) = observers();

        request.observe(&packet(0, b"\x03SELECT 1")).await;
        response.observe(&packet(1, b"\xff\x15")).await;

        let result = streams.results.recv().await.unwrap();
        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.query_id, 1);
        assert!(result.error.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_format() {
        let (request, response, mut streams) = observers();

        request.observe(&packet(0, b"\x03SELECT SLEEP(1)")).await;
        tokio::time::advance(Duration::from_millis(1234)).await;
        response.observe(&packet(1, b"\x00\x00\x00")).await;

        assert_eq!(streams.results.recv().await.unwrap().duration, "1.234");
    }
}
