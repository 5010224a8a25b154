use tokio::sync::mpsc;
use tracing::warn;

use my_rusty_proxy_shared::{CommandEvent, CommandResultEvent, ConnStateEvent};

/// Producer half of the three event queues, cloned into every connection.
///
/// Queues are bounded. Emitting into a full queue waits, which stalls the
/// relay direction that produced the event until the consumer catches up.
#[derive(Clone, Debug)]
pub struct EventSink {
    commands: mpsc::Sender<CommandEvent>,
    results: mpsc::Sender<CommandResultEvent>,
    states: mpsc::Sender<ConnStateEvent>,
}

/// Consumer half of the event queues.
#[derive(Debug)]
pub struct EventStreams {
    pub commands: mpsc::Receiver<CommandEvent>,
    pub results: mpsc::Receiver<CommandResultEvent>,
    pub states: mpsc::Receiver<ConnStateEvent>,
}

pub fn event_channels(capacity: usize) -> (EventSink, EventStreams) {
    let capacity = capacity.max(1);
    let (commands_tx, commands_rx) = mpsc::channel(capacity);
    let (results_tx, results_rx) = mpsc::channel(capacity);
    let (states_tx, states_rx) = mpsc::channel(capacity);

    (
        EventSink {
            commands: commands_tx,
            results: results_tx,
            states: states_tx,
        },
        EventStreams {
            commands: commands_rx,
            results: results_rx,
            states: states_rx,
        },
    )
}

impl EventSink {
    pub async fn command(&self, event: CommandEvent) {
        if let Err(e) = self.commands.send(event).await {
            warn!(conn_id = %e.0.conn_id, query_id = e.0.query_id, "Command event dropped, consumer gone");
        }
    }

    pub async fn result(&self, event: CommandResultEvent) {
        if let Err(e) = self.results.send(event).await {
            warn!(conn_id = %e.0.conn_id, query_id = e.0.query_id, "Result event dropped, consumer gone");
        }
    }

    pub async fn conn_state(&self, event: ConnStateEvent) {
        if let Err(e) = self.states.send(event).await {
            warn!(conn_id = %e.0.conn_id, "Connection state event dropped, consumer gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut streams) = event_channels(8);

        sink.command(CommandEvent::query("c", 1, "SELECT 1")).await;
        sink.command(CommandEvent::query("c", 2, "SELECT 2")).await;
        sink.conn_state(ConnStateEvent::finished("c")).await;

        assert_eq!(streams.commands.recv().await.unwrap().query_id, 1);
        assert_eq!(streams.commands.recv().await.unwrap().query_id, 2);
        assert_eq!(streams.states.recv().await.unwrap().conn_id, "c");
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer() {
        let (sink, mut streams) = event_channels(1);
        sink.command(CommandEvent::query("c", 1, "SELECT 1")).await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            sink.command(CommandEvent::query("c", 2, "SELECT 2")),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(streams.commands.recv().await.unwrap().query_id, 1);
        sink.command(CommandEvent::query("c", 3, "SELECT 3")).await;
        assert_eq!(streams.commands.recv().await.unwrap().query_id, 3);
    }

    #[tokio::test]
    async fn test_closed_consumer_does_not_block() {
        let (sink, streams) = event_channels(1);
        drop(streams);
        sink.command(CommandEvent::query("c", 1, "SELECT 1")).await;
        sink.conn_state(ConnStateEvent::finished("c")).await;
    }
}
