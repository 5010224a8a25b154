use thiserror::Error;
use tokio_rusqlite::Connection as AsyncConnection;
use tracing::{debug, error, info, warn};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use my_rusty_proxy_shared::{CommandEvent, CommandResultEvent, ConnStateEvent, DB_SCHEMA};
use crate::protocol::detect_query_type;
use super::events::EventStreams;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
}

#[derive(Debug)]
enum AuditRecord {
    Command(CommandEvent),
    Result(CommandResultEvent),
    State(ConnStateEvent),
}

/// Drains the event queues into the SQLite audit log.
pub struct AuditWriter {
    db: AsyncConnection,
    streams: EventStreams,
    batch_size: usize,
    flush_interval: tokio::time::Duration,
}

impl AuditWriter {
    pub async fn new(db_path: &Path, streams: EventStreams) -> Result<Self, AuditError> {
        let db = AsyncConnection::open(db_path).await?;
        Self::init(db, streams).await
    }

    #[cfg(test)]
    async fn in_memory(streams: EventStreams) -> Result<Self, AuditError> {
        let db = AsyncConnection::open_in_memory().await?;
        Self::init(db, streams).await
    }

    async fn init(db: AsyncConnection, streams: EventStreams) -> Result<Self, AuditError> {
        db.call(|conn| {
            conn.execute_batch(DB_SCHEMA)?;

            conn.execute_batch(r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
            "#)?;

            Ok(())
        }).await?;

        Ok(Self {
            db,
            streams,
            batch_size: 100,
            flush_interval: tokio::time::Duration::from_millis(100),
        })
    }

    pub async fn run(mut self) {
        let mut buffer = Vec::with_capacity(self.batch_size);
        let mut flush_timer = tokio::time::interval(self.flush_interval);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("AuditWriter started");

        let (mut commands_open, mut results_open, mut states_open) = (true, true, true);

        while commands_open || results_open || states_open {
            let record = tokio::select! {
                event = self.streams.commands.recv(), if commands_open => match event {
                    Some(event) => AuditRecord::Command(event),
                    None => {
                        commands_open = false;
                        continue;
                    }
                },
                event = self.streams.results.recv(), if results_open => match event {
                    Some(event) => AuditRecord::Result(event),
                    None => {
                        results_open = false;
                        continue;
                    }
                },
                event = self.streams.states.recv(), if states_open => match event {
                    Some(event) => AuditRecord::State(event),
                    None => {
                        states_open = false;
                        continue;
                    }
                },

                _ = flush_timer.tick() => {
                    if !buffer.is_empty() {
                        if let Err(e) = self.flush_batch(&mut buffer).await {
                            error!(error = %e, "Failed to flush batch on timer");
                        }
                    }
                    continue;
                }
            };

            log_record(&record);
            buffer.push(record);

            if buffer.len() >= self.batch_size {
                if let Err(e) = self.flush_batch(&mut buffer).await {
                    error!(error = %e, "Failed to flush batch");
                }
            }
        }

        // All senders dropped
        if !buffer.is_empty() {
            if let Err(e) = self.flush_batch(&mut buffer).await {
                error!(error = %e, "Failed to flush final batch");
            }
        }
        info!("AuditWriter shutting down");
    }

    async fn flush_batch(&self, buffer: &mut Vec<AuditRecord>) -> Result<(), AuditError> {
        let records = std::mem::take(buffer);
        let count = records.len();

        let start = Instant::now();

        self.db.call(move |conn| {
            let tx = conn.transaction()?;

            {
                let mut insert_command = tx.prepare_cached(r#"
                    INSERT INTO commands (
                        event_id, conn_id, query_id, statement_kind, query_type, query_text
                    ) VALUES (?, ?, ?, ?, ?, ?)
                "#)?;
                let mut insert_result = tx.prepare_cached(r#"
                    INSERT INTO command_results (
                        event_id, conn_id, query_id, status, error_message, duration_seconds
                    ) VALUES (?, ?, ?, ?, ?, ?)
                "#)?;
                let mut insert_state = tx.prepare_cached(r#"
                    INSERT INTO connection_states (event_id, conn_id, state) VALUES (?, ?, ?)
                "#)?;

                for record in records {
                    let event_id = Uuid::now_v7().to_string();
                    match record {
                        AuditRecord::Command(cmd) => {
                            insert_command.execute((
                                event_id,
                                cmd.conn_id,
                                cmd.query_id as i64,
                                cmd.statement_kind,
                                format!("{:?}", detect_query_type(&cmd.query)),
                                cmd.query,
                            ))?;
                        }
                        AuditRecord::Result(res) => {
                            let error_message = res.is_error().then_some(res.error);
                            insert_result.execute((
                                event_id,
                                res.conn_id,
                                res.query_id as i64,
                                res.status.as_str(),
                                error_message,
                                res.duration,
                            ))?;
                        }
                        AuditRecord::State(state) => {
                            insert_state.execute((
                                event_id,
                                state.conn_id,
                                state.state.as_str(),
                            ))?;
                        }
                    }
                }
            }

            tx.commit()?;
            Ok(())
        }).await?;

        let elapsed = start.elapsed();

        debug!(
            count = count,
            elapsed_ms = elapsed.as_millis(),
            "Flushed audit batch to SQLite"
        );

        Ok(())
    }
}

fn log_record(record: &AuditRecord) {
    match record {
        AuditRecord::Command(cmd) => info!(
            conn_id = %cmd.conn_id,
            query_id = cmd.query_id,
            query = %cmd.query,
            "SQL Query started"
        ),
        AuditRecord::Result(res) if res.is_error() => warn!(
            conn_id = %res.conn_id,
            query_id = res.query_id,
            duration = %res.duration,
            error = %res.error,
            "SQL Query failed"
        ),
        AuditRecord::Result(res) => info!(
            conn_id = %res.conn_id,
            query_id = res.query_id,
            duration = %res.duration,
            "SQL Query finished"
        ),
        AuditRecord::State(state) => info!(
            conn_id = %state.conn_id,
            state = state.state.as_str(),
            "Connection state changed"
        ),
    }
}
