// SQLite schema for the audit log
pub const DB_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS commands (
    event_id TEXT PRIMARY KEY,
    conn_id TEXT NOT NULL,
    query_id INTEGER NOT NULL,
    statement_kind TEXT NOT NULL,
    query_type TEXT NOT NULL,
    query_text TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000000)
);

CREATE TABLE IF NOT EXISTS command_results (
    event_id TEXT PRIMARY KEY,
    conn_id TEXT NOT NULL,
    query_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    error_message TEXT,
    duration_seconds TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000000)
);

CREATE TABLE IF NOT EXISTS connection_states (
    event_id TEXT PRIMARY KEY,
    conn_id TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000000)
);

CREATE INDEX IF NOT EXISTS idx_commands_conn ON commands(conn_id, query_id);
CREATE INDEX IF NOT EXISTS idx_command_results_conn ON command_results(conn_id, query_id);
CREATE INDEX IF NOT EXISTS idx_command_results_status ON command_results(status);
CREATE INDEX IF NOT EXISTS idx_connection_states_conn ON connection_states(conn_id);
"#;
