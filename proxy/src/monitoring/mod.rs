mod events;
mod logger;

pub use events::{event_channels, EventSink, EventStreams};
pub use logger::AuditWriter;
