mod framing;
mod messages;
mod types;

pub use framing::PacketFramer;
pub use messages::{
    classify, decode_err_response, decode_query, detect_query_type, parse_header,
    ACCESS_DENIED_PACKET,
};
pub use types::{PacketKind, TrafficDirection, HEADER_LEN};

#[cfg(test)]
pub(crate) use messages::packet;
