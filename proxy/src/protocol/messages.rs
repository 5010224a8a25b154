use super::types::{
    DecodeError, ErrResponse, PacketHeader, PacketKind, QueryType, HEADER_LEN,
};

/// Sent to a client that fails the demo password check.
pub const ACCESS_DENIED_PACKET: &[u8] = &[
    0x07, 0x00, 0x00, 0x01, 0xff, 0x15, 0x04, b'#', b'2', b'8', b'0', b'0', b'0', b'A', b'c',
    b'c', b'e', b's', b's', b' ', b'd', b'e', b'n', b'i', b'e', b'd', b' ', b'f', b'o', b'r',
    b' ', b'u', b's', b'e', b'r',
];

/// Reads the 4-byte packet header (3-byte little-endian length + sequence id).
pub fn parse_header(data: &[u8]) -> Option<PacketHeader> {
    if data.len() < HEADER_LEN {
        return None;
    }
    let payload_len = u32::from_le_bytes([data[0], data[1], data[2], 0]) as usize;
    Some(PacketHeader {
        payload_len,
        sequence: data[3],
    })
}

/// Classifies a framed packet by its first payload byte.
pub fn classify(packet: &[u8]) -> PacketKind {
    packet
        .get(HEADER_LEN)
        .map(|&b| PacketKind::from(b))
        .unwrap_or(PacketKind::Other(0))
}

fn payload(packet: &[u8]) -> Result<&[u8], DecodeError> {
    let header = parse_header(packet).ok_or(DecodeError::Truncated)?;
    packet
        .get(HEADER_LEN..header.packet_len())
        .ok_or(DecodeError::Truncated)
}

/// Extracts the statement text of a COM_QUERY packet.
pub fn decode_query(packet: &[u8]) -> Result<String, DecodeError> {
    let found = classify(packet);
    if found != PacketKind::Query {
        return Err(DecodeError::UnexpectedKind {
            expected: PacketKind::Query,
            found,
        });
    }
    let body = payload(packet)?.get(1..).ok_or(DecodeError::Truncated)?;
    std::str::from_utf8(body)
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8)
}

pub fn decode_err_response(packet: &[u8]) -> Result<ErrResponse, DecodeError> {
    let found = classify(packet);
    if found != PacketKind::ErrResponse {
        return Err(DecodeError::UnexpectedKind {
            expected: PacketKind::ErrResponse,
            found,
        });
    }
    let body = payload(packet)?;
    if body.len() < 3 {
        return Err(DecodeError::Truncated);
    }

    let code = u16::from_le_bytes([body[1], body[2]]);
    let rest = &body[3..];

    let (sql_state, message) = match rest.first() {
        Some(b'#') if rest.len() >= 6 => (
            Some(String::from_utf8_lossy(&rest[1..6]).into_owned()),
            &rest[6..],
        ),
        _ => (None, rest),
    };

    Ok(ErrResponse {
        code,
        sql_state,
        message: String::from_utf8_lossy(message).into_owned(),
    })
}

/// Classifies a statement by its first keyword
pub fn detect_query_type(query: &str) -> QueryType {
    let query_lower = query.trim().to_lowercase();
    let first_word = query_lower.split_whitespace().next().unwrap_or("");

    match first_word {
        "select" | "with" => QueryType::Select,
        "insert" => QueryType::Insert,
        "update" => QueryType::Update,
        "delete" => QueryType::Delete,
        "replace" => QueryType::Replace,
        "create" => QueryType::Create,
        "drop" | "truncate" => QueryType::Drop,
        "alter" | "rename" => QueryType::Alter,
        "begin" | "start" | "commit" | "rollback" | "savepoint" => QueryType::Transaction,
        "explain" | "describe" | "desc" => QueryType::Explain,
        "optimize" | "analyze" | "repair" | "check" => QueryType::Maintenance,
        "load" => QueryType::Load,
        "set" | "show" | "use" => QueryType::Session,
        _ => QueryType::Other(first_word.to_string()),
    }
}

#[cfg(test)]
pub(crate) fn packet(sequence: u8, payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u32).to_le_bytes();
    let mut out = vec![len[0], len[1], len[2], sequence];
    out.extend_from_slice(payload);
    out
}
