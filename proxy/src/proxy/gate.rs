use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::protocol::{parse_header, ACCESS_DENIED_PACKET, HEADER_LEN};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("connection from {0} is not allowed")]
    NotAllowed(IpAddr),

    #[error("invalid proxy password")]
    AccessDenied,

    #[error("handshake failed: {0}")]
    Io(#[from] io::Error),
}

/// Source addresses allowed to connect. Empty means everyone.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ips: HashSet<IpAddr>,
}

impl AllowList {
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            ips: ips.into_iter().map(|ip| ip.to_canonical()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn check(&self, ip: IpAddr) -> Result<(), GateError> {
        let ip = ip.to_canonical();
        if self.ips.is_empty() || self.ips.contains(&ip) {
            Ok(())
        } else {
            Err(GateError::NotAllowed(ip))
        }
    }
}

/// Demonstration-only credential check.
///
/// Accepts a client when its handshake response contains the shared secret
/// as plain bytes. Real clients never send the password in clear, so this is
/// not an authentication mechanism; the backend still authenticates.
#[derive(Clone)]
pub struct DemoPasswordGate {
    secret: Vec<u8>,
}

impl fmt::Debug for DemoPasswordGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemoPasswordGate").finish_non_exhaustive()
    }
}

impl DemoPasswordGate {
    /// `None` for an empty secret: no interception at all.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            None
        } else {
            Some(Self {
                secret: secret.as_bytes().to_vec(),
            })
        }
    }

    pub fn matches(&self, packet: &[u8]) -> bool {
        packet
            .windows(self.secret.len())
            .any(|window| window == self.secret.as_slice())
    }

    /// Relays the server greeting, then checks the client's handshake response.
    ///
    /// On success the response is passed on to the server. On failure the
    /// client gets the access denied packet and the server gets nothing.
    pub async fn check<C, S>(&self, client: &mut C, server: &mut S) -> Result<(), GateError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let greeting = read_packet(server).await?;
        client.write_all(&greeting).await?;

        let response = read_packet(client).await?;
        if !self.matches(&response) {
            client.write_all(ACCESS_DENIED_PACKET).await?;
            client.flush().await?;
            return Err(GateError::AccessDenied);
        }

        debug!(len = response.len(), "Handshake response accepted");
        server.write_all(&response).await?;
        Ok(())
    }
}

pub(crate) async fn read_packet<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let payload_len = parse_header(&header)
        .map(|h| h.payload_len)
        .unwrap_or_default();

    let mut packet = vec![0u8; HEADER_LEN + payload_len];
    packet[..HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut packet[HEADER_LEN..]).await?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet;

    #[test]
    fn test_allow_list() {
        let open = AllowList::default();
        assert!(open.check("10.0.0.1".parse().unwrap()).is_ok());

        let list = AllowList::new(["127.0.0.1".parse().unwrap()]);
        assert!(list.check("127.0.0.1".parse().unwrap()).is_ok());
        assert!(list.check("::ffff:127.0.0.1".parse().unwrap()).is_ok());
        assert!(matches!(
            list.check("10.0.0.1".parse().unwrap()),
            Err(GateError::NotAllowed(_))
        ));
    }

    #[test]
    fn test_empty_secret_disables_gate() {
        assert!(DemoPasswordGate::new("").is_none());
    }

    #[test]
    fn test_secret_substring_match() {
        let gate = DemoPasswordGate::new("s3cr3t").unwrap();
        assert!(gate.matches(b"\x85\xa6root\0\x06s3cr3t\0mysql_native_password"));
        assert!(!gate.matches(b"\x85\xa6root\0\x06s3cr3\0"));
        assert!(!gate.matches(b"s3"));
    }

    #[tokio::test]
    async fn test_check_accepts_and_forwards_response() {
        let gate = DemoPasswordGate::new("s3cr3t").unwrap();
        let (mut client, mut client_peer) = tokio::io::duplex(1024);
        let (mut server, mut server_peer) = tokio::io::duplex(1024);

        let greeting = packet(0, b"\x0a8.0.36\0greeting");
        let response = packet(1, b"\x85\xa6\x3f\x20root\0s3cr3t\0");
        server_peer.write_all(&greeting).await.unwrap();
        client_peer.write_all(&response).await.unwrap();

        gate.check(&mut client, &mut server).await.unwrap();

        let mut got = vec![0u8; greeting.len()];
        client_peer.read_exact(&mut got).await.unwrap();
        assert_eq!(got, greeting);

        let mut got = vec![0u8; response.len()];
        server_peer.read_exact(&mut got).await.unwrap();
        assert_eq!(got, response);
    }

    #[tokio::test]
    async fn test_check_rejects_without_secret() {
        let gate = DemoPasswordGate::new("s3cr3t").unwrap();
        let (mut client, mut client_peer) = tokio::io::duplex(1024);
        let (mut server, mut server_peer) = tokio::io::duplex(1024);

        let greeting = packet(0, b"\x0a8.0.36\0greeting");
        server_peer.write_all(&greeting).await.unwrap();
        client_peer.write_all(&packet(1, b"\x85\xa6root\0wrong\0")).await.unwrap();

        let result = gate.check(&mut client, &mut server).await;
        assert!(matches!(result, Err(GateError::AccessDenied)));
        drop(client);
        drop(server);

        let mut got = Vec::new();
        client_peer.read_to_end(&mut got).await.unwrap();
        let mut expected = greeting.clone();
        expected.extend_from_slice(ACCESS_DENIED_PACKET);
        assert_eq!(got, expected);

        let mut to_server = Vec::new();
        server_peer.read_to_end(&mut to_server).await.unwrap();
        assert!(to_server.is_empty());
    }
}
