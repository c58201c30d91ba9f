// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! SOOD ("Simple Out-Of-band Discovery"): the UDP broadcast/multicast probe
//! Roon Cores answer on the local network. Independent of the MOO/1 channel:
//! its own wire format, its own lifecycle, no shared state with a connection.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, SystemTime};
use tokio::net::UdpSocket;
use tokio::time::Instant;

const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 90, 90);
const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);
const SOOD_PORT: u16 = 9003;
const SOOD_MAGIC: &[u8; 4] = b"SOOD";
const SOOD_VERSION: u8 = 2;
const DEFAULT_HTTP_PORT: u16 = 9100;

/// Errors raised while discovering Cores.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// No Core answered within the configured timeout.
    #[error("no cores found")]
    NoCoresFound,
    /// The underlying UDP socket failed.
    #[error("socket error: {0}")]
    SocketError(#[from] std::io::Error),
    /// A response frame could not be parsed as SOOD.
    #[error("failed to parse sood frame: {0}")]
    ParseError(String),
    /// Neither broadcast nor multicast could be reached on any interface.
    #[error("network unavailable")]
    NetworkUnavailable,
}

/// Discovery tuning.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Total time to keep listening for responses.
    pub timeout: Duration,
    /// How often to re-send the query frame.
    pub query_interval: Duration,
    /// Return as soon as the first Core answers, instead of waiting out `timeout`.
    pub stop_on_first: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            query_interval: Duration::from_secs(2),
            stop_on_first: false,
        }
    }
}

/// A Core found on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCore {
    /// The Core's reachable host (IP address).
    pub host: String,
    /// The Core's HTTP/WebSocket port (default 9100 if unadvertised).
    pub port: u16,
    /// The Core's id, if it advertised one.
    pub core_id: Option<String>,
    /// The Core's display name, if it advertised one.
    pub display_name: Option<String>,
    /// The transaction id echoed back in this Core's response.
    pub transaction_id: String,
    /// When this response was received.
    pub discovered_at: SystemTime,
}

fn encode_properties(properties: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in properties {
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        match value {
            None => out.extend_from_slice(&0xFFFFu16.to_be_bytes()),
            Some(v) if v.is_empty() => out.extend_from_slice(&0x0000u16.to_be_bytes()),
            Some(v) => {
                out.extend_from_slice(&(v.len() as u16).to_be_bytes());
                out.extend_from_slice(v.as_bytes());
            }
        }
    }
    out
}

fn encode_query(transaction_id: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(SOOD_MAGIC);
    out.push(SOOD_VERSION);
    out.push(b'Q');
    out.extend(encode_properties(&[("_tid", Some(transaction_id))]));
    out
}

fn decode_properties(bytes: &[u8]) -> Result<HashMap<String, Option<String>>, DiscoveryError> {
    let mut properties = HashMap::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let name_len = bytes[pos] as usize;
        pos += 1;
        if pos + name_len > bytes.len() {
            return Err(DiscoveryError::ParseError("truncated property name".into()));
        }
        let name = String::from_utf8_lossy(&bytes[pos..pos + name_len]).to_string();
        pos += name_len;

        if pos + 2 > bytes.len() {
            return Err(DiscoveryError::ParseError("truncated property length".into()));
        }
        let value_len = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]);
        pos += 2;

        let value = match value_len {
            0xFFFF => None,
            0x0000 => Some(String::new()),
            len => {
                let len = len as usize;
                if pos + len > bytes.len() {
                    return Err(DiscoveryError::ParseError("truncated property value".into()));
                }
                let value = String::from_utf8_lossy(&bytes[pos..pos + len]).to_string();
                pos += len;
                Some(value)
            }
        };

        properties.insert(name, value);
    }
    Ok(properties)
}

fn decode_response(bytes: &[u8], from: SocketAddr, discovered_at: SystemTime) -> Result<DiscoveredCore, DiscoveryError> {
    if bytes.len() < 6 || &bytes[0..4] != SOOD_MAGIC || bytes[5] != b'X' {
        return Err(DiscoveryError::ParseError("not a sood response frame".into()));
    }
    let properties = decode_properties(&bytes[6..])?;

    let http_port = properties
        .get("http_port")
        .and_then(|v| v.as_deref())
        .and_then(|v| v.parse::<u16>().ok());

    // `_replyaddr` is the address the Core asked us to use, when it sent
    // one; otherwise fall back to wherever the packet actually came from.
    // `_replyport` addresses the SOOD reply channel itself, not the HTTP
    // API, so it plays no part in the port we report here.
    let host = properties
        .get("_replyaddr")
        .and_then(|v| v.clone())
        .unwrap_or_else(|| from.ip().to_string());

    let transaction_id = properties
        .get("_tid")
        .and_then(|v| v.clone())
        .ok_or_else(|| DiscoveryError::ParseError("response missing _tid".into()))?;

    Ok(DiscoveredCore {
        host,
        port: http_port.unwrap_or(DEFAULT_HTTP_PORT),
        core_id: properties.get("_corid").and_then(|v| v.clone()),
        display_name: properties.get("_displayname").and_then(|v| v.clone()),
        transaction_id,
        discovered_at,
    })
}

/// Probe the local network for Roon Cores, collecting responses for up to
/// `config.timeout`, deduped by `(host, port)`.
pub async fn discover(config: DiscoveryConfig) -> Result<Vec<DiscoveredCore>, DiscoveryError> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    let _ = socket.join_multicast_v4(MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED);

    let transaction_id = format!("{:x}", std::process::id());
    let query = encode_query(&transaction_id);

    let multicast_target = SocketAddrV4::new(MULTICAST_ADDR, SOOD_PORT);
    let broadcast_target = SocketAddrV4::new(BROADCAST_ADDR, SOOD_PORT);

    let deadline = Instant::now() + config.timeout;
    let mut next_send = Instant::now();
    let mut found: HashMap<(String, u16), DiscoveredCore> = HashMap::new();
    let mut buf = vec![0u8; 2048];

    while Instant::now() < deadline {
        if Instant::now() >= next_send {
            let _ = socket.send_to(&query, multicast_target).await;
            let _ = socket.send_to(&query, broadcast_target).await;
            next_send = Instant::now() + config.query_interval;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait = remaining.min(config.query_interval);
        if wait.is_zero() {
            break;
        }

        match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => match decode_response(&buf[..len], from, SystemTime::now()) {
                Ok(core) => {
                    let key = (core.host.clone(), core.port);
                    let is_new = !found.contains_key(&key);
                    found.insert(key, core);
                    if is_new && config.stop_on_first {
                        return Ok(found.into_values().collect());
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed sood frame");
                }
            },
            Ok(Err(e)) => return Err(DiscoveryError::SocketError(e)),
            Err(_) => continue,
        }
    }

    if found.is_empty() {
        return Err(DiscoveryError::NoCoresFound);
    }

    Ok(found.into_values().collect())
}
