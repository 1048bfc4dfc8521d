// SSDP discovery of Swidget devices on the local network.
//
// Sends one M-SEARCH for the Swidget service type to the SSDP multicast group
// and collects unicast replies until the timeout. Devices answer with a
// SERVER header shaped like `Swidget/1.0 dimmer+USB/"Kitchen"`.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use url::Url;

use crate::error::Error;

/// Search target advertised by Swidget devices.
pub const SWIDGET_ST: &str = "urn:swidget:pico:1";

/// How long to listen for replies when the caller has no preference.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

const SSDP_MULTICAST: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900);
const DEFAULT_FRIENDLY_NAME: &str = "Swidget Discovered Device";

/// A device that answered the M-SEARCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub mac: String,
    pub host: String,
    pub friendly_name: String,
    /// Raw host type tag, e.g. `dimmer`.
    pub host_type: Option<String>,
    /// Raw insert type tag, e.g. `USB`.
    pub insert_type: Option<String>,
}

/// Broadcast one M-SEARCH and collect replies for `timeout`, keyed by MAC.
pub async fn discover_devices(timeout: Duration) -> Result<BTreeMap<String, DiscoveredDevice>, Error> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
    let request = search_request(timeout);
    socket.send_to(request.as_bytes(), SocketAddr::V4(SSDP_MULTICAST)).await?;
    tracing::debug!(timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX), "sent SSDP M-SEARCH");

    let deadline = Instant::now() + timeout;
    let mut devices = BTreeMap::new();
    let mut buf = vec![0u8; 2048];

    loop {
        let received = tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            received = socket.recv_from(&mut buf) => received,
        };
        let (len, from) = match received {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "SSDP receive failed");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&buf[..len]);
        match parse_response(&text) {
            Some(device) => {
                tracing::debug!(name = %device.friendly_name, host = %device.host, "Swidget device found");
                devices.insert(device.mac.clone(), device);
            }
            None => tracing::trace!(%from, "ignoring SSDP reply"),
        }
    }

    Ok(devices)
}

fn search_request(timeout: Duration) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {SWIDGET_ST}\r\n\
         \r\n",
        timeout.as_secs().max(1)
    )
}

/// Parse one SSDP reply. Returns `None` for replies that are not from a
/// Swidget device or lack a usable location.
pub fn parse_response(raw: &str) -> Option<DiscoveredDevice> {
    let mut lines = raw.lines();
    let status = lines.next()?;
    if !status.starts_with("HTTP/") {
        return None;
    }

    let headers: BTreeMap<String, &str> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_uppercase(), value.trim()))
        .collect();

    if headers.get("ST").copied() != Some(SWIDGET_ST) {
        return None;
    }

    let mac = headers.get("USN")?.rsplit('-').next()?.to_owned();
    let host = Url::parse(headers.get("LOCATION")?).ok()?.host_str()?.to_owned();

    let server = headers.get("SERVER").copied().unwrap_or_default();
    let (host_type, insert_type) = server_types(server);
    let friendly_name = server
        .split('/')
        .nth(2)
        .map(|name| name.trim().trim_matches('"').to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FRIENDLY_NAME.to_owned());

    Some(DiscoveredDevice {
        mac,
        host,
        friendly_name,
        host_type,
        insert_type,
    })
}

/// `Swidget/1.0 dimmer+USB/"name"` → (`dimmer`, `USB`)
fn server_types(server: &str) -> (Option<String>, Option<String>) {
    let Some(product) = server.split(' ').nth(1) else {
        return (None, None);
    };
    let mut parts = product.splitn(2, '+');
    let host_type = parts.next().filter(|s| !s.is_empty()).map(str::to_owned);
    let insert_type = parts
        .next()
        .and_then(|rest| rest.split('/').next())
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    (host_type, insert_type)
}
