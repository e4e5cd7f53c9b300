//! Unicast SNTP client: one request, one reply, one `Exchange`
//!
//! Packet layout (48 bytes, big endian):
//!
//! ```text
//!  0      LI(2) VN(3) Mode(3)
//!  1      stratum
//!  8..12  root dispersion, 16.16 fixed point seconds
//! 24..32  originate timestamp (echo of the request's transmit timestamp)
//! 32..40  receive timestamp
//! 40..48  transmit timestamp
//! ```
//!
//! Timestamps are 32.32 fixed point seconds since 1900-01-01.

use ntpo_common::config::SourceConfig;
use ntpo_common::time::unix_now;
use ntpo_common::{Error, Exchange, Result, TimeSource};
use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tracing::trace;

/// Seconds between 1900-01-01 and 1970-01-01
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

pub const PACKET_LEN: usize = 48;

const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const FRACTION_SCALE: f64 = 4_294_967_296.0;
/// Era-0 seconds below this are read as era 1 (after 2036-02-07)
const ERA_PIVOT: u32 = 0x8000_0000;

/// 32.32 fixed point NTP timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    pub fn from_unix(secs: f64) -> Self {
        let ntp = secs + NTP_UNIX_OFFSET as f64;
        let whole = ntp.floor();
        Self {
            seconds: (whole as u64 & 0xFFFF_FFFF) as u32,
            fraction: ((ntp - whole) * FRACTION_SCALE) as u32,
        }
    }

    pub fn to_unix(self) -> f64 {
        let mut seconds = u64::from(self.seconds);
        if self.seconds < ERA_PIVOT {
            seconds += 1 << 32;
        }
        (seconds as f64 - NTP_UNIX_OFFSET as f64) + f64::from(self.fraction) / FRACTION_SCALE
    }

    fn read(bytes: &[u8]) -> Self {
        Self {
            seconds: read_u32(&bytes[0..4]),
            fraction: read_u32(&bytes[4..8]),
        }
    }

    fn write(self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.seconds.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.fraction.to_be_bytes());
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Build a client request carrying `transmit` as its transmit timestamp
pub fn encode_request(version: u8, transmit: NtpTimestamp) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = ((version & 0x07) << 3) | MODE_CLIENT;
    transmit.write(&mut packet[40..48]);
    packet
}

/// Decoded server reply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reply {
    pub leap: u8,
    pub version: u8,
    pub mode: u8,
    pub stratum: u8,
    /// Seconds
    pub root_dispersion: f64,
    pub originate: NtpTimestamp,
    pub receive: NtpTimestamp,
    pub transmit: NtpTimestamp,
}

impl Reply {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < PACKET_LEN {
            return Err(Error::TransientSampleFailure(format!(
                "short reply: {} bytes",
                buf.len()
            )));
        }
        Ok(Self {
            leap: buf[0] >> 6,
            version: (buf[0] >> 3) & 0x07,
            mode: buf[0] & 0x07,
            stratum: buf[1],
            root_dispersion: f64::from(read_u32(&buf[8..12])) / 65_536.0,
            originate: NtpTimestamp::read(&buf[24..32]),
            receive: NtpTimestamp::read(&buf[32..40]),
            transmit: NtpTimestamp::read(&buf[40..48]),
        })
    }

    /// Reject replies that cannot belong to a request sent at `sent`
    pub fn validate(&self, sent: NtpTimestamp) -> Result<()> {
        if self.mode != MODE_SERVER {
            return Err(Error::TransientSampleFailure(format!("unexpected mode {}", self.mode)));
        }
        if self.stratum == 0 {
            return Err(Error::TransientSampleFailure("kiss-o'-death reply (stratum 0)".to_string()));
        }
        if self.originate != sent {
            return Err(Error::TransientSampleFailure(
                "originate timestamp does not match request".to_string(),
            ));
        }
        Ok(())
    }
}

fn transient(context: &str, e: impl Display) -> Error {
    Error::TransientSampleFailure(format!("{}: {}", context, e))
}

/// SNTP reference source
#[derive(Debug, Clone)]
pub struct SntpSource {
    server: String,
    port: u16,
    version: u8,
    timeout: Duration,
}

impl SntpSource {
    pub fn new(server: impl Into<String>, port: u16, version: u8, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            port,
            version,
            timeout,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.server.clone(), config.port, config.version, config.timeout())
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        lookup_host((self.server.as_str(), self.port))
            .await
            .map_err(|e| transient("resolve failed", e))?
            .next()
            .ok_or_else(|| Error::TransientSampleFailure(format!("no address for {}", self.server)))
    }

    async fn exchange(&self) -> Result<Exchange> {
        let addr = self.resolve().await?;
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| transient("bind failed", e))?;
        socket.connect(addr).await.map_err(|e| transient("connect failed", e))?;

        let orig_time = unix_now();
        let sent = NtpTimestamp::from_unix(orig_time);
        socket
            .send(&encode_request(self.version, sent))
            .await
            .map_err(|e| transient("send failed", e))?;

        let mut buf = [0u8; 512];
        let len = socket.recv(&mut buf).await.map_err(|e| transient("receive failed", e))?;
        let dest_time = unix_now();

        let reply = Reply::decode(&buf[..len])?;
        reply.validate(sent)?;
        let exchange = Exchange {
            orig_time,
            recv_time: reply.receive.to_unix(),
            tx_time: reply.transmit.to_unix(),
            dest_time,
            root_dispersion: reply.root_dispersion,
        };
        trace!(
            stratum = reply.stratum,
            leap = reply.leap,
            delay = exchange.delay(),
            "SNTP reply from {}",
            addr
        );
        Ok(exchange)
    }
}

impl TimeSource for SntpSource {
    async fn request(&self) -> Result<Exchange> {
        match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(Error::TransientSampleFailure(format!(
                "no reply within {} ms",
                self.timeout.as_millis()
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answer one request the way a server `offset` seconds ahead would
    fn answer(request: &[u8], now: f64, offset: f64, stratum: u8) -> [u8; PACKET_LEN] {
        let mut reply = [0u8; PACKET_LEN];
        reply[0] = (3 << 3) | MODE_SERVER;
        reply[1] = stratum;
        // 0.5 ms root dispersion
        reply[8..12].copy_from_slice(&32u32.to_be_bytes());
        reply[24..32].copy_from_slice(&request[40..48]);
        let server_now = NtpTimestamp::from_unix(now + offset);
        server_now.write(&mut reply[32..40]);
        server_now.write(&mut reply[40..48]);
        reply
    }

    async fn spawn_server(offset: f64, stratum: u8) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let reply = answer(&buf[..len], unix_now(), offset, stratum);
                let _ = socket.send_to(&reply, peer).await;
            }
        });
        addr
    }

    #[test]
    fn test_request_header_byte() {
        let packet = encode_request(3, NtpTimestamp { seconds: 0, fraction: 0 });
        assert_eq!(packet[0], 0x1B);
        assert_eq!(encode_request(4, NtpTimestamp { seconds: 0, fraction: 0 })[0], 0x23);
    }

    #[test]
    fn test_timestamp_unix_conversion() {
        let t = 1_751_234_567.25;
        let stamp = NtpTimestamp::from_unix(t);
        assert_eq!(u64::from(stamp.seconds), (1_751_234_567 + NTP_UNIX_OFFSET) & 0xFFFF_FFFF);
        assert_eq!(stamp.fraction, 1 << 30);
        assert!((stamp.to_unix() - t).abs() < 1e-6);
    }

    #[test]
    fn test_timestamp_after_era_rollover() {
        // 2040-01-01
        let t = 2_208_988_800.0 + 0.5;
        let stamp = NtpTimestamp::from_unix(t);
        assert!(stamp.seconds < ERA_PIVOT);
        assert!((stamp.to_unix() - t).abs() < 1e-6);
    }

    #[test]
    fn test_reply_validation() {
        let sent = NtpTimestamp::from_unix(1_751_234_567.0);
        let request = encode_request(3, sent);
        let raw = answer(&request, 1_751_234_567.0, 0.25, 2);

        let reply = Reply::decode(&raw).unwrap();
        assert_eq!(reply.mode, MODE_SERVER);
        assert!((reply.root_dispersion - 32.0 / 65_536.0).abs() < 1e-12);
        assert!(reply.validate(sent).is_ok());

        let other = NtpTimestamp::from_unix(1_751_234_568.0);
        assert!(matches!(reply.validate(other), Err(Error::TransientSampleFailure(_))));

        let kiss = Reply::decode(&answer(&request, 1_751_234_567.0, 0.25, 0)).unwrap();
        assert!(kiss.validate(sent).is_err());

        let mut client_mode = raw;
        client_mode[0] = (3 << 3) | MODE_CLIENT;
        assert!(Reply::decode(&client_mode).unwrap().validate(sent).is_err());

        assert!(Reply::decode(&raw[..20]).is_err());
    }

    #[tokio::test]
    async fn test_exchange_against_loopback_server() {
        let addr = spawn_server(0.25, 1).await;
        let source = SntpSource::new("127.0.0.1", addr.port(), 3, Duration::from_millis(500));

        let exchange = source.request().await.unwrap();
        let sample = ntpo_common::Sample::from(exchange);
        assert!((sample.offset - 0.25).abs() < 0.05, "offset {}", sample.offset);
        assert!((exchange.root_dispersion - 32.0 / 65_536.0).abs() < 1e-12);
        assert!(exchange.delay().abs() < 0.05, "delay {}", exchange.delay());
        assert_eq!(source.describe(), format!("127.0.0.1:{}", addr.port()));
    }

    #[tokio::test]
    async fn test_kiss_of_death_is_transient_failure() {
        let addr = spawn_server(0.0, 0).await;
        let source = SntpSource::new("127.0.0.1", addr.port(), 3, Duration::from_millis(500));
        assert!(matches!(source.request().await, Err(Error::TransientSampleFailure(_))));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let source = SntpSource::new("127.0.0.1", port, 3, Duration::from_millis(50));

        match source.request().await {
            Err(Error::TransientSampleFailure(msg)) => assert!(msg.contains("50 ms")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
