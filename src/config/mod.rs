use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FORBIDDEN_APPS: &str = "firefox,hotspotshield,discord,slack,spotify,zen";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub viewer: ViewerConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_file: PathBuf,
}

/// Push-transport limits applied to every viewer connection
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub queue_capacity: usize,
    /// Read-idle window; a viewer silent for longer is treated as dead
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
    pub max_message_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub forbidden_apps: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            queue_capacity: 256,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait: Duration::from_secs(10),
            max_message_bytes: 512,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            forbidden_apps: parse_list(DEFAULT_FORBIDDEN_APPS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = ViewerConfig::default();
        let pong_wait =
            Duration::from_secs(env_or("VIEWER_PONG_WAIT_SECS", defaults.pong_wait.as_secs()).max(1));
        let ping_period = Duration::from_secs(env_or(
            "VIEWER_PING_PERIOD_SECS",
            (pong_wait * 9 / 10).as_secs(),
        ));

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 8080),
            },
            storage: StorageConfig {
                data_file: env::var("DATA_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("rooms.json")),
            },
            viewer: ViewerConfig {
                queue_capacity: env_or("VIEWER_QUEUE_CAPACITY", defaults.queue_capacity).max(1),
                pong_wait,
                ping_period: clamp_ping_period(ping_period, pong_wait),
                write_wait: Duration::from_secs(
                    env_or("VIEWER_WRITE_WAIT_SECS", defaults.write_wait.as_secs()).max(1),
                ),
                max_message_bytes: env_or("VIEWER_MAX_MESSAGE_BYTES", defaults.max_message_bytes),
            },
            scan: ScanConfig {
                forbidden_apps: parse_list(
                    &env::var("FORBIDDEN_APPS").unwrap_or_else(|_| DEFAULT_FORBIDDEN_APPS.to_string()),
                ),
            },
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

/// First non-loopback IPv4 the host would route outward from, for sharing
/// with participants on the same network. No packet is sent.
pub async fn lan_ipv4() -> Option<Ipv4Addr> {
    let socket = tokio::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).await.ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

fn env_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Keepalive pings must fire strictly inside the read-idle window.
fn clamp_ping_period(ping_period: Duration, pong_wait: Duration) -> Duration {
    if ping_period.is_zero() || ping_period >= pong_wait {
        pong_wait * 9 / 10
    } else {
        ping_period
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
