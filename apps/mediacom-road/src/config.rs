use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::broker::RelayPolicy;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: IpAddr,
    pub log_filter: String,
    pub same_room_signals: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env::var("MEDIACOM_ROAD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            bind: env::var("MEDIACOM_ROAD_BIND")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.bind),
            log_filter: env::var("RUST_LOG").unwrap_or(defaults.log_filter),
            same_room_signals: env::var("MEDIACOM_SAME_ROOM_SIGNALS")
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.same_room_signals),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn relay_policy(&self) -> RelayPolicy {
        RelayPolicy {
            same_room_only: self.same_room_signals,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            log_filter: "info,mediacom_road=debug".to_string(),
            same_room_signals: false,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
