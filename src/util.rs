use std::net::{Ipv4Addr, SocketAddr};

const LISTEN_ADDRESS: &str = "ICMP_EXPORTER_LISTEN_ADDRESS";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

const DEFAULT_PORT: u16 = 9342;

pub fn get_default_listen_address() -> SocketAddr {
    SocketAddr::from((DEFAULT_ADDR, DEFAULT_PORT))
}

/// Listen address from the environment, falling back to `0.0.0.0:9342`
pub fn get_listen_address() -> SocketAddr {
    let addr_from_env = std::env::var(LISTEN_ADDRESS);
    addr_from_env.map_or(get_default_listen_address(), |res| {
        parse_listen_address(&res).unwrap_or(get_default_listen_address())
    })
}

/// Accepts `host:port` as well as the `:port` shorthand.
pub fn parse_listen_address(value: &str) -> Option<SocketAddr> {
    let value = value.trim();
    if let Some(port) = value.strip_prefix(':') {
        return port
            .parse()
            .ok()
            .map(|port| SocketAddr::from((DEFAULT_ADDR, port)));
    }
    value.parse().ok()
}
