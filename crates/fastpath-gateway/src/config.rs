//! Gateway configuration from `FASTPATH_*` environment variables

use fastpath_common::{FastpathError, FastpathResult};
use fastpath_dataplane::{NumaInfo, PoolConfig};
use fastpath_xdp::{XdpConfig, XdpMode};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Pool settings; `numa_node` is `None` unless set explicitly
    pub pool: PoolConfig,
    pub xdp: XdpConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            pool: PoolConfig::default(),
            xdp: XdpConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> FastpathResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> FastpathResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FASTPATH_LISTEN_ADDR") {
            config.listen_addr = parse("FASTPATH_LISTEN_ADDR", &v)?;
        }

        if let Some(v) = get("FASTPATH_POOL_SLOTS") {
            config.pool.num_slots = parse("FASTPATH_POOL_SLOTS", &v)?;
        }
        if let Some(v) = get("FASTPATH_POOL_SLOT_SIZE") {
            config.pool.slot_size = parse("FASTPATH_POOL_SLOT_SIZE", &v)?;
        }
        if let Some(v) = get("FASTPATH_POOL_NUMA_NODE") {
            config.pool.numa_node = Some(parse("FASTPATH_POOL_NUMA_NODE", &v)?);
        }
        if let Some(v) = get("FASTPATH_POOL_HUGEPAGES") {
            config.pool.use_hugepages = parse_bool("FASTPATH_POOL_HUGEPAGES", &v)?;
        }
        if let Some(v) = get("FASTPATH_POOL_PREALLOCATE") {
            config.pool.preallocate = parse_bool("FASTPATH_POOL_PREALLOCATE", &v)?;
        }

        if let Some(v) = get("FASTPATH_XDP_ENABLED") {
            config.xdp.enabled = parse_bool("FASTPATH_XDP_ENABLED", &v)?;
        }
        if let Some(v) = get("FASTPATH_XDP_MODE") {
            config.xdp.mode = v.parse::<XdpMode>()?;
        }
        if let Some(v) = get("FASTPATH_XDP_INTERFACE") {
            config.xdp.interface = v.trim().to_string();
        }

        config
            .pool
            .validate()
            .map_err(|e| FastpathError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Pool config for this host: without an explicit node, prefer the
    /// node the service started on
    pub fn pool_config(&self, numa: &NumaInfo) -> PoolConfig {
        let mut pool = self.pool.clone();
        if pool.numa_node.is_none() && numa.available {
            pool.numa_node = Some(numa.current_node);
        }
        pool
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> FastpathResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FastpathError::Config(format!("{}={:?}: {}", key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> FastpathResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FastpathError::Config(format!(
            "{}={:?}: expected a boolean",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert!(config.pool.preallocate);
        assert!(!config.xdp.enabled);
    }

    #[test]
    fn test_full_environment() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("FASTPATH_LISTEN_ADDR", "127.0.0.1:9000"),
            ("FASTPATH_POOL_SLOTS", "4096"),
            ("FASTPATH_POOL_SLOT_SIZE", "9216"),
            ("FASTPATH_POOL_NUMA_NODE", "1"),
            ("FASTPATH_POOL_HUGEPAGES", "true"),
            ("FASTPATH_POOL_PREALLOCATE", "off"),
            ("FASTPATH_XDP_ENABLED", "1"),
            ("FASTPATH_XDP_MODE", "skb"),
            ("FASTPATH_XDP_INTERFACE", " ens5 "),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.pool.num_slots, 4096);
        assert_eq!(config.pool.slot_size, 9216);
        assert_eq!(config.pool.numa_node, Some(1));
        assert!(config.pool.use_hugepages);
        assert!(!config.pool.preallocate);
        assert!(config.xdp.enabled);
        assert_eq!(config.xdp.mode, XdpMode::Generic);
        assert_eq!(config.xdp.interface, "ens5");
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("FASTPATH_LISTEN_ADDR", "not-an-addr"),
            ("FASTPATH_POOL_SLOTS", "-3"),
            ("FASTPATH_POOL_SLOTS", "0"),
            ("FASTPATH_POOL_HUGEPAGES", "maybe"),
        ] {
            let err = GatewayConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, FastpathError::Config(_)), "{}={}", key, value);
        }

        let err = GatewayConfig::from_lookup(lookup(&[("FASTPATH_XDP_MODE", "turbo")])).unwrap_err();
        assert!(matches!(err, FastpathError::Xdp(_)));
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = GatewayConfig::from_lookup(lookup(&[("FASTPATH_POOL_SLOTS", "  ")])).unwrap();
        assert_eq!(config.pool.num_slots, PoolConfig::default().num_slots);
    }

    #[test]
    fn test_pool_config_numa_hint() {
        let mut numa = NumaInfo::unavailable();
        let config = GatewayConfig::default();
        assert_eq!(config.pool_config(&numa).numa_node, None);

        numa.available = true;
        numa.node_count = 2;
        numa.current_node = 1;
        assert_eq!(config.pool_config(&numa).numa_node, Some(1));

        let mut explicit = GatewayConfig::default();
        explicit.pool.numa_node = Some(0);
        assert_eq!(explicit.pool_config(&numa).numa_node, Some(0));
    }
}
