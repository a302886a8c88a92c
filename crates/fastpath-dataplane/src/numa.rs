//! NUMA Topology Probe
//!
//! Read-only discovery of the host's NUMA layout from sysfs.
//!
//! # Design
//!
//! - Best-effort: a missing or unreadable topology yields
//!   `available = false` with empty maps, never an error
//! - Probed once at startup to pick the pool's node hint and populate
//!   telemetry; never touched on the packet path
//! - The sysfs root is injectable so containers and tests can point it
//!   at a synthetic tree

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default sysfs location of NUMA node directories
pub const SYSFS_NODE_ROOT: &str = "/sys/devices/system/node";

/// Upper bound on a single cpulist range, guards against corrupt input
const MAX_CPU_RANGE: u32 = 1 << 16;

/// Immutable snapshot of the host NUMA topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NumaInfo {
    /// Topology was discovered
    pub available: bool,
    /// Number of memory nodes
    pub node_count: usize,
    /// Node of the CPU the probe ran on
    pub current_node: u32,
    /// CPU ids per node
    pub cpus_per_node: BTreeMap<u32, Vec<u32>>,
    /// Total memory per node in MiB
    pub memory_mb: BTreeMap<u32, u64>,
}

impl NumaInfo {
    /// Snapshot for hosts without exposed topology
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Node owning `cpu`, if known
    pub fn node_of_cpu(&self, cpu: u32) -> Option<u32> {
        self.cpus_per_node
            .iter()
            .find(|(_, cpus)| cpus.contains(&cpu))
            .map(|(node, _)| *node)
    }

    /// Whether `node` exists in this topology
    pub fn has_node(&self, node: u32) -> bool {
        self.cpus_per_node.contains_key(&node) || self.memory_mb.contains_key(&node)
    }

    /// Sum of per-node memory in MiB
    pub fn total_memory_mb(&self) -> u64 {
        self.memory_mb.values().sum()
    }
}

/// Query the host topology from the default sysfs root
pub fn numa_info() -> NumaInfo {
    NumaProbe::default().probe()
}

/// sysfs-backed topology reader
#[derive(Debug, Clone)]
pub struct NumaProbe {
    root: PathBuf,
}

impl Default for NumaProbe {
    fn default() -> Self {
        Self::new(SYSFS_NODE_ROOT)
    }
}

impl NumaProbe {
    /// Probe rooted at `root` (normally [`SYSFS_NODE_ROOT`])
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build a snapshot; any failure degrades to [`NumaInfo::unavailable`]
    pub fn probe(&self) -> NumaInfo {
        let nodes = self.node_ids();
        if nodes.is_empty() {
            tracing::debug!(root = %self.root.display(), "no NUMA topology exposed");
            return NumaInfo::unavailable();
        }

        let mut cpus_per_node = BTreeMap::new();
        let mut memory_mb = BTreeMap::new();

        for node in &nodes {
            let dir = self.root.join(format!("node{}", node));

            let cpus = fs::read_to_string(dir.join("cpulist"))
                .map(|s| parse_cpulist(&s))
                .unwrap_or_default();
            cpus_per_node.insert(*node, cpus);

            let mem = fs::read_to_string(dir.join("meminfo"))
                .ok()
                .and_then(|s| parse_meminfo_total_kb(&s))
                .map(|kb| kb / 1024)
                .unwrap_or(0);
            memory_mb.insert(*node, mem);
        }

        let mut info = NumaInfo {
            available: true,
            node_count: nodes.len(),
            current_node: 0,
            cpus_per_node,
            memory_mb,
        };

        if let Some(node) = current_cpu().and_then(|cpu| info.node_of_cpu(cpu)) {
            info.current_node = node;
        }

        info
    }

    fn node_ids(&self) -> Vec<u32> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut ids: Vec<u32> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| node_id(&e.path()))
            .collect();
        ids.sort_unstable();
        ids
    }
}

fn node_id(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("node")?
        .parse()
        .ok()
}

/// Parse the kernel cpulist format (`0-3,8,10-11`); malformed tokens are skipped
pub fn parse_cpulist(s: &str) -> Vec<u32> {
    let mut cpus = Vec::new();

    for token in s.trim().split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.split_once('-') {
            Some((lo, hi)) => {
                let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) else {
                    continue;
                };
                if hi < lo || hi - lo > MAX_CPU_RANGE {
                    continue;
                }
                cpus.extend(lo..=hi);
            }
            None => {
                if let Ok(cpu) = token.parse() {
                    cpus.push(cpu);
                }
            }
        }
    }

    cpus.sort_unstable();
    cpus.dedup();
    cpus
}

/// Extract `MemTotal` (kB) from a per-node meminfo file
fn parse_meminfo_total_kb(s: &str) -> Option<u64> {
    s.lines().find_map(|line| {
        let mut fields = line.split_whitespace().skip_while(|f| *f != "MemTotal:");
        fields.next()?;
        fields.next()?.parse().ok()
    })
}

#[cfg(target_os = "linux")]
fn current_cpu() -> Option<u32> {
    // SAFETY: sched_getcpu has no preconditions
    let cpu = unsafe { libc::sched_getcpu() };
    u32::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
fn current_cpu() -> Option<u32> {
    None
}
