//! Metric export through the `metrics` facade
//!
//! Every call is a no-op until a recorder is installed (the gateway
//! installs the Prometheus exporter).

use crate::numa::NumaInfo;
use crate::stats::PoolStats;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

/// Register metric descriptions with the active recorder
pub fn describe() {
    describe_gauge!("fastpath_pool_total_slots", "Slots in the memory pool");
    describe_gauge!("fastpath_pool_used_slots", "Slots currently held");
    describe_gauge!("fastpath_pool_free_slots", "Slots on the free-list");
    describe_gauge!("fastpath_pool_peak_usage", "Highest concurrent slot usage");
    describe_gauge!(
        "fastpath_pool_total_memory_bytes",
        Unit::Bytes,
        "Bytes reserved by the pool"
    );
    describe_gauge!("fastpath_pool_utilization", "Used / total slots");
    describe_counter!("fastpath_pool_exhausted_total", "Acquires that found no free slot");
    describe_counter!(
        "fastpath_pool_invalid_release_total",
        "Releases of unknown or already free slots"
    );

    describe_gauge!("fastpath_numa_available", "1 when NUMA topology is exposed");
    describe_gauge!("fastpath_numa_node_count", "NUMA memory nodes");
    describe_gauge!("fastpath_numa_node_memory_mb", "Memory per NUMA node in MiB");
    describe_gauge!("fastpath_numa_node_cpus", "CPUs per NUMA node");

    describe_counter!("fastpath_packets_processed_total", "Packets run through the pipeline");
    describe_counter!("fastpath_packets_completed_total", "Packets that passed every stage");
    describe_counter!("fastpath_packets_dropped_total", "Packets dropped by a stage");
}

/// Mirror a pool snapshot onto gauges
pub fn publish_pool_stats(stats: &PoolStats) {
    gauge!("fastpath_pool_total_slots").set(stats.total_slots as f64);
    gauge!("fastpath_pool_used_slots").set(stats.used_slots as f64);
    gauge!("fastpath_pool_free_slots").set(stats.free_slots as f64);
    gauge!("fastpath_pool_peak_usage").set(stats.peak_usage as f64);
    gauge!("fastpath_pool_total_memory_bytes").set(stats.total_memory as f64);
    gauge!("fastpath_pool_utilization").set(stats.utilization);
}

/// Mirror the NUMA snapshot onto gauges
pub fn publish_numa_info(info: &NumaInfo) {
    gauge!("fastpath_numa_available").set(if info.available { 1.0 } else { 0.0 });
    gauge!("fastpath_numa_node_count").set(info.node_count as f64);

    for (node, mb) in &info.memory_mb {
        gauge!("fastpath_numa_node_memory_mb", "node" => node.to_string()).set(*mb as f64);
    }
    for (node, cpus) in &info.cpus_per_node {
        gauge!("fastpath_numa_node_cpus", "node" => node.to_string()).set(cpus.len() as f64);
    }
}

#[inline]
pub(crate) fn record_pool_exhausted() {
    counter!("fastpath_pool_exhausted_total").increment(1);
}

#[inline]
pub(crate) fn record_invalid_release() {
    counter!("fastpath_pool_invalid_release_total").increment(1);
}

#[inline]
pub(crate) fn record_packet(completed: bool) {
    counter!("fastpath_packets_processed_total").increment(1);
    if completed {
        counter!("fastpath_packets_completed_total").increment(1);
    } else {
        counter!("fastpath_packets_dropped_total").increment(1);
    }
}
