//! Metric point domain model — see spec.md §3 "Metric Point" and §4.5.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single telemetry sample for one agent at one point in time.
///
/// Append-only: the metrics store never updates a row, only inserts and
/// bulk-deletes by retention sweep. Percentage fields are clamped to
/// `[0,100]` by `new`/`clamp_percentages` rather than trusted from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_bytes: u64,
    pub disk_percent: f64,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
    pub process_count: u32,
    pub network_rx_bytes: Option<u64>,
    pub network_tx_bytes: Option<u64>,
}

impl MetricPoint {
    /// Clamp the three percentage fields to `[0,100]`, as spec.md §3 requires
    /// of the producer.
    pub fn clamp_percentages(&mut self) {
        self.cpu_percent = self.cpu_percent.clamp(0.0, 100.0);
        self.memory_percent = self.memory_percent.clamp(0.0, 100.0);
        self.disk_percent = self.disk_percent.clamp(0.0, 100.0);
    }
}

/// An agent name paired with the metric point collected for it, the unit of
/// work the collector hands to the store.
#[derive(Debug, Clone)]
pub struct AgentMetric {
    pub agent_name: String,
    pub point: MetricPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_percentages_bounds_to_0_100() {
        let mut point = MetricPoint {
            timestamp: Utc::now(),
            cpu_percent: 150.0,
            memory_percent: -5.0,
            memory_used_bytes: 0,
            disk_percent: 42.0,
            load_avg_1: 0.5,
            load_avg_5: 0.4,
            load_avg_15: 0.3,
            process_count: 10,
            network_rx_bytes: None,
            network_tx_bytes: None,
        };
        point.clamp_percentages();
        assert_eq!(point.cpu_percent, 100.0);
        assert_eq!(point.memory_percent, 0.0);
        assert_eq!(point.disk_percent, 42.0);
    }
}
