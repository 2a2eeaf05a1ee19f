//! Chain statistics sampled from the node

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest view of the chain as seen by the local node
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStatistics {
    pub block_number: u64,
    pub peer_count: u64,
    /// Samples taken so far
    pub samples: u64,
    /// Samples where the node could not be reached
    pub failed_samples: u64,
    /// Blocks produced since the first sample
    pub blocks_observed: u64,
    pub last_sample: Option<DateTime<Utc>>,
}

impl NetworkStatistics {
    /// Fold a successful sample in
    pub fn record(&mut self, block_number: u64, peer_count: u64) {
        if self.samples > 0 && block_number > self.block_number {
            self.blocks_observed += block_number - self.block_number;
        }
        self.block_number = block_number;
        self.peer_count = peer_count;
        self.samples += 1;
        self.last_sample = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.failed_samples += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_observed_counts_from_first_sample() {
        let mut stats = NetworkStatistics::default();

        stats.record(100, 2);
        assert_eq!(stats.blocks_observed, 0);

        stats.record(104, 3);
        stats.record(104, 3);
        assert_eq!(stats.blocks_observed, 4);
        assert_eq!(stats.peer_count, 3);
        assert_eq!(stats.samples, 3);
        assert!(stats.last_sample.is_some());
    }
}
