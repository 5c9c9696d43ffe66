use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::paxos::mode::ConsensusMode;
use crate::paxos::types::ReplicaId;
use crate::util::errors::{PaxosError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaxosConfig {
    /// Ordinal of this replica
    pub replica_id: ReplicaId,

    /// Number of replicas in the configuration
    pub replicas: usize,

    /// Pipeline width: slots the leader may have in flight past the adu
    pub alpha: u64,

    /// Phase 1 retry timeout in milliseconds (e.g., 500)
    pub phase1_timeout_ms: u64,

    /// Phase 2 resend timeout in milliseconds (e.g., 50)
    /// Should be much less than the phase 1 timeout
    pub phase2_timeout_ms: u64,

    /// Unacknowledged resends of a slot before a new round is started
    pub resend_threshold: u32,

    /// How long a learner waits for a catch-up response before asking again
    pub catchup_timeout_ms: u64,

    /// Decided slots kept below the frontier for catch-up
    pub retention: u64,

    /// Bounded mailbox size of each actor
    pub mailbox_capacity: usize,

    pub mode: ConsensusMode,
}

impl PaxosConfig {
    pub fn quorum(&self) -> usize {
        self.replicas / 2 + 1
    }

    pub fn phase1_timeout(&self) -> Duration {
        Duration::from_millis(self.phase1_timeout_ms)
    }

    pub fn phase2_timeout(&self) -> Duration {
        Duration::from_millis(self.phase2_timeout_ms)
    }

    pub fn catchup_timeout(&self) -> Duration {
        Duration::from_millis(self.catchup_timeout_ms)
    }

    /// Same settings, for another replica of the cluster
    pub fn for_replica(&self, replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.replicas == 0 {
            return Err("replicas must be at least 1".to_string());
        }

        if self.replica_id >= self.replicas {
            return Err(format!(
                "replica_id {} out of range for {} replicas",
                self.replica_id, self.replicas
            ));
        }

        if self.alpha == 0 {
            return Err("alpha must be positive".to_string());
        }

        if self.phase2_timeout_ms == 0 || self.phase2_timeout_ms >= self.phase1_timeout_ms {
            return Err("phase2_timeout must be positive and less than phase1_timeout".to_string());
        }

        if self.retention < self.alpha {
            return Err("retention must cover at least one pipeline window".to_string());
        }

        if self.mailbox_capacity == 0 {
            return Err("mailbox_capacity must be positive".to_string());
        }

        Ok(())
    }
}

impl Default for PaxosConfig {
    fn default() -> Self {
        Self {
            replica_id: 0,
            replicas: 3,
            alpha: 3,
            phase1_timeout_ms: 500,
            phase2_timeout_ms: 50,
            resend_threshold: 10,
            catchup_timeout_ms: 200,
            retention: 1024,
            mailbox_capacity: 1024,
            mode: ConsensusMode::Plain,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Batching window in milliseconds
    pub batch_window_ms: u64,
    /// Maximum commands per batch
    pub max_batch_size: usize,
}

impl ClientConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 10,
            max_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paxos: PaxosConfig,
    pub client: ClientConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;

        config.paxos.validate().map_err(PaxosError::InvalidConfig)?;

        Ok(config)
    }
}
