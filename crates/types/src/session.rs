//! Session parameters and quorum arithmetic.

use crate::ReplicaId;

/// Largest replica count a session may have.
pub const MAX_REPLICAS: u32 = 256;

/// Replica count and tolerated faults for one session.
///
/// Construction always clamps: `1 <= n <= MAX_REPLICAS` and
/// `0 <= f <= floor((n - 1) / 3)`. An invalid request is corrected, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionConfig {
    n: u32,
    f: u32,
}

impl SessionConfig {
    /// Create a session config, clamping `n` and `f` into range.
    pub fn new(n: u32, f: u32) -> Self {
        let n = n.clamp(1, MAX_REPLICAS);
        let f = f.min(Self::max_faulty(n));
        Self { n, f }
    }

    /// Create a session config from untrusted signed input (wire payloads, CLI).
    pub fn from_requested(n: i64, f: i64) -> Self {
        let n = u32::try_from(n.max(1)).unwrap_or(u32::MAX);
        let f = u32::try_from(f.max(0)).unwrap_or(u32::MAX);
        Self::new(n, f)
    }

    /// Largest `f` a cluster of `n` replicas can tolerate.
    pub fn max_faulty(n: u32) -> u32 {
        n.saturating_sub(1) / 3
    }

    /// Replica count.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Tolerated faulty replicas.
    pub fn f(&self) -> u32 {
        self.f
    }

    /// Quorum threshold (2f+1).
    pub fn quorum_threshold(&self) -> u32 {
        2 * self.f + 1
    }

    /// Commit progress towards quorum, clamped to `[0, 1]`.
    pub fn quorum_progress(&self, acks: usize) -> f64 {
        (acks as f64 / f64::from(self.quorum_threshold())).clamp(0.0, 1.0)
    }

    /// Whether `acks` acknowledgements reach the quorum threshold.
    pub fn has_quorum(&self, acks: usize) -> bool {
        acks >= self.quorum_threshold() as usize
    }

    /// All replica ids of this session, primary first.
    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> {
        (0..self.n).map(ReplicaId)
    }

    /// Whether `replica` exists in this session.
    pub fn contains(&self, replica: ReplicaId) -> bool {
        replica.0 < self.n
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(4, 1)
    }
}
