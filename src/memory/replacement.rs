//! Victim selection policies for a full cache set

use std::fmt;
use std::str::FromStr;

/// Which block of a full set gets evicted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReplacementPolicy {
    /// Least recently used (hits and insertions both count as a use)
    #[default]
    Lru,
    /// Oldest insertion first, hits don't matter
    Fifo,
    /// Uniformly random way from a seeded generator
    Random,
    /// Always evict way 0
    SlotZero,
}

impl ReplacementPolicy {
    pub const ALL: [ReplacementPolicy; 4] = [
        ReplacementPolicy::Lru,
        ReplacementPolicy::Fifo,
        ReplacementPolicy::Random,
        ReplacementPolicy::SlotZero,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReplacementPolicy::Lru => "lru",
            ReplacementPolicy::Fifo => "fifo",
            ReplacementPolicy::Random => "random",
            ReplacementPolicy::SlotZero => "slot0",
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReplacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(ReplacementPolicy::Lru),
            "fifo" => Ok(ReplacementPolicy::Fifo),
            "random" | "rand" => Ok(ReplacementPolicy::Random),
            "slot0" | "slot-zero" => Ok(ReplacementPolicy::SlotZero),
            _ => Err(format!(
                "Invalid replacement policy: '{}'. Expected 'lru', 'fifo', 'random' or 'slot0'.",
                s
            )),
        }
    }
}
