//! Drop accounting for dispatched frames

#[cfg(feature = "serde")]
use crate::error::Result;

/// Drop counters kept for every listener
///
/// All counters saturate at `u32::MAX` and only go back to zero on reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DropCounters {
    /// Frames lost to pool exhaustion, oversize or a full queue
    pub dropped: u32,
    /// Truncated frames discarded by the partial policy
    pub partial: u32,
    /// Bytes that did not fit into a pool block
    pub overflowed_bytes: u32,
}

impl DropCounters {
    /// Record a dropped frame
    pub(crate) fn record_drop(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }

    /// Record a discarded truncated frame
    pub(crate) fn record_partial(&mut self) {
        self.partial = self.partial.saturating_add(1);
    }

    /// Record bytes beyond the block size
    pub(crate) fn record_overflow(&mut self, bytes: usize) {
        let bytes = u32::try_from(bytes).unwrap_or(u32::MAX);
        self.overflowed_bytes = self.overflowed_bytes.saturating_add(bytes);
    }

    /// Add another set of counters into this one
    pub(crate) fn accumulate(&mut self, other: &DropCounters) {
        self.dropped = self.dropped.saturating_add(other.dropped);
        self.partial = self.partial.saturating_add(other.partial);
        self.overflowed_bytes = self.overflowed_bytes.saturating_add(other.overflowed_bytes);
    }

    /// Check whether nothing has been recorded
    pub fn is_clear(&self) -> bool {
        *self == DropCounters::default()
    }
}

/// Dispatcher-wide counters
///
/// Holds the sums over all listeners plus frames no listener accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalCounters {
    /// Totals of the per-listener counters
    pub drops: DropCounters,
    /// Frames without a matching listener and no default route
    pub unmatched: u32,
}

impl GlobalCounters {
    pub(crate) fn record_unmatched(&mut self) {
        self.unmatched = self.unmatched.saturating_add(1);
    }
}

/// Counters of one registered listener
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListenerStats {
    /// Identifier in debug notation, `None` for the default route
    pub id: Option<String>,
    /// Whether truncated frames are discarded
    pub drop_partial: bool,
    /// Current counter values
    pub counters: DropCounters,
}

/// Consistent snapshot of every dispatcher counter
///
/// Taken under a single lock acquisition, so global and per-listener values
/// always describe the same set of dispatched frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatchStats {
    /// Dispatcher-wide totals
    pub global: GlobalCounters,
    /// Listeners in registration order, default route last
    pub listeners: Vec<ListenerStats>,
}

impl DispatchStats {
    /// Sum of all per-listener counters
    pub fn listener_totals(&self) -> DropCounters {
        let mut totals = DropCounters::default();
        for listener in &self.listeners {
            totals.accumulate(&listener.counters);
        }
        totals
    }

    /// Check whether every counter is zero
    pub fn is_clear(&self) -> bool {
        self.global.drops.is_clear()
            && self.global.unmatched == 0
            && self.listeners.iter().all(|l| l.counters.is_clear())
    }

    /// Encode the snapshot as a JSON telemetry record
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::DispatchError::serialization(e.to_string()))
    }
}

impl std::fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dropped={} partial={} overflowed_bytes={} unmatched={}",
            self.global.drops.dropped,
            self.global.drops.partial,
            self.global.drops.overflowed_bytes,
            self.global.unmatched
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_saturate() {
        let mut counters = DropCounters {
            dropped: u32::MAX,
            partial: 0,
            overflowed_bytes: u32::MAX - 1,
        };
        counters.record_drop();
        counters.record_overflow(10);
        assert_eq!(counters.dropped, u32::MAX);
        assert_eq!(counters.overflowed_bytes, u32::MAX);

        counters.record_overflow(usize::MAX);
        assert_eq!(counters.overflowed_bytes, u32::MAX);
    }

    #[test]
    fn test_listener_totals() {
        let stats = DispatchStats {
            global: GlobalCounters::default(),
            listeners: vec![
                ListenerStats {
                    id: Some("1".to_string()),
                    drop_partial: false,
                    counters: DropCounters {
                        dropped: 2,
                        partial: 1,
                        overflowed_bytes: 8,
                    },
                },
                ListenerStats {
                    id: None,
                    drop_partial: true,
                    counters: DropCounters {
                        dropped: 1,
                        partial: 0,
                        overflowed_bytes: 0,
                    },
                },
            ],
        };

        let totals = stats.listener_totals();
        assert_eq!(totals.dropped, 3);
        assert_eq!(totals.partial, 1);
        assert_eq!(totals.overflowed_bytes, 8);
        assert!(!stats.is_clear());
    }

    #[test]
    fn test_stats_display() {
        let mut stats = DispatchStats::default();
        stats.global.record_unmatched();
        stats.global.drops.record_drop();
        assert_eq!(
            stats.to_string(),
            "dropped=1 partial=0 overflowed_bytes=0 unmatched=1"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_stats_json() -> Result<()> {
        let mut stats = DispatchStats::default();
        stats.global.record_unmatched();

        let json = stats.to_json()?;
        assert!(json.contains("\"unmatched\":1"));
        let decoded: DispatchStats = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, stats);
        Ok(())
    }
}
