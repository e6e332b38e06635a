//! Queue configuration.

/// Configuration for a [`CoalescingQueue`](crate::queue::CoalescingQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Name recorded on the queue's tracing spans.
    pub label: String,
    /// Upper bound on batch futures polled concurrently within one flush.
    /// `None` starts every key's batch call at once.
    pub max_in_flight: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            label: String::from("coalescer"),
            max_in_flight: None,
        }
    }
}

impl QueueConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tracing label (builder).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Limit concurrently running batch calls per flush (builder).
    ///
    /// A limit of zero is treated as one.
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit.max(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = QueueConfig::new();
        assert_eq!(config.label, "coalescer");
        assert!(config.max_in_flight.is_none());
    }

    #[test]
    fn config_builder() {
        let config = QueueConfig::new().with_label("users").with_max_in_flight(4);
        assert_eq!(config.label, "users");
        assert_eq!(config.max_in_flight, Some(4));
    }

    #[test]
    fn zero_in_flight_is_clamped() {
        assert_eq!(QueueConfig::new().with_max_in_flight(0).max_in_flight, Some(1));
    }
}
