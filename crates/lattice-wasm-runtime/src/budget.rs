//! Execution budget configuration for guest calls.
//!
//! Guest invocations are synchronous and blocking; a guest that never
//! returns would otherwise block the calling thread forever. The budget is
//! optional: the default imposes no limit, matching the contract that the
//! bridge itself adds no timeout.

/// Execution budget applied to every guest call on a module.
///
/// # Example
///
/// ```
/// use lattice_wasm_runtime::ExecutionBudget;
///
/// let budget = ExecutionBudget::default()
///     .with_fuel(5_000_000)
///     .with_epoch_interruption(true);
/// assert_eq!(budget.max_fuel, Some(5_000_000));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionBudget {
    /// Maximum fuel (instruction count) per guest call.
    ///
    /// `None` disables fuel metering entirely. When set, the store is
    /// refuelled to this value before every call, and running dry surfaces
    /// as a budget-exhaustion error rather than a generic trap.
    pub max_fuel: Option<u64>,

    /// Enable epoch interruption.
    ///
    /// When enabled, an in-flight guest call can be interrupted from
    /// another thread; the interrupted call also surfaces as budget
    /// exhaustion.
    pub epoch_interruption: bool,
}

impl ExecutionBudget {
    /// Budget with no limits, the default.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Set the per-call fuel limit.
    #[must_use]
    pub fn with_fuel(mut self, max_fuel: u64) -> Self {
        self.max_fuel = Some(max_fuel);
        self
    }

    /// Enable or disable epoch interruption.
    #[must_use]
    pub fn with_epoch_interruption(mut self, enabled: bool) -> Self {
        self.epoch_interruption = enabled;
        self
    }

    /// Whether any limit is configured.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.max_fuel.is_some() || self.epoch_interruption
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let budget = ExecutionBudget::default();
        assert_eq!(budget.max_fuel, None);
        assert!(!budget.epoch_interruption);
        assert!(!budget.is_limited());
    }

    #[test]
    fn test_builder() {
        let budget = ExecutionBudget::unlimited()
            .with_fuel(1_000)
            .with_epoch_interruption(true);
        assert_eq!(budget.max_fuel, Some(1_000));
        assert!(budget.epoch_interruption);
        assert!(budget.is_limited());
    }
}
