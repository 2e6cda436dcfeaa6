//! User-visible "last error" per concern.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    Voice,
    Generation,
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Concern::Voice => "voice",
            Concern::Generation => "generation",
        })
    }
}

/// One dismissible message per concern. A newer error replaces the older one.
#[derive(Debug, Default)]
pub struct ErrorSlots {
    slots: Mutex<HashMap<Concern, String>>,
}

impl ErrorSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Concern, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report(&self, concern: Concern, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%concern, error = %message, "Error reported");
        self.lock().insert(concern, message);
    }

    pub fn get(&self, concern: Concern) -> Option<String> {
        self.lock().get(&concern).cloned()
    }

    pub fn dismiss(&self, concern: Concern) -> Option<String> {
        self.lock().remove(&concern)
    }

    /// Clear the slot, then run `restart`.
    pub fn retry<R>(&self, concern: Concern, restart: impl FnOnce() -> R) -> R {
        self.dismiss(concern);
        tracing::debug!(%concern, "Retrying");
        restart()
    }

    /// All current errors, voice first.
    pub fn active(&self) -> Vec<(Concern, String)> {
        let slots = self.lock();
        [Concern::Voice, Concern::Generation]
            .into_iter()
            .filter_map(|c| slots.get(&c).map(|m| (c, m.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_independent() {
        let slots = ErrorSlots::new();
        slots.report(Concern::Voice, "mic denied");
        slots.report(Concern::Generation, "timeout");
        slots.report(Concern::Generation, "bad reply");

        assert_eq!(slots.get(Concern::Generation).as_deref(), Some("bad reply"));
        assert_eq!(slots.dismiss(Concern::Voice).as_deref(), Some("mic denied"));
        assert_eq!(slots.get(Concern::Voice), None);
        assert_eq!(slots.active(), [(Concern::Generation, "bad reply".to_string())]);
    }

    #[test]
    fn test_retry_clears_before_restart() {
        let slots = ErrorSlots::new();
        slots.report(Concern::Voice, "no device");

        let seen = slots.retry(Concern::Voice, || slots.get(Concern::Voice));

        assert_eq!(seen, None);
    }

    #[test]
    fn test_restart_can_report_again() {
        let slots = ErrorSlots::new();
        slots.report(Concern::Voice, "first");
        slots.retry(Concern::Voice, || slots.report(Concern::Voice, "second"));
        assert_eq!(slots.get(Concern::Voice).as_deref(), Some("second"));
    }
}
