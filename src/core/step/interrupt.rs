//! Cooperative step interruption, checked at chunk boundaries

use crate::domain::{BatchError, Result, StepExecution};
use tokio::sync::watch;

/// Decides whether a running step should stop before its next chunk
#[derive(Debug, Clone, Default)]
pub struct InterruptionPolicy {
    signal: Option<watch::Receiver<bool>>,
}

impl InterruptionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop once `signal` turns `true`
    pub fn with_signal(signal: watch::Receiver<bool>) -> Self {
        Self {
            signal: Some(signal),
        }
    }

    /// # Errors
    ///
    /// Returns `BatchError::Interrupted` when a stop was requested either through
    /// the execution's `terminate_only` flag or the shutdown signal.
    pub fn check(&self, execution: &StepExecution) -> Result<()> {
        if execution.terminate_only {
            return Err(BatchError::Interrupted(
                "step marked terminate only".to_string(),
            ));
        }
        if let Some(signal) = &self.signal {
            if *signal.borrow() {
                return Err(BatchError::Interrupted(
                    "shutdown signal received".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepName;

    fn execution() -> StepExecution {
        StepExecution::new(StepName::new("interrupt-test").unwrap())
    }

    #[test]
    fn test_no_signal_never_interrupts() {
        assert!(InterruptionPolicy::new().check(&execution()).is_ok());
    }

    #[test]
    fn test_terminate_only_interrupts() {
        let mut execution = execution();
        execution.set_terminate_only();
        assert!(matches!(
            InterruptionPolicy::new().check(&execution),
            Err(BatchError::Interrupted(_))
        ));
    }

    #[test]
    fn test_signal_interrupts_once_raised() {
        let (tx, rx) = watch::channel(false);
        let policy = InterruptionPolicy::with_signal(rx);
        let execution = execution();

        assert!(policy.check(&execution).is_ok());
        tx.send(true).unwrap();
        assert!(policy.check(&execution).is_err());
    }
}
