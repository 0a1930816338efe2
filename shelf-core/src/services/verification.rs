//! Verification service - supervised registry lookups
//!
//! Each lookup runs on tokio's blocking pool and is stamped with a
//! generation number. Starting a new lookup (or invalidating) aborts the
//! one in flight; an answer that arrives for an old generation is
//! reported as `Superseded` and never replaces newer state.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;

use crate::domain::result::{Error, Result};
use crate::ports::{RegistryLookup, RegistryStudent, StudentRegistry};

/// A registry answer the librarian has seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedStudent {
    pub record: RegistryStudent,
    pub verified_at: DateTime<Utc>,
}

impl VerifiedStudent {
    pub fn admission_number(&self) -> &str {
        &self.record.admission_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Verified(VerifiedStudent),
    /// The registry has no such student
    NotFound,
    /// A newer lookup or an edit made this answer irrelevant
    Superseded,
    /// No registry is configured
    Disabled,
}

#[derive(Default)]
struct State {
    generation: u64,
    in_flight: Option<AbortHandle>,
    verified: Option<VerifiedStudent>,
}

pub struct VerificationService {
    registry: Option<Arc<dyn StudentRegistry>>,
    state: Mutex<State>,
}

impl VerificationService {
    pub fn new(registry: Option<Arc<dyn StudentRegistry>>) -> Self {
        Self {
            registry,
            state: Mutex::new(State::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.is_some()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::store("verification state lock poisoned"))
    }

    /// Look up an admission number, cancelling any lookup still running.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn lookup(&self, admission_number: &str) -> Result<LookupOutcome> {
        let Some(registry) = self.registry.clone() else {
            return Ok(LookupOutcome::Disabled);
        };
        let admission_number = admission_number.trim().to_string();

        // The guard is released before the await below
        let (generation, handle) = {
            let mut state = self.lock()?;
            state.generation += 1;
            if let Some(previous) = state.in_flight.take() {
                previous.abort();
            }
            state.verified = None;
            let handle =
                tokio::task::spawn_blocking(move || registry.verify_student(&admission_number));
            state.in_flight = Some(handle.abort_handle());
            (state.generation, handle)
        };

        let joined = handle.await;

        let mut state = self.lock()?;
        if state.generation != generation {
            return Ok(LookupOutcome::Superseded);
        }
        state.in_flight = None;

        match joined {
            Ok(Ok(RegistryLookup::Found(record))) => {
                let verified = VerifiedStudent {
                    record,
                    verified_at: Utc::now(),
                };
                state.verified = Some(verified.clone());
                Ok(LookupOutcome::Verified(verified))
            }
            Ok(Ok(RegistryLookup::NotFound)) => Ok(LookupOutcome::NotFound),
            Ok(Err(e)) => Err(e),
            Err(join_error) if join_error.is_cancelled() => Ok(LookupOutcome::Superseded),
            Err(join_error) => Err(Error::RegistryUnavailable(format!(
                "lookup task failed: {}",
                join_error
            ))),
        }
    }

    /// The admission number field changed: forget the verified record and
    /// let any running lookup finish unheard.
    pub fn invalidate(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.generation += 1;
        if let Some(previous) = state.in_flight.take() {
            previous.abort();
        }
        state.verified = None;
        Ok(())
    }

    /// Latest verified record, if any
    pub fn current(&self) -> Result<Option<VerifiedStudent>> {
        Ok(self.lock()?.verified.clone())
    }

    /// The verified record, only if it is for `admission_number`
    pub fn verified_for(&self, admission_number: &str) -> Result<Option<VerifiedStudent>> {
        Ok(self
            .current()?
            .filter(|v| v.admission_number() == admission_number.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::ports::EnrollmentStatus;

    /// Registry that answers from a table, sleeping per admission number
    struct SlowRegistry {
        students: HashMap<String, RegistryStudent>,
        delays: HashMap<String, Duration>,
    }

    impl SlowRegistry {
        fn new() -> Self {
            let mut students = HashMap::new();
            for (adm, name) in [("S100", "Alice"), ("S200", "Brian")] {
                students.insert(
                    adm.to_string(),
                    RegistryStudent {
                        admission_number: adm.to_string(),
                        name: name.to_string(),
                        grade: "Grade 7".to_string(),
                        status: EnrollmentStatus::Active,
                    },
                );
            }
            Self {
                students,
                delays: HashMap::new(),
            }
        }

        fn with_delay(mut self, adm: &str, delay: Duration) -> Self {
            self.delays.insert(adm.to_string(), delay);
            self
        }
    }

    impl StudentRegistry for SlowRegistry {
        fn name(&self) -> &str {
            "slow"
        }

        fn verify_student(&self, admission_number: &str) -> Result<RegistryLookup> {
            if let Some(delay) = self.delays.get(admission_number) {
                std::thread::sleep(*delay);
            }
            Ok(match self.students.get(admission_number) {
                Some(record) => RegistryLookup::Found(record.clone()),
                None => RegistryLookup::NotFound,
            })
        }
    }

    #[test]
    fn test_poisoned_state_is_store_unavailable() {
        let service = Arc::new(VerificationService::new(None));
        let holder = Arc::clone(&service);
        let _ = std::thread::spawn(move || {
            let _guard = holder.state.lock().unwrap();
            panic!("lookup bookkeeping crashed");
        })
        .join();

        let err = service.invalidate().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)), "got {:?}", err);
        assert_eq!(err.kind(), crate::domain::result::ErrorKind::StoreUnavailable);
    }

    #[tokio::test]
    async fn test_disabled_without_registry() {
        let service = VerificationService::new(None);
        assert!(!service.is_enabled());
        assert_eq!(service.lookup("S100").await.unwrap(), LookupOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_lookup_found_and_not_found() {
        let service = VerificationService::new(Some(Arc::new(SlowRegistry::new())));

        match service.lookup(" S100 ").await.unwrap() {
            LookupOutcome::Verified(v) => assert_eq!(v.record.name, "Alice"),
            other => panic!("expected Verified, got {:?}", other),
        }
        assert!(service.verified_for("S100").unwrap().is_some());
        assert!(service.verified_for("S200").unwrap().is_none());

        assert_eq!(service.lookup("S999").await.unwrap(), LookupOutcome::NotFound);
        assert!(service.current().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_lookup_supersedes_slow_one() {
        let registry = SlowRegistry::new().with_delay("S100", Duration::from_millis(300));
        let service = VerificationService::new(Some(Arc::new(registry)));

        let (first, second) = tokio::join!(service.lookup("S100"), service.lookup("S200"));

        assert_eq!(first.unwrap(), LookupOutcome::Superseded);
        assert!(matches!(second.unwrap(), LookupOutcome::Verified(_)));
        let current = service.current().unwrap().unwrap();
        assert_eq!(current.admission_number(), "S200");
    }

    #[tokio::test]
    async fn test_invalidate_discards_in_flight_answer() {
        let registry = SlowRegistry::new().with_delay("S100", Duration::from_millis(200));
        let service = VerificationService::new(Some(Arc::new(registry)));

        let (outcome, _) = tokio::join!(service.lookup("S100"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            service.invalidate().unwrap();
        });

        assert_eq!(outcome.unwrap(), LookupOutcome::Superseded);
        assert!(service.current().unwrap().is_none());
    }
}
