pub mod clock;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod hub;
pub mod ledger;
pub mod model;
pub mod savings;
pub mod store;
pub mod uptime;

pub use clock::{Clock, SystemClock};
pub use dashboard::{ActivityRequest, Dashboard, DashboardOptions};
pub use error::DashError;
pub use filter::TaskFilter;
pub use hub::{ServerEvent, Snapshot, SubscriberId, Subscription};
pub use model::{AgentStatus, FleetConfig, StatusRecord, StatusRegister, StatusReport};
pub use savings::SavingRequest;
pub use store::{Document, Store, StoreError};

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use serde_json::Value;

    use crate::clock::Clock;
    use crate::store::{Document, Store, StoreError};

    /// Fixed starting instant used across tests: 2026-03-01 12:00:00 UTC.
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// A three-agent fleet in two departments.
    pub fn sample_fleet() -> Value {
        serde_json::json!({
            "agents": {
                "mason": { "name": "Mason", "role": "Builder", "department": "engineering" },
                "surge": { "name": "Surge", "role": "Deployer", "department": "engineering" },
                "quill": { "name": "Quill", "role": "Writer", "department": "content" }
            },
            "departments": {
                "engineering": { "name": "Engineering", "agents": ["mason", "surge"] },
                "content": { "name": "Content", "agents": ["quill"] }
            }
        })
    }

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(at: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(at),
            }
        }

        pub fn advance(&self, by: TimeDelta) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += by;
        }

        pub fn set(&self, at: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// In-memory store that records every successful write and can be
    /// switched into a failing mode.
    #[derive(Default)]
    pub struct MemoryStore {
        docs: Mutex<HashMap<Document, Value>>,
        writes: Mutex<Vec<Document>>,
        failing: AtomicBool,
    }

    impl MemoryStore {
        pub fn with_config(config: Value) -> Self {
            let store = Self::default();
            store.insert(Document::Config, config);
            store
        }

        pub fn insert(&self, doc: Document, value: Value) {
            self.docs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(doc, value);
        }

        pub fn get(&self, doc: Document) -> Option<Value> {
            self.docs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&doc)
                .cloned()
        }

        /// Documents written so far, in write order.
        pub fn writes(&self) -> Vec<Document> {
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl Store for MemoryStore {
        fn load(&self, doc: Document) -> Result<Option<Value>, StoreError> {
            Ok(self.get(doc))
        }

        fn save(&self, doc: Document, value: &Value) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Io {
                    doc,
                    source: std::io::Error::other("store switched to failing"),
                });
            }
            self.insert(doc, value.clone());
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(doc);
            Ok(())
        }
    }
}
