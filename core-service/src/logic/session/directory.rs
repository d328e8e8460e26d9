use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use uuid::Uuid;

/// Child profile lookups. Profiles are owned outside the pipeline.
#[async_trait]
pub trait ChildDirectory: Send + Sync {
    /// Birth date of the child, if the profile records one
    async fn birth_date(&self, child_id: Uuid) -> Option<NaiveDate>;
}

/// Fixed directory, loaded up front
#[derive(Default)]
pub struct StaticChildDirectory {
    births: RwLock<HashMap<Uuid, NaiveDate>>,
}

impl StaticChildDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, child_id: Uuid, birth: NaiveDate) {
        self.births.write().insert(child_id, birth);
    }
}

#[async_trait]
impl ChildDirectory for StaticChildDirectory {
    async fn birth_date(&self, child_id: Uuid) -> Option<NaiveDate> {
        self.births.read().get(&child_id).copied()
    }
}
