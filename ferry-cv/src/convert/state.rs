//! Conversion checkpoint
//!
//! The whole run lives in a [`StepState`] persisted between invocations.
//! [`SettingsStepStore`] keeps it in the service `settings` table.

use async_trait::async_trait;
use ferry_common::db::{delete_settings, get_setting, set_setting};
use ferry_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Mutex;

use super::entity::EntityKind;

pub const STEP_KEY: &str = "conversion.step";
pub const OFFSET_KEY: &str = "conversion.offset";
pub const LAST_QUERY_KEY: &str = "conversion.lastQuery";
pub const SKIPPED_KEY: &str = "conversion.skipped";

/// The nine conversion steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Clean = 1,
    Users = 2,
    Passwords = 3,
    Periods = 4,
    PeriodHierarchy = 5,
    Accounts = 6,
    Tags = 7,
    Records = 8,
    Done = 9,
}

impl Step {
    pub const FIRST: Step = Step::Clean;

    pub fn from_number(n: u8) -> Option<Self> {
        Some(match n {
            1 => Step::Clean,
            2 => Step::Users,
            3 => Step::Passwords,
            4 => Step::Periods,
            5 => Step::PeriodHierarchy,
            6 => Step::Accounts,
            7 => Step::Tags,
            8 => Step::Records,
            9 => Step::Done,
            _ => return None,
        })
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Step {
        Step::from_number(self.number() + 1).unwrap_or(Step::Done)
    }

    /// Entity kind converted by this step, for the steps that page through the source
    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Step::Users => Some(EntityKind::User),
            Step::Periods => Some(EntityKind::Period),
            Step::Accounts => Some(EntityKind::Account),
            Step::Tags => Some(EntityKind::Tag),
            Step::Records => Some(EntityKind::Record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub step: u8,
    pub offset: i64,
    pub last_query: String,
    /// Rows skipped over the whole run
    pub skipped: u64,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            step: Step::FIRST.number(),
            offset: 0,
            last_query: String::new(),
            skipped: 0,
        }
    }
}

impl StepState {
    /// Move to the following step at offset 0
    pub fn advance(&mut self, from: Step) {
        self.step = from.next().number();
        self.offset = 0;
    }
}

#[async_trait]
pub trait StepStore: Send + Sync {
    /// Persisted state, or the initial state when nothing is stored
    async fn load(&self) -> Result<StepState>;

    async fn save(&self, state: &StepState) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub struct SettingsStepStore {
    db: SqlitePool,
}

impl SettingsStepStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StepStore for SettingsStepStore {
    async fn load(&self) -> Result<StepState> {
        let defaults = StepState::default();
        Ok(StepState {
            step: get_setting(&self.db, STEP_KEY).await?.unwrap_or(defaults.step),
            offset: get_setting(&self.db, OFFSET_KEY).await?.unwrap_or(defaults.offset),
            last_query: get_setting(&self.db, LAST_QUERY_KEY)
                .await?
                .unwrap_or(defaults.last_query),
            skipped: get_setting(&self.db, SKIPPED_KEY).await?.unwrap_or(defaults.skipped),
        })
    }

    async fn save(&self, state: &StepState) -> Result<()> {
        set_setting(&self.db, STEP_KEY, state.step).await?;
        set_setting(&self.db, OFFSET_KEY, state.offset).await?;
        set_setting(&self.db, LAST_QUERY_KEY, &state.last_query).await?;
        set_setting(&self.db, SKIPPED_KEY, state.skipped).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        delete_settings(&self.db, &[STEP_KEY, OFFSET_KEY, LAST_QUERY_KEY, SKIPPED_KEY]).await
    }
}

/// In-process store for dry runs and tests
#[derive(Default)]
pub struct MemoryStepStore {
    state: Mutex<Option<StepState>>,
}

impl MemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a state is currently stored
    pub fn is_saved(&self) -> bool {
        self.state.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl StepStore for MemoryStepStore {
    async fn load(&self) -> Result<StepState> {
        let guard = self
            .state
            .lock()
            .map_err(|e| ferry_common::Error::Internal(format!("step store poisoned: {}", e)))?;
        Ok(guard.clone().unwrap_or_default())
    }

    async fn save(&self, state: &StepState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| ferry_common::Error::Internal(format!("step store poisoned: {}", e)))?;
        *guard = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| ferry_common::Error::Internal(format!("step store poisoned: {}", e)))?;
        *guard = None;
        Ok(())
    }
}
