//! Conversion engine
//!
//! Pages legacy rows into the destination store one request at a time.
//! [`steps::StepController`] is the entry point; everything else is a
//! building block it drives.

pub mod batch;
pub mod clean;
pub mod entity;
pub mod error;
pub mod field_map;
pub mod hierarchy;
pub mod id_cache;
pub mod passwords;
pub mod progress;
pub mod query;
pub mod row;
pub mod state;
pub mod steps;
pub mod transforms;
pub mod value;

pub use batch::{BatchExecutor, HasMorePolicy, PageReport};
pub use entity::EntityKind;
pub use error::{ConfigError, ConvertError};
pub use progress::ProgressMessage;
pub use state::{MemoryStepStore, SettingsStepStore, Step, StepState, StepStore};
pub use steps::{ConversionOptions, StepController};
