//! Step controller
//!
//! Each invocation loads the checkpoint, performs exactly one step action
//! (one page, or a skip), saves the checkpoint and reports a status line.
//!
//! | step | action                     | skipped when          |
//! |------|----------------------------|-----------------------|
//! | 1    | clean imported data        | `clean` unset         |
//! | 2    | convert users              | `convert_users` unset |
//! | 3    | clear legacy passwords     | `convert_users` unset |
//! | 4    | convert periods            |                       |
//! | 5    | resolve period hierarchy   |                       |
//! | 6    | convert accounts           |                       |
//! | 7    | convert tags               |                       |
//! | 8    | convert records            |                       |
//! | 9    | finish, clear checkpoint   |                       |

use tracing::{error, info, warn};

use super::batch::{BatchExecutor, PageReport};
use super::clean::clean;
use super::error::ConvertError;
use super::hierarchy::resolve_period_parents;
use super::passwords::clean_passwords;
use super::progress::ProgressMessage;
use super::state::{Step, StepState, StepStore};
use crate::destination::DestinationStore;
use crate::source::{SourceAdapter, SourceDb};

/// Per-request flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub restart: bool,
    pub clean: bool,
    pub convert_users: bool,
    pub rows_per_page: i64,
}

impl ConversionOptions {
    pub fn skips(&self, step: Step) -> bool {
        match step {
            Step::Clean => !self.clean,
            Step::Users | Step::Passwords => !self.convert_users,
            _ => false,
        }
    }
}

pub struct StepController<'a> {
    states: &'a dyn StepStore,
    store: &'a dyn DestinationStore,
    source: &'a SourceDb,
    adapter: &'a dyn SourceAdapter,
    table_prefix: &'a str,
}

impl<'a> StepController<'a> {
    pub fn new(
        states: &'a dyn StepStore,
        store: &'a dyn DestinationStore,
        source: &'a SourceDb,
        adapter: &'a dyn SourceAdapter,
        table_prefix: &'a str,
    ) -> Self {
        Self {
            states,
            store,
            source,
            adapter,
            table_prefix,
        }
    }

    /// Run one step action and report it
    pub async fn advance(&self, options: &ConversionOptions) -> ProgressMessage {
        match self.try_advance(options).await {
            Ok(message) => message,
            Err(e) => {
                error!("Conversion failed: {}", e);
                ProgressMessage::Error(e.to_string())
            }
        }
    }

    async fn try_advance(&self, options: &ConversionOptions) -> Result<ProgressMessage, ConvertError> {
        let mut state = if options.restart {
            info!("Restarting conversion from the first step");
            StepState::default()
        } else {
            self.states.load().await?
        };

        let step = Step::from_number(state.step).ok_or(ConvertError::InvalidStep(state.step))?;
        let page_size = options.rows_per_page.max(1);
        let offset = state.offset;

        if step == Step::Done {
            self.states.clear().await?;
            info!(skipped = state.skipped, "Conversion complete");
            return Ok(ProgressMessage::Complete);
        }

        if options.skips(step) {
            state.advance(step);
            self.states.save(&state).await?;
            info!(step = step.number(), "Step skipped");
            return Ok(if offset == 0 {
                ProgressMessage::NothingToDo { step }
            } else {
                ProgressMessage::Quiet
            });
        }

        let report = match self.run_step(step, options, offset, page_size).await {
            Ok(report) => report,
            Err(e) if e.is_retryable() => {
                warn!(step = step.number(), offset, "Source query failed: {}", e);
                if let Some(query) = e.failed_query() {
                    state.last_query = query.to_string();
                }
                self.states.save(&state).await?;
                return Ok(ProgressMessage::Retrying {
                    step,
                    from: offset,
                    to: offset + page_size - 1,
                });
            }
            Err(e) => return Err(e),
        };

        if !report.query.is_empty() {
            state.last_query = report.query.clone();
        }
        state.skipped += report.skipped as u64;

        let message = if report.has_more {
            state.offset += page_size;
            ProgressMessage::Working {
                step,
                from: offset,
                to: offset + page_size - 1,
                skipped: report.skipped,
            }
        } else {
            state.advance(step);
            info!(step = step.number(), next = state.step, "Step finished");
            match (offset, report.rows) {
                (0, 0) => ProgressMessage::Empty { step },
                (_, 0) => ProgressMessage::Finished { step },
                (_, rows) => ProgressMessage::Working {
                    step,
                    from: offset,
                    to: offset + rows as i64 - 1,
                    skipped: report.skipped,
                },
            }
        };

        self.states.save(&state).await?;
        Ok(message)
    }

    async fn run_step(
        &self,
        step: Step,
        options: &ConversionOptions,
        offset: i64,
        page_size: i64,
    ) -> Result<PageReport, ConvertError> {
        match step {
            Step::Clean => clean(self.store, page_size).await,
            Step::Passwords => clean_passwords(self.store, offset, page_size).await,
            Step::PeriodHierarchy => resolve_period_parents(self.store, offset, page_size).await,
            Step::Done => Ok(PageReport::empty()),
            Step::Users | Step::Periods | Step::Accounts | Step::Tags | Step::Records => {
                let Some(kind) = step.entity_kind() else {
                    return Ok(PageReport::empty());
                };
                BatchExecutor::new(
                    self.source,
                    self.adapter,
                    self.store,
                    self.table_prefix,
                    options.convert_users,
                )
                .run_page(kind, offset, page_size)
                .await
            }
        }
    }
}
