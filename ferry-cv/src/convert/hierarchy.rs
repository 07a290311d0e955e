//! Period parent resolution
//!
//! Periods are inserted with parent 0 because a child may be converted before
//! its parent. Once every period exists, each one carrying a legacy parent
//! is pointed at the parent's new id.

use tracing::warn;

use super::batch::{HasMorePolicy, PageReport};
use super::entity::{EntityKind, ObjectKind, PERIOD_PARENT_KEY};
use super::error::ConvertError;
use super::id_cache::IdCache;
use crate::destination::DestinationStore;

pub async fn resolve_period_parents(
    store: &dyn DestinationStore,
    offset: i64,
    page_size: i64,
) -> Result<PageReport, ConvertError> {
    let periods = store
        .objects_with_meta(ObjectKind::Entity, PERIOD_PARENT_KEY, offset, page_size)
        .await?;

    let mut report = PageReport {
        rows: periods.len(),
        has_more: HasMorePolicy::PageFullness.has_more(periods.len(), page_size),
        ..PageReport::default()
    };
    let mut cache = IdCache::new(store);

    for (period, legacy_parent) in &periods {
        let parent = cache.resolve_key(EntityKind::Period, legacy_parent).await?;
        if parent == 0 || parent == *period {
            warn!(period, legacy_parent = %legacy_parent, "Parent period was not converted");
            report.skipped += 1;
            continue;
        }

        store.set_parent(*period, parent).await?;
        report.converted += 1;
    }

    Ok(report)
}
