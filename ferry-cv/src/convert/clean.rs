//! Removal of previously imported data
//!
//! An object counts as imported when it carries any metadata key under the
//! converter namespace. Objects created by other means are never touched.

use tracing::debug;

use super::batch::{HasMorePolicy, PageReport};
use super::entity::ObjectKind;
use super::error::ConvertError;
use crate::destination::DestinationStore;

/// Entities first so relationships never outlive their terms
const CLEAN_ORDER: [ObjectKind; 3] = [ObjectKind::Entity, ObjectKind::Term, ObjectKind::User];

/// Delete up to `page_size` imported objects
///
/// Deleted objects leave the imported set, so every call reads from the top
/// of what remains; the caller's offset only numbers the progress line.
pub async fn clean(store: &dyn DestinationStore, page_size: i64) -> Result<PageReport, ConvertError> {
    let mut removed = 0usize;

    for object in CLEAN_ORDER {
        let remaining = page_size - removed as i64;
        if remaining <= 0 {
            break;
        }

        let ids = store.imported_objects(object, remaining).await?;
        for id in ids {
            store.delete_object(object, id).await?;
            removed += 1;
        }
    }

    debug!(removed, "Clean page complete");
    Ok(PageReport {
        rows: removed,
        converted: removed,
        has_more: HasMorePolicy::PageFullness.has_more(removed, page_size),
        ..PageReport::default()
    })
}
