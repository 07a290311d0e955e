//! One page of conversion for one entity kind

use serde::Serialize;
use tracing::{debug, warn};

use super::entity::{EntityKind, TAG_ACCOUNT_FIELD};
use super::error::ConvertError;
use super::id_cache::IdCache;
use super::query::build_page_query;
use super::row::RowConverter;
use super::value::{legacy_key_string, value_as_i64, ConvertedRow, SourceRow};
use crate::destination::DestinationStore;
use crate::source::{SourceAdapter, SourceDb};

/// Decides whether another page follows the one just processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HasMorePolicy {
    /// A page that came back full may have a successor; a short page is the last
    #[default]
    PageFullness,
}

impl HasMorePolicy {
    pub fn has_more(self, rows: usize, page_size: i64) -> bool {
        match self {
            HasMorePolicy::PageFullness => rows as i64 >= page_size,
        }
    }
}

/// Outcome of one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageReport {
    /// Rows read from the source (or objects visited by a destination-side step)
    pub rows: usize,
    pub converted: usize,
    /// Rows whose conversion or write failed; they are not retried
    pub skipped: usize,
    pub has_more: bool,
    /// Query that produced the page, kept for diagnostics
    pub query: String,
}

impl PageReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

pub struct BatchExecutor<'a> {
    source: &'a SourceDb,
    adapter: &'a dyn SourceAdapter,
    store: &'a dyn DestinationStore,
    table_prefix: &'a str,
    convert_users: bool,
    policy: HasMorePolicy,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        source: &'a SourceDb,
        adapter: &'a dyn SourceAdapter,
        store: &'a dyn DestinationStore,
        table_prefix: &'a str,
        convert_users: bool,
    ) -> Self {
        Self {
            source,
            adapter,
            store,
            table_prefix,
            convert_users,
            policy: HasMorePolicy::default(),
        }
    }

    /// Convert rows `offset .. offset + page_size` of `kind`
    ///
    /// Source failures abort the page before anything is written. Failures
    /// on individual rows are logged and counted; the page still completes.
    pub async fn run_page(
        &self,
        kind: EntityKind,
        offset: i64,
        page_size: i64,
    ) -> Result<PageReport, ConvertError> {
        let map = self.adapter.field_map();
        if !map.has_kind(kind) {
            return Ok(PageReport::empty());
        }

        let query = build_page_query(map, kind, self.table_prefix, offset, page_size)?;
        debug!(kind = %kind, offset, sql = %query.sql, "Fetching page");
        let rows = self.source.fetch_page(&query).await?;

        let mut report = PageReport {
            rows: rows.len(),
            has_more: self.policy.has_more(rows.len(), page_size),
            query: query.sql,
            ..PageReport::default()
        };

        let converter = RowConverter::new(self.adapter, self.convert_users);
        let mut cache = IdCache::new(self.store);

        for (index, row) in rows.iter().enumerate() {
            match self.convert_row(kind, row, &converter, &mut cache).await {
                Ok(_) => report.converted += 1,
                Err(e) => {
                    warn!(kind = %kind, row = offset + index as i64, "Skipping row: {}", e);
                    report.skipped += 1;
                }
            }
        }

        debug!(
            kind = %kind,
            offset,
            rows = report.rows,
            converted = report.converted,
            skipped = report.skipped,
            lookups = cache.store_lookups(),
            "Page complete"
        );
        Ok(report)
    }

    async fn convert_row(
        &self,
        kind: EntityKind,
        row: &SourceRow,
        converter: &RowConverter<'_>,
        cache: &mut IdCache<'_>,
    ) -> Result<i64, ConvertError> {
        let converted = converter.convert(kind, row, cache).await?;

        let new_id = match kind {
            EntityKind::User => self.store.insert_user(&converted).await?,
            EntityKind::Tag => {
                let account = converted
                    .meta
                    .get(TAG_ACCOUNT_FIELD)
                    .and_then(value_as_i64)
                    .unwrap_or(0);
                self.store.attach_tag(account, &converted).await?
            }
            EntityKind::Period | EntityKind::Account | EntityKind::Record => {
                self.store.insert_entity(kind, &converted).await?
            }
        };

        remember_own_id(cache, kind, &converted, new_id);
        Ok(new_id)
    }
}

fn remember_own_id(cache: &mut IdCache<'_>, kind: EntityKind, row: &ConvertedRow, new_id: i64) {
    if let Some(legacy) = row.meta.get(kind.legacy_id_key()).and_then(legacy_key_string) {
        cache.remember(kind, &legacy, new_id);
    }
}
