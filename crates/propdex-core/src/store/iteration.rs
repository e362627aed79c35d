use std::collections::VecDeque;

use rusqlite::params_from_iter;

use crate::dao::PropertySetRecord;
use crate::error::Result;

use super::{RESOURCE_COLUMNS, SqliteResourceStore, usize_to_i64_saturating};

pub const DEFAULT_PAGE_SIZE: usize = 500;

enum Cursor {
    All { after: Option<String> },
    Uris { chunks: std::vec::IntoIter<Vec<String>> },
    Exhausted,
}

/// Pull iterator over the resource table in URI order. Rows are fetched a
/// page at a time, so the connection is never held between calls to `next`.
pub struct PagedPropertySets<'a> {
    store: &'a SqliteResourceStore,
    cursor: Cursor,
    page: VecDeque<PropertySetRecord>,
    page_size: usize,
}

impl<'a> PagedPropertySets<'a> {
    pub(super) fn all(store: &'a SqliteResourceStore, page_size: usize) -> Self {
        Self {
            store,
            cursor: Cursor::All { after: None },
            page: VecDeque::new(),
            page_size,
        }
    }

    pub(super) fn for_uris(store: &'a SqliteResourceStore, uris: &[String], page_size: usize) -> Self {
        let mut sorted = uris.to_vec();
        sorted.sort();
        sorted.dedup();
        let chunks = sorted
            .chunks(page_size)
            .map(<[String]>::to_vec)
            .collect::<Vec<_>>();
        Self {
            store,
            cursor: Cursor::Uris {
                chunks: chunks.into_iter(),
            },
            page: VecDeque::new(),
            page_size,
        }
    }

    fn fill_page(&mut self) -> Result<()> {
        let rows = match &mut self.cursor {
            Cursor::Exhausted => return Ok(()),
            Cursor::All { after } => {
                let rows = match after.as_deref() {
                    None => self.store.fetch_resource_rows(
                        &format!("SELECT {RESOURCE_COLUMNS} FROM resources ORDER BY uri ASC LIMIT ?1"),
                        [usize_to_i64_saturating(self.page_size)],
                    )?,
                    Some(last) => self.store.fetch_resource_rows(
                        &format!(
                            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE uri > ?1 ORDER BY uri ASC LIMIT ?2"
                        ),
                        rusqlite::params![last, usize_to_i64_saturating(self.page_size)],
                    )?,
                };
                if rows.len() < self.page_size {
                    self.cursor = Cursor::Exhausted;
                } else if let Some((last, _)) = rows.last() {
                    *after = Some(last.uri.to_string());
                }
                rows
            }
            Cursor::Uris { chunks } => {
                let Some(chunk) = chunks.next() else {
                    self.cursor = Cursor::Exhausted;
                    return Ok(());
                };
                let placeholders = vec!["?"; chunk.len()].join(", ");
                self.store.fetch_resource_rows(
                    &format!(
                        "SELECT {RESOURCE_COLUMNS} FROM resources WHERE uri IN ({placeholders}) ORDER BY uri ASC"
                    ),
                    params_from_iter(chunk.iter()),
                )?
            }
        };
        self.page.extend(rows);
        Ok(())
    }
}

impl Iterator for PagedPropertySets<'_> {
    type Item = Result<PropertySetRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        // A chunk of URIs may resolve to nothing, so keep pulling until a
        // row turns up or the cursor runs dry.
        while self.page.is_empty() {
            if matches!(self.cursor, Cursor::Exhausted) {
                return None;
            }
            if let Err(err) = self.fill_page() {
                self.cursor = Cursor::Exhausted;
                return Some(Err(err));
            }
        }
        self.page.pop_front().map(Ok)
    }
}
