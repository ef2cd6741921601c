//! Fixed-size pagination over a crud.

use crate::crud::Crud;
use crate::error::CrudError;
use serde_json::Value;
use sqlx::PgPool;

/// Wraps a crud to fetch fixed-size pages in a stable order (the crud's
/// ORDER BY pk), so pages never skip or duplicate rows. Stateless between
/// calls; each page is an independent query.
#[derive(Debug)]
pub struct Paginator {
    crud: Crud,
    page_size: u64,
}

impl Paginator {
    pub fn new(crud: Crud, page_size: u64) -> Result<Self, CrudError> {
        if page_size == 0 {
            return Err(CrudError::InvalidPageSize(page_size));
        }
        Ok(Paginator { crud, page_size })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of pages covering the rows matching the crud's fixed values
    /// and the extra filter.
    pub async fn page_count(
        &self,
        pool: &PgPool,
        filter: &[(String, Value)],
    ) -> Result<u64, CrudError> {
        let total = self.crud.count(pool, filter).await?;
        Ok(pages_for(total, self.page_size))
    }

    /// Fetch one zero-based page. A negative index is an error; an index
    /// past the last page returns an empty vec, like an unmatched fetch.
    pub async fn page(
        &self,
        pool: &PgPool,
        index: i64,
        filter: &[(String, Value)],
    ) -> Result<Vec<Value>, CrudError> {
        let index = check_index(index)?;
        let offset = index.saturating_mul(self.page_size);
        self.crud
            .fetch_range(pool, filter, Some(self.page_size), Some(offset))
            .await
    }
}

fn check_index(index: i64) -> Result<u64, CrudError> {
    u64::try_from(index).map_err(|_| CrudError::InvalidPage(index))
}

fn pages_for(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size)
}
