// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Page slicing for list endpoints.

use serde::Serialize;

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: i64 = 100;

/// One page of a list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number actually served.
    pub page: i64,
    /// Page size actually used.
    pub per_page: i64,
    /// Number of items across all pages.
    pub total: i64,
    /// `ceil(total / per_page)`, 0 when empty.
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// Slice `items` into the requested page.
    ///
    /// `page` is raised to 1; `per_page` is clamped to `1..=MAX_PER_PAGE`.
    /// A page past the end is empty.
    pub fn paginate(items: Vec<T>, page: i64, per_page: i64) -> Self {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let total = items.len() as i64;
        let total_pages = (total + per_page - 1) / per_page;

        let offset = ((page - 1).saturating_mul(per_page)).min(total) as usize;
        let items = items
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();

        Self {
            items,
            page,
            per_page,
            total,
            total_pages,
        }
    }

    /// Transform the items, keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}
