//! Page-number pagination over a materialized result set.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 20;

/// Position of a page within the full result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

/// Page numbers for navigation. `prev` and `next` are absent at the ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    pub first: usize,
    pub last: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
}

/// Navigation links rendered as request paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUrls {
    pub first: String,
    pub last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl PageLinks {
    pub fn new(info: &PageInfo) -> Self {
        let last = info.pages.max(1);
        Self {
            first: 1,
            last,
            prev: (info.page > 1).then(|| (info.page - 1).min(last)),
            next: (info.page < info.pages).then_some(info.page + 1),
        }
    }

    /// Render against `base_path`, appending `page` and `limit` parameters.
    pub fn render(&self, base_path: &str, limit: usize) -> PageUrls {
        let sep = if base_path.contains('?') { '&' } else { '?' };
        let url = |page: usize| format!("{}{}page={}&limit={}", base_path, sep, page, limit);
        PageUrls {
            first: url(self.first),
            last: url(self.last),
            prev: self.prev.map(url),
            next: self.next.map(url),
        }
    }
}

/// One page of results with its position and navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub pagination: PageInfo,
    pub links: PageLinks,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            pagination: self.pagination,
            links: self.links,
        }
    }

    pub fn has_next(&self) -> bool {
        self.links.next.is_some()
    }

    pub fn urls(&self, base_path: &str) -> PageUrls {
        self.links.render(base_path, self.pagination.limit)
    }
}

/// Slice `results` into the requested page.
///
/// `page` and `limit` default to 1 and 20 and are clamped to at least 1.
/// Pages past the end come back empty with `prev` pointing inside range.
///
/// # Examples
///
/// ```
/// use framedex::pagination::paginate;
///
/// let items: Vec<u32> = (0..45).collect();
/// let page = paginate(&items, Some(3), Some(20));
/// assert_eq!(page.pagination.pages, 3);
/// assert_eq!(page.results, (40..45).collect::<Vec<_>>());
/// assert!(page.links.next.is_none());
/// ```
pub fn paginate<T: Clone>(results: &[T], page: Option<usize>, limit: Option<usize>) -> Page<T> {
    let page = page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).max(1);
    let total = results.len();
    let pages = total.div_ceil(limit);

    let from = (page - 1).saturating_mul(limit).min(total);
    let to = from.saturating_add(limit).min(total);

    let pagination = PageInfo {
        total,
        page,
        limit,
        pages,
    };

    Page {
        results: results[from..to].to_vec(),
        links: PageLinks::new(&pagination),
        pagination,
    }
}
