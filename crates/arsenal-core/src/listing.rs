//! # Listing
//!
//! Filtering, sorting and pagination for list pages.
//!
//! Sort columns are typed per record kind through [`SortKey`]; raw query
//! strings are parsed leniently so a bad `sort=` or `page=` value falls back
//! to the default instead of failing the request.

use serde::Deserialize;
use std::cmp::Ordering;

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

// =============================================================================
// SORTING
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// A sortable column of some record kind.
pub trait SortKey: Copy + Default + PartialEq {
    /// Every column, in display order.
    fn all() -> &'static [Self];

    /// Parse the query-string form.
    fn parse(s: &str) -> Option<Self>;

    /// Query-string form.
    fn as_str(self) -> &'static str;

    /// Column heading.
    fn label(self) -> &'static str;
}

/// A record that can appear on a list page.
pub trait Listable {
    type Sort: SortKey;

    /// Compare two records by one column, ascending.
    fn compare(&self, other: &Self, key: Self::Sort) -> Ordering;

    /// Tie-breaker giving a total order.
    fn tie_break(&self, other: &Self) -> Ordering;

    /// Whether the record matches a lowercased search needle.
    fn matches(&self, needle: &str) -> bool;
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// Raw list query as it arrives in the URL. Every field is a string so a
/// malformed value never rejects the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub q: Option<String>,
}

/// Parsed list parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams<S: SortKey> {
    pub page: usize,
    pub per_page: usize,
    pub sort: S,
    pub dir: SortDir,
    pub search: Option<String>,
}

impl<S: SortKey> Default for ListParams<S> {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort: S::default(),
            dir: SortDir::default(),
            search: None,
        }
    }
}

impl<S: SortKey> From<&RawListQuery> for ListParams<S> {
    fn from(raw: &RawListQuery) -> Self {
        let defaults = Self::default();
        let page = raw
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(defaults.page);
        let per_page = raw
            .per_page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .map(|p| p.clamp(1, MAX_PER_PAGE))
            .unwrap_or(defaults.per_page);
        let sort = raw
            .sort
            .as_deref()
            .and_then(S::parse)
            .unwrap_or(defaults.sort);
        let dir = raw
            .dir
            .as_deref()
            .and_then(SortDir::parse)
            .unwrap_or(defaults.dir);
        let search = raw
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        Self {
            page,
            per_page,
            sort,
            dir,
            search,
        }
    }
}

impl<S: SortKey> ListParams<S> {
    /// Filter, sort and paginate `items`.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T>
    where
        T: Listable<Sort = S>,
    {
        let mut items: Vec<T> = match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                items.into_iter().filter(|i| i.matches(&needle)).collect()
            }
            None => items,
        };

        items.sort_by(|a, b| {
            self.dir
                .apply(a.compare(b, self.sort))
                .then_with(|| a.tie_break(b))
        });

        Page::paginate(items, self.page, self.per_page)
    }

    /// Query string for the same list with a different page.
    #[must_use]
    pub fn query_for_page(&self, page: usize) -> String {
        self.query(page, self.sort, self.dir)
    }

    /// Query string for sorting by `key`. Re-selecting the current column
    /// flips the direction.
    #[must_use]
    pub fn query_for_sort(&self, key: S) -> String {
        let dir = if key == self.sort {
            self.dir.reverse()
        } else {
            SortDir::Asc
        };
        self.query(1, key, dir)
    }

    fn query(&self, page: usize, sort: S, dir: SortDir) -> String {
        let mut query = format!(
            "page={}&per_page={}&sort={}&dir={}",
            page,
            self.per_page,
            sort.as_str(),
            dir.as_str()
        );
        if let Some(search) = &self.search {
            query.push_str("&q=");
            query.push_str(&encode_query_value(search));
        }
        query
    }
}

/// Percent-encode a query value (RFC 3986 unreserved characters pass through).
#[must_use]
pub fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// =============================================================================
// PAGE
// =============================================================================

/// One page of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, clamped into `1..=total_pages`.
    pub page: usize,
    pub per_page: usize,
    /// Matching items across all pages.
    pub total: usize,
    /// Always at least 1, even for an empty list.
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Cut one page out of an already ordered list.
    pub fn paginate(items: Vec<T>, page: usize, per_page: usize) -> Self {
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let total = items.len();
        let total_pages = total.div_ceil(per_page).max(1);
        let page = page.clamp(1, total_pages);
        let start = (page - 1).saturating_mul(per_page);

        let items = items.into_iter().skip(start).take(per_page).collect();

        Self {
            items,
            page,
            per_page,
            total,
            total_pages,
        }
    }

    #[must_use]
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    enum NumSort {
        #[default]
        Value,
        Label,
    }

    impl SortKey for NumSort {
        fn all() -> &'static [Self] {
            &[Self::Value, Self::Label]
        }
        fn parse(s: &str) -> Option<Self> {
            match s {
                "value" => Some(Self::Value),
                "label" => Some(Self::Label),
                _ => None,
            }
        }
        fn as_str(self) -> &'static str {
            match self {
                Self::Value => "value",
                Self::Label => "label",
            }
        }
        fn label(self) -> &'static str {
            self.as_str()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        id: u64,
        value: u64,
        label: String,
    }

    impl Listable for Row {
        type Sort = NumSort;
        fn compare(&self, other: &Self, key: NumSort) -> Ordering {
            match key {
                NumSort::Value => self.value.cmp(&other.value),
                NumSort::Label => self.label.cmp(&other.label),
            }
        }
        fn tie_break(&self, other: &Self) -> Ordering {
            self.id.cmp(&other.id)
        }
        fn matches(&self, needle: &str) -> bool {
            self.label.to_lowercase().contains(needle)
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { id: 1, value: 30, label: "Charlie".into() },
            Row { id: 2, value: 10, label: "alpha".into() },
            Row { id: 3, value: 20, label: "Bravo".into() },
            Row { id: 4, value: 10, label: "delta".into() },
        ]
    }

    fn raw(pairs: &[(&str, &str)]) -> RawListQuery {
        let mut q = RawListQuery::default();
        for (k, v) in pairs {
            let v = Some((*v).to_string());
            match *k {
                "page" => q.page = v,
                "per_page" => q.per_page = v,
                "sort" => q.sort = v,
                "dir" => q.dir = v,
                "q" => q.q = v,
                _ => {}
            }
        }
        q
    }

    #[test]
    fn malformed_query_falls_back_to_defaults() {
        let params: ListParams<NumSort> =
            (&raw(&[("page", "x"), ("per_page", "0"), ("sort", "'; DROP"), ("dir", "up")])).into();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 1);
        assert_eq!(params.sort, NumSort::Value);
        assert_eq!(params.dir, SortDir::Asc);

        let params: ListParams<NumSort> = (&raw(&[("per_page", "5000"), ("q", "   ")])).into();
        assert_eq!(params.per_page, MAX_PER_PAGE);
        assert_eq!(params.search, None);
    }

    #[test]
    fn sorts_with_stable_tie_break() {
        let params: ListParams<NumSort> = (&raw(&[("sort", "value"), ("dir", "desc")])).into();
        let page = params.apply(rows());
        let ids: Vec<u64> = page.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 2, 4]);
    }

    #[test]
    fn search_is_case_insensitive() {
        let params: ListParams<NumSort> = (&raw(&[("q", "A"), ("sort", "label")])).into();
        let page = params.apply(rows());
        let labels: Vec<&str> = page.items.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Bravo", "Charlie", "alpha", "delta"]);
        assert_eq!(page.total, 4);

        let params: ListParams<NumSort> = (&raw(&[("q", "rav")])).into();
        assert_eq!(params.apply(rows()).total, 1);
    }

    #[test]
    fn page_clamped_into_range() {
        let page = Page::paginate(vec![1, 2, 3, 4, 5], 9, 2);
        assert_eq!(page.page, 3);
        assert_eq!(page.items, vec![5]);
        assert!(page.has_prev());
        assert!(!page.has_next());

        let empty: Page<u8> = Page::paginate(Vec::new(), 4, 20);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 1);
        assert!(!empty.has_next());
    }

    #[test]
    fn sort_links_flip_direction_on_current_column() {
        let params: ListParams<NumSort> = (&raw(&[("sort", "label"), ("q", "a b")])).into();
        assert_eq!(
            params.query_for_sort(NumSort::Label),
            "page=1&per_page=20&sort=label&dir=desc&q=a%20b"
        );
        assert!(params.query_for_sort(NumSort::Value).contains("dir=asc"));
    }

    proptest! {
        #[test]
        fn pagination_never_loses_items(len in 0usize..200, per_page in 1usize..50) {
            let items: Vec<usize> = (0..len).collect();
            let mut seen = Vec::new();
            let pages = Page::paginate(items.clone(), 1, per_page).total_pages;
            for p in 1..=pages {
                seen.extend(Page::paginate(items.clone(), p, per_page).items);
            }
            prop_assert_eq!(seen, items);
        }
    }
}
