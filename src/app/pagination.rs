//! Page-number pagination over ordered result sets.
//!
//! Callers count the filtered rows, resolve a [`PageWindow`] from the raw
//! `page` query value, and fetch `LIMIT window.limit() OFFSET window.offset()`.
//! Bad page values never fail: they clamp to the first or last page.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageWindow {
    pub fn resolve(requested: Option<&str>, total: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let total = total.max(0);
        // An empty result still has one (empty) page.
        let num_pages = ((total + per_page - 1) / per_page).max(1);

        let number = match requested.map(str::trim).and_then(|raw| raw.parse::<i64>().ok()) {
            None => 1,
            Some(n) if n < 1 => 1,
            Some(n) if n > num_pages => num_pages,
            Some(n) => n,
        };

        Self {
            number,
            num_pages,
            per_page,
            total,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self { items, window }
    }

    pub fn number(&self) -> i64 {
        self.window.number
    }

    pub fn num_pages(&self) -> i64 {
        self.window.num_pages
    }

    pub fn has_next(&self) -> bool {
        self.window.number < self.window.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.window.number > 1
    }

    pub fn next_number(&self) -> Option<i64> {
        self.has_next().then(|| self.window.number + 1)
    }

    pub fn previous_number(&self) -> Option<i64> {
        self.has_previous().then(|| self.window.number - 1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
