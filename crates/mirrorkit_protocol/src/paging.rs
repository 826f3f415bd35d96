//! Page windowing and URL construction for channel collections.

use uuid::Uuid;

/// One fixed-size window of a channel collection: `[offset, offset + limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Zero-based item offset.
    pub offset: u64,
    /// Maximum number of items in this window.
    pub limit: u64,
}

impl PageWindow {
    /// Creates a new page window.
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// Divides `[0, count)` into fixed windows of `page_size`.
///
/// The final partial window is always included. A zero count or a zero
/// page size yields no windows.
pub fn page_windows(count: u64, page_size: u64) -> Vec<PageWindow> {
    if count == 0 || page_size == 0 {
        return Vec::new();
    }

    let mut windows = Vec::with_capacity(count.div_ceil(page_size) as usize);
    let mut offset = 0;
    while offset < count {
        windows.push(PageWindow::new(offset, page_size));
        offset += page_size;
    }
    windows
}

/// Appends a query parameter, respecting an existing query string.
fn append_param(url: &mut String, name: &str, value: &str) {
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(name);
    url.push('=');
    url.push_str(value);
}

/// Builds the fetch URL for one page window of a channel collection.
pub fn window_url(base: &str, window: PageWindow) -> String {
    let mut url = base.to_string();
    append_param(&mut url, "page[offset]", &window.offset.to_string());
    append_param(&mut url, "page[limit]", &window.limit.to_string());
    url
}

/// Builds a collection URL filtered to exactly the given global
/// identifiers, for the selective-import path.
///
/// Identifiers beyond `max` are omitted; batching the remainder is the
/// caller's concern.
pub fn uuid_filter_url(url_uuid: &str, ids: &[Uuid], max: usize) -> String {
    let mut url = url_uuid.to_string();
    append_param(&mut url, "filter[id][operator]", "IN");
    for (index, id) in ids.iter().take(max).enumerate() {
        append_param(
            &mut url,
            &format!("filter[id][value][{index}]"),
            &id.to_string(),
        );
    }
    url
}
