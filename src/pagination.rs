use crate::connection::{Gateway, HttpMethod};
use crate::error::SyncError;
use serde_json::Value;
use std::collections::VecDeque;

/// One physical page of a cursor-paginated collection: the records it carries
/// and, if the server advertised one, the locator of the next page.
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<String>,
}

/// Lazy walk over a cursor-paginated collection.
///
/// Given a start locator and a page-fetch function, yields every item of
/// every page in original order by repeatedly fetching until a page reports
/// no `next` locator. The walk is finite and non-restartable: a fetch error
/// is yielded exactly once and terminates the sequence. No retry or backoff
/// is performed anywhere — a single failure aborts the whole walk.
///
/// Example:
/// ```ignore
/// let mut walk = Paginator::new(url, |locator| fetch_page(gateway, locator, &[]));
/// while let Some(item) = walk.next() {
///     let record = item?;
///     // ...
/// }
/// ```
pub struct Paginator<F> {
    fetch: F,
    next_locator: Option<String>,
    buffered: VecDeque<Value>,
    finished: bool,
}

impl<F> Paginator<F>
where
    F: FnMut(&str) -> Result<Page, SyncError>,
{
    pub fn new(start: String, fetch: F) -> Self {
        Paginator {
            fetch,
            next_locator: Some(start),
            buffered: VecDeque::new(),
            finished: false,
        }
    }
}

impl<F> Iterator for Paginator<F>
where
    F: FnMut(&str) -> Result<Page, SyncError>,
{
    type Item = Result<Value, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            let locator = match self.next_locator.take() {
                Some(locator) => locator,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            match (self.fetch)(&locator) {
                Ok(page) => {
                    self.next_locator = page.next;
                    self.buffered.extend(page.items);
                    // An empty page with a next locator keeps walking; an
                    // empty final page ends the loop on the next pass.
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Fetches one page through the gateway and checks the status.
///
/// A non-success status is a `RemoteFetch` error carrying the status code and
/// body text; the body is expected to be a JSON array of records.
pub fn fetch_page(
    gateway: &dyn Gateway,
    locator: &str,
    params: &[(String, String)],
) -> Result<Page, SyncError> {
    let response = gateway.execute(HttpMethod::Get, locator, params)?;
    if !response.is_success() {
        return Err(SyncError::RemoteFetch {
            status: response.status,
            body: response.body,
        });
    }
    let next = response.next_link();
    let items: Vec<Value> = response.json()?;
    Ok(Page { items, next })
}

/// Walks a collection to exhaustion and returns the concatenation of all
/// pages, in original order, without deduplication.
///
/// Query parameters are sent with the first request only: the `next` locator
/// returned by the server already embeds them, so re-sending would be
/// redundant and can conflict with the embedded cursor.
pub fn collect_collection(
    gateway: &dyn Gateway,
    url: &str,
    params: &[(String, String)],
) -> Result<Vec<Value>, SyncError> {
    let mut first = true;
    let params = params.to_vec();
    Paginator::new(url.to_string(), move |locator| {
        let query: &[(String, String)] = if first { &params } else { &[] };
        first = false;
        fetch_page(gateway, locator, query)
    })
    .collect()
}
