//! Command argument formatting.

use std::fmt::Write;

use chrono::NaiveDate;

/// Formats a `SEARCH SINCE` criterion, e.g. `SINCE 14-Sep-2026`.
#[must_use]
pub fn since_query(date: NaiveDate) -> String {
    format!("SINCE {}", date.format("%d-%b-%Y"))
}

/// Formats UIDs as an IMAP sequence set, collapsing consecutive runs.
///
/// `[1, 2, 3, 7, 9, 10]` becomes `1:3,7,9:10`. Input order and duplicates
/// do not matter.
#[must_use]
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = String::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = end.checked_add(1)
            && iter.next_if_eq(&next).is_some()
        {
            end = next;
        }
        if !out.is_empty() {
            out.push(',');
        }
        if start == end {
            let _ = write!(out, "{start}");
        } else {
            let _ = write!(out, "{start}:{end}");
        }
    }
    out
}
