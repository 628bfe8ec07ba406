//! Index filters for CSS navigation steps
//!
//! Two syntaxes select a subset of the elements a step produced:
//!
//! - **Bracket**: `tag.li[0]`, `tag.li[1,3]`, `tag.li[1:3]`, `tag.li[::2]`,
//!   `tag.li[-1]`, `tag.li[!0]`. Entries are comma-separated single indices or
//!   `start:end:step` slices with Python semantics (negative values count from
//!   the end, end is exclusive). A leading `!` excludes instead of includes.
//! - **Legacy suffix**: `tag.li.0`, `tag.li!0`, `tag.li.1:3`.
//!
//! Out-of-range single indices are dropped silently; slice bounds are clamped.

use std::collections::HashSet;

/// One entry of an index filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEntry {
    /// Single position, negative counts from the end
    Single(i64),
    /// Python-style slice; missing components take their defaults
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },
}

/// Parsed index filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFilter {
    /// Remove the selected positions instead of keeping them
    pub exclude: bool,
    /// Entries in written order
    pub entries: Vec<IndexEntry>,
}

impl IndexFilter {
    /// Parse the contents of a bracket filter (without the brackets).
    ///
    /// Returns `None` when the text is not an index filter, e.g. a CSS
    /// attribute selector such as `href` or `class=x`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty()
            || !raw
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '-' | ':' | ',' | '!' | ' '))
        {
            return None;
        }
        let (exclude, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let entries = body
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(parse_entry)
            .collect::<Option<Vec<_>>>()?;
        if entries.is_empty() {
            return None;
        }
        Some(Self { exclude, entries })
    }

    /// Positions selected out of `len` items, in written order, deduplicated.
    pub fn positions(&self, len: usize) -> Vec<usize> {
        let len_i = len as i64;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in &self.entries {
            for pos in entry_positions(*entry, len_i) {
                if seen.insert(pos) {
                    out.push(pos);
                }
            }
        }
        out
    }

    /// Apply the filter to `items`.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let positions = self.positions(items.len());
        if self.exclude {
            let drop: HashSet<usize> = positions.into_iter().collect();
            return items
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !drop.contains(i))
                .map(|(_, item)| item)
                .collect();
        }
        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        positions
            .into_iter()
            .filter_map(|pos| slots.get_mut(pos).and_then(Option::take))
            .collect()
    }
}

fn parse_entry(entry: &str) -> Option<IndexEntry> {
    if !entry.contains(':') {
        return entry.parse().ok().map(IndexEntry::Single);
    }
    let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return None;
    }
    let component = |i: usize| -> Option<Option<i64>> {
        match parts.get(i) {
            None => Some(None),
            Some(p) if p.is_empty() => Some(None),
            Some(p) => p.parse().ok().map(Some),
        }
    };
    Some(IndexEntry::Slice {
        start: component(0)?,
        end: component(1)?,
        step: component(2)?,
    })
}

fn entry_positions(entry: IndexEntry, len: i64) -> Vec<usize> {
    match entry {
        IndexEntry::Single(i) => {
            let i = if i < 0 { i + len } else { i };
            if (0..len).contains(&i) {
                vec![i as usize]
            } else {
                Vec::new()
            }
        }
        IndexEntry::Slice { start, end, step } => {
            let step = match step {
                Some(0) | None => 1,
                Some(s) => s,
            };
            let norm = |v: i64| if v < 0 { v + len } else { v };
            let mut out = Vec::new();
            if step > 0 {
                let start = start.map(norm).unwrap_or(0).clamp(0, len);
                let end = end.map(norm).unwrap_or(len).clamp(0, len);
                let mut i = start;
                while i < end {
                    out.push(i as usize);
                    match i.checked_add(step) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
            } else {
                let start = start.map(norm).unwrap_or(len - 1).clamp(-1, len - 1);
                let end = end.map(norm).unwrap_or(-1).clamp(-1, len - 1);
                let mut i = start;
                while i > end {
                    out.push(i as usize);
                    match i.checked_add(step) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
            }
            out
        }
    }
}

/// Split an index filter off a navigation step.
///
/// Returns the selector part and the filter, if any. Bracket syntax is
/// checked first, then the legacy `.N` / `!N` suffix.
///
/// ```
/// use bookscout_engine::selector::index::split_index;
///
/// let (rest, filter) = split_index("tag.li[1:3]");
/// assert_eq!(rest, "tag.li");
/// assert!(filter.is_some());
///
/// let (rest, filter) = split_index("a[href]");
/// assert_eq!(rest, "a[href]");
/// assert!(filter.is_none());
/// ```
pub fn split_index(step: &str) -> (&str, Option<IndexFilter>) {
    let step = step.trim();

    if step.ends_with(']') {
        if let Some(open) = step.rfind('[') {
            if let Some(filter) = IndexFilter::parse(&step[open + 1..step.len() - 1]) {
                return (step[..open].trim_end(), Some(filter));
            }
        }
        return (step, None);
    }

    if let Some(pos) = step.rfind(['.', '!']) {
        let suffix = &step[pos + 1..];
        let legacy = !suffix.is_empty()
            && suffix.chars().any(|c| c.is_ascii_digit())
            && suffix.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | ':'));
        if legacy {
            let exclude = step[pos..].starts_with('!');
            if let Some(entry) = parse_entry(suffix) {
                let filter = IndexFilter {
                    exclude,
                    entries: vec![entry],
                };
                return (&step[..pos], Some(filter));
            }
        }
    }

    (step, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn five() -> Vec<char> {
        vec!['a', 'b', 'c', 'd', 'e']
    }

    fn filter(raw: &str) -> IndexFilter {
        IndexFilter::parse(raw).unwrap()
    }

    #[test]
    fn test_slice_is_end_exclusive() {
        assert_eq!(filter("1:3").apply(five()), vec!['b', 'c']);
    }

    #[test]
    fn test_negative_single_index() {
        assert_eq!(filter("-1").apply(five()), vec!['e']);
    }

    #[test]
    fn test_exclude_first() {
        assert_eq!(filter("!0").apply(five()), vec!['b', 'c', 'd', 'e']);
    }

    #[test]
    fn test_out_of_range_single_is_dropped() {
        assert_eq!(filter("0,9,-9").apply(five()), vec!['a']);
    }

    #[test]
    fn test_slice_bounds_are_clamped() {
        assert_eq!(filter("-10:10").apply(five()), five());
        assert_eq!(filter("3:").apply(five()), vec!['d', 'e']);
    }

    #[test]
    fn test_slice_with_step() {
        assert_eq!(filter("::2").apply(five()), vec!['a', 'c', 'e']);
        assert_eq!(filter("::-1").apply(five()), vec!['e', 'd', 'c', 'b', 'a']);
    }

    #[test]
    fn test_huge_step_stops_after_first_position() {
        assert_eq!(filter("1::9223372036854775807").apply(five()), vec!['b']);
        assert_eq!(filter("-1::-9223372036854775808").apply(five()), vec!['e']);
    }

    #[test]
    fn test_mixed_entries_keep_written_order() {
        assert_eq!(filter("4,0:2").apply(five()), vec!['e', 'a', 'b']);
    }

    #[test]
    fn test_attribute_selector_is_not_a_filter() {
        assert_eq!(IndexFilter::parse("href"), None);
        assert_eq!(IndexFilter::parse("class=x"), None);
        assert_eq!(IndexFilter::parse(""), None);
    }

    #[test]
    fn test_split_bracket_syntax() {
        let (rest, f) = split_index("class.item[!0,1]");
        assert_eq!(rest, "class.item");
        let f = f.unwrap();
        assert!(f.exclude);
        assert_eq!(f.entries, vec![IndexEntry::Single(0), IndexEntry::Single(1)]);
    }

    #[test]
    fn test_split_legacy_suffix() {
        let (rest, f) = split_index("tag.li.-1");
        assert_eq!(rest, "tag.li");
        assert_eq!(f.unwrap().entries, vec![IndexEntry::Single(-1)]);

        let (rest, f) = split_index("tag.li!0");
        assert_eq!(rest, "tag.li");
        assert!(f.unwrap().exclude);
    }

    #[test]
    fn test_legacy_slice_suffix() {
        let (rest, f) = split_index("tag.p.1:3");
        assert_eq!(rest, "tag.p");
        assert_eq!(f.unwrap().apply(five()), vec!['b', 'c']);
    }

    #[test]
    fn test_plain_names_are_not_legacy_indices() {
        assert_eq!(split_index("tag.h1"), ("tag.h1", None));
        assert_eq!(split_index("class.c-1"), ("class.c-1", None));
    }
}
