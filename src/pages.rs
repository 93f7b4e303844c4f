//! Page-range expressions: `"1-5, 8, 10-15"` → `[1, 2, 3, 4, 5, 8, 10, …]`.
//!
//! The parser is all-or-nothing. One malformed token empties the whole result,
//! and the caller treats an empty result as "ask again". A partially applied
//! selection would silently drop pages the user asked for.

use std::collections::BTreeSet;

/// Parse a comma-separated page selection against a document of `max_pages`.
///
/// Returns 1-based page numbers, ascending and duplicate-free, each within
/// `1..=max_pages`. Returns an empty vector for malformed input.
///
/// ```rust
/// use edgequake_pdfbot::pages::parse_page_ranges;
///
/// assert_eq!(parse_page_ranges("2-4, 7", 10), vec![2, 3, 4, 7]);
/// assert_eq!(parse_page_ranges("3-1", 10), vec![1, 2, 3]);
/// assert!(parse_page_ranges("1-3,x", 10).is_empty());
/// ```
pub fn parse_page_ranges(input: &str, max_pages: usize) -> Vec<usize> {
    parse_tokens(input, max_pages)
        .map(|set| set.into_iter().collect())
        .unwrap_or_default()
}

fn parse_tokens(input: &str, max_pages: usize) -> Option<BTreeSet<usize>> {
    let mut pages = BTreeSet::new();

    for token in input.split(',') {
        let token = token.trim();
        if token.contains('-') {
            let (start, end) = token.split_once('-')?;
            let start = parse_number(start)?;
            let end = parse_number(end)?;
            let (lo, hi) = if start > end { (end, start) } else { (start, end) };
            // Out-of-bounds pages are filtered anyway; clamping first keeps
            // "1-999999999" from materialising a billion entries.
            let lo = lo.max(1);
            let hi = hi.min(max_pages);
            if lo <= hi {
                pages.extend(lo..=hi);
            }
        } else {
            let page = parse_number(token)?;
            if (1..=max_pages).contains(&page) {
                pages.insert(page);
            }
        }
    }

    Some(pages)
}

/// Parse one endpoint. A second dash (`"1-2-3"`) leaves a `-` in the end
/// part, which fails here and rejects the whole input.
fn parse_number(s: &str) -> Option<usize> {
    s.trim().parse().ok()
}

/// Render sorted page numbers back into compact range syntax (`"2-4,7"`),
/// the form qpdf's `--pages` option expects.
pub fn to_range_spec(pages: &[usize]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = pages.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        parts.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
    }

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page() {
        assert_eq!(parse_page_ranges("5", 10), vec![5]);
    }

    #[test]
    fn reversed_range_is_normalised() {
        assert_eq!(parse_page_ranges("3-1", 10), vec![1, 2, 3]);
    }

    #[test]
    fn range_is_clipped_to_document() {
        assert_eq!(
            parse_page_ranges("1-1000", 10),
            (1..=10).collect::<Vec<_>>()
        );
    }

    #[test]
    fn huge_range_does_not_expand_past_document() {
        assert_eq!(parse_page_ranges("5-18446744073709551615", 6), vec![5, 6]);
    }

    #[test]
    fn garbage_yields_empty() {
        assert!(parse_page_ranges("abc", 10).is_empty());
        assert!(parse_page_ranges("", 10).is_empty());
        assert!(parse_page_ranges("1-2-3", 10).is_empty());
        assert!(parse_page_ranges("-3", 10).is_empty());
        assert!(parse_page_ranges("1,,2", 10).is_empty());
    }

    #[test]
    fn one_bad_token_empties_everything() {
        assert!(parse_page_ranges("1-3,x", 10).is_empty());
        assert_eq!(parse_page_ranges("1-3", 10), vec![1, 2, 3]);
    }

    #[test]
    fn overlapping_ranges_are_deduplicated() {
        assert_eq!(parse_page_ranges("1-3,2-4", 10), vec![1, 2, 3, 4]);
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(parse_page_ranges(" 1 - 2 , 8 ,10- 11", 12), vec![1, 2, 8, 10, 11]);
    }

    #[test]
    fn out_of_bounds_singletons_are_dropped() {
        assert_eq!(parse_page_ranges("0, 4, 11", 10), vec![4]);
        assert!(parse_page_ranges("11-20", 10).is_empty());
    }

    #[test]
    fn results_are_sorted_unique_and_in_bounds() {
        for input in ["9,1,5-3", "10-1", "2,2,2", "7-9,1-2,8"] {
            let pages = parse_page_ranges(input, 9);
            assert!(pages.windows(2).all(|w| w[0] < w[1]), "{input}: {pages:?}");
            assert!(pages.iter().all(|&p| (1..=9).contains(&p)), "{input}: {pages:?}");
        }
    }

    #[test]
    fn range_spec_compacts_runs() {
        assert_eq!(to_range_spec(&[2, 3, 4, 7]), "2-4,7");
        assert_eq!(to_range_spec(&[1]), "1");
        assert_eq!(to_range_spec(&[1, 3, 5, 6]), "1,3,5-6");
        assert_eq!(to_range_spec(&[]), "");
    }
}
