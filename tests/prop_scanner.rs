//! Property tests for the scanner and attribute parser
//!
//! Properties: every reported range carries the tag envelope, ranges are
//! disjoint and increasing, positions are exact under concatenation,
//! NUL bytes survive, quoting round-trips, and `x`-prefixed attributes
//! never fail a parse.

use esi_fragment::{parse, scan, EsiConfig, TagFinder};
use proptest::prelude::*;

fn config() -> EsiConfig {
    EsiConfig::default()
}

proptest! {
    /// Envelope and position exactness: for any filler prefix and suffix,
    /// the single tag is reported at exactly `len(prefix)`.
    #[test]
    fn prop_position_exact_concatenation(
        prefix in "[a-z >/=\"]{0,200}",
        suffix in "[a-z >/=\"]{0,200}",
        url in "[a-z0-9./:-]{1,40}",
    ) {
        let tag = format!("<esi:include src=\"{}\"/>", url);
        let input = format!("{}{}{}", prefix, tag, suffix);

        let tags = scan(input.as_bytes(), &config()).unwrap();
        prop_assert_eq!(tags.len(), 1);
        prop_assert_eq!(tags[0].start, prefix.len());
        prop_assert_eq!(tags[0].end, prefix.len() + tag.len());
        prop_assert_eq!(&input.as_bytes()[tags[0].start..tags[0].start + 5], b"<esi:");
        prop_assert_eq!(&input.as_bytes()[tags[0].end - 2..tags[0].end], b"/>");
    }

    /// Ranges are pairwise disjoint and strictly increasing in start.
    #[test]
    fn prop_ranges_disjoint_and_increasing(
        fillers in prop::collection::vec("[a-z ]{0,50}", 2..8),
        urls in prop::collection::vec("[a-z0-9]{1,10}", 1..7),
    ) {
        let mut input = String::new();
        let mut filler_iter = fillers.iter().cycle();
        for url in &urls {
            input.push_str(filler_iter.next().unwrap());
            input.push_str(&format!("<esi:include src=\"{}\"/>", url));
        }
        input.push_str(filler_iter.next().unwrap());

        let tags = scan(input.as_bytes(), &config()).unwrap();
        prop_assert_eq!(tags.len(), urls.len());
        for pair in tags.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
            prop_assert!(pair[0].start < pair[1].start);
        }
        for t in &tags {
            prop_assert_eq!(&input.as_bytes()[t.start..t.start + 5], b"<esi:");
            prop_assert_eq!(&input.as_bytes()[t.end - 2..t.end], b"/>");
        }
    }

    /// NUL bytes between `<esi:` and `/>` are preserved in the raw body.
    #[test]
    fn prop_nul_bytes_preserved(
        nul_positions in prop::collection::vec(0usize..20, 1..5),
    ) {
        let mut body = b"include src=\"https://svc/x\" ".to_vec();
        for (i, pos) in nul_positions.iter().enumerate() {
            body.insert((pos + i).min(body.len()), 0);
        }
        let mut input = b"<esi:".to_vec();
        input.extend_from_slice(&body);
        input.extend_from_slice(b"/>");

        let tags = scan(&input[..], &config()).unwrap();
        prop_assert_eq!(tags.len(), 1);
        prop_assert_eq!(&tags[0].body, &body);
    }

    /// Chunking is invisible: feeding any chunk size yields the same tags
    /// as one contiguous feed.
    #[test]
    fn prop_chunk_size_invariance(
        parts in prop::collection::vec("[a-z<>/\"= ]{0,30}", 0..6),
        urls in prop::collection::vec("[a-z0-9]{1,8}", 0..4),
        chunk in 1usize..17,
    ) {
        let mut input = String::new();
        for (i, url) in urls.iter().enumerate() {
            input.push_str(parts.get(i).map(String::as_str).unwrap_or("pad"));
            input.push_str(&format!("<esi:include src=\"{}\" />", url));
        }
        input.push_str(parts.last().map(String::as_str).unwrap_or(""));
        let bytes = input.as_bytes();

        let mut whole_finder = TagFinder::new(16 * 1024);
        let mut whole = Vec::new();
        whole_finder.feed(bytes, &mut whole);
        whole_finder.finish();

        let mut chunked_finder = TagFinder::new(16 * 1024);
        let mut chunked = Vec::new();
        for piece in bytes.chunks(chunk) {
            chunked_finder.feed(piece, &mut chunked);
        }
        chunked_finder.finish();

        prop_assert_eq!(whole, chunked);
    }

    /// Quoting round-trips: a value with no quote character parses back
    /// verbatim.
    #[test]
    fn prop_attr_value_round_trip(value in "[a-zA-Z0-9:/._?&=-]{1,60}") {
        let input = format!("<esi:include src=\"{}\"/>", value);
        let entities = parse(input.as_bytes(), &config()).unwrap();
        prop_assert_eq!(entities.len(), 1);
        prop_assert_eq!(&entities[0].resources[0].url, &value);
    }

    /// Attribute names beginning with `x` never cause an error, whatever
    /// their value.
    #[test]
    fn prop_x_attributes_ignored(
        name in "x[a-z0-9]{0,12}",
        value in "[a-zA-Z0-9 ._-]{0,30}",
    ) {
        let input = format!("<esi:include src=\"u\" {}=\"{}\"/>", name, value);
        let entities = parse(input.as_bytes(), &config()).unwrap();
        prop_assert_eq!(entities.len(), 1);
        prop_assert_eq!(entities[0].resources.len(), 1);
    }
}
