#![forbid(unsafe_code)]

//! Property tests for path parsing.

use proptest::prelude::*;

use tether_core::Path;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

proptest! {
    #[test]
    fn display_parse_round_trip(segments in proptest::collection::vec(segment(), 0..6)) {
        let path = Path::from_segments(segments.clone());
        let reparsed = Path::parse(&path.to_string());
        prop_assert_eq!(&reparsed, &path);
        prop_assert_eq!(path.segments(), &segments[..]);
    }

    #[test]
    fn parse_never_yields_empty_segments(raw in "[a-z.]{0,24}") {
        let path = Path::parse(&raw);
        prop_assert!(path.segments().iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn suffix_chain_terminates(segments in proptest::collection::vec(segment(), 0..6)) {
        let mut path = Path::from_segments(segments);
        let mut steps = 0usize;
        while !path.is_empty() {
            path = path.suffix();
            steps += 1;
            prop_assert!(steps <= 6);
        }
    }
}
