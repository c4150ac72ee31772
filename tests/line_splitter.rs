use proptest::prelude::*;
use procvisor::exec::LineSplitter;

fn split_all(chunks: &[&[u8]]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut splitter = LineSplitter::new();
    for chunk in chunks {
        splitter.push(chunk, |line| lines.push(line.to_string()));
    }
    splitter.finish(|line| lines.push(line.to_string()));
    lines
}

#[test]
fn strips_crlf_and_flushes_trailing_partial_line() {
    let lines = split_all(&[b"alpha\r\nbe", b"ta\n\ngam", b"ma"]);
    assert_eq!(lines, vec!["alpha", "beta", "", "gamma"]);
}

#[test]
fn invalid_utf8_is_replaced_not_dropped() {
    let lines = split_all(&[b"ok\n\xff\xfe\n"]);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "ok");
    assert!(lines[1].contains('\u{FFFD}'));
}

proptest! {
    // However the bytes are chunked, the same lines come out.
    #[test]
    fn chunking_does_not_change_lines(
        data in proptest::collection::vec(
            prop_oneof![Just(b'\n'), Just(b'\r'), b'a'..=b'z'],
            0..200,
        ),
        cuts in proptest::collection::vec(any::<usize>(), 0..8),
    ) {
        let whole = split_all(&[&data]);

        let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
        points.sort_unstable();
        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(&data[start..p]);
            start = p;
        }
        chunks.push(&data[start..]);

        prop_assert_eq!(split_all(&chunks), whole);
    }

    #[test]
    fn line_count_matches_newlines(data in proptest::collection::vec(any::<u8>(), 0..200)) {
        let lines = split_all(&[&data]);
        let newlines = data.iter().filter(|b| **b == b'\n').count();
        let trailing = usize::from(!data.is_empty() && data.last() != Some(&b'\n'));
        prop_assert_eq!(lines.len(), newlines + trailing);
    }
}
