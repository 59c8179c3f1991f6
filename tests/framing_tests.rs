use camlink::framing::{contains_separator, frame, FrameScanner, SEPARATOR};

fn payloads() -> Vec<Vec<u8>> {
    vec![
        b"\xff\xd8first\xff\xd9".to_vec(),
        vec![0u8; 300],
        // fast ein Separator, aber eben nicht ganz
        SEPARATOR[..SEPARATOR.len() - 1].to_vec(),
        b"x".to_vec(),
    ]
}

#[test]
fn separator_is_the_fixed_twelve_byte_marker() {
    assert_eq!(SEPARATOR.len(), 12);
    let text = std::str::from_utf8(SEPARATOR).unwrap();
    assert_eq!(text.chars().count(), 11);
    assert_eq!(text, "ÿ\0\0\0ÿ\0\0\0ÿ");
}

#[test]
fn stream_of_frames_survives_any_chunking() {
    let mut wire = Vec::new();
    for p in payloads() {
        assert!(!contains_separator(&p));
        wire.extend(frame(&p));
    }

    for chunk in [1usize, 2, 5, 11, 12, 13, 64, 4096] {
        let mut scanner = FrameScanner::new(1 << 16);
        let mut out = Vec::new();
        for piece in wire.chunks(chunk) {
            scanner.push(piece);
            while let Some(f) = scanner.next_frame().unwrap() {
                out.push(f.to_vec());
            }
        }
        assert_eq!(out, payloads(), "chunk size {chunk}");
        assert_eq!(scanner.pending_len(), 0);
    }
}

#[test]
fn trailing_partial_frame_stays_pending() {
    let mut scanner = FrameScanner::default();
    scanner.push(&frame(b"done"));
    scanner.push(b"half a fra");

    assert_eq!(scanner.next_frame().unwrap().as_deref(), Some(&b"done"[..]));
    assert!(scanner.next_frame().unwrap().is_none());
    assert_eq!(scanner.pending_len(), 10);
}
