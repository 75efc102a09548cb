//! End-to-end walkthroughs of the core stream behaviours against an
//! 11-byte in-memory resource.

mod common;

use common::{StaticFetcher, EXAMPLE_DATA};
use range_stream::{ByteInterval, PruningLevel, RangeStream, StreamError};

fn iv(start: u64, stop: u64) -> ByteInterval {
    ByteInterval::new(start, stop).unwrap()
}

#[tokio::test]
async fn test_length_probe_on_empty_initial_interval() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();

    assert_eq!(stream.total_bytes().unwrap(), 11);
    assert_eq!(stream.total_range().unwrap(), iv(0, 11));
    assert!(stream.is_empty());
    assert_eq!(stream.spanning_range(), ByteInterval::EMPTY);
    // Exactly one zero-length probe went out
    assert_eq!(fetcher.fetch_log(), vec![ByteInterval::EMPTY]);
}

#[tokio::test]
async fn test_two_disjoint_adds() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();

    stream.add(iv(0, 3)).await.unwrap();
    stream.add(iv(7, 9)).await.unwrap();

    assert_eq!(stream.list_ranges(), vec![iv(0, 3), iv(7, 9)]);
    assert_eq!(stream.spanning_range(), iv(0, 9));
    assert_eq!(stream.active_range(), Some(iv(7, 9)));
}

#[tokio::test]
async fn test_head_overlap_under_replant() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();

    stream.add(iv(0, 5)).await.unwrap();
    stream.add(iv(0, 2)).await.unwrap();

    assert_eq!(stream.list_ranges(), vec![iv(0, 2), iv(2, 5)]);
    // The overlapped prefix was reassigned, not re-fetched: only the probe
    // and the original [0, 5) request went out.
    assert_eq!(fetcher.fetch_log(), vec![ByteInterval::EMPTY, iv(0, 5)]);

    // Both survivors read the right bytes
    let head = stream.read_all().await.unwrap();
    assert_eq!(&head[..], &EXAMPLE_DATA[0..2]);
    stream.add(iv(2, 5)).await.unwrap();
    let tail = stream.read_all().await.unwrap();
    assert_eq!(&tail[..], &EXAMPLE_DATA[2..5]);
}

#[tokio::test]
async fn test_tail_overlap_under_replant() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();

    stream.add(iv(0, 5)).await.unwrap();
    stream.add(iv(4, 8)).await.unwrap();

    assert_eq!(stream.list_ranges(), vec![iv(0, 4), iv(4, 8)]);
    let bytes = stream.read_all().await.unwrap();
    assert_eq!(&bytes[..], &EXAMPLE_DATA[4..8]);
}

#[tokio::test]
async fn test_subsumption_under_replant() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();

    stream.add(iv(0, 10)).await.unwrap();
    stream.add(iv(3, 6)).await.unwrap();

    // The old entry keeps only its pre-overlap prefix; nothing covers
    // [6, 10) any more.
    assert_eq!(stream.list_ranges(), vec![iv(0, 3), iv(3, 6)]);
    // The subsumed interval was carved out of the original response
    // without another request.
    assert_eq!(fetcher.fetch_log(), vec![ByteInterval::EMPTY, iv(0, 10)]);
    let bytes = stream.read_all().await.unwrap();
    assert_eq!(&bytes[..], &EXAMPLE_DATA[3..6]);
}

#[tokio::test]
async fn test_end_relative_magic_tail() {
    // Too short: 11 - 22 reaches before the start of the file
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher)
        .await
        .unwrap();
    assert!(matches!(
        stream.add((-22, None)).await,
        Err(StreamError::OutOfRange { .. })
    ));

    // Long enough: the final 22 bytes resolve and read back exactly
    let data: Vec<u8> = (0u8..100).collect();
    let fetcher = StaticFetcher::new(data.clone());
    let mut stream = RangeStream::new("https://example.com/long.bin", fetcher)
        .await
        .unwrap();
    let resolved = stream.add((-22, None)).await.unwrap();
    assert_eq!(resolved, iv(78, 100));
    let tail = stream.read(22).await.unwrap();
    assert_eq!(&tail[..], &data[78..]);
}

#[tokio::test]
async fn test_strict_rejects_overlap_and_rolls_back() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::with_options(
        "https://example.com/example.bin",
        fetcher.clone(),
        ByteInterval::EMPTY,
        PruningLevel::Strict,
    )
    .await
    .unwrap();

    stream.add(iv(0, 5)).await.unwrap();
    let err = stream.add(iv(4, 8)).await.unwrap_err();
    assert!(matches!(
        err,
        StreamError::OverlapDisallowed { start: 4, stop: 8 }
    ));

    // Store unchanged, and the rejected interval never hit the wire
    assert_eq!(stream.list_ranges(), vec![iv(0, 5)]);
    assert_eq!(fetcher.fetch_log(), vec![ByteInterval::EMPTY, iv(0, 5)]);
}

#[tokio::test]
async fn test_read_advances_tell_by_bytes_returned() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher)
        .await
        .unwrap();

    stream.add(iv(2, 9)).await.unwrap();
    assert_eq!(stream.tell().unwrap(), 2);
    let bytes = stream.read(3).await.unwrap();
    assert_eq!(bytes.len(), 3);
    assert_eq!(stream.tell().unwrap(), 5);
    // Reading past the end returns the remainder only
    let bytes = stream.read(100).await.unwrap();
    assert_eq!(bytes.len(), 4);
    assert_eq!(stream.tell().unwrap(), 9);
}

#[tokio::test]
async fn test_add_is_idempotent() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();

    stream.add(iv(0, 3)).await.unwrap();
    let after_first = stream.list_ranges();
    stream.add(iv(0, 3)).await.unwrap();

    assert_eq!(stream.list_ranges(), after_first);
    // The repeat add sent nothing
    assert_eq!(fetcher.fetch_log(), vec![ByteInterval::EMPTY, iv(0, 3)]);
}

#[tokio::test]
async fn test_empty_add_after_length_known_is_noop() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();
    stream.add(iv(3, 3)).await.unwrap();
    assert_eq!(fetcher.fetch_count(), 1);
    assert!(stream.is_empty());
}

#[tokio::test]
async fn test_read_before_add_fails() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher)
        .await
        .unwrap();
    assert!(matches!(
        stream.read(1).await,
        Err(StreamError::NoActiveRange)
    ));
    assert!(matches!(stream.tell(), Err(StreamError::NoActiveRange)));
}

#[tokio::test]
async fn test_out_of_range_add_leaves_store_untouched() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::new("https://example.com/example.bin", fetcher.clone())
        .await
        .unwrap();
    stream.add(iv(0, 3)).await.unwrap();
    assert!(matches!(
        stream.add(iv(5, 20)).await,
        Err(StreamError::OutOfRange { .. })
    ));
    assert_eq!(stream.list_ranges(), vec![iv(0, 3)]);
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_initial_interval_becomes_active() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::with_options(
        "https://example.com/example.bin",
        fetcher.clone(),
        iv(0, 11),
        PruningLevel::Replant,
    )
    .await
    .unwrap();

    // A non-empty initial interval needs no separate probe
    assert_eq!(fetcher.fetch_log(), vec![iv(0, 11)]);
    assert_eq!(stream.total_bytes().unwrap(), 11);
    assert_eq!(stream.active_range(), Some(iv(0, 11)));
    let all = stream.read_all().await.unwrap();
    assert_eq!(&all[..], EXAMPLE_DATA);
}

#[tokio::test]
async fn test_reading_shrinks_external_view() {
    let fetcher = StaticFetcher::new(EXAMPLE_DATA);
    let mut stream = RangeStream::with_options(
        "https://example.com/example.bin",
        fetcher,
        iv(0, 11),
        PruningLevel::Replant,
    )
    .await
    .unwrap();

    stream.read(4).await.unwrap();
    assert_eq!(stream.list_ranges(), vec![iv(4, 11)]);
    // The request interval is unchanged underneath
    assert_eq!(
        stream.active_response().unwrap().request_interval(),
        iv(0, 11)
    );
}
