//! Integration tests: full downloads against a local range server, resume
//! from a journal, and the fatal HEAD outcomes.

mod common;

use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};

use common::range_server::{self, ServerOptions};
use rdm_core::block_store::{journal_path, BlockStore, BLOCK_SIZE};
use rdm_core::downloader::{DownloadOptions, Downloader, FetchError, Stage, Step};
use rdm_core::retry::{RetryPolicy, TransferError};
use tempfile::tempdir;

fn body_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn options(channels: usize) -> DownloadOptions {
    DownloadOptions {
        channels,
        retry: RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..DownloadOptions::default()
    }
}

fn fetch(url: &str, path: &Path, expected: Option<u64>, channels: usize) -> Result<(), FetchError> {
    let mut d = Downloader::new(options(channels));
    d.configure(url, path, expected);
    d.run(&mut |_: u64, _: u64| true)
}

/// A local URL with nothing listening behind it.
fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/data")
}

#[test]
fn small_file_downloads_and_matches() {
    let body = body_of(64 * 1024);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let path = dir.path().join("small.bin");

    fetch(&server.data_url(), &path, Some(body.len() as u64), 2).expect("download");

    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert!(!journal_path(&path).exists(), "journal removed on completion");
    assert_eq!(server.heads(), 1);
    assert_eq!(server.gets(), 1);
}

#[test]
fn multi_block_file_uses_one_request_per_block() {
    let body = body_of(2 * BLOCK_SIZE as usize + 12_345);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("multi.bin");

    let mut d = Downloader::new(options(3));
    d.configure(&server.data_url(), &path, None);
    let mut reports = Vec::new();
    d.run(&mut |done: u64, total: u64| {
        reports.push((done, total));
        true
    })
    .expect("download");

    assert_eq!(d.stage(), Stage::Finished);
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert!(!journal_path(&path).exists());
    assert_eq!(server.gets(), 3);
    let total = body.len() as u64;
    assert_eq!(reports.last(), Some(&(total, total)));
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0 || w[1].1 == 0));
}

#[test]
fn empty_file_completes_without_block_requests() {
    let server = range_server::start(Vec::new());
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.bin");

    fetch(&server.data_url(), &path, None, 2).expect("download");

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    assert_eq!(server.gets(), 0);
}

#[test]
fn resume_skips_blocks_recorded_in_the_journal() {
    let block = BLOCK_SIZE as usize;
    let body = body_of(3 * block + 1000);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let path = dir.path().join("resume.bin");

    let mut store = BlockStore::create(&path, body.len() as u64).unwrap();
    store.save_block(0, &body[..block]).unwrap();
    store.save_block(2, &body[2 * block..3 * block]).unwrap();
    store.close();

    fetch(&server.data_url(), &path, None, 2).expect("resume");

    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(server.gets(), 2, "only blocks 1 and 3 are fetched");
    assert_eq!(server.ranged_gets(), 2);
}

#[test]
fn stale_journal_with_other_length_starts_over() {
    let body = body_of(100_000);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let path = dir.path().join("changed.bin");

    let mut store = BlockStore::create(&path, 5_000).unwrap();
    store.save_block(0, &[7u8; 5_000]).unwrap();
    store.close();

    fetch(&server.data_url(), &path, None, 1).expect("download");

    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(server.gets(), 1);
}

#[test]
fn user_abort_keeps_journal_and_next_run_resumes() {
    let body = body_of(BLOCK_SIZE as usize + 500);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    let path = dir.path().join("abort.bin");

    let mut d = Downloader::new(options(2));
    d.configure(&server.data_url(), &path, None);
    let err = d.run(&mut |_: u64, total: u64| total == 0).unwrap_err();
    assert!(matches!(err, FetchError::UserAbort));
    assert_eq!(d.stage(), Stage::Prepare);
    assert!(path.exists());
    assert!(journal_path(&path).exists(), "journal kept for resume");

    d.run(&mut |_: u64, _: u64| true).expect("resume after abort");
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert!(!journal_path(&path).exists());
}

#[test]
fn redirect_is_followed_once_and_blocks_use_final_url() {
    let body = body_of(BLOCK_SIZE as usize + 10);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            redirect: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("redirected.bin");

    fetch(&server.redirect_url(), &path, None, 2).expect("download");

    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(server.heads(), 1);
    assert_eq!(server.gets(), 2);
}

#[test]
fn throttled_blocks_are_retried() {
    let body = body_of(30_000);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            fail_first_gets: 2,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("retry.bin");

    fetch(&server.data_url(), &path, None, 1).expect("download after retries");

    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(server.gets(), 3);
}

#[test]
fn persistent_throttling_exhausts_retries() {
    let server = range_server::start_with_options(
        body_of(1000),
        ServerOptions {
            fail_first_gets: usize::MAX,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("busy.bin");

    let err = fetch(&server.data_url(), &path, None, 1).unwrap_err();
    match err {
        FetchError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 6),
        other => panic!("unexpected error: {other}"),
    }
    assert!(journal_path(&path).exists());
}

#[test]
fn forbidden_block_is_rejected_without_retry() {
    let server = range_server::start_with_options(
        body_of(1000),
        ServerOptions {
            reject_gets: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("forbidden.bin");

    let err = fetch(&server.data_url(), &path, None, 1).unwrap_err();
    assert!(matches!(err, FetchError::Rejected(_)), "got {err}");
    assert_eq!(server.gets(), 1);
}

#[test]
fn size_mismatch_fails_before_creating_files() {
    let server = range_server::start(body_of(1000));
    let dir = tempdir().unwrap();
    let path = dir.path().join("mismatch.bin");

    let err = fetch(&server.data_url(), &path, Some(999), 1).unwrap_err();
    assert!(matches!(
        err,
        FetchError::FileSizeMismatch {
            expected: 999,
            actual: 1000
        }
    ));
    assert!(!path.exists());
    assert!(!journal_path(&path).exists());
}

#[test]
fn missing_content_length_is_unknown_size() {
    let server = range_server::start_with_options(
        body_of(1000),
        ServerOptions {
            hide_length: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("unknown.bin");

    let err = fetch(&server.data_url(), &path, None, 1).unwrap_err();
    assert!(matches!(err, FetchError::FileSizeUnknown));
    assert!(!path.exists());
}

#[test]
fn head_status_other_than_200_fails() {
    let server = range_server::start(body_of(10));
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.bin");

    let err = fetch(&server.url("/nope"), &path, None, 1).unwrap_err();
    assert!(matches!(err, FetchError::Failed { status: 404 }));
}

#[test]
fn unreachable_server_exhausts_head_retries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("unreachable.bin");
    let mut opts = options(2);
    opts.retry.max_retries = 3;

    let mut d = Downloader::new(opts);
    d.configure(&refused_url(), &path, None);
    let err = d.run(&mut |_: u64, _: u64| true).unwrap_err();

    assert!(
        matches!(
            err,
            FetchError::RetriesExhausted {
                attempts: 4,
                last: TransferError::Transport(_)
            }
        ),
        "got {err}"
    );
    assert_eq!(d.stage(), Stage::Prepare);
    assert!(!path.exists());
    assert!(!journal_path(&path).exists());
}

#[test]
fn dropped_head_requests_are_retried() {
    let body = body_of(20_000);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            drop_first_heads: 2,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("flaky-head.bin");

    fetch(&server.data_url(), &path, None, 1).expect("download after HEAD retries");

    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(server.heads(), 3);
    assert_eq!(server.gets(), 1);
}

#[test]
fn buffered_bytes_count_while_a_block_is_in_flight() {
    let body = body_of(64 * 1024);
    let first = 16 * 1024;
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            pause_body: Some((first, Duration::from_millis(800))),
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("in-flight.bin");
    let total = body.len() as u64;

    let mut d = Downloader::new(options(1));
    d.configure(&server.data_url(), &path, None);
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut input = 0;
    let mut saw_partial = false;
    loop {
        let step = d.advance().expect("advance");
        input += d.last_input();
        let fetched = d.fetched_size();
        assert!(fetched <= total);
        if fetched >= first as u64 && fetched < total {
            saw_partial = true;
        }
        if step == Step::Finished {
            break;
        }
        assert!(Instant::now() < deadline, "download stalled");
    }

    assert!(saw_partial, "the paused body was never reported as fetched");
    assert_eq!(input, total, "every received byte is reported once");
    assert_eq!(d.fetched_size(), total);
    assert_eq!(std::fs::read(&path).unwrap(), body);
}

#[test]
fn failed_block_is_retried_without_refetching_others() {
    let body = body_of(2 * BLOCK_SIZE as usize + 1000);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            fail_first_gets: 1,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("one-failure.bin");

    fetch(&server.data_url(), &path, None, 2).expect("download");
    assert_eq!(std::fs::read(&path).unwrap(), body);

    let ranges = server.ranges();
    assert_eq!(ranges.len(), 4, "three blocks plus one retry: {ranges:?}");
    let failed: Vec<_> = ranges.iter().filter(|(_, served)| !served).collect();
    assert_eq!(failed.len(), 1);
    let failed_range = failed[0].0;
    let mut served: Vec<_> = ranges.iter().filter(|(_, s)| *s).map(|(r, _)| *r).collect();
    served.sort();
    let block = BLOCK_SIZE;
    let total = body.len() as u64;
    assert_eq!(
        served,
        vec![(0, block - 1), (block, 2 * block - 1), (2 * block, total - 1)],
        "each block is served exactly once"
    );
    let failed_at = ranges.iter().position(|(r, s)| *r == failed_range && !s).unwrap();
    assert!(ranges[failed_at + 1..].iter().any(|(r, s)| *r == failed_range && *s));
}

#[test]
fn full_body_for_a_ranged_request_is_refused_early() {
    let body = body_of(BLOCK_SIZE as usize + 5_000);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            ignore_ranges: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("no-ranges.bin");

    let err = fetch(&server.data_url(), &path, None, 1).unwrap_err();
    match err {
        FetchError::Rejected(TransferError::UnexpectedRange { status, len, .. }) => {
            assert_eq!(status, 200);
            assert!(len < body.len() as u64, "body was buffered: {len}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.gets(), 1);
}

#[test]
fn full_body_is_accepted_for_a_single_block_file() {
    let body = body_of(30_000);
    let server = range_server::start_with_options(
        body.clone(),
        ServerOptions {
            ignore_ranges: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.bin");

    fetch(&server.data_url(), &path, None, 2).expect("download");
    assert_eq!(std::fs::read(&path).unwrap(), body);
}
