//! Write-in-progress detection against real files.
//!
//! Each test gets an isolated `TempDir`; no shared state.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::thread;
use std::time::Duration;

use mediamirror_detector::{Detector, WriteActivity};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn detector(with_lsof: bool) -> Detector {
    let detector = Detector::new().with_sample_interval(Duration::from_millis(150));
    if with_lsof {
        detector
    } else {
        detector.without_lsof()
    }
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn absent_file_is_not_in_use(#[case] with_lsof: bool) {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("ghost.mov");
    assert!(!detector(with_lsof).is_in_use(&missing).await);
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn closed_stable_file_is_not_in_use(#[case] with_lsof: bool) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("clip.mov");
    fs::write(&path, vec![0u8; 4096]).expect("write fixture");

    assert!(!detector(with_lsof).is_in_use(&path).await);
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn growing_file_is_in_use(#[case] with_lsof: bool) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("recording.mxf");
    fs::write(&path, b"header").expect("seed file");

    let writer_path = path.clone();
    let writer = thread::spawn(move || {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&writer_path)
            .expect("open for append");
        for _ in 0..60 {
            file.write_all(&[7u8; 1024]).expect("append");
            file.flush().expect("flush");
            thread::sleep(Duration::from_millis(10));
        }
    });

    // Let the writer get going before sampling.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let in_use = detector(with_lsof).is_in_use(&path).await;
    writer.join().expect("writer thread");

    assert!(in_use, "a file receiving appends must be reported in use");
}
