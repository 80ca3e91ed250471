use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use mediamirror_core::{Config, InstanceType};
use mediamirror_detector::Detector;
use mediamirror_jobs::testing::{FakeToolkit, ToolCall};
use mediamirror_jobs::toolkit::MetadataFormat;
use mediamirror_sync::{reap, run_pass, PassStats, ReapStats, SyncContext};
use tempfile::TempDir;

struct Mirror {
    _root: TempDir,
    config: Arc<Config>,
}

impl Mirror {
    fn new() -> Self {
        let root = TempDir::new().expect("root");
        let config = Config {
            source_dir: root.path().join("source"),
            dest_dir: root.path().join("derived"),
            temp_dir: root.path().join("tmp"),
            ..Config::default()
        };
        fs::create_dir_all(&config.source_dir).expect("mkdir source");
        Self {
            _root: root,
            config: Arc::new(config),
        }
    }

    fn with_config(mut self, edit: impl FnOnce(&mut Config)) -> Self {
        let mut config = (*self.config).clone();
        edit(&mut config);
        self.config = Arc::new(config);
        self
    }

    fn context(&self, kind: InstanceType, tools: Arc<FakeToolkit>) -> SyncContext {
        let detector = Detector::new()
            .without_lsof()
            .with_sample_interval(Duration::from_millis(5));
        SyncContext::new(self.config.clone(), kind, tools, Arc::new(detector))
    }

    fn add_source(&self, name: &str, size: usize, mtime: i64) -> PathBuf {
        let path = self.config.source_dir.join(name);
        fs::write(&path, vec![7u8; size]).expect("write source");
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).expect("set mtime");
        path
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.config.dest_dir.join(name)
    }

    fn temp_is_clean(&self) -> bool {
        fs::read_dir(&self.config.temp_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

fn mtime(path: &Path) -> FileTime {
    FileTime::from_last_modification_time(&fs::metadata(path).expect("stat"))
}

const ONE_MIB: usize = 1024 * 1024;

#[tokio::test]
async fn new_source_gets_an_artifact_with_mirrored_mtime() {
    let mirror = Mirror::new();
    let tools = Arc::new(FakeToolkit::new());
    let ctx = mirror.context(InstanceType::Jsoninfo, tools.clone());
    mirror.add_source("clip.mov", ONE_MIB, 1_700_000_000);

    let stats = run_pass(&ctx).await.expect("pass");

    assert_eq!(stats, PassStats { seen: 1, processed: 1, failed: 0 });
    let artifact = mirror.artifact("clip.json");
    assert!(fs::metadata(&artifact).unwrap().len() > 0);
    assert_eq!(mtime(&artifact), FileTime::from_unix_time(1_700_000_000, 0));
    assert_eq!(
        tools.calls(),
        vec![ToolCall::DumpMetadata { format: MetadataFormat::Json }]
    );
    assert!(mirror.temp_is_clean());
}

#[tokio::test]
async fn second_pass_is_a_no_op() {
    let mirror = Mirror::new();
    let tools = Arc::new(FakeToolkit::new());
    let ctx = mirror.context(InstanceType::Jsoninfo, tools.clone());
    mirror.add_source("a.mov", ONE_MIB, 1_700_000_000);
    mirror.add_source("b.mov", ONE_MIB, 1_700_000_500);

    run_pass(&ctx).await.expect("first pass");
    let calls_after_first = tools.call_count();
    let stats = run_pass(&ctx).await.expect("second pass");

    assert_eq!(stats, PassStats { seen: 2, processed: 0, failed: 0 });
    assert_eq!(tools.call_count(), calls_after_first);
}

#[tokio::test]
async fn touched_source_is_regenerated() {
    let mirror = Mirror::new();
    let tools = Arc::new(FakeToolkit::new());
    let ctx = mirror.context(InstanceType::Waveform, tools.clone());
    let source = mirror.add_source("clip.mov", ONE_MIB, 1_700_000_000);
    run_pass(&ctx).await.expect("first pass");

    set_file_mtime(&source, FileTime::from_unix_time(1_700_009_999, 0)).unwrap();
    let stats = run_pass(&ctx).await.expect("second pass");

    assert_eq!(stats.processed, 1);
    assert_eq!(mtime(&mirror.artifact("clip.gif")), FileTime::from_unix_time(1_700_009_999, 0));
}

#[tokio::test]
async fn tiny_sources_are_never_processed() {
    let mirror = Mirror::new();
    let tools = Arc::new(FakeToolkit::new());
    let ctx = mirror.context(InstanceType::Jsoninfo, tools.clone());
    mirror.add_source("tiny.mov", 1024, 1_700_000_000);

    for _ in 0..3 {
        let stats = run_pass(&ctx).await.expect("pass");
        assert_eq!(stats, PassStats { seen: 1, processed: 0, failed: 0 });
    }
    assert!(!mirror.artifact("tiny.json").exists());
    assert_eq!(tools.call_count(), 0);
}

#[tokio::test]
async fn filmstrip_with_a_failing_frame_leaves_nothing_and_retries() {
    let mirror = Mirror::new();
    let tools = Arc::new(FakeToolkit::new().with_duration(Some(60.0)).failing_frame(7));
    let ctx = mirror.context(InstanceType::Filmstrip, tools.clone());
    mirror.add_source("clip.mov", ONE_MIB, 1_700_000_000);

    let stats = run_pass(&ctx).await.expect("pass");

    assert_eq!(stats, PassStats { seen: 1, processed: 0, failed: 1 });
    assert!(!mirror.artifact("clip.jpg").exists());
    assert!(mirror.temp_is_clean());

    let calls = tools.call_count();
    let retry = run_pass(&ctx).await.expect("retry pass");
    assert_eq!(retry.failed, 1);
    assert!(tools.call_count() > calls, "failed files are retried on the next pass");
}

#[tokio::test]
async fn failed_regeneration_keeps_the_previous_artifact() {
    let mirror = Mirror::new();
    let ctx = mirror.context(InstanceType::Xmlinfo, Arc::new(FakeToolkit::new().failing_all()));
    mirror.add_source("clip.mov", ONE_MIB, 1_700_000_000);
    fs::create_dir_all(&mirror.config.dest_dir).unwrap();
    let artifact = mirror.artifact("clip.xml");
    fs::write(&artifact, "<previous/>").unwrap();
    set_file_mtime(&artifact, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let stats = run_pass(&ctx).await.expect("pass");

    assert_eq!(stats.failed, 1);
    assert_eq!(fs::read_to_string(&artifact).unwrap(), "<previous/>");
    assert_eq!(mtime(&artifact), FileTime::from_unix_time(1_600_000_000, 0));
}

#[tokio::test]
async fn removed_source_has_its_artifact_reaped() {
    let mirror = Mirror::new();
    let ctx = mirror.context(InstanceType::Jsoninfo, Arc::new(FakeToolkit::new()));
    let source = mirror.add_source("clip.mov", ONE_MIB, 1_700_000_000);
    mirror.add_source("keep.mov", ONE_MIB, 1_700_000_000);
    run_pass(&ctx).await.expect("pass");
    assert!(mirror.artifact("clip.json").exists());

    fs::remove_file(&source).unwrap();
    let stats = reap(&mirror.config, "json").await.expect("reap");

    assert_eq!(stats, ReapStats { examined: 2, removed: 1 });
    assert!(!mirror.artifact("clip.json").exists());
    assert!(mirror.artifact("keep.json").exists());
}

#[tokio::test]
async fn reaping_can_be_disabled() {
    let mirror = Mirror::new().with_config(|c| c.disable_removal = true);
    fs::create_dir_all(&mirror.config.dest_dir).unwrap();
    fs::write(mirror.artifact("orphan.json"), "{}").unwrap();

    let stats = reap(&mirror.config, "json").await.expect("reap");

    assert_eq!(stats, ReapStats::default());
    assert!(mirror.artifact("orphan.json").exists());
}
