use dupes_analyze::{
    AggregationConfig, AggregationEngine, AggregationOutcome, AnalyzeError, Blake3Hasher,
    ContentHash, ContentHasher, FileIdentity, GoldenDelete, GroupPaths, HashError, MetadataCache,
    NamePattern, SelectionPolicy, build_report, find_by_content, find_by_name, hash_bytes,
};
use dupes_scan::{ScanConfig, TreeWalker, WarningKind};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

struct CountingHasher {
    calls: AtomicUsize,
}

impl CountingHasher {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentHasher for CountingHasher {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Blake3Hasher.hash_file(path)
    }
}

/// Refuses to read files with the given name.
struct LockedHasher {
    locked: &'static str,
}

impl ContentHasher for LockedHasher {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        if path.file_name().and_then(|n| n.to_str()) == Some(self.locked) {
            return Err(HashError::unreadable(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
            ));
        }
        Blake3Hasher.hash_file(path)
    }
}

fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn run<H: ContentHasher>(
    roots: &[&Path],
    cache: &mut MetadataCache,
    hasher: H,
) -> Result<AggregationOutcome, AnalyzeError> {
    let walker = TreeWalker::new(ScanConfig::new(roots.iter().copied())).unwrap();
    let mut engine = AggregationEngine::new(cache, hasher, AggregationConfig::default());
    engine.consume(walker.walk())?;
    engine.finish()
}

fn all_paths(paths: &GroupPaths) -> Vec<PathBuf> {
    paths.iter().cloned().collect()
}

#[test]
fn test_end_to_end_files_and_empty_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let a = write(root, "a.txt", "hello world");
    let copy_a = write(root, "copy/a.txt", "hello world");
    let empty = write(root, "empty.txt", "");
    let copy_empty = write(root, "copy/empty.txt", "");

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[root], &mut cache, Blake3Hasher).unwrap();
    let report = build_report(&outcome.aggregates, &SelectionPolicy::ReportAll, 0);

    assert_eq!(report.group_count, 2);
    assert!(report.groups.iter().all(|g| !g.is_directory));

    assert_eq!(report.groups[0].size, 11);
    assert_eq!(all_paths(&report.groups[0].paths), vec![a, copy_a]);
    assert_eq!(report.groups[1].size, 0);
    assert_eq!(all_paths(&report.groups[1].paths), vec![copy_empty, empty]);
}

#[test]
fn test_identical_subtrees_reported_once() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "x/y/1.txt", "first");
    write(root, "x/y/2.txt", "second");
    write(root, "x/z/1.txt", "first");
    write(root, "x/z/2.txt", "second");

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[root], &mut cache, Blake3Hasher).unwrap();
    let report = build_report(&outcome.aggregates, &SelectionPolicy::ReportAll, 0);

    assert_eq!(report.group_count, 1);
    let group = &report.groups[0];
    assert!(group.is_directory);
    assert_eq!(group.file_count, 2);
    assert_eq!(group.size, 11);
    assert_eq!(
        all_paths(&group.paths),
        vec![root.join("x/y"), root.join("x/z")]
    );
    assert_eq!(report.suppressed, 2);
}

#[test]
fn test_directory_hash_ignores_names_and_listing_order() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "left/b.txt", "bbb");
    write(root, "left/a.txt", "aa");
    write(root, "right/zz.txt", "aa");
    write(root, "right/yy.txt", "bbb");

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[root], &mut cache, Blake3Hasher).unwrap();

    let dirs: Vec<_> = outcome
        .duplicated()
        .filter(|(hash, _)| hash.is_directory())
        .collect();
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].1.paths.contains(&root.join("left")));
    assert!(dirs[0].1.paths.contains(&root.join("right")));
}

#[test]
fn test_warm_cache_computes_no_hashes() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    write(&root, "a.txt", "alpha");
    write(&root, "sub/a.txt", "alpha");
    write(&root, "sub/b.txt", "beta");
    let cache_path = temp.path().join("cache.json");

    let first_hasher = CountingHasher::new();
    let mut cache = MetadataCache::open(&cache_path);
    let first = run(&[&root], &mut cache, &first_hasher).unwrap();
    cache.persist().unwrap();
    assert_eq!(first_hasher.calls(), 3);

    let second_hasher = CountingHasher::new();
    let mut cache = MetadataCache::open(&cache_path);
    assert_eq!(cache.len(), 3);
    let second = run(&[&root], &mut cache, &second_hasher).unwrap();
    assert_eq!(second_hasher.calls(), 0);
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(second.stats.hashes, 0);

    let first_report = build_report(&first.aggregates, &SelectionPolicy::ReportAll, 0);
    let second_report = build_report(&second.aggregates, &SelectionPolicy::ReportAll, 0);
    assert_eq!(
        serde_json::to_value(&first_report.groups).unwrap(),
        serde_json::to_value(&second_report.groups).unwrap()
    );
    assert_eq!(first.aggregates, second.aggregates);
}

#[test]
fn test_same_size_and_mtime_is_a_stale_hit() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    let file = write(&root, "data.bin", "aaaa");
    let mtime = FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(&file, mtime).unwrap();

    let mut cache = MetadataCache::in_memory();
    run(&[&root], &mut cache, Blake3Hasher).unwrap();

    fs::write(&file, "bbbb").unwrap();
    filetime::set_file_mtime(&file, mtime).unwrap();
    run(&[&root], &mut cache, Blake3Hasher).unwrap();

    let identity = FileIdentity::from_path(&file).unwrap();
    let stats = cache.get(&identity).unwrap();
    assert_eq!(stats.content_hash, Some(hash_bytes(b"aaaa")));

    filetime::set_file_mtime(&file, FileTime::from_unix_time(1_600_000_001, 0)).unwrap();
    run(&[&root], &mut cache, Blake3Hasher).unwrap();
    let stats = cache.get(&identity).unwrap();
    assert_eq!(stats.content_hash, Some(hash_bytes(b"bbbb")));
}

#[test]
fn test_unhashable_file_excludes_enclosing_directories() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    write(&root, "one/x.txt", "same");
    write(&root, "one/locked.txt", "L");
    write(&root, "two/x.txt", "same");
    write(&root, "two/locked.txt", "L");
    write(&root, "three/y.txt", "why");
    write(&root, "four/y.txt", "why");

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[&root], &mut cache, LockedHasher { locked: "locked.txt" }).unwrap();

    assert_eq!(outcome.stats.unhashable_files, 2);
    assert!(
        outcome
            .warnings
            .iter()
            .all(|w| w.kind == WarningKind::Unhashable)
    );
    assert_eq!(outcome.warnings.len(), 2);

    let dir_paths: Vec<&PathBuf> = outcome
        .aggregates
        .iter()
        .filter(|(hash, _)| hash.is_directory())
        .flat_map(|(_, agg)| agg.paths.iter())
        .collect();
    assert!(!dir_paths.contains(&&root.join("one")));
    assert!(!dir_paths.contains(&&root.join("two")));
    assert!(!dir_paths.contains(&&root));
    assert!(dir_paths.contains(&&root.join("three")));

    let report = build_report(&outcome.aggregates, &SelectionPolicy::ReportAll, 0);
    let reported: Vec<Vec<PathBuf>> = report.groups.iter().map(|g| all_paths(&g.paths)).collect();
    assert!(reported.contains(&vec![root.join("four"), root.join("three")]));
    assert!(reported.contains(&vec![root.join("one/x.txt"), root.join("two/x.txt")]));

    let identity = FileIdentity::from_path(&root.join("one/locked.txt")).unwrap();
    assert!(!cache.get(&identity).unwrap().is_hashed());
}

#[cfg(unix)]
#[test]
fn test_incomplete_subdirectory_spares_siblings() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    write(&root, "left/k.txt", "kept");
    write(&root, "left/inner/v.txt", "value");
    write(&root, "right/k.txt", "kept");
    write(&root, "right/inner/v.txt", "value");
    write(&root, "p/q.txt", "cue");
    write(&root, "r/q.txt", "cue");
    fs::write(root.join("left/inner").join(OsStr::from_bytes(b"\xff")), "?").unwrap();

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[&root], &mut cache, Blake3Hasher).unwrap();

    let dir_paths: Vec<&PathBuf> = outcome
        .aggregates
        .iter()
        .filter(|(hash, _)| hash.is_directory())
        .flat_map(|(_, agg)| agg.paths.iter())
        .collect();
    assert!(!dir_paths.contains(&&root.join("left/inner")));
    assert!(!dir_paths.contains(&&root.join("left")));
    assert!(!dir_paths.contains(&&root));
    assert!(dir_paths.contains(&&root.join("right")));
    assert!(dir_paths.contains(&&root.join("right/inner")));

    let report = build_report(&outcome.aggregates, &SelectionPolicy::ReportAll, 0);
    let reported: Vec<Vec<PathBuf>> = report.groups.iter().map(|g| all_paths(&g.paths)).collect();
    assert!(reported.contains(&vec![root.join("p"), root.join("r")]));
    assert!(reported.contains(&vec![root.join("left/k.txt"), root.join("right/k.txt")]));
    assert!(reported.contains(&vec![
        root.join("left/inner/v.txt"),
        root.join("right/inner/v.txt")
    ]));
}

#[test]
fn test_aliased_roots_are_not_duplicates() {
    let temp = TempDir::new().unwrap();
    let base = fs::canonicalize(temp.path()).unwrap();
    let data = base.join("data");
    let alias = base.join("other/../data");
    fs::create_dir(base.join("other")).unwrap();
    write(&data, "only.txt", "the only copy!");

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[&data, &alias], &mut cache, Blake3Hasher).unwrap();
    assert_eq!(outcome.duplicated().count(), 0);

    let report = build_report(&outcome.aggregates, &SelectionPolicy::ReportAll, 0);
    assert_eq!(report.group_count, 0);

    let policy = SelectionPolicy::GoldenDelete(GoldenDelete::new([&data], [&alias]));
    let report = build_report(&outcome.aggregates, &policy, 0);
    assert_eq!(report.group_count, 0);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_root_is_never_hashed() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let bad = temp.path().join(OsStr::from_bytes(b"caf\xe9"));
    let good = temp.path().join("tree");
    write(&bad, "a.txt", "a");
    write(&good, "a.txt", "a");
    let cache_path = temp.path().join("cache.json");

    let walk = TreeWalker::new(ScanConfig::new([&bad, &good])).unwrap().walk();
    assert_eq!(walk.warnings().len(), 1);
    assert_eq!(walk.warnings()[0].kind, WarningKind::NonUtf8Name);

    for round in 0..2 {
        let hasher = CountingHasher::new();
        let mut cache = MetadataCache::open(&cache_path);
        let outcome = run(&[&bad, &good], &mut cache, &hasher).unwrap();
        cache.persist().unwrap();

        assert_eq!(outcome.stats.files, 1);
        assert_eq!(hasher.calls(), if round == 0 { 1 } else { 0 });
    }
}

#[test]
fn test_golden_delete_report() {
    let temp = TempDir::new().unwrap();
    let golden = temp.path().join("golden");
    let delete = temp.path().join("delete");
    write(&golden, "photos/a.jpg", "jpeg bytes");
    write(&delete, "backup/a.jpg", "jpeg bytes");
    write(&delete, "backup/b.jpg", "only in delete");
    write(&delete, "elsewhere/b.jpg", "only in delete");

    let mut cache = MetadataCache::in_memory();
    let outcome = run(&[&golden, &delete], &mut cache, Blake3Hasher).unwrap();
    let policy = SelectionPolicy::GoldenDelete(GoldenDelete::new([&golden], [&delete]));
    let report = build_report(&outcome.aggregates, &policy, 0);

    assert_eq!(report.group_count, 1);
    assert_eq!(
        report.groups[0].paths,
        GroupPaths::GoldenDelete {
            golden: vec![golden.join("photos/a.jpg")],
            delete: vec![delete.join("backup/a.jpg")],
        }
    );

    let mut out = Vec::new();
    report.write_text(&mut out, "gio trash --").unwrap();
    let text = String::from_utf8(out).unwrap();
    let expected = format!(
        "# {}\ngio trash -- '{}'\n\n",
        golden.join("photos/a.jpg").display(),
        delete.join("backup/a.jpg").display()
    );
    assert_eq!(text, expected);
}

#[test]
fn test_interrupted_run_keeps_cache_entries() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    write(&root, "a.txt", "a");
    let cache_path = temp.path().join("cache.json");

    let mut cache = MetadataCache::open(&cache_path);
    cache
        .get_or_refresh(
            &FileIdentity::from_path(&root.join("a.txt")).unwrap(),
            1,
            0,
            &Blake3Hasher,
        )
        .unwrap();

    let walker = TreeWalker::new(ScanConfig::new([&root])).unwrap();
    let flag = Arc::new(AtomicBool::new(true));
    let mut engine = AggregationEngine::new(&mut cache, Blake3Hasher, AggregationConfig::default())
        .with_interrupt(flag);
    let err = engine.consume(walker.walk()).unwrap_err();
    assert!(matches!(err, AnalyzeError::Interrupted));
    drop(engine);

    cache.persist().unwrap();
    assert_eq!(MetadataCache::open(&cache_path).len(), 1);
}

#[test]
fn test_cache_lookups() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    write(&root, "Music/song.MP3", "tune");
    write(&root, "backup/song.mp3", "tune");
    write(&root, "notes.txt", "text");

    let mut cache = MetadataCache::in_memory();
    run(&[&root], &mut cache, Blake3Hasher).unwrap();

    let same = find_by_content(&cache, &hash_bytes(b"tune"), 4);
    assert_eq!(
        same,
        vec![root.join("Music/song.MP3"), root.join("backup/song.mp3")]
    );
    assert!(find_by_content(&cache, &hash_bytes(b"tune"), 5).is_empty());

    let pattern = NamePattern::new("%/song.mp_").unwrap();
    assert_eq!(find_by_name(&cache, &pattern).len(), 2);
}
