//! Branch selection against an in-memory filesystem.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use braid_kernel::{BraidError, Branch, BranchMode, Category, Errno, PolicyRegistry};
use braid_testutil::RecordingFs;
use rstest::rstest;

const MB: u64 = 1 << 20;

fn fs_with(branches: &[(&str, u64)]) -> RecordingFs {
    let fs = RecordingFs::new();
    for (root, available) in branches {
        fs.add_root(root).set_available(root, *available);
    }
    fs
}

fn select(
    fs: &RecordingFs,
    branches: &[Branch],
    name: &str,
    category: Category,
    path: &str,
    min: u64,
) -> Result<Vec<PathBuf>, BraidError> {
    let policy = PolicyRegistry::builtin().get(name, category).unwrap();
    policy
        .select(fs, branches, Path::new(path), min)
        .map(|picked| picked.iter().map(|b| b.root().to_path_buf()).collect())
}

fn roots(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

#[rstest]
#[case::ff("ff")]
#[case::all("all")]
#[case::mfs("mfs")]
#[case::lfs("lfs")]
#[case::epmfs("epmfs")]
#[case::epall("epall")]
fn create_filters_read_only_no_create_and_low_space(#[case] name: &str) {
    let fs = fs_with(&[("/rw", 10 * MB), ("/ro", 100 * MB), ("/nc", 100 * MB)]);
    let branches = [
        Branch::new("/rw", BranchMode::ReadWrite),
        Branch::new("/ro", BranchMode::ReadOnly),
        Branch::new("/nc", BranchMode::NoCreate),
    ];

    let picked = select(&fs, &branches, name, Category::Create, "", 5 * MB).unwrap();
    assert_eq!(picked, roots(&["/rw"]));
}

#[test]
fn create_below_threshold_everywhere_is_enospc() {
    let fs = fs_with(&[("/a", MB), ("/b", 2 * MB)]);
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadWrite),
    ];

    let err = select(&fs, &branches, "mfs", Category::Create, "", 5 * MB).unwrap_err();
    assert_eq!(err, BraidError::no_branch(Errno::ENOSPC));
}

#[test]
fn per_branch_threshold_overrides_global() {
    let fs = fs_with(&[("/a", 10 * MB), ("/b", 10 * MB)]);
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite).with_min_free_space(20 * MB),
        Branch::new("/b", BranchMode::ReadWrite),
    ];

    let picked = select(&fs, &branches, "ff", Category::Create, "", 5 * MB).unwrap();
    assert_eq!(picked, roots(&["/b"]));
}

#[test]
fn zero_threshold_admits_full_branches() {
    let fs = fs_with(&[("/a", 0)]);
    let branches = [Branch::new("/a", BranchMode::ReadWrite)];

    let picked = select(&fs, &branches, "ff", Category::Create, "", 0).unwrap();
    assert_eq!(picked, roots(&["/a"]));
}

#[test]
fn mounted_read_only_is_erofs() {
    let fs = fs_with(&[("/a", 10 * MB)]);
    fs.set_read_only("/a", true);
    let branches = [Branch::new("/a", BranchMode::ReadWrite)];

    let err = select(&fs, &branches, "ff", Category::Create, "", 0).unwrap_err();
    assert_eq!(err, BraidError::no_branch(Errno::EROFS));
}

#[test]
fn search_requires_existence() {
    let fs = fs_with(&[("/a", MB), ("/b", MB), ("/c", MB)]);
    fs.add_file("/b/f", b"").add_file("/c/f", b"");
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadOnly),
        Branch::new("/c", BranchMode::ReadWrite),
    ];

    assert_eq!(
        select(&fs, &branches, "ff", Category::Search, "f", 0).unwrap(),
        roots(&["/b"])
    );
    assert_eq!(
        select(&fs, &branches, "epall", Category::Search, "f", 0).unwrap(),
        roots(&["/b", "/c"])
    );
    assert_eq!(
        select(&fs, &branches, "ff", Category::Search, "missing", 0).unwrap_err(),
        BraidError::no_branch(Errno::ENOENT)
    );
}

#[test]
fn action_keeps_no_create_but_drops_read_only() {
    let fs = fs_with(&[("/ro", MB), ("/nc", MB), ("/rw", MB)]);
    for root in ["/ro", "/nc", "/rw"] {
        fs.add_file(format!("{root}/f"), b"");
    }
    let branches = [
        Branch::new("/ro", BranchMode::ReadOnly),
        Branch::new("/nc", BranchMode::NoCreate),
        Branch::new("/rw", BranchMode::ReadWrite),
    ];

    let picked = select(&fs, &branches, "epall", Category::Action, "f", 0).unwrap();
    assert_eq!(picked, roots(&["/nc", "/rw"]));
    let picked = select(&fs, &branches, "ff", Category::Action, "f", 0).unwrap();
    assert_eq!(picked, roots(&["/nc"]));
}

#[test]
fn action_on_read_only_copy_only_is_erofs() {
    let fs = fs_with(&[("/ro", MB), ("/rw", MB)]);
    fs.add_file("/ro/f", b"");
    let branches = [
        Branch::new("/ro", BranchMode::ReadOnly),
        Branch::new("/rw", BranchMode::ReadWrite),
    ];

    let err = select(&fs, &branches, "epall", Category::Action, "f", 0).unwrap_err();
    assert_eq!(err, BraidError::no_branch(Errno::EROFS));
}

#[test]
fn existing_path_create_needs_parent() {
    let fs = fs_with(&[("/a", 50 * MB), ("/b", 10 * MB), ("/c", 20 * MB)]);
    fs.add_dir("/b/dir").add_dir("/c/dir");
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadWrite),
        Branch::new("/c", BranchMode::ReadWrite),
    ];

    assert_eq!(
        select(&fs, &branches, "epmfs", Category::Create, "dir", 0).unwrap(),
        roots(&["/c"])
    );
    assert_eq!(
        select(&fs, &branches, "epff", Category::Create, "dir", 0).unwrap(),
        roots(&["/b"])
    );
    assert_eq!(
        select(&fs, &branches, "mfs", Category::Create, "dir", 0).unwrap(),
        roots(&["/a"])
    );
}

#[test]
fn space_ties_keep_branch_order() {
    let fs = fs_with(&[("/a", 10 * MB), ("/b", 10 * MB)]);
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadWrite),
    ];

    for name in ["mfs", "lfs"] {
        let picked = select(&fs, &branches, name, Category::Create, "", 0).unwrap();
        assert_eq!(picked, roots(&["/a"]), "{name}");
    }
}

#[test]
fn lfs_picks_least_space() {
    let fs = fs_with(&[("/a", 30 * MB), ("/b", 10 * MB), ("/c", 20 * MB)]);
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadWrite),
        Branch::new("/c", BranchMode::ReadWrite),
    ];

    let picked = select(&fs, &branches, "lfs", Category::Create, "", 0).unwrap();
    assert_eq!(picked, roots(&["/b"]));
}

#[test]
fn newest_follows_mtime() {
    let fs = fs_with(&[("/a", MB), ("/b", MB), ("/c", MB)]);
    for (root, secs) in [("/a", 100), ("/b", 300), ("/c", 200)] {
        let path = format!("{root}/f");
        fs.add_file(&path, b"")
            .set_mtime(&path, UNIX_EPOCH + Duration::from_secs(secs));
    }
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadOnly),
        Branch::new("/c", BranchMode::ReadWrite),
    ];

    assert_eq!(
        select(&fs, &branches, "newest", Category::Search, "f", 0).unwrap(),
        roots(&["/b"])
    );
    // read-only /b holds the newest copy but cannot be changed
    assert_eq!(
        select(&fs, &branches, "newest", Category::Action, "f", 0).unwrap(),
        roots(&["/c"])
    );
}

#[test]
fn selection_never_mutates() {
    let fs = fs_with(&[("/a", MB), ("/b", MB)]);
    fs.add_file("/a/f", b"");
    let branches = [
        Branch::new("/a", BranchMode::ReadWrite),
        Branch::new("/b", BranchMode::ReadWrite),
    ];
    let registry = PolicyRegistry::builtin();

    for name in registry.names() {
        for category in [Category::Search, Category::Create, Category::Action] {
            let _ = select(&fs, &branches, name, category, "f", 0);
        }
    }
    assert!(fs.mutations().is_empty(), "{:?}", fs.mutations());
}
