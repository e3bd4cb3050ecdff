//! Union over real directories.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use braid_kernel::{
    Branch, BranchMode, Category, Config, LocalFs, NativeFs, PolicyRegistry, Ugid, Union,
};
use nix::fcntl::OFlag;
use tempfile::TempDir;

struct Local {
    a: TempDir,
    b: TempDir,
    union: Union,
    me: Ugid,
}

fn local(mode_a: BranchMode, create: &str) -> Local {
    let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let policy = PolicyRegistry::builtin().get(create, Category::Create).unwrap();
    let config = Config::new(vec![
        Branch::new(a.path(), mode_a),
        Branch::new(b.path(), BranchMode::ReadWrite),
    ])
    .unwrap()
    .with_min_free_space(0)
    .with_policy(policy);
    config.check_roots(&LocalFs).unwrap();
    let union = Union::local(config);
    let me = union.identity().current();
    Local { a, b, union, me }
}

fn mode(path: impl AsRef<Path>) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[test]
fn create_write_release_read_back() {
    let t = local(BranchMode::ReadWrite, "ff");

    let reply = t
        .union
        .create(t.me, Path::new("/hello.txt"), OFlag::O_RDWR.bits(), 0o640)
        .unwrap();
    assert_eq!(t.union.write(reply.fh, b"hi there", 0).unwrap(), 8);
    t.union.fsync(reply.fh, false).unwrap();
    t.union.release(reply.fh).unwrap();

    assert_eq!(fs::read(t.a.path().join("hello.txt")).unwrap(), b"hi there");
    assert!(!t.b.path().join("hello.txt").exists());
    assert_eq!(t.union.getattr(t.me, Path::new("hello.txt")).unwrap().size, 8);
}

#[test]
fn mkdir_on_no_create_first_branch_lands_on_second() {
    let t = local(BranchMode::NoCreate, "ff");
    fs::create_dir(t.a.path().join("d")).unwrap();
    fs::set_permissions(t.a.path().join("d"), fs::Permissions::from_mode(0o750)).unwrap();

    t.union.mkdir(t.me, Path::new("d/e"), 0o755).unwrap();

    assert!(t.b.path().join("d/e").is_dir());
    assert_eq!(mode(t.b.path().join("d")), 0o750);
    assert!(!t.a.path().join("d/e").exists());
}

#[test]
fn chmod_and_rename_every_copy() {
    let t = local(BranchMode::ReadWrite, "epmfs");
    for dir in [&t.a, &t.b] {
        fs::write(dir.path().join("f"), b"x").unwrap();
    }

    t.union.chmod(t.me, Path::new("f"), 0o600).unwrap();
    t.union.rename(t.me, Path::new("f"), Path::new("g")).unwrap();

    for dir in [&t.a, &t.b] {
        assert!(!dir.path().join("f").exists());
        assert_eq!(mode(dir.path().join("g")), 0o600);
    }
}

#[test]
fn statfs_dedups_branches_on_one_filesystem() {
    let t = local(BranchMode::ReadWrite, "ff");

    let union_space = t.union.statfs(t.me, Path::new("/")).unwrap();
    let single = LocalFs.statvfs(t.a.path()).unwrap();

    // both tempdirs live on the same filesystem
    assert_eq!(union_space.block_size, single.block_size);
    assert_eq!(union_space.blocks, single.blocks);
}
