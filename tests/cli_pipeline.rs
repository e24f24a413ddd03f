//! Black-box tests driving the installed binaries the way a shell pipeline
//! would: `parpack` writing to stdout, `parunpack` reading from stdin.

use std::fs;
use std::os::unix::fs::MetadataExt;

use assert_cmd::Command;
use predicates::prelude::*;

fn parpack() -> Command {
    Command::cargo_bin("parpack").expect("parpack binary")
}

fn parunpack() -> Command {
    Command::cargo_bin("parunpack").expect("parunpack binary")
}

#[test]
fn pack_then_unpack_restores_the_tree() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let src = temp.path().join("tree");
    fs::create_dir(&src).expect("mkdir");
    fs::write(src.join("file"), b"piped bytes").expect("write");
    fs::create_dir(src.join("sub")).expect("mkdir sub");
    fs::hard_link(src.join("file"), src.join("sub").join("alias")).expect("link");

    let output = parpack().arg(&src).assert().success();
    let stream = output.get_output().stdout.clone();
    assert!(stream.starts_with(b"ParallelPack"));

    let dest = temp.path().join("dest");
    fs::create_dir(&dest).expect("mkdir dest");
    parunpack()
        .arg(&dest)
        .write_stdin(stream)
        .assert()
        .success();

    let out = dest.join("tree");
    assert_eq!(fs::read(out.join("file")).expect("read"), b"piped bytes");
    let a = fs::metadata(out.join("file")).expect("stat");
    let b = fs::metadata(out.join("sub").join("alias")).expect("stat");
    assert_eq!(a.ino(), b.ino(), "hard links survive the pipeline");
}

#[test]
fn compressed_pipeline_round_trips() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let src = temp.path().join("tree");
    fs::create_dir(&src).expect("mkdir");
    fs::write(src.join("file"), b"zzz".repeat(50_000)).expect("write");

    let output = parpack().arg("-z").arg(&src).assert().success();
    let stream = output.get_output().stdout.clone();

    let dest = temp.path().join("dest");
    fs::create_dir(&dest).expect("mkdir dest");
    parunpack()
        .arg(&dest)
        .write_stdin(stream)
        .assert()
        .success();
    assert_eq!(
        fs::read(dest.join("tree").join("file")).expect("read"),
        b"zzz".repeat(50_000)
    );
}

#[test]
fn verbose_pack_lists_archive_paths_on_stderr() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let src = temp.path().join("tree");
    fs::create_dir(&src).expect("mkdir");
    fs::write(src.join("noted"), b"x").expect("write");

    parpack()
        .arg("-v")
        .arg(&src)
        .assert()
        .success()
        .stderr(predicate::str::contains("/tree/noted"));
}

#[test]
fn missing_arguments_exit_with_code_one() {
    parpack().assert().failure().code(1);
    parunpack().assert().failure().code(1);
}

#[test]
fn runtime_failures_exit_with_code_two() {
    let temp = tempfile::tempdir().expect("create tempdir");

    parpack()
        .arg(temp.path().join("no-such-tree"))
        .assert()
        .failure()
        .code(2);

    parunpack()
        .arg(temp.path().join("no-such-dest"))
        .write_stdin(Vec::new())
        .assert()
        .failure()
        .code(2);
}

#[test]
fn dry_run_pipeline_writes_nothing() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let src = temp.path().join("tree");
    fs::create_dir(&src).expect("mkdir");
    fs::write(src.join("file"), b"phantom").expect("write");

    let output = parpack().arg(&src).assert().success();
    let stream = output.get_output().stdout.clone();

    let dest = temp.path().join("dest");
    fs::create_dir(&dest).expect("mkdir dest");
    parunpack()
        .arg("-n")
        .arg(&dest)
        .write_stdin(stream)
        .assert()
        .success();
    assert_eq!(fs::read_dir(&dest).expect("list").count(), 0);
}

#[test]
fn collision_without_force_fails_and_force_recovers() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let src = temp.path().join("tree");
    fs::create_dir(&src).expect("mkdir");
    fs::write(src.join("file"), b"fresh").expect("write");

    let output = parpack().arg(&src).assert().success();
    let stream = output.get_output().stdout.clone();

    let dest = temp.path().join("dest");
    fs::create_dir_all(dest.join("tree")).expect("mkdir");
    fs::write(dest.join("tree").join("file"), b"stale").expect("write old");

    parunpack()
        .arg(&dest)
        .write_stdin(stream.clone())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("already exists"));

    parunpack()
        .arg("-f")
        .arg(&dest)
        .write_stdin(stream)
        .assert()
        .success();
    assert_eq!(
        fs::read(dest.join("tree").join("file")).expect("read"),
        b"fresh"
    );
}

#[test]
fn dedup_pipeline_links_identical_files() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let src = temp.path().join("tree");
    fs::create_dir(&src).expect("mkdir");
    fs::write(src.join("one"), b"duplicated body").expect("write");
    fs::write(src.join("two"), b"duplicated body").expect("write");

    let output = parpack().arg(&src).assert().success();
    let stream = output.get_output().stdout.clone();

    let dest = temp.path().join("dest");
    let index = temp.path().join("index");
    fs::create_dir(&dest).expect("mkdir dest");
    parunpack()
        .arg("-d")
        .arg(&index)
        .arg(&dest)
        .write_stdin(stream)
        .assert()
        .success();

    let one = fs::metadata(dest.join("tree").join("one")).expect("stat");
    let two = fs::metadata(dest.join("tree").join("two")).expect("stat");
    assert_eq!(one.ino(), two.ino());
    assert!(index.is_dir(), "index root materialised");
}
