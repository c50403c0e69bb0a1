#![cfg(unix)]

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to run git commands in a directory
fn git_command(dir: &Path, args: &[&str]) -> Output {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run git command");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    String::from_utf8_lossy(&git_command(dir, args).stdout)
        .trim()
        .to_string()
}

/// Create a repository with a README commit and nothing else
fn create_test_repo(dir: &Path) -> PathBuf {
    let repo_dir = dir.join("test-repo");
    fs::create_dir(&repo_dir).expect("Failed to create repo dir");

    git_command(&repo_dir, &["init"]);
    git_command(&repo_dir, &["config", "user.name", "Test User"]);
    git_command(&repo_dir, &["config", "user.email", "test@example.com"]);
    git_command(&repo_dir, &["config", "commit.gpgsign", "false"]);

    fs::write(repo_dir.join("README.md"), "# test repo\n").unwrap();
    git_command(&repo_dir, &["add", "."]);
    git_command(&repo_dir, &["commit", "-m", "Initial commit"]);

    repo_dir
}

/// Commit `count` archives under `dir`, one commit each
fn commit_archives(repo: &Path, dir: &str, start: usize, count: usize) {
    fs::create_dir_all(repo.join(dir)).unwrap();
    for i in start..start + count {
        let name = format!("{}/pkg-{}.zip", dir, i);
        fs::write(repo.join(&name), format!("archive {} in {}", i, dir)).unwrap();
        git_command(repo, &["add", "."]);
        git_command(repo, &["commit", "-m", &format!("Add {}", name)]);
    }
}

/// Stand-in for `java -jar bfg.jar`: records its invocation, prints a transcript
fn fake_java(dir: &Path) -> PathBuf {
    let path = dir.join("fake-java");
    let script = r#"#!/bin/sh
echo "$PWD" > "$FAKE_BFG_LOG"
echo "$@" >> "$FAKE_BFG_LOG"
echo "Using repo : $PWD"
echo ""
echo "Cleaning"
echo "--------"
echo ""
echo "Found 3 commits"
echo ""
echo "BFG run is complete!"
if [ -n "$FAKE_BFG_EXIT" ]; then
    echo "boom on stderr" >&2
    exit "$FAKE_BFG_EXIT"
fi
"#;
    install_executable(dir, &path, script);
    path
}

/// Write `content` to an executable at `path` without this process ever
/// holding it open for writing; otherwise a child forked by a concurrent test
/// can inherit the handle and exec fails with ETXTBSY.
fn install_executable(dir: &Path, path: &Path, content: &str) {
    let source = dir.join(format!(
        "{}.src",
        path.file_name().unwrap().to_string_lossy()
    ));
    fs::write(&source, content).unwrap();
    let status = Command::new("sh")
        .arg("-c")
        .arg("cp \"$1\" \"$2\" && chmod 755 \"$2\"")
        .arg("sh")
        .arg(&source)
        .arg(path)
        .status()
        .expect("Failed to install script");
    assert!(status.success());
}

/// Serve `body` to a single HTTP GET and return its URL
fn serve_jar_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                break;
            }
        }
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream
            .write_all(header.as_bytes())
            .and_then(|_| stream.write_all(&body))
            .and_then(|_| stream.flush());
    });

    format!("http://{}/bfg-1.14.0.jar", addr)
}

struct Harness {
    temp: TempDir,
    out_dir: PathBuf,
    java: PathBuf,
    log: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let out_dir = temp.path().join("out");
        let java = fake_java(temp.path());
        let log = temp.path().join("bfg-invocation.log");
        Self {
            temp,
            out_dir,
            java,
            log,
        }
    }

    /// Pre-seed the jar so no download happens
    fn seed_jar(&self) {
        fs::create_dir_all(&self.out_dir).unwrap();
        fs::write(self.out_dir.join("bfg.jar"), b"not really a jar").unwrap();
    }

    fn run(&self, repo: &Path, extra: &[&str], envs: &[(&str, &str)]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_git-cache-remover"));
        cmd.arg(repo)
            .arg("--out-dir")
            .arg(&self.out_dir)
            .args(extra)
            .env("GIT_CACHE_REMOVER_CONFIG", self.temp.path().join("no-config.yaml"))
            .env("GIT_CACHE_REMOVER_JAVA", &self.java)
            .env("GIT_CACHE_REMOVER_BFG_URL", "http://127.0.0.1:9/bfg.jar")
            .env("FAKE_BFG_LOG", &self.log)
            .env_remove("FAKE_BFG_EXIT");
        for (k, v) in envs {
            cmd.env(k, v);
        }
        cmd.output().expect("Failed to run git-cache-remover")
    }

    fn worklist(&self) -> Vec<String> {
        fs::read_to_string(self.out_dir.join("blobids.txt"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_end_to_end_removes_yarn_cache_blobs() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    commit_archives(&repo, ".yarn/cache", 0, 12);
    fs::write(repo.join("index.js"), "console.log('hi')\n").unwrap();
    git_command(&repo, &["add", "."]);
    git_command(&repo, &["commit", "-m", "Add index.js"]);
    harness.seed_jar();

    let output = harness.run(&repo, &[], &[]);
    let stdout = stdout_of(&output);
    assert!(
        output.status.success(),
        "run failed:\n{}\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(stdout.contains("Found 12 blobs to delete."));

    let worklist = harness.worklist();
    assert_eq!(worklist.len(), 12);
    for i in [0, 5, 11] {
        let id = git_stdout(&repo, &["rev-parse", &format!("HEAD:.yarn/cache/pkg-{}.zip", i)]);
        assert!(worklist.contains(&id), "pkg-{} blob missing from worklist", i);
    }
    let readme = git_stdout(&repo, &["rev-parse", "HEAD:README.md"]);
    let index = git_stdout(&repo, &["rev-parse", "HEAD:index.js"]);
    assert!(!worklist.contains(&readme));
    assert!(!worklist.contains(&index));

    // Only the trailing summary of the transcript is shown
    assert!(stdout.contains("  Found 3 commits\n  BFG run is complete!"));
    assert!(stdout.contains("  --------"));
    assert!(!stdout.contains("Using repo"));

    assert!(stdout.contains("Repository size before: "));
    assert!(stdout.contains("Repository size after: "));

    let log = fs::read_to_string(&harness.log).unwrap();
    let mut lines = log.lines();
    assert!(lines.next().unwrap().ends_with("out/repo-mirror"));
    let args = lines.next().unwrap();
    assert!(args.starts_with("-jar "));
    assert!(args.contains("--no-blob-protection --strip-blobs-with-ids"));
    assert!(args.ends_with("out/blobids.txt"));
}

#[test]
fn test_empty_working_directory_fetches_jar() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    commit_archives(&repo, ".yarn/cache", 0, 2);
    assert!(!harness.out_dir.exists());

    let jar: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
    let url = serve_jar_once(jar.clone());

    let output = harness.run(
        &repo,
        &["--no-compact"],
        &[("GIT_CACHE_REMOVER_BFG_URL", url.as_str())],
    );
    let stdout = stdout_of(&output);
    assert!(
        output.status.success(),
        "run failed:\n{}\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(stdout.contains("Downloading BFG..."));
    assert_eq!(fs::read(harness.out_dir.join("bfg.jar")).unwrap(), jar);
    assert!(harness.out_dir.join("repo-mirror").join("HEAD").exists());
    assert!(stdout.contains("Found 2 blobs to delete."));
    assert_eq!(harness.worklist().len(), 2);
}

#[test]
fn test_zero_blobs_still_runs_tool() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    harness.seed_jar();
    fs::write(harness.out_dir.join("blobids.txt"), "stale\n").unwrap();

    let output = harness.run(&repo, &["--no-compact"], &[]);
    let stdout = stdout_of(&output);
    assert!(output.status.success(), "run failed:\n{}", stdout);

    assert!(stdout.contains("Found 0 blobs to delete."));
    assert!(stdout.contains("compaction skipped"));
    assert!(harness.worklist().is_empty());
    assert!(harness.log.exists(), "rewrite tool was not invoked");
}

#[test]
fn test_tool_failure_exits_non_zero_with_full_output() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    commit_archives(&repo, ".yarn/cache", 0, 2);
    harness.seed_jar();

    let output = harness.run(&repo, &[], &[("FAKE_BFG_EXIT", "3")]);
    let stdout = stdout_of(&output);

    assert!(!output.status.success());
    assert!(stdout.contains("BFG failed:"));
    assert!(stdout.contains("Using repo"));
    assert!(stdout.contains("boom on stderr"));
    assert!(!stdout.contains("Repository size"));
}

#[test]
fn test_rerun_updates_existing_mirror() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    commit_archives(&repo, ".yarn/cache", 0, 2);
    harness.seed_jar();

    let first = harness.run(&repo, &["--no-compact"], &[]);
    assert!(first.status.success(), "first run failed:\n{}", stdout_of(&first));
    assert!(stdout_of(&first).contains("Cloning"));

    let marker = harness.out_dir.join("repo-mirror").join("marker");
    fs::write(&marker, "still here").unwrap();

    commit_archives(&repo, ".yarn/cache", 2, 1);

    let second = harness.run(&repo, &["--no-compact"], &[]);
    let stdout = stdout_of(&second);
    assert!(second.status.success(), "second run failed:\n{}", stdout);
    assert!(stdout.contains("Updating mirror"));
    assert!(marker.exists(), "mirror directory was recreated");
    assert!(stdout.contains("Found 3 blobs to delete."));
    assert_eq!(harness.worklist().len(), 3);
}

#[test]
fn test_broken_mirror_is_not_recovered() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    harness.seed_jar();

    let mirror = harness.out_dir.join("repo-mirror");
    fs::create_dir_all(&mirror).unwrap();
    git_command(&mirror, &["init", "--bare"]);
    let gone = harness.temp.path().join("gone");
    git_command(&mirror, &["remote", "add", "origin", gone.to_str().unwrap()]);

    let output = harness.run(&repo, &[], &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Cannot update repo in"));
    assert!(stderr.contains("Try clearing the directory"));
    assert!(mirror.join("HEAD").exists(), "mirror was deleted");
    assert!(!harness.log.exists(), "rewrite tool ran after a failed update");
}

#[test]
fn test_multiple_cache_paths_union() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());
    commit_archives(&repo, ".yarn/cache", 0, 3);
    commit_archives(&repo, "vendor/cache", 0, 2);
    commit_archives(&repo, "assets", 0, 4);
    harness.seed_jar();

    let output = harness.run(
        &repo,
        &["--cache-path", ".yarn/cache", "--cachePath", "vendor/cache", "--no-compact"],
        &[],
    );
    let stdout = stdout_of(&output);
    assert!(output.status.success(), "run failed:\n{}", stdout);
    assert!(stdout.contains("Found 5 blobs to delete."));
    assert_eq!(harness.worklist().len(), 5);
}

#[test]
fn test_missing_jar_download_failure_is_fatal() {
    let harness = Harness::new();
    let repo = create_test_repo(harness.temp.path());

    let output = harness.run(&repo, &[], &[]);

    assert!(!output.status.success());
    assert!(!harness.out_dir.join("bfg.jar").exists());
    assert!(!harness.out_dir.join("repo-mirror").exists());
}
