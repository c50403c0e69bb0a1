//! Subprocess helpers that keep piped output drained while a child runs.

use std::{
    io::{self, BufRead, BufReader, Read},
    process::{Command, ExitStatus, Stdio},
    thread,
};

use anyhow::{anyhow, Context, Result};

/// Exit status and both output streams of a finished process
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Whether captured lines are also echoed to our stderr as they arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Quiet,
    Stderr,
}

/// Render a command for log and error messages
pub fn describe(cmd: &Command) -> String {
    let mut text = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        text.push(' ');
        text.push_str(&arg.to_string_lossy());
    }
    text
}

/// Spawn `cmd` with piped stdout/stderr and wait for it to finish.
///
/// Each stream is read on its own scoped thread, so a child that writes a lot
/// to one stream never blocks on a full pipe while we wait on the other.
pub fn run_captured(cmd: &mut Command, echo: Echo) -> Result<CapturedOutput> {
    let what = describe(cmd);
    tracing::debug!("running {}", what);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", what))?;

    let stdout = child.stdout.take().context("Child stdout was not piped")?;
    let stderr = child.stderr.take().context("Child stderr was not piped")?;

    let (stdout, stderr) = thread::scope(|s| {
        let out = s.spawn(|| drain(stdout, Echo::Quiet));
        let err = s.spawn(|| drain(stderr, echo));
        (join_reader(out), join_reader(err))
    });

    let status = child
        .wait()
        .with_context(|| format!("Failed to wait for {}", what))?;
    tracing::debug!("{} exited with {}", what, status);

    Ok(CapturedOutput {
        status,
        stdout: stdout.with_context(|| format!("Failed to read stdout of {}", what))?,
        stderr: stderr.with_context(|| format!("Failed to read stderr of {}", what))?,
    })
}

/// Run `cmd` and fail unless it exits successfully
pub fn run_checked(cmd: &mut Command) -> Result<CapturedOutput> {
    let output = run_captured(cmd, Echo::Quiet)?;
    if !output.status.success() {
        anyhow::bail!(
            "{} failed ({}): {}",
            describe(cmd),
            output.status,
            output.stderr.trim()
        );
    }
    Ok(output)
}

/// Read a stream to the end, tolerating non-UTF-8 bytes
pub fn drain<R: Read>(reader: R, echo: Echo) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        if echo == Echo::Stderr {
            eprint!("{}", text);
        }
        collected.push_str(&text);
    }

    Ok(collected)
}

pub fn join_reader<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("Output reader thread panicked"))?
        .map_err(Into::into)
}
