//! External process collaborators and streamed operation output.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Captured result of a short-lived command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, for tools that report on either stream
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// One item of a running operation's output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Line(String),
    /// Download progress in percent
    Progress(f64),
}

/// Receiving end of this is a finite, one-shot sequence of [`OutputEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    tx: Option<mpsc::UnboundedSender<OutputEvent>>,
}

impl OutputSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that drops every event
    #[allow(dead_code)]
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn line(&self, text: impl Into<String>) {
        self.send(OutputEvent::Line(text.into()));
    }

    pub fn progress(&self, percent: f64) {
        self.send(OutputEvent::Progress(percent));
    }

    /// Forward one segment of raw tool output, surfacing any progress figure
    pub fn segment(&self, segment: &str) {
        let trimmed = segment.trim_end();
        if trimmed.trim().is_empty() {
            return;
        }
        if let Some(percent) = parse_progress(trimmed) {
            self.progress(percent);
        }
        self.line(trimmed);
    }

    fn send(&self, event: OutputEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver means nobody is watching any more
            let _ = tx.send(event);
        }
    }
}

/// Trailing `NN.N%` figure of an output segment
pub fn parse_progress(segment: &str) -> Option<f64> {
    static PROGRESS: OnceLock<Regex> = OnceLock::new();
    let regex = PROGRESS.get_or_init(|| {
        Regex::new(r"(\d{1,3}(?:\.\d+)?)%\s*$").expect("progress pattern is valid")
    });

    regex
        .captures(segment)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|p| (0.0..=100.0).contains(p))
}

/// Splits a byte stream into segments on `\n` and `\r`.
///
/// Download meters redraw with carriage returns, so both count as breaks.
#[derive(Debug, Default)]
pub struct SegmentSplitter {
    pending: Vec<u8>,
}

impl SegmentSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut segments = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    segments.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        segments
    }

    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture both streams
    async fn output(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput>;

    /// Run while forwarding combined stdout/stderr to `sink` as it arrives.
    /// Returns whether the process exited with status zero.
    async fn stream(&self, program: &str, args: &[&str], sink: &OutputSink)
        -> std::io::Result<bool>;

    /// Resolve a program name through `PATH`
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Spawns real processes with the inherited environment
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(
        &self,
        program: &str,
        args: &[&str],
        sink: &OutputSink,
    ) -> std::io::Result<bool> {
        debug!("Streaming {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx.clone()));
        }
        drop(tx);

        while let Some(segment) = rx.recv().await {
            sink.segment(&segment);
        }

        let status = child.wait().await?;
        Ok(status.success())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = SegmentSplitter::default();
    let mut buffer = [0u8; 4096];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                for segment in splitter.push(&buffer[..n]) {
                    if tx.send(segment).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("Output stream closed: {}", e);
                break;
            }
        }
    }

    if let Some(rest) = splitter.finish() {
        let _ = tx.send(rest);
    }
}
