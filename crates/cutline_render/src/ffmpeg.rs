use crate::error::{RenderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

/// Progress of a running ffmpeg job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    pub percent: f64,
    pub frame: u64,
    pub fps: f64,
    pub speed: String,
    pub eta_seconds: Option<f64>,
}

/// Location of the ffmpeg binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FfmpegBinary(pub PathBuf);

impl Default for FfmpegBinary {
    fn default() -> Self {
        Self(PathBuf::from("ffmpeg"))
    }
}

/// Arguments that make ffmpeg report progress as `key=value` blocks on
/// stdout and keep stderr down to real errors.
pub fn progress_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error", "-nostats", "-progress", "pipe:1"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl FfmpegBinary {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.0);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run to completion and collect stdout.
    pub async fn output(&self, args: &[String]) -> Result<Vec<u8>> {
        let output = self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(spawn_error)?;
        if !output.status.success() {
            return Err(failure(output.status, &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(output.stdout)
    }

    /// Run a job whose arguments start with [`progress_args`], publishing
    /// each progress block. `total` is the expected output length and may be
    /// zero when unknown. The child is killed if the future is dropped.
    pub async fn run_with_progress(
        &self,
        args: &[String],
        progress_tx: &watch::Sender<EncodeProgress>,
        total: Duration,
    ) -> Result<()> {
        tracing::debug!(binary = %self.0.display(), ?args, "running ffmpeg");

        let mut child = self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let stderr_tail = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut last = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        last = line;
                    }
                }
                last
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut block = ProgressBlock::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = block.feed(&line, total) {
                    let _ = progress_tx.send(progress);
                }
            }
        }

        let status = child.wait().await?;
        let tail = match stderr_tail {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            return Err(failure(status, &tail));
        }
        Ok(())
    }
}

fn failure(status: impl std::fmt::Display, stderr: &str) -> RenderError {
    let reason = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default();
    RenderError::FfmpegFailed(format!("ffmpeg exited with {status}: {reason}"))
}

pub(crate) fn spawn_error(e: std::io::Error) -> RenderError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RenderError::FfmpegNotFound
    } else {
        RenderError::Io(e)
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Accumulates one `-progress` block. ffmpeg writes `key=value` lines and
/// closes every block with `progress=continue` or `progress=end`.
#[derive(Debug, Default)]
pub struct ProgressBlock {
    frame: u64,
    fps: f64,
    out_time_us: Option<i64>,
    speed: String,
}

impl ProgressBlock {
    /// Take one line; returns the block's progress when it closes.
    pub fn feed(&mut self, line: &str, total: Duration) -> Option<EncodeProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            "frame" => self.frame = value.parse().unwrap_or(self.frame),
            "fps" => self.fps = value.parse().unwrap_or(self.fps),
            // out_time_ms is microseconds too; prefer the unambiguous key.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = Some(us.max(0));
                }
            }
            "speed" => self.speed = value.to_string(),
            "progress" => return Some(self.finish(value == "end", total)),
            _ => {}
        }
        None
    }

    fn finish(&mut self, ended: bool, total: Duration) -> EncodeProgress {
        let done = Duration::from_micros(self.out_time_us.unwrap_or(0) as u64);
        let percent = if ended {
            100.0
        } else if total.is_zero() {
            0.0
        } else {
            (done.as_secs_f64() / total.as_secs_f64() * 100.0).min(100.0)
        };
        let speed_factor = self.speed.trim_end_matches('x').parse::<f64>().unwrap_or(0.0);
        let eta_seconds = (!ended && speed_factor > 0.0 && total > done)
            .then(|| (total - done).as_secs_f64() / speed_factor);

        EncodeProgress {
            percent,
            frame: self.frame,
            fps: self.fps,
            speed: self.speed.clone(),
            eta_seconds,
        }
    }
}
