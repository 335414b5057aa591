use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// File name of the program, for log lines and errors.
    pub fn tool(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

/// Runs external programs to completion and reports their exit code.
///
/// `Err` means the program could not be started at all; `Ok(None)` means it was
/// killed by a signal.
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<Option<i32>>;
}

pub struct ProcessToolchain;

#[async_trait]
impl Toolchain for ProcessToolchain {
    async fn run(&self, invocation: &Invocation) -> io::Result<Option<i32>> {
        tracing::debug!("Executing {:?} {:?}", invocation.program, invocation.args);

        let output = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!("{} stderr: {}", invocation.tool(), stderr.trim());
        }

        Ok(output.status.code())
    }
}

/// Picks the multiplexer binary: an explicit path that starts, then `./ffmpeg`, then
/// `ffmpeg` from `PATH`.
pub async fn locate_ffmpeg(explicit: Option<&Path>, toolchain: &dyn Toolchain) -> PathBuf {
    if let Some(path) = explicit {
        if answers_version(path, toolchain).await {
            tracing::info!("Using ffmpeg at {}", path.display());
            return path.to_path_buf();
        }
        tracing::warn!("ffmpeg not found at {}", path.display());
    }

    if let Ok(local) = std::path::absolute("ffmpeg") {
        if local.exists() && answers_version(&local, toolchain).await {
            tracing::info!("Using local ffmpeg at {}", local.display());
            return local;
        }
    }

    let system = PathBuf::from("ffmpeg");
    if answers_version(&system, toolchain).await {
        tracing::info!("Using system ffmpeg");
    } else {
        tracing::warn!("ffmpeg not found, fragments may be combined less reliably");
    }
    system
}

async fn answers_version(program: &Path, toolchain: &dyn Toolchain) -> bool {
    toolchain.run(&Invocation::new(program).arg("-version")).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::fake::FakeToolchain;

    #[test]
    fn builds_invocations() {
        let invocation = Invocation::new("/usr/bin/ffmpeg").arg("-i").args(["a.ts", "b.mp4"]);

        assert_eq!(invocation.tool(), "ffmpeg");
        assert_eq!(invocation.args, vec![OsString::from("-i"), "a.ts".into(), "b.mp4".into()]);
    }

    #[tokio::test]
    async fn explicit_ffmpeg_path_wins() {
        let toolchain =
            FakeToolchain::with_exit_codes(&[("my-ffmpeg", Some(0)), ("ffmpeg", Some(0))]);

        let found = locate_ffmpeg(Some(Path::new("/opt/my-ffmpeg")), &toolchain).await;

        assert_eq!(found, PathBuf::from("/opt/my-ffmpeg"));
    }

    #[tokio::test]
    async fn falls_back_to_system_ffmpeg() {
        let toolchain = FakeToolchain::with_exit_codes(&[("ffmpeg", Some(0))]);

        let found = locate_ffmpeg(Some(Path::new("/opt/missing")), &toolchain).await;

        assert_eq!(found, PathBuf::from("ffmpeg"));
        assert_eq!(toolchain.calls()[0].program, PathBuf::from("/opt/missing"));
    }
}
