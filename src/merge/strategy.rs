use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::StrategyError;
use crate::merge::sniff::{sniff_file, ContainerKind};
use crate::merge::tools::{Invocation, Toolchain};
use crate::merge::StrategyKind;

pub const MANIFEST_NAME: &str = "segments.txt";
pub const INTERMEDIATE_NAME: &str = "concatenated.ts";

/// Exit code mkvmerge uses for "finished with warnings".
const MKVMERGE_WARNINGS: i32 = 1;

/// One way of turning the ordered fragments into the output file.
#[async_trait]
pub trait ReassemblyStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn applies_to(&self, fragments: &[PathBuf]) -> bool;

    /// Writes `output` from `fragments`. Fragments are never modified.
    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError>;
}

/// What the external programs and strategies share.
#[derive(Clone)]
pub struct MuxContext {
    pub toolchain: Arc<dyn Toolchain>,
    pub ffmpeg: PathBuf,
    pub mkvmerge: PathBuf,
    pub recoder: PathBuf,
    /// directory for the manifest and the concatenated intermediate
    pub work_dir: PathBuf,
}

impl MuxContext {
    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(MANIFEST_NAME)
    }

    pub fn intermediate_path(&self) -> PathBuf {
        self.work_dir.join(INTERMEDIATE_NAME)
    }

    /// Stream copy into the output container with AAC bitstream fixup and faststart layout.
    fn ffmpeg_copy(&self, input: Vec<OsString>, output: &Path) -> Invocation {
        Invocation::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error"])
            .args(input)
            .args(["-c", "copy", "-bsf:a", "aac_adtstoasc", "-movflags", "+faststart"])
            .arg(output)
    }

    async fn run_expecting(
        &self,
        invocation: Invocation,
        accepted: &[i32],
    ) -> Result<(), StrategyError> {
        let tool = invocation.tool();
        match self.toolchain.run(&invocation).await {
            Ok(Some(code)) if accepted.contains(&code) => Ok(()),
            Ok(code) => Err(StrategyError::ExitCode { tool, code }),
            Err(source) => Err(StrategyError::ToolUnavailable { tool, source }),
        }
    }
}

pub struct RemuxSingle(pub MuxContext);

#[async_trait]
impl ReassemblyStrategy for RemuxSingle {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RemuxSingle
    }

    fn applies_to(&self, fragments: &[PathBuf]) -> bool {
        fragments.len() == 1
    }

    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError> {
        let input = vec!["-i".into(), fragments[0].clone().into_os_string()];
        self.0.run_expecting(self.0.ffmpeg_copy(input, output), &[0]).await
    }
}

/// Copies a fragment that already is an MP4 despite its extension.
pub struct HeaderSniffCopy;

#[async_trait]
impl ReassemblyStrategy for HeaderSniffCopy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HeaderSniffCopy
    }

    fn applies_to(&self, fragments: &[PathBuf]) -> bool {
        fragments.len() == 1
    }

    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError> {
        if sniff_file(&fragments[0])? != ContainerKind::Mp4 {
            return Err(StrategyError::SignatureMismatch);
        }

        tracing::info!("Found an MP4 header in {}, copying it as is", fragments[0].display());
        tokio::fs::copy(&fragments[0], output).await?;
        Ok(())
    }
}

pub struct ExternalMuxFallback(pub MuxContext);

#[async_trait]
impl ReassemblyStrategy for ExternalMuxFallback {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExternalMuxFallback
    }

    fn applies_to(&self, fragments: &[PathBuf]) -> bool {
        fragments.len() == 1
    }

    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError> {
        let invocation = Invocation::new(&self.0.mkvmerge).arg("-o").arg(output).arg(&fragments[0]);
        self.0.run_expecting(invocation, &[0, MKVMERGE_WARNINGS]).await
    }
}

pub struct ConcatDemuxer(pub MuxContext);

#[async_trait]
impl ReassemblyStrategy for ConcatDemuxer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ConcatDemuxer
    }

    fn applies_to(&self, fragments: &[PathBuf]) -> bool {
        !fragments.is_empty()
    }

    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError> {
        let manifest = self.0.manifest_path();
        tokio::fs::write(&manifest, concat_manifest(fragments)?).await?;

        let input = vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.into_os_string(),
        ];
        self.0.run_expecting(self.0.ffmpeg_copy(input, output), &[0]).await
    }
}

/// Byte-concatenates into an intermediate file and remuxes that once.
pub struct BinaryConcat(pub MuxContext);

#[async_trait]
impl ReassemblyStrategy for BinaryConcat {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BinaryConcat
    }

    fn applies_to(&self, fragments: &[PathBuf]) -> bool {
        !fragments.is_empty()
    }

    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError> {
        let intermediate = self.0.intermediate_path();

        let result = match concatenate(fragments, &intermediate).await {
            Ok(_) => {
                let input = vec!["-i".into(), intermediate.clone().into_os_string()];
                self.0.run_expecting(self.0.ffmpeg_copy(input, output), &[0]).await
            }
            Err(err) => Err(err.into()),
        };

        if intermediate.exists() {
            if let Err(err) = tokio::fs::remove_file(&intermediate).await {
                tracing::warn!("Could not remove {}: {}", intermediate.display(), err);
            }
        }

        result
    }
}

/// Raw copy of a single fragment, recoded when the recoder manages to, or raw
/// concatenation of several. Only I/O errors make it fail.
pub struct ExternalRecode(pub MuxContext);

#[async_trait]
impl ReassemblyStrategy for ExternalRecode {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExternalRecode
    }

    fn applies_to(&self, fragments: &[PathBuf]) -> bool {
        !fragments.is_empty()
    }

    async fn attempt(&self, fragments: &[PathBuf], output: &Path) -> Result<(), StrategyError> {
        if fragments.len() > 1 {
            concatenate(fragments, output).await?;
            tracing::warn!(
                "Fragments were concatenated byte by byte, {} may not play. \
                 Installing ffmpeg and running again usually fixes this",
                output.display()
            );
            return Ok(());
        }

        tokio::fs::copy(&fragments[0], output).await?;
        tracing::info!("Copied the fragment as is, trying to recode it");

        let converted = output.with_extension("converted.mp4");
        let invocation = Invocation::new(&self.0.recoder)
            .args(["--recode-video", "mp4", "-o"])
            .arg(&converted)
            .arg(output);

        match self.0.run_expecting(invocation, &[0]).await {
            Ok(_) if converted.exists() => {
                tokio::fs::rename(&converted, output).await?;
                tracing::info!("Recoded {}", output.display());
            }
            Ok(_) => tracing::warn!("Recoder reported success without output, keeping the copy"),
            Err(err) => {
                tracing::warn!("Recoding failed ({}), keeping the copy", err);
                if converted.exists() {
                    if let Err(err) = tokio::fs::remove_file(&converted).await {
                        tracing::warn!("Could not remove {}: {}", converted.display(), err);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Concat demuxer manifest: one `file '<absolute path>'` line per fragment, in order.
pub fn concat_manifest(fragments: &[PathBuf]) -> std::io::Result<String> {
    let mut manifest = String::new();
    for fragment in fragments {
        let path = std::path::absolute(fragment)?;
        let quoted = path.to_string_lossy().replace('\'', "'\\''");
        manifest.push_str(&format!("file '{}'\n", quoted));
    }
    Ok(manifest)
}

pub async fn concatenate(fragments: &[PathBuf], destination: &Path) -> std::io::Result<u64> {
    let mut out = tokio::fs::File::create(destination).await?;
    let mut written = 0;

    for fragment in fragments {
        let mut input = tokio::fs::File::open(fragment).await?;
        written += tokio::io::copy(&mut input, &mut out).await?;
    }

    out.flush().await?;
    Ok(written)
}
