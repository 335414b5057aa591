use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::cleanup::cleanup;
use crate::download::client::{DownloadClient, HttpClient};
use crate::download::collector::Collector;
use crate::download::fetcher::Fetcher;
use crate::error::DownloadError;
use crate::merge::tools::{locate_ffmpeg, ProcessToolchain, Toolchain};
use crate::merge::{Reassembler, Reassembly};
use crate::options::Options;

/// What a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub output: PathBuf,
    pub fragments: usize,
    pub reassembly: Reassembly,
    /// fragments kept on disk because cleanup was skipped
    pub kept_fragments: bool,
}

/// Downloads the fragment sequence starting at `url` and combines it into one file in
/// `options.output_dir`, named `output` or after the url.
pub async fn download(
    url: &str,
    output: Option<&str>,
    options: &Options,
) -> Result<RunReport, DownloadError> {
    let base = Url::parse(url).map_err(|source| DownloadError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    std::fs::create_dir_all(&options.output_dir)?;

    let output = options.output_dir.join(output_name(&base, output));
    if output.exists() {
        tracing::error!("File already exists: {}", output.display());
        return Err(DownloadError::OutputExists(output));
    }

    let options = &Options {
        temp_dir: work_dir(&options.temp_dir, &output),
        ..options.clone()
    };
    std::fs::create_dir_all(&options.temp_dir)?;

    tracing::info!("Downloading {} from: {}", output.display(), base);

    let fetcher = Fetcher::new(DownloadClient::new(options)?, options.retry.clone());

    let toolchain: Arc<dyn Toolchain> = Arc::new(ProcessToolchain);
    let ffmpeg = locate_ffmpeg(options.tools.ffmpeg.as_deref(), toolchain.as_ref()).await;
    let reassembler = Reassembler::new(options, ffmpeg, toolchain);

    run(&fetcher, &reassembler, &base, &output, options).await
}

/// Collect, combine, clean up.
pub async fn run<C: HttpClient>(
    fetcher: &Fetcher<C>,
    reassembler: &Reassembler,
    base: &Url,
    output: &Path,
    options: &Options,
) -> Result<RunReport, DownloadError> {
    let fragments = Collector::new(fetcher, &options.collector, &options.temp_dir)
        .collect(base)
        .await?;
    let paths: Vec<PathBuf> = fragments.into_iter().map(|fragment| fragment.path).collect();

    let reassembly = reassembler.combine(&paths, output).await;
    if !reassembly.succeeded() {
        tracing::error!(
            "Could not combine fragments, they are kept in {}",
            options.temp_dir.display()
        );
        return Err(DownloadError::Reassembly(output.to_path_buf()));
    }

    if options.skip_cleanup {
        tracing::info!("Keeping temporary fragments in {}", options.temp_dir.display());
    } else {
        cleanup(&paths, &[reassembler.manifest_path(), reassembler.intermediate_path()]);
        if let Err(err) = std::fs::remove_dir(&options.temp_dir) {
            tracing::debug!("Keeping {}: {}", options.temp_dir.display(), err);
        }
    }

    Ok(RunReport {
        output: output.to_path_buf(),
        fragments: paths.len(),
        reassembly,
        kept_fragments: options.skip_cleanup,
    })
}

/// Directory of one run below `temp_dir`, named after the output file, so fragments kept
/// by one run are never overwritten by the next.
pub fn work_dir(temp_dir: &Path, output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "video".to_string());
    temp_dir.join(stem)
}

/// `requested` or the second to last path component of the url, with an `.mp4` extension.
pub fn output_name(url: &Url, requested: Option<&str>) -> String {
    let name = match requested {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            let segments: Vec<&str> = url
                .path_segments()
                .map(|segments| segments.collect())
                .unwrap_or_default();
            match segments.len() {
                n if n >= 2 && !segments[n - 2].is_empty() => segments[n - 2].to_string(),
                _ => "video".to_string(),
            }
        }
    };

    if name.to_lowercase().ends_with(".mp4") {
        name
    } else {
        name + ".mp4"
    }
}
