use std::path::Path;

use crate::{download, error::DownloadError, options::Options};
use serde::Deserialize;

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntity {
    pub url: String,
    #[serde(default)]
    pub output: Option<String>,
}

/// Totals of one batch run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub finished: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn read_jobs(file: &Path) -> Result<Vec<DownloadEntity>, DownloadError> {
    let reader = std::io::BufReader::new(std::fs::File::open(file)?);
    serde_json::from_reader(reader).map_err(|source| DownloadError::Job {
        path: file.to_path_buf(),
        source,
    })
}

/// Runs every entry of a JSON job file one after another. A failed entry is reported
/// and the batch moves on.
pub async fn download_file(file: &Path, options: &Options) -> Result<BatchSummary, DownloadError> {
    let downloads = match read_jobs(file) {
        Ok(downloads) => downloads,
        Err(err) => {
            tracing::error!("Error reading {}: {}", file.display(), err);
            return Err(err);
        }
    };

    let mut summary = BatchSummary::default();

    for entity in downloads {
        match download::session::download(&entity.url, entity.output.as_deref(), options).await {
            Ok(report) => {
                tracing::info!(
                    "Finished downloading {} to {}",
                    entity.url,
                    report.output.display()
                );
                summary.finished += 1;
            }
            Err(DownloadError::OutputExists(output)) => {
                tracing::info!(
                    "File {} already exists, therefore skipping download",
                    output.display()
                );
                summary.skipped += 1;
            }
            Err(err) => {
                tracing::error!("Error downloading {}: {}", entity.url, err);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_job_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("download.json");
        std::fs::write(
            &file,
            r#"[
                { "url": "https://cdn.example/a/quality_720.ts", "output": "first" },
                { "url": "https://cdn.example/b/quality_720.ts" }
            ]"#,
        )
        .unwrap();

        let jobs = read_jobs(&file).unwrap();

        assert_eq!(
            jobs,
            vec![
                DownloadEntity {
                    url: "https://cdn.example/a/quality_720.ts".to_string(),
                    output: Some("first".to_string()),
                },
                DownloadEntity {
                    url: "https://cdn.example/b/quality_720.ts".to_string(),
                    output: None,
                },
            ]
        );
    }

    #[test]
    fn reports_malformed_job_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("download.json");
        std::fs::write(&file, "{ not json").unwrap();

        assert!(matches!(read_jobs(&file), Err(DownloadError::Job { .. })));
        assert!(matches!(read_jobs(&dir.path().join("missing.json")), Err(DownloadError::Io(_))));
    }

    #[tokio::test]
    async fn batch_skips_existing_and_continues_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options {
            temp_dir: dir.path().join("temp_segments"),
            output_dir: dir.path().join("videos"),
            ..Options::default()
        };
        std::fs::create_dir_all(&options.output_dir).unwrap();
        std::fs::write(options.output_dir.join("done.mp4"), b"old").unwrap();

        let file = dir.path().join("download.json");
        std::fs::write(
            &file,
            r#"[
                { "url": "https://cdn.example/x/quality_720.ts", "output": "done" },
                { "url": "not a url" }
            ]"#,
        )
        .unwrap();

        let summary = download_file(&file, &options).await.unwrap();

        assert_eq!(summary, BatchSummary { finished: 0, skipped: 1, failed: 1 });
    }
}
