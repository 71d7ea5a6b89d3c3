//! Merge window artifacts into one day artifact.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::artifact::day_file_name;
use crate::BackupError;

/// The concatenated day artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    pub path: PathBuf,
    /// Sum of `hits.hits` lengths across the merged artifacts
    pub total_documents: u64,
    pub artifact_count: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Hits,
}

#[derive(Deserialize, Default)]
struct Hits {
    #[serde(default)]
    hits: Vec<serde::de::IgnoredAny>,
}

/// Concatenate `paths` in order into `<work_dir>/<MM-DD-YY>-<index>.json`.
///
/// Each artifact is decoded once to count its hits, rewound, then copied
/// byte for byte. The output is exactly the ordered concatenation of the
/// inputs. Blocking; run it off the async runtime.
pub fn merge_artifacts(
    paths: &[PathBuf],
    work_dir: &Path,
    index: &str,
    day: NaiveDate,
) -> Result<MergedArtifact, BackupError> {
    let merged_path = work_dir.join(day_file_name(day, index));
    let merged = File::create(&merged_path).map_err(|e| BackupError::io(&merged_path, e))?;
    let mut writer = BufWriter::new(merged);
    let mut total_documents = 0u64;

    for path in paths {
        let mut file = File::open(path).map_err(|e| BackupError::io(path, e))?;

        let response: SearchResponse = {
            let mut de = serde_json::Deserializer::from_reader(BufReader::new(&mut file));
            serde::Deserialize::deserialize(&mut de).map_err(|e| BackupError::Decode {
                path: path.clone(),
                source: e,
            })?
        };
        total_documents += response.hits.hits.len() as u64;

        file.seek(SeekFrom::Start(0))
            .map_err(|e| BackupError::io(path, e))?;
        io::copy(&mut file, &mut writer).map_err(|e| BackupError::io(&merged_path, e))?;
    }

    writer
        .flush()
        .map_err(|e| BackupError::io(&merged_path, e))?;

    info!(
        files = paths.len(),
        documents = total_documents,
        path = %merged_path.display(),
        "Merged {} files",
        paths.len()
    );

    Ok(MergedArtifact {
        path: merged_path,
        total_documents,
        artifact_count: paths.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn response(hits: usize) -> String {
        let hits: Vec<_> = (0..hits)
            .map(|i| serde_json::json!({"_id": i.to_string(), "_source": {"n": i}}))
            .collect();
        format!("{}\n", serde_json::json!({"hits": {"hits": hits}}))
    }

    #[test]
    fn test_merge_is_ordered_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, response(10)).unwrap();
        std::fs::write(&b, response(5)).unwrap();

        let merged = merge_artifacts(&[a.clone(), b.clone()], dir.path(), "logs", day()).unwrap();

        assert_eq!(merged.path, dir.path().join("03-01-24-logs.json"));
        assert_eq!(merged.total_documents, 15);
        assert_eq!(merged.artifact_count, 2);

        let mut expected = std::fs::read(&a).unwrap();
        expected.extend(std::fs::read(&b).unwrap());
        assert_eq!(std::fs::read(&merged.path).unwrap(), expected);
    }

    #[test]
    fn test_missing_hits_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        std::fs::write(&a, "{\"took\": 3}\n").unwrap();

        let merged = merge_artifacts(&[a], dir.path(), "logs", day()).unwrap();
        assert_eq!(merged.total_documents, 0);
    }

    #[test]
    fn test_corrupt_artifact_fails_merge() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        std::fs::write(&a, "not json").unwrap();

        let err = merge_artifacts(&[a], dir.path(), "logs", day()).unwrap_err();
        assert!(matches!(err, BackupError::Decode { .. }));
    }
}
