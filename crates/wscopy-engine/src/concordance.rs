//! Durable source-to-target sample mapping.
//!
//! One line per copied sample:
//! `<source id>\t<source version>\t<target id>\t<target version>`.
//! A missing file is an empty concordance. Each append is flushed and synced
//! before the next remote call so a crash never loses a created sample.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use wscopy_core::SampleVersion;

use crate::error::{MigrateError, MigrateResult};

/// One source-to-target sample mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcordanceEntry {
    /// Sample in the source.
    pub source: SampleVersion,
    /// Equivalent sample in the target.
    pub target: SampleVersion,
}

impl ConcordanceEntry {
    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\n",
            self.source.id, self.source.version, self.target.id, self.target.version
        )
    }

    fn parse(line: &str) -> Result<Self, &'static str> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let [source_id, source_version, target_id, target_version] = fields.as_slice() else {
            return Err("expected four tab-separated fields");
        };
        if source_id.is_empty() || target_id.is_empty() {
            return Err("sample id is empty");
        }
        let source_version = source_version
            .parse()
            .map_err(|_| "source version is not an integer")?;
        let target_version = target_version
            .parse()
            .map_err(|_| "target version is not an integer")?;
        Ok(Self {
            source: SampleVersion::new(*source_id, source_version),
            target: SampleVersion::new(*target_id, target_version),
        })
    }
}

/// Append-only concordance file plus its in-memory index.
#[derive(Debug)]
pub struct Concordance {
    path: PathBuf,
    entries: HashMap<SampleVersion, SampleVersion>,
    unterminated: bool,
}

impl Concordance {
    /// Load the concordance at `path`; a missing file yields an empty one.
    ///
    /// # Errors
    ///
    /// Returns `Concordance` for malformed lines or `Io` when the file cannot
    /// be read. A malformed final line without a trailing newline is a torn
    /// append: it is logged, cut from the file, and skipped.
    pub async fn load(path: impl Into<PathBuf>) -> MigrateResult<Self> {
        let path = path.into();
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no concordance file yet");
                String::new()
            }
            Err(error) => return Err(MigrateError::io("read_concordance", path, error)),
        };

        let complete = contents.rfind('\n').map_or("", |end| &contents[..=end]);
        let tail = &contents[complete.len()..];

        let mut entries = HashMap::new();
        for (index, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = ConcordanceEntry::parse(line).map_err(|reason| MigrateError::Concordance {
                path: path.clone(),
                line: index + 1,
                reason,
            })?;
            index_entry(&mut entries, entry, index + 1);
        }

        let mut unterminated = false;
        if !tail.is_empty() {
            let line = complete.lines().count() + 1;
            match ConcordanceEntry::parse(tail) {
                Ok(entry) => {
                    index_entry(&mut entries, entry, line);
                    unterminated = true;
                }
                Err(_) if tail.trim().is_empty() => unterminated = true,
                Err(reason) => {
                    warn!(
                        path = %path.display(),
                        line,
                        reason,
                        "ignoring torn final concordance line"
                    );
                    truncate(&path, complete.len()).await?;
                }
            }
        }
        debug!(path = %path.display(), entries = entries.len(), "concordance loaded");
        Ok(Self {
            path,
            entries,
            unterminated,
        })
    }

    /// Target sample recorded for `source`.
    #[must_use]
    pub fn get(&self, source: &SampleVersion) -> Option<&SampleVersion> {
        self.entries.get(source)
    }

    /// Append `entry` durably and index it.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the append, flush, or sync fails.
    pub async fn record(&mut self, entry: ConcordanceEntry) -> MigrateResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|error| MigrateError::io("open_concordance", self.path.clone(), error))?;
        let mut line = entry.to_line();
        if self.unterminated {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
            .await
            .map_err(|error| MigrateError::io("append_concordance", self.path.clone(), error))?;
        file.flush()
            .await
            .map_err(|error| MigrateError::io("flush_concordance", self.path.clone(), error))?;
        file.sync_data()
            .await
            .map_err(|error| MigrateError::io("sync_concordance", self.path.clone(), error))?;
        self.unterminated = false;
        self.entries.insert(entry.source, entry.target);
        Ok(())
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no mapping is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn index_entry(
    entries: &mut HashMap<SampleVersion, SampleVersion>,
    entry: ConcordanceEntry,
    line: usize,
) {
    if let Some(previous) = entries.insert(entry.source.clone(), entry.target.clone()) {
        warn!(
            source = %entry.source,
            previous = %previous,
            current = %entry.target,
            line,
            "duplicate concordance entry; keeping the later one"
        );
    }
}

/// Cut a half-written final line so the next append starts on a fresh line.
async fn truncate(path: &Path, len: usize) -> MigrateResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|error| MigrateError::io("open_concordance", path.to_path_buf(), error))?;
    file.set_len(len as u64)
        .await
        .map_err(|error| MigrateError::io("truncate_concordance", path.to_path_buf(), error))?;
    file.sync_data()
        .await
        .map_err(|error| MigrateError::io("sync_concordance", path.to_path_buf(), error))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let concordance = Concordance::load(dir.path().join("samples.tsv")).await?;
        assert!(concordance.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn records_survive_reload() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.tsv");
        let mut concordance = Concordance::load(&path).await?;
        concordance
            .record(ConcordanceEntry {
                source: SampleVersion::new("src-1", 1),
                target: SampleVersion::new("dst-9", 1),
            })
            .await?;

        let reloaded = Concordance::load(&path).await?;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get(&SampleVersion::new("src-1", 1)),
            Some(&SampleVersion::new("dst-9", 1))
        );
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "src-1\t1\tdst-9\t1\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_lines_report_their_number() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.tsv");
        std::fs::write(&path, "a\t1\tb\t1\n\nc\t1\td\n")?;
        let err = Concordance::load(&path).await;
        assert!(matches!(
            err,
            Err(MigrateError::Concordance { line: 3, reason, .. }) if reason == "expected four tab-separated fields"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn torn_final_line_is_cut_and_skipped() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.tsv");
        std::fs::write(&path, "a\t1\tb\t1\nc\t1")?;
        let mut concordance = Concordance::load(&path).await?;
        assert_eq!(concordance.len(), 1);
        assert_eq!(std::fs::read_to_string(&path)?, "a\t1\tb\t1\n");

        concordance
            .record(ConcordanceEntry {
                source: SampleVersion::new("c", 1),
                target: SampleVersion::new("d", 1),
            })
            .await?;
        let reloaded = Concordance::load(&path).await?;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get(&SampleVersion::new("c", 1)),
            Some(&SampleVersion::new("d", 1))
        );
        Ok(())
    }

    #[tokio::test]
    async fn complete_final_line_without_newline_is_kept() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.tsv");
        std::fs::write(&path, "a\t1\tb\t1")?;
        let mut concordance = Concordance::load(&path).await?;
        assert_eq!(concordance.len(), 1);
        concordance
            .record(ConcordanceEntry {
                source: SampleVersion::new("c", 1),
                target: SampleVersion::new("d", 1),
            })
            .await?;
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "a\t1\tb\t1\nc\t1\td\t1\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn later_duplicates_win() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("samples.tsv");
        std::fs::write(&path, "a\t1\tb\t1\na\t1\tc\t1\n")?;
        let concordance = Concordance::load(&path).await?;
        assert_eq!(
            concordance.get(&SampleVersion::new("a", 1)),
            Some(&SampleVersion::new("c", 1))
        );
        Ok(())
    }

    #[test]
    fn non_numeric_versions_are_rejected() {
        assert_eq!(
            ConcordanceEntry::parse("a\tone\tb\t1"),
            Err("source version is not an integer")
        );
    }
}
