use std::collections::BTreeSet;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::debug;

use super::domain::{Candidate, Decision, DecisionSource, Offer, RoundNo};
use super::quota::QuotaConfig;
use super::repository::{AllocationRepository, DatasetLock, RepositoryError, SeasonState};

/// Season state kept in a single JSON document.
///
/// Writes take an exclusive lock on a `.lock` sidecar, re-read the document,
/// apply the change and replace the file through a temporary sibling, so a
/// crash mid-write leaves the previous state intact. Round runs additionally
/// claim a `.run.lock` sidecar without blocking.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

/// Run lock over the dataset; the file lock is released on drop.
struct RunLockFile(fs::File);

impl Drop for RunLockFile {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sidecar(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn open_sidecar(&self, suffix: &str) -> Result<fs::File, RepositoryError> {
        let path = self.sidecar(suffix);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?)
    }

    fn load_from_disk(&self) -> Result<SeasonState, RepositoryError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SeasonState::default())
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            RepositoryError::Corrupt(format!("{}: {err}", self.path.display()))
        })
    }

    fn save_to_disk(&self, state: &SeasonState) -> Result<(), RepositoryError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let temp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, state)
                .map_err(|err| RepositoryError::Corrupt(err.to_string()))?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    fn read<T>(&self, view: impl FnOnce(&SeasonState) -> T) -> Result<T, RepositoryError> {
        let state = self.load_from_disk()?;
        Ok(view(&state))
    }

    fn update<T>(&self, change: impl FnOnce(&mut SeasonState) -> T) -> Result<T, RepositoryError> {
        let lock_file = self.open_sidecar(".lock")?;
        lock_file.lock_exclusive()?;

        let result = self.load_from_disk().and_then(|mut state| {
            let out = change(&mut state);
            self.save_to_disk(&state)?;
            Ok(out)
        });

        let _ = lock_file.unlock();
        if result.is_ok() {
            debug!(path = %self.path.display(), "season state written");
        }
        result
    }
}

impl AllocationRepository for JsonFileRepository {
    fn candidates(&self) -> Result<Vec<Candidate>, RepositoryError> {
        self.read(|state| state.candidates.clone())
    }

    fn add_candidates(&self, candidates: Vec<Candidate>) -> Result<usize, RepositoryError> {
        self.update(|state| state.add_candidates(candidates))
    }

    fn quota_config(&self) -> Result<QuotaConfig, RepositoryError> {
        self.read(|state| state.quota.clone())
    }

    fn save_quota_config(&self, config: QuotaConfig) -> Result<(), RepositoryError> {
        self.update(|state| state.quota = config)
    }

    fn decisions(&self, round: RoundNo) -> Result<Vec<Decision>, RepositoryError> {
        self.read(|state| state.decisions(round))
    }

    fn decision_sources(&self, round: RoundNo) -> Result<BTreeSet<DecisionSource>, RepositoryError> {
        self.read(|state| state.decision_sources(round))
    }

    fn record_decisions(
        &self,
        round: RoundNo,
        reports: Vec<(DecisionSource, Vec<Decision>)>,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        self.update(|state| state.record_decisions(round, reports, now))
    }

    fn offers(&self, round: RoundNo) -> Result<Option<Vec<Offer>>, RepositoryError> {
        self.read(|state| state.offers.get(&round).cloned())
    }

    fn generated_rounds(&self) -> Result<Vec<RoundNo>, RepositoryError> {
        self.read(|state| state.offers.keys().copied().collect())
    }

    fn commit_round(&self, round: RoundNo, offers: Vec<Offer>) -> Result<(), RepositoryError> {
        self.update(|state| state.commit_round(round, offers))
    }

    fn reset_round(&self, round: RoundNo) -> Result<(), RepositoryError> {
        self.update(|state| state.reset_round(round))
    }

    fn lock_dataset(&self) -> Result<DatasetLock, RepositoryError> {
        let file = self.open_sidecar(".run.lock")?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(DatasetLock::holding(RunLockFile(file))),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(RepositoryError::Locked)
            }
            Err(err) => Err(err.into()),
        }
    }
}
