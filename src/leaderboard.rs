//! Durable, cross-session leaderboard
//!
//! The leaderboard keeps cumulative points per identity in a JSON object on
//! disk. Every update writes the complete mapping to a sibling temporary
//! file and renames it over the old one, so a crash leaves either the old or
//! the new file and never a partial one. The in-memory mapping only changes
//! once the rename has succeeded.

use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{TruncatedVec, participant::Identity, scoreboard::descending};

/// Errors that can occur while reading or writing the leaderboard
#[derive(Error, Debug)]
pub enum Error {
    /// The file could not be read, written or replaced
    #[error("leaderboard storage at {} failed: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying I/O failure
        source: io::Error,
    },
    /// The file exists but is not a JSON object of points
    #[error("leaderboard at {} is malformed: {source}", path.display())]
    Format {
        /// File being parsed
        path: PathBuf,
        /// Underlying parse failure
        source: serde_json::Error,
    },
    /// Adding the delta would exceed the largest storable total
    #[error("points for {identity} would overflow")]
    Overflow {
        /// Identity whose total is too large
        identity: Identity,
    },
}

/// Score information for one identity
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ScoreMessage {
    /// Total points earned across sessions
    pub points: u64,
    /// Position in the standings (1-indexed)
    pub position: usize,
}

/// Cumulative points per identity, persisted at a fixed path
#[derive(Debug, Clone)]
pub struct Leaderboard {
    path: PathBuf,
    points: HashMap<Identity, u64>,
}

impl Leaderboard {
    /// Loads the leaderboard stored at `path`
    ///
    /// A missing file, or one that is empty apart from whitespace, yields an
    /// empty leaderboard that will be created on the first update.
    ///
    /// # Errors
    ///
    /// * `Error::Io` - the file exists but cannot be read
    /// * `Error::Format` - the file is not a JSON object of points
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();

        let points = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| Error::Format {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(Error::Io { path, source }),
        };

        info!(path = %path.display(), entries = points.len(), "leaderboard loaded");
        Ok(Self { path, points })
    }

    /// Adds `delta` to the cumulative points and persists the result
    ///
    /// Identities not yet on the leaderboard start from zero. The update is
    /// all or nothing: on error neither the file nor this value changes, so
    /// retrying with the same delta cannot count it twice.
    ///
    /// # Errors
    ///
    /// * `Error::Overflow` - a total would not fit in a `u64`
    /// * `Error::Io` - the new file cannot be written or moved into place
    pub fn update(&mut self, delta: impl IntoIterator<Item = (Identity, u64)>) -> Result<(), Error> {
        let mut merged = self.points.clone();
        let mut added = 0u64;
        for (identity, points) in delta {
            let total = merged
                .get(&identity)
                .copied()
                .unwrap_or_default()
                .checked_add(points)
                .ok_or_else(|| Error::Overflow {
                    identity: identity.clone(),
                })?;
            merged.insert(identity, total);
            added = added.saturating_add(points);
        }

        persist(&self.path, &merged)?;
        self.points = merged;

        info!(path = %self.path.display(), added, entries = self.points.len(), "leaderboard updated");
        Ok(())
    }

    /// Cumulative points for `identity`, zero if unknown
    pub fn points(&self, identity: &str) -> u64 {
        self.points.get(identity).copied().unwrap_or_default()
    }

    /// Total points and 1-indexed position of `identity`
    pub fn score(&self, identity: &str) -> Option<ScoreMessage> {
        let standings = descending(&self.points);
        let position = standings.iter().position(|(id, _)| id.as_str() == identity)?;
        Some(ScoreMessage {
            points: standings[position].1,
            position: position + 1,
        })
    }

    /// Highest standings, at most `limit` of them
    ///
    /// Ordered like the session standings: points descending, then identity
    /// descending.
    pub fn standings(&self, limit: usize) -> TruncatedVec<(Identity, u64)> {
        let standings = descending(&self.points);
        let count = standings.len();
        TruncatedVec::new(standings.into_iter(), limit, count)
    }

    /// Number of identities on the leaderboard
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nobody has scored yet
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Where the leaderboard is stored
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sibling file the new contents are staged in before the rename
fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Writes `points` to `path` through a synced staging file and a rename
fn persist(path: &Path, points: &HashMap<Identity, u64>) -> Result<(), Error> {
    let ordered: BTreeMap<&Identity, u64> = points.iter().map(|(id, p)| (id, *p)).collect();
    let contents = serde_json::to_vec_pretty(&ordered).map_err(|source| Error::Format {
        path: path.to_owned(),
        source,
    })?;

    let staging = staging_path(path);
    let result = write_synced(&staging, &contents).and_then(|()| fs::rename(&staging, path));

    if let Err(source) = result {
        if let Err(cleanup) = fs::remove_file(&staging) {
            debug!(path = %staging.display(), error = %cleanup, "staging file not removed");
        }
        warn!(path = %path.display(), error = %source, "leaderboard write failed");
        return Err(Error::Io {
            path: path.to_owned(),
            source,
        });
    }

    // the new contents are in place once renamed; a failed directory sync
    // only weakens crash durability
    if let Err(e) = sync_parent(path) {
        warn!(path = %path.display(), error = %e, "leaderboard directory not synced");
    }

    Ok(())
}

/// Flushes the directory entry of `path` so the rename survives a crash
fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn delta(entries: &[(&str, u64)]) -> HashMap<Identity, u64> {
        entries
            .iter()
            .map(|(name, points)| (Identity::new(*name), *points))
            .collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let leaderboard = Leaderboard::load(dir.path().join("leaderboard.json")).unwrap();
        assert!(leaderboard.is_empty());
    }

    #[test]
    fn test_load_blank_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.json");
        fs::write(&path, "  \n").unwrap();
        assert!(Leaderboard::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(Leaderboard::load(&path), Err(Error::Format { .. })));
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.json");

        let mut leaderboard = Leaderboard::load(&path).unwrap();
        leaderboard.update(delta(&[("alice", 3), ("bob", 2)])).unwrap();

        let reloaded = Leaderboard::load(&path).unwrap();
        assert_eq!(reloaded.points("alice"), 3);
        assert_eq!(reloaded.points("bob"), 2);
        assert_eq!(reloaded.points("carol"), 0);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_update_twice_from_reloaded_store_is_additive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.json");
        let session = delta(&[("alice", 3), ("bob", 2)]);

        Leaderboard::load(&path).unwrap().update(session.clone()).unwrap();
        Leaderboard::load(&path).unwrap().update(session).unwrap();

        let reloaded = Leaderboard::load(&path).unwrap();
        assert_eq!(reloaded.points("alice"), 6);
        assert_eq!(reloaded.points("bob"), 4);
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.json");

        let mut leaderboard = Leaderboard::load(&path).unwrap();
        leaderboard.update(delta(&[("alice", 3)])).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        // a directory in the staging file's place makes the write fail
        fs::create_dir(staging_path(&path)).unwrap();
        let result = leaderboard.update(delta(&[("alice", 5), ("bob", 1)]));

        assert!(matches!(result, Err(Error::Io { .. })));
        assert_eq!(leaderboard.points("alice"), 3);
        assert_eq!(leaderboard.points("bob"), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);

        // once the obstacle is gone the same delta applies exactly once
        fs::remove_dir(staging_path(&path)).unwrap();
        leaderboard.update(delta(&[("alice", 5), ("bob", 1)])).unwrap();
        assert_eq!(Leaderboard::load(&path).unwrap().points("alice"), 8);
    }

    #[test]
    fn test_overflowing_total_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaderboard.json");
        fs::write(&path, format!(r#"{{"a": {}}}"#, u64::MAX)).unwrap();

        let mut leaderboard = Leaderboard::load(&path).unwrap();
        let result = leaderboard.update(delta(&[("b", 2), ("a", 1)]));

        assert!(matches!(result, Err(Error::Overflow { identity }) if identity.as_str() == "a"));
        assert_eq!(leaderboard.points("a"), u64::MAX);
        assert_eq!(leaderboard.points("b"), 0);
        assert_eq!(Leaderboard::load(&path).unwrap().points("a"), u64::MAX);
    }

    #[test]
    fn test_sync_parent_accepts_bare_file_name() {
        let dir = TempDir::new().unwrap();
        assert!(sync_parent(&dir.path().join("leaderboard.json")).is_ok());
        assert!(sync_parent(Path::new("leaderboard.json")).is_ok());
    }

    #[test]
    fn test_standings_and_score() {
        let dir = TempDir::new().unwrap();
        let mut leaderboard = Leaderboard::load(dir.path().join("leaderboard.json")).unwrap();
        leaderboard
            .update(delta(&[("alice", 4), ("bob", 9), ("carol", 4), ("dave", 1)]))
            .unwrap();

        let top = leaderboard.standings(3);
        assert_eq!(top.exact_count(), 4);
        assert_eq!(
            top.items(),
            &[
                (Identity::new("bob"), 9),
                (Identity::new("carol"), 4),
                (Identity::new("alice"), 4)
            ]
        );

        assert_eq!(
            leaderboard.score("alice"),
            Some(ScoreMessage {
                points: 4,
                position: 3
            })
        );
        assert_eq!(leaderboard.score("nobody"), None);
    }
}
