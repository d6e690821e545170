use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const FEED_LOG_FILE: &str = "logs.txt";
pub const USER_LOG_DIR: &str = "userlogs";
const ANONYMOUS_NICK: &str = "anonymous";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Append-only day-keyed message logs for one feed.
///
/// Lines go to `<root>/<host>/<YYYY-MM-DD>/logs.txt` and to
/// `<root>/<host>/<YYYY-MM-DD>/userlogs/<nick>.txt`. Directories and files are created on
/// first use, so constructing a `DailyLog` never touches the filesystem.
pub struct DailyLog {
    feed_dir: PathBuf,
    day: NaiveDate,
    feed_log: Option<File>,
}

impl DailyLog {
    pub fn new(root: impl AsRef<Path>, host: &str, day: NaiveDate) -> Self {
        Self {
            feed_dir: root.as_ref().join(sanitize_component(host)),
            day,
            feed_log: None,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn day_dir(&self) -> PathBuf {
        self.feed_dir.join(self.day.format("%Y-%m-%d").to_string())
    }

    pub fn log_path(&self) -> PathBuf {
        self.day_dir().join(FEED_LOG_FILE)
    }

    pub fn user_log_path(&self, nick: &str) -> PathBuf {
        let name = if nick.trim().is_empty() {
            ANONYMOUS_NICK.to_string()
        } else {
            sanitize_component(nick)
        };
        self.day_dir().join(USER_LOG_DIR).join(format!("{name}.txt"))
    }

    /// Switches to the directory for `day`; the next append opens the new files.
    pub fn rotate(&mut self, day: NaiveDate) {
        if day != self.day {
            debug!(event = "log_rotate", from = %self.day, to = %day);
        }
        self.day = day;
        self.feed_log = None;
    }

    /// Writes `line` to the feed log and to the sender's user log.
    ///
    /// Both writes are attempted; the first failure is returned. A failed feed log handle
    /// is dropped so the next call reopens it.
    pub fn append(&mut self, nick: &str, line: &str) -> Result<(), StorageError> {
        let feed_result = self.append_feed_line(line);
        if feed_result.is_err() {
            self.feed_log = None;
        }
        let user_result = append_line(&self.user_log_path(nick), line);
        feed_result.and(user_result)
    }

    fn append_feed_line(&mut self, line: &str) -> Result<(), StorageError> {
        let path = self.log_path();
        if self.feed_log.is_none() {
            let user_dir = self.day_dir().join(USER_LOG_DIR);
            fs::create_dir_all(&user_dir).map_err(|source| StorageError::CreateDir {
                path: user_dir.clone(),
                source,
            })?;
            self.feed_log = Some(open_append(&path)?);
        }
        match self.feed_log.as_mut() {
            Some(file) => writeln!(file, "{line}")
                .map_err(|source| StorageError::Write { path, source }),
            None => Ok(()),
        }
    }
}

fn open_append(path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn append_line(path: &Path, line: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut file = open_append(path)?;
    writeln!(file, "{line}").map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Maps anything outside `[A-Za-z0-9._-]` to `_` so the value is one safe path component.
pub fn sanitize_component(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|ch| ch == '.') {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("valid date")
    }

    #[test]
    fn append_writes_feed_and_user_logs() {
        let root = tempfile::tempdir().expect("temp dir");
        let mut log = DailyLog::new(root.path(), "chat.example.net", day(1));
        log.append("alice", "[t] alice: hi").expect("append");
        log.append("bob", "[t] bob: yo").expect("append");
        log.append("alice", "[t] alice: again").expect("append");

        let feed = fs::read_to_string(
            root.path()
                .join("chat.example.net")
                .join("2024-05-01")
                .join("logs.txt"),
        )
        .expect("feed log");
        assert_eq!(feed, "[t] alice: hi\n[t] bob: yo\n[t] alice: again\n");

        let alice = fs::read_to_string(log.user_log_path("alice")).expect("alice log");
        assert_eq!(alice, "[t] alice: hi\n[t] alice: again\n");
        assert!(log.user_log_path("bob").ends_with("userlogs/bob.txt"));
    }

    #[test]
    fn rotate_moves_to_new_day_directory() {
        let root = tempfile::tempdir().expect("temp dir");
        let mut log = DailyLog::new(root.path(), "feed", day(1));
        log.append("a", "before").expect("append");
        let first = log.log_path();
        log.rotate(day(2));
        assert_eq!(log.day(), day(2));
        log.append("a", "after").expect("append");
        let second = log.log_path();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(first).expect("day one"), "before\n");
        assert_eq!(fs::read_to_string(second).expect("day two"), "after\n");
    }

    #[test]
    fn nick_and_host_are_single_components() {
        let log = DailyLog::new("/logs", "evil/../host", day(3));
        assert!(log.log_path().starts_with("/logs/evil_.._host/2024-05-03"));
        assert!(log
            .user_log_path("../../etc/passwd")
            .ends_with("userlogs/.._.._etc_passwd.txt"));
        assert!(log.user_log_path("").ends_with("userlogs/anonymous.txt"));
        assert_eq!(sanitize_component(".."), "__");
    }

    #[test]
    fn append_reports_unwritable_root() {
        let root = tempfile::tempdir().expect("temp dir");
        let blocker = root.path().join("blocked");
        fs::write(&blocker, "not a directory").expect("write blocker");
        let mut log = DailyLog::new(&blocker, "feed", day(1));
        let err = log.append("a", "line").expect_err("should fail");
        assert!(matches!(err, StorageError::CreateDir { .. }));
    }
}
