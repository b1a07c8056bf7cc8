//! Rar (and cbr) extraction through an external `unrar` program.
//!
//! The archive is unpacked into a private working directory under the
//! staging root, which is removed on every exit path when the `TempDir`
//! drops. unrar is told to skip entries over the per-entry size cap. Only
//! top-level regular files of the unpacked tree are considered,
//! sorted by original name, then normalized like any other format.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mangashelf_core::{AppConfig, ArchiveFormat, Error};
use tokio::process::Command;

use super::normalize::{NormalizeOptions, PageWriter, accept_entry};
use super::{ArchiveExtractor, remove_target};

/// unrar exit codes that mean the archive itself is broken:
/// fatal error, CRC error, bad archive, wrong password.
const CORRUPT_EXIT_CODES: &[i32] = &[2, 3, 10, 11];

/// Failure of the external unpack step.
#[derive(Debug, thiserror::Error)]
pub enum UnrarError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: std::io::Error },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("archive rejected by unrar (exit {code}): {stderr}")]
    BadArchive { code: i32, stderr: String },

    #[error("unrar failed (exit {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

impl From<UnrarError> for Error {
    fn from(err: UnrarError) -> Self {
        match err {
            UnrarError::BadArchive { .. } => Error::CorruptArchive(err.to_string()),
            _ => Error::ToolUnavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RarExtractor {
    program: PathBuf,
    timeout: Duration,
    work_root: PathBuf,
    options: NormalizeOptions,
}

impl RarExtractor {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration, work_root: impl Into<PathBuf>, options: NormalizeOptions) -> Self {
        Self { program: program.into(), timeout, work_root: work_root.into(), options }
    }

    pub fn from_config(config: &AppConfig, options: NormalizeOptions) -> Self {
        Self::new(&config.unrar_path, config.unpack_timeout(), &config.temp_dir, options)
    }

    async fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), UnrarError> {
        let program = self.program.display().to_string();
        let mut dest_arg = dest.as_os_str().to_owned();
        dest_arg.push(std::path::MAIN_SEPARATOR_STR);

        let child = Command::new(&self.program)
            .arg("x")
            .arg("-o-")
            .arg("-y")
            .arg(size_limit_switch(self.options.max_entry_bytes))
            .arg("--")
            .arg(archive)
            .arg(&dest_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| UnrarError::Spawn { program: program.clone(), source })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| UnrarError::Timeout { program: program.clone(), timeout: self.timeout })?
            .map_err(|source| UnrarError::Spawn { program, source })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            // 1 is a non-fatal warning
            Some(0 | 1) => Ok(()),
            Some(code) if CORRUPT_EXIT_CODES.contains(&code) => Err(UnrarError::BadArchive { code, stderr }),
            code => Err(UnrarError::Failed { code, stderr }),
        }
    }
}

#[async_trait]
impl ArchiveExtractor for RarExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    async fn extract(&self, archive: &Path, target: &Path) -> Result<usize, Error> {
        let work_root = self.work_root.clone();
        let workdir = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&work_root).map_err(|e| Error::storage(work_root.display(), e))?;
            tempfile::Builder::new()
                .prefix("unrar-")
                .tempdir_in(&work_root)
                .map_err(|e| Error::storage(work_root.display(), e))
        })
        .await
        .map_err(|e| Error::Storage(format!("unrar workdir task failed: {e}")))??;

        let result = match self.unpack(archive, workdir.path()).await {
            Ok(()) => {
                let unpacked = workdir.path().to_path_buf();
                let target_buf = target.to_path_buf();
                let options = self.options;
                tokio::task::spawn_blocking(move || normalize_unpacked(&unpacked, &target_buf, options))
                    .await
                    .map_err(|e| Error::Storage(format!("rar normalization task failed: {e}")))
                    .and_then(|r| r)
            }
            Err(e) => {
                tracing::warn!(archive = %archive.display(), error = %e, "unrar failed");
                Err(e.into())
            }
        };

        if result.is_err() {
            remove_target(target);
        }
        if let Err(e) = workdir.close() {
            tracing::warn!(error = %e, "failed to remove unrar working directory");
        }
        result
    }
}

/// `-sl` makes unrar skip entries of at least the given size, so oversized
/// entries never reach the disk.
fn size_limit_switch(max_entry_bytes: u64) -> String {
    format!("-sl{}b", max_entry_bytes.saturating_add(1))
}

/// Normalize the top-level image files of `unpacked` into `target`.
fn normalize_unpacked(unpacked: &Path, target: &Path, options: NormalizeOptions) -> Result<usize, Error> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(unpacked).map_err(|e| Error::storage(unpacked.display(), e))? {
        let entry = entry.map_err(|e| Error::storage(unpacked.display(), e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        // file_type() does not follow symlinks
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if is_file && accept_entry(&name) {
            files.push((name, entry.path()));
        } else {
            tracing::debug!(entry = %name, "skipping non-page rar entry");
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    std::fs::create_dir_all(target).map_err(|e| Error::storage(target.display(), e))?;
    let mut writer = PageWriter::new(target, options);

    for (name, path) in files {
        let size = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "skipping unreadable rar entry");
                continue;
            }
        };
        if size > options.max_entry_bytes {
            tracing::warn!(entry = %name, size, "skipping oversized rar entry");
            continue;
        }

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "skipping unreadable rar entry");
                continue;
            }
        };
        writer.write(&name, &bytes)?;
    }

    tracing::debug!(pages = writer.count(), "extracted rar archive");
    Ok(writer.count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fixtures::jpeg_bytes;
    use std::fs;

    #[test]
    fn test_unrar_error_mapping() {
        let bad = UnrarError::BadArchive { code: 3, stderr: "CRC failed".into() };
        assert!(matches!(Error::from(bad), Error::CorruptArchive(_)));

        let timeout = UnrarError::Timeout { program: "unrar".into(), timeout: Duration::from_secs(1) };
        assert!(matches!(Error::from(timeout), Error::ToolUnavailable(_)));

        let failed = UnrarError::Failed { code: Some(8), stderr: String::new() };
        assert!(matches!(Error::from(failed), Error::ToolUnavailable(_)));
    }

    #[test]
    fn test_size_limit_switch_excludes_entries_over_cap() {
        assert_eq!(size_limit_switch(1024), "-sl1025b");
        assert_eq!(size_limit_switch(u64::MAX), format!("-sl{}b", u64::MAX));
    }

    #[test]
    fn test_normalize_unpacked_sorts_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let unpacked = tmp.path().join("unpacked");
        fs::create_dir_all(unpacked.join("nested")).unwrap();
        fs::write(unpacked.join("b.jpg"), jpeg_bytes(20, 10)).unwrap();
        fs::write(unpacked.join("a.jpg"), jpeg_bytes(10, 20)).unwrap();
        fs::write(unpacked.join("info.txt"), b"text").unwrap();
        fs::write(unpacked.join("nested").join("c.jpg"), jpeg_bytes(10, 10)).unwrap();

        let target = tmp.path().join("pages");
        let count = normalize_unpacked(&unpacked, &target, NormalizeOptions::default()).unwrap();

        assert_eq!(count, 2);
        // a.jpg sorts first
        let first = image::open(target.join("000000.png")).unwrap();
        assert_eq!((first.width(), first.height()), (10, 20));
    }

    /// All process-spawning scenarios live in one test so no other test forks
    /// while the fake unpacker scripts are being written.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_unrar_invocation() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let fixtures = tmp.path().join("fixtures");
        fs::create_dir(&fixtures).unwrap();
        fs::write(fixtures.join("02.jpg"), jpeg_bytes(10, 10)).unwrap();
        fs::write(fixtures.join("01.jpg"), jpeg_bytes(10, 10)).unwrap();

        let script = |name: &str, body: String| {
            let path = tmp.path().join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        };
        // args: x -o- -y -sl<bytes>b -- <archive> <dest>/
        let args_log = tmp.path().join("args.txt");
        let good = script(
            "unrar-good",
            format!("echo \"$@\" > \"{}\"\ncp \"{}\"/* \"$7\"", args_log.display(), fixtures.display()),
        );
        let corrupt = script("unrar-corrupt", "echo 'checksum error' >&2; exit 3".to_string());
        let hang = script("unrar-hang", "sleep 10".to_string());

        let work = tmp.path().join("work");
        let archive = tmp.path().join("book.cbr");
        fs::write(&archive, b"Rar!").unwrap();
        let opts = NormalizeOptions::default();
        let timeout = Duration::from_secs(10);

        let target = tmp.path().join("good");
        let count = RarExtractor::new(&good, timeout, &work, opts).extract(&archive, &target).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0, "working directory must be removed");
        let args = fs::read_to_string(&args_log).unwrap();
        assert!(args.contains(&size_limit_switch(opts.max_entry_bytes)), "args: {args}");

        let target = tmp.path().join("corrupt");
        let err = RarExtractor::new(&corrupt, timeout, &work, opts).extract(&archive, &target).await.unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)), "got {err:?}");
        assert!(!target.exists());
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);

        let target = tmp.path().join("hang");
        let err = RarExtractor::new(&hang, Duration::from_millis(200), &work, opts)
            .extract(&archive, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable(_)), "got {err:?}");
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);

        let target = tmp.path().join("missing");
        let err = RarExtractor::new(tmp.path().join("no-such-unrar"), timeout, &work, opts)
            .extract(&archive, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable(_)), "got {err:?}");
        assert!(!err.to_string().is_empty());
    }
}
