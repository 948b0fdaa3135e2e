//! Backup of staged artifacts and output naming.
//!
//! After an item is assembled its staged pages are moved, not copied, into
//! `<backup_root>/<sanitized name>/`. When that directory already holds
//! files from an earlier run a numeric suffix is appended (`name_2`,
//! `name_3`, …) so nothing is overwritten. The staging store is empty once
//! a backup succeeds.

use crate::error::ArchiveError;
use crate::pipeline::staging::StagingStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Longest sanitized name, in characters.
pub const MAX_NAME_CHARS: usize = 200;

/// Longest sanitized name, in UTF-8 bytes. Leaves room under the common
/// 255-byte file name limit for `.pdf.tmp` and a `_N` backup suffix.
pub const MAX_NAME_BYTES: usize = 240;

/// Characters not allowed in file names on common filesystems.
static RE_RESERVED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Turn a display name into a safe file or directory name.
///
/// Reserved characters and whitespace runs become `_`; the result is capped
/// at [`MAX_NAME_CHARS`] characters and [`MAX_NAME_BYTES`] bytes, cut on a
/// character boundary. Names that would resolve to the backup root itself
/// (empty, `.`, `..`) become `untitled`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = RE_RESERVED.replace_all(name, "_");
    let replaced = RE_WHITESPACE.replace_all(&replaced, "_");
    let mut truncated = String::new();
    for c in replaced.chars().take(MAX_NAME_CHARS) {
        if truncated.len() + c.len_utf8() > MAX_NAME_BYTES {
            break;
        }
        truncated.push(c);
    }
    match truncated.trim() {
        "" | "." | ".." => "untitled".to_string(),
        cleaned => cleaned.to_string(),
    }
}

/// Where a backup landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReceipt {
    pub path: PathBuf,
    pub files: usize,
}

/// Move every staged artifact into a per-item directory under `backup_root`.
///
/// Leaves the staging store empty on success.
pub async fn backup_staged(
    store: &StagingStore,
    backup_root: &Path,
    display_name: &str,
) -> Result<BackupReceipt, ArchiveError> {
    let fail = |path: &Path, source: std::io::Error| ArchiveError::BackupFailed {
        path: path.to_path_buf(),
        source,
    };

    let target = unused_directory(backup_root, &sanitize_filename(display_name))
        .await
        .map_err(|e| fail(backup_root, e))?;
    tokio::fs::create_dir_all(&target)
        .await
        .map_err(|e| fail(&target, e))?;

    let artifacts = store
        .list_ordered()
        .await
        .map_err(|e| fail(store.dir(), e))?;

    let mut files = 0;
    for artifact in &artifacts {
        let file_name = artifact
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.png", artifact.page)));
        let dest = target.join(file_name);
        move_file(&artifact.path, &dest)
            .await
            .map_err(|e| fail(&dest, e))?;
        files += 1;
    }

    store.clear().await.map_err(|e| fail(store.dir(), e))?;

    info!(
        "Backed up {} page image(s) to {}",
        files,
        target.display()
    );
    Ok(BackupReceipt {
        path: target,
        files,
    })
}

/// First of `root/name`, `root/name_2`, `root/name_3`, … that is missing or
/// empty.
async fn unused_directory(root: &Path, name: &str) -> std::io::Result<PathBuf> {
    let mut suffix = 1u32;
    loop {
        let candidate = if suffix == 1 {
            root.join(name)
        } else {
            root.join(format!("{name}_{suffix}"))
        };
        if !is_occupied(&candidate).await? {
            return Ok(candidate);
        }
        debug!("Backup directory {} in use", candidate.display());
        suffix += 1;
    }
}

async fn is_occupied(dir: &Path) -> std::io::Result<bool> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_reserved_and_whitespace() {
        assert_eq!(sanitize_filename(r#"My/Book: "Vol 1""#), "My_Book___Vol_1_");
        assert_eq!(sanitize_filename("a\\b|c?d*e"), "a_b_c_d_e");
        assert_eq!(sanitize_filename("  spaced   out  "), "_spaced_out_");
    }

    #[test]
    fn sanitize_never_empty() {
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename(".."), "untitled");
        assert_eq!(sanitize_filename("..."), "...");
    }

    #[test]
    fn sanitize_truncates_on_char_boundary() {
        let out = sanitize_filename(&"x".repeat(300));
        assert_eq!(out.chars().count(), MAX_NAME_CHARS);
        let out = sanitize_filename(&"é".repeat(300));
        assert_eq!(out.chars().count(), MAX_NAME_BYTES / 2);
    }

    #[test]
    fn sanitize_caps_multibyte_names_by_bytes() {
        let out = sanitize_filename(&"数".repeat(200));
        assert_eq!(out.len(), 240);
        assert_eq!(out.chars().count(), 80);

        // 2-byte chars: the byte cap lands mid-character at 241.
        let out = sanitize_filename(&format!("a{}", "é".repeat(150)));
        assert_eq!(out.len(), 239);
        assert!(out.len() + ".pdf.tmp".len() <= 255);
    }

    #[test]
    fn sanitize_keeps_unicode_titles() {
        assert_eq!(sanitize_filename("数学 I"), "数学_I");
    }

    #[tokio::test]
    async fn backup_moves_and_clears() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::open(tmp.path().join("imgs")).await.unwrap();
        store.put(1, b"one").await.unwrap();
        store.put(2, b"two").await.unwrap();

        let receipt = backup_staged(&store, &tmp.path().join("save"), "Book A")
            .await
            .unwrap();
        assert_eq!(receipt.files, 2);
        assert_eq!(receipt.path, tmp.path().join("save").join("Book_A"));
        assert_eq!(
            tokio::fs::read(receipt.path.join("2.png")).await.unwrap(),
            b"two"
        );
        assert!(store.is_empty().await.unwrap());
    }

    #[test]
    fn second_backup_of_same_name_gets_suffix() {
        tokio_test::block_on(async {
            let tmp = TempDir::new().unwrap();
            let save = tmp.path().join("save");
            let store = StagingStore::open(tmp.path().join("imgs")).await.unwrap();

            store.put(1, b"first run").await.unwrap();
            let first = backup_staged(&store, &save, "Book").await.unwrap();
            store.put(1, b"second run").await.unwrap();
            let second = backup_staged(&store, &save, "Book").await.unwrap();
            store.put(1, b"third run").await.unwrap();
            let third = backup_staged(&store, &save, "Book").await.unwrap();

            assert_eq!(first.path, save.join("Book"));
            assert_eq!(second.path, save.join("Book_2"));
            assert_eq!(third.path, save.join("Book_3"));
            assert_eq!(
                tokio::fs::read(first.path.join("1.png")).await.unwrap(),
                b"first run"
            );
        });
    }
}
