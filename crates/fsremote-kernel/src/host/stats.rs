//! Host metadata to stats records.

use fsremote_types::Stats;
use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::UNIX_EPOCH;

fn millis(seconds: i64, nanos: i64) -> f64 {
    seconds as f64 * 1000.0 + nanos as f64 / 1_000_000.0
}

/// Creation time where the platform reports one, else the epoch.
fn birthtime_ms(meta: &Metadata) -> f64 {
    meta.created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Evaluate every field and predicate of `meta`.
pub fn from_metadata(meta: &Metadata) -> Stats {
    let kind = meta.file_type();
    Stats {
        dev: meta.dev() as f64,
        ino: meta.ino() as f64,
        mode: meta.mode() as f64,
        nlink: meta.nlink() as f64,
        uid: meta.uid() as f64,
        gid: meta.gid() as f64,
        rdev: meta.rdev() as f64,
        size: meta.size() as f64,
        blksize: meta.blksize() as f64,
        blocks: meta.blocks() as f64,
        atime_ms: millis(meta.atime(), meta.atime_nsec()),
        mtime_ms: millis(meta.mtime(), meta.mtime_nsec()),
        ctime_ms: millis(meta.ctime(), meta.ctime_nsec()),
        birthtime_ms: birthtime_ms(meta),
        is_block_device: kind.is_block_device(),
        is_character_device: kind.is_char_device(),
        is_directory: kind.is_dir(),
        is_fifo: kind.is_fifo(),
        is_file: kind.is_file(),
        is_socket: kind.is_socket(),
        is_symbolic_link: kind.is_symlink(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_and_file_predicates() {
        let dir = tempfile::tempdir().unwrap();
        let stats = from_metadata(&std::fs::metadata(dir.path()).unwrap());
        assert!(stats.is_directory());
        assert!(!stats.is_file());

        let file = dir.path().join("f");
        std::fs::write(&file, b"12345").unwrap();
        let stats = from_metadata(&std::fs::metadata(&file).unwrap());
        assert!(stats.is_file());
        assert_eq!(stats.size, 5.0);
        assert!(stats.mtime_ms > 0.0);
    }

    #[test]
    fn test_symlink_seen_by_lstat_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t");
        std::fs::write(&target, b"").unwrap();
        let link = dir.path().join("l");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        assert!(from_metadata(&std::fs::symlink_metadata(&link).unwrap()).is_symbolic_link());
        assert!(!from_metadata(&std::fs::metadata(&link).unwrap()).is_symbolic_link());
    }
}
