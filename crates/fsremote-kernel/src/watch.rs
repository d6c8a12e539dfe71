//! Host file watching.
//!
//! A [`HostWatcher`] wraps a `notify` watcher and turns its events into
//! [`WatchFrame`]s on an unbounded channel. Dropping the watcher stops the
//! feed; the receiver then sees the channel close.
//!
//! ```text
//!   notify callback (notify thread)
//!       └── frames_for(event) ─▶ mpsc::UnboundedSender<WatchFrame>
//!                                      │
//!   side channel task ◀────────────────┘  one JSON line per frame
//! ```

use fsremote_types::{ErrorDescription, FrameData, Value, WatchFrame};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::host::args;
use crate::host::{Encoding, HostError, HostResult};

/// Options accepted by `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub persistent: bool,
    pub recursive: bool,
    pub encoding: Encoding,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            recursive: false,
            encoding: Encoding::Utf8,
        }
    }
}

impl WatchOptions {
    /// Read from a bare encoding name or an options object.
    pub fn from_value(value: &Value) -> HostResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            persistent: args::option_bool(value, "persistent").unwrap_or(defaults.persistent),
            recursive: args::option_bool(value, "recursive").unwrap_or(defaults.recursive),
            encoding: args::encoding(value)?.unwrap_or(defaults.encoding),
        })
    }
}

/// A live watch on one host path.
pub struct HostWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for HostWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostWatcher").field("root", &self.root).finish()
    }
}

impl HostWatcher {
    /// Start watching `path`.
    ///
    /// Fails with `ENOENT` when the path does not exist.
    pub fn start(
        path: &Path,
        options: WatchOptions,
    ) -> HostResult<(Self, mpsc::UnboundedReceiver<WatchFrame>)> {
        let shown = path.to_string_lossy().into_owned();
        let meta = std::fs::metadata(path).map_err(|e| HostError::io(e, "watch", Some(&shown)))?;
        let root = path.to_path_buf();
        let naming = Naming {
            root: root.clone(),
            is_dir: meta.is_dir(),
            encoding: options.encoding,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let frames = match result {
                    Ok(event) => naming.frames_for(&event),
                    Err(e) => vec![error_frame(&e)],
                };
                for frame in frames {
                    // The receiver is gone once the side channel closes.
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| HostError::Watch(e.to_string()))?;

        let mode = if options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(path, mode)
            .map_err(|e| HostError::Watch(e.to_string()))?;

        tracing::debug!(path = %shown, recursive = options.recursive, "host watcher started");
        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// How event paths are reported.
struct Naming {
    root: PathBuf,
    is_dir: bool,
    encoding: Encoding,
}

impl Naming {
    fn frames_for(&self, event: &Event) -> Vec<WatchFrame> {
        let Some(event_type) = event_type(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .iter()
            .flat_map(|path| {
                let name = self.filename(path);
                [
                    WatchFrame::listener(event_type, name.clone()),
                    WatchFrame::watcher("change", name),
                ]
            })
            .collect()
    }

    /// Relative to a watched directory, or the file's own name.
    fn filename(&self, path: &Path) -> FrameData {
        let relative = if self.is_dir {
            path.strip_prefix(&self.root).ok()
        } else {
            None
        };
        let name = relative
            .map(|p| p.as_os_str())
            .or_else(|| path.file_name())
            .map(|n| n.as_bytes())
            .unwrap_or_default();
        match self.encoding {
            Encoding::Buffer => FrameData::Bytes(name.to_vec()),
            other => FrameData::Text(other.decode(name)),
        }
    }
}

/// `rename` for entries appearing or disappearing, `change` for content.
fn event_type(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            Some("rename")
        }
        EventKind::Modify(_) | EventKind::Any => Some("change"),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

fn error_frame(err: &notify::Error) -> WatchFrame {
    tracing::warn!(error = %err, "host watcher error");
    let code = match &err.kind {
        notify::ErrorKind::PathNotFound => Some("ENOENT".to_string()),
        notify::ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Some("EACCES".to_string())
        }
        _ => None,
    };
    WatchFrame::watcher(
        "error",
        FrameData::Error(ErrorDescription {
            name: "Error".to_string(),
            message: err.to_string(),
            code,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_event_types() {
        use notify::event::{CreateKind, DataChange, RenameMode};
        assert_eq!(event_type(&EventKind::Create(CreateKind::File)), Some("rename"));
        assert_eq!(
            event_type(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some("rename")
        );
        assert_eq!(
            event_type(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some("change")
        );
        assert_eq!(event_type(&EventKind::Other), None);
    }

    #[test]
    fn test_filename_relative_to_directory() {
        let naming = Naming {
            root: PathBuf::from("/w"),
            is_dir: true,
            encoding: Encoding::Utf8,
        };
        assert_eq!(
            naming.filename(Path::new("/w/sub/f.txt")),
            FrameData::Text("sub/f.txt".into())
        );
        let file = Naming {
            root: PathBuf::from("/w/f.txt"),
            is_dir: false,
            encoding: Encoding::Buffer,
        };
        assert_eq!(
            file.filename(Path::new("/w/f.txt")),
            FrameData::Bytes(b"f.txt".to_vec())
        );
    }

    #[test]
    fn test_each_path_yields_listener_then_watcher_frame() {
        let naming = Naming {
            root: PathBuf::from("/w"),
            is_dir: true,
            encoding: Encoding::Utf8,
        };
        let event = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/w/gone"));
        let frames = naming.frames_for(&event);
        assert_eq!(
            frames,
            vec![
                WatchFrame::listener("rename", FrameData::Text("gone".into())),
                WatchFrame::watcher("change", FrameData::Text("gone".into())),
            ]
        );
    }

    #[test]
    fn test_missing_path_is_enoent() {
        let err = HostWatcher::start(Path::new("/no/such/dir"), WatchOptions::default()).unwrap_err();
        assert_eq!(err.code(), "ENOENT");
    }

    #[tokio::test]
    async fn test_create_produces_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (_watcher, mut rx) = HostWatcher::start(dir.path(), WatchOptions::default()).unwrap();
        std::fs::write(dir.path().join("new.txt"), b"x").unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no frame within timeout")
            .unwrap();
        assert_eq!(frame.source, fsremote_types::FrameSource::Listener);
        assert_eq!(frame.data, FrameData::Text("new.txt".into()));
    }

    #[test]
    fn test_options_from_encoding_name() {
        let options = WatchOptions::from_value(&Value::from("buffer")).unwrap();
        assert_eq!(options.encoding, Encoding::Buffer);
        assert!(options.persistent);
        let options =
            WatchOptions::from_value(&Value::object([("recursive", Value::Bool(true))])).unwrap();
        assert!(options.recursive);
    }
}
