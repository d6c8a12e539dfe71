//! Executes filesystem operations against the local host.
//!
//! Every operation is a blocking `std::fs` call. Callers on an async
//! runtime run [`HostFs::execute`] through `spawn_blocking`.

use fsremote_types::constants::{COPYFILE_EXCL, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, F_OK, R_OK, W_OK, X_OK};
use fsremote_types::{TypedArrayKind, Value};
use std::fs::{self, DirBuilder, File, Permissions};
use std::io::{self, Read, Write};
use std::ops::Range;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::args::{self, arg};
use super::encoding::Encoding;
use super::error::{HostError, HostResult};
use super::fd::FdTable;
use super::flags::OpenFlags;
use super::stats::from_metadata;

/// Characters appended to an `mkdtemp` prefix.
const TEMP_SUFFIX_LEN: usize = 6;

/// Attempts before `mkdtemp` gives up on name collisions.
const TEMP_ATTEMPTS: usize = 16;

/// A path argument resolved for the host, with its printable form.
struct HostPath {
    path: PathBuf,
    shown: String,
}

impl HostPath {
    fn from_value(value: &Value) -> HostResult<Self> {
        let path = args::path(value)?;
        let shown = path.to_string_lossy().into_owned();
        Ok(Self { path, shown })
    }

    fn err(&self, syscall: &'static str) -> impl FnOnce(io::Error) -> HostError + '_ {
        move |e| HostError::io(e, syscall, Some(&self.shown))
    }
}

/// Either a path or an open descriptor.
enum Target {
    Path(HostPath),
    Fd(Arc<File>),
}

/// The host side of every registered operation.
#[derive(Debug, Default)]
pub struct HostFs {
    fds: FdTable,
}

impl HostFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors opened on behalf of remote callers.
    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    /// Run a simple operation by host name (`stat`, not `statSync`).
    pub fn execute(&self, op: &str, args: &[Value]) -> HostResult<Value> {
        tracing::debug!(op, argc = args.len(), "host call");
        match op {
            "access" => self.access(args),
            "appendFile" => self.write_whole(args, "a", Encoding::Utf8),
            "chmod" => self.chmod(args),
            "chown" => self.chown(args),
            "close" => self.close(args),
            "copyFile" => self.copy_file(args),
            "exists" => Ok(self.exists(args)),
            "fchmod" => self.fchmod(args),
            "fchown" => self.fchown(args),
            "fdatasync" => self.with_fd(args, "fdatasync", |f| f.sync_data()),
            "fsync" => self.with_fd(args, "fsync", |f| f.sync_all()),
            "ftruncate" => {
                let len = truncate_len(arg(args, 1))?;
                self.with_fd(args, "ftruncate", |f| f.set_len(len))
            }
            "futimes" => self.futimes(args),
            "lchmod" => Err(HostError::Unsupported("lchmod")),
            "lchown" => self.lchown(args),
            "link" => self.two_paths(args, "link", |from, to| fs::hard_link(from, to)),
            "mkdir" => self.mkdir(args),
            "mkdtemp" => self.mkdtemp(args),
            "open" => self.open(args),
            "read" => self.read_into(args).map(|(n, _)| Value::from(n)),
            "readdir" => self.readdir(args),
            "readFile" => self.read_file(args),
            "readlink" => self.readlink(args),
            "realpath" => self.realpath(args),
            "rename" => self.two_paths(args, "rename", |from, to| fs::rename(from, to)),
            "rmdir" => self.rmdir(args),
            "symlink" => self.two_paths(args, "symlink", |target, path| {
                std::os::unix::fs::symlink(target, path)
            }),
            "truncate" => self.truncate(args),
            "unlink" => self.unlink(args),
            "utimes" => self.utimes(args),
            "write" => self.write_from(args).map(|(n, _)| Value::from(n)),
            "writeFile" => self.write_whole(args, "w", Encoding::Utf8),
            other => Err(HostError::UnknownOperation(other.to_string())),
        }
    }

    // ========================================================================
    // Special operations
    // ========================================================================

    /// `stat`, `lstat` or `fstat`, with predicates evaluated.
    pub fn stat(&self, op: &str, args: &[Value]) -> HostResult<Value> {
        let meta = match op {
            "stat" => {
                let p = HostPath::from_value(arg(args, 0))?;
                fs::metadata(&p.path).map_err(p.err("stat"))?
            }
            "lstat" => {
                let p = HostPath::from_value(arg(args, 0))?;
                fs::symlink_metadata(&p.path).map_err(p.err("lstat"))?
            }
            "fstat" => {
                let file = self.fd(arg(args, 0), "fstat")?;
                file.metadata().map_err(|e| HostError::io(e, "fstat", None))?
            }
            other => return Err(HostError::UnknownOperation(other.to_string())),
        };
        Ok(from_metadata(&meta).to_value())
    }

    /// Any failure, including a malformed path, reads as `false`.
    pub fn exists(&self, args: &[Value]) -> Value {
        let found = args::path(arg(args, 0))
            .map(|p| p.exists())
            .unwrap_or(false);
        Value::Bool(found)
    }

    /// `read` with the filled buffer shipped back.
    pub fn read_record(&self, args: &[Value]) -> HostResult<Value> {
        let (n, buffer) = self.read_into(args)?;
        Ok(Value::object([
            ("bytesRead", Value::from(n)),
            ("buffer", Value::Buffer(buffer)),
        ]))
    }

    /// `write` with the written data echoed back.
    pub fn write_record(&self, args: &[Value]) -> HostResult<Value> {
        let (n, echo) = self.write_from(args)?;
        Ok(Value::object([
            ("bytesWritten", Value::from(n)),
            ("bufferOrString", echo),
        ]))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn fd(&self, value: &Value, syscall: &'static str) -> HostResult<Arc<File>> {
        self.fds.get(args::int(value, "fd")?, syscall)
    }

    fn target(&self, value: &Value, syscall: &'static str) -> HostResult<Target> {
        match value {
            Value::Number(_) => self.fd(value, syscall).map(Target::Fd),
            other => HostPath::from_value(other).map(Target::Path),
        }
    }

    fn with_fd(
        &self,
        args: &[Value],
        syscall: &'static str,
        op: impl FnOnce(&File) -> io::Result<()>,
    ) -> HostResult<Value> {
        let file = self.fd(arg(args, 0), syscall)?;
        op(&file).map_err(|e| HostError::io(e, syscall, None))?;
        Ok(Value::Undefined)
    }

    fn two_paths(
        &self,
        args: &[Value],
        syscall: &'static str,
        op: impl FnOnce(&PathBuf, &PathBuf) -> io::Result<()>,
    ) -> HostResult<Value> {
        let from = HostPath::from_value(arg(args, 0))?;
        let to = HostPath::from_value(arg(args, 1))?;
        op(&from.path, &to.path).map_err(|e| HostError::io2(e, syscall, &from.shown, &to.shown))?;
        Ok(Value::Undefined)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    fn access(&self, args: &[Value]) -> HostResult<Value> {
        use rustix::fs::Access;

        let p = HostPath::from_value(arg(args, 0))?;
        let bits = args::opt_int(arg(args, 1)).unwrap_or(F_OK as i64) as u32;
        let mut access = Access::EXISTS;
        if bits & R_OK != 0 {
            access |= Access::READ_OK;
        }
        if bits & W_OK != 0 {
            access |= Access::WRITE_OK;
        }
        if bits & X_OK != 0 {
            access |= Access::EXEC_OK;
        }
        rustix::fs::access(&p.path, access)
            .map_err(io::Error::from)
            .map_err(p.err("access"))?;
        Ok(Value::Undefined)
    }

    fn chmod(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let mode = args::mode(arg(args, 1), 0)?;
        fs::set_permissions(&p.path, Permissions::from_mode(mode)).map_err(p.err("chmod"))?;
        Ok(Value::Undefined)
    }

    fn fchmod(&self, args: &[Value]) -> HostResult<Value> {
        let mode = args::mode(arg(args, 1), 0)?;
        self.with_fd(args, "fchmod", |f| f.set_permissions(Permissions::from_mode(mode)))
    }

    fn chown(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let uid = args::owner(arg(args, 1), "uid")?;
        let gid = args::owner(arg(args, 2), "gid")?;
        std::os::unix::fs::chown(&p.path, uid, gid).map_err(p.err("chown"))?;
        Ok(Value::Undefined)
    }

    fn fchown(&self, args: &[Value]) -> HostResult<Value> {
        let uid = args::owner(arg(args, 1), "uid")?;
        let gid = args::owner(arg(args, 2), "gid")?;
        self.with_fd(args, "fchown", |f| std::os::unix::fs::fchown(f, uid, gid))
    }

    fn lchown(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let uid = args::owner(arg(args, 1), "uid")?;
        let gid = args::owner(arg(args, 2), "gid")?;
        std::os::unix::fs::lchown(&p.path, uid, gid).map_err(p.err("lchown"))?;
        Ok(Value::Undefined)
    }

    fn close(&self, args: &[Value]) -> HostResult<Value> {
        let fd = args::int(arg(args, 0), "fd")?;
        self.fds.remove(fd)?;
        tracing::trace!(fd, "closed descriptor");
        Ok(Value::Undefined)
    }

    fn copy_file(&self, args: &[Value]) -> HostResult<Value> {
        let exclusive = args::opt_int(arg(args, 2)).unwrap_or(0) as u32 & COPYFILE_EXCL != 0;
        self.two_paths(args, "copyfile", |from, to| {
            if exclusive && fs::symlink_metadata(to).is_ok() {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            fs::copy(from, to).map(|_| ())
        })
    }

    fn futimes(&self, args: &[Value]) -> HostResult<Value> {
        let times = file_times(args)?;
        self.with_fd(args, "futime", |f| {
            rustix::fs::futimens(f, &times).map_err(io::Error::from)
        })
    }

    /// Sets times by path, so special files are never opened.
    fn utimes(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let times = file_times(args)?;
        rustix::fs::utimensat(rustix::fs::CWD, &p.path, &times, rustix::fs::AtFlags::empty())
            .map_err(io::Error::from)
            .map_err(p.err("utime"))?;
        Ok(Value::Undefined)
    }

    fn mkdir(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let options = arg(args, 1);
        let (recursive, mode) = match options {
            Value::Number(_) => (false, args::mode(options, DEFAULT_DIR_MODE)?),
            _ => (
                args::option_bool(options, "recursive").unwrap_or(false),
                args::mode(options.field("mode"), DEFAULT_DIR_MODE)?,
            ),
        };
        DirBuilder::new()
            .recursive(recursive)
            .mode(mode)
            .create(&p.path)
            .map_err(p.err("mkdir"))?;
        Ok(Value::Undefined)
    }

    fn mkdtemp(&self, args: &[Value]) -> HostResult<Value> {
        let prefix = arg(args, 0)
            .as_str()
            .ok_or_else(|| HostError::invalid("prefix must be a string"))?;
        let mut last = io::Error::from(io::ErrorKind::AlreadyExists);
        for _ in 0..TEMP_ATTEMPTS {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            let candidate = format!("{prefix}{}", &suffix[..TEMP_SUFFIX_LEN]);
            match DirBuilder::new().mode(0o700).create(&candidate) {
                Ok(()) => return Ok(Value::String(candidate)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last = e,
                Err(e) => {
                    let shown = format!("{prefix}XXXXXX");
                    return Err(HostError::io(e, "mkdtemp", Some(&shown)));
                }
            }
        }
        Err(HostError::io(last, "mkdtemp", Some(&format!("{prefix}XXXXXX"))))
    }

    fn open(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let flags = OpenFlags::from_value(arg(args, 1), "r")?;
        let mode = args::mode(arg(args, 2), DEFAULT_FILE_MODE)?;
        let file = flags.open(&p.path, mode).map_err(p.err("open"))?;
        let fd = self.fds.insert(file);
        tracing::trace!(fd, path = %p.shown, "opened descriptor");
        Ok(Value::from(fd))
    }

    fn readdir(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let options = arg(args, 1);
        if args::option_bool(options, "withFileTypes") == Some(true) {
            return Err(HostError::invalid("withFileTypes is not supported over the wire"));
        }
        let encoding = args::encoding(options)?.unwrap_or(Encoding::Utf8);
        let mut names = fs::read_dir(&p.path)
            .map_err(p.err("scandir"))?
            .map(|entry| entry.map(|e| e.file_name().as_bytes().to_vec()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(p.err("scandir"))?;
        names.sort();
        Ok(Value::array(names.iter().map(|n| args::name_value(n, encoding))))
    }

    fn read_file(&self, args: &[Value]) -> HostResult<Value> {
        let options = arg(args, 1);
        let encoding = args::encoding(options)?;
        let mut contents = Vec::new();
        match self.target(arg(args, 0), "read")? {
            Target::Path(p) => {
                let flags = OpenFlags::from_value(options.field("flag"), "r")?;
                let mut file = flags.open(&p.path, DEFAULT_FILE_MODE).map_err(p.err("open"))?;
                file.read_to_end(&mut contents).map_err(p.err("read"))?;
            }
            Target::Fd(file) => {
                (&*file)
                    .read_to_end(&mut contents)
                    .map_err(|e| HostError::io(e, "read", None))?;
            }
        }
        Ok(match encoding {
            None | Some(Encoding::Buffer) => Value::Buffer(contents),
            Some(encoding) => Value::String(encoding.decode(&contents)),
        })
    }

    fn readlink(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let encoding = args::encoding(arg(args, 1))?.unwrap_or(Encoding::Utf8);
        let target = fs::read_link(&p.path).map_err(p.err("readlink"))?;
        Ok(args::name_value(target.as_os_str().as_bytes(), encoding))
    }

    fn realpath(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let encoding = args::encoding(arg(args, 1))?.unwrap_or(Encoding::Utf8);
        let resolved = fs::canonicalize(&p.path).map_err(p.err("realpath"))?;
        Ok(args::name_value(resolved.as_os_str().as_bytes(), encoding))
    }

    fn rmdir(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        fs::remove_dir(&p.path).map_err(p.err("rmdir"))?;
        Ok(Value::Undefined)
    }

    fn unlink(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        fs::remove_file(&p.path).map_err(p.err("unlink"))?;
        Ok(Value::Undefined)
    }

    fn truncate(&self, args: &[Value]) -> HostResult<Value> {
        let p = HostPath::from_value(arg(args, 0))?;
        let len = truncate_len(arg(args, 1))?;
        fs::OpenOptions::new()
            .write(true)
            .open(&p.path)
            .and_then(|f| f.set_len(len))
            .map_err(p.err("open"))?;
        Ok(Value::Undefined)
    }

    /// `writeFile` and `appendFile`: the whole payload in one call.
    fn write_whole(&self, args: &[Value], default_flag: &str, default: Encoding) -> HostResult<Value> {
        let options = arg(args, 2);
        let encoding = args::encoding(options)?.unwrap_or(default);
        let bytes = args::data(arg(args, 1), encoding)?;
        match self.target(arg(args, 0), "write")? {
            Target::Path(p) => {
                let flags = OpenFlags::from_value(options.field("flag"), default_flag)?;
                let mode = args::mode(options.field("mode"), DEFAULT_FILE_MODE)?;
                let mut file = flags.open(&p.path, mode).map_err(p.err("open"))?;
                file.write_all(&bytes).map_err(p.err("write"))?;
            }
            Target::Fd(file) => {
                (&*file)
                    .write_all(&bytes)
                    .map_err(|e| HostError::io(e, "write", None))?;
            }
        }
        Ok(Value::Undefined)
    }

    /// Read into a copy of the caller's buffer.
    fn read_into(&self, args: &[Value]) -> HostResult<(usize, Vec<u8>)> {
        let file = self.fd(arg(args, 0), "read")?;
        let mut buffer = arg(args, 1)
            .as_bytes()
            .ok_or_else(|| HostError::invalid("buffer must be a Buffer or typed array"))?;
        let offset = args::int(arg(args, 2), "offset")?;
        let length = args::int(arg(args, 3), "length")?;
        let range = slice_range(buffer.len(), offset, length)?;
        let target = &mut buffer[range];
        let n = match args::position(arg(args, 4))? {
            Some(pos) => file.read_at(target, pos),
            None => (&*file).read(target),
        }
        .map_err(|e| HostError::io(e, "read", None))?;
        Ok((n, buffer))
    }

    /// Write a string or a slice of a binary value.
    ///
    /// Returns the byte count and the value to echo back: strings and
    /// byte-sized arrays as given, wider typed arrays as a buffer.
    fn write_from(&self, args: &[Value]) -> HostResult<(usize, Value)> {
        let file = self.fd(arg(args, 0), "write")?;
        let data = arg(args, 1);
        let (bytes, position, echo) = match data {
            Value::String(s) => {
                let encoding = match arg(args, 3).as_str() {
                    Some(name) => Encoding::parse(name)?,
                    None => Encoding::Utf8,
                };
                (encoding.encode(s)?, args::position(arg(args, 2))?, data.clone())
            }
            other => {
                let all = other
                    .as_bytes()
                    .ok_or_else(|| HostError::invalid(format!("cannot write {other}")))?;
                let offset = args::checked_int(arg(args, 2), "offset")?.unwrap_or(0);
                let length = args::checked_int(arg(args, 3), "length")?
                    .unwrap_or(all.len() as i64 - offset);
                let range = slice_range(all.len(), offset, length)?;
                let echo = match other {
                    Value::TypedArray(a) if a.kind == TypedArrayKind::Uint8Array => other.clone(),
                    Value::Buffer(_) => other.clone(),
                    _ => Value::Buffer(all.clone()),
                };
                (all[range].to_vec(), args::position(arg(args, 4))?, echo)
            }
        };
        match position {
            Some(pos) => file.write_all_at(&bytes, pos),
            None => (&*file).write_all(&bytes),
        }
        .map_err(|e| HostError::io(e, "write", None))?;
        Ok((bytes.len(), echo))
    }
}

/// Negative lengths truncate to zero.
fn truncate_len(value: &Value) -> HostResult<u64> {
    Ok(args::checked_int(value, "len")?
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0))
}

fn file_times(args: &[Value]) -> HostResult<rustix::fs::Timestamps> {
    Ok(rustix::fs::Timestamps {
        last_access: timespec(args::time(arg(args, 1))?)?,
        last_modification: timespec(args::time(arg(args, 2))?)?,
    })
}

fn timespec(time: SystemTime) -> HostResult<rustix::fs::Timespec> {
    let out_of_range = || HostError::invalid(format!("time out of range: {time:?}"));
    let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (
            i64::try_from(after.as_secs()).map_err(|_| out_of_range())?,
            after.subsec_nanos(),
        ),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).map_err(|_| out_of_range())?;
            match before.subsec_nanos() {
                0 => (-secs, 0),
                n => (-secs - 1, 1_000_000_000 - n),
            }
        }
    };
    Ok(rustix::fs::Timespec {
        tv_sec: secs as _,
        tv_nsec: nanos as _,
    })
}

fn slice_range(len: usize, offset: i64, length: i64) -> HostResult<Range<usize>> {
    let out_of_range =
        || HostError::invalid(format!("offset {offset} and length {length} out of range for {len} bytes"));
    let start = usize::try_from(offset).map_err(|_| out_of_range())?;
    let count = usize::try_from(length).map_err(|_| out_of_range())?;
    let end = start
        .checked_add(count)
        .filter(|end| *end <= len)
        .ok_or_else(out_of_range)?;
    Ok(start..end)
}
