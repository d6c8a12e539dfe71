//! Open flags from their string or numeric wire forms.

use fsremote_types::Value;
use fsremote_types::constants::{
    O_ACCMODE, O_APPEND, O_CREAT, O_EXCL, O_RDWR, O_SYNC, O_TRUNC, O_WRONLY,
};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use super::error::{HostError, HostResult};

/// How to open a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
    pub sync: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
            sync: false,
        }
    }
}

impl OpenFlags {
    /// Parse a flag argument, falling back to `default` when it is absent.
    pub fn from_value(value: &Value, default: &str) -> HostResult<Self> {
        match value {
            Value::Undefined | Value::Null => Self::parse(default),
            Value::String(s) => Self::parse(s),
            Value::Number(_) => value
                .as_i64()
                .and_then(|bits| u32::try_from(bits).ok())
                .map(Self::from_bits)
                .ok_or_else(|| HostError::invalid(format!("invalid flags {value}"))),
            other => Err(HostError::invalid(format!("invalid flags {other}"))),
        }
    }

    /// Parse a mnemonic such as `"r+"` or `"wx"`.
    pub fn parse(flags: &str) -> HostResult<Self> {
        let base = Self::default();
        let read_write = Self {
            write: true,
            ..base
        };
        let write_only = Self {
            read: false,
            write: true,
            ..base
        };
        Ok(match flags {
            "r" => base,
            "rs" | "sr" => Self { sync: true, ..base },
            "r+" => read_write,
            "rs+" | "sr+" => Self {
                sync: true,
                ..read_write
            },
            "w" => Self {
                create: true,
                truncate: true,
                ..write_only
            },
            "wx" | "xw" => Self {
                create: true,
                exclusive: true,
                ..write_only
            },
            "w+" => Self {
                create: true,
                truncate: true,
                ..read_write
            },
            "wx+" | "xw+" => Self {
                create: true,
                exclusive: true,
                ..read_write
            },
            "a" => Self {
                create: true,
                append: true,
                ..write_only
            },
            "ax" | "xa" => Self {
                create: true,
                append: true,
                exclusive: true,
                ..write_only
            },
            "as" | "sa" => Self {
                create: true,
                append: true,
                sync: true,
                ..write_only
            },
            "a+" => Self {
                create: true,
                append: true,
                ..read_write
            },
            "ax+" | "xa+" => Self {
                create: true,
                append: true,
                exclusive: true,
                ..read_write
            },
            "as+" | "sa+" => Self {
                create: true,
                append: true,
                sync: true,
                ..read_write
            },
            other => return Err(HostError::invalid(format!("invalid flags {other:?}"))),
        })
    }

    /// Decode a numeric flag word built from the shared constants table.
    pub fn from_bits(bits: u32) -> Self {
        let access = bits & O_ACCMODE;
        Self {
            read: access != O_WRONLY,
            write: access == O_WRONLY || access == O_RDWR,
            append: bits & O_APPEND != 0,
            create: bits & O_CREAT != 0,
            truncate: bits & O_TRUNC != 0,
            exclusive: bits & O_EXCL != 0,
            sync: bits & O_SYNC != 0,
        }
    }

    /// Open `path` with these flags, creating it with `mode` when needed.
    pub fn open(&self, path: &Path, mode: u32) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .mode(mode);
        if self.exclusive {
            options.create_new(self.create);
        } else {
            options.create(self.create);
        }
        // OpenOptions refuses truncate without write access.
        options.truncate(self.truncate && self.write && !self.append);
        if self.sync {
            options.custom_flags(sync_flag());
        }
        options.open(path)
    }
}

#[cfg(target_os = "linux")]
fn sync_flag() -> i32 {
    0o4010000
}

#[cfg(not(target_os = "linux"))]
fn sync_flag() -> i32 {
    0x80
}
