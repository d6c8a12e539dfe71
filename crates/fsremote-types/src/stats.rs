//! File status records.
//!
//! The host answers a stat query with a capability object whose predicates
//! (`isDirectory()` and friends) cannot cross the wire. The executor
//! evaluates each predicate up front and ships the answers as `_is*`
//! booleans next to the numeric fields; [`Stats`] reads them back.

use crate::error::{MarshalError, MarshalResult};
use crate::schema::TypeDef;
use crate::value::Value;

const NUMERIC_FIELDS: [&str; 14] = [
    "dev",
    "ino",
    "mode",
    "nlink",
    "uid",
    "gid",
    "rdev",
    "size",
    "blksize",
    "blocks",
    "atimeMs",
    "mtimeMs",
    "ctimeMs",
    "birthtimeMs",
];

const DATE_FIELDS: [&str; 4] = ["atime", "mtime", "ctime", "birthtime"];

const PREDICATE_FIELDS: [&str; 7] = [
    "_isBlockDevice",
    "_isCharacterDevice",
    "_isDirectory",
    "_isFIFO",
    "_isFile",
    "_isSocket",
    "_isSymbolicLink",
];

/// Descriptor for the stats record.
pub fn stats_record() -> TypeDef {
    let numeric = NUMERIC_FIELDS.iter().map(|k| (*k, TypeDef::number()));
    let dates = DATE_FIELDS.iter().map(|k| (*k, TypeDef::date()));
    let predicates = PREDICATE_FIELDS.iter().map(|k| (*k, TypeDef::boolean()));
    TypeDef::object(numeric.chain(dates).chain(predicates))
}

/// File status with precomputed predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub dev: f64,
    pub ino: f64,
    pub mode: f64,
    pub nlink: f64,
    pub uid: f64,
    pub gid: f64,
    pub rdev: f64,
    pub size: f64,
    pub blksize: f64,
    pub blocks: f64,
    pub atime_ms: f64,
    pub mtime_ms: f64,
    pub ctime_ms: f64,
    pub birthtime_ms: f64,
    pub is_block_device: bool,
    pub is_character_device: bool,
    pub is_directory: bool,
    pub is_fifo: bool,
    pub is_file: bool,
    pub is_socket: bool,
    pub is_symbolic_link: bool,
}

impl Stats {
    pub fn is_block_device(&self) -> bool {
        self.is_block_device
    }

    pub fn is_character_device(&self) -> bool {
        self.is_character_device
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn is_fifo(&self) -> bool {
        self.is_fifo
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_socket(&self) -> bool {
        self.is_socket
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.is_symbolic_link
    }

    /// Last access time in epoch milliseconds.
    pub fn atime(&self) -> i64 {
        self.atime_ms.trunc() as i64
    }

    pub fn mtime(&self) -> i64 {
        self.mtime_ms.trunc() as i64
    }

    pub fn ctime(&self) -> i64 {
        self.ctime_ms.trunc() as i64
    }

    pub fn birthtime(&self) -> i64 {
        self.birthtime_ms.trunc() as i64
    }

    fn numbers(&self) -> [f64; 14] {
        [
            self.dev,
            self.ino,
            self.mode,
            self.nlink,
            self.uid,
            self.gid,
            self.rdev,
            self.size,
            self.blksize,
            self.blocks,
            self.atime_ms,
            self.mtime_ms,
            self.ctime_ms,
            self.birthtime_ms,
        ]
    }

    fn predicates(&self) -> [bool; 7] {
        [
            self.is_block_device,
            self.is_character_device,
            self.is_directory,
            self.is_fifo,
            self.is_file,
            self.is_socket,
            self.is_symbolic_link,
        ]
    }

    /// The wire record, predicates included.
    pub fn to_value(&self) -> Value {
        let numeric = NUMERIC_FIELDS
            .iter()
            .zip(self.numbers())
            .map(|(k, n)| (*k, Value::Number(n)));
        let dates = DATE_FIELDS
            .iter()
            .zip([self.atime(), self.mtime(), self.ctime(), self.birthtime()])
            .map(|(k, ms)| (*k, Value::Date(ms)));
        let predicates = PREDICATE_FIELDS
            .iter()
            .zip(self.predicates())
            .map(|(k, b)| (*k, Value::Bool(b)));
        Value::object(numeric.chain(dates).chain(predicates))
    }

    /// Rebuild from a wire record.
    pub fn from_value(value: &Value) -> MarshalResult<Self> {
        let def = stats_record();
        if !def.check(value) {
            return Err(MarshalError::mismatch(def.name(), value));
        }
        let number = |k: &str| value.field(k).as_f64().unwrap_or_default();
        let flag = |k: &str| value.field(k).as_bool().unwrap_or_default();
        Ok(Self {
            dev: number("dev"),
            ino: number("ino"),
            mode: number("mode"),
            nlink: number("nlink"),
            uid: number("uid"),
            gid: number("gid"),
            rdev: number("rdev"),
            size: number("size"),
            blksize: number("blksize"),
            blocks: number("blocks"),
            atime_ms: number("atimeMs"),
            mtime_ms: number("mtimeMs"),
            ctime_ms: number("ctimeMs"),
            birthtime_ms: number("birthtimeMs"),
            is_block_device: flag("_isBlockDevice"),
            is_character_device: flag("_isCharacterDevice"),
            is_directory: flag("_isDirectory"),
            is_fifo: flag("_isFIFO"),
            is_file: flag("_isFile"),
            is_socket: flag("_isSocket"),
            is_symbolic_link: flag("_isSymbolicLink"),
        })
    }
}
