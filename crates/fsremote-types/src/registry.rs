//! The method registry.
//!
//! Every remotely callable operation is described once here, by name. Both
//! ends build a [`Registry`] from these definitions at startup and never
//! mutate it; there is no negotiation, so a name resolves to the same
//! argument and result schemas on either side.
//!
//! Operations live in one of two tables:
//!
//! - **simple**: one request, one response. The generic marshaling path
//!   handles every entry.
//! - **special**: a synthetic multi-value result, stat post-processing, or a
//!   side-channel setup. Each [`SpecialKind`] has its own handler.

use crate::schema::TypeDef;
use crate::stats::stats_record;
use crate::value::TypedArrayKind;
use indexmap::IndexMap;
use strum::{Display, IntoEnumIterator};

/// Non-uniform calling conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SpecialKind {
    /// Boolean result; host failures read as `false`.
    Exists,
    /// Stats record with precomputed predicate booleans.
    Stat,
    /// `{bytesRead, buffer}` destructured by the caller.
    Read,
    /// `{bytesWritten, bufferOrString}` destructured by the caller.
    Write,
    /// Side-channel event feed.
    Watch,
    /// Side-channel byte pipe, remote to local.
    CreateReadStream,
    /// Side-channel byte pipe, local to remote.
    CreateWriteStream,
    /// Client-side stat polling.
    WatchFile,
    UnwatchFile,
}

impl SpecialKind {
    /// Whether calls of this kind go through the RPC channel at all.
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::WatchFile | Self::UnwatchFile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Simple,
    Special(SpecialKind),
}

/// One registry entry.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: &'static str,
    /// A tuple, or a union of tuples for overloaded operations.
    pub args: TypeDef,
    /// Absent for side-channel setup.
    pub result: Option<TypeDef>,
    /// Blocking variant.
    pub sync: bool,
    pub kind: MethodKind,
}

impl MethodSpec {
    /// Name of the host operation, shared by the blocking and non-blocking variants.
    ///
    /// `.native` aliases run the same operation as the plain name.
    pub fn host_op(&self) -> &'static str {
        let name = self.name.strip_suffix(".native").unwrap_or(self.name);
        name.strip_suffix("Sync").unwrap_or(name)
    }

    pub fn special_kind(&self) -> Option<SpecialKind> {
        match self.kind {
            MethodKind::Special(kind) => Some(kind),
            MethodKind::Simple => None,
        }
    }
}

/// Immutable operation tables.
#[derive(Debug, Clone)]
pub struct Registry {
    simple: IndexMap<&'static str, MethodSpec>,
    special: IndexMap<&'static str, MethodSpec>,
}

// ============================================================================
// Shared schema fragments
// ============================================================================

/// Anything the host accepts as a path.
pub fn path() -> TypeDef {
    TypeDef::union([TypeDef::string(), TypeDef::buffer(), TypeDef::url()])
}

/// Any fixed-width numeric array.
pub fn typed_array() -> TypeDef {
    TypeDef::union(TypedArrayKind::iter().map(TypeDef::typed_array))
}

/// A byte source or destination.
fn binary() -> TypeDef {
    TypeDef::union([TypeDef::buffer(), typed_array()])
}

/// A path or an open descriptor.
fn file() -> TypeDef {
    TypeDef::union([path(), TypeDef::integer()])
}

/// Timestamps: seconds, a numeric string, or a date.
fn time() -> TypeDef {
    TypeDef::union([TypeDef::number(), TypeDef::string(), TypeDef::date()])
}

fn nullable(def: TypeDef) -> TypeDef {
    TypeDef::union([def, TypeDef::null()])
}

/// Either an encoding name or an options shape.
fn options<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypeDef)>) -> TypeDef {
    TypeDef::maybe(TypeDef::union([TypeDef::string(), TypeDef::shape(fields)]))
}

fn encoding_options() -> TypeDef {
    options([("encoding", nullable(TypeDef::string()))])
}

fn write_file_options() -> TypeDef {
    options([
        ("encoding", nullable(TypeDef::string())),
        ("mode", TypeDef::integer()),
        ("flag", TypeDef::string()),
    ])
}

fn tuple<const N: usize>(members: [TypeDef; N]) -> TypeDef {
    TypeDef::tuple(members)
}

/// Single overloads stay a bare tuple; several become a union.
fn overloads<const N: usize>(tuples: [TypeDef; N]) -> TypeDef {
    if N == 1 {
        tuples.into_iter().next().unwrap_or_else(|| TypeDef::tuple([]))
    } else {
        TypeDef::union(tuples)
    }
}

fn int() -> TypeDef {
    TypeDef::integer()
}

fn opt_int() -> TypeDef {
    TypeDef::maybe(TypeDef::integer())
}

fn undefined() -> Option<TypeDef> {
    Some(TypeDef::undefined())
}

fn read_args() -> TypeDef {
    tuple([int(), binary(), int(), int(), nullable(int())])
}

fn write_args() -> TypeDef {
    overloads([
        tuple([int(), TypeDef::string()]),
        tuple([int(), TypeDef::string(), opt_int()]),
        tuple([
            int(),
            TypeDef::string(),
            opt_int(),
            TypeDef::maybe(TypeDef::string()),
        ]),
        tuple([int(), binary()]),
        tuple([int(), binary(), opt_int()]),
        tuple([int(), binary(), opt_int(), opt_int()]),
        tuple([int(), binary(), opt_int(), opt_int(), opt_int()]),
    ])
}

fn path_or_options(options: TypeDef) -> TypeDef {
    overloads([tuple([path()]), tuple([path(), options])])
}

impl Registry {
    /// Build the standard operation set.
    pub fn standard() -> Self {
        let mut registry = Self {
            simple: IndexMap::new(),
            special: IndexMap::new(),
        };
        registry.define_simple();
        registry.define_special();
        registry
    }

    fn define_simple(&mut self) {
        self.pair(
            "access",
            "accessSync",
            overloads([tuple([path()]), tuple([path(), opt_int()])]),
            undefined(),
        );
        self.pair(
            "appendFile",
            "appendFileSync",
            overloads([
                tuple([file(), TypeDef::union([TypeDef::string(), TypeDef::buffer()])]),
                tuple([
                    file(),
                    TypeDef::union([TypeDef::string(), TypeDef::buffer()]),
                    write_file_options(),
                ]),
            ]),
            undefined(),
        );
        self.pair(
            "chmod",
            "chmodSync",
            tuple([path(), TypeDef::union([TypeDef::string(), int()])]),
            undefined(),
        );
        self.pair("chown", "chownSync", tuple([path(), int(), int()]), undefined());
        self.pair("close", "closeSync", tuple([int()]), undefined());
        self.pair(
            "copyFile",
            "copyFileSync",
            overloads([tuple([path(), path()]), tuple([path(), path(), opt_int()])]),
            undefined(),
        );
        self.add(
            "existsSync",
            tuple([path()]),
            Some(TypeDef::boolean()),
            true,
            MethodKind::Simple,
        );
        self.pair(
            "fchmod",
            "fchmodSync",
            tuple([int(), TypeDef::union([TypeDef::string(), int()])]),
            undefined(),
        );
        self.pair("fchown", "fchownSync", tuple([int(), int(), int()]), undefined());
        self.pair("fdatasync", "fdatasyncSync", tuple([int()]), undefined());
        self.pair("fsync", "fsyncSync", tuple([int()]), undefined());
        self.pair(
            "ftruncate",
            "ftruncateSync",
            overloads([tuple([int()]), tuple([int(), opt_int()])]),
            undefined(),
        );
        self.pair("futimes", "futimesSync", tuple([int(), time(), time()]), undefined());
        self.pair("lchmod", "lchmodSync", tuple([path(), int()]), undefined());
        self.pair("lchown", "lchownSync", tuple([path(), int(), int()]), undefined());
        self.pair("link", "linkSync", tuple([path(), path()]), undefined());
        self.pair(
            "mkdir",
            "mkdirSync",
            overloads([
                tuple([path()]),
                tuple([
                    path(),
                    TypeDef::maybe(TypeDef::union([
                        int(),
                        TypeDef::shape([("recursive", TypeDef::boolean()), ("mode", int())]),
                    ])),
                ]),
            ]),
            undefined(),
        );
        self.pair(
            "mkdtemp",
            "mkdtempSync",
            overloads([
                tuple([TypeDef::string()]),
                tuple([TypeDef::string(), encoding_options()]),
            ]),
            Some(TypeDef::string()),
        );
        let flags = || TypeDef::maybe(TypeDef::union([TypeDef::string(), int()]));
        self.pair(
            "open",
            "openSync",
            overloads([
                tuple([path()]),
                tuple([path(), flags()]),
                tuple([path(), flags(), opt_int()]),
            ]),
            Some(int()),
        );
        self.pair(
            "readdir",
            "readdirSync",
            path_or_options(options([
                ("encoding", nullable(TypeDef::string())),
                ("withFileTypes", TypeDef::boolean()),
            ])),
            Some(TypeDef::union([
                TypeDef::array(TypeDef::string()),
                TypeDef::array(TypeDef::buffer()),
            ])),
        );
        self.pair(
            "readFile",
            "readFileSync",
            overloads([
                tuple([file()]),
                tuple([
                    file(),
                    options([
                        ("encoding", nullable(TypeDef::string())),
                        ("flag", TypeDef::string()),
                    ]),
                ]),
            ]),
            Some(TypeDef::union([TypeDef::string(), TypeDef::buffer()])),
        );
        self.pair(
            "readlink",
            "readlinkSync",
            path_or_options(encoding_options()),
            Some(TypeDef::union([TypeDef::string(), TypeDef::buffer()])),
        );
        self.add(
            "readSync",
            read_args(),
            Some(TypeDef::number()),
            true,
            MethodKind::Simple,
        );
        for (name, sync_name) in [
            ("realpath", "realpathSync"),
            ("realpath.native", "realpathSync.native"),
        ] {
            self.pair(
                name,
                sync_name,
                path_or_options(encoding_options()),
                Some(TypeDef::union([TypeDef::string(), TypeDef::buffer()])),
            );
        }
        self.pair("rename", "renameSync", tuple([path(), path()]), undefined());
        self.pair("rmdir", "rmdirSync", tuple([path()]), undefined());
        self.pair(
            "symlink",
            "symlinkSync",
            overloads([
                tuple([path(), path()]),
                tuple([path(), path(), TypeDef::maybe(nullable(TypeDef::string()))]),
            ]),
            undefined(),
        );
        self.pair(
            "truncate",
            "truncateSync",
            overloads([tuple([path()]), tuple([path(), opt_int()])]),
            undefined(),
        );
        self.pair("unlink", "unlinkSync", tuple([path()]), undefined());
        self.pair("utimes", "utimesSync", tuple([path(), time(), time()]), undefined());
        let data = || TypeDef::union([TypeDef::string(), TypeDef::buffer(), typed_array()]);
        self.pair(
            "writeFile",
            "writeFileSync",
            overloads([
                tuple([file(), data()]),
                tuple([file(), data(), write_file_options()]),
            ]),
            undefined(),
        );
        self.add("writeSync", write_args(), Some(int()), true, MethodKind::Simple);
    }

    fn define_special(&mut self) {
        use SpecialKind::*;

        self.add(
            "exists",
            tuple([path()]),
            Some(TypeDef::boolean()),
            false,
            MethodKind::Special(Exists),
        );

        let bigint = || TypeDef::maybe(TypeDef::shape([("bigint", TypeDef::boolean())]));
        for (name, sync, target) in [
            ("stat", false, path()),
            ("statSync", true, path()),
            ("lstat", false, path()),
            ("lstatSync", true, path()),
            ("fstat", false, int()),
            ("fstatSync", true, int()),
        ] {
            self.add(
                name,
                overloads([tuple([target.clone()]), tuple([target, bigint()])]),
                Some(stats_record()),
                sync,
                MethodKind::Special(Stat),
            );
        }

        self.add(
            "read",
            read_args(),
            Some(TypeDef::object([
                ("bytesRead", int()),
                ("buffer", TypeDef::buffer()),
            ])),
            false,
            MethodKind::Special(Read),
        );
        self.add(
            "write",
            write_args(),
            Some(TypeDef::object([
                ("bytesWritten", int()),
                (
                    "bufferOrString",
                    TypeDef::union([
                        TypeDef::buffer(),
                        TypeDef::typed_array(TypedArrayKind::Uint8Array),
                        TypeDef::string(),
                    ]),
                ),
            ])),
            false,
            MethodKind::Special(Write),
        );

        self.add(
            "watch",
            path_or_options(options([
                ("persistent", TypeDef::boolean()),
                ("recursive", TypeDef::boolean()),
                ("encoding", TypeDef::string()),
            ])),
            None,
            true,
            MethodKind::Special(Watch),
        );
        self.add(
            "createReadStream",
            path_or_options(options([
                ("flags", TypeDef::string()),
                ("encoding", nullable(TypeDef::string())),
                ("fd", nullable(int())),
                ("mode", int()),
                ("autoClose", TypeDef::boolean()),
                ("start", int()),
                ("end", TypeDef::union([int(), TypeDef::infinity()])),
                ("highWaterMark", int()),
            ])),
            None,
            true,
            MethodKind::Special(CreateReadStream),
        );
        self.add(
            "createWriteStream",
            path_or_options(options([
                ("flags", TypeDef::string()),
                ("encoding", nullable(TypeDef::string())),
                ("fd", nullable(int())),
                ("mode", int()),
                ("autoClose", TypeDef::boolean()),
                ("start", int()),
            ])),
            None,
            true,
            MethodKind::Special(CreateWriteStream),
        );
        self.add(
            "watchFile",
            path_or_options(TypeDef::maybe(TypeDef::shape([
                ("persistent", TypeDef::boolean()),
                ("interval", int()),
            ]))),
            None,
            true,
            MethodKind::Special(WatchFile),
        );
        self.add(
            "unwatchFile",
            tuple([path()]),
            None,
            true,
            MethodKind::Special(UnwatchFile),
        );
    }

    /// Register the non-blocking and blocking variants of one operation.
    fn pair(
        &mut self,
        name: &'static str,
        sync_name: &'static str,
        args: TypeDef,
        result: Option<TypeDef>,
    ) {
        self.add(name, args.clone(), result.clone(), false, MethodKind::Simple);
        self.add(sync_name, args, result, true, MethodKind::Simple);
    }

    fn add(
        &mut self,
        name: &'static str,
        args: TypeDef,
        result: Option<TypeDef>,
        sync: bool,
        kind: MethodKind,
    ) {
        assert!(
            !self.simple.contains_key(name) && !self.special.contains_key(name),
            "operation {name} registered twice"
        );
        let spec = MethodSpec {
            name,
            args,
            result,
            sync,
            kind,
        };
        match kind {
            MethodKind::Simple => self.simple.insert(name, spec),
            MethodKind::Special(_) => self.special.insert(name, spec),
        };
    }

    /// Look up an operation in either table.
    pub fn get(&self, name: &str) -> Option<&MethodSpec> {
        self.simple.get(name).or_else(|| self.special.get(name))
    }

    pub fn simple(&self, name: &str) -> Option<&MethodSpec> {
        self.simple.get(name)
    }

    pub fn special(&self, name: &str) -> Option<&MethodSpec> {
        self.special.get(name)
    }

    pub fn simple_methods(&self) -> impl Iterator<Item = &MethodSpec> {
        self.simple.values()
    }

    pub fn special_methods(&self) -> impl Iterator<Item = &MethodSpec> {
        self.special.values()
    }
}
