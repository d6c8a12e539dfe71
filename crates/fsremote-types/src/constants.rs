//! Filesystem constants shared by both ends.
//!
//! Numeric open flags and mode bits on the wire are interpreted against this
//! table, not against whatever values the executing host uses natively.

// File access
pub const F_OK: u32 = 0;
pub const R_OK: u32 = 4;
pub const W_OK: u32 = 2;
pub const X_OK: u32 = 1;

// Open flags
pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 1;
pub const O_RDWR: u32 = 2;
pub const O_NONBLOCK: u32 = 4;
pub const O_APPEND: u32 = 8;
pub const O_SYNC: u32 = 128;
pub const O_NOFOLLOW: u32 = 256;
pub const O_CREAT: u32 = 512;
pub const O_TRUNC: u32 = 1024;
pub const O_EXCL: u32 = 2048;
pub const O_NOCTTY: u32 = 131_072;
pub const O_DIRECTORY: u32 = 1_048_576;
pub const O_SYMLINK: u32 = 2_097_152;
pub const O_DSYNC: u32 = 4_194_304;

/// Mask selecting the access mode bits of an open flag word.
pub const O_ACCMODE: u32 = O_WRONLY | O_RDWR;

// File types
pub const S_IFMT: u32 = 61_440;
pub const S_IFREG: u32 = 32_768;
pub const S_IFDIR: u32 = 16_384;
pub const S_IFCHR: u32 = 8_192;
pub const S_IFBLK: u32 = 24_576;
pub const S_IFIFO: u32 = 4_096;
pub const S_IFLNK: u32 = 40_960;
pub const S_IFSOCK: u32 = 49_152;

// Permission bits
pub const S_IRWXU: u32 = 448;
pub const S_IRUSR: u32 = 256;
pub const S_IWUSR: u32 = 128;
pub const S_IXUSR: u32 = 64;
pub const S_IRWXG: u32 = 56;
pub const S_IRGRP: u32 = 32;
pub const S_IWGRP: u32 = 16;
pub const S_IXGRP: u32 = 8;
pub const S_IRWXO: u32 = 7;
pub const S_IROTH: u32 = 4;
pub const S_IWOTH: u32 = 2;
pub const S_IXOTH: u32 = 1;

// copyFile
pub const COPYFILE_EXCL: u32 = 1;
pub const UV_FS_COPYFILE_EXCL: u32 = 1;

/// Default permissions for new files.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Default permissions for new directories.
pub const DEFAULT_DIR_MODE: u32 = 0o777;
