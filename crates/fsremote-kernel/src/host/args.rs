//! Extracting typed arguments from validated argument lists.
//!
//! Arguments have already passed their schema, so these helpers only have
//! to pick between the overloads the schema allows.

use fsremote_types::Value;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::encoding::Encoding;
use super::error::{HostError, HostResult};

static UNDEFINED: Value = Value::Undefined;

/// Largest integer a number argument holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Positional argument, `Undefined` when omitted.
pub fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&UNDEFINED)
}

/// A path given as a string, a buffer of bytes, or a `file:` URL.
pub fn path(value: &Value) -> HostResult<PathBuf> {
    match value {
        Value::String(s) => Ok(PathBuf::from(s)),
        Value::Buffer(bytes) => Ok(PathBuf::from(OsStr::from_bytes(bytes))),
        Value::Url(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| HostError::invalid(format!("file URL must be absolute: {url}"))),
        Value::Url(url) => Err(HostError::invalid(format!("the URL must be of scheme file: {url}"))),
        other => Err(HostError::invalid(format!("path must be a string, Buffer or URL: {other}"))),
    }
}

/// A path for error messages.
pub fn display_path(value: &Value) -> String {
    match path(value) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => value.to_string(),
    }
}

/// A required integer.
pub fn int(value: &Value, what: &str) -> HostResult<i64> {
    checked_int(value, what)?
        .ok_or_else(|| HostError::invalid(format!("{what} must be an integer, got {value}")))
}

/// An optional integer; `undefined` and `null` are absent.
///
/// Lenient: anything else that is not an exact integer is absent too. Use
/// [`checked_int`] where a wrong value must not fall back to a default.
pub fn opt_int(value: &Value) -> Option<i64> {
    value.as_i64().filter(|n| n.unsigned_abs() as f64 <= MAX_SAFE_INTEGER)
}

/// An optional integer that must be exact when present.
pub fn checked_int(value: &Value, what: &str) -> HostResult<Option<i64>> {
    match value {
        Value::Undefined | Value::Null => Ok(None),
        Value::Number(n) if n.abs() > MAX_SAFE_INTEGER => {
            Err(HostError::invalid(format!("{what} out of range: {value}")))
        }
        _ => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| HostError::invalid(format!("{what} must be an integer, got {value}"))),
    }
}

/// A file offset. Negative, null and absent mean "current position".
pub fn position(value: &Value) -> HostResult<Option<u64>> {
    Ok(checked_int(value, "position")?.and_then(|p| u64::try_from(p).ok()))
}

/// Owner id where `-1` leaves the current owner untouched.
pub fn owner(value: &Value, what: &str) -> HostResult<Option<u32>> {
    match int(value, what)? {
        -1 => Ok(None),
        id => u32::try_from(id)
            .map(Some)
            .map_err(|_| HostError::invalid(format!("{what} out of range: {id}"))),
    }
}

/// Permission bits as an integer or an octal string.
pub fn mode(value: &Value, default: u32) -> HostResult<u32> {
    match value {
        Value::Undefined | Value::Null => Ok(default),
        Value::String(s) => u32::from_str_radix(s, 8)
            .map_err(|_| HostError::invalid(format!("mode must be an octal string, got {s:?}"))),
        other => int(other, "mode").and_then(|m| {
            u32::try_from(m).map_err(|_| HostError::invalid(format!("mode out of range: {m}")))
        }),
    }
}

/// A timestamp given as seconds, a numeric string, or a date.
pub fn time(value: &Value) -> HostResult<SystemTime> {
    let seconds = match value {
        Value::Number(n) => *n,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| HostError::invalid(format!("invalid time {s:?}")))?,
        Value::Date(ms) => *ms as f64 / 1000.0,
        other => return Err(HostError::invalid(format!("invalid time {other}"))),
    };
    if !seconds.is_finite() {
        return Err(HostError::invalid(format!("invalid time {seconds}")));
    }
    let out_of_range = || HostError::invalid(format!("time out of range: {seconds}"));
    let offset = Duration::try_from_secs_f64(seconds.abs()).map_err(|_| out_of_range())?;
    let moved = if seconds >= 0.0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    moved.ok_or_else(out_of_range)
}

/// The encoding named by an options argument, if any.
///
/// Options may be a bare encoding name or an object with an `encoding`
/// field; `null` and absence both mean no explicit encoding.
pub fn encoding(options: &Value) -> HostResult<Option<Encoding>> {
    let name = match options {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => options.field("encoding").as_str(),
        _ => None,
    };
    name.map(Encoding::parse).transpose()
}

/// A string field of an options object.
pub fn option_str<'a>(options: &'a Value, key: &str) -> Option<&'a str> {
    options.field(key).as_str()
}

/// A boolean field of an options object.
pub fn option_bool(options: &Value, key: &str) -> Option<bool> {
    options.field(key).as_bool()
}

/// Bytes to write: strings go through `encoding`, binary values are taken as is.
pub fn data(value: &Value, encoding: Encoding) -> HostResult<Vec<u8>> {
    match value {
        Value::String(s) => encoding.encode(s),
        other => other
            .as_bytes()
            .ok_or_else(|| HostError::invalid(format!("data must be a string or buffer, got {other}"))),
    }
}

/// A name from the host as a string or buffer result.
pub fn name_value(bytes: &[u8], encoding: Encoding) -> Value {
    match encoding {
        Encoding::Buffer => Value::Buffer(bytes.to_vec()),
        other => Value::String(other.decode(bytes)),
    }
}
