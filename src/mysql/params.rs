//! Query-parameter rendering: `?` placeholders substituted in order into
//! the SQL text, since the nonblocking client offers no prepared-statement
//! path (`original_source/MySQLImpl/MySQLConnector.cpp::execSqlInLoop`,
//! spec.md §4.8 "Parameter binding").

use crate::mysql::sys;

/// Mirrors `cxk::type::FieldType` (`original_source/db/DbTypes.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Tiny,
    Short,
    Long,
    LongLong,
    Null,
    String,
    DefaultValue,
}

/// One positional parameter: its type tag plus the raw bytes the source
/// stores as `(const char*, length)` pairs.
#[derive(Debug, Clone)]
pub struct Param {
    pub ty: ParamType,
    pub bytes: Vec<u8>,
}

impl Param {
    #[must_use]
    pub fn tiny(v: i8) -> Self {
        Param {
            ty: ParamType::Tiny,
            bytes: vec![v as u8],
        }
    }

    #[must_use]
    pub fn short(v: i16) -> Self {
        Param {
            ty: ParamType::Short,
            bytes: v.to_ne_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn long(v: i32) -> Self {
        Param {
            ty: ParamType::Long,
            bytes: v.to_ne_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn long_long(v: i64) -> Self {
        Param {
            ty: ParamType::LongLong,
            bytes: v.to_ne_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn null() -> Self {
        Param {
            ty: ParamType::Null,
            bytes: Vec::new(),
        }
    }

    #[must_use]
    pub fn string(v: impl Into<Vec<u8>>) -> Self {
        Param {
            ty: ParamType::String,
            bytes: v.into(),
        }
    }

    #[must_use]
    pub fn default_value() -> Self {
        Param {
            ty: ParamType::DefaultValue,
            bytes: Vec::new(),
        }
    }
}

/// Substitutes each `?` in `sql` (in order) with the rendered form of the
/// matching `params` entry. String parameters are escaped through
/// `mysql_real_escape_string` and single-quoted.
///
/// Unlike the source's raw `int format[]` tags (an untyped FFI boundary
/// where an out-of-range value is a real runtime possibility, handled there
/// by aborting), [`ParamType`] is a closed, exhaustive Rust enum — an
/// "unrecognised parameter type" simply cannot occur here, so this renders
/// unconditionally rather than threading a `Result` for a case the type
/// system already rules out.
///
/// # Safety
/// `mysql` must be a valid, live `MYSQL*` — used only for
/// `mysql_real_escape_string`, which requires an open connection handle for
/// its character-set-aware escaping rules.
pub unsafe fn render_sql(sql: &str, params: &[Param], mysql: *mut sys::MYSQL) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 4);
    let mut segments = sql.split('?');
    let mut params = params.iter();
    if let Some(first) = segments.next() {
        out.push_str(first);
    }
    for segment in segments {
        match params.next() {
            Some(param) => {
                // SAFETY: forwarding the caller's invariant on `mysql`.
                unsafe { render_one(&mut out, param, mysql) };
            }
            // More `?` markers than params: leave the literal `?` in place
            // rather than silently dropping it.
            None => out.push('?'),
        }
        out.push_str(segment);
    }
    out
}

/// # Safety
/// Same contract as [`render_sql`]: `mysql` must be a valid, live `MYSQL*`.
unsafe fn render_one(out: &mut String, param: &Param, mysql: *mut sys::MYSQL) {
    match param.ty {
        ParamType::Tiny => {
            out.push_str(&(param.bytes[0] as i8).to_string());
        }
        ParamType::Short => {
            let v = i16::from_ne_bytes(param.bytes[..2].try_into().unwrap());
            out.push_str(&v.to_string());
        }
        ParamType::Long => {
            let v = i32::from_ne_bytes(param.bytes[..4].try_into().unwrap());
            out.push_str(&v.to_string());
        }
        ParamType::LongLong => {
            let v = i64::from_ne_bytes(param.bytes[..8].try_into().unwrap());
            out.push_str(&v.to_string());
        }
        ParamType::Null => out.push_str("NULL"),
        ParamType::DefaultValue => out.push_str("default"),
        ParamType::String => {
            out.push('\'');
            // SAFETY: caller guarantees `mysql` is a live connection handle;
            // the destination buffer is sized per `mysql_real_escape_string`'s
            // documented worst case of `2 * length + 1`.
            let escaped = unsafe { escape_string(mysql, &param.bytes) };
            out.push_str(&String::from_utf8_lossy(&escaped));
            out.push('\'');
        }
    }
}

unsafe fn escape_string(mysql: *mut sys::MYSQL, input: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; input.len() * 2 + 1];
    let len = unsafe {
        sys::mysql_real_escape_string(
            mysql,
            buf.as_mut_ptr().cast(),
            input.as_ptr().cast(),
            input.len() as std::os::raw::c_ulong,
        )
    };
    buf.truncate(len as usize);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_short_long_long_long_render_as_decimal() {
        let params = [Param::tiny(-5), Param::short(1000), Param::long(-70000)];
        // Escaping needs a live MYSQL*, so this test only exercises the
        // integer branches, which never dereference `mysql`.
        let rendered = unsafe { render_sql("? ? ?", &params, std::ptr::null_mut()) };
        assert_eq!(rendered, "-5 1000 -70000");
    }

    #[test]
    fn null_and_default_render_as_keywords() {
        let params = [Param::null(), Param::default_value()];
        let rendered = unsafe { render_sql("a=?, b=?", &params, std::ptr::null_mut()) };
        assert_eq!(rendered, "a=NULL, b=default");
    }

    #[test]
    fn no_placeholders_returns_sql_unchanged() {
        let rendered = unsafe { render_sql("select 1", &[], std::ptr::null_mut()) };
        assert_eq!(rendered, "select 1");
    }
}
