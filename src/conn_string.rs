//! Connection-string grammar (spec.md §6):
//!
//! ```text
//! conn-string := ( key "=" value WS* )+
//! value       := single-quoted-string | unquoted-run
//! unquoted-run:= (non-ws | "\" any)+
//! escape      := "\" char  (inside single-quoted or unquoted)
//! ```
//!
//! Recognised keys (case-insensitive): `host`, `user`, `password`, `port`
//! (decimal, default 3306), `dbname`, `client_encoding`. Unknown keys are
//! ignored, matching spec.md §6 — but unlike the original C++
//! `utils::parseConnString`, which drops malformed input silently, a
//! malformed pair is surfaced as a [`ConnStringError`] rather than dropped,
//! since silent data loss is not idiomatic here (SPEC_FULL.md §2.2).

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while1};
use nom::character::complete::{char, multispace0, none_of};
use nom::combinator::{eof, map};
use nom::multi::many1;
use nom::sequence::{delimited, terminated};
use nom::{IResult, Parser};

use crate::error::ConnStringError;

const DEFAULT_PORT: u16 = 3306;

/// Parsed, validated connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnParams {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: u16,
    pub dbname: Option<String>,
    pub client_encoding: Option<String>,
}

impl ConnParams {
    #[must_use]
    fn with_default_port() -> Self {
        ConnParams {
            port: DEFAULT_PORT,
            ..Default::default()
        }
    }
}

/// Parses a full connection string per spec.md §6.
///
/// # Errors
/// Returns [`ConnStringError`] with the byte offset of the first
/// unparseable `key=value` pair.
pub fn parse(input: &str) -> Result<ConnParams, ConnStringError> {
    let (_, pairs) = terminated(many1(key_value_pair), eof)
        .parse(input)
        .map_err(|_| ConnStringError {
            offset: find_failure_offset(input),
            reason: "expected one or more `key=value` pairs".to_string(),
        })?;

    let mut params = ConnParams::with_default_port();
    for (key, val) in pairs {
        match key.to_ascii_lowercase().as_str() {
            "host" => params.host = Some(val),
            "user" => params.user = Some(val),
            "password" => params.password = Some(val),
            "dbname" => params.dbname = Some(val),
            "client_encoding" => params.client_encoding = Some(val),
            "port" => {
                params.port = val.parse::<u16>().map_err(|_| ConnStringError {
                    offset: find_failure_offset(input),
                    reason: format!("port value {val:?} is not a valid u16"),
                })?;
            }
            _ => {} // unknown keys are ignored
        }
    }
    Ok(params)
}

/// Finds how much of `input` the happy-path grammar can consume, so a
/// failure can be reported with a useful byte offset instead of just
/// "parse failed".
fn find_failure_offset(input: &str) -> usize {
    let mut consumed = 0;
    let mut rest = input;
    while let Ok((tail, _)) = key_value_pair(rest) {
        consumed = input.len() - tail.len();
        rest = tail;
        if rest.is_empty() {
            break;
        }
    }
    consumed
}

fn key_value_pair(input: &str) -> IResult<&str, (String, String)> {
    let (input, key) = key(input)?;
    let (input, _) = char('=').parse(input)?;
    let (input, val) = value_(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (key.to_string(), val)))
}

fn key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(input)
}

fn value_(input: &str) -> IResult<&str, String> {
    alt((single_quoted_string, unquoted_run)).parse(input)
}

fn single_quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        alt((
            escaped_transform(none_of("'\\"), '\\', any_char_as_string),
            map(eof, |_: &str| String::new()),
        )),
        char('\''),
    )
    .parse(input)
}

fn unquoted_run(input: &str) -> IResult<&str, String> {
    escaped_transform(is_not(" \t\r\n\\"), '\\', any_char_as_string).parse(input)
}

fn any_char_as_string(input: &str) -> IResult<&str, &str> {
    nom::bytes::complete::take(1usize)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognised_keys() {
        let params = parse("host=localhost user=root password=secret dbname=app port=3307")
            .expect("valid conn string");
        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.user.as_deref(), Some("root"));
        assert_eq!(params.password.as_deref(), Some("secret"));
        assert_eq!(params.dbname.as_deref(), Some("app"));
        assert_eq!(params.port, 3307);
    }

    #[test]
    fn defaults_port_when_absent() {
        let params = parse("host=localhost user=root").expect("valid conn string");
        assert_eq!(params.port, DEFAULT_PORT);
    }

    #[test]
    fn ignores_unknown_keys() {
        let params = parse("host=localhost sslmode=require").expect("valid conn string");
        assert_eq!(params.host.as_deref(), Some("localhost"));
    }

    #[test]
    fn single_quoted_value_may_contain_spaces() {
        let params = parse("host=localhost password='hello world'").expect("valid conn string");
        assert_eq!(params.password.as_deref(), Some("hello world"));
    }

    #[test]
    fn unquoted_value_may_escape_a_space() {
        let params = parse(r"dbname=my\ app").expect("valid conn string");
        assert_eq!(params.dbname.as_deref(), Some("my app"));
    }

    #[test]
    fn rejects_non_numeric_port() {
        let err = parse("port=notanumber").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn rejects_missing_equals() {
        let err = parse("host localhost").unwrap_err();
        assert_eq!(err.offset, 0);
    }
}
