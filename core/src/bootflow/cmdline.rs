//! Kernel command-line editing
//!
//! Arguments are separated by spaces. A value containing spaces is wrapped
//! in double quotes; quotes are never allowed inside a value. Editing
//! normalises whitespace to single spaces between arguments.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{BootError, Result};

/// What to do with an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgValue<'a> {
    /// Remove the argument if present
    Delete,
    /// Bare argument with no `=` (e.g. `rootwait`)
    Empty,
    /// `arg=value`; an empty value gives `arg=`
    Set(&'a str),
}

/// Byte ranges of each argument, respecting quotes
fn tokens(line: &str) -> Vec<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
        if pos == bytes.len() {
            break;
        }
        let start = pos;
        let mut quoted = false;
        while pos < bytes.len() && (quoted || bytes[pos] != b' ') {
            if bytes[pos] == b'"' {
                quoted = !quoted;
            }
            pos += 1;
        }
        out.push((start, pos));
    }

    out
}

/// Name part of an argument: everything before the first '='
fn arg_name(token: &str) -> &str {
    match token.find('=') {
        Some(eq) => &token[..eq],
        None => token,
    }
}

fn check_arg_name(arg: &str) -> Result<()> {
    if arg.is_empty() || arg.contains(|c: char| c == '=' || c == ' ' || c == '"') {
        return Err(BootError::Invalid);
    }
    Ok(())
}

fn push_arg(out: &mut String, arg: &str, value: ArgValue<'_>) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(arg);
    match value {
        ArgValue::Delete | ArgValue::Empty => {}
        ArgValue::Set(val) if val.contains(' ') => {
            out.push_str("=\"");
            out.push_str(val);
            out.push('"');
        }
        ArgValue::Set(val) => {
            out.push('=');
            out.push_str(val);
        }
    }
}

/// Produce a copy of `from` with `arg` updated.
///
/// `limit`, if given, is the size of the destination buffer the result has
/// to fit in, counting a terminating NUL.
///
/// # Errors
///
/// - `NotFound`: deleting from an empty command line
/// - `BadFile`: the value contains a double quote
/// - `TooBig`: the result does not fit in `limit`
/// - `Invalid`: `arg` is empty or contains `=`, space or quote
pub fn set_arg(from: &str, arg: &str, value: ArgValue<'_>, limit: Option<usize>) -> Result<String> {
    check_arg_name(arg)?;
    if let ArgValue::Set(val) = value {
        if val.contains('"') {
            return Err(BootError::BadFile);
        }
    }

    let toks = tokens(from);
    if toks.is_empty() && value == ArgValue::Delete {
        return Err(BootError::NotFound);
    }

    let mut out = String::with_capacity(from.len() + arg.len() + 4);
    let mut done = false;

    for &(start, end) in &toks {
        let token = &from[start..end];
        if arg_name(token) == arg {
            if !done && value != ArgValue::Delete {
                push_arg(&mut out, arg, value);
            }
            done = true;
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }

    if !done && value != ArgValue::Delete {
        push_arg(&mut out, arg, value);
    }

    if let Some(limit) = limit {
        if out.len() + 1 > limit {
            return Err(BootError::TooBig);
        }
    }

    Ok(out)
}

/// Find the value of `arg` in `line`.
///
/// Returns `(position, length)` of the value, excluding any quotes. A bare
/// argument reports length 0 at the position just after its name.
pub fn get_arg(line: &str, arg: &str) -> Result<(usize, usize)> {
    for (start, end) in tokens(line) {
        let token = &line[start..end];
        let name = arg_name(token);
        if name != arg {
            continue;
        }

        let after = start + name.len();
        if after == end {
            return Ok((after, 0));
        }

        // Skip the '='
        let mut vstart = after + 1;
        let mut vend = end;
        let bytes = line.as_bytes();
        if vend > vstart && bytes[vstart] == b'"' {
            vstart += 1;
            if vend > vstart && bytes[vend - 1] == b'"' {
                vend -= 1;
            }
        }
        return Ok((vstart, vend - vstart));
    }

    Err(BootError::NotFound)
}
