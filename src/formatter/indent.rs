//! Whitespace-only re-indentation of JSON text.
//!
//! Tokens are copied byte for byte; only the whitespace between them changes.
//! Numbers, string escapes and duplicate keys come out exactly as they went
//! in. Empty objects and arrays stay on one line (`{}`, `[]`).

use serde::de::IgnoredAny;

/// Checks that `input` is one complete JSON value, then re-indents it with
/// `indent` per nesting level.
pub fn indent_json(input: &[u8], indent: &str) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::from_slice::<IgnoredAny>(input)?;
    Ok(reindent(input, indent))
}

/// Assumes `input` is valid JSON.
fn reindent(input: &[u8], indent: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 2);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    // An opening bracket was written; the newline waits until we know the
    // container is not empty.
    let mut pending_open = false;

    for &byte in input {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        if matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
            continue;
        }

        if pending_open {
            pending_open = false;
            if byte == b'}' || byte == b']' {
                out.push(byte);
                continue;
            }
            depth += 1;
            newline(&mut out, indent, depth);
        }

        match byte {
            b'"' => {
                in_string = true;
                out.push(byte);
            }
            b'{' | b'[' => {
                out.push(byte);
                pending_open = true;
            }
            b',' => {
                out.push(byte);
                newline(&mut out, indent, depth);
            }
            b':' => {
                out.push(byte);
                out.push(b' ');
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                newline(&mut out, indent, depth);
                out.push(byte);
            }
            _ => out.push(byte),
        }
    }

    out
}

fn newline(out: &mut Vec<u8>, indent: &str, depth: usize) {
    out.push(b'\n');
    for _ in 0..depth {
        out.extend_from_slice(indent.as_bytes());
    }
}
