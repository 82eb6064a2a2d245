//! Readable diagnostics for plugin failures.
//!
//! Lua errors arrive as one long string with the chunk name, line number and
//! a traceback mixed in. This module sorts them into a kind, pulls out the
//! location, and adds a hint a plugin author can act on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PluginErrorKind {
    /// The file does not parse.
    SyntaxError,
    /// `deck.register{...}` was called with a missing or mistyped field.
    InvalidRegistration,
    /// Calling nil (often a typo, or a function removed by the sandbox).
    NilCall,
    IndexError,
    TypeError,
    /// A `host.*` call was refused or failed remotely.
    HostError,
    Timeout,
    RuntimeError,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub message: String,
    /// `file.lua:line` when the error names one.
    pub location: Option<String>,
    pub hints: Vec<String>,
}

impl PluginError {
    /// One-line summary suitable for a log field.
    pub fn summary(&self) -> String {
        match &self.location {
            Some(location) => format!("{:?} at {}: {}", self.kind, location, self.message),
            None => format!("{:?}: {}", self.kind, self.message),
        }
    }

    /// Multi-line report for the CLI.
    pub fn format(&self) -> String {
        let mut output = format!("Plugin {:?}\n\nError: {}\n", self.kind, self.message);
        if let Some(location) = &self.location {
            output.push_str(&format!("At: {}\n", location));
        }
        if !self.hints.is_empty() {
            output.push_str("\nTroubleshooting:\n");
            for hint in &self.hints {
                output.push_str(&format!("  - {}\n", hint));
            }
        }
        output
    }
}

/// Parse an error from plugin loading or a plugin call.
pub fn parse_error(error: &anyhow::Error) -> PluginError {
    // {:#} keeps the whole context chain on one line
    let error_string = format!("{:#}", error);
    let kind = detect_error_kind(&error_string);
    let hints = generate_hints(&kind);

    PluginError {
        location: extract_location(&error_string),
        message: clean_error_message(&error_string),
        kind,
        hints,
    }
}

fn detect_error_kind(error_string: &str) -> PluginErrorKind {
    let lower = error_string.to_lowercase();

    if lower.contains("syntax error") || lower.contains("unexpected symbol") {
        PluginErrorKind::SyntaxError
    } else if lower.contains("invalid registration") {
        PluginErrorKind::InvalidRegistration
    } else if lower.contains("timed out") || lower.contains("timeout") {
        PluginErrorKind::Timeout
    } else if lower.contains("not allowed from a control")
        || lower.contains("not connected")
        || lower.contains(" failed (")
    {
        PluginErrorKind::HostError
    } else if lower.contains("attempt to call a nil value") {
        PluginErrorKind::NilCall
    } else if lower.contains("attempt to index") || lower.contains("bad argument") {
        PluginErrorKind::IndexError
    } else if lower.contains("attempt to") && lower.contains("a nil value") {
        PluginErrorKind::NilCall
    } else if lower.contains("expected") && lower.contains("got") {
        PluginErrorKind::TypeError
    } else if lower.contains("runtime error") {
        PluginErrorKind::RuntimeError
    } else {
        PluginErrorKind::Unknown
    }
}

/// Find the first `[string "name"]:N:` or `name.lua:N:` location.
fn extract_location(error_string: &str) -> Option<String> {
    for line in error_string.lines() {
        let line = line.trim();
        if line.contains("[C]") {
            continue;
        }

        if let Some(start) = line.find("[string \"") {
            let rest = &line[start + 9..];
            let end = rest.find("\"]")?;
            let chunk = &rest[..end];
            let after = &rest[end + 2..];
            let line_no = after
                .trim_start_matches(':')
                .split(':')
                .next()
                .and_then(|s| s.trim().parse::<u32>().ok());
            return Some(match line_no {
                Some(n) => format!("{}:{}", chunk, n),
                None => chunk.to_string(),
            });
        }

        if let Some(idx) = line.find(".lua:") {
            let start = line[..idx]
                .rfind(|c: char| c.is_whitespace() || c == '(')
                .map(|i| i + 1)
                .unwrap_or(0);
            let rest = &line[idx + 5..];
            if let Some(n) = rest.split(':').next().and_then(|s| s.parse::<u32>().ok()) {
                return Some(format!("{}.lua:{}", &line[start..idx], n));
            }
        }
    }
    None
}

fn generate_hints(kind: &PluginErrorKind) -> Vec<String> {
    let hints: &[&str] = match kind {
        PluginErrorKind::SyntaxError => &[
            "Check for missing 'end' statements",
            "Verify string quotes are properly closed",
        ],
        PluginErrorKind::InvalidRegistration => &[
            "deck.register needs a non-empty name plus can_handle and execute functions",
            "priority must be a number or a function returning one",
        ],
        PluginErrorKind::NilCall => &[
            "The function doesn't exist; check the spelling",
            "io, debug, dofile, require and os.execute are not available to plugins",
        ],
        PluginErrorKind::IndexError => &[
            "Check that the table exists before indexing it",
            "host.get_settings returns only the settings table",
        ],
        PluginErrorKind::TypeError => &["Use type() to inspect values passed in from the host"],
        PluginErrorKind::HostError => &[
            "Only the functions in the host table can reach the remote tool",
            "The remote rejected the request; check input names",
        ],
        PluginErrorKind::Timeout => &[
            "Plugin calls must finish within plugins.lua_timeout",
            "Check for infinite loops in can_handle or execute",
        ],
        PluginErrorKind::RuntimeError | PluginErrorKind::Unknown => {
            &["Check the location above for the failing line"]
        }
    };
    hints.iter().map(|s| s.to_string()).collect()
}

/// First meaningful line, without the chunk prefix.
fn clean_error_message(error_string: &str) -> String {
    let first = error_string
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && !line.starts_with("stack traceback") && !line.starts_with("...")
        })
        .unwrap_or(error_string);

    // Drop everything up to the last `]:N: ` or `.lua:N: ` prefix
    let mut message = first;
    for marker in ["\"]:", ".lua:"] {
        if let Some(idx) = message.rfind(marker) {
            let rest = &message[idx + marker.len()..];
            if let Some((line_no, tail)) = rest.split_once(": ") {
                if line_no.chars().all(|c| c.is_ascii_digit()) && !line_no.is_empty() {
                    message = tail;
                }
            }
        }
    }

    message.trim().to_string()
}
