//! Tokenizer and environment expansion for command lines.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Split a line into shell-style tokens.
///
/// - `"` toggles quoted mode and is not part of the token
/// - `""` inside quoted text is a literal `"`
/// - whitespace separates tokens only outside quotes
/// - an unterminated quote runs to the end of the input
///
/// Never fails; empty or blank input gives no tokens.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if c.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Quote a token so that [`split_args`] reads it back unchanged.
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\"\""))
}

// Pre-compiled patterns for environment references
static RE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_()]*)%").expect("static pattern"));

#[cfg(unix)]
static RE_DOLLAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern")
});

/// Expand environment references in a path-like argument.
///
/// Surrounding quotes are stripped first. `%NAME%` is expanded on every
/// platform, `$NAME` and `${NAME}` on Unix as well. Unknown names are left
/// as written.
pub fn expand_env(raw: &str) -> String {
    expand_with(raw, |name| std::env::var(name).ok())
}

/// [`expand_env`] with an explicit variable lookup.
pub fn expand_with<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let trimmed = raw.trim_matches('"');

    let expanded = RE_PERCENT.replace_all(trimmed, |caps: &Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });

    #[cfg(unix)]
    let expanded = RE_DOLLAR
        .replace_all(&expanded, |caps: &Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    expanded.to_string()
}
