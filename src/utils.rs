//! Utility functions for filename derivation and link building

use crate::types::JobId;

/// Upper bound on the sanitized part of a stored filename
const MAX_SANITIZED_LEN: usize = 200;

/// Name used when nothing survives sanitization
const FALLBACK_NAME: &str = "download";

/// Sanitize a client-supplied filename hint
///
/// Runs of whitespace become a single `_`, then every character outside
/// `[A-Za-z0-9._-]` is dropped. The result never contains a path separator.
///
/// # Examples
///
/// ```
/// use relay_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("a file.bin"), "a_file.bin");
/// assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
/// assert_eq!(sanitize_filename("résumé (final).pdf"), "rsum_final.pdf");
/// ```
pub fn sanitize_filename(hint: &str) -> String {
    let mut out = String::with_capacity(hint.len());
    let mut in_whitespace = false;

    for c in hint.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        }
    }

    out.truncate(MAX_SANITIZED_LEN);
    if out.is_empty() || out.chars().all(|c| c == '.') {
        return FALLBACK_NAME.to_string();
    }
    out
}

/// Stored filename for a job: `<8-hex id prefix>-<sanitized hint>`
///
/// The prefix keeps two jobs with the same hint from sharing a path.
pub fn unique_filename(id: &JobId, hint: &str) -> String {
    format!("{}-{}", id.short_prefix(), sanitize_filename(hint))
}

/// Join a base URL and an absolute path without doubling slashes
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Escape text for inclusion in an HTML page
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
