//! Lexical helpers for AutoLISP source.

use once_cell::sync::Lazy;
use regex::Regex;

static ENTRY_POINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*defun\s+c:([^\s()]+)").expect("valid regex"));

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:auto)?lisp\b").expect("valid regex"));

/// Name of the command defined by `(defun c:NAME ...)`.
///
/// Returns the first such name, or an empty string when the code defines
/// no command.
///
/// ```
/// use lisp_assistant::tools::extract_entry_point;
///
/// assert_eq!(extract_entry_point("(defun c:DrawCircle () (princ))"), "DrawCircle");
/// assert_eq!(extract_entry_point("(command \"_circle\" '(0 0) 10)"), "");
/// ```
pub fn extract_entry_point(code: &str) -> String {
    ENTRY_POINT_RE
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Whether `text` contains a fenced lisp code block.
pub fn contains_code_block(text: &str) -> bool {
    CODE_BLOCK_RE.is_match(text)
}
