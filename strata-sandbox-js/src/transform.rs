//! Module-to-script transformation for handler binding.
//!
//! The evaluator runs scripts, not modules, so `export default` forms
//! are rewritten into an assignment to the local `__handler__` handle
//! and other `export` keywords are dropped.

use regex::Regex;
use std::sync::LazyLock;

static EXPORT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+(const|let|var|function|class|async)\b").expect("valid regex")
});

/// Rewrite ES-module export syntax into script-scope bindings:
/// `export default <X>` becomes `__handler__ = <X>` and plain `export`
/// modifiers are removed.
pub fn bind_handler(code: &str) -> String {
    let rewritten = match code.find("export default") {
        Some(at) => {
            let mut out = String::with_capacity(code.len() + 16);
            out.push_str(&code[..at]);
            out.push_str("__handler__ =");
            out.push_str(&code[at + "export default".len()..]);
            out
        }
        None => code.to_string(),
    };
    EXPORT_KEYWORD.replace_all(&rewritten, "$1").into_owned()
}
