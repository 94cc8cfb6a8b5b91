//! TypeScript-to-JavaScript stripping.
//!
//! A pipeline of regex passes and small brace-counting scans over the
//! source text. String and template literals are masked before any pass
//! runs and restored afterwards, so type-like text inside strings
//! survives verbatim. The pipeline is idempotent: stripping already-
//! stripped output is a no-op.

use regex::Regex;
use std::sync::LazyLock;
use tier0::{EngineError, ErrorKind};

/// Placeholder delimiter from the Unicode private-use area; cannot
/// collide with source text the passes would otherwise rewrite.
const MASK: char = '\u{E000}';

static IMPORT_TYPE_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+type\s[^;\n]*;?\s*$").expect("valid regex")
});
static EXPORT_TYPE_BRACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+type\s*\{[^}]*\}\s*(from\s*[^;\n]*)?;?\s*$")
        .expect("valid regex")
});
static IMPORT_BRACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"import\s*\{[^}]*\}").expect("valid regex"));
static INLINE_TYPE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btype\s+([A-Za-z_$][\w$]*)").expect("valid regex"));
static ACCESS_MODIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:public|private|protected|readonly)\s+([A-Za-z_$#\[])").expect("valid regex")
});
static FN_GENERICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\bfunction\s*[A-Za-z_$][\w$]*\s*|\bfunction\s*)<[^<>{}()]*(?:<[^<>]*>[^<>{}()]*)*>\s*\(")
        .expect("valid regex")
});
static CLASS_GENERICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\bclass\s+[A-Za-z_$][\w$]*\s*)<[^<>{}]*(?:<[^<>]*>[^<>{}]*)*>")
        .expect("valid regex")
});
static AS_ASSERTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+as\s+([A-Za-z_$][\w$.]*)((?:<[^<>]*>)?(?:\[\])*)").expect("valid regex")
});
static SATISFIES_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+satisfies\s+[A-Za-z_$][\w$.]*(?:<[^<>]*>)?(?:\[\])*").expect("valid regex")
});
static ANGLE_ASSERTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[A-Z][\w$]*(?:<[^<>]*>)?>\s*([A-Za-z_$(\d])").expect("valid regex")
});
static NON_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w$\)\]])!([^=]|$)").expect("valid regex"));
static TRIPLE_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static DOUBLE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

/// Strip TypeScript-only syntax from `source`, returning syntactically
/// valid JavaScript.
///
/// The stripper is a text transformation, not a type checker: it
/// removes interfaces, type aliases, type-only imports/exports,
/// annotations, generics, assertions, `declare` statements, access
/// modifiers, and non-null assertions, then collapses excess
/// whitespace. Unbalanced braces inside a declaration being removed
/// fail with `CompilationError`.
pub fn strip_types(source: &str) -> Result<String, EngineError> {
    let (masked, literals) = mask_literals(source);

    let mut text = masked;

    // Whole-statement removals first.
    text = IMPORT_TYPE_STMT.replace_all(&text, "").into_owned();
    text = EXPORT_TYPE_BRACES.replace_all(&text, "").into_owned();
    text = strip_declarations(&text, "interface")?;
    text = strip_type_aliases(&text)?;
    text = strip_declare_statements(&text)?;

    // Inline `type` specifiers inside value imports.
    text = IMPORT_BRACES
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            INLINE_TYPE_IMPORT.replace_all(&caps[0], "$1").into_owned()
        })
        .into_owned();

    // Signature-level syntax. Modifiers go first so parameter
    // properties (`constructor(public x: T)`) read as plain parameters
    // when the annotation pass runs. Chained modifiers need the pass
    // repeated to a fixpoint.
    loop {
        let next = ACCESS_MODIFIER.replace_all(&text, "$1").into_owned();
        if next == text {
            break;
        }
        text = next;
    }
    text = FN_GENERICS.replace_all(&text, "$1(").into_owned();
    text = CLASS_GENERICS.replace_all(&text, "$1").into_owned();
    text = strip_annotations(&text);
    text = AS_ASSERTION
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            if &caps[1] == "const" && caps[2].is_empty() {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned();
    text = SATISFIES_CLAUSE.replace_all(&text, "").into_owned();
    text = ANGLE_ASSERTION.replace_all(&text, "$1").into_owned();
    text = NON_NULL.replace_all(&text, "$1$2").into_owned();

    // Whitespace collapses run while literals are still masked so
    // string contents keep their spacing.
    text = TRIPLE_NEWLINE.replace_all(&text, "\n\n").into_owned();
    text = DOUBLE_SPACE.replace_all(&text, " ").into_owned();

    Ok(unmask_literals(&text, &literals))
}

/// Replace string/template literals with `\u{E000}{index}\u{E000}`
/// placeholders, returning the masked text and the literal table.
fn mask_literals(source: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(source.len());
    let mut literals = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' || c == '`' {
            let quote = c;
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let literal: String = chars[start..i.min(chars.len())].iter().collect();
            out.push(MASK);
            out.push_str(&literals.len().to_string());
            out.push(MASK);
            literals.push(literal);
        } else {
            out.push(c);
            i += 1;
        }
    }

    (out, literals)
}

fn unmask_literals(text: &str, literals: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(MASK) {
        out.push_str(&rest[..start]);
        let after = &rest[start + MASK.len_utf8()..];
        match after.find(MASK) {
            Some(end) => {
                if let Ok(index) = after[..end].parse::<usize>() {
                    if let Some(lit) = literals.get(index) {
                        out.push_str(lit);
                    }
                }
                rest = &after[end + MASK.len_utf8()..];
            }
            None => {
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Remove `interface Name {...}` (and `export interface`) declarations,
/// counting braces so nested object types come out with them.
fn strip_declarations(text: &str, keyword: &str) -> Result<String, EngineError> {
    let pattern = Regex::new(&format!(
        r"(?:export\s+)?\b{keyword}\s+[A-Za-z_$][\w$]*(?:<[^<>]*>)?(?:\s+extends\s+[^{{]+)?\s*\{{"
    ))
    .expect("valid regex");

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(m) = pattern.find(rest) {
        out.push_str(&rest[..m.start()]);
        let after_open = &rest[m.end()..];
        let close = matching_brace(after_open).ok_or_else(|| {
            EngineError::new(
                ErrorKind::CompilationError,
                format!("unbalanced braces in {keyword} declaration"),
            )
        })?;
        rest = after_open[close + 1..].trim_start_matches([';']);
    }
    out.push_str(rest);
    Ok(out)
}

/// Index of the `}` closing an already-open brace, given text starting
/// just after the `{`.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove `type Name = ...;` aliases, consuming the right-hand side
/// through nested braces/angles to the terminating `;` (or a newline
/// that does not continue a union/intersection) at depth zero.
fn strip_type_aliases(text: &str) -> Result<String, EngineError> {
    static ALIAS_HEAD: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:export\s+)?\btype\s+[A-Za-z_$][\w$]*(?:<[^<>=]*>)?\s*=")
            .expect("valid regex")
    });

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(m) = ALIAS_HEAD.find(rest) {
        out.push_str(&rest[..m.start()]);
        let tail = &rest[m.end()..];
        let mut depth = 0i64;
        let mut consumed = tail.len();
        for (i, c) in tail.char_indices() {
            match c {
                '{' | '<' | '(' | '[' => depth += 1,
                '}' | '>' | ')' | ']' => depth -= 1,
                ';' if depth <= 0 => {
                    consumed = i + 1;
                    break;
                }
                '\n' if depth <= 0 => {
                    let rhs_continues = tail[..i]
                        .trim_end()
                        .ends_with(['|', '&', '=', ',']);
                    let next_continues = tail[i..]
                        .trim_start()
                        .starts_with(['|', '&']);
                    if !rhs_continues && !next_continues {
                        consumed = i;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Remove `declare ...` statements (const/let/var/function to end of
/// statement; module/namespace/global with their blocks).
fn strip_declare_statements(text: &str) -> Result<String, EngineError> {
    static DECLARE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(?:export\s+)?declare\s").expect("valid regex")
    });

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(m) = DECLARE_HEAD.find(rest) {
        out.push_str(&rest[..m.start()]);
        let tail = &rest[m.start()..];
        // Consume to the statement end: either the first `;` before any
        // `{`, or the block closed by brace counting.
        let brace = tail.find('{');
        let semi = tail.find(';');
        let consumed = match (brace, semi) {
            (Some(b), Some(s)) if b < s => {
                let close = matching_brace(&tail[b + 1..]).ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::CompilationError,
                        "unbalanced braces in declare statement",
                    )
                })?;
                b + 1 + close + 1
            }
            (Some(b), None) => {
                let close = matching_brace(&tail[b + 1..]).ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::CompilationError,
                        "unbalanced braces in declare statement",
                    )
                })?;
                b + 1 + close + 1
            }
            (_, Some(s)) => s + 1,
            (None, None) => tail.len(),
        };
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Remove `: Type` annotations after parameter names, `let/const/var`
/// names, and closing parens (return types). Consumes balanced `<>`,
/// `{}`, `()`, `[]` and union/intersection operators; stops at `,` `)`
/// `;` `=` (including `=>`) or a newline at depth zero.
fn strip_annotations(text: &str) -> String {
    static ANNOTATION_SITE: LazyLock<Regex> = LazyLock::new(|| {
        // identifier (optionally `?`) or `)` followed by a colon.
        Regex::new(r"(?:[A-Za-z_$][\w$]*\s*\??|\))\s*:").expect("valid regex")
    });

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    'outer: while let Some(m) = ANNOTATION_SITE.find(rest) {
        let site = &rest[m.start()..m.end()];
        let before = &rest[..m.start()];

        // Only treat this as an annotation in a return position, a
        // parameter-start position, or a `let/const/var` declaration.
        // Object-literal keys and ternary branches fall through.
        let is_return = site.trim_start().starts_with(')');
        let head_ok = is_return || {
            out.push_str(before);
            let ok = annotation_context(&out);
            if !ok {
                out.push_str(&rest[m.start()..m.end()]);
            }
            ok
        };
        if !head_ok {
            rest = &rest[m.end()..];
            continue;
        }
        if is_return {
            out.push_str(before);
        }

        // The colon, the type, and any `?` optional marker go.
        out.push_str(
            site.trim_end_matches(':')
                .trim_end()
                .trim_end_matches('?')
                .trim_end(),
        );

        // Consume the type expression.
        let tail = &rest[m.end()..];
        let mut depth = 0i64;
        let mut prev_nonspace: Option<char> = None;
        for (i, c) in tail.char_indices() {
            match c {
                '<' | '(' | '[' => depth += 1,
                '>' | ']' => depth -= 1,
                '{' => {
                    // An object-type literal opens the type (or extends
                    // it after a union/intersection); any other brace is
                    // a following body, which ends the type.
                    let opens_type = depth > 0
                        || matches!(prev_nonspace, None | Some('|' | '&' | ',' | '<' | '('));
                    if opens_type {
                        depth += 1;
                    } else {
                        emit_terminator(&mut out, tail, i);
                        rest = &tail[i..];
                        continue 'outer;
                    }
                }
                '}' => depth -= 1,
                ')' => {
                    if depth == 0 {
                        rest = &tail[i..];
                        continue 'outer;
                    }
                    depth -= 1;
                }
                ',' | ';' if depth <= 0 => {
                    rest = &tail[i..];
                    continue 'outer;
                }
                '=' if depth <= 0 => {
                    // `=>` terminates a return type; `=` terminates an
                    // initializer annotation. Both end the type.
                    emit_terminator(&mut out, tail, i);
                    rest = &tail[i..];
                    continue 'outer;
                }
                '\n' if depth <= 0 => {
                    rest = &tail[i..];
                    continue 'outer;
                }
                _ => {}
            }
            if !c.is_whitespace() {
                prev_nonspace = Some(c);
            }
        }
        rest = "";
        break;
    }
    out.push_str(rest);
    out
}

/// Keep one space between the annotation site and a `{` body or `=`
/// initializer when the consumed type text had one.
fn emit_terminator(out: &mut String, tail: &str, i: usize) {
    if tail[..i].ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

/// Whether accumulated text ending just before a `name:` site reads
/// like a declaration or parameter-start context rather than an object
/// literal key or ternary branch.
fn annotation_context(full: &str) -> bool {
    static DECL_TAIL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b(?:let|const|var)\s+[A-Za-z_$][\w$]*\s*$").expect("valid regex")
    });

    let trimmed = full.trim_end();
    if DECL_TAIL.is_match(trimmed) {
        return true;
    }

    // Parameter start: the previous significant character is `(` or
    // `,`, and the nearest unclosed bracket is a paren.
    if !trimmed.ends_with(['(', ',']) {
        return false;
    }
    let mut paren = 0i64;
    let mut brace = 0i64;
    let mut bracket = 0i64;
    for c in trimmed.chars().rev() {
        match c {
            ')' => paren -= 1,
            '(' => {
                paren += 1;
                if paren > 0 {
                    return true;
                }
            }
            '}' => brace -= 1,
            '{' => {
                brace += 1;
                if brace > 0 {
                    return false;
                }
            }
            ']' => bracket -= 1,
            '[' => {
                bracket += 1;
                if bracket > 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    false
}
