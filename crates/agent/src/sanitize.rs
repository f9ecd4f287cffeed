//! Blender code sanitizer and pre-flight validator.
//!
//! Model-authored code never reaches the host unchanged. The sanitizer is
//! a pure text rewriter and is idempotent; the validator reports issues
//! without modifying anything.
//!
//! Rewrites applied, in order:
//! - normalize line endings
//! - strip Markdown fences and a leading bare language tag
//! - drop preference/addon-enable lines
//! - replace the nonexistent `delete_all` operator with select-all + delete
//! - rewrite `loopcut_and_slide(...)` to `loopcut(number_cuts=N)`
//! - remove deprecated keyword arguments (`use_undo`, `use_global`,
//!   `constraint_axis`)
//! - prepend an EDIT mode switch when bmesh is used without one
//! - ensure the program begins with `import bpy`

use regex_lite::Regex;
use std::sync::LazyLock;

static DEPRECATED_KWARG: LazyLock<Regex> = LazyLock::new(|| {
    // Tuple values first so `constraint_axis=(True, False, False)` is
    // consumed whole.
    Regex::new(r#"(,\s*)?\b(use_undo|use_global|constraint_axis)\s*=\s*(\([^)]*\)|[A-Za-z0-9_.'"\[\]-]+)"#)
        .expect("deprecated-kwarg pattern")
});

static LOOPCUT_AND_SLIDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"loopcut_and_slide\s*\(([^)]*)\)").expect("loopcut pattern")
});

// Matches both kwarg (`number_cuts=3`) and operator-dict (`"number_cuts": 3`)
// spellings.
static NUMBER_CUTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"number_cuts["']?\s*[=:]\s*(\d+)"#).expect("number-cuts pattern")
});

/// Keyword arguments current Blender versions reject.
pub const DEPRECATED_KWARGS: &[&str] = &["use_undo", "use_global", "constraint_axis"];

/// Operators that do not exist and must not be dispatched.
pub const FORBIDDEN_OPERATORS: &[&str] = &["bpy.ops.object.delete_all"];

/// Rewrite model-authored code into a dispatchable program.
pub fn sanitize(code: &str) -> String {
    let code = code.replace("\r\n", "\n").replace('\r', "\n");
    let code = strip_fences(&code);
    let code = rewrite_lines(&code);
    let code = rewrite_loopcut(&code);
    let code = strip_deprecated_kwargs(&code);
    let code = ensure_edit_mode_for_bmesh(&code);
    ensure_bpy_import(&code)
}

fn strip_fences(code: &str) -> String {
    let mut lines: Vec<&str> = code
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();

    // A bare language tag sometimes survives outside the fence.
    if let Some(first) = lines.first() {
        let tag = first.trim().to_ascii_lowercase();
        if tag == "python" || tag == "py" {
            lines.remove(0);
        }
    }
    lines.join("\n")
}

fn rewrite_lines(code: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim_start();
        if trimmed.contains("bpy.context.preferences")
            || trimmed.contains("addon_utils.enable")
            || trimmed.contains("bpy.ops.preferences.addon_enable")
        {
            continue;
        }
        if trimmed.starts_with("bpy.ops.object.delete_all") {
            let indent = &line[..line.len() - trimmed.len()];
            out.push(format!("{indent}bpy.ops.object.select_all(action='SELECT')"));
            out.push(format!("{indent}bpy.ops.object.delete()"));
            continue;
        }
        out.push(line.to_string());
    }
    out.join("\n")
}

fn rewrite_loopcut(code: &str) -> String {
    LOOPCUT_AND_SLIDE
        .replace_all(code, |caps: &regex_lite::Captures<'_>| {
            let cuts = NUMBER_CUTS
                .captures(&caps[1])
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "1".to_string());
            format!("loopcut(number_cuts={cuts})")
        })
        .into_owned()
}

fn strip_deprecated_kwargs(code: &str) -> String {
    let stripped = DEPRECATED_KWARG.replace_all(code, "").into_owned();
    // Removing a first-position kwarg can leave an orphan comma.
    let mut cleaned = stripped;
    loop {
        let next = cleaned.replace("(, ", "(").replace("(,", "(");
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned.replace(", )", ")").replace(",)", ")")
}

fn ensure_edit_mode_for_bmesh(code: &str) -> String {
    let uses_bmesh = code.contains("bmesh.") || code.contains("import bmesh");
    if !uses_bmesh || code.contains("mode_set(mode='EDIT')") {
        return code.to_string();
    }

    // Insert the mode switch after the leading import block.
    let lines: Vec<&str> = code.lines().collect();
    let mut insert_at = 0;
    for (i, line) in lines.iter().enumerate() {
        let t = line.trim_start();
        if t.starts_with("import ") || t.starts_with("from ") || t.is_empty() {
            insert_at = i + 1;
        } else {
            break;
        }
    }

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    out.insert(insert_at, "bpy.ops.object.mode_set(mode='EDIT')".to_string());
    out.join("\n")
}

fn ensure_bpy_import(code: &str) -> String {
    let has_import = code
        .lines()
        .any(|line| line.trim_start().starts_with("import bpy"));
    if has_import {
        code.to_string()
    } else if code.trim().is_empty() {
        "import bpy".to_string()
    } else {
        format!("import bpy\n{code}")
    }
}

/// Pre-flight issues found in a (sanitized) program.
pub fn validate(code: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if !code
        .lines()
        .any(|line| line.trim_start().starts_with("import bpy"))
    {
        issues.push("program does not import bpy".to_string());
    }

    for op in FORBIDDEN_OPERATORS {
        if code.contains(op) {
            issues.push(format!("forbidden operator '{op}' is present"));
        }
    }

    for kwarg in DEPRECATED_KWARGS {
        if code.contains(&format!("{kwarg}=")) || code.contains(&format!("{kwarg} =")) {
            issues.push(format!("deprecated keyword argument '{kwarg}' remains"));
        }
    }

    if let Some(issue) = bracket_issue(code) {
        issues.push(issue);
    }

    issues
}

/// Check `()[]{}` balance, ignoring string literals and comments.
fn bracket_issue(code: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut chars = code.chars().peekable();
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '#' => {
                for c2 in chars.by_ref() {
                    if c2 == '\n' {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Some(format!("unbalanced '{c}'"));
                }
            }
            _ => {}
        }
    }

    stack
        .pop()
        .map(|open| format!("unclosed '{open}'"))
}
