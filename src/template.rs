//! Template expansion for config values.
//!
//! Config files use Go-template syntax (`{{ .DIRVANA_DIR }}`,
//! `{{ if .VAR }}...{{ end }}`, `{{ upper .X }}`, `{{ .X | trunc 8 }}`),
//! which existing configs rely on. Rather than interpreting that syntax
//! directly, the action subset is translated to minijinja source and rendered
//! with a fixed function library. Any translation, parse, or render failure
//! returns the input verbatim -- expansion never aborts config resolution.

use minijinja::Environment;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Render context for one config entry. `DIRVANA_DIR` is the directory of the
/// config file that contributed the entry, not the merged working directory.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub dirvana_dir: PathBuf,
    pub user_working_dir: PathBuf,
}

/// Expand one string. On any failure the input comes back unchanged.
pub fn expand(input: &str, ctx: &TemplateContext) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }

    let Some(translated) = translate(input) else {
        tracing::debug!(template = input, "template uses unsupported syntax; keeping verbatim");
        return input.to_string();
    };

    let env = environment();
    match env.render_str(
        &translated,
        minijinja::context! {
            DIRVANA_DIR => ctx.dirvana_dir.to_string_lossy(),
            USER_WORKING_DIR => ctx.user_working_dir.to_string_lossy(),
        },
    ) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::debug!(template = input, error = %e, "template render failed; keeping verbatim");
            input.to_string()
        }
    }
}

/// The shared environment with the function library registered. Built once;
/// `render_str` compiles per call, which is fine for the handful of strings
/// in a merged config.
fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();

        macro_rules! register {
            ($name:literal, $f:expr) => {
                env.add_function($name, $f);
                env.add_filter($name, $f);
            };
        }

        register!("base", |s: String| {
            Path::new(&s)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(s)
        });
        register!("dir", |s: String| {
            let parent = Path::new(&s).parent();
            match parent {
                Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
                _ => ".".to_string(),
            }
        });
        register!("clean", |s: String| clean_path(&s));
        register!("ext", |s: String| {
            Path::new(&s)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default()
        });
        register!("upper", |s: String| s.to_uppercase());
        register!("lower", |s: String| s.to_lowercase());
        register!("replace", |s: String, from: String, to: String| {
            s.replace(&from, &to)
        });
        register!("trunc", |s: String, n: i64| {
            let n = usize::try_from(n).unwrap_or(0);
            s.chars().take(n).collect::<String>()
        });
        register!("sha256sum", |s: String| {
            let mut hasher = Sha256::new();
            hasher.update(s.as_bytes());
            format!("{:x}", hasher.finalize())
        });

        env
    })
}

/// Lexically clean a path: collapse `.`, resolve `..` against prior
/// components, drop duplicate separators. Mirrors Go's `filepath.Clean`.
/// Also used by the auth store to normalize directory keys.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in Path::new(path).components() {
        match component {
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            Component::Normal(p) => parts.push(p.to_str().unwrap_or_default()),
            Component::Prefix(_) => {}
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Translate the Go-template action subset to minijinja source. Returns
/// `None` when the input uses constructs outside the supported subset
/// (`range`, `with`, variables, parenthesized pipelines, ...).
fn translate(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut depth = 0usize;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}")?;
        let action = after[..end].trim_matches('-').trim();
        rest = &after[end + 2..];

        if let Some(cond) = action.strip_prefix("if ") {
            out.push_str("{% if ");
            out.push_str(&translate_expr(cond)?);
            out.push_str(" %}");
            depth += 1;
        } else if let Some(cond) = action.strip_prefix("else if ") {
            if depth == 0 {
                return None;
            }
            out.push_str("{% elif ");
            out.push_str(&translate_expr(cond)?);
            out.push_str(" %}");
        } else if action == "else" {
            if depth == 0 {
                return None;
            }
            out.push_str("{% else %}");
        } else if action == "end" {
            if depth == 0 {
                return None;
            }
            out.push_str("{% endif %}");
            depth -= 1;
        } else {
            out.push_str("{{ ");
            out.push_str(&translate_expr(action)?);
            out.push_str(" }}");
        }
    }

    if depth != 0 {
        return None;
    }

    out.push_str(rest);
    Some(out)
}

/// Translate one pipeline expression: `upper .X`, `.X | trunc 8`, `.Y`.
fn translate_expr(expr: &str) -> Option<String> {
    let segments = split_pipeline(expr)?;
    let mut iter = segments.into_iter();
    let first = iter.next()?;

    let mut out = translate_segment(&first, true)?;
    for segment in iter {
        out.push_str(" | ");
        out.push_str(&translate_segment(&segment, false)?);
    }
    Some(out)
}

/// One pipeline segment. The head segment renders as an operand or a function
/// call; later segments render as filters.
fn translate_segment(tokens: &[GoToken], head: bool) -> Option<String> {
    match tokens {
        [] => None,
        [single] => {
            if head {
                translate_operand(single)
            } else {
                // A lone filter name: `.X | upper`
                match single {
                    GoToken::Ident(name) => Some(name.clone()),
                    _ => None,
                }
            }
        }
        [GoToken::Ident(name), args @ ..] => {
            let args = args
                .iter()
                .map(translate_operand)
                .collect::<Option<Vec<_>>>()?;
            Some(format!("{name}({})", args.join(", ")))
        }
        _ => None,
    }
}

fn translate_operand(token: &GoToken) -> Option<String> {
    match token {
        GoToken::Field(path) => Some(path.clone()),
        GoToken::Str(s) => Some(format!("{s:?}")),
        GoToken::Number(n) => Some(n.clone()),
        GoToken::Ident(name) if *name == "true" || *name == "false" => Some(name.clone()),
        GoToken::Ident(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum GoToken {
    /// `.Foo` or `.Foo.Bar`, with the leading dot stripped.
    Field(String),
    /// Double- or back-quoted string literal (unquoted contents).
    Str(String),
    Number(String),
    Ident(String),
}

/// Tokenize an action and split it on top-level `|`.
fn split_pipeline(expr: &str) -> Option<Vec<Vec<GoToken>>> {
    let mut segments = vec![Vec::new()];
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '|' => segments.push(Vec::new()),
            '"' | '`' => {
                let mut s = String::new();
                loop {
                    match chars.next()? {
                        ch if ch == c => break,
                        '\\' if c == '"' => {
                            let escaped = chars.next()?;
                            match escaped {
                                'n' => s.push('\n'),
                                't' => s.push('\t'),
                                other => s.push(other),
                            }
                        }
                        ch => s.push(ch),
                    }
                }
                segments.last_mut()?.push(GoToken::Str(s));
            }
            '.' => {
                let mut path = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                        path.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if path.is_empty() {
                    // A bare `.` (the root context) has no minijinja analog here.
                    return None;
                }
                segments.last_mut()?.push(GoToken::Field(path));
            }
            '0'..='9' | '-' => {
                let mut n = String::from(c);
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        n.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                segments.last_mut()?.push(GoToken::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                segments.last_mut()?.push(GoToken::Ident(name));
            }
            // `$vars`, parens, and anything else are outside the subset.
            _ => return None,
        }
    }

    Some(segments)
}
