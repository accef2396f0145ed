//! Glob patterns for rule argument matching.
//!
//! Patterns are compiled once into an anchored `regex::Regex`:
//!
//! | glob     | meaning                                   |
//! |----------|-------------------------------------------|
//! | `*`      | any run of characters except `/`          |
//! | `**`     | any run of characters, `/` included       |
//! | `**/`    | zero or more whole path segments          |
//! | `?`      | exactly one character other than `/`      |
//! | `[abc]`  | character class, `[!abc]` negates         |
//! | `{a,b}`  | alternation                               |
//! | `\x`     | literal `x`                               |
//!
//! A candidate ending in `/` also matches when its trimmed form does, so
//! `rm -rf *` matches the command `rm -rf /`.

use regex::Regex;

use vigil_contracts::error::{VigilError, VigilResult};

/// A compiled glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile `pattern`.
    ///
    /// Returns `VigilError::SchemaValidation` for unbalanced braces or a
    /// pattern the regex engine rejects.
    pub fn new(pattern: &str) -> VigilResult<Self> {
        let translated = translate(pattern)?;
        let regex = Regex::new(&translated).map_err(|e| VigilError::SchemaValidation {
            reason: format!("invalid glob pattern '{pattern}': {e}"),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, candidate: &str) -> bool {
        if self.regex.is_match(candidate) {
            return true;
        }
        let trimmed = candidate.trim_end_matches('/');
        trimmed.len() != candidate.len() && !trimmed.is_empty() && self.regex.is_match(trimmed)
    }
}

fn translate(pattern: &str) -> VigilResult<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut brace_depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                if chars.get(i) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 1;
                } else {
                    out.push_str(".*");
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    push_class(&mut out, &chars[i + 1..end]);
                    i = end + 1;
                    continue;
                }
                None => out.push_str(r"\["),
            },
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    out.push_str(&regex::escape(&next.to_string()));
                    i += 2;
                    continue;
                }
                out.push_str(r"\\");
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    if brace_depth > 0 {
        return Err(VigilError::SchemaValidation {
            reason: format!("invalid glob pattern '{pattern}': unbalanced '{{'"),
        });
    }

    out.push('$');
    Ok(out)
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    // A `]` right after the opener is a literal member.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn push_class(out: &mut String, body: &[char]) {
    out.push('[');
    let mut rest = body;
    if let Some((first, tail)) = rest.split_first() {
        if *first == '!' || *first == '^' {
            out.push('^');
            rest = tail;
        }
    }
    for c in rest {
        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
            out.push('\\');
        }
        out.push(*c);
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::GlobPattern;

    fn glob(p: &str) -> GlobPattern {
        GlobPattern::new(p).unwrap()
    }

    #[test]
    fn star_stays_inside_one_segment() {
        let g = glob("*.md");
        assert!(g.matches("README.md"));
        assert!(!g.matches("docs/README.md"));
        assert!(!g.matches("index.ts"));
    }

    #[test]
    fn globstar_spans_zero_or_more_segments() {
        let g = glob("src/**/*.ts");
        assert!(g.matches("src/index.ts"));
        assert!(g.matches("src/util/helper.ts"));
        assert!(!g.matches("test/foo.ts"));
    }

    #[test]
    fn trailing_slash_candidate_matches_trimmed_form() {
        let g = glob("rm -rf *");
        assert!(g.matches("rm -rf /"));
        assert!(g.matches("rm -rf build"));
        assert!(!g.matches("ls -la"));
    }

    #[test]
    fn question_mark_class_and_braces() {
        assert!(glob("file?.txt").matches("file1.txt"));
        assert!(!glob("file?.txt").matches("file10.txt"));
        assert!(glob("[ab].rs").matches("a.rs"));
        assert!(!glob("[!ab].rs").matches("a.rs"));
        assert!(glob("*.{md,txt}").matches("notes.txt"));
        assert!(!glob("*.{md,txt}").matches("notes.rs"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let g = glob("a+b (1).txt");
        assert!(g.matches("a+b (1).txt"));
        assert!(!g.matches("aab (1).txt"));
    }

    #[test]
    fn unbalanced_brace_is_rejected() {
        assert!(GlobPattern::new("*.{md,txt").is_err());
    }
}
