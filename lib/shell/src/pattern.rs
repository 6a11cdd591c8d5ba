//! Shell pattern matching (`*`, `?`, `[…]`) and pathname expansion.
//!
//! One matcher serves globs, `case` arms, `[[ == ]]` and the `${VAR#pat}`
//! family. The `glob` crate only walks the real filesystem, so matching
//! is done here and pathname expansion walks the VFS.

use wasmbox_vfs::Vfs;

/// Matches `text` against a shell pattern. A backslash escapes the next
/// pattern character.
pub fn fnmatch(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    match_at(&pat, 0, &txt, 0)
}

fn match_at(pat: &[char], mut p: usize, txt: &[char], mut t: usize) -> bool {
    while p < pat.len() {
        match pat[p] {
            '*' => {
                // Collapse runs of stars, then try every split point.
                while p + 1 < pat.len() && pat[p + 1] == '*' {
                    p += 1;
                }
                if p + 1 == pat.len() {
                    return true;
                }
                for skip in t..=txt.len() {
                    if match_at(pat, p + 1, txt, skip) {
                        return true;
                    }
                }
                return false;
            }
            '?' => {
                if t >= txt.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            '[' => {
                let (matched, next_p) = match_class(pat, p, txt.get(t).copied());
                match matched {
                    Some(true) => {
                        t += 1;
                        p = next_p;
                    }
                    Some(false) => return false,
                    // Unterminated class: literal `[`.
                    None => {
                        if txt.get(t) != Some(&'[') {
                            return false;
                        }
                        t += 1;
                        p += 1;
                    }
                }
            }
            '\\' if p + 1 < pat.len() => {
                if txt.get(t) != Some(&pat[p + 1]) {
                    return false;
                }
                t += 1;
                p += 2;
            }
            c => {
                if txt.get(t) != Some(&c) {
                    return false;
                }
                t += 1;
                p += 1;
            }
        }
    }
    t == txt.len()
}

/// Matches a `[…]` class starting at `p`. Returns `(Some(matched),
/// position after the class)` or `(None, _)` when the class never closes.
fn match_class(pat: &[char], p: usize, candidate: Option<char>) -> (Option<bool>, usize) {
    let mut idx = p + 1;
    let negated = matches!(pat.get(idx), Some('!') | Some('^'));
    if negated {
        idx += 1;
    }
    let start = idx;
    let mut close = None;
    while idx < pat.len() {
        if pat[idx] == ']' && idx > start {
            close = Some(idx);
            break;
        }
        idx += 1;
    }
    let Some(close) = close else {
        return (None, p);
    };
    let Some(c) = candidate else {
        return (Some(false), close + 1);
    };
    let mut matched = false;
    let mut scan = start;
    while scan < close {
        if scan + 2 < close && pat[scan + 1] == '-' {
            if pat[scan] <= c && c <= pat[scan + 2] {
                matched = true;
            }
            scan += 3;
        } else {
            if pat[scan] == c {
                matched = true;
            }
            scan += 1;
        }
    }
    (Some(matched ^ negated), close + 1)
}

/// True when the string contains unescaped glob metacharacters.
pub fn has_glob_chars(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        match chars[idx] {
            '\\' => idx += 2,
            '*' | '?' | '[' => return true,
            _ => idx += 1,
        }
    }
    false
}

/// Pathname expansion: matches `pattern` (absolute, or relative to
/// `cwd`) against the VFS and returns sorted matches. The caller keeps
/// the literal pattern when this comes back empty (the POSIX rule).
pub fn expand_glob(vfs: &mut Vfs, cwd: &str, pattern: &str) -> Vec<String> {
    let absolute = pattern.starts_with('/');
    let (base, segments) = if absolute {
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        ("/".to_string(), segments)
    } else {
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        (cwd.to_string(), segments)
    };
    let mut candidates = vec![String::new()];
    for (depth, segment) in segments.iter().enumerate() {
        let last = depth + 1 == segments.len();
        let mut next = Vec::new();
        for relative in &candidates {
            let dir_path = join_under(&base, relative);
            if !has_glob_chars(segment) {
                // Fixed segment: keep it when the path exists.
                let child = join_rel(relative, segment);
                let full = join_under(&base, &child);
                if vfs.exists(&full) {
                    next.push(child);
                }
                continue;
            }
            let Ok(entries) = vfs.readdir(&dir_path) else {
                continue;
            };
            for entry in entries {
                // Dotfiles only match patterns that spell the dot out.
                if entry.name.starts_with('.') && !segment.starts_with('.') {
                    continue;
                }
                if fnmatch(segment, &entry.name) {
                    if !last && entry.kind != wasmbox_vfs::NodeKind::Dir {
                        continue;
                    }
                    next.push(join_rel(relative, &entry.name));
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            return Vec::new();
        }
    }
    let mut results: Vec<String> = candidates
        .into_iter()
        .map(|rel| if absolute { join_under("/", &rel) } else { rel })
        .collect();
    results.sort();
    results
}

fn join_rel(base: &str, leaf: &str) -> String {
    if base.is_empty() {
        leaf.to_string()
    } else {
        format!("{base}/{leaf}")
    }
}

fn join_under(base: &str, rel: &str) -> String {
    if rel.is_empty() {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{base}{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_question_and_literals() {
        assert!(fnmatch("*", "anything"));
        assert!(fnmatch("*.txt", "notes.txt"));
        assert!(!fnmatch("*.txt", "notes.txt.bak"));
        assert!(fnmatch("a?c", "abc"));
        assert!(!fnmatch("a?c", "ac"));
        assert!(fnmatch("exact", "exact"));
        assert!(fnmatch("", ""));
        assert!(!fnmatch("", "x"));
    }

    #[test]
    fn classes_ranges_and_negation() {
        assert!(fnmatch("[abc]", "b"));
        assert!(!fnmatch("[abc]", "d"));
        assert!(fnmatch("[a-z]x", "mx"));
        assert!(fnmatch("[!0-9]", "x"));
        assert!(!fnmatch("[!0-9]", "5"));
        assert!(fnmatch("[]]", "]"));
    }

    #[test]
    fn escapes_disable_metacharacters() {
        assert!(fnmatch(r"\*", "*"));
        assert!(!fnmatch(r"\*", "x"));
        assert!(has_glob_chars("a*b"));
        assert!(!has_glob_chars(r"a\*b"));
    }

    #[test]
    fn glob_walks_the_vfs_sorted() {
        let mut vfs = Vfs::new();
        vfs.host_mkdirp("/home/user/sub").unwrap();
        for name in ["b.txt", "a.txt", "c.md", ".hidden.txt"] {
            vfs.host_write_file(&format!("/home/user/{name}"), &b""[..])
                .unwrap();
        }
        vfs.host_write_file("/home/user/sub/d.txt", &b""[..]).unwrap();

        assert_eq!(
            expand_glob(&mut vfs, "/home/user", "*.txt"),
            vec!["a.txt", "b.txt"]
        );
        assert_eq!(
            expand_glob(&mut vfs, "/home/user", ".*.txt"),
            vec![".hidden.txt"]
        );
        assert_eq!(
            expand_glob(&mut vfs, "/home/user", "sub/*.txt"),
            vec!["sub/d.txt"]
        );
        assert_eq!(
            expand_glob(&mut vfs, "/", "/home/user/*.md"),
            vec!["/home/user/c.md"]
        );
        assert!(expand_glob(&mut vfs, "/home/user", "*.nope").is_empty());
    }
}
