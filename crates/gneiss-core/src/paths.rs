//! Source-absolute path handling.
//!
//! Paths inside the build are strings anchored at the source root:
//! `//` is the root itself, `//base/files.gns` a file, `//base` a
//! directory. Directories never carry a trailing slash (the root is
//! the bare `//`). These helpers normalize user-written relative
//! paths against the current build-file directory and pick paths
//! apart for `get_path_info`.

/// Join a possibly relative path onto a source-absolute directory,
/// resolving `.` and `..` components. Already-absolute inputs pass
/// through (normalized).
pub fn resolve_path(input: &str, current_dir: &str) -> String {
    let combined = if let Some(rest) = input.strip_prefix("//") {
        rest.to_string()
    } else {
        let base = current_dir.trim_start_matches("//");
        if base.is_empty() {
            input.to_string()
        } else {
            format!("{}/{}", base, input)
        }
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in combined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("//{}", parts.join("/"))
}

/// Directory of a source-absolute file path (`//a/b/c.cc` → `//a/b`).
pub fn dir_of(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) if idx > 1 => path[..idx].to_string(),
        _ => "//".to_string(),
    }
}

/// File name with extension (`//a/b/c.cc` → `c.cc`).
pub fn file_part(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// File name without extension (`//a/b/c.cc` → `c`).
pub fn name_part(path: &str) -> &str {
    let file = file_part(path);
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    }
}

/// Extension without the dot (`//a/b/c.cc` → `cc`), empty if none.
pub fn extension(path: &str) -> &str {
    let file = file_part(path);
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[idx + 1..],
        _ => "",
    }
}

/// Is `path` equal to or inside the directory `dir`?
pub fn is_within(path: &str, dir: &str) -> bool {
    if dir == "//" {
        return path.starts_with("//");
    }
    path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

/// Rewrite `path` to be relative to `new_base` (both source-absolute).
/// Produces `../` segments where needed.
pub fn rebase(path: &str, new_base: &str) -> String {
    let path_parts: Vec<&str> = path.trim_start_matches("//").split('/').filter(|p| !p.is_empty()).collect();
    let base_parts: Vec<&str> = new_base.trim_start_matches("//").split('/').filter(|p| !p.is_empty()).collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        out.push("..".to_string());
    }
    for part in &path_parts[common..] {
        out.push((*part).to_string());
    }
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_path("main.cc", "//src"), "//src/main.cc");
        assert_eq!(resolve_path("../inc/a.h", "//src"), "//inc/a.h");
        assert_eq!(resolve_path("./x", "//"), "//x");
        assert_eq!(resolve_path("x/y", "//"), "//x/y");
    }

    #[test]
    fn test_resolve_absolute_passthrough() {
        assert_eq!(resolve_path("//base/a.cc", "//src"), "//base/a.cc");
        assert_eq!(resolve_path("//base/../a.cc", "//src"), "//a.cc");
    }

    #[test]
    fn test_dir_of() {
        assert_eq!(dir_of("//a/b/c.cc"), "//a/b");
        assert_eq!(dir_of("//c.cc"), "//");
        assert_eq!(dir_of("//"), "//");
    }

    #[test]
    fn test_parts() {
        assert_eq!(file_part("//a/b/c.cc"), "c.cc");
        assert_eq!(name_part("//a/b/c.cc"), "c");
        assert_eq!(extension("//a/b/c.cc"), "cc");
        assert_eq!(extension("//a/b/noext"), "");
        assert_eq!(name_part("//a/.hidden"), ".hidden");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("//out/debug/gen/a.h", "//out/debug"));
        assert!(is_within("//out/debug", "//out/debug"));
        assert!(!is_within("//out/debugx/a", "//out/debug"));
        assert!(is_within("//anything", "//"));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("//src/main.cc", "//out/debug"), "../../src/main.cc");
        assert_eq!(rebase("//out/debug/gen/a.h", "//out/debug"), "gen/a.h");
        assert_eq!(rebase("//out/debug", "//out/debug"), ".");
    }
}
