//! Comment stripping and recursive `import` inlining, run once over the raw
//! source before lexing. Each file is spliced in at most once per
//! compilation; the include-set is threaded explicitly, never kept as
//! module-level mutable state.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PreprocessError(pub String);

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for PreprocessError {}

/// Strips `.:` line comments and `.::᛭::.` block comments. Block comments
/// are stripped first so a `.::` opener is never mistaken for a `.:` line
/// comment.
pub fn remove_comments(mut src: String) -> String {
    src = remove_all_between(&src, ".::", "::.");
    src = remove_all_between(&src, ".:", "\n");
    src
}

fn remove_all_between(src: &str, begin: &str, end: &str) -> String {
    let mut s = src.to_string();
    loop {
        let Some(start) = s.find(begin) else { break };
        match s[start..].find(end) {
            Some(rel_end) => {
                let end_idx = start + rel_end + end.len();
                s.replace_range(start..end_idx, "");
            }
            None => {
                s.replace_range(start.., "");
                break;
            }
        }
    }
    s
}

/// Recursively inlines `import <dotted-path>` directives, splicing in the
/// pre-processed contents of `<path>.pie` resolved relative to `root`'s
/// containing directory. `include_set` tracks canonical paths already
/// spliced in this compilation so a file is never imported twice.
pub fn preprocess(
    src: String,
    root: &Path,
    include_set: &mut HashSet<PathBuf>,
    repl: bool,
) -> Result<String, PreprocessError> {
    let canonical = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());

    if !repl {
        if include_set.contains(&canonical) {
            return Ok(String::new());
        }
        include_set.insert(canonical.clone());
    }

    let mut src = remove_comments(src);
    let base_dir = root.parent().map(Path::to_path_buf).unwrap_or_default();

    while let Some(index) = src.find("import") {
        let after_keyword = index + "import".len();
        let name_start = src[after_keyword..]
            .find(|c: char| !c.is_whitespace())
            .map(|i| after_keyword + i)
            .unwrap_or(after_keyword);
        let rest = &src[name_start..];
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_string();

        let mut remove_end = name_start + name_len;
        if src[remove_end..].starts_with(';') {
            remove_end += 1;
        }
        src.replace_range(index..remove_end, "");

        let mut path = base_dir.clone();
        path.push(name.replace("::", "/"));
        path.set_extension("pie");

        let module_src = fs::read_to_string(&path)
            .map_err(|e| PreprocessError(format!("file '{}' not found: {}", path.display(), e)))?;

        let expanded = preprocess(module_src, &path, include_set, false)?;
        src.insert_str(index, &expanded);
    }

    Ok(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn strips_line_comments() {
        let src = "x = 1; .: a trailing comment\ny = 2;".to_string();
        let out = remove_comments(src);
        assert_eq!(out, "x = 1; \ny = 2;");
    }

    #[test]
    fn strips_block_comments() {
        let src = "x = 1; .:: this\nspans lines ::. y = 2;".to_string();
        let out = remove_comments(src);
        assert_eq!(out, "x = 1;  y = 2;");
    }

    #[test]
    fn imports_are_spliced_and_deduped() {
        let dir = tempfile::tempdir().unwrap();
        let lib_path = dir.path().join("lib.pie");
        let mut lib_file = fs::File::create(&lib_path).unwrap();
        writeln!(lib_file, "shared = 1;").unwrap();

        let main_path = dir.path().join("main.pie");
        let main_src = "import lib;\nimport lib;\nx = shared;".to_string();

        let mut include_set = HashSet::new();
        let out = preprocess(main_src, &main_path, &mut include_set, false).unwrap();
        assert_eq!(out.matches("shared = 1;").count(), 1);
        assert!(out.contains("x = shared;"));
    }
}
