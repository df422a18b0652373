//! The `@generated-id` identity marker.
//!
//! Every tracked generated file carries a single comment line of the form
//! `@generated-id: <id>` near its top, in whatever comment syntax the file's
//! language uses. The id is either a full UUID or a 12-hex-char short id;
//! both forms are accepted when reading. The marker is the file's stable
//! identity across regenerations, renames, and moves.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

/// Markers must appear within the first this-many lines of a file.
const HEADER_LINES: usize = 20;

/// How many leading bytes to sniff for NUL when classifying binary content.
const BINARY_SNIFF_LEN: usize = 8192;

static GENERATED_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@generated-id:\s*([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|[0-9a-f]{12})",
    )
    .expect("generated-id pattern is valid")
});

/// Mint a new identifier for a generated file.
pub fn mint_id() -> String {
    Uuid::new_v4().to_string()
}

/// Extract the generated-id from file content, if one is embedded.
///
/// Only the first [`HEADER_LINES`] lines are considered; binary content
/// never carries a marker.
pub fn extract_generated_id(content: &[u8]) -> Option<String> {
    if is_binary(content) {
        return None;
    }
    let text = String::from_utf8_lossy(content);
    for line in text.lines().take(HEADER_LINES) {
        if let Some(captures) = GENERATED_ID_PATTERN.captures(line) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Returns true if the content looks binary (NUL byte in the leading bytes).
pub fn is_binary(content: &[u8]) -> bool {
    let sniff = &content[..content.len().min(BINARY_SNIFF_LEN)];
    sniff.contains(&0)
}

/// Convert all line endings to LF.
pub fn normalize_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Comment syntax for a marker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStyle {
    Line(&'static str),
    Block {
        open: &'static str,
        close: &'static str,
    },
}

fn comment_style_for(path: &str) -> Option<CommentStyle> {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "rs" | "go" | "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "java" | "kt" | "swift"
        | "c" | "h" | "cpp" | "hpp" | "cc" | "cs" | "scala" | "dart" | "php" | "proto" => {
            Some(CommentStyle::Line("//"))
        }
        "py" | "rb" | "sh" | "bash" | "zsh" | "yaml" | "yml" | "toml" | "tf" | "pl" | "r"
        | "gemspec" | "rake" => Some(CommentStyle::Line("#")),
        "sql" | "lua" | "hs" => Some(CommentStyle::Line("--")),
        "html" | "xml" | "md" | "vue" | "csproj" => Some(CommentStyle::Block {
            open: "<!--",
            close: "-->",
        }),
        "css" | "scss" | "less" => Some(CommentStyle::Block {
            open: "/*",
            close: "*/",
        }),
        _ => None,
    }
}

/// Embed a generated-id marker into file content.
///
/// Returns `None` when the file's comment syntax is unknown; such files
/// stay unmarked and therefore untracked. The marker goes on the first
/// line, after a shebang if one is present. Content that already carries a
/// marker is returned unchanged.
pub fn embed_generated_id(path: &str, content: &str, id: &str) -> Option<String> {
    if extract_generated_id(content.as_bytes()).is_some() {
        return Some(content.to_string());
    }

    let style = comment_style_for(path)?;
    let marker_line = match style {
        CommentStyle::Line(prefix) => format!("{prefix} @generated-id: {id}"),
        CommentStyle::Block { open, close } => format!("{open} @generated-id: {id} {close}"),
    };

    if let Some(rest) = content.strip_prefix("#!") {
        // Keep the shebang on line one
        match rest.split_once('\n') {
            Some((shebang, body)) => Some(format!("#!{shebang}\n{marker_line}\n{body}")),
            None => Some(format!("{content}\n{marker_line}\n")),
        }
    } else {
        Some(format!("{marker_line}\n{content}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── extract_generated_id ───────────────────────────────────────────

    #[test]
    fn test_extract_full_uuid() {
        let content = b"// @generated-id: 01234567-89ab-cdef-0123-456789abcdef\npackage main\n";
        assert_eq!(
            extract_generated_id(content).as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
    }

    #[test]
    fn test_extract_short_id() {
        let content = b"# @generated-id: a1b2c3d4e5f6\nimport os\n";
        assert_eq!(extract_generated_id(content).as_deref(), Some("a1b2c3d4e5f6"));
    }

    #[test]
    fn test_extract_ignores_marker_past_header() {
        let mut content = String::new();
        for i in 0..HEADER_LINES {
            content.push_str(&format!("line {i}\n"));
        }
        content.push_str("// @generated-id: a1b2c3d4e5f6\n");
        assert_eq!(extract_generated_id(content.as_bytes()), None);
    }

    #[test]
    fn test_extract_none_without_marker() {
        assert_eq!(extract_generated_id(b"fn main() {}\n"), None);
    }

    #[test]
    fn test_extract_none_for_binary() {
        let content = b"// @generated-id: a1b2c3d4e5f6\n\x00\x01\x02";
        assert_eq!(extract_generated_id(content), None);
    }

    #[test]
    fn test_extract_rejects_uppercase_hex() {
        assert_eq!(extract_generated_id(b"// @generated-id: A1B2C3D4E5F6\n"), None);
    }

    // ── is_binary ──────────────────────────────────────────────────────

    #[test]
    fn test_is_binary_detects_nul() {
        assert!(is_binary(b"\x89PNG\x00\x1a"));
    }

    #[test]
    fn test_is_binary_false_for_text() {
        assert!(!is_binary(b"plain text content\n"));
    }

    #[test]
    fn test_is_binary_only_sniffs_prefix() {
        let mut content = vec![b'a'; BINARY_SNIFF_LEN];
        content.push(0);
        assert!(!is_binary(&content));
    }

    // ── normalize_line_endings ─────────────────────────────────────────

    #[test]
    fn test_normalize_crlf() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    // ── embed_generated_id ─────────────────────────────────────────────

    #[test]
    fn test_embed_line_comment() {
        let out = embed_generated_id("models/user.go", "package models\n", "a1b2c3d4e5f6").unwrap();
        assert!(out.starts_with("// @generated-id: a1b2c3d4e5f6\n"));
        assert!(out.ends_with("package models\n"));
    }

    #[test]
    fn test_embed_hash_comment() {
        let out = embed_generated_id("client.py", "import os\n", "a1b2c3d4e5f6").unwrap();
        assert!(out.starts_with("# @generated-id: a1b2c3d4e5f6\n"));
    }

    #[test]
    fn test_embed_block_comment() {
        let out = embed_generated_id("README.md", "# Title\n", "a1b2c3d4e5f6").unwrap();
        assert!(out.starts_with("<!-- @generated-id: a1b2c3d4e5f6 -->\n"));
    }

    #[test]
    fn test_embed_after_shebang() {
        let out =
            embed_generated_id("run.sh", "#!/bin/sh\necho hi\n", "a1b2c3d4e5f6").unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#!/bin/sh");
        assert_eq!(lines[1], "# @generated-id: a1b2c3d4e5f6");
        assert_eq!(lines[2], "echo hi");
    }

    #[test]
    fn test_embed_unknown_syntax_returns_none() {
        assert!(embed_generated_id("data.bin", "stuff", "a1b2c3d4e5f6").is_none());
    }

    #[test]
    fn test_embed_is_idempotent() {
        let once = embed_generated_id("a.rs", "fn main() {}\n", "a1b2c3d4e5f6").unwrap();
        let twice = embed_generated_id("a.rs", &once, "ffffffffffff").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_embedded_marker_roundtrips() {
        let out = embed_generated_id("a.ts", "export {};\n", "a1b2c3d4e5f6").unwrap();
        assert_eq!(
            extract_generated_id(out.as_bytes()).as_deref(),
            Some("a1b2c3d4e5f6")
        );
    }

    #[test]
    fn test_mint_id_is_extractable() {
        let id = mint_id();
        let out = embed_generated_id("a.rs", "fn main() {}\n", &id).unwrap();
        assert_eq!(extract_generated_id(out.as_bytes()), Some(id));
    }
}
