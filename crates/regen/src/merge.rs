//! Three-way merge of generated file content.
//!
//! Reconciles a hand-edited working copy (`ours`) with freshly generated
//! output (`theirs`) against the previous pristine snapshot (`base`). The
//! merge never fails hard: the worst case is a fully conflicted result with
//! standard `<<<<<<<` / `=======` / `>>>>>>>` markers, which callers can
//! hand to any ordinary editor or git's own resolution tooling. Whether
//! conflicts fail the overall run is the caller's policy, not this module's.

use diffy::{ConflictStyle, MergeOptions};

use crate::types::ConflictRegion;

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// Merged bytes; contains conflict markers when `conflicts` is non-empty.
    pub content: Vec<u8>,
    pub conflicts: Vec<ConflictRegion>,
}

impl Merged {
    fn clean(content: &[u8]) -> Self {
        Merged {
            content: content.to_vec(),
            conflicts: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Three-way merge of `ours` (on-disk, possibly edited) and `theirs` (fresh
/// generator output) against `base` (previous pristine content).
///
/// An absent base is treated as empty, so the fast paths still apply: if the
/// generator output did not change (`theirs == base`) the working copy is
/// kept verbatim, and if the working copy is unedited (`ours == base`) the
/// fresh output wins. When both sides diverge the general line-based diff3
/// runs, and overlapping edits are written as conflict markers rather than
/// silently dropping either side.
pub fn merge(base: Option<&[u8]>, ours: &[u8], theirs: &[u8]) -> Merged {
    let base = base.unwrap_or(b"");

    // Fast paths
    if ours == theirs {
        return Merged::clean(ours);
    }
    if base == ours {
        return Merged::clean(theirs);
    }
    if base == theirs {
        return Merged::clean(ours);
    }

    let mut opts = MergeOptions::new();
    opts.set_conflict_style(ConflictStyle::Merge);
    match opts.merge_bytes(base, ours, theirs) {
        Ok(content) => Merged {
            content,
            conflicts: Vec::new(),
        },
        Err(content) => {
            let conflicts = parse_conflict_markers(&String::from_utf8_lossy(&content));
            Merged { content, conflicts }
        }
    }
}

/// Enumerate conflict regions in merged text.
///
/// Lines are 1-indexed. A region starts at a line beginning with `<<<<<<<`
/// and ends at the line beginning with `>>>>>>>`. A start marker with no
/// matching end is reported as a region running to end-of-file, since an
/// unresolved conflict must never disappear from the report. Text without
/// markers yields an empty vec.
pub fn parse_conflict_markers(content: &str) -> Vec<ConflictRegion> {
    let mut regions = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_line = 0;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        if line.starts_with("<<<<<<<") {
            // A repeated start inside an open region keeps the first start
            if start.is_none() {
                start = Some(line_no);
            }
        } else if line.starts_with(">>>>>>>")
            && let Some(start_line) = start.take()
        {
            regions.push(ConflictRegion {
                start_line,
                end_line: line_no,
            });
        }
    }

    if let Some(start_line) = start {
        regions.push(ConflictRegion {
            start_line,
            end_line: last_line.max(start_line),
        });
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_str(base: Option<&str>, ours: &str, theirs: &str) -> Merged {
        merge(base.map(str::as_bytes), ours.as_bytes(), theirs.as_bytes())
    }

    // ── Fast paths ─────────────────────────────────────────────────────

    #[test]
    fn test_identical_sides_are_clean() {
        let m = merge_str(Some("a\n"), "b\n", "b\n");
        assert!(m.is_clean());
        assert_eq!(m.content, b"b\n");
    }

    #[test]
    fn test_unedited_working_copy_takes_fresh_output() {
        let m = merge_str(Some("v1\n"), "v1\n", "v2\n");
        assert!(m.is_clean());
        assert_eq!(m.content, b"v2\n");
    }

    #[test]
    fn test_unchanged_generator_output_keeps_edits() {
        let m = merge_str(Some("v1\n"), "v1 edited\n", "v1\n");
        assert!(m.is_clean());
        assert_eq!(m.content, b"v1 edited\n");
    }

    #[test]
    fn test_no_base_unedited_disk_takes_fresh() {
        // Absent base behaves as empty: an empty working copy is "unedited"
        let m = merge_str(None, "", "generated\n");
        assert!(m.is_clean());
        assert_eq!(m.content, b"generated\n");
    }

    // ── Non-overlapping merges ─────────────────────────────────────────

    #[test]
    fn test_disjoint_edits_merge_cleanly() {
        let base = "line1\nline2\nline3\nline4\nline5\n";
        let ours = "EDITED\nline2\nline3\nline4\nline5\n";
        let theirs = "line1\nline2\nline3\nline4\nREGEN\n";
        let m = merge_str(Some(base), ours, theirs);
        assert!(m.is_clean());
        assert_eq!(m.content, b"EDITED\nline2\nline3\nline4\nREGEN\n");
    }

    #[test]
    fn test_edit_survives_generator_addition() {
        let base = "func a() {}\nfunc b() {}\n";
        let ours = "func a() { custom() }\nfunc b() {}\n";
        let theirs = "func a() {}\nfunc b() {}\nfunc c() {}\n";
        let m = merge_str(Some(base), ours, theirs);
        assert!(m.is_clean());
        let merged = String::from_utf8(m.content).unwrap();
        assert!(merged.contains("custom()"));
        assert!(merged.contains("func c()"));
    }

    #[test]
    fn test_identical_change_both_sides() {
        let base = "a\nb\nc\n";
        let m = merge_str(Some(base), "a\nX\nc\n", "a\nX\nc\n");
        assert!(m.is_clean());
        assert_eq!(m.content, b"a\nX\nc\n");
    }

    // ── Conflicts ──────────────────────────────────────────────────────

    #[test]
    fn test_overlapping_edits_conflict() {
        let base = "a\nb\nc\n";
        let m = merge_str(Some(base), "a\nOURS\nc\n", "a\nTHEIRS\nc\n");
        assert!(!m.is_clean());
        let text = String::from_utf8(m.content.clone()).unwrap();
        assert!(text.contains("<<<<<<<"));
        assert!(text.contains("======="));
        assert!(text.contains(">>>>>>>"));
        assert!(text.contains("OURS"));
        assert!(text.contains("THEIRS"));
        // Regions in the report match the markers in the content
        assert_eq!(m.conflicts, parse_conflict_markers(&text));
    }

    #[test]
    fn test_no_base_divergent_sides_conflict() {
        // With no pristine base and both sides present but different, the
        // merge surfaces the disagreement instead of trusting either side.
        let m = merge_str(None, "hand written\n", "generated\n");
        assert!(!m.is_clean());
        let text = String::from_utf8(m.content).unwrap();
        assert!(text.contains("hand written"));
        assert!(text.contains("generated"));
    }

    #[test]
    fn test_delete_vs_modify_conflicts() {
        let base = "a\nb\nc\n";
        let ours = "a\nc\n"; // deleted b
        let theirs = "a\nB!\nc\n"; // modified b
        let m = merge_str(Some(base), ours, theirs);
        assert!(!m.is_clean());
    }

    #[test]
    fn test_worst_case_never_panics() {
        // Pathological inputs degrade to a conflicted file, never an error
        let m = merge(Some(b"x"), b"<<<<<<< already\n", b"\xff\xfe odd bytes");
        assert!(!m.content.is_empty());
    }

    // ── parse_conflict_markers ─────────────────────────────────────────

    #[test]
    fn test_parse_two_regions_exact_lines() {
        let text = "ok\n\
                    <<<<<<< ours\n\
                    a\n\
                    =======\n\
                    b\n\
                    >>>>>>> theirs\n\
                    ok\n\
                    <<<<<<< ours\n\
                    c\n\
                    =======\n\
                    d\n\
                    >>>>>>> theirs\n";
        let regions = parse_conflict_markers(text);
        assert_eq!(
            regions,
            vec![
                ConflictRegion {
                    start_line: 2,
                    end_line: 6
                },
                ConflictRegion {
                    start_line: 8,
                    end_line: 12
                },
            ]
        );
    }

    #[test]
    fn test_parse_no_markers_is_empty() {
        assert!(parse_conflict_markers("just\nsome\ntext\n").is_empty());
    }

    #[test]
    fn test_parse_unterminated_region_runs_to_eof() {
        let text = "a\n<<<<<<< ours\nb\nc\n";
        let regions = parse_conflict_markers(text);
        assert_eq!(
            regions,
            vec![ConflictRegion {
                start_line: 2,
                end_line: 4
            }]
        );
    }

    #[test]
    fn test_parse_marker_on_last_line() {
        let text = "a\n<<<<<<< ours";
        let regions = parse_conflict_markers(text);
        assert_eq!(
            regions,
            vec![ConflictRegion {
                start_line: 2,
                end_line: 2
            }]
        );
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_conflict_markers("").is_empty());
    }

    #[test]
    fn test_parse_stray_end_marker_ignored() {
        let regions = parse_conflict_markers("a\n>>>>>>> theirs\nb\n");
        assert!(regions.is_empty());
    }
}
