//! File names shown to the user: rename sanitising and deliverable names.

use once_cell::sync::Lazy;
use regex::Regex;

/// Path separators and characters reserved on common filesystems.
static RESERVED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|]"#).expect("valid regex"));

/// Clean a user-supplied rename target.
///
/// Trims whitespace, drops a trailing `.pdf` (any case; it is re-applied),
/// and replaces reserved characters with `_`. Returns `None` when nothing
/// is left.
///
/// ```rust
/// use edgequake_pdfbot::naming::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name(" q3/report.PDF ").as_deref(), Some("q3_report.pdf"));
/// assert_eq!(sanitize_file_name(".pdf"), None);
/// ```
pub fn sanitize_file_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let stem = match trimmed.len().checked_sub(4) {
        Some(cut)
            if trimmed.is_char_boundary(cut) && trimmed[cut..].eq_ignore_ascii_case(".pdf") =>
        {
            &trimmed[..cut]
        }
        _ => trimmed,
    };
    let cleaned = RESERVED_CHARS.replace_all(stem.trim(), "_");
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("{cleaned}.pdf"))
    }
}

/// `name` without its final extension.
pub fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// `name` with its extension replaced by `extension`.
pub fn with_extension(name: &str, extension: &str) -> String {
    format!("{}.{}", stem(name), extension)
}

/// `name` with an operation prefix, e.g. `compressed_report.pdf`.
pub fn prefixed(prefix: &str, name: &str) -> String {
    format!("{prefix}_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_characters_become_underscores() {
        assert_eq!(
            sanitize_file_name(r#"a/b\c:d*e?f"g<h>i|j"#).as_deref(),
            Some("a_b_c_d_e_f_g_h_i_j.pdf")
        );
    }

    #[test]
    fn pdf_suffix_is_not_doubled() {
        assert_eq!(sanitize_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("report.Pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("report.docx").as_deref(), Some("report.docx.pdf"));
    }

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("   "), None);
        assert_eq!(sanitize_file_name(" .PDF"), None);
    }

    #[test]
    fn non_ascii_names_survive() {
        assert_eq!(sanitize_file_name("résumé").as_deref(), Some("résumé.pdf"));
        assert_eq!(sanitize_file_name("日本").as_deref(), Some("日本.pdf"));
    }

    #[test]
    fn stems_and_extensions() {
        assert_eq!(stem("thesis.final.pdf"), "thesis.final");
        assert_eq!(stem(".bashrc"), ".bashrc");
        assert_eq!(stem("noext"), "noext");
        assert_eq!(with_extension("thesis.pdf", "docx"), "thesis.docx");
        assert_eq!(prefixed("split", "a.pdf"), "split_a.pdf");
    }
}
