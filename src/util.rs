use std::path::Path;

/// Maximum stored file name length (bytes)
const MAX_FILENAME_LEN: usize = 255;

/// Truncate a string slice without allocating (Unicode-safe)
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Cut content at a line boundary so it fits in a prompt, appending a notice
/// with the shown/total character counts when anything was dropped.
pub fn truncate_for_prompt(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0usize;
    for line in content.split('\n') {
        let cost = line.chars().count() + 1;
        if used + cost > max_chars {
            break;
        }
        kept.push(line);
        used += cost;
    }

    let mut truncated = kept.join("\n");
    if kept.is_empty() {
        // A single enormous first line: fall back to a hard cut.
        truncated = truncate_str(content, max_chars).to_string();
    }
    let shown = truncated.chars().count();
    format!(
        "{}\n\n[... FILE TRUNCATED, SHOWING {} OF {} CHARACTERS ...]",
        truncated, shown, total
    )
}

/// Strip path components and unsafe characters from an uploaded file name.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw);

    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.len() <= MAX_FILENAME_LEN {
        return safe;
    }

    let path = Path::new(&safe);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let stem_budget = MAX_FILENAME_LEN.saturating_sub(ext.len()).min(250);
    let stem = safe.strip_suffix(ext.as_str()).unwrap_or(&safe);
    let mut cut = stem_budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}

/// Check that content is within the upload size limit.
pub fn check_content_size(content: &str, max_size_mb: u64) -> Result<(), String> {
    let size = content.len() as u64;
    let limit = max_size_mb.saturating_mul(1024 * 1024);
    if size > limit {
        return Err(format!(
            "File size ({} bytes) exceeds the {}MB limit",
            size, max_size_mb
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        assert_eq!(truncate_str("héllo", 2), "hé");
        assert_eq!(truncate_str("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_for_prompt_keeps_whole_lines() {
        let content = "line one\nline two\nline three";
        let out = truncate_for_prompt(content, 18);
        assert!(out.starts_with("line one\nline two"));
        assert!(!out.contains("line three"));
        assert!(out.contains("SHOWING 17 OF 28 CHARACTERS"));
    }

    #[test]
    fn test_truncate_for_prompt_passthrough() {
        assert_eq!(truncate_for_prompt("short", 100), "short");
    }

    #[test]
    fn test_truncate_for_prompt_long_first_line() {
        let content = "x".repeat(50);
        let out = truncate_for_prompt(&content, 10);
        assert!(out.starts_with("xxxxxxxxxx\n"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\load test.py"), "load_test.py");
        assert_eq!(sanitize_filename("plan$(rm).jmx"), "plan__rm_.jmx");
    }

    #[test]
    fn test_sanitize_filename_caps_length() {
        let long = format!("{}.jmx", "a".repeat(400));
        let safe = sanitize_filename(&long);
        assert!(safe.len() <= 255);
        assert!(safe.ends_with(".jmx"));
    }

    #[test]
    fn test_check_content_size() {
        assert!(check_content_size("abc", 1).is_ok());
        let big = "a".repeat(1024 * 1024 + 1);
        assert!(check_content_size(&big, 1).is_err());
    }
}
