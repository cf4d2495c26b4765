//parser/parsers.rs
use std::path::Path;

/// File stem used to name an application in logs and report files.
pub fn application_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("application")
        .to_string()
}

/// Strips a `#` comment and surrounding whitespace.
pub(crate) fn significant(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_name_drops_directories_and_extension() {
        assert_eq!(application_name("apps/vopd.app"), "vopd");
        assert_eq!(application_name("mpeg4"), "mpeg4");
    }

    #[test]
    fn comments_are_stripped() {
        assert_eq!(significant("  rows = 4   # grid height"), "rows = 4");
        assert_eq!(significant("# only a comment"), "");
    }
}
