use crate::error::{RbacError, Result};

pub const SEPARATOR: char = '/';

/// True when a reference should be resolved as a path rather than a title.
pub fn is_path(reference: &str) -> bool { reference.starts_with(SEPARATOR) }

/// Split "/a/b/c" into ["a", "b", "c"]. A trailing separator is ignored and "/" yields no
/// segments; empty inner segments ("/a//b") are rejected.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let Some(rest) = path.strip_prefix(SEPARATOR) else {
        return Err(RbacError::invalid("invalid_path", format!("path '{}' must start with '{}'", path, SEPARATOR)));
    };
    let rest = rest.strip_suffix(SEPARATOR).unwrap_or(rest);
    if rest.is_empty() { return Ok(Vec::new()); }
    let parts: Vec<&str> = rest.split(SEPARATOR).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(RbacError::invalid("invalid_path", format!("path '{}' contains an empty segment", path)));
    }
    Ok(parts)
}

/// Render titles below the root; the root itself renders as the bare separator.
pub fn join_path<'a, I>(titles: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for t in titles {
        out.push(SEPARATOR);
        out.push_str(t);
    }
    if out.is_empty() { out.push(SEPARATOR); }
    out
}

/// Titles must be non-empty and free of the separator, otherwise the node could not be
/// addressed by path.
pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(RbacError::invalid("invalid_title", "title must not be empty"));
    }
    if title.contains(SEPARATOR) {
        return Err(RbacError::invalid("invalid_title", format!("title '{}' must not contain '{}'", title, SEPARATOR)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_root_and_trailing_separator() {
        assert!(split_path("/").unwrap().is_empty());
        assert_eq!(split_path("/a/b").unwrap(), vec!["a", "b"]);
        assert_eq!(split_path("/a/b/").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn split_rejects_relative_and_empty_segments() {
        assert!(split_path("a/b").unwrap_err().is_invalid());
        assert!(split_path("/a//b").unwrap_err().is_invalid());
        assert!(split_path("").unwrap_err().is_invalid());
    }

    #[test]
    fn join_renders_root_as_separator() {
        assert_eq!(join_path(Vec::<&str>::new()), "/");
        assert_eq!(join_path(["x", "y"]), "/x/y");
    }

    #[test]
    fn titles_are_validated() {
        assert!(validate_title("admin").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("  ").is_err());
        assert!(validate_title("a/b").is_err());
    }
}
