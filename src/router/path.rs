/// Canonical form of a URL path, used to compute fixed-path redirects.
///
/// Repeated slashes collapse, `.` segments disappear and `..` removes the
/// segment before it without ever climbing above the root. The result always
/// starts with `/` and keeps a trailing slash when the input had one.
///
/// ```
/// use pathwise::router::clean_path;
///
/// assert_eq!(clean_path("/../path"), "/path");
/// assert_eq!(clean_path("abc//def/./ghi/"), "/abc/def/ghi/");
/// assert_eq!(clean_path(""), "/");
/// ```
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }

    let mut trailing = path.len() > 1 && path.ends_with('/');
    let last = path.split('/').count() - 1;
    let mut segments: Vec<&str> = Vec::new();

    for (i, segment) in path.split('/').enumerate() {
        match segment {
            "" => {}
            "." => trailing |= i == last,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() || trailing {
        cleaned.push('/');
    }
    cleaned
}

/// Re-escapes a decoded path for use in a `Location` header. Slashes are
/// kept; everything outside the unreserved set is percent-encoded.
pub(crate) fn escape_path(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}
