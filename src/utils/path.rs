use std::path::PathBuf;

/// Turns a path typed or pasted by a user into a `PathBuf`
///
/// Trims whitespace, strips one pair of matching surrounding quotes and
/// expands a leading `~` to the home directory.
pub fn normalize_user_input_path(input: &str) -> PathBuf {
    let trimmed = input.trim();

    let unquoted = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    };

    if let Some(rest) = unquoted.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(mut home) = dirs::home_dir() {
                let rest = rest.trim_start_matches('/');
                if !rest.is_empty() {
                    home.push(rest);
                }
                return home;
            }
        }
    }

    PathBuf::from(unquoted)
}

/// Makes a repository name safe to embed in a file name
///
/// Anything other than ASCII alphanumerics, `-`, `_` and `.` becomes `_`.
pub fn sanitize_file_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "repo".to_string()
    } else {
        cleaned.to_string()
    }
}
