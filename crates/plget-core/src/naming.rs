//! Target file names for playlist items.
//!
//! Templates use the yt-dlp style placeholders `%(playlist_index)03d`,
//! `%(playlist_index)d`, `%(title)s` and `%(ext)s`. The rendered name is then
//! sanitized so it is always a single safe path component on Linux.

/// Render `template` for one item and sanitize the result.
pub fn render_filename(template: &str, index: usize, title: &str, ext: &str) -> String {
    let rendered = template
        .replace("%(playlist_index)03d", &format!("{:03}", index))
        .replace("%(playlist_index)d", &index.to_string())
        .replace("%(title)s", title)
        .replace("%(ext)s", ext);
    let name = sanitize_filename(&rendered);
    if name.is_empty() {
        format!("{:03}.{}", index, ext)
    } else {
        name
    }
}

/// Sanitize a file name for Linux filesystems:
/// - Replaces path separators, NUL, control characters and the characters
///   `: * ? " < > |` with `_`
/// - Collapses runs of `_`
/// - Trims leading/trailing spaces, dots and underscores
/// - Limits length to 255 bytes (on a char boundary)
///
/// Spaces inside the name are kept.
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let replacement = match c {
            '\0' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            '\t' => ' ',
            c if c.is_control() => '_',
            c => c,
        };

        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
