//! Path-component sanitization for gallery and asset names.

/// Longest component we emit, in bytes (Linux NAME_MAX).
const NAME_MAX: usize = 255;

/// Sanitizes one path component taken from remote data (titles, ids).
///
/// - Replaces NUL, `/`, `\`, control characters and the characters Windows
///   rejects (`<>:"|?*`) with `_`
/// - Collapses runs of replaced characters into one `_`
/// - Trims leading/trailing whitespace and dots
/// - Limits length to 255 bytes on a char boundary
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_replaced = false;

    for c in name.chars() {
        let forbidden = c == '\0'
            || c == '/'
            || c == '\\'
            || c.is_control()
            || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*');
        if forbidden {
            if !prev_replaced {
                out.push('_');
            }
            prev_replaced = true;
        } else {
            out.push(c);
            prev_replaced = false;
        }
    }

    let trimmed = out.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}
