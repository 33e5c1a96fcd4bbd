/// Linux NAME_MAX, in bytes.
const MAX_COMPONENT_BYTES: usize = 255;

/// Makes `name` safe as a single path component: separators, NUL, control
/// characters and whitespace runs become one `_`; leading and trailing dots,
/// underscores and spaces are dropped; the result is cut to 255 bytes on a
/// char boundary. `.` and `..` collapse to the empty string.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let bad = matches!(c, '/' | '\\' | '\0') || c.is_control() || c.is_whitespace();
        if !bad {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches(|c| matches!(c, '.' | '_' | ' '));
    let mut end = trimmed.len().min(MAX_COMPONENT_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
