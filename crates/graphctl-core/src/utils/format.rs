/// Shorten a server response body for use in an error message.
///
/// Cuts on a character boundary and notes the original byte length.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        let cut: String = body.chars().take(max_chars).collect();
        format!("{}... (truncated, {} total bytes)", cut, body.len())
    }
}
