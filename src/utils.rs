/// Truncates `content` to at most `max_length` characters, marking the cut with an ellipsis.
pub(crate) fn shorten_content(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        content.to_owned()
    } else {
        content
            .chars()
            .take(max_length.saturating_sub(1))
            .collect::<String>()
            + "…"
    }
}
