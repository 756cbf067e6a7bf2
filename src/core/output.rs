//! Bounded single-line rendering for terminal output.

/// Collapse whitespace runs and cut to `max_chars`, marking the cut with `...`.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let kept: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", kept.trim_end())
}
