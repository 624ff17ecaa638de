/// Shrink a transport or decode error into a single log-friendly line.
///
/// Response bodies echoed back by providers and backtraces are dropped, whitespace runs are
/// collapsed, and the result is cut at `max_len` bytes on a char boundary.
pub fn compact_error_message(message: &str, max_len: usize) -> String {
    let mut head = message;
    for marker in [" text: ", "Stack backtrace:", " body: "] {
        if let Some((prefix, _)) = head.split_once(marker) {
            head = prefix;
        }
    }

    let mut compact = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.len() <= max_len {
        return compact;
    }
    let mut cut = max_len;
    while !compact.is_char_boundary(cut) {
        cut -= 1;
    }
    compact.truncate(cut);
    compact.push_str("...(truncated)");
    compact
}
