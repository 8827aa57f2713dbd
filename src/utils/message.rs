const TELEGRAM_MAX_MESSAGE_BYTES: usize = 4096;
const TRUNCATION_SUFFIX: &str = "\n\n... (truncated)";
// Room for closing tags appended after the cut
const SAFE_MARGIN: usize = 200;

/// Fits an HTML message into Telegram's size limit without leaving dangling
/// tags or split UTF-8 characters.
pub fn truncate_message(message: String) -> String {
    if message.len() <= TELEGRAM_MAX_MESSAGE_BYTES {
        return message;
    }

    let max_content_bytes = TELEGRAM_MAX_MESSAGE_BYTES - TRUNCATION_SUFFIX.len() - SAFE_MARGIN;

    let mut truncated = String::new();
    for ch in message.chars() {
        if truncated.len() + ch.len_utf8() > max_content_bytes {
            break;
        }
        truncated.push(ch);
    }

    // Drop a tag cut in half, e.g. `<a href="...`
    if let Some(last_open) = truncated.rfind('<') {
        if !truncated[last_open..].contains('>') {
            truncated.truncate(last_open);
        }
    }

    // Same for an entity such as `&amp`
    if let Some(last_amp) = truncated.rfind('&') {
        if !truncated[last_amp..].contains(';') {
            truncated.truncate(last_amp);
        }
    }

    let mut truncated = close_unclosed_tags(&truncated);
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

fn close_unclosed_tags(html: &str) -> String {
    let mut result = html.to_string();
    let tags = ["a", "b", "i", "u", "s", "code", "pre"];

    for tag in tags {
        let open_count = result.matches(&format!("<{}>", tag)).count()
            + result.matches(&format!("<{} ", tag)).count();
        let close_count = result.matches(&format!("</{}>", tag)).count();

        for _ in 0..open_count.saturating_sub(close_count) {
            result.push_str(&format!("</{}>", tag));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        let message = "<b>CPU</b> 12%".to_string();
        assert_eq!(truncate_message(message.clone()), message);
    }

    #[test]
    fn test_long_message_fits_limit() {
        let message = "x".repeat(10_000);
        let truncated = truncate_message(message);
        assert!(truncated.len() <= TELEGRAM_MAX_MESSAGE_BYTES);
        assert!(truncated.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_multibyte_characters_not_split() {
        let message = "🔴".repeat(2_000);
        let truncated = truncate_message(message);
        assert!(truncated.len() <= TELEGRAM_MAX_MESSAGE_BYTES);
        assert!(truncated.trim_end_matches(TRUNCATION_SUFFIX).chars().all(|c| c == '🔴'));
    }

    #[test]
    fn test_open_tags_are_closed() {
        let message = format!("<b>{}", "a".repeat(5_000));
        let truncated = truncate_message(message);
        assert!(truncated.contains("</b>"));
    }

    #[test]
    fn test_only_unclosed_tags_are_closed() {
        assert_eq!(close_unclosed_tags("<b>x</b><code>y"), "<b>x</b><code>y</code>");
    }
}
