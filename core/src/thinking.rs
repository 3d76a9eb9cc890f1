//! Thinking filter: separates `<think>`-bracketed model reasoning from
//! user-visible output.
//!
//! [`filter_thinking`] handles complete strings; [`StreamingThinkFilter`]
//! applies the same rules incrementally to streaming buffers, tracking
//! tag state across chunk boundaries so a tag split between two chunks is
//! still recognized.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static THINK_SPAN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"<think>(.*?)</think>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("think pattern must compile")
});

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Splits `text` into `(visible, thinking)`.
///
/// `thinking` is the concatenation of every `<think>...</think>` span's content
/// (joined with newlines); `visible` is the original with those spans replaced
/// by paragraph breaks, runs of three or more newlines collapsed to two, and
/// leading/trailing newlines stripped. Applying the filter to already-filtered
/// text is the identity.
pub fn filter_thinking(text: &str) -> (String, String) {
    let mut spans: Vec<String> = Vec::new();
    for caps in THINK_SPAN.captures_iter(text) {
        spans.push(caps[1].trim().to_string());
    }
    let thinking = spans.join("\n");

    let visible = THINK_SPAN.replace_all(text, "\n\n");
    let visible = EXCESS_NEWLINES.replace_all(&visible, "\n\n");
    let visible = visible.trim_matches('\n').to_string();

    (visible, thinking)
}

/// Incremental delta produced by one [`StreamingThinkFilter::push`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterDelta {
    /// New user-visible text.
    pub visible: String,
    /// New internal-reasoning text.
    pub thinking: String,
}

impl FilterDelta {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.thinking.is_empty()
    }
}

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Streaming `<think>` filter.
///
/// Feed chunks with [`push`](Self::push); call [`finish`](Self::finish) after
/// the stream terminates to flush any buffered tail. While a tag is open,
/// incoming text goes to the thinking channel; visible text never contains tag
/// content. Newline collapsing matches [`filter_thinking`]: at most two
/// consecutive visible newlines, none at the start.
#[derive(Debug, Default)]
pub struct StreamingThinkFilter {
    /// Unemitted tail that may end in a partial tag.
    buffer: String,
    in_think: bool,
    /// Consecutive newlines already emitted to the visible channel.
    trailing_newlines: usize,
    /// Whether any visible text has been emitted yet.
    emitted_visible: bool,
}

impl StreamingThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_think(&self) -> bool {
        self.in_think
    }

    /// Consumes one stream chunk and returns the visible/thinking deltas.
    pub fn push(&mut self, chunk: &str) -> FilterDelta {
        self.buffer.push_str(chunk);
        let mut delta = FilterDelta::default();

        loop {
            let tag = if self.in_think { CLOSE_TAG } else { OPEN_TAG };
            match find_case_insensitive(&self.buffer, tag) {
                Some(pos) => {
                    let before: String = self.buffer[..pos].to_string();
                    self.buffer.drain(..pos + tag.len());
                    if self.in_think {
                        self.push_thinking(&mut delta, &before);
                        // A closed span renders as a paragraph break in the
                        // visible stream, like the whole-string filter.
                        self.push_visible(&mut delta, "\n\n");
                    } else {
                        self.push_visible(&mut delta, &before);
                    }
                    self.in_think = !self.in_think;
                }
                None => {
                    // Keep a tail that could be the prefix of a split tag.
                    let keep = partial_tag_suffix(&self.buffer, tag);
                    let emit_len = self.buffer.len() - keep;
                    if emit_len > 0 {
                        let text: String = self.buffer[..emit_len].to_string();
                        self.buffer.drain(..emit_len);
                        if self.in_think {
                            self.push_thinking(&mut delta, &text);
                        } else {
                            self.push_visible(&mut delta, &text);
                        }
                    }
                    break;
                }
            }
        }

        delta
    }

    /// Flushes the remaining buffer after the stream ends.
    pub fn finish(&mut self) -> FilterDelta {
        let mut delta = FilterDelta::default();
        let rest = std::mem::take(&mut self.buffer);
        if rest.is_empty() {
            return delta;
        }
        if self.in_think {
            // Unterminated span: surface what the model produced as thinking.
            self.push_thinking(&mut delta, &rest);
        } else {
            self.push_visible(&mut delta, &rest);
        }
        delta
    }

    fn push_visible(&mut self, delta: &mut FilterDelta, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                // Collapse: no leading newlines, at most two in a row.
                if !self.emitted_visible || self.trailing_newlines >= 2 {
                    continue;
                }
                self.trailing_newlines += 1;
                delta.visible.push('\n');
            } else {
                self.trailing_newlines = 0;
                self.emitted_visible = true;
                delta.visible.push(ch);
            }
        }
    }

    fn push_thinking(&mut self, delta: &mut FilterDelta, text: &str) {
        delta.thinking.push_str(text);
    }
}

/// Byte index search for `needle` ignoring ASCII case.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let haystack_lower = haystack.to_ascii_lowercase();
    haystack_lower.find(&needle.to_ascii_lowercase())
}

/// Length of the longest suffix of `buffer` that is a proper prefix of `tag`.
/// Compared as bytes so multibyte content near the boundary cannot panic.
fn partial_tag_suffix(buffer: &str, tag: &str) -> usize {
    let tag_bytes = tag.to_ascii_lowercase().into_bytes();
    let buf_bytes = buffer.to_ascii_lowercase().into_bytes();
    let max = tag_bytes.len().saturating_sub(1).min(buf_bytes.len());
    for len in (1..=max).rev() {
        if tag_bytes.starts_with(&buf_bytes[buf_bytes.len() - len..]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_split() {
        let (visible, thinking) = filter_thinking("<think>plan</think>Hello");
        assert_eq!(visible, "Hello");
        assert_eq!(thinking, "plan");
    }

    #[test]
    fn multiple_spans_concatenate() {
        let (visible, thinking) = filter_thinking("<think>a</think>X<think>b</think>Y");
        assert_eq!(visible, "X\n\nY");
        assert_eq!(thinking, "a\nb");
    }

    #[test]
    fn case_insensitive_and_multiline() {
        let (visible, thinking) = filter_thinking("<THINK>line1\nline2</THINK>done");
        assert_eq!(visible, "done");
        assert_eq!(thinking, "line1\nline2");
    }

    #[test]
    fn filter_is_idempotent() {
        let (visible, _) = filter_thinking("<think>a</think>first\n\n\n\nsecond<think>b</think>");
        let (again, thinking) = filter_thinking(&visible);
        assert_eq!(again, visible);
        assert_eq!(thinking, "");
    }

    #[test]
    fn no_tags_is_identity_modulo_trim() {
        let (visible, thinking) = filter_thinking("plain text");
        assert_eq!(visible, "plain text");
        assert_eq!(thinking, "");
    }

    #[test]
    fn streaming_matches_complete_filter() {
        let text = "<think>plan here</think>Hello world";
        let mut filter = StreamingThinkFilter::new();
        let mut visible = String::new();
        let mut thinking = String::new();
        // Feed in awkward chunk sizes, splitting the tags.
        for chunk in ["<th", "ink>plan ", "here</thi", "nk>Hel", "lo world"] {
            let d = filter.push(chunk);
            visible.push_str(&d.visible);
            thinking.push_str(&d.thinking);
        }
        let d = filter.finish();
        visible.push_str(&d.visible);
        thinking.push_str(&d.thinking);

        assert_eq!(visible, "Hello world");
        assert_eq!(thinking, "plan here");
    }

    #[test]
    fn streaming_never_leaks_tag_text() {
        let mut filter = StreamingThinkFilter::new();
        let mut visible = String::new();
        for chunk in ["before <", "think>secret<", "/think> after"] {
            visible.push_str(&filter.push(chunk).visible);
        }
        visible.push_str(&filter.finish().visible);
        assert!(!visible.contains("think"));
        assert!(!visible.contains("secret"));
        assert_eq!(visible, "before \n\n after");
    }

    #[test]
    fn streaming_unterminated_span_flushes_to_thinking() {
        let mut filter = StreamingThinkFilter::new();
        let d1 = filter.push("<think>half finished");
        let d2 = filter.finish();
        assert_eq!(d1.visible, "");
        assert_eq!(format!("{}{}", d1.thinking, d2.thinking), "half finished");
    }
}
