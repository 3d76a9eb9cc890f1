//! Integration tests for the thinking filter: visible/thinking separation,
//! idempotence, and the streaming state machine across chunk boundaries.

mod init_logging;

use qwen_tui_core::{filter_thinking, StreamingThinkFilter};

/// **Scenario**: `"<think>plan</think>Hello"` yields visible `"Hello"`,
/// thinking `"plan"`.
#[test]
fn basic_plan_then_hello() {
    let (visible, thinking) = filter_thinking("<think>plan</think>Hello");
    assert_eq!(visible, "Hello");
    assert_eq!(thinking, "plan");
}

/// **Invariant**: visible output never contains a `<think>` span; thinking is
/// exactly the concatenation of span contents.
#[test]
fn visible_never_contains_think_spans() {
    let input = "start<think>one</think>middle<THINK>two\nlines</THINK>end";
    let (visible, thinking) = filter_thinking(input);
    assert!(!visible.to_lowercase().contains("<think>"));
    assert!(!visible.contains("one"));
    assert!(!visible.contains("two"));
    assert_eq!(thinking, "one\ntwo\nlines");
}

/// **Invariant**: applying the filter to an already-filtered string is the
/// identity.
#[test]
fn filter_is_idempotent() {
    let inputs = [
        "<think>a</think>Hello",
        "x<think>a</think>y<think>b</think>z",
        "\n\n\nlots of\n\n\n\nnewlines\n\n\n",
        "no tags at all",
    ];
    for input in inputs {
        let (once, _) = filter_thinking(input);
        let (twice, thinking) = filter_thinking(&once);
        assert_eq!(once, twice, "not idempotent for {:?}", input);
        assert_eq!(thinking, "", "second pass found thinking in {:?}", input);
    }
}

#[test]
fn newline_runs_collapse_to_two() {
    let (visible, _) = filter_thinking("a<think>x</think>\n\n\n\nb");
    assert!(!visible.contains("\n\n\n"));
}

/// **Scenario**: a tag split across stream chunks is still recognized; the
/// streamed visible output matches the whole-string filter.
#[test]
fn streaming_agrees_with_complete_filter() {
    let text = "intro <think>internal\nreasoning</think>visible tail";
    let (expect_visible, expect_thinking) = filter_thinking(text);

    for chunk_size in [1, 3, 7, 100] {
        let mut filter = StreamingThinkFilter::new();
        let mut visible = String::new();
        let mut thinking = String::new();
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(chunk_size) {
            let delta = filter.push(&chunk.iter().collect::<String>());
            visible.push_str(&delta.visible);
            thinking.push_str(&delta.thinking);
        }
        let tail = filter.finish();
        visible.push_str(&tail.visible);
        thinking.push_str(&tail.thinking);

        assert_eq!(visible.trim_matches('\n'), expect_visible, "chunk {}", chunk_size);
        assert_eq!(thinking.trim(), expect_thinking, "chunk {}", chunk_size);
    }
}

#[test]
fn streaming_open_tag_state_survives_chunks() {
    let mut filter = StreamingThinkFilter::new();
    assert!(!filter.in_think());
    filter.push("before <thi");
    filter.push("nk>inside");
    assert!(filter.in_think());
    filter.push("</think> after");
    assert!(!filter.in_think());
}
