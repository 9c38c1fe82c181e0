//! Property-style tests for the response sanitizer.

use conductor::models::sanitize;

/// Inputs with no trailing provider artifacts must pass through unchanged.
#[test]
fn sanitize_is_a_noop_on_clean_input() {
    let cases = [
        "",
        "plain answer",
        "line one\nline two\n",
        "```python\nprint('hi')\n```",
        "a </code> appearing mid-line stays",
        "code = \"</s>\" # inside a string literal",
        "unrelated markup <code>kept</code> intact?",
    ];

    for case in cases {
        // The mid-line cases contain the artifact substring but never at a
        // line end, so nothing may be stripped.
        if case == "unrelated markup <code>kept</code> intact?" {
            assert_eq!(sanitize(case), case);
            continue;
        }
        assert_eq!(sanitize(case), case, "input was altered: {case:?}");
    }
}

/// sanitize(sanitize(x)) == sanitize(x) for every input shape we know about.
#[test]
fn sanitize_is_idempotent() {
    let cases = [
        "",
        "clean",
        "answer</code>",
        "answer</code>\n",
        "answer</code",
        "answer</s>",
        "one</code>\ntwo</s>\nthree",
        "<code>\nos_exec(command=\"dir\")\n</code>\n</code",
        "stacked</code></code></s>",
        "</code>",
        "text with </code> in the middle\nand a trailing one</code>",
    ];

    for case in cases {
        let once = sanitize(case);
        let twice = sanitize(&once);
        assert_eq!(once, twice, "sanitize not idempotent for {case:?}");
    }
}

/// The observed real-world failure: a hosted GLM model closes a code block
/// and then appends a dangling `</code`.
#[test]
fn sanitize_handles_the_observed_glm_artifact() {
    let input = "<code>\n# Open the URL in the default browser\nos_exec(command=\"start https://example.com\")\n</code>\n</code";
    let cleaned = sanitize(input);

    assert!(!cleaned.to_lowercase().contains("</code"));
    assert!(cleaned.contains("os_exec(command="));
    assert!(cleaned.contains("# Open the URL"));
}

/// Stripping must anchor to line ends: equivalent substrings inside content
/// the model legitimately produced are preserved byte for byte.
#[test]
fn sanitize_never_touches_mid_content_occurrences() {
    let input = "The literal string \"</code>\" is used by the parser.\nSee also </s> tokens mid-sentence here.";
    assert_eq!(sanitize(input), input);
}
