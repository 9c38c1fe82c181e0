//! Post-processing of raw model output.
//!
//! Some hosted GLM models append stray closing-markup artifacts after
//! generated code blocks: `</code>`, an unterminated `</code`, or `</s>`,
//! at end of line or end of output. [`sanitize`] strips exactly those.
//!
//! The patterns anchor to end-of-line/end-of-string. An equivalent substring
//! appearing mid-content (for example inside a string literal the model
//! legitimately generated) is never touched -- over-eager stripping would
//! silently corrupt valid output.

use std::sync::LazyLock;

use regex::Regex;

/// Artifacts stripped when trailing at end of line, possibly stacked
/// (`...</code>\n</code`). `</code>?` also covers the unterminated form.
static LINE_TRAILING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:(?:</code>?|</s>)\s*)+(\n|$)").unwrap());

/// Unterminated `</code` at the very end of the output (the terminated forms
/// are already covered by [`LINE_TRAILING`]'s `$` alternative).
static END_TRAILING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:</code>?|</s>)\s*$").unwrap());

/// Strip provider-specific trailing closing-markup artifacts.
///
/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)`. Clean input passes
/// through unchanged.
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = LINE_TRAILING.replace_all(text, "$1").into_owned();
    // Stripping a line-trailing artifact can expose another one at the end of
    // the output ("</code>\n</code" collapses to "</code"); sweep the tail
    // until stable.
    while let Some(m) = END_TRAILING.find(&out) {
        out.truncate(m.start());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_input_is_untouched() {
        let text = "Here is the plan:\n1. open the file\n2. run the tests\n";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn strips_trailing_code_tag_at_end_of_output() {
        let text = "os_exec(command=\"Get-Date\")\n</code>";
        assert_eq!(sanitize(text), "os_exec(command=\"Get-Date\")\n");
    }

    #[test]
    fn strips_unterminated_code_tag() {
        // The artifact observed in the wild: a closed tag on its own line
        // followed by an unterminated one.
        let text = "<code>\nos_exec(command=\"Start-Process 'https://example.com'\")\n</code>\n</code";
        let cleaned = sanitize(text);
        assert!(!cleaned.contains("</code"), "artifact survived: {cleaned:?}");
        assert!(cleaned.contains("os_exec"));
    }

    #[test]
    fn strips_trailing_s_tag_at_line_end() {
        let text = "first line</s>\nsecond line";
        assert_eq!(sanitize(text), "first line\nsecond line");
    }

    #[test]
    fn mid_line_tag_is_preserved() {
        // The tag is legitimate content here, not a trailing artifact.
        let text = "print(\"</code> is an html-ish token\") # explanation";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn tag_inside_quoted_string_at_line_start_is_preserved() {
        let text = "html = \"</s>\" + suffix\ndone";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn idempotent_on_stacked_artifacts() {
        let cases = [
            "body</code>\n</code",
            "body</code></code>\n",
            "a</s>\nb</code>",
            "clean text, nothing to strip",
            "",
        ];
        for case in cases {
            let once = sanitize(case);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {case:?}");
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(sanitize(""), "");
    }
}
