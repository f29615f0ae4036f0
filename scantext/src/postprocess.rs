//! Cleanup of raw recognizer output.

/// Return true if `c` may appear in filtered text. Newlines are handled
/// separately by [filter_text].
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | ',' | '.' | '!' | '?')
}

/// Remove unwanted characters and redundant whitespace from the raw text
/// recognized in one region.
///
/// This keeps ASCII letters, digits, spaces and the punctuation `,.!?`. A
/// newline is kept only if it is neither the first nor the last character of
/// `raw` and neither of its neighbors is a newline. Then a space is kept
/// only if it is neither the first nor the last character and does not
/// follow another space.
pub fn filter_text(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let len = chars.len();

    let allowed: Vec<char> = chars
        .iter()
        .enumerate()
        .filter(|&(idx, &c)| {
            if c == '\n' {
                idx != 0 && idx != len - 1 && chars[idx - 1] != '\n' && chars[idx + 1] != '\n'
            } else {
                is_allowed_char(c)
            }
        })
        .map(|(_, &c)| c)
        .collect();

    let len = allowed.len();
    allowed
        .iter()
        .enumerate()
        .filter(|&(idx, &c)| c != ' ' || (idx != 0 && idx != len - 1 && allowed[idx - 1] != ' '))
        .map(|(_, &c)| c)
        .collect()
}

/// Join the filtered text of each region into the final result.
///
/// Each non-empty fragment is followed by a single space. Empty fragments
/// are skipped.
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    let mut result = String::new();
    for fragment in fragments.into_iter().filter(|f| !f.is_empty()) {
        result.push_str(fragment);
        result.push(' ');
    }
    result
}

/// Remove repeated words from `text`, keeping the first occurrence of each.
///
/// Words are the non-empty substrings between spaces and are compared
/// exactly. The kept words are joined with single spaces.
pub fn unique_words(text: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    for word in text.split(' ').filter(|w| !w.is_empty()) {
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::{filter_text, join_fragments, unique_words};

    #[test]
    fn test_filter_text() {
        struct Case<'a> {
            raw: &'a str,
            expected: &'a str,
        }

        let cases = [
            Case {
                raw: "H3ll0!\n\n\nWorld??  foo",
                expected: "H3ll0!World?? foo",
            },
            // Disallowed characters only
            Case {
                raw: "#@$%^&*()_+\u{00e9}\t",
                expected: "",
            },
            Case {
                raw: "",
                expected: "",
            },
            // Isolated interior newline survives
            Case {
                raw: "line one\nline two",
                expected: "line one\nline two",
            },
            // Leading and trailing newlines are stripped
            Case {
                raw: "\nabc\n",
                expected: "abc",
            },
            // Leading spaces and runs of spaces are collapsed
            Case {
                raw: "   a    b",
                expected: "a b",
            },
            // Only the final space of a trailing run is removed
            Case {
                raw: "foo  ",
                expected: "foo ",
            },
            // Space adjacency is judged after disallowed characters are
            // removed.
            Case {
                raw: "a #b",
                expected: "a b",
            },
            Case {
                raw: "a # b",
                expected: "a b",
            },
            // Newline adjacency is judged on the raw text, before
            // disallowed characters are removed. Two newlines separated
            // only by a removed character therefore both survive and end
            // up adjacent.
            Case {
                raw: "a\n#\nb",
                expected: "a\n\nb",
            },
            Case {
                raw: "Price: 1,50.",
                expected: "Price 1,50.",
            },
        ];

        for Case { raw, expected } in cases {
            assert_eq!(filter_text(raw), expected, "input {:?}", raw);
        }
    }

    #[test]
    fn test_join_fragments() {
        assert_eq!(join_fragments(["foo", "", "bar baz"]), "foo bar baz ");
        assert_eq!(join_fragments(["", ""]), "");
        assert_eq!(join_fragments(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_unique_words() {
        struct Case<'a> {
            text: &'a str,
            expected: &'a str,
        }

        let cases = [
            Case {
                text: "cat dog cat bird dog",
                expected: "cat dog bird",
            },
            // Trailing separator, as produced by `join_fragments`.
            Case {
                text: "cat dog cat ",
                expected: "cat dog",
            },
            Case {
                text: "",
                expected: "",
            },
            Case {
                text: "    ",
                expected: "",
            },
            // Matching is case-sensitive.
            Case {
                text: "Cat cat CAT cat",
                expected: "Cat cat CAT",
            },
            Case {
                text: "single",
                expected: "single",
            },
        ];

        for Case { text, expected } in cases {
            assert_eq!(unique_words(text), expected, "input {:?}", text);
        }
    }
}
