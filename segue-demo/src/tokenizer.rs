//! Command-line tokenizer.
//!
//! Splits a line on whitespace, with single or double quotes grouping a
//! span into one token and backslashes escaping the character after them
//! (inside and outside quotes). A quoted span always forms its own token,
//! even with no whitespace around it.

pub fn tokenize_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    };

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => match c {
                '\\' => {
                    // Escaped character inside quotes, the backslash drops.
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ if c == q => {
                    // Closing quote: the span is a token of its own.
                    flush(&mut current, &mut tokens);
                    quote = None;
                }
                _ => current.push(c),
            },
            None => match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    // A trailing backslash is ignored.
                }
                '"' | '\'' => {
                    // Whatever came before the quote is its own token.
                    flush(&mut current, &mut tokens);
                    quote = Some(c);
                }
                _ if c.is_whitespace() => flush(&mut current, &mut tokens),
                _ => current.push(c),
            },
        }
    }

    // An unterminated quote swallows the rest of the line as one token.
    flush(&mut current, &mut tokens);
    tokens
}

#[cfg(test)]
mod tests {
    use super::tokenize_line;

    fn tokens(line: &str) -> Vec<String> {
        tokenize_line(line)
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokens("play file.ogg now"), ["play", "file.ogg", "now"]);
        assert_eq!(tokens("  spaced \t out  "), ["spaced", "out"]);
    }

    #[test]
    fn empty_line_yields_nothing() {
        assert!(tokens("").is_empty());
        assert!(tokens("   ").is_empty());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(tokens("play \"my file.ogg\""), ["play", "my file.ogg"]);
        assert_eq!(tokens("play 'my file.ogg'"), ["play", "my file.ogg"]);
    }

    #[test]
    fn quoted_span_is_its_own_token() {
        assert_eq!(tokens("abc\"def ghi\"jkl"), ["abc", "def ghi", "jkl"]);
    }

    #[test]
    fn backslash_escapes_delimiters() {
        assert_eq!(tokens("one\\ token"), ["one token"]);
        assert_eq!(tokens("say \\\"hi\\\""), ["say", "\"hi\""]);
        assert_eq!(tokens("a\\\\b"), ["a\\b"]);
    }

    #[test]
    fn backslash_escapes_quote_inside_quotes() {
        assert_eq!(tokens("\"she said \\\"hi\\\"\""), ["she said \"hi\""]);
    }

    #[test]
    fn unterminated_quote_takes_the_rest() {
        assert_eq!(tokens("play \"rest of line"), ["play", "rest of line"]);
    }

    #[test]
    fn trailing_backslash_is_dropped() {
        assert_eq!(tokens("abc\\"), ["abc"]);
    }

    #[test]
    fn empty_quotes_yield_no_token() {
        assert_eq!(tokens("a \"\" b"), ["a", "b"]);
    }

    #[test]
    fn mixed_quotes_nest_literally() {
        assert_eq!(tokens("\"it's fine\""), ["it's fine"]);
    }
}
