//! G-code line tokenizer
//!
//! Splits one line into typed tokens. The tokenizer never fails: anything
//! it cannot read becomes a `Malformed` or `Unknown` token and the
//! interpreter skips it.

use std::borrow::Cow;

/// One lexical element of a G-code line
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A letter with a well-formed number, e.g. `X-1.5`
    Word { letter: char, value: f64 },
    /// A letter whose number could not be read, e.g. `X1.2.3` or `X-`
    Malformed { letter: char, text: String },
    /// A character that does not start a word
    Unknown(char),
}

/// Remove `( ... )` and `; ...` comments
///
/// An unterminated `(` comments out the rest of the line.
pub fn strip_comments(line: &str) -> Cow<'_, str> {
    if !line.contains(['(', ';']) {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut in_paren = false;
    for c in line.chars() {
        match (in_paren, c) {
            (true, ')') => {
                in_paren = false;
                out.push(' ');
            }
            (true, _) => {}
            (false, '(') => in_paren = true,
            (false, ';') => break,
            (false, _) => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Tokenize a comment-free line
///
/// Letters are upper-cased. Whitespace between a letter and its number is
/// tolerated.
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if !c.is_ascii_alphabetic() {
            tokens.push(Token::Unknown(c));
            continue;
        }

        let letter = c.to_ascii_uppercase();
        while chars.peek().is_some_and(|n| n.is_whitespace()) {
            chars.next();
        }

        let mut text = String::new();
        if let Some(&sign) = chars.peek() {
            if sign == '+' || sign == '-' {
                text.push(sign);
                chars.next();
            }
        }
        while let Some(&n) = chars.peek() {
            if n.is_ascii_digit() || n == '.' {
                text.push(n);
                chars.next();
            } else {
                break;
            }
        }

        match parse_number(&text) {
            Some(value) => tokens.push(Token::Word { letter, value }),
            None => tokens.push(Token::Malformed { letter, text }),
        }
    }

    tokens
}

fn parse_number(text: &str) -> Option<f64> {
    let digits = text.trim_start_matches(['+', '-']);
    if digits.is_empty() || digits == "." || digits.matches('.').count() > 1 {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}
