// src/template/condition/lexer.rs

//! Tokenizer for condition expressions.

use crate::errors::{ProbeDagError, Result};
use crate::template::placeholder::placeholder_at;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
    Num(f64),
    /// A whole-word `{name}` placeholder.
    Var(String),
    /// Quoted string or bare word; may contain placeholders that are
    /// interpolated at evaluation time.
    Text(String),
}

/// Characters that end a bare word.
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ',' | '=' | '!' | '<' | '>' | '&' | '|' | '"' | '\'')
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = src;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        let (token, len) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            ',' => (Token::Comma, 1),
            '=' if rest.starts_with("==") => (Token::Eq, 2),
            '!' if rest.starts_with("!=") => (Token::Ne, 2),
            '!' => (Token::Not, 1),
            '<' if rest.starts_with("<=") => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if rest.starts_with(">=") => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '&' if rest.starts_with("&&") => (Token::And, 2),
            '|' if rest.starts_with("||") => (Token::Or, 2),
            '"' | '\'' => lex_quoted(rest, c)?,
            '=' | '&' | '|' => {
                return Err(ProbeDagError::Condition(format!(
                    "unexpected '{c}' in condition `{src}`"
                )));
            }
            _ => lex_word(rest),
        };

        tokens.push(token);
        rest = &rest[len..];
    }

    Ok(tokens)
}

fn lex_quoted(s: &str, quote: char) -> Result<(Token, usize)> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c if c == quote => return Ok((Token::Text(out), i + c.len_utf8())),
            c => out.push(c),
        }
    }

    Err(ProbeDagError::Condition(format!(
        "unterminated string literal in `{s}`"
    )))
}

fn lex_word(s: &str) -> (Token, usize) {
    let mut len = 0;
    let mut has_placeholder = false;

    while len < s.len() {
        let rest = &s[len..];
        if let Some((_, placeholder_len)) = placeholder_at(rest) {
            has_placeholder = true;
            len += placeholder_len;
            continue;
        }
        match rest.chars().next() {
            Some(c) if !is_delimiter(c) => len += c.len_utf8(),
            _ => break,
        }
    }

    let word = &s[..len];

    if has_placeholder {
        if let Some((name, placeholder_len)) = placeholder_at(word) {
            if placeholder_len == word.len() {
                return (Token::Var(name.to_string()), len);
            }
        }
        return (Token::Text(word.to_string()), len);
    }

    let token = match word {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "true" | "True" => Token::True,
        "false" | "False" => Token::False,
        "null" | "None" => Token::Null,
        _ => match word.parse::<f64>() {
            Ok(n) if word.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') => {
                Token::Num(n)
            }
            _ => Token::Text(word.to_string()),
        },
    };

    (token, len)
}
