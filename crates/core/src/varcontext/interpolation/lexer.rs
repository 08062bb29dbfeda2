use super::InterpolationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Variable or function name; may contain dots (`request.plan_id`)
    Ident(String),
    /// Quoted string literal, escapes resolved. May itself hold `${...}`.
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // Comparison
    EqEq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    // Logical
    AndAnd,
    OrOr,
    Bang,
    /// The `}` closing the interpolation
    End,
}

/// Lex one interpolation body starting just after `${`.
///
/// Returns the tokens (terminated by [`Token::End`]) and the char index just
/// past the closing `}`.
pub fn lex_interpolation(
    chars: &[char],
    start: usize,
) -> Result<(Vec<Token>, usize), InterpolationError> {
    let mut tokens = Vec::new();
    let mut pos = start;

    loop {
        if pos >= chars.len() {
            if tokens.is_empty() {
                return Err(InterpolationError::Parse("expected expression".into()));
            }
            return Err(InterpolationError::Parse(
                "unterminated interpolation, expected '}'".into(),
            ));
        }
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c == '}' {
            tokens.push(Token::End);
            return Ok((tokens, pos + 1));
        }

        // String literal
        if c == '"' {
            pos += 1;
            let mut s = String::new();
            // nested `${ ... }` inside a literal may contain quotes of its own
            let mut depth = 0usize;
            loop {
                if pos >= chars.len() {
                    return Err(InterpolationError::Parse(
                        "unterminated string literal".into(),
                    ));
                }
                let sc = chars[pos];
                if sc == '"' && depth == 0 {
                    pos += 1;
                    break;
                }
                if sc == '\\' && depth == 0 {
                    pos += 1;
                    if pos >= chars.len() {
                        return Err(InterpolationError::Parse(
                            "unterminated escape in string".into(),
                        ));
                    }
                    match chars[pos] {
                        '"' => s.push('"'),
                        '\\' => s.push('\\'),
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                    pos += 1;
                    continue;
                }
                if sc == '$' && pos + 1 < chars.len() && chars[pos + 1] == '{' {
                    depth += 1;
                    s.push_str("${");
                    pos += 2;
                    continue;
                }
                if sc == '}' && depth > 0 {
                    depth -= 1;
                }
                s.push(sc);
                pos += 1;
            }
            tokens.push(Token::Str(s));
            continue;
        }

        // Number
        if c.is_ascii_digit() {
            let begin = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos + 1 < chars.len() && chars[pos] == '.' && chars[pos + 1].is_ascii_digit() {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let s: String = chars[begin..pos].iter().collect();
                let f: f64 = s.parse().map_err(|_| {
                    InterpolationError::Parse(format!("invalid number '{s}'"))
                })?;
                tokens.push(Token::Float(f));
            } else {
                let s: String = chars[begin..pos].iter().collect();
                let n: i64 = s.parse().map_err(|_| {
                    InterpolationError::Parse(format!("invalid integer '{s}'"))
                })?;
                tokens.push(Token::Int(n));
            }
            continue;
        }

        // Identifier (dotted)
        if c.is_ascii_alphabetic() || c == '_' {
            let begin = pos;
            while pos < chars.len()
                && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_' || chars[pos] == '.')
            {
                pos += 1;
            }
            let word: String = chars[begin..pos].iter().collect();
            let word = word.trim_end_matches('.').to_string();
            pos = begin + word.chars().count();
            tokens.push(match word.as_str() {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                _ => Token::Ident(word),
            });
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (tok, width) = match (c, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::Neq, 2),
            ('<', Some('=')) => (Token::Lte, 2),
            ('>', Some('=')) => (Token::Gte, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            (other, _) => {
                return Err(InterpolationError::Parse(format!(
                    "unexpected character '{other}'"
                )))
            }
        };
        tokens.push(tok);
        pos += width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let chars: Vec<char> = src.chars().collect();
        lex_interpolation(&chars, 0).unwrap().0
    }

    #[test]
    fn dotted_identifiers_and_calls() {
        assert_eq!(
            lex("str.truncate(2, request.plan_id)}"),
            vec![
                Token::Ident("str.truncate".into()),
                Token::LParen,
                Token::Int(2),
                Token::Comma,
                Token::Ident("request.plan_id".into()),
                Token::RParen,
                Token::End,
            ]
        );
    }

    #[test]
    fn string_literal_keeps_nested_interpolation() {
        assert_eq!(
            lex(r#""message ${"a" == "b"}"}"#),
            vec![Token::Str(r#"message ${"a" == "b"}"#.into()), Token::End]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            lex("a >= 1 && !b}"),
            vec![
                Token::Ident("a".into()),
                Token::Gte,
                Token::Int(1),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("b".into()),
                Token::End,
            ]
        );
    }

    #[test]
    fn empty_body_expects_expression() {
        let chars: Vec<char> = "".chars().collect();
        let err = lex_interpolation(&chars, 0).unwrap_err();
        assert!(err.to_string().contains("expected expression"));
    }
}
