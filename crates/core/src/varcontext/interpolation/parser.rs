use serde_json::Value;

use super::lexer::{lex_interpolation, Token};
use super::InterpolationError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// String literal; evaluated as a nested template.
    Text(Template),
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(String),
    Expr(Expr),
}

/// A parsed template: literal text interleaved with `${...}` expressions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub parts: Vec<Part>,
}

impl Template {
    /// The lone expression when the template is exactly one `${...}`.
    pub fn single_expr(&self) -> Option<&Expr> {
        match self.parts.as_slice() {
            [Part::Expr(e)] => Some(e),
            _ => None,
        }
    }
}

/// Split a template into literal and expression parts. `$${` yields a
/// literal `${`.
pub fn parse_template(src: &str) -> Result<Template, InterpolationError> {
    let chars: Vec<char> = src.chars().collect();
    let mut parts = Vec::new();
    let mut lit = String::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        if c == '$' && chars.get(pos + 1) == Some(&'$') && chars.get(pos + 2) == Some(&'{') {
            lit.push_str("${");
            pos += 3;
            continue;
        }
        if c == '$' && chars.get(pos + 1) == Some(&'{') {
            if !lit.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut lit)));
            }
            let (tokens, next) = lex_interpolation(&chars, pos + 2)?;
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.parse_expr()?;
            parser.expect(Token::End, "'}'")?;
            parts.push(Part::Expr(expr));
            pos = next;
            continue;
        }
        lit.push(c);
        pos += 1;
    }
    if !lit.is_empty() {
        parts.push(Part::Literal(lit));
    }
    Ok(Template { parts })
}

// ──────────────────────────────────────────────
// Expression parser
// ──────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Token, label: &str) -> Result<(), InterpolationError> {
        if self.peek() == &want {
            self.advance();
            Ok(())
        } else {
            Err(InterpolationError::Parse(format!(
                "expected {label}, got {:?}",
                self.peek()
            )))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, InterpolationError> {
        let cond = self.parse_or()?;
        if self.peek() == &Token::Question {
            self.advance();
            let yes = self.parse_expr()?;
            self.expect(Token::Colon, "':'")?;
            let no = self.parse_expr()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(yes),
                Box::new(no),
            ));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, InterpolationError> {
        let mut left = self.parse_and()?;
        while self.peek() == &Token::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, InterpolationError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == &Token::AndAnd {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, InterpolationError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Token::EqEq => BinOp::Eq,
            Token::Neq => BinOp::Neq,
            Token::Lt => BinOp::Lt,
            Token::Lte => BinOp::Lte,
            Token::Gt => BinOp::Gt,
            Token::Gte => BinOp::Gte,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, InterpolationError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, InterpolationError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, InterpolationError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            Token::Bang => {
                self.advance();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, InterpolationError> {
        let mut expr = self.parse_primary()?;
        while self.peek() == &Token::LBracket {
            self.advance();
            let idx = self.parse_expr()?;
            self.expect(Token::RBracket, "']'")?;
            expr = Expr::Index(Box::new(expr), Box::new(idx));
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, InterpolationError> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
            Token::Str(s) => Ok(Expr::Text(parse_template(&s)?)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek() != &Token::LParen {
                    return Ok(Expr::Var(name));
                }
                self.advance();
                let mut args = Vec::new();
                if self.peek() != &Token::RParen {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.peek() == &Token::Comma {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Token::RParen, "')'")?;
                Ok(Expr::Call(name, args))
            }
            other => Err(InterpolationError::Parse(format!(
                "expected expression, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_single_literal() {
        let t = parse_template("foo").unwrap();
        assert_eq!(t.parts, vec![Part::Literal("foo".into())]);
        assert!(t.single_expr().is_none());
    }

    #[test]
    fn escaped_interpolation_stays_literal() {
        let t = parse_template("$${33}").unwrap();
        assert_eq!(t.parts, vec![Part::Literal("${33}".into())]);
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        let t = parse_template("${1 + 2 * 3}").unwrap();
        let expected = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Literal(Value::from(1))),
            Box::new(Expr::Binary(
                BinOp::Mul,
                Box::new(Expr::Literal(Value::from(2))),
                Box::new(Expr::Literal(Value::from(3))),
            )),
        );
        assert_eq!(t.single_expr(), Some(&expected));
    }

    #[test]
    fn conditional_and_index() {
        let t = parse_template(r#"${flag ? m["k"] : list[0]}"#).unwrap();
        match t.single_expr() {
            Some(Expr::Conditional(c, y, n)) => {
                assert_eq!(**c, Expr::Var("flag".into()));
                assert!(matches!(**y, Expr::Index(_, _)));
                assert!(matches!(**n, Expr::Index(_, _)));
            }
            other => panic!("unexpected parse {other:?}"),
        }
    }

    #[test]
    fn mixed_template_has_three_parts() {
        let t = parse_template("a-${b}-c").unwrap();
        assert_eq!(t.parts.len(), 3);
    }

    #[test]
    fn unterminated_interpolation_is_error() {
        let err = parse_template("${").unwrap_err();
        assert!(err.to_string().contains("expected expression"));
        assert!(parse_template("${1 +}").is_err());
    }
}
