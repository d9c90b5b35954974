//! Tokenizer and recursive-descent parser for the equation language.

use crate::error::{Error, Result};
use crate::expr::{DerivativeKind, Equation, Expr, GridRef, Index};
use crate::rational::Rational;

/// Parses an `Eq(lhs, rhs)` definition into an [`Equation`].
pub fn parse_equation(input: &str) -> Result<Equation> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        source: input,
        tokens,
        pos: 0,
    };
    let equation = parser.parse_eq()?;
    parser.expect_end()?;
    Ok(equation)
}

/// Parses a bare expression (no `Eq(...)` wrapper).
pub fn parse_expr(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        source: input,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Splits `tau_i_j` into `Indexed("tau", [i, j])` when every suffix is a
/// single lowercase letter or a non-negative integer.
pub fn identifier_to_expr(ident: &str) -> Expr {
    let mut parts = ident.split('_');
    let base = parts.next().unwrap_or_default();
    let suffixes: Vec<&str> = parts.collect();
    if base.is_empty() || suffixes.is_empty() {
        return Expr::Symbol(ident.to_string());
    }
    let indices: Option<Vec<Index>> = suffixes.iter().map(|s| parse_index(s)).collect();
    match indices {
        Some(indices) => Expr::Indexed(base.to_string(), indices),
        None => Expr::Symbol(ident.to_string()),
    }
}

fn parse_index(text: &str) -> Option<Index> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some(Index::Symbolic(c.to_string())),
        _ if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) => {
            text.parse().ok().map(Index::Fixed)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Rational),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(Token::Number(n)) => format!("number {n}"),
        Some(Token::Identifier(name)) => format!("identifier `{name}`"),
        Some(other) => format!("{other:?}"),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = Rational::parse_decimal(&num_str)
                .ok_or_else(|| Error::malformed(input, format!("invalid number `{num_str}`")))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            chars.next();
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Token::Power
                }
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Power,
                ',' => Token::Comma,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                other => {
                    return Err(Error::malformed(
                        input,
                        format!("unexpected character `{other}`"),
                    ))
                }
            };
            tokens.push(token);
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::malformed(self.source, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.consume() {
            Some(ref t) if *t == expected => Ok(()),
            other => Err(self.error(format!(
                "expected {expected:?}, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.error(format!("trailing input at {}", describe(Some(t))))),
        }
    }

    fn parse_eq(&mut self) -> Result<Equation> {
        match self.consume() {
            Some(Token::Identifier(name)) if name == "Eq" => {}
            other => {
                return Err(self.error(format!(
                    "expected `Eq(lhs, rhs)`, found {}",
                    describe(other.as_ref())
                )))
            }
        }
        self.expect(Token::LParen)?;
        let lhs = self.parse_expression()?;
        self.expect(Token::Comma)?;
        let rhs = self.parse_expression()?;
        self.expect(Token::RParen)?;
        Ok(Equation::new(lhs, rhs))
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_term()?];
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.consume();
                    terms.push(self.parse_term()?);
                }
                Some(Token::Minus) => {
                    self.consume();
                    terms.push(Expr::neg(self.parse_term()?));
                }
                _ => break,
            }
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Sum(terms)
        })
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut factors = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.consume();
                    factors.push(self.parse_unary()?);
                }
                Some(Token::Slash) => {
                    self.consume();
                    factors.push(Expr::recip(self.parse_unary()?));
                }
                _ => break,
            }
        }
        Ok(if factors.len() == 1 {
            factors.remove(0)
        } else {
            Expr::Product(factors)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(Expr::neg(self.parse_unary()?))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Power) = self.peek() {
            self.consume();
            // Right associative, and `a**-1` is allowed.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Power(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => {
                    return Err(self.error(format!(
                        "expected `,` or `)`, found {}",
                        describe(other.as_ref())
                    )))
                }
            }
        }
    }

    fn parse_index_argument(&mut self) -> Result<Index> {
        match self.consume() {
            Some(Token::Identifier(name)) => name
                .strip_prefix('_')
                .and_then(parse_index)
                .ok_or_else(|| self.error(format!("invalid Kronecker delta index `{name}`"))),
            other => Err(self.error(format!(
                "expected a `_i` style index, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_offset(&mut self) -> Result<i64> {
        let negative = if let Some(Token::Minus) = self.peek() {
            self.consume();
            true
        } else {
            false
        };
        match self.consume() {
            Some(Token::Number(n)) if n.is_integer() => {
                Ok(if negative { -n.numer() } else { n.numer() })
            }
            other => Err(self.error(format!(
                "expected integer grid offset, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr> {
        match name.as_str() {
            "Der" | "conser" => {
                let kind = if name == "Der" {
                    DerivativeKind::Standard
                } else {
                    DerivativeKind::Conservative
                };
                let mut args = self.parse_arguments()?;
                if args.len() < 2 {
                    return Err(self.error(format!(
                        "`{name}` needs an operand and at least one coordinate"
                    )));
                }
                let operand = args.remove(0);
                Ok(Expr::derivative(kind, operand, args))
            }
            "KroneckerDelta" => {
                let a = self.parse_index_argument()?;
                self.expect(Token::Comma)?;
                let b = self.parse_index_argument()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Delta(a, b))
            }
            "Eq" => Err(self.error("nested `Eq` is not allowed")),
            _ => Ok(Expr::Call(name, self.parse_arguments()?)),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => match self.peek() {
                Some(Token::LParen) => {
                    self.consume();
                    self.parse_call(name)
                }
                Some(Token::LBracket) => {
                    self.consume();
                    let mut offsets = vec![self.parse_offset()?];
                    while let Some(Token::Comma) = self.peek() {
                        self.consume();
                        offsets.push(self.parse_offset()?);
                    }
                    self.expect(Token::RBracket)?;
                    Ok(Expr::GridRef(GridRef {
                        array: name,
                        offsets,
                    }))
                }
                _ => Ok(identifier_to_expr(&name)),
            },
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected {}", describe(other.as_ref())))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Expr {
        Expr::symbol(name)
    }

    fn idx(base: &str, indices: &[&str]) -> Expr {
        Expr::Indexed(
            base.to_string(),
            indices.iter().map(|i| Index::symbolic(*i)).collect(),
        )
    }

    #[test]
    fn parses_wave_equation() {
        let eq = parse_equation("Eq(Der(phi,t), -c_j*Der(phi,x_j))").expect("should parse");
        assert_eq!(
            eq.lhs,
            Expr::derivative(DerivativeKind::Standard, sym("phi"), vec![sym("t")])
        );
        assert_eq!(
            eq.rhs,
            Expr::neg(Expr::Product(vec![
                idx("c", &["j"]),
                Expr::derivative(DerivativeKind::Standard, sym("phi"), vec![idx("x", &["j"])]),
            ]))
        );
    }

    #[test]
    fn parses_kronecker_delta_and_conservative_derivative() {
        let eq = parse_equation(
            "Eq(Der(rhou_i,t) ,-conser(rhou_i*u_j + p* KroneckerDelta(_i,_j),x_j))",
        )
        .expect("should parse");
        let mut has_delta = false;
        let mut has_conser = false;
        eq.rhs.walk(&mut |e| match e {
            Expr::Delta(a, b) => {
                has_delta = *a == Index::symbolic("i") && *b == Index::symbolic("j")
            }
            Expr::Derivative { kind, .. } => {
                has_conser |= *kind == DerivativeKind::Conservative
            }
            _ => {}
        });
        assert!(has_delta && has_conser);
    }

    #[test]
    fn identifiers_split_only_on_valid_indices() {
        assert_eq!(identifier_to_expr("tau_i_j"), idx("tau", &["i", "j"]));
        assert_eq!(
            identifier_to_expr("u_0"),
            Expr::Indexed("u".into(), vec![Index::Fixed(0)])
        );
        assert_eq!(identifier_to_expr("rho_inf"), sym("rho_inf"));
        assert_eq!(identifier_to_expr("Minf"), sym("Minf"));
        assert_eq!(identifier_to_expr("M_PI"), sym("M_PI"));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let expr = parse_expr("-a**2").expect("should parse");
        assert_eq!(
            expr,
            Expr::neg(Expr::Power(Box::new(sym("a")), Box::new(Expr::int(2))))
        );
        let expr = parse_expr("T**(2/3)").expect("should parse");
        assert!(matches!(expr, Expr::Power(..)));
    }

    #[test]
    fn decimals_become_exact_rationals() {
        let expr = parse_expr("0.5*c").expect("should parse");
        assert_eq!(
            expr,
            Expr::Product(vec![Expr::Number(Rational::new(1, 2)), sym("c")])
        );
    }

    #[test]
    fn parses_grid_references() {
        let expr = parse_expr("phi[-1, 2]").expect("should parse");
        assert_eq!(
            expr,
            Expr::GridRef(GridRef {
                array: "phi".into(),
                offsets: vec![-1, 2],
            })
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["Eq(a)", "Eq(a, b", "a + b", "Eq(a, b) c", "Eq(a, $)", "Eq(a, Der(u))"] {
            let err = parse_equation(bad).expect_err("should fail");
            assert!(
                matches!(err, Error::MalformedEquation { .. }),
                "unexpected error for {bad}: {err}"
            );
        }
    }

    #[test]
    fn display_output_parses_back_to_same_tree() {
        let source = "Eq(Der(rhoE,t),-conser((p+rhoE)*u_j,x_j) -Der(q_i,x_i) + Der(u_i*tau_i_j ,x_j) )";
        let eq = parse_equation(source).expect("should parse");
        let reparsed = parse_equation(&eq.to_string()).expect("display should parse");
        assert_eq!(reparsed.to_string(), eq.to_string());
    }
}
