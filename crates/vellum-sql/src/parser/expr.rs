//! Pratt expression parser.
//!
//! Binding powers, loosest to tightest: OR, AND, comparisons
//! (including IN / BETWEEN / IS), additive (`+ - | ^`), multiplicative
//! (`* / % &`), unary. BETWEEN bounds parse at additive level so the
//! mandatory AND stays part of the BETWEEN.

use vellum_core::{Value, ValueType};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::parser::{ParseError, ParseResult, Parser};
use crate::token::Token;

/// Words that may not start a path, so that clause keywords terminate
/// expressions instead of being swallowed as field references.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "BETWEEN", "IS", "NULL", "TRUE", "FALSE",
    "CAST", "AS", "ORDER", "BY", "ASC", "DESC", "LIMIT", "OFFSET", "INSERT", "INTO", "VALUES",
    "UPDATE", "SET", "UNSET", "DELETE", "CREATE", "DROP", "TABLE", "INDEX", "UNIQUE", "IF",
    "EXISTS", "ON", "PRIMARY", "DEFAULT", "BEGIN", "COMMIT", "ROLLBACK", "REINDEX",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| word.eq_ignore_ascii_case(kw))
}

impl Parser {
    /// Parses an expression with operators binding at least as tightly
    /// as `min_bp`.
    pub(crate) fn parse_expr(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        loop {
            // Postfix predicates sit at comparison level.
            if min_bp <= 3 {
                if self.peek().is_keyword("IS") {
                    self.advance();
                    let negated = self.eat_keyword("NOT");
                    self.expect_keyword("NULL")?;
                    left = Expr::IsNull {
                        expr: Box::new(left),
                        negated,
                    };
                    continue;
                }
                if self.peek().is_keyword("BETWEEN") {
                    self.advance();
                    let low = self.parse_expr(4)?;
                    self.expect_keyword("AND")?;
                    let high = self.parse_expr(4)?;
                    left = Expr::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                    };
                    continue;
                }
                if self.peek().is_keyword("IN")
                    || (self.peek().is_keyword("NOT") && self.peek_at(1).is_keyword("IN"))
                {
                    let negated = self.eat_keyword("NOT");
                    self.expect_keyword("IN")?;
                    self.expect(&Token::LParen)?;
                    let mut list = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            list.push(self.parse_expr(0)?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                        self.expect(&Token::RParen)?;
                    }
                    left = Expr::InList {
                        expr: Box::new(left),
                        list,
                        negated,
                    };
                    continue;
                }
            }

            let Some(op) = self.peek_binary_op() else {
                return Ok(left);
            };
            if op.precedence() < min_bp {
                return Ok(left);
            }

            self.advance();
            let right = self.parse_expr(op.precedence() + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek() {
            Token::Eq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Mod),
            Token::Ampersand => Some(BinaryOp::BitAnd),
            Token::Pipe => Some(BinaryOp::BitOr),
            Token::Caret => Some(BinaryOp::BitXor),
            token if token.is_keyword("AND") => Some(BinaryOp::And),
            token if token.is_keyword("OR") => Some(BinaryOp::Or),
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        if self.eat_keyword("NOT") {
            let expr = self.parse_expr(3)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        if self.eat(&Token::Minus) {
            let expr = self.parse_primary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().clone() {
            Token::Integer(i) => {
                self.advance();
                Ok(Expr::Literal(Value::Integer(i)))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Double(n)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            Token::Question => {
                self.advance();
                Ok(Expr::Param(self.next_param()))
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr(0)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RBracket)?;
                }
                Ok(Expr::Array(items))
            }
            Token::LBrace => self.parse_object_literal(),
            Token::Ident(word) => {
                if word.eq_ignore_ascii_case("TRUE") {
                    self.advance();
                    return Ok(Expr::Literal(Value::Bool(true)));
                }
                if word.eq_ignore_ascii_case("FALSE") {
                    self.advance();
                    return Ok(Expr::Literal(Value::Bool(false)));
                }
                if word.eq_ignore_ascii_case("NULL") {
                    self.advance();
                    return Ok(Expr::Literal(Value::Null));
                }
                if word.eq_ignore_ascii_case("CAST") {
                    self.advance();
                    return self.parse_cast();
                }

                // A function call: only pk() is defined.
                if self.peek_at(1) == &Token::LParen {
                    if word.eq_ignore_ascii_case("pk") {
                        self.advance();
                        self.expect(&Token::LParen)?;
                        self.expect(&Token::RParen)?;
                        return Ok(Expr::Pk);
                    }
                    return Err(ParseError::Unsupported(format!(
                        "unknown function {}()",
                        word
                    )));
                }

                if is_reserved(&word) {
                    return Err(self.unexpected("an expression"));
                }
                Ok(Expr::Path(self.parse_path()?))
            }
            Token::QuotedIdent(_) => Ok(Expr::Path(self.parse_path()?)),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_cast(&mut self) -> ParseResult<Expr> {
        self.expect(&Token::LParen)?;
        let expr = self.parse_expr(0)?;
        self.expect_keyword("AS")?;
        let type_name = self.expect_ident()?;
        let target = ValueType::from_sql_name(&type_name)
            .ok_or(ParseError::Unsupported(format!(
                "unknown type {} in CAST",
                type_name
            )))?;
        self.expect(&Token::RParen)?;
        Ok(Expr::Cast {
            expr: Box::new(expr),
            target,
        })
    }

    fn parse_object_literal(&mut self) -> ParseResult<Expr> {
        self.expect(&Token::LBrace)?;
        let mut pairs = Vec::new();
        if !self.eat(&Token::RBrace) {
            loop {
                let name = match self.advance() {
                    Token::String(s) => s,
                    Token::Ident(s) | Token::QuotedIdent(s) => s,
                    _ => {
                        self.pos_back();
                        return Err(self.unexpected("a field name"));
                    }
                };
                self.expect(&Token::Colon)?;
                let value = self.parse_expr(0)?;
                pairs.push((name, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RBrace)?;
        }
        Ok(Expr::Object(pairs))
    }

    fn pos_back(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }
}
