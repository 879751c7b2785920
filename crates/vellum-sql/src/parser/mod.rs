//! SQL parser.
//!
//! A hand-written recursive-descent parser over the lexer's token
//! stream. Statements are separated by `;`; expressions use Pratt
//! parsing (see [`expr`]).

mod expr;

use thiserror::Error;
use vellum_common::Error as DbError;
use vellum_core::{Path, Segment, ValueType};

use crate::ast::{ColumnDef, InsertRows, Projection, SelectStmt, Statement, UpdateStmt};
use crate::lexer::Lexer;
use crate::token::Token;

/// Errors produced while parsing SQL text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A character the lexer does not understand.
    #[error("unexpected character {0:?}")]
    InvalidCharacter(char),

    /// A string or quoted identifier without its closing quote.
    #[error("unterminated string")]
    UnterminatedString,

    /// A numeric literal that does not fit its type.
    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    /// A token that does not fit the grammar.
    #[error("unexpected token {found}, expected {expected}")]
    UnexpectedToken {
        /// The offending token.
        found: String,
        /// What the parser was looking for.
        expected: String,
    },

    /// A valid token in an unsupported position.
    #[error("unsupported syntax: {0}")]
    Unsupported(String),
}

impl From<ParseError> for DbError {
    fn from(e: ParseError) -> Self {
        DbError::Parse(e.to_string())
    }
}

pub(crate) type ParseResult<T> = Result<T, ParseError>;

/// SQL parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl Parser {
    /// Creates a parser over `sql`.
    pub fn new(sql: &str) -> Result<Self, DbError> {
        let tokens = Lexer::tokenize(sql)?;
        Ok(Parser {
            tokens,
            pos: 0,
            params: 0,
        })
    }

    /// Parses a semicolon-separated list of statements.
    pub fn parse(sql: &str) -> Result<Vec<Statement>, DbError> {
        let mut parser = Parser::new(sql)?;
        let mut statements = Vec::new();
        loop {
            while parser.eat(&Token::Semicolon) {}
            if parser.peek() == &Token::Eof {
                return Ok(statements);
            }
            statements.push(parser.parse_statement()?);
            match parser.peek() {
                Token::Semicolon | Token::Eof => {}
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: other.to_string(),
                        expected: "';' or end of input".into(),
                    }
                    .into())
                }
            }
        }
    }

    /// Parses exactly one statement.
    pub fn parse_one(sql: &str) -> Result<Statement, DbError> {
        let mut statements = Parser::parse(sql)?;
        if statements.len() != 1 {
            return Err(DbError::Parse(format!(
                "expected one statement, got {}",
                statements.len()
            )));
        }
        Ok(statements.remove(0))
    }

    /// Parses a standalone expression.
    pub fn parse_expression(sql: &str) -> Result<crate::ast::Expr, DbError> {
        let mut parser = Parser::new(sql)?;
        let expr = parser.parse_expr(0)?;
        parser.expect_eof()?;
        Ok(expr)
    }

    // -----------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: &Token) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect_eof(&mut self) -> ParseResult<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            _ => Err(self.unexpected("end of input")),
        }
    }

    pub(crate) fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Token::Ident(_) | Token::QuotedIdent(_) => {
                let Some(name) = self.advance().as_ident().map(str::to_string) else {
                    unreachable!();
                };
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            found: self.peek().to_string(),
            expected: expected.to_string(),
        }
    }

    pub(crate) fn next_param(&mut self) -> usize {
        let index = self.params;
        self.params += 1;
        index
    }

    /// Parses a dotted path: `ident(.ident | .index | .`quoted`)*`.
    pub(crate) fn parse_path(&mut self) -> ParseResult<Path> {
        let mut segments = vec![Segment::Field(self.expect_ident()?)];
        while self.eat(&Token::Dot) {
            match self.advance() {
                Token::Ident(name) | Token::QuotedIdent(name) => {
                    segments.push(Segment::Field(name));
                }
                Token::Integer(i) if i >= 0 => {
                    segments.push(Segment::Index(i as usize));
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected("a path segment"));
                }
            }
        }
        Ok(Path(segments))
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        if self.eat_keyword("BEGIN") {
            let mut writable = true;
            if self.eat_keyword("READ") {
                self.expect_keyword("ONLY")?;
                writable = false;
            }
            return Ok(Statement::Begin { writable });
        }
        if self.eat_keyword("COMMIT") {
            return Ok(Statement::Commit);
        }
        if self.eat_keyword("ROLLBACK") {
            return Ok(Statement::Rollback);
        }
        if self.eat_keyword("CREATE") {
            return self.parse_create();
        }
        if self.eat_keyword("DROP") {
            return self.parse_drop();
        }
        if self.eat_keyword("REINDEX") {
            let target = match self.peek() {
                Token::Ident(_) | Token::QuotedIdent(_) => Some(self.expect_ident()?),
                _ => None,
            };
            return Ok(Statement::Reindex { target });
        }
        if self.eat_keyword("INSERT") {
            return self.parse_insert();
        }
        if self.eat_keyword("SELECT") {
            return self.parse_select().map(Statement::Select);
        }
        if self.eat_keyword("UPDATE") {
            return self.parse_update().map(Statement::Update);
        }
        if self.eat_keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let table = self.expect_ident()?;
            let filter = self.parse_where()?;
            return Ok(Statement::Delete { table, filter });
        }
        Err(self.unexpected("a statement"))
    }

    fn parse_create(&mut self) -> ParseResult<Statement> {
        if self.eat_keyword("TABLE") {
            let if_not_exists = self.parse_if_not_exists()?;
            let name = self.expect_ident()?;
            let mut columns = Vec::new();
            if self.eat(&Token::LParen) {
                loop {
                    columns.push(self.parse_column_def()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen)?;
            }
            return Ok(Statement::CreateTable {
                name,
                if_not_exists,
                columns,
            });
        }

        let unique = self.eat_keyword("UNIQUE");
        self.expect_keyword("INDEX")?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.expect_ident()?;
        self.expect_keyword("ON")?;
        let table = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let path = self.parse_path()?;
        self.expect(&Token::RParen)?;
        Ok(Statement::CreateIndex {
            name,
            table,
            path,
            unique,
            if_not_exists,
        })
    }

    fn parse_if_not_exists(&mut self) -> ParseResult<bool> {
        if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_if_exists(&mut self) -> ParseResult<bool> {
        if self.eat_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_drop(&mut self) -> ParseResult<Statement> {
        if self.eat_keyword("TABLE") {
            let if_exists = self.parse_if_exists()?;
            let name = self.expect_ident()?;
            return Ok(Statement::DropTable { name, if_exists });
        }
        self.expect_keyword("INDEX")?;
        let if_exists = self.parse_if_exists()?;
        let name = self.expect_ident()?;
        Ok(Statement::DropIndex { name, if_exists })
    }

    fn parse_column_def(&mut self) -> ParseResult<ColumnDef> {
        let path = self.parse_path()?;

        // An optional type name; flag keywords are not types.
        let mut ty = None;
        if let Token::Ident(word) = self.peek() {
            if !is_constraint_keyword(word) {
                match ValueType::from_sql_name(word) {
                    Some(parsed) => {
                        self.advance();
                        ty = Some(parsed);
                        // Tolerate a length argument such as varchar(64).
                        if self.eat(&Token::LParen) {
                            while !self.eat(&Token::RParen) {
                                if self.peek() == &Token::Eof {
                                    return Err(self.unexpected(")"));
                                }
                                self.advance();
                            }
                        }
                    }
                    None => return Err(self.unexpected("a type name")),
                }
            }
        }

        let mut def = ColumnDef {
            path,
            ty,
            primary_key: false,
            unique: false,
            not_null: false,
            default: None,
        };

        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                def.primary_key = true;
            } else if self.eat_keyword("UNIQUE") {
                def.unique = true;
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                def.not_null = true;
            } else if self.eat_keyword("DEFAULT") {
                def.default = Some(self.parse_expr(0)?);
            } else {
                return Ok(def);
            }
        }
    }

    fn parse_insert(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.expect_ident()?;

        let columns = if self.eat(&Token::LParen) {
            let mut columns = Vec::new();
            loop {
                columns.push(self.expect_ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
            Some(columns)
        } else {
            None
        };

        self.expect_keyword("VALUES")?;

        let rows = match columns {
            Some(columns) => {
                let mut rows = Vec::new();
                loop {
                    self.expect(&Token::LParen)?;
                    let mut row = Vec::new();
                    loop {
                        row.push(self.parse_expr(0)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RParen)?;
                    if row.len() != columns.len() {
                        return Err(ParseError::Unsupported(format!(
                            "row has {} values for {} columns",
                            row.len(),
                            columns.len()
                        )));
                    }
                    rows.push(row);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                InsertRows::Values { columns, rows }
            }
            None => {
                let mut documents = Vec::new();
                loop {
                    documents.push(self.parse_expr(0)?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                InsertRows::Documents(documents)
            }
        };

        Ok(Statement::Insert { table, rows })
    }

    fn parse_select(&mut self) -> ParseResult<SelectStmt> {
        let mut projections = Vec::new();
        loop {
            if self.eat(&Token::Star) {
                projections.push(Projection::Wildcard);
            } else {
                let expr = self.parse_expr(0)?;
                let alias = if self.eat_keyword("AS") {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                projections.push(Projection::Expr { expr, alias });
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        let table = if self.eat_keyword("FROM") {
            Some(self.expect_ident()?)
        } else {
            None
        };

        let filter = self.parse_where()?;

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let path = self.parse_path()?;
            let desc = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            Some((path, desc))
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let offset = if self.eat_keyword("OFFSET") {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        Ok(SelectStmt {
            table,
            projections,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_update(&mut self) -> ParseResult<UpdateStmt> {
        let table = self.expect_ident()?;
        let mut set = Vec::new();
        let mut unset = Vec::new();

        if self.eat_keyword("SET") {
            loop {
                let path = self.parse_path()?;
                self.expect(&Token::Eq)?;
                let value = self.parse_expr(0)?;
                set.push((path, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        } else if self.eat_keyword("UNSET") {
            loop {
                unset.push(self.parse_path()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        } else {
            return Err(self.unexpected("SET or UNSET"));
        }

        let filter = self.parse_where()?;
        Ok(UpdateStmt {
            table,
            set,
            unset,
            filter,
        })
    }

    fn parse_where(&mut self) -> ParseResult<Option<crate::ast::Expr>> {
        if self.eat_keyword("WHERE") {
            Ok(Some(self.parse_expr(0)?))
        } else {
            Ok(None)
        }
    }
}

fn is_constraint_keyword(word: &str) -> bool {
    ["PRIMARY", "UNIQUE", "NOT", "DEFAULT"]
        .iter()
        .any(|kw| word.eq_ignore_ascii_case(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use vellum_core::Value;

    #[test]
    fn test_parse_create_table() {
        let stmt = Parser::parse_one("CREATE TABLE test2").unwrap();
        assert_eq!(
            stmt,
            Statement::CreateTable {
                name: "test2".into(),
                if_not_exists: false,
                columns: vec![],
            }
        );

        let stmt = Parser::parse_one("CREATE TABLE test1(a INT UNIQUE)").unwrap();
        let Statement::CreateTable { name, columns, .. } = stmt else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(name, "test1");
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].ty, Some(ValueType::Integer));
        assert!(columns[0].unique);
        assert!(!columns[0].primary_key);
    }

    #[test]
    fn test_parse_create_table_full_constraints() {
        let stmt = Parser::parse_one(
            "CREATE TABLE t (id INT PRIMARY KEY, name TEXT NOT NULL, active BOOL DEFAULT true)",
        )
        .unwrap();
        let Statement::CreateTable { columns, .. } = stmt else {
            panic!("expected CREATE TABLE");
        };
        assert!(columns[0].primary_key);
        assert!(columns[1].not_null);
        assert_eq!(
            columns[2].default,
            Some(Expr::Literal(Value::Bool(true)))
        );
    }

    #[test]
    fn test_parse_drop() {
        assert_eq!(
            Parser::parse_one("DROP TABLE IF EXISTS t").unwrap(),
            Statement::DropTable {
                name: "t".into(),
                if_exists: true,
            }
        );
        assert_eq!(
            Parser::parse_one("DROP INDEX idx").unwrap(),
            Statement::DropIndex {
                name: "idx".into(),
                if_exists: false,
            }
        );
    }

    #[test]
    fn test_parse_create_index() {
        assert_eq!(
            Parser::parse_one("CREATE UNIQUE INDEX idx_foo ON t1(foo.bar)").unwrap(),
            Statement::CreateIndex {
                name: "idx_foo".into(),
                table: "t1".into(),
                path: Path::parse("foo.bar").unwrap(),
                unique: true,
                if_not_exists: false,
            }
        );
    }

    #[test]
    fn test_parse_reindex() {
        assert_eq!(
            Parser::parse_one("REINDEX").unwrap(),
            Statement::Reindex { target: None }
        );
        assert_eq!(
            Parser::parse_one("REINDEX a").unwrap(),
            Statement::Reindex {
                target: Some("a".into())
            }
        );
    }

    #[test]
    fn test_parse_insert_documents() {
        let stmt = Parser::parse_one(r#"INSERT INTO t VALUES {"a": 1}, {"a": 2}"#).unwrap();
        let Statement::Insert { table, rows } = stmt else {
            panic!("expected INSERT");
        };
        assert_eq!(table, "t");
        let InsertRows::Documents(docs) = rows else {
            panic!("expected document rows");
        };
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_parse_insert_values() {
        let stmt =
            Parser::parse_one("INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y')").unwrap();
        let Statement::Insert { rows, .. } = stmt else {
            panic!("expected INSERT");
        };
        let InsertRows::Values { columns, rows } = rows else {
            panic!("expected tuple rows");
        };
        assert_eq!(columns, ["a", "b"]);
        assert_eq!(rows.len(), 2);

        // Arity mismatch is rejected.
        assert!(Parser::parse_one("INSERT INTO t (a, b) VALUES (1)").is_err());
    }

    #[test]
    fn test_parse_select() {
        let stmt = Parser::parse_one(
            "SELECT name, age AS years FROM users WHERE age > 18 ORDER BY age DESC LIMIT 10 OFFSET 2",
        )
        .unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected SELECT");
        };
        assert_eq!(select.table.as_deref(), Some("users"));
        assert_eq!(select.projections.len(), 2);
        assert!(select.filter.is_some());
        assert_eq!(
            select.order_by,
            Some((Path::parse("age").unwrap(), true))
        );
        assert_eq!(select.limit, Some(Expr::Literal(Value::Integer(10))));
        assert_eq!(select.offset, Some(Expr::Literal(Value::Integer(2))));
    }

    #[test]
    fn test_parse_select_without_table() {
        let stmt = Parser::parse_one("SELECT 1 + 2").unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected SELECT");
        };
        assert!(select.table.is_none());
    }

    #[test]
    fn test_parse_update() {
        let stmt = Parser::parse_one("UPDATE t SET a = 1, b.c = 'x' WHERE a = 0").unwrap();
        let Statement::Update(update) = stmt else {
            panic!("expected UPDATE");
        };
        assert_eq!(update.set.len(), 2);
        assert_eq!(update.set[1].0, Path::parse("b.c").unwrap());
        assert!(update.unset.is_empty());
        assert!(update.filter.is_some());

        let stmt = Parser::parse_one("UPDATE t UNSET a, b").unwrap();
        let Statement::Update(update) = stmt else {
            panic!("expected UPDATE");
        };
        assert_eq!(update.unset.len(), 2);
    }

    #[test]
    fn test_parse_delete() {
        assert_eq!(
            Parser::parse_one("DELETE FROM t").unwrap(),
            Statement::Delete {
                table: "t".into(),
                filter: None,
            }
        );
    }

    #[test]
    fn test_parse_transaction_control() {
        assert_eq!(
            Parser::parse_one("BEGIN").unwrap(),
            Statement::Begin { writable: true }
        );
        assert_eq!(
            Parser::parse_one("BEGIN READ ONLY").unwrap(),
            Statement::Begin { writable: false }
        );
        assert_eq!(Parser::parse_one("COMMIT").unwrap(), Statement::Commit);
        assert_eq!(Parser::parse_one("ROLLBACK").unwrap(), Statement::Rollback);
    }

    #[test]
    fn test_parse_multiple_statements() {
        let statements =
            Parser::parse("CREATE TABLE a; CREATE TABLE b; DROP TABLE a").unwrap();
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Parser::parse_one("SELECT FROM").is_err());
        assert!(Parser::parse_one("CREATE").is_err());
        assert!(Parser::parse_one("UPDATE t").is_err());
        assert!(Parser::parse("CREATE TABLE a CREATE TABLE b").is_err());
    }
}
