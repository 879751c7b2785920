//! SQL lexer.
//!
//! Converts SQL text into a stream of [`Token`]s. Keywords are not
//! distinguished from identifiers here; the parser matches them
//! case-insensitively.

use crate::parser::ParseError;
use crate::token::Token;

pub(crate) struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenizes the whole input, ending with [`Token::Eof`].
    pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments();

        let Some(&ch) = self.src.get(self.pos) else {
            return Ok(Token::Eof);
        };

        match ch {
            b'\'' | b'"' => self.lex_string(ch),
            b'`' => self.lex_backtick_ident(),
            b'0'..=b'9' => self.lex_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Ok(self.lex_ident()),
            b'?' => self.single(Token::Question),
            b'+' => self.single(Token::Plus),
            b'-' => self.single(Token::Minus),
            b'*' => self.single(Token::Star),
            b'/' => self.single(Token::Slash),
            b'%' => self.single(Token::Percent),
            b'&' => self.single(Token::Ampersand),
            b'|' => self.single(Token::Pipe),
            b'^' => self.single(Token::Caret),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'{' => self.single(Token::LBrace),
            b'}' => self.single(Token::RBrace),
            b',' => self.single(Token::Comma),
            b'.' => self.single(Token::Dot),
            b':' => self.single(Token::Colon),
            b';' => self.single(Token::Semicolon),
            b'=' => self.single(Token::Eq),
            b'!' => {
                if self.src.get(self.pos + 1) == Some(&b'=') {
                    self.pos += 2;
                    Ok(Token::NotEq)
                } else {
                    Err(ParseError::InvalidCharacter('!'))
                }
            }
            b'<' => match self.src.get(self.pos + 1) {
                Some(&b'=') => {
                    self.pos += 2;
                    Ok(Token::LtEq)
                }
                Some(&b'>') => {
                    self.pos += 2;
                    Ok(Token::NotEq)
                }
                _ => self.single(Token::Lt),
            },
            b'>' => {
                if self.src.get(self.pos + 1) == Some(&b'=') {
                    self.pos += 2;
                    Ok(Token::GtEq)
                } else {
                    self.single(Token::Gt)
                }
            }
            other => Err(ParseError::InvalidCharacter(other as char)),
        }
    }

    fn single(&mut self, token: Token) -> Result<Token, ParseError> {
        self.pos += 1;
        Ok(token)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self
                .src
                .get(self.pos)
                .is_some_and(|b| b.is_ascii_whitespace())
            {
                self.pos += 1;
            }

            if self.src.get(self.pos) == Some(&b'-') && self.src.get(self.pos + 1) == Some(&b'-') {
                while self.src.get(self.pos).is_some_and(|&b| b != b'\n') {
                    self.pos += 1;
                }
                continue;
            }

            if self.src.get(self.pos) == Some(&b'/') && self.src.get(self.pos + 1) == Some(&b'*') {
                self.pos += 2;
                while self.pos < self.src.len() {
                    if self.src.get(self.pos) == Some(&b'*')
                        && self.src.get(self.pos + 1) == Some(&b'/')
                    {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }

            return;
        }
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token, ParseError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.src.get(self.pos) {
                Some(&b) if b == quote => {
                    self.pos += 1;
                    return Ok(Token::String(out));
                }
                Some(&b'\\') => {
                    self.pos += 1;
                    let escaped = match self.src.get(self.pos) {
                        Some(&b'n') => '\n',
                        Some(&b'r') => '\r',
                        Some(&b't') => '\t',
                        Some(&b'\\') => '\\',
                        Some(&b'\'') => '\'',
                        Some(&b'"') => '"',
                        Some(&other) => other as char,
                        None => return Err(ParseError::UnterminatedString),
                    };
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(_) => {
                    let start = self.pos;
                    while self
                        .src
                        .get(self.pos)
                        .is_some_and(|&b| b != quote && b != b'\\')
                    {
                        self.pos += 1;
                    }
                    out.push_str(
                        std::str::from_utf8(&self.src[start..self.pos])
                            .map_err(|_| ParseError::UnterminatedString)?,
                    );
                }
                None => return Err(ParseError::UnterminatedString),
            }
        }
    }

    fn lex_backtick_ident(&mut self) -> Result<Token, ParseError> {
        self.pos += 1;
        let start = self.pos;
        while self.src.get(self.pos).is_some_and(|&b| b != b'`') {
            self.pos += 1;
        }
        if self.pos >= self.src.len() {
            return Err(ParseError::UnterminatedString);
        }
        let name = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| ParseError::UnterminatedString)?
            .to_string();
        self.pos += 1;
        Ok(Token::QuotedIdent(name))
    }

    fn lex_number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }

        let mut is_float = false;
        // A fractional part only when a digit follows the dot, so that
        // `foo.1` stays a path and `1.5` stays a number.
        if self.src.get(self.pos) == Some(&b'.')
            && self.src.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            is_float = true;
            self.pos += 1;
            while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
        }

        if matches!(self.src.get(self.pos), Some(&b'e') | Some(&b'E')) {
            let mut lookahead = self.pos + 1;
            if matches!(self.src.get(lookahead), Some(&b'+') | Some(&b'-')) {
                lookahead += 1;
            }
            if self.src.get(lookahead).is_some_and(u8::is_ascii_digit) {
                is_float = true;
                self.pos = lookahead;
                while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
                    self.pos += 1;
                }
            }
        }

        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if is_float {
            text.parse::<f64>()
                .map(Token::Number)
                .map_err(|_| ParseError::InvalidNumber(text.to_string()))
        } else {
            text.parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| ParseError::InvalidNumber(text.to_string()))
        }
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            self.pos += 1;
        }
        Token::Ident(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(s: &str) -> Vec<Token> {
        Lexer::tokenize(s).unwrap()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            lex("SELECT a FROM t;"),
            vec![
                Token::Ident("SELECT".into()),
                Token::Ident("a".into()),
                Token::Ident("FROM".into()),
                Token::Ident("t".into()),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_paths() {
        assert_eq!(
            lex("10.4 foo.bar.1"),
            vec![
                Token::Number(10.4),
                Token::Ident("foo".into()),
                Token::Dot,
                Token::Ident("bar".into()),
                Token::Dot,
                Token::Integer(1),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            lex(r#"'hello' "world" 'it\'s'"#),
            vec![
                Token::String("hello".into()),
                Token::String("world".into()),
                Token::String("it's".into()),
                Token::Eof,
            ]
        );
        assert!(Lexer::tokenize("'unterminated").is_err());
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("a != b <> c <= >="),
            vec![
                Token::Ident("a".into()),
                Token::NotEq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::LtEq,
                Token::GtEq,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            lex("a -- comment\n b /* block */ c"),
            vec![
                Token::Ident("a".into()),
                Token::Ident("b".into()),
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_json_literal_tokens() {
        assert_eq!(
            lex(r#"{"a": 1}"#),
            vec![
                Token::LBrace,
                Token::String("a".into()),
                Token::Colon,
                Token::Integer(1),
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_exponent_number() {
        assert_eq!(lex("1e3"), vec![Token::Number(1000.0), Token::Eof]);
        assert_eq!(lex("2.5e-1"), vec![Token::Number(0.25), Token::Eof]);
    }
}
