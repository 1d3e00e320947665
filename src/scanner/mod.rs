mod raw_token;
pub mod token;

use logos::{Lexer as LogosLexer, Logos};
use raw_token::RawToken;
pub use token::{Token, TokenKind, TOKEN_KIND_COUNT};

/// Pull-based tokenizer. The compiler reads exactly one token ahead, so the
/// scanner owns no token buffer; it hands out one `Token` per call and
/// repeats `Eof` once the source is exhausted.
pub struct Scanner<'source> {
    inner: LogosLexer<'source, RawToken>,
    line_starts: Vec<usize>,
}

impl<'source> Scanner<'source> {
    pub fn new(source: &'source str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Scanner {
            inner: RawToken::lexer(source),
            line_starts,
        }
    }

    pub fn scan_token(&mut self) -> Token {
        match self.inner.next() {
            Some(Ok(raw)) => Token {
                kind: Self::convert(raw),
                lexeme: self.inner.slice().to_string(),
                line: self.line_of(self.inner.span().start),
            },
            Some(Err(())) => {
                // The string rule spans embedded newlines, so a failed match
                // starting with a quote means the terminator never shows up.
                let slice = self.inner.slice();
                let message = if slice.starts_with('"') {
                    "Unterminated string.".to_string()
                } else {
                    format!("Unexpected character: '{}'", slice)
                };
                Token {
                    kind: TokenKind::Error,
                    lexeme: message,
                    line: self.line_of(self.inner.span().start),
                }
            }
            None => Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                line: self.line_of(self.inner.source().len()),
            },
        }
    }

    /// 1-based line containing the byte at `offset`.
    fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    fn convert(raw: RawToken) -> TokenKind {
        match raw {
            RawToken::LeftParen => TokenKind::LeftParen,
            RawToken::RightParen => TokenKind::RightParen,
            RawToken::LeftBrace => TokenKind::LeftBrace,
            RawToken::RightBrace => TokenKind::RightBrace,
            RawToken::Comma => TokenKind::Comma,
            RawToken::Dot => TokenKind::Dot,
            RawToken::Minus => TokenKind::Minus,
            RawToken::Plus => TokenKind::Plus,
            RawToken::Semicolon => TokenKind::Semicolon,
            RawToken::Slash => TokenKind::Slash,
            RawToken::Star => TokenKind::Star,

            RawToken::Bang => TokenKind::Bang,
            RawToken::BangEqual => TokenKind::BangEqual,
            RawToken::Equal => TokenKind::Equal,
            RawToken::EqualEqual => TokenKind::EqualEqual,
            RawToken::Greater => TokenKind::Greater,
            RawToken::GreaterEqual => TokenKind::GreaterEqual,
            RawToken::Less => TokenKind::Less,
            RawToken::LessEqual => TokenKind::LessEqual,

            RawToken::Identifier => TokenKind::Identifier,
            RawToken::String => TokenKind::String,
            RawToken::Number => TokenKind::Number,

            RawToken::And => TokenKind::And,
            RawToken::Class => TokenKind::Class,
            RawToken::Else => TokenKind::Else,
            RawToken::False => TokenKind::False,
            RawToken::For => TokenKind::For,
            RawToken::Fun => TokenKind::Fun,
            RawToken::If => TokenKind::If,
            RawToken::Nil => TokenKind::Nil,
            RawToken::Or => TokenKind::Or,
            RawToken::Print => TokenKind::Print,
            RawToken::Return => TokenKind::Return,
            RawToken::Super => TokenKind::Super,
            RawToken::This => TokenKind::This,
            RawToken::True => TokenKind::True,
            RawToken::Var => TokenKind::Var,
            RawToken::While => TokenKind::While,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan_token();
            let kind = token.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn expression_tokens() {
        use TokenKind::*;
        assert_eq!(
            kinds("print 1 + 2 * (3 - 4);"),
            vec![
                Print, Number, Plus, Number, Star, LeftParen, Number, Minus, Number, RightParen,
                Semicolon, Eof
            ]
        );
    }

    #[test]
    fn keywords_versus_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("var variable = nil; fortune and android"),
            vec![Var, Identifier, Equal, Nil, Semicolon, Identifier, And, Identifier, Eof]
        );
    }

    #[test]
    fn two_character_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("! != = == < <= > >="),
            vec![
                Bang, BangEqual, Equal, EqualEqual, Less, LessEqual, Greater, GreaterEqual, Eof
            ]
        );
    }

    #[test]
    fn number_requires_digits_on_both_sides() {
        use TokenKind::*;
        assert_eq!(kinds("1.5"), vec![Number, Eof]);
        assert_eq!(kinds("1."), vec![Number, Dot, Eof]);
        assert_eq!(kinds(".5"), vec![Dot, Number, Eof]);
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        use TokenKind::*;
        assert_eq!(
            kinds("// a comment\nprint\t1; // trailing"),
            vec![Print, Number, Semicolon, Eof]
        );
    }

    #[test]
    fn line_numbers() {
        let mut scanner = Scanner::new("var a;\nvar b;\n\nvar c;");
        let lines: Vec<usize> = std::iter::from_fn(|| {
            let token = scanner.scan_token();
            (token.kind != TokenKind::Eof).then_some(token.line)
        })
        .collect();
        assert_eq!(lines, vec![1, 1, 1, 2, 2, 2, 4, 4, 4]);
    }

    #[test]
    fn string_literal_keeps_quotes_in_lexeme() {
        let mut scanner = Scanner::new("\"hello\"");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.lexeme, "\"hello\"");
    }

    #[test]
    fn string_spanning_lines_reports_starting_line() {
        let mut scanner = Scanner::new("\"one\ntwo\"\nprint");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.line, 1);
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Print);
        assert_eq!(token.line, 3);
    }

    #[test]
    fn unterminated_string() {
        let mut scanner = Scanner::new("\"never closed");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated string.");
    }

    #[test]
    fn unexpected_character_names_the_offender() {
        let mut scanner = Scanner::new("@");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unexpected character: '@'");

        let mut scanner = Scanner::new("var a = #1;");
        let mut token = scanner.scan_token();
        while token.kind != TokenKind::Error {
            token = scanner.scan_token();
        }
        assert_eq!(token.lexeme, "Unexpected character: '#'");
    }

    #[test]
    fn eof_repeats() {
        let mut scanner = Scanner::new("");
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
        assert_eq!(scanner.scan_token().kind, TokenKind::Eof);
    }
}
