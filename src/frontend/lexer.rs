use std::{collections::BTreeMap, str::Chars};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;
use thiserror::Error;

use crate::SourceFile;

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    chars: PeekNth<Chars<'source>>,
    position: usize,
    line: usize,
    column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// 1-based line of the token's first character
    pub line: usize,
    /// 1-based column of the token's first character
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // while
    Identifier,       // counter

    /* Literals */
    NumberLiteral, // 42
    StringLiteral, // "hello, world"

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    Comma,      // ,
    Semicolon,  // ;
    Colon,      // :

    /* Operators */
    Equals,               // =
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    GreaterThan,          // >
    LessThanOrEqualTo,    // <=
    GreaterThanOrEqualTo, // >=
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Slash,                // /

    /// Always the final token of a lexed file; its lexeme is empty
    Eof,
}

impl TokenKind {
    pub fn is_equality_operator(&self) -> bool {
        matches!(self, Self::DoubleEquals | Self::NotEquals)
    }

    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::LessThan
                | Self::GreaterThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_additive_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_multiplicative_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Slash)
    }
}

/// Reserved words of the Sirius language, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Keyword {
    Var,
    Val,
    Int,
    Str,
    Bool,
    Fun,
    If,
    Else,
    For,
    While,
    Print,
    Println,
    True,
    False,
    And,
    Or,
    Not,
    Return,
    Import,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (',', TokenKind::Comma),
        (';', TokenKind::Semicolon),
        (':', TokenKind::Colon),
        ('=', TokenKind::Equals),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
        ('+', TokenKind::Plus),
        ('-', TokenKind::Minus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Slash),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character `{character}` in input on line {line}")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("unterminated string literal starting on line {line}")]
    UnterminatedString { line: usize },
    #[error("unterminated block comment starting on line {line}")]
    UnterminatedBlockComment { line: usize },
}

/// Turns source text into a complete token list terminated by an
/// [`TokenKind::Eof`] token, or fails on the first unrecognized character or
/// unterminated construct.
pub fn tokenize(source: &SourceFile) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(self.position, self.position),
            line: self.line,
            column: self.column,
        });

        Ok(tokens)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_nth(&mut self, n: usize) -> Option<char> {
        self.chars.peek_nth(n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;

        self.position += c.len_utf8();

        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(c)
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        while let Some(c) = self.peek() {
            let token = match c {
                // Whitespace separates tokens but is never one
                c if c.is_whitespace() => {
                    self.advance();
                    continue;
                }

                // Line comments (-- to end of line)
                '-' if self.peek_nth(1) == Some('-') => {
                    self.ignore_line();
                    continue;
                }
                // Block comments (-! ... !-)
                '-' if self.peek_nth(1) == Some('!') => {
                    self.ignore_block_comment()?;
                    continue;
                }

                '"' => self.read_string()?,

                n if n.is_ascii_digit() => self.read_number(),

                // Identifiers and keywords
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                // Double equals (==)
                '=' if self.peek_nth(1) == Some('=') => self.read_double(TokenKind::DoubleEquals),
                // Not equals (!=)
                '!' if self.peek_nth(1) == Some('=') => self.read_double(TokenKind::NotEquals),
                // Less than or equal (<=)
                '<' if self.peek_nth(1) == Some('=') => {
                    self.read_double(TokenKind::LessThanOrEqualTo)
                }
                // Greater than or equal (>=)
                '>' if self.peek_nth(1) == Some('=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }

                s if SINGLE_TOKENS.contains_key(&s) => {
                    self.read_single(*SINGLE_TOKENS.get(&s).unwrap())
                }

                c => {
                    return Err(LexError::UnexpectedCharacter {
                        character: c,
                        line: self.line,
                    });
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }

            self.advance();
        }
    }

    fn ignore_block_comment(&mut self) -> Result<(), LexError> {
        let start_line = self.line;

        // Consume the opening marker
        self.advance();
        self.advance();

        while let Some(c) = self.peek() {
            if c == '!' && self.peek_nth(1) == Some('-') {
                self.advance();
                self.advance();
                return Ok(());
            }

            self.advance();
        }

        Err(LexError::UnterminatedBlockComment { line: start_line })
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let (start, line, column) = (self.position, self.line, self.column);

        // Consume the opening quote
        self.advance();

        loop {
            match self.peek() {
                None | Some('\n') => return Err(LexError::UnterminatedString { line }),
                Some('"') => {
                    self.advance();

                    return Ok(Token {
                        kind: TokenKind::StringLiteral,
                        span: Span::new(start, self.position),
                        line,
                        column,
                    });
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Maximal run of ASCII digits
    fn read_number(&mut self) -> Token {
        let (start, line, column) = (self.position, self.line, self.column);

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        Token {
            kind: TokenKind::NumberLiteral,
            span: Span::new(start, self.position),
            line,
            column,
        }
    }

    /// Keyword or identifier
    fn read_word(&mut self) -> Token {
        let (start, line, column) = (self.position, self.line, self.column);

        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }

        let span = Span::new(start, self.position);
        let value = self.source.value_of_span(span);

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Token {
            kind,
            span,
            line,
            column,
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let (start, line, column) = (self.position, self.line, self.column);

        self.advance();

        Token {
            kind,
            span: Span::new(start, self.position),
            line,
            column,
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let (start, line, column) = (self.position, self.line, self.column);

        self.advance();
        self.advance();

        Token {
            kind,
            span: Span::new(start, self.position),
            line,
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let source = SourceFile::new_in_memory(input);
        tokenize(&source)
            .expect("input should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_a_variable_declaration() {
        assert_eq!(
            kinds("var counter: int = 42;"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Equals,
                TokenKind::NumberLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_match_case_insensitively() {
        assert_eq!(
            kinds("VAR Val wHiLe"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Keyword(Keyword::Val),
                TokenKind::Keyword(Keyword::While),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped_entirely() {
        assert_eq!(
            kinds("1 -- the rest of this line vanishes\n2 -! and\nthis\nblock !- 3"),
            vec![
                TokenKind::NumberLiteral,
                TokenKind::NumberLiteral,
                TokenKind::NumberLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_character_operators_win_over_singles() {
        assert_eq!(
            kinds("= == != < <= > >="),
            vec![
                TokenKind::Equals,
                TokenKind::DoubleEquals,
                TokenKind::NotEquals,
                TokenKind::LessThan,
                TokenKind::LessThanOrEqualTo,
                TokenKind::GreaterThan,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokens_record_line_and_first_character_column() {
        let source = SourceFile::new_in_memory("var x;\n  print(x);");
        let tokens = tokenize(&source).unwrap();

        // `var` and `x` on line 1
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5));
        // `print` after two spaces on line 2
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
    }

    #[test]
    fn string_literal_span_includes_quotes() {
        let source = SourceFile::new_in_memory("\"hello\"");
        let tokens = tokenize(&source).unwrap();

        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(source.value_of_span(tokens[0].span), "\"hello\"");
    }

    #[test]
    fn final_token_is_eof_with_empty_lexeme() {
        let source = SourceFile::new_in_memory("x");
        let tokens = tokenize(&source).unwrap();
        let last = tokens.last().unwrap();

        assert_eq!(last.kind, TokenKind::Eof);
        assert_eq!(source.value_of_span(last.span), "");
    }

    #[test]
    fn unterminated_string_fails_with_its_line() {
        let source = SourceFile::new_in_memory("var x;\nvar s = \"oops");

        assert_eq!(
            tokenize(&source),
            Err(LexError::UnterminatedString { line: 2 })
        );
    }

    #[test]
    fn string_may_not_span_lines() {
        let source = SourceFile::new_in_memory("\"a\nb\"");

        assert_eq!(
            tokenize(&source),
            Err(LexError::UnterminatedString { line: 1 })
        );
    }

    #[test]
    fn unterminated_block_comment_fails() {
        let source = SourceFile::new_in_memory("-! never closed");

        assert_eq!(
            tokenize(&source),
            Err(LexError::UnterminatedBlockComment { line: 1 })
        );
    }

    #[test]
    fn unknown_characters_are_rejected() {
        let source = SourceFile::new_in_memory("var x = 1 @ 2;");

        assert_eq!(
            tokenize(&source),
            Err(LexError::UnexpectedCharacter {
                character: '@',
                line: 1
            })
        );
    }

    #[test]
    fn bare_bang_is_not_a_token() {
        let source = SourceFile::new_in_memory("!x");

        assert_eq!(
            tokenize(&source),
            Err(LexError::UnexpectedCharacter {
                character: '!',
                line: 1
            })
        );
    }
}
