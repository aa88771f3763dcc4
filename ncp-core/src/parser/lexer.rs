use logos::Logos;
use std::ops::Range;

/// The words of a line of diagnostic tool output.
///
/// Only what `ping` and `traceroute` print is recognised. A line with
/// anything else (non ascii units, control characters...) does not lex
/// and is treated as malformed.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub(crate) enum Token {
    #[regex(r"[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+")]
    Ipv4,
    #[regex(r"[0-9A-Fa-f]*:[0-9A-Fa-f:]+")]
    Ipv6,
    #[regex(r"[0-9]+\.[0-9]+")]
    Decimal,
    #[regex(r"[0-9]+")]
    Integer,
    #[regex(r"[A-Za-z_][A-Za-z0-9_.\-]*")]
    Word,

    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("%")]
    Percent,
    #[token("/")]
    Slash,
    #[token("*")]
    Star,
    #[regex(r"[-+!<>|#@~;?\[\]{}']")]
    Punct,
}

/// A token with the text it was lexed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lexeme<'a> {
    pub token: Token,
    pub text: &'a str,
    pub span: Range<usize>,
}

impl Lexeme<'_> {
    pub fn is_word(&self, word: &str) -> bool {
        self.token == Token::Word && self.text == word
    }

    pub fn is_number(&self) -> bool {
        matches!(self.token, Token::Integer | Token::Decimal)
    }

    pub fn is_address(&self) -> bool {
        matches!(self.token, Token::Ipv4 | Token::Ipv6)
    }
}

/// Lex a whole line, `None` if any part of it is not recognised.
pub(crate) fn lex(line: &str) -> Option<Vec<Lexeme<'_>>> {
    let mut lexer = Token::lexer(line);
    let mut lexemes = Vec::new();

    while let Some(token) = lexer.next() {
        let token = token.ok()?;
        lexemes.push(Lexeme {
            token,
            text: lexer.slice(),
            span: lexer.span(),
        });
    }

    Some(lexemes)
}
