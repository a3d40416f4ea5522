//! Expression tokenizer.
//!
//! Identifiers are scanned by maximal munch over identifier characters, and `$` counts as
//! an identifier start. `$ReturnValue-2` is therefore the identifier `$ReturnValue` followed
//! by `-` and `2`, while `$ReturnValue3A` stays a single (unrecognized) identifier.

use std::fmt;

use strum::{Display, EnumString};

use crate::{metadata::typesystem::CilPrimitiveKind, Error, Result};

/// Reserved words that are not type keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    /// `null`
    Null,
    /// `true`
    True,
    /// `false`
    False,
    /// `this`
    This,
    /// `ref`
    Ref,
    /// `out`
    Out,
}

/// Operators and delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Punct {
    /// `(`
    #[strum(to_string = "(")]
    OpenParen,
    /// `)`
    #[strum(to_string = ")")]
    CloseParen,
    /// `[`
    #[strum(to_string = "[")]
    OpenBracket,
    /// `]`
    #[strum(to_string = "]")]
    CloseBracket,
    /// `.`
    #[strum(to_string = ".")]
    Dot,
    /// `,`
    #[strum(to_string = ",")]
    Comma,
    /// `::`
    #[strum(to_string = "::")]
    ColonColon,
    /// `??`
    #[strum(to_string = "??")]
    QuestionQuestion,
    /// `?`
    #[strum(to_string = "?")]
    Question,
    /// `=`
    #[strum(to_string = "=")]
    Assign,
    /// `+=`
    #[strum(to_string = "+=")]
    PlusAssign,
    /// `-=`
    #[strum(to_string = "-=")]
    MinusAssign,
    /// `*=`
    #[strum(to_string = "*=")]
    StarAssign,
    /// `/=`
    #[strum(to_string = "/=")]
    SlashAssign,
    /// `+`
    #[strum(to_string = "+")]
    Plus,
    /// `-`
    #[strum(to_string = "-")]
    Minus,
    /// `*`
    #[strum(to_string = "*")]
    Star,
    /// `/`
    #[strum(to_string = "/")]
    Slash,
    /// `<`
    #[strum(to_string = "<")]
    Less,
    /// `>`
    #[strum(to_string = ">")]
    Greater,
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier, possibly `$`-prefixed; verbatim identifiers lose their `@`
    Identifier(String),
    /// `@0x...` address literal, kept verbatim for classification
    Address(String),
    /// `global`, only when directly followed by `::`
    Global,
    /// Reserved word
    Keyword(Keyword),
    /// Predefined type keyword such as `int`
    TypeKeyword(CilPrimitiveKind),
    /// Integer literal
    Integer(u64),
    /// String literal, escapes processed
    String(String),
    /// Operator or delimiter
    Punct(Punct),
    /// End of input
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(name) | TokenKind::Address(name) => write!(f, "{name}"),
            TokenKind::Global => write!(f, "global"),
            TokenKind::Keyword(keyword) => write!(f, "{keyword}"),
            TokenKind::TypeKeyword(kind) => write!(f, "{kind}"),
            TokenKind::Integer(value) => write!(f, "{value}"),
            TokenKind::String(value) => write!(f, "\"{value}\""),
            TokenKind::Punct(punct) => write!(f, "{punct}"),
            TokenKind::End => write!(f, "end of expression"),
        }
    }
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxToken {
    /// Payload
    pub kind: TokenKind,
    /// Character offset
    pub position: usize,
}

/// Tokenize a whole expression; the last token is always [`TokenKind::End`].
///
/// # Errors
/// Returns [`Error::LegacySyntaxRejected`] for `23#` object ids and [`Error::Syntax`] for
/// characters that cannot start a token.
pub fn tokenize(source: &str) -> Result<Vec<SyntaxToken>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        position: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let end = token.kind == TokenKind::End;
        tokens.push(token);
        if end {
            return Ok(tokens);
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Lexer {
    chars: Vec<char>,
    position: usize,
}

impl Lexer {
    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn syntax(&self, position: usize, message: impl Into<String>) -> Error {
        Error::Syntax {
            position,
            message: message.into(),
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let start = self.position;
        while self.peek_at(0).is_some_and(&predicate) {
            self.position += 1;
        }
        self.chars[start..self.position].iter().collect()
    }

    fn next_token(&mut self) -> Result<SyntaxToken> {
        while self.peek_at(0).is_some_and(char::is_whitespace) {
            self.position += 1;
        }

        let start = self.position;
        let Some(c) = self.peek_at(0) else {
            return Ok(SyntaxToken {
                kind: TokenKind::End,
                position: start,
            });
        };

        let kind = if c.is_ascii_digit() {
            self.number(start)?
        } else if c == '"' {
            self.string(start)?
        } else if c == '@' {
            self.at_sign(start)?
        } else if is_identifier_start(c) {
            self.word()
        } else {
            TokenKind::Punct(self.punct(start)?)
        };

        Ok(SyntaxToken {
            kind,
            position: start,
        })
    }

    fn number(&mut self, start: usize) -> Result<TokenKind> {
        let hex = self.peek_at(0) == Some('0') && matches!(self.peek_at(1), Some('x' | 'X'));
        let value = if hex {
            self.position += 2;
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            u64::from_str_radix(&digits, 16)
        } else {
            self.take_while(|c| c.is_ascii_digit()).parse::<u64>()
        };

        if self.peek_at(0) == Some('#') {
            return Err(Error::LegacySyntaxRejected { position: start });
        }
        if self.peek_at(0).is_some_and(is_identifier_part) {
            return Err(self.syntax(self.position, "invalid numeric literal"));
        }
        value
            .map(TokenKind::Integer)
            .map_err(|_| self.syntax(start, "integral constant is too large"))
    }

    fn string(&mut self, start: usize) -> Result<TokenKind> {
        self.position += 1;
        let mut value = String::new();
        loop {
            match self.peek_at(0) {
                None | Some('\n') => return Err(self.syntax(start, "newline in constant")),
                Some('"') => {
                    self.position += 1;
                    return Ok(TokenKind::String(value));
                }
                Some('\\') => {
                    let escaped = match self.peek_at(1) {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('0') => '\0',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        _ => {
                            return Err(self.syntax(self.position, "unrecognized escape sequence"))
                        }
                    };
                    value.push(escaped);
                    self.position += 2;
                }
                Some(c) => {
                    value.push(c);
                    self.position += 1;
                }
            }
        }
    }

    fn at_sign(&mut self, start: usize) -> Result<TokenKind> {
        match (self.peek_at(1), self.peek_at(2)) {
            (Some('0'), Some('x' | 'X')) => {
                self.position += 3;
                let digits = self.take_while(is_identifier_part);
                let prefix: String = self.chars[start..start + 3].iter().collect();
                Ok(TokenKind::Address(format!("{prefix}{digits}")))
            }
            (Some(c), _) if c.is_alphabetic() || c == '_' => {
                self.position += 1;
                Ok(TokenKind::Identifier(self.take_while(is_identifier_part)))
            }
            _ => Err(self.syntax(start, "unexpected character '@'")),
        }
    }

    fn word(&mut self) -> TokenKind {
        let sigil = if self.peek_at(0) == Some('$') {
            self.position += 1;
            "$"
        } else {
            ""
        };
        let word = format!("{sigil}{}", self.take_while(is_identifier_part));
        if !sigil.is_empty() {
            return TokenKind::Identifier(word);
        }

        if word == "global" && self.followed_by_colon_colon() {
            return TokenKind::Global;
        }
        if let Ok(keyword) = word.parse::<Keyword>() {
            return TokenKind::Keyword(keyword);
        }
        if let Some(kind) = CilPrimitiveKind::from_keyword(&word) {
            return TokenKind::TypeKeyword(kind);
        }
        TokenKind::Identifier(word)
    }

    fn followed_by_colon_colon(&self) -> bool {
        let rest = &self.chars[self.position..];
        let mut chars = rest.iter().copied().skip_while(|c| c.is_whitespace());
        chars.next() == Some(':') && chars.next() == Some(':')
    }

    fn punct(&mut self, start: usize) -> Result<Punct> {
        let c = self.peek_at(0).unwrap_or_default();
        let next = self.peek_at(1);
        let (punct, width) = match (c, next) {
            (':', Some(':')) => (Punct::ColonColon, 2),
            ('?', Some('?')) => (Punct::QuestionQuestion, 2),
            ('+', Some('=')) => (Punct::PlusAssign, 2),
            ('-', Some('=')) => (Punct::MinusAssign, 2),
            ('*', Some('=')) => (Punct::StarAssign, 2),
            ('/', Some('=')) => (Punct::SlashAssign, 2),
            ('(', _) => (Punct::OpenParen, 1),
            (')', _) => (Punct::CloseParen, 1),
            ('[', _) => (Punct::OpenBracket, 1),
            (']', _) => (Punct::CloseBracket, 1),
            ('.', _) => (Punct::Dot, 1),
            (',', _) => (Punct::Comma, 1),
            ('?', _) => (Punct::Question, 1),
            ('=', _) => (Punct::Assign, 1),
            ('+', _) => (Punct::Plus, 1),
            ('-', _) => (Punct::Minus, 1),
            ('*', _) => (Punct::Star, 1),
            ('/', _) => (Punct::Slash, 1),
            ('<', _) => (Punct::Less, 1),
            ('>', _) => (Punct::Greater, 1),
            _ => return Err(self.syntax(start, format!("unexpected character '{c}'"))),
        };
        self.position += width;
        Ok(punct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.to_string())
    }

    #[test]
    fn test_return_value_minus_is_three_tokens() {
        assert_eq!(
            kinds("$ReturnValue-2"),
            vec![
                ident("$ReturnValue"),
                TokenKind::Punct(Punct::Minus),
                TokenKind::Integer(2),
                TokenKind::End
            ]
        );
        assert_eq!(kinds("$ReturnValue3A"), vec![ident("$ReturnValue3A"), TokenKind::End]);
    }

    #[test]
    fn test_legacy_object_id_rejected() {
        assert_eq!(
            tokenize("23#"),
            Err(Error::LegacySyntaxRejected { position: 0 })
        );
        assert_eq!(
            tokenize("x + 4#"),
            Err(Error::LegacySyntaxRejected { position: 4 })
        );
    }

    #[test]
    fn test_addresses_and_verbatim_identifiers() {
        assert_eq!(
            kinds("@0X1aB @x"),
            vec![TokenKind::Address("@0X1aB".into()), ident("x"), TokenKind::End]
        );
        assert_eq!(kinds("@this"), vec![ident("this"), TokenKind::End]);
        assert!(tokenize("@ 1").is_err());
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("global::$exception"),
            vec![
                TokenKind::Global,
                TokenKind::Punct(Punct::ColonColon),
                ident("$exception"),
                TokenKind::End
            ]
        );
        assert_eq!(kinds("global"), vec![ident("global"), TokenKind::End]);
        assert_eq!(
            kinds("(int?)null"),
            vec![
                TokenKind::Punct(Punct::OpenParen),
                TokenKind::TypeKeyword(CilPrimitiveKind::I4),
                TokenKind::Punct(Punct::Question),
                TokenKind::Punct(Punct::CloseParen),
                TokenKind::Keyword(Keyword::Null),
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("a ?? b += 0x10 \"q\\\"\""),
            vec![
                ident("a"),
                TokenKind::Punct(Punct::QuestionQuestion),
                ident("b"),
                TokenKind::Punct(Punct::PlusAssign),
                TokenKind::Integer(16),
                TokenKind::String("q\"".into()),
                TokenKind::End
            ]
        );
        assert!(matches!(tokenize("1 % 2"), Err(Error::Syntax { position: 2, .. })));
        assert!(matches!(tokenize("\"open"), Err(Error::Syntax { .. })));
    }
}
