//! Expression parser.
//!
//! Recursive descent over the token stream produced by [`crate::compiler::lexer`], one
//! function per precedence tier. Every error is an [`crate::Error::Syntax`] carrying the
//! offset of the offending token.

use crate::{
    compiler::{
        lexer::{tokenize, Keyword, Punct, SyntaxToken, TokenKind},
        syntax::{Argument, ArgumentKind, BinaryOp, Expr, Literal, TypeSyntax},
    },
    Error, Result,
};

/// Recursive descent parser for debugger expressions.
///
/// Precedence from loosest to tightest: assignment (right associative), `??` (right
/// associative), additive, multiplicative, unary and cast, postfix member access, call and
/// index.
///
/// ```rust
/// use exprscope::compiler::{parser::ExpressionParser, syntax::Expr};
///
/// let expr = ExpressionParser::new("(int)$ReturnValue-2", 64)?.parse()?;
/// assert!(matches!(expr, Expr::Binary { .. }));
/// # Ok::<(), exprscope::Error>(())
/// ```
pub struct ExpressionParser {
    tokens: Vec<SyntaxToken>,
    index: usize,
    depth: usize,
    max_depth: usize,
}

impl ExpressionParser {
    /// Tokenize `source`
    ///
    /// # Errors
    /// Returns the tokenizer's error, including [`Error::LegacySyntaxRejected`].
    pub fn new(source: &str, max_depth: usize) -> Result<Self> {
        Ok(ExpressionParser {
            tokens: tokenize(source)?,
            index: 0,
            depth: 0,
            max_depth,
        })
    }

    /// Parse the whole input as one expression
    ///
    /// # Errors
    /// Returns [`Error::Syntax`] at the first unexpected token, or
    /// [`Error::RecursionLimit`] for input nested deeper than the limit.
    pub fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_assignment()?;
        match &self.peek().kind {
            TokenKind::End => Ok(expr),
            other => Err(self.syntax(format!("unexpected '{other}'"))),
        }
    }

    fn peek(&self) -> &SyntaxToken {
        // tokenize() always ends the stream with End, which is never consumed
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let index = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) -> SyntaxToken {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.index += 1;
        }
        token
    }

    fn at_punct(&self, punct: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(punct)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.at_punct(punct) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            let found = self.peek().kind.clone();
            Err(self.syntax(format!("'{punct}' expected, found '{found}'")))
        }
    }

    fn syntax(&self, message: impl Into<String>) -> Error {
        Error::Syntax {
            position: self.peek().position,
            message: message.into(),
        }
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        self.enter()?;
        let result = self.parse_assignment_inner();
        self.leave();
        result
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr> {
        let target = self.parse_coalesce()?;
        let op = match self.peek().kind {
            TokenKind::Punct(Punct::Assign) => None,
            TokenKind::Punct(Punct::PlusAssign) => Some(BinaryOp::Add),
            TokenKind::Punct(Punct::MinusAssign) => Some(BinaryOp::Subtract),
            TokenKind::Punct(Punct::StarAssign) => Some(BinaryOp::Multiply),
            TokenKind::Punct(Punct::SlashAssign) => Some(BinaryOp::Divide),
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            position: target.position(),
            target: Box::new(target),
            op,
            value: Box::new(value),
        })
    }

    fn parse_coalesce(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        if !self.eat_punct(Punct::QuestionQuestion) {
            return Ok(left);
        }
        self.enter()?;
        let right = self.parse_coalesce();
        self.leave();
        Ok(Expr::Coalesce {
            position: left.position(),
            left: Box::new(left),
            right: Box::new(right?),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Punct(Punct::Plus) => BinaryOp::Add,
                TokenKind::Punct(Punct::Minus) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                position: left.position(),
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Punct(Punct::Star) => BinaryOp::Multiply,
                TokenKind::Punct(Punct::Slash) => BinaryOp::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                position: left.position(),
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.enter()?;
        let result = self.parse_unary_inner();
        self.leave();
        result
    }

    fn parse_unary_inner(&mut self) -> Result<Expr> {
        let position = self.peek().position;
        if self.eat_punct(Punct::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate {
                operand: Box::new(operand),
                position,
            });
        }
        if self.eat_punct(Punct::Plus) {
            return self.parse_unary();
        }
        if self.at_punct(Punct::OpenParen) {
            if let Some(cast) = self.try_parse_cast()? {
                return Ok(cast);
            }
        }
        self.parse_postfix()
    }

    /// A parenthesized type is a cast if the type could not be an expression, or if the
    /// token after `)` can start an operand but not continue a binary expression.
    fn try_parse_cast(&mut self) -> Result<Option<Expr>> {
        let saved = self.index;
        let position = self.peek().position;
        self.advance();

        let Ok(ty) = self.parse_type() else {
            self.index = saved;
            return Ok(None);
        };
        if !self.eat_punct(Punct::CloseParen) {
            self.index = saved;
            return Ok(None);
        }

        let unambiguous_type = !matches!(&ty, TypeSyntax::Named { segments, .. }
            if segments.iter().all(|(_, args)| args.is_empty()));
        let operand_follows = matches!(
            self.peek().kind,
            TokenKind::Identifier(_)
                | TokenKind::Address(_)
                | TokenKind::Integer(_)
                | TokenKind::String(_)
                | TokenKind::Global
                | TokenKind::TypeKeyword(_)
                | TokenKind::Keyword(Keyword::This | Keyword::Null | Keyword::True | Keyword::False)
                | TokenKind::Punct(Punct::OpenParen)
        );
        if !unambiguous_type && !operand_follows {
            self.index = saved;
            return Ok(None);
        }

        let operand = self.parse_unary()?;
        Ok(Some(Expr::Cast {
            ty,
            operand: Box::new(operand),
            position,
        }))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let position = expr.position();
            if self.eat_punct(Punct::Dot) {
                let token = self.advance();
                let TokenKind::Identifier(name) = token.kind else {
                    return Err(Error::Syntax {
                        position: token.position,
                        message: "identifier expected".to_string(),
                    });
                };
                let type_args = self.parse_optional_type_args()?;
                expr = Expr::Member {
                    target: Box::new(expr),
                    name,
                    type_args,
                    position,
                };
            } else if self.eat_punct(Punct::OpenParen) {
                let args = self.parse_arguments()?;
                expr = Expr::Invoke {
                    target: Box::new(expr),
                    args,
                    position,
                };
            } else if self.eat_punct(Punct::OpenBracket) {
                let mut indices = vec![self.parse_assignment()?];
                while self.eat_punct(Punct::Comma) {
                    indices.push(self.parse_assignment()?);
                }
                self.expect_punct(Punct::CloseBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    indices,
                    position,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>> {
        let mut args = Vec::new();
        if self.eat_punct(Punct::CloseParen) {
            return Ok(args);
        }
        loop {
            let kind = match self.peek().kind {
                TokenKind::Keyword(Keyword::Ref) => ArgumentKind::Ref,
                TokenKind::Keyword(Keyword::Out) => ArgumentKind::Out,
                _ => ArgumentKind::Value,
            };
            if kind != ArgumentKind::Value {
                self.advance();
            }
            let expr = self.parse_assignment()?;
            args.push(Argument { kind, expr });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::CloseParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        let position = token.position;
        match token.kind {
            TokenKind::Identifier(name) | TokenKind::Address(name) => {
                let type_args = self.parse_optional_type_args()?;
                Ok(Expr::Name {
                    name,
                    type_args,
                    position,
                })
            }
            TokenKind::Global => {
                self.expect_punct(Punct::ColonColon)?;
                match self.advance().kind {
                    TokenKind::Identifier(name) => Ok(Expr::Global { name, position }),
                    _ => Err(Error::Syntax {
                        position,
                        message: "identifier expected".to_string(),
                    }),
                }
            }
            TokenKind::Keyword(Keyword::This) => Ok(Expr::This { position }),
            TokenKind::Keyword(Keyword::Null) => Ok(Expr::Literal {
                value: Literal::Null,
                position,
            }),
            TokenKind::Keyword(Keyword::True) => Ok(Expr::Literal {
                value: Literal::Boolean(true),
                position,
            }),
            TokenKind::Keyword(Keyword::False) => Ok(Expr::Literal {
                value: Literal::Boolean(false),
                position,
            }),
            TokenKind::Integer(value) => Ok(Expr::Literal {
                value: Literal::Integer(value),
                position,
            }),
            TokenKind::String(value) => Ok(Expr::Literal {
                value: Literal::String(value),
                position,
            }),
            TokenKind::Punct(Punct::OpenParen) => {
                let expr = self.parse_assignment()?;
                self.expect_punct(Punct::CloseParen)?;
                Ok(expr)
            }
            other => Err(Error::Syntax {
                position,
                message: format!("invalid expression term '{other}'"),
            }),
        }
    }

    fn parse_optional_type_args(&mut self) -> Result<Vec<TypeSyntax>> {
        if !self.eat_punct(Punct::Less) {
            return Ok(Vec::new());
        }
        let mut args = vec![self.parse_type()?];
        while self.eat_punct(Punct::Comma) {
            args.push(self.parse_type()?);
        }
        self.expect_punct(Punct::Greater)?;
        Ok(args)
    }

    fn parse_type(&mut self) -> Result<TypeSyntax> {
        self.enter()?;
        let result = self.parse_type_inner();
        self.leave();
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSyntax> {
        let mut ty = match self.peek().kind.clone() {
            TokenKind::TypeKeyword(kind) => {
                self.advance();
                TypeSyntax::Keyword(kind)
            }
            TokenKind::Global => {
                self.advance();
                self.expect_punct(Punct::ColonColon)?;
                self.parse_named_type(true)?
            }
            TokenKind::Identifier(name) if !name.starts_with('$') => self.parse_named_type(false)?,
            other => return Err(self.syntax(format!("type expected, found '{other}'"))),
        };

        if self.eat_punct(Punct::Question) {
            ty = TypeSyntax::Nullable(Box::new(ty));
        }
        while self.at_punct(Punct::OpenBracket)
            && matches!(
                self.peek_kind_at(1),
                TokenKind::Punct(Punct::Comma | Punct::CloseBracket)
            )
        {
            self.advance();
            let mut rank = 1;
            while self.eat_punct(Punct::Comma) {
                rank += 1;
            }
            self.expect_punct(Punct::CloseBracket)?;
            ty = TypeSyntax::Array {
                element: Box::new(ty),
                rank,
            };
        }
        Ok(ty)
    }

    fn parse_named_type(&mut self, global: bool) -> Result<TypeSyntax> {
        let mut segments = Vec::new();
        loop {
            let token = self.advance();
            let TokenKind::Identifier(name) = token.kind else {
                return Err(Error::Syntax {
                    position: token.position,
                    message: "identifier expected".to_string(),
                });
            };
            let args = self.parse_optional_type_args()?;
            segments.push((name, args));

            let continues = self.at_punct(Punct::Dot)
                && matches!(self.peek_kind_at(1), TokenKind::Identifier(_));
            if !continues {
                return Ok(TypeSyntax::Named { global, segments });
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::CilPrimitiveKind;

    fn parse(source: &str) -> Expr {
        ExpressionParser::new(source, 64).unwrap().parse().unwrap()
    }

    fn name(name: &str, position: usize) -> Expr {
        Expr::Name {
            name: name.to_string(),
            type_args: Vec::new(),
            position,
        }
    }

    #[test]
    fn test_cast_binds_tighter_than_subtraction() {
        let expr = parse("(int)$ReturnValue-2");
        let Expr::Binary {
            op: BinaryOp::Subtract,
            left,
            right,
            ..
        } = expr
        else {
            panic!("expected subtraction");
        };
        assert_eq!(
            *left,
            Expr::Cast {
                ty: TypeSyntax::Keyword(CilPrimitiveKind::I4),
                operand: Box::new(name("$ReturnValue", 5)),
                position: 0,
            }
        );
        assert_eq!(
            *right,
            Expr::Literal {
                value: Literal::Integer(2),
                position: 18
            }
        );
    }

    #[test]
    fn test_parenthesized_name_followed_by_operator_is_not_a_cast() {
        let expr = parse("(x)-2");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Subtract, .. }));

        let expr = parse("(System.Exception)$exception ?? $stowedexception");
        let Expr::Coalesce { left, .. } = expr else {
            panic!("expected coalesce");
        };
        let Expr::Cast { ty, .. } = *left else {
            panic!("expected cast");
        };
        assert_eq!(ty.to_string(), "System.Exception");
    }

    #[test]
    fn test_nullable_cast_and_member_access() {
        let expr = parse("((int?)$ReturnValue).HasValue");
        let Expr::Member { target, name, .. } = expr else {
            panic!("expected member access");
        };
        assert_eq!(name, "HasValue");
        assert!(matches!(*target, Expr::Cast { ty: TypeSyntax::Nullable(_), .. }));
    }

    #[test]
    fn test_type_arguments_and_invocation() {
        let expr = parse("$ReturnValue1<object>");
        let Expr::Name { type_args, .. } = expr else {
            panic!("expected name");
        };
        assert_eq!(type_args, vec![TypeSyntax::Keyword(CilPrimitiveKind::Object)]);

        let expr = parse("F(ref x, out y, 1)");
        let Expr::Invoke { args, .. } = expr else {
            panic!("expected invocation");
        };
        let kinds: Vec<ArgumentKind> = args.iter().map(|arg| arg.kind).collect();
        assert_eq!(
            kinds,
            vec![ArgumentKind::Ref, ArgumentKind::Out, ArgumentKind::Value]
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse("x = y += 2");
        let Expr::Assign { op: None, value, .. } = expr else {
            panic!("expected assignment");
        };
        assert!(matches!(
            *value,
            Expr::Assign {
                op: Some(BinaryOp::Add),
                ..
            }
        ));
    }

    #[test]
    fn test_global_and_index() {
        assert_eq!(
            parse("global::$exception"),
            Expr::Global {
                name: "$exception".to_string(),
                position: 0
            }
        );
        let expr = parse("a[1, 2]");
        assert!(matches!(expr, Expr::Index { ref indices, .. } if indices.len() == 2));
        let expr = parse("(int[,])o");
        assert!(matches!(
            expr,
            Expr::Cast {
                ty: TypeSyntax::Array { rank: 2, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            ExpressionParser::new("x +", 64).unwrap().parse(),
            Err(Error::Syntax { position: 3, .. })
        ));
        assert!(matches!(
            ExpressionParser::new("(x", 64).unwrap().parse(),
            Err(Error::Syntax { .. })
        ));
        assert!(matches!(
            ExpressionParser::new("x y", 64).unwrap().parse(),
            Err(Error::Syntax { position: 2, .. })
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let source = format!("{}x{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(
            ExpressionParser::new(&source, 16).unwrap().parse(),
            Err(Error::RecursionLimit(16))
        );
        assert!(ExpressionParser::new(&source, 128).unwrap().parse().is_ok());
    }
}
