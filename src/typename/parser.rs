use crate::{
    metadata::identity::AssemblyIdentityRef,
    typename::{
        total_arity, NameSegment, TypeNameError, TypeOrigin, TypeStructuralReference,
        TypeSuffix, MAX_ARRAY_RANK, MAX_GENERIC_ARITY,
    },
};

/// Characters that terminate an identifier unless escaped
pub(crate) fn is_metacharacter(c: char) -> bool {
    matches!(c, ',' | '+' | '[' | ']' | '*' | '&' | '\\' | '`')
}

/// Recursive descent parser for assembly-qualified type names
///
/// # Example
///
/// ```rust
/// use exprscope::typename::TypeNameParser;
///
/// let reference = TypeNameParser::new("System.Int32[], mscorlib", 64).parse()?;
/// assert_eq!(reference.full_name(), "System.Int32");
/// assert_eq!(reference.array_rank(), 1);
/// # Ok::<(), exprscope::typename::TypeNameError>(())
/// ```
///
/// A parser instance is consumed by [`TypeNameParser::parse`], create one per input.
pub struct TypeNameParser {
    chars: Vec<char>,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl TypeNameParser {
    /// Create a parser over `input` that rejects generic nesting deeper than `max_depth`
    #[must_use]
    pub fn new(input: &str, max_depth: usize) -> Self {
        TypeNameParser {
            chars: input.chars().collect(),
            position: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Parse the whole input as one assembly-qualified name
    ///
    /// # Errors
    /// Returns a [`TypeNameError`] describing the first syntax problem.
    pub fn parse(mut self) -> Result<TypeStructuralReference, TypeNameError> {
        let reference = self.parse_qualified(true)?;
        self.skip_whitespace();
        match self.peek() {
            None => Ok(reference),
            Some(character) => Err(self.unexpected(character)),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_past_whitespace(&self, from: usize) -> Option<char> {
        self.chars[from.min(self.chars.len())..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn unexpected(&self, character: char) -> TypeNameError {
        TypeNameError::UnexpectedCharacter {
            character,
            position: self.position,
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), TypeNameError> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.position += 1;
                Ok(())
            }
            Some(c) => Err(self.unexpected(c)),
            None => Err(TypeNameError::UnexpectedEnd),
        }
    }

    /// `TypeSpec [ ',' AssemblyName ]`, the assembly name runs to the end of input at the
    /// top level and up to the closing bracket inside a generic argument.
    fn parse_qualified(&mut self, top_level: bool) -> Result<TypeStructuralReference, TypeNameError> {
        let mut reference = self.parse_type_spec()?;
        self.skip_whitespace();

        if self.peek() == Some(',') {
            self.position += 1;
            let start = self.position;
            while let Some(c) = self.peek() {
                if !top_level && c == ']' {
                    break;
                }
                self.position += 1;
            }
            let text: String = self.chars[start..self.position].iter().collect();
            let assembly = AssemblyIdentityRef::parse(text.trim())?;
            reference.origin = TypeOrigin::Assembly(assembly);
        }

        Ok(reference)
    }

    fn parse_type_spec(&mut self) -> Result<TypeStructuralReference, TypeNameError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(TypeNameError::NestingTooDeep(self.max_depth));
        }

        let path = self.parse_name_path()?;
        let arity = total_arity(&path);

        self.skip_whitespace();
        let mut generic_args = Vec::new();
        if arity > 0 && self.peek() == Some('[') {
            let next = self.peek_past_whitespace(self.position + 1);
            if !matches!(next, Some(']' | ',' | '*')) {
                generic_args = self.parse_generic_args()?;
            }
        }
        if generic_args.len() != arity {
            return Err(TypeNameError::ArityMismatch {
                expected: arity,
                found: generic_args.len(),
            });
        }

        let suffixes = self.parse_suffixes()?;

        self.depth -= 1;
        Ok(TypeStructuralReference {
            path,
            generic_args,
            suffixes,
            origin: TypeOrigin::Unqualified,
        })
    }

    fn parse_name_path(&mut self) -> Result<Vec<NameSegment>, TypeNameError> {
        let mut path = vec![self.parse_segment()?];
        while self.peek() == Some('+') {
            self.position += 1;
            path.push(self.parse_segment()?);
        }
        Ok(path)
    }

    fn parse_segment(&mut self) -> Result<NameSegment, TypeNameError> {
        self.skip_whitespace();
        let start = self.position;
        let mut name = String::new();

        while let Some(c) = self.peek() {
            if c == '\\' {
                self.position += 1;
                let escaped = self.advance().ok_or(TypeNameError::UnexpectedEnd)?;
                name.push(escaped);
            } else if is_metacharacter(c) || c.is_whitespace() {
                break;
            } else {
                name.push(c);
                self.position += 1;
            }
        }

        if name.is_empty() {
            return Err(match self.peek() {
                None => TypeNameError::UnexpectedEnd,
                Some(_) => TypeNameError::EmptyName(start),
            });
        }

        let mut arity = 0;
        if self.peek() == Some('`') {
            let arity_position = self.position;
            self.position += 1;
            let digits_start = self.position;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.position += 1;
            }
            let digits: String = self.chars[digits_start..self.position].iter().collect();
            arity = match digits.parse::<usize>() {
                Ok(value) if (1..=MAX_GENERIC_ARITY).contains(&value) => value,
                _ => return Err(TypeNameError::InvalidArity(arity_position)),
            };
        }

        Ok(NameSegment::new(name, arity))
    }

    fn parse_generic_args(&mut self) -> Result<Vec<TypeStructuralReference>, TypeNameError> {
        self.expect('[')?;
        let mut args = Vec::new();

        loop {
            self.skip_whitespace();
            let arg = if self.peek() == Some('[') {
                self.position += 1;
                let arg = self.parse_qualified(false)?;
                self.expect(']')?;
                arg
            } else {
                self.parse_type_spec()?
            };
            args.push(arg);

            self.skip_whitespace();
            match self.advance() {
                Some(',') => continue,
                Some(']') => break,
                Some(c) => {
                    self.position -= 1;
                    return Err(self.unexpected(c));
                }
                None => return Err(TypeNameError::UnexpectedEnd),
            }
        }

        Ok(args)
    }

    fn parse_suffixes(&mut self) -> Result<Vec<TypeSuffix>, TypeNameError> {
        let mut suffixes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') => {
                    self.position += 1;
                    suffixes.push(TypeSuffix::Pointer);
                }
                Some('&') => {
                    self.position += 1;
                    suffixes.push(TypeSuffix::ByRef);
                }
                Some('[') => {
                    self.position += 1;
                    suffixes.push(TypeSuffix::Array(self.parse_array_rank()?));
                }
                _ => break,
            }
        }

        Ok(suffixes)
    }

    fn parse_array_rank(&mut self) -> Result<u32, TypeNameError> {
        self.skip_whitespace();
        if self.peek() == Some('*') {
            self.position += 1;
            self.expect(']')?;
            return Ok(1);
        }

        let mut rank: u32 = 1;
        loop {
            self.skip_whitespace();
            match self.advance() {
                Some(',') => rank = rank.saturating_add(1),
                Some(']') => break,
                Some(c) => {
                    self.position -= 1;
                    return Err(self.unexpected(c));
                }
                None => return Err(TypeNameError::UnexpectedEnd),
            }
        }

        if rank > MAX_ARRAY_RANK {
            return Err(TypeNameError::InvalidArrayRank(rank));
        }
        Ok(rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::identity::AssemblyVersion;

    fn parse(input: &str) -> Result<TypeStructuralReference, TypeNameError> {
        TypeStructuralReference::parse(input)
    }

    #[test]
    fn test_parse_simple_names() {
        let reference = parse("System.Int32").unwrap();
        assert_eq!(reference.path, vec![NameSegment::new("System.Int32", 0)]);
        assert_eq!(reference.origin, TypeOrigin::Unqualified);

        let reference = parse("  C+S`1[System.Int32]  ").unwrap();
        assert_eq!(reference.full_name(), "C+S`1");
        assert_eq!(reference.generic_args[0].full_name(), "System.Int32");
    }

    #[test]
    fn test_parse_assembly_qualified() {
        let reference = parse(
            "System.Exception, mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
        )
        .unwrap();
        match reference.origin {
            TypeOrigin::Assembly(assembly) => {
                assert_eq!(assembly.name, "mscorlib");
                assert_eq!(assembly.version, Some(AssemblyVersion::new(4, 0, 0, 0)));
            }
            other => panic!("unexpected origin {other:?}"),
        }
    }

    #[test]
    fn test_parse_nested_generic_arguments() {
        let reference = parse("A`1[[B`1[[System.Object, mscorlib]], B]], A").unwrap();
        assert_eq!(reference.arity(), 1);

        let b = &reference.generic_args[0];
        assert!(matches!(&b.origin, TypeOrigin::Assembly(a) if a.name == "B"));
        let object = &b.generic_args[0];
        assert_eq!(object.full_name(), "System.Object");
        assert!(matches!(&object.origin, TypeOrigin::Assembly(a) if a.name == "mscorlib"));
    }

    #[test]
    fn test_parse_mixed_argument_forms() {
        let reference = parse("Dictionary`2[System.String,[System.Int32, mscorlib]]").unwrap();
        assert_eq!(reference.generic_args.len(), 2);
        assert_eq!(reference.generic_args[0].origin, TypeOrigin::Unqualified);
        assert!(matches!(
            reference.generic_args[1].origin,
            TypeOrigin::Assembly(_)
        ));
    }

    #[test]
    fn test_parse_suffixes() {
        let reference = parse("System.Int32[][,]*&").unwrap();
        assert_eq!(
            reference.suffixes,
            vec![
                TypeSuffix::Array(1),
                TypeSuffix::Array(2),
                TypeSuffix::Pointer,
                TypeSuffix::ByRef
            ]
        );
        assert_eq!(reference.array_rank(), 0);
        assert!(reference.has_indirection());

        assert_eq!(parse("T[*]").unwrap().suffixes, vec![TypeSuffix::Array(1)]);
    }

    #[test]
    fn test_parse_open_generic_array() {
        // An arity followed by an array suffix is an open generic, not an argument list
        assert_eq!(
            parse("List`1[]"),
            Err(TypeNameError::ArityMismatch {
                expected: 1,
                found: 0
            })
        );
    }

    #[test]
    fn test_parse_arity_mismatch() {
        assert_eq!(
            parse("A`2[B]"),
            Err(TypeNameError::ArityMismatch {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            parse("A`1"),
            Err(TypeNameError::ArityMismatch {
                expected: 1,
                found: 0
            })
        );
    }

    #[test]
    fn test_parse_invalid_arity() {
        assert_eq!(parse("A`[B]"), Err(TypeNameError::InvalidArity(1)));
        assert_eq!(parse("A`0"), Err(TypeNameError::InvalidArity(1)));
    }

    #[test]
    fn test_parse_arity_out_of_range() {
        assert_eq!(
            parse("A`18446744073709551615+B`1[X]"),
            Err(TypeNameError::InvalidArity(1))
        );
        assert_eq!(
            parse("A`99999999999999999999999"),
            Err(TypeNameError::InvalidArity(1))
        );
        assert_eq!(parse("A`65536"), Err(TypeNameError::InvalidArity(1)));
        assert_eq!(
            parse("A+B`65536[X]"),
            Err(TypeNameError::InvalidArity(3))
        );

        // Arities of nested segments add up
        let reference = parse("A`1+B`1[X,Y]").unwrap();
        assert_eq!(reference.arity(), 2);
    }

    #[test]
    fn test_parse_escaped_backtick_is_not_arity() {
        let reference = parse(r"A\`1").unwrap();
        assert_eq!(reference.path, vec![NameSegment::new("A`1", 0)]);
        assert_eq!(reference.arity(), 0);
        assert!(reference.generic_args.is_empty());
        assert_eq!(reference.type_name(), r"A\`1");

        // An escaped backtick followed by a real arity
        let reference = parse(r"A\`1`1[X]").unwrap();
        assert_eq!(reference.path, vec![NameSegment::new("A`1", 1)]);
        assert_eq!(reference.type_name(), r"A\`1`1[X]");
        assert_eq!(
            parse(r"A\`1[X]"),
            Err(TypeNameError::UnexpectedCharacter {
                character: 'X',
                position: 5
            })
        );
    }

    #[test]
    fn test_parse_structural_errors() {
        assert_eq!(parse(""), Err(TypeNameError::UnexpectedEnd));
        assert_eq!(parse("A+"), Err(TypeNameError::UnexpectedEnd));
        assert_eq!(parse("A++B"), Err(TypeNameError::EmptyName(2)));
        assert_eq!(parse("A`1[B"), Err(TypeNameError::UnexpectedEnd));
        assert_eq!(
            parse("A[x]"),
            Err(TypeNameError::UnexpectedCharacter {
                character: 'x',
                position: 2
            })
        );
        assert_eq!(
            parse("A`1[[B]"),
            Err(TypeNameError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_parse_invalid_array_rank() {
        let text = format!("A[{}]", ",".repeat(32));
        assert_eq!(parse(&text), Err(TypeNameError::InvalidArrayRank(33)));
        let text = format!("A[{}]", ",".repeat(31));
        assert_eq!(parse(&text).unwrap().array_rank(), 32);
    }

    #[test]
    fn test_parse_malformed_assembly() {
        assert!(matches!(
            parse("A, "),
            Err(TypeNameError::InvalidAssemblyName(_))
        ));
        assert!(matches!(
            parse("A, B, Version=one"),
            Err(TypeNameError::InvalidVersion(_))
        ));
        assert!(matches!(
            parse("A, B, PublicKeyToken=xyz"),
            Err(TypeNameError::InvalidPublicKeyToken(_))
        ));
    }

    #[test]
    fn test_parse_escapes() {
        let reference = parse(r"A\+B+C\[\]").unwrap();
        assert_eq!(
            reference.path,
            vec![NameSegment::new("A+B", 0), NameSegment::new("C[]", 0)]
        );
        assert_eq!(parse(r"A\"), Err(TypeNameError::UnexpectedEnd));
    }

    #[test]
    fn test_parse_nesting_limit() {
        let mut text = "X".to_string();
        for _ in 0..4 {
            text = format!("G`1[{text}]");
        }
        assert!(TypeStructuralReference::parse_with_max_depth(&text, 5).is_ok());
        assert_eq!(
            TypeStructuralReference::parse_with_max_depth(&text, 4),
            Err(TypeNameError::NestingTooDeep(4))
        );
    }
}
