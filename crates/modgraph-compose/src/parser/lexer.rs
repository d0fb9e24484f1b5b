//! Tokenization of declaration source text using `nom`.
//!
//! Produces a stream of [`Token`]s from raw input for the parser to consume.
//! Whitespace, `//` line comments and `#` line comments are discarded
//! between tokens.

use modgraph_common::error::{ModgraphError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, not_line_ending},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::preceded,
};

/// A token in the declaration language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Boolean literal `true`.
    True,
    /// Boolean literal `false`.
    False,
    /// An identifier (block type, attribute name, function name).
    Identifier(String),
    /// A double-quoted string literal.
    StringLiteral(String),
    /// An integer literal, optionally negative.
    Integer(i64),
    /// `{` opening brace.
    BraceOpen,
    /// `}` closing brace.
    BraceClose,
    /// `[` opening bracket.
    BracketOpen,
    /// `]` closing bracket.
    BracketClose,
    /// `(` opening parenthesis.
    ParenOpen,
    /// `)` closing parenthesis.
    ParenClose,
    /// `.` attribute access.
    Dot,
    /// `=` assignment.
    Equals,
    /// `:` mapping entry separator.
    Colon,
    /// `,` comma separator.
    Comma,
}

/// Skippable items: whitespace or line comments.
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    let slash_comment = value((), preceded(tag("//"), not_line_ending));
    let hash_comment = value((), preceded(char('#'), not_line_ending));
    let ws = value((), multispace1);
    let (input, _) = many0(alt((ws, slash_comment, hash_comment))).parse(input)?;
    Ok((input, ()))
}

/// Parses a double-quoted string literal with basic escape support.
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('"')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => {
                let remaining = &input[idx + 1..];
                return Ok((remaining, Token::StringLiteral(result)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Char,
                    )));
                }
            },
            Some((_, c)) => result.push(c),
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parses an integer literal with an optional leading minus sign.
fn integer_literal(input: &str) -> IResult<&str, Token> {
    let (rest, digits) = recognize((opt(char('-')), digit1)).parse(input)?;
    let val: i64 = digits.parse().map_err(|_| {
        nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
    })?;
    Ok((rest, Token::Integer(val)))
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Parses an identifier or boolean keyword.
fn identifier_or_keyword(input: &str) -> IResult<&str, Token> {
    let (input, word) =
        recognize((take_while1(is_ident_start), take_while(is_ident_continue))).parse(input)?;
    let token = match word {
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Identifier(word.to_owned()),
    };
    Ok((input, token))
}

/// Parses a symbol token.
fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::BraceOpen, char('{')),
        value(Token::BraceClose, char('}')),
        value(Token::BracketOpen, char('[')),
        value(Token::BracketClose, char(']')),
        value(Token::ParenOpen, char('(')),
        value(Token::ParenClose, char(')')),
        value(Token::Dot, char('.')),
        value(Token::Equals, char('=')),
        value(Token::Colon, char(':')),
        value(Token::Comma, char(',')),
    ))
    .parse(input)
}

/// Parses a single token (after trivia has been skipped).
fn single_token(input: &str) -> IResult<&str, Token> {
    alt((
        string_literal,
        symbol,
        integer_literal,
        identifier_or_keyword,
    ))
    .parse(input)
}

/// Tokenizes declaration source text into a vector of tokens.
///
/// # Errors
///
/// Returns an error if the input contains characters that cannot be tokenized.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = skip_trivia(remaining).map_err(|e| ModgraphError::Parse {
            message: format!("lexer error skipping whitespace: {e}"),
        })?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let (rest, token) = single_token(remaining).map_err(|e| ModgraphError::Parse {
            message: format!(
                "unexpected character at: \"{}\" ({e})",
                remaining.chars().take(20).collect::<String>()
            ),
        })?;
        tokens.push(token);
        remaining = rest;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_symbols() {
        let tokens = tokenize("{ } [ ] ( ) . = : ,").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::BraceOpen,
                Token::BraceClose,
                Token::BracketOpen,
                Token::BracketClose,
                Token::ParenOpen,
                Token::ParenClose,
                Token::Dot,
                Token::Equals,
                Token::Colon,
                Token::Comma,
            ]
        );
    }

    #[test]
    fn tokenize_string_with_escapes() {
        let tokens = tokenize(r#""line\nnew\ttab\\slash\"quote""#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::StringLiteral("line\nnew\ttab\\slash\"quote".into())]
        );
    }

    #[test]
    fn tokenize_unterminated_string_fails() {
        assert!(tokenize(r#""open"#).is_err());
    }

    #[test]
    fn tokenize_signed_integers() {
        let tokens = tokenize("2 -7 0").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::Integer(2), Token::Integer(-7), Token::Integer(0)]
        );
    }

    #[test]
    fn tokenize_identifiers_and_booleans() {
        let tokens = tokenize("for_each my-mod true false").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("for_each".into()),
                Token::Identifier("my-mod".into()),
                Token::True,
                Token::False,
            ]
        );
    }

    #[test]
    fn tokenize_skips_both_comment_styles() {
        let input = "module // trailing\n# whole line\n\"bar\"";
        let tokens = tokenize(input).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("module".into()),
                Token::StringLiteral("bar".into()),
            ]
        );
    }

    #[test]
    fn tokenize_attribute_reference() {
        let tokens = tokenize(r#"module.bar["x"].digest"#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("module".into()),
                Token::Dot,
                Token::Identifier("bar".into()),
                Token::BracketOpen,
                Token::StringLiteral("x".into()),
                Token::BracketClose,
                Token::Dot,
                Token::Identifier("digest".into()),
            ]
        );
    }

    #[test]
    fn tokenize_empty_input() {
        assert!(tokenize("").expect("should tokenize").is_empty());
        assert!(tokenize("  // only\n# comments").expect("should tokenize").is_empty());
    }

    #[test]
    fn tokenize_error_on_invalid_char() {
        assert!(tokenize("module @bar").is_err());
    }
}
