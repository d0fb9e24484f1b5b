//! Declaration file parser built on `nom`.
//!
//! Transforms raw declaration text into a validated AST through
//! lexing, parsing, and static analysis phases.

pub mod ast;
pub mod lexer;
pub mod validator;

use std::collections::BTreeMap;
use std::path::Path;

use modgraph_common::constants::{
    COUNT_ATTRIBUTE, FOR_EACH_ATTRIBUTE, MODULE_BLOCK, SOURCE_ATTRIBUTE, VARIABLE_NAMESPACE,
};
use modgraph_common::error::{ModgraphError, Result};
use modgraph_common::types::{InstanceKey, Value, Variables};

use self::ast::{DeclarationFile, Expression, ModuleDeclaration};
use self::lexer::Token;

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Identifier(s)) => Ok(s.clone()),
            other => Err(parse_err(format!("expected identifier, got {other:?}"))),
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            other => Err(parse_err(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::StringLiteral(s)) => Ok(s.clone()),
            other => Err(parse_err(format!("expected string literal, got {other:?}"))),
        }
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

const fn parse_err(message: String) -> ModgraphError {
    ModgraphError::Parse { message }
}

const fn declaration_err(message: String) -> ModgraphError {
    ModgraphError::Declaration { message }
}

fn skip_optional_comma(cursor: &mut TokenCursor<'_>) {
    if cursor.peek() == Some(&Token::Comma) {
        let _ = cursor.advance();
    }
}

/// Parses module declarations from source text and validates them.
///
/// # Errors
///
/// Returns an error if the input contains syntax errors or fails validation.
pub fn parse_declarations(input: &str) -> Result<DeclarationFile> {
    tracing::info!("parsing declarations");
    let tokens = lexer::tokenize(input)?;
    let mut cursor = TokenCursor::new(&tokens);
    let file = parse_file_body(&mut cursor)?;
    validator::validate(&file.modules)?;
    Ok(file)
}

/// Reads and parses a declaration file from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn parse_file(path: &Path) -> Result<DeclarationFile> {
    tracing::info!(path = %path.display(), "loading declaration file");
    let content = std::fs::read_to_string(path).map_err(|e| ModgraphError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_declarations(&content)
}

/// Parses `name = <literal>` assignments, the body of a variables file.
///
/// # Errors
///
/// Returns an error on syntax errors, non-literal values, or a variable
/// assigned twice.
pub fn parse_variables(input: &str) -> Result<Variables> {
    let tokens = lexer::tokenize(input)?;
    let mut cursor = TokenCursor::new(&tokens);
    let mut variables = Variables::new();

    while !cursor.at_end() {
        let name = cursor.expect_identifier()?;
        cursor.expect_token(&Token::Equals)?;
        let value = literal_value(&mut cursor, "variable values")?;
        if variables.insert(name.clone(), value).is_some() {
            return Err(declaration_err(format!(
                "variable \"{name}\" is assigned more than once"
            )));
        }
        skip_optional_comma(&mut cursor);
    }

    tracing::debug!(variables = variables.len(), "parsed variables");
    Ok(variables)
}

/// Interprets a `name=value` command-line value.
///
/// Literals (`3`, `true`, `"quoted"`, `{ a = 1 }`, `[1, 2]`) keep their type;
/// anything else is taken as a plain string.
#[must_use]
pub fn parse_variable_value(raw: &str) -> Value {
    match parse_expression(raw) {
        Ok(Expression::Literal(value)) => value,
        _ => Value::Str(raw.to_owned()),
    }
}

/// Parses a single standalone expression.
///
/// # Errors
///
/// Returns an error if the input is not exactly one well-formed expression.
pub fn parse_expression(input: &str) -> Result<Expression> {
    let tokens = lexer::tokenize(input)?;
    let mut cursor = TokenCursor::new(&tokens);
    let expr = expression(&mut cursor)?;
    if let Some(extra) = cursor.peek() {
        return Err(parse_err(format!(
            "unexpected {extra:?} after expression"
        )));
    }
    Ok(expr)
}

fn parse_file_body(cursor: &mut TokenCursor<'_>) -> Result<DeclarationFile> {
    let mut file = DeclarationFile::default();

    while let Some(tok) = cursor.peek() {
        match tok {
            Token::Identifier(word) if word == MODULE_BLOCK => {
                file.modules.push(parse_module(cursor)?);
            }
            other => {
                return Err(parse_err(format!(
                    "expected `{MODULE_BLOCK}` block at top level, got {other:?}"
                )));
            }
        }
    }

    Ok(file)
}

fn parse_module(cursor: &mut TokenCursor<'_>) -> Result<ModuleDeclaration> {
    let _ = cursor.expect_identifier()?;
    let name = cursor.expect_string()?;
    cursor.expect_token(&Token::BraceOpen)?;

    let mut decl = ModuleDeclaration {
        name,
        ..ModuleDeclaration::default()
    };
    let mut has_source = false;

    while cursor.peek() != Some(&Token::BraceClose) {
        if cursor.at_end() {
            return Err(parse_err(format!(
                "unexpected end of input inside module \"{}\"",
                decl.name
            )));
        }
        let key = cursor.expect_identifier()?;
        cursor.expect_token(&Token::Equals)?;
        let value = expression(cursor)?;
        match key.as_str() {
            SOURCE_ATTRIBUTE => {
                if has_source {
                    return Err(duplicate_attribute(&decl.name, &key));
                }
                decl.source = match value {
                    Expression::Literal(Value::Str(s)) => s,
                    _ => {
                        return Err(parse_err(format!(
                            "module \"{}\": source must be a string literal",
                            decl.name
                        )));
                    }
                };
                has_source = true;
            }
            FOR_EACH_ATTRIBUTE => {
                if decl.for_each.replace(value).is_some() {
                    return Err(duplicate_attribute(&decl.name, &key));
                }
            }
            COUNT_ATTRIBUTE => {
                if decl.count.replace(value).is_some() {
                    return Err(duplicate_attribute(&decl.name, &key));
                }
            }
            _ => {
                if decl.arguments.insert(key.clone(), value).is_some() {
                    return Err(duplicate_attribute(&decl.name, &key));
                }
            }
        }
        skip_optional_comma(cursor);
    }

    cursor.expect_token(&Token::BraceClose)?;
    Ok(decl)
}

fn duplicate_attribute(module: &str, attribute: &str) -> ModgraphError {
    declaration_err(format!(
        "module \"{module}\" sets attribute \"{attribute}\" more than once"
    ))
}

fn expression(cursor: &mut TokenCursor<'_>) -> Result<Expression> {
    let mut expr = primary(cursor)?;

    loop {
        match cursor.peek() {
            Some(Token::BracketOpen) => {
                let _ = cursor.advance();
                let key = expression(cursor)?;
                cursor.expect_token(&Token::BracketClose)?;
                expr = apply_index(expr, key);
            }
            Some(Token::Dot) => {
                let _ = cursor.advance();
                let attribute = cursor.expect_identifier()?;
                expr = match expr {
                    Expression::AttributeRef {
                        module,
                        key,
                        mut path,
                    } => {
                        path.push(attribute);
                        Expression::AttributeRef { module, key, path }
                    }
                    Expression::VariableRef { name, mut path } => {
                        path.push(attribute);
                        Expression::VariableRef { name, path }
                    }
                    other => Expression::indexed(other, Expression::literal(attribute)),
                };
            }
            _ => break,
        }
    }

    Ok(expr)
}

/// Folds a literal key directly after `module.<name>` into the reference.
fn apply_index(target: Expression, key: Expression) -> Expression {
    match target {
        Expression::AttributeRef {
            module,
            key: None,
            path,
        } if path.is_empty() => match key.as_literal().and_then(InstanceKey::from_value) {
            Some(instance_key) => Expression::AttributeRef {
                module,
                key: Some(instance_key),
                path,
            },
            None => Expression::indexed(Expression::whole_module(module), key),
        },
        other => Expression::indexed(other, key),
    }
}

fn primary(cursor: &mut TokenCursor<'_>) -> Result<Expression> {
    match cursor.peek() {
        Some(Token::StringLiteral(_)) => Ok(Expression::literal(cursor.expect_string()?)),
        Some(&Token::Integer(n)) => {
            let _ = cursor.advance();
            Ok(Expression::literal(n))
        }
        Some(Token::True) => {
            let _ = cursor.advance();
            Ok(Expression::literal(true))
        }
        Some(Token::False) => {
            let _ = cursor.advance();
            Ok(Expression::literal(false))
        }
        Some(Token::BraceOpen) => parse_map_literal(cursor).map(Expression::Literal),
        Some(Token::BracketOpen) => parse_list_literal(cursor).map(Expression::Literal),
        Some(Token::ParenOpen) => {
            let _ = cursor.advance();
            let inner = expression(cursor)?;
            cursor.expect_token(&Token::ParenClose)?;
            Ok(inner)
        }
        Some(Token::Identifier(word)) if word == MODULE_BLOCK => {
            let _ = cursor.advance();
            cursor.expect_token(&Token::Dot)?;
            let module = cursor.expect_identifier()?;
            Ok(Expression::whole_module(module))
        }
        Some(Token::Identifier(word)) if word == VARIABLE_NAMESPACE => {
            let _ = cursor.advance();
            cursor.expect_token(&Token::Dot)?;
            let name = cursor.expect_identifier()?;
            Ok(Expression::var(name))
        }
        Some(Token::Identifier(_)) if cursor.peek_next() == Some(&Token::ParenOpen) => {
            parse_call(cursor)
        }
        Some(Token::Identifier(word)) => Err(parse_err(format!(
            "unsupported reference \"{word}\": only module.<name> and var.<name> references are allowed"
        ))),
        other => Err(parse_err(format!("expected expression, got {other:?}"))),
    }
}

fn parse_call(cursor: &mut TokenCursor<'_>) -> Result<Expression> {
    let name = cursor.expect_identifier()?;
    cursor.expect_token(&Token::ParenOpen)?;
    let mut args = Vec::new();

    while cursor.peek() != Some(&Token::ParenClose) {
        if cursor.at_end() {
            return Err(parse_err(format!(
                "unexpected end of input inside call to {name}()"
            )));
        }
        args.push(expression(cursor)?);
        skip_optional_comma(cursor);
    }

    cursor.expect_token(&Token::ParenClose)?;
    Ok(Expression::call(name, args))
}

fn literal_value(cursor: &mut TokenCursor<'_>, context: &str) -> Result<Value> {
    match expression(cursor)? {
        Expression::Literal(value) => Ok(value),
        _ => Err(parse_err(format!("{context} may only contain literals"))),
    }
}

fn parse_map_literal(cursor: &mut TokenCursor<'_>) -> Result<Value> {
    cursor.expect_token(&Token::BraceOpen)?;
    let mut map = BTreeMap::new();

    while cursor.peek() != Some(&Token::BraceClose) {
        if cursor.at_end() {
            return Err(parse_err("unexpected end of input inside mapping".into()));
        }
        let key = match cursor.advance() {
            Some(Token::Identifier(s) | Token::StringLiteral(s)) => s.clone(),
            Some(Token::Integer(n)) => n.to_string(),
            other => {
                return Err(parse_err(format!("expected mapping key, got {other:?}")));
            }
        };
        match cursor.advance() {
            Some(Token::Equals | Token::Colon) => {}
            other => {
                return Err(parse_err(format!("expected `=` or `:`, got {other:?}")));
            }
        }
        let value = literal_value(cursor, "inline mappings")?;
        if map.insert(key.clone(), value).is_some() {
            return Err(declaration_err(format!(
                "duplicate key \"{key}\" in mapping"
            )));
        }
        skip_optional_comma(cursor);
    }

    cursor.expect_token(&Token::BraceClose)?;
    Ok(Value::Map(map))
}

fn parse_list_literal(cursor: &mut TokenCursor<'_>) -> Result<Value> {
    cursor.expect_token(&Token::BracketOpen)?;
    let mut items = Vec::new();

    while cursor.peek() != Some(&Token::BracketClose) {
        if cursor.at_end() {
            return Err(parse_err("unexpected end of input inside list".into()));
        }
        items.push(literal_value(cursor, "inline lists")?);
        skip_optional_comma(cursor);
    }

    cursor.expect_token(&Token::BracketClose)?;
    Ok(Value::List(items))
}
