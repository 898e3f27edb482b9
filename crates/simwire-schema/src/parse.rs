//! Parser for Protobuf schema text.
//!
//! The simulation runtime hands over its message definitions as one schema
//! document during the handshake. This parser accepts the subset those
//! documents use: packages, (nested) messages, enums, field labels, `oneof`,
//! `map<,>`, `reserved`, and options. Options, imports, and service blocks
//! are accepted and skipped — only type structure matters for decoding.

use crate::error::SchemaError;

/// Parsed schema document, before type resolution.
#[derive(Debug, Default)]
pub struct SchemaAst {
    /// The `package` declaration, if present.
    pub package: Option<String>,
    /// Top-level messages.
    pub messages: Vec<MessageNode>,
    /// Top-level enums.
    pub enums: Vec<EnumNode>,
}

/// A message declaration.
#[derive(Debug, Default)]
pub struct MessageNode {
    /// Declared name.
    pub name: String,
    /// Fields, including those lifted out of `oneof` groups.
    pub fields: Vec<FieldNode>,
    /// Nested message declarations.
    pub messages: Vec<MessageNode>,
    /// Nested enum declarations.
    pub enums: Vec<EnumNode>,
}

/// An enum declaration.
#[derive(Debug, Default)]
pub struct EnumNode {
    /// Declared name.
    pub name: String,
    /// Declared values.
    pub values: Vec<(String, i32)>,
}

/// A field declaration, type still unresolved.
#[derive(Debug)]
pub struct FieldNode {
    /// Field name, exactly as spelled.
    pub name: String,
    /// Wire field number.
    pub number: u32,
    /// Whether declared `repeated`.
    pub repeated: bool,
    /// The declared type.
    pub ty: TypeRef,
}

/// A type reference as written in the schema.
#[derive(Debug)]
pub enum TypeRef {
    /// A scalar keyword or a (possibly qualified) message/enum name.
    Named(String),
    /// `map<key, value>`.
    Map(String, String),
}

/// Parse schema text into an AST.
pub fn parse_schema(text: &str) -> Result<SchemaAst, SchemaError> {
    let tokens = tokenize(text)?;
    Parser { tokens, pos: 0 }.parse_file()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokenizer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Punct(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("'{s}'"),
            Self::Str(_) => "string literal".to_owned(),
            Self::Int(v) => format!("'{v}'"),
            Self::Punct(c) => format!("'{c}'"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, SchemaError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            c if c.is_ascii_whitespace() => i += 1,
            '/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                loop {
                    if i + 1 >= bytes.len() {
                        return Err(SchemaError::Unterminated {
                            what: "comment",
                            offset: start,
                        });
                    }
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = bytes[i];
                let start = i;
                i += 1;
                let mut s = String::new();
                loop {
                    match bytes.get(i) {
                        None => {
                            return Err(SchemaError::Unterminated {
                                what: "string",
                                offset: start,
                            });
                        }
                        Some(&b) if b == quote => {
                            i += 1;
                            break;
                        }
                        Some(&b'\\') => {
                            // Keep escapes verbatim; literals are only ever
                            // compared or ignored here.
                            if let Some(&esc) = bytes.get(i + 1) {
                                s.push(esc as char);
                            }
                            i += 2;
                        }
                        Some(&b) => {
                            s.push(b as char);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
                let start = i;
                while i < bytes.len() {
                    let b = bytes[i] as char;
                    if b.is_ascii_alphanumeric() || b == '_' || b == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text[start..i].to_owned()));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let value = text[start..i].parse::<i64>().map_err(|_| {
                    SchemaError::InvalidNumber {
                        value: 0,
                        context: "numeric literal",
                    }
                })?;
                tokens.push(Token::Int(value));
            }
            '{' | '}' | ';' | '=' | ',' | '<' | '>' | '[' | ']' | '(' | ')' => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
            other => {
                return Err(SchemaError::UnexpectedChar {
                    found: other,
                    offset: i,
                });
            }
        }
    }

    Ok(tokens)
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse_file(mut self) -> Result<SchemaAst, SchemaError> {
        let mut ast = SchemaAst::default();

        while let Some(token) = self.peek() {
            match token {
                Token::Ident(word) => match word.as_str() {
                    "syntax" | "edition" => {
                        self.skip_statement();
                    }
                    "package" => {
                        self.advance();
                        ast.package = Some(self.expect_ident("package name")?);
                        self.expect_punct(';')?;
                    }
                    "import" | "option" => {
                        self.skip_statement();
                    }
                    "message" => {
                        self.advance();
                        ast.messages.push(self.parse_message()?);
                    }
                    "enum" => {
                        self.advance();
                        ast.enums.push(self.parse_enum()?);
                    }
                    "service" | "extend" => {
                        self.advance();
                        let _ = self.expect_ident("name")?;
                        self.skip_block()?;
                    }
                    _ => {
                        return Err(SchemaError::UnexpectedToken {
                            expected: "a top-level declaration".into(),
                            found: format!("'{word}'"),
                        });
                    }
                },
                Token::Punct(';') => self.advance(),
                other => {
                    return Err(SchemaError::UnexpectedToken {
                        expected: "a top-level declaration".into(),
                        found: other.describe(),
                    });
                }
            }
        }

        Ok(ast)
    }

    fn parse_message(&mut self) -> Result<MessageNode, SchemaError> {
        let mut node = MessageNode {
            name: self.expect_ident("message name")?,
            ..MessageNode::default()
        };
        self.expect_punct('{')?;

        loop {
            let Some(token) = self.peek() else {
                return Err(SchemaError::UnexpectedEof { context: "message" });
            };
            match token {
                Token::Punct('}') => {
                    self.advance();
                    return Ok(node);
                }
                Token::Punct(';') => self.advance(),
                Token::Ident(word) => match word.as_str() {
                    "message" => {
                        self.advance();
                        node.messages.push(self.parse_message()?);
                    }
                    "enum" => {
                        self.advance();
                        node.enums.push(self.parse_enum()?);
                    }
                    "option" | "reserved" | "extensions" => {
                        self.skip_statement();
                    }
                    "oneof" => {
                        self.advance();
                        let _ = self.expect_ident("oneof name")?;
                        self.expect_punct('{')?;
                        // Members become plain optional fields.
                        loop {
                            match self.peek() {
                                Some(Token::Punct('}')) => {
                                    self.advance();
                                    break;
                                }
                                Some(Token::Ident(w)) if w == "option" => self.skip_statement(),
                                Some(_) => node.fields.push(self.parse_field(false)?),
                                None => {
                                    return Err(SchemaError::UnexpectedEof { context: "oneof" });
                                }
                            }
                        }
                    }
                    "repeated" => {
                        self.advance();
                        node.fields.push(self.parse_field(true)?);
                    }
                    "optional" | "required" => {
                        self.advance();
                        node.fields.push(self.parse_field(false)?);
                    }
                    _ => node.fields.push(self.parse_field(false)?),
                },
                other => {
                    return Err(SchemaError::UnexpectedToken {
                        expected: "a field or nested declaration".into(),
                        found: other.describe(),
                    });
                }
            }
        }
    }

    fn parse_field(&mut self, repeated: bool) -> Result<FieldNode, SchemaError> {
        let ty = if matches!(self.peek(), Some(Token::Ident(w)) if w == "map") {
            self.advance();
            self.expect_punct('<')?;
            let key = self.expect_ident("map key type")?;
            self.expect_punct(',')?;
            let value = self.expect_ident("map value type")?;
            self.expect_punct('>')?;
            TypeRef::Map(key, value)
        } else {
            TypeRef::Named(self.expect_ident("field type")?)
        };

        let name = self.expect_ident("field name")?;
        self.expect_punct('=')?;
        let number = self.expect_int("field number")?;
        let number = u32::try_from(number).map_err(|_| SchemaError::InvalidNumber {
            value: number,
            context: "field number",
        })?;
        self.skip_field_options()?;
        self.expect_punct(';')?;

        Ok(FieldNode {
            name,
            number,
            repeated,
            ty,
        })
    }

    fn parse_enum(&mut self) -> Result<EnumNode, SchemaError> {
        let mut node = EnumNode {
            name: self.expect_ident("enum name")?,
            ..EnumNode::default()
        };
        self.expect_punct('{')?;

        loop {
            let Some(token) = self.peek() else {
                return Err(SchemaError::UnexpectedEof { context: "enum" });
            };
            match token {
                Token::Punct('}') => {
                    self.advance();
                    return Ok(node);
                }
                Token::Punct(';') => self.advance(),
                Token::Ident(ref word) if word == "option" || word == "reserved" => {
                    self.skip_statement();
                }
                Token::Ident(_) => {
                    let name = self.expect_ident("enum value name")?;
                    self.expect_punct('=')?;
                    let value = self.expect_int("enum value")?;
                    let value = i32::try_from(value).map_err(|_| SchemaError::InvalidNumber {
                        value,
                        context: "enum value",
                    })?;
                    self.skip_field_options()?;
                    self.expect_punct(';')?;
                    node.values.push((name, value));
                }
                other => {
                    return Err(SchemaError::UnexpectedToken {
                        expected: "an enum value".into(),
                        found: other.describe(),
                    });
                }
            }
        }
    }

    // ─── Token helpers ───────────────────────────────────────────────────

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String, SchemaError> {
        match self.tokens.get(self.pos) {
            Some(Token::Ident(s)) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(SchemaError::UnexpectedToken {
                expected: expected.to_owned(),
                found: other.map_or_else(|| "end of input".to_owned(), Token::describe),
            }),
        }
    }

    fn expect_int(&mut self, expected: &str) -> Result<i64, SchemaError> {
        match self.tokens.get(self.pos) {
            Some(Token::Int(v)) => {
                let v = *v;
                self.advance();
                Ok(v)
            }
            other => Err(SchemaError::UnexpectedToken {
                expected: expected.to_owned(),
                found: other.map_or_else(|| "end of input".to_owned(), Token::describe),
            }),
        }
    }

    fn expect_punct(&mut self, punct: char) -> Result<(), SchemaError> {
        match self.tokens.get(self.pos) {
            Some(Token::Punct(c)) if *c == punct => {
                self.advance();
                Ok(())
            }
            other => Err(SchemaError::UnexpectedToken {
                expected: format!("'{punct}'"),
                found: other.map_or_else(|| "end of input".to_owned(), Token::describe),
            }),
        }
    }

    /// Skip the remainder of a statement through its terminating `;`,
    /// stepping over any balanced braces (aggregate option values).
    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => depth = depth.saturating_sub(1),
                Token::Punct(';') if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip a balanced `{ ... }` block (service/extend bodies).
    fn skip_block(&mut self) -> Result<(), SchemaError> {
        self.expect_punct('{')?;
        let mut depth = 1usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.advance();
        }
        Err(SchemaError::UnexpectedEof { context: "block" })
    }

    /// Skip `[ ... ]` field options if present.
    fn skip_field_options(&mut self) -> Result<(), SchemaError> {
        if matches!(self.peek(), Some(Token::Punct('['))) {
            while let Some(token) = self.peek() {
                let done = matches!(token, Token::Punct(']'));
                self.advance();
                if done {
                    return Ok(());
                }
            }
            return Err(SchemaError::UnexpectedEof {
                context: "field options",
            });
        }
        Ok(())
    }
}
