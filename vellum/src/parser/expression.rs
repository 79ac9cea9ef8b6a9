use std::ops::Range;

use crate::expr::{CmpOp, Expr, Handle, Literal};
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    Dot,
    Bang,
    AmpAmp,
    PipePipe,
    EqEq,
    BangEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse the text of an expression attribute (`name={...}`) into an
/// expression tree. `base_offset` is the byte offset of `text` within the
/// source file, so error spans point into the original document.
pub fn parse(text: &str, base_offset: usize, file_id: usize) -> Result<Expr, ParseError> {
    let tokens = tokenize(text, base_offset, file_id)?;
    let end = base_offset + text.len();
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        end_span: end..end,
        file_id,
    };
    let expr = parser.parse_expr(0)?;
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing tokens in expression"));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(
    text: &str,
    base_offset: usize,
    file_id: usize,
) -> Result<Vec<(Token, Range<usize>)>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    // Map character indices to byte offsets within the text.
    let byte_pos: Vec<usize> = {
        let mut bp = Vec::with_capacity(len + 1);
        let mut offset = 0;
        for c in &chars {
            bp.push(offset);
            offset += c.len_utf8();
        }
        bp.push(offset);
        bp
    };
    let span = |start: usize, end: usize| base_offset + byte_pos[start]..base_offset + byte_pos[end];

    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }

            '"' | '\'' => {
                let delim = c;
                let start = i;
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < len {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < len {
                        s.push(chars[i + 1]);
                        i += 2;
                    } else if ch == delim {
                        i += 1;
                        closed = true;
                        break;
                    } else {
                        s.push(ch);
                        i += 1;
                    }
                }
                if !closed {
                    return Err(ParseError::new(
                        "unterminated string literal",
                        span(start, len),
                        file_id,
                    ));
                }
                tokens.push((Token::Str(s), span(start, i)));
            }

            '0'..='9' => {
                let start = i;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let num: String = chars[start..i].iter().collect();
                let n = num.parse::<i64>().map_err(|_| {
                    ParseError::new("integer literal out of range", span(start, i), file_id)
                })?;
                tokens.push((Token::Int(n), span(start, i)));
            }

            '-' if i + 1 < len && chars[i + 1].is_ascii_digit() => {
                let start = i;
                i += 1;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let num: String = chars[start..i].iter().collect();
                let n = num.parse::<i64>().map_err(|_| {
                    ParseError::new("integer literal out of range", span(start, i), file_id)
                })?;
                tokens.push((Token::Int(n), span(start, i)));
            }

            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < len && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let tok = match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(ident),
                };
                tokens.push((tok, span(start, i)));
            }

            '.' => {
                tokens.push((Token::Dot, span(i, i + 1)));
                i += 1;
            }
            '!' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::BangEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Bang, span(i, i + 1)));
                    i += 1;
                }
            }
            '=' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::EqEq, span(i, i + 2)));
                    i += 2;
                } else {
                    return Err(ParseError::new(
                        "'=' is not an operator here (use '==' for comparison)",
                        span(i, i + 1),
                        file_id,
                    ));
                }
            }
            '>' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::GtEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Gt, span(i, i + 1)));
                    i += 1;
                }
            }
            '<' => {
                if i + 1 < len && chars[i + 1] == '=' {
                    tokens.push((Token::LtEq, span(i, i + 2)));
                    i += 2;
                } else {
                    tokens.push((Token::Lt, span(i, i + 1)));
                    i += 1;
                }
            }
            '&' => {
                if i + 1 < len && chars[i + 1] == '&' {
                    tokens.push((Token::AmpAmp, span(i, i + 2)));
                    i += 2;
                } else {
                    return Err(ParseError::new(
                        "single '&' is not an operator (use '&&')",
                        span(i, i + 1),
                        file_id,
                    ));
                }
            }
            '|' => {
                if i + 1 < len && chars[i + 1] == '|' {
                    tokens.push((Token::PipePipe, span(i, i + 2)));
                    i += 2;
                } else {
                    return Err(ParseError::new(
                        "single '|' is not an operator (use '||')",
                        span(i, i + 1),
                        file_id,
                    ));
                }
            }

            '(' => {
                tokens.push((Token::LParen, span(i, i + 1)));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, span(i, i + 1)));
                i += 1;
            }
            '{' => {
                tokens.push((Token::LBrace, span(i, i + 1)));
                i += 1;
            }
            '}' => {
                tokens.push((Token::RBrace, span(i, i + 1)));
                i += 1;
            }
            ':' => {
                tokens.push((Token::Colon, span(i, i + 1)));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, span(i, i + 1)));
                i += 1;
            }

            _ => {
                return Err(ParseError::new(
                    format!("unexpected character '{}' in expression", c),
                    span(i, i + 1),
                    file_id,
                ));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Precedence-climbing parser
// ---------------------------------------------------------------------------

// Binding powers. Higher = tighter binding; comparisons bind tighter than
// the logical combinators.
const BP_OR: u8 = 2;
const BP_AND: u8 = 4;
const BP_CMP: u8 = 6;

struct ExprParser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    end_span: Range<usize>,
    file_id: usize,
}

impl ExprParser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<(Token, Range<usize>)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn current_span(&self) -> Range<usize> {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.clone())
            .unwrap_or(self.end_span.clone())
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current_span(), self.file_id)
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let (bp, op) = match self.peek() {
                Some(Token::PipePipe) => (BP_OR, None),
                Some(Token::AmpAmp) => (BP_AND, None),
                Some(Token::EqEq) => (BP_CMP, Some(CmpOp::Eq)),
                Some(Token::BangEq) => (BP_CMP, Some(CmpOp::Ne)),
                Some(Token::Gt) => (BP_CMP, Some(CmpOp::Gt)),
                Some(Token::GtEq) => (BP_CMP, Some(CmpOp::Ge)),
                Some(Token::Lt) => (BP_CMP, Some(CmpOp::Lt)),
                Some(Token::LtEq) => (BP_CMP, Some(CmpOp::Le)),
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(bp + 1)?;
            lhs = match op {
                Some(op) => Expr::Cmp {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
                None if bp == BP_OR => Expr::Or(Box::new(lhs), Box::new(rhs)),
                None => Expr::And(Box::new(lhs), Box::new(rhs)),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.advance();
                let inner = self.parse_prefix()?;
                Ok(Expr::Not(Box::new(inner)))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr(0)?;
                match self.advance() {
                    Some((Token::RParen, _)) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some((Token::True, _)) => Ok(Expr::Lit(Literal::Bool(true))),
            Some((Token::False, _)) => Ok(Expr::Lit(Literal::Bool(false))),
            Some((Token::Int(n), _)) => Ok(Expr::Lit(Literal::Int(n))),
            Some((Token::Str(s), _)) => Ok(Expr::Lit(Literal::Str(s))),
            Some((Token::Ident(root), _)) => {
                let mut handle = Handle::new(root);
                while self.peek() == Some(&Token::Dot) {
                    self.advance();
                    match self.advance() {
                        Some((Token::Ident(field), _)) => handle = handle.get(field),
                        _ => return Err(self.error("expected a field name after '.'")),
                    }
                }
                Ok(Expr::Ref(handle))
            }
            Some((Token::LBrace, _)) => {
                let object = self.parse_object_body()?;
                Ok(Expr::Lit(object))
            }
            Some((_, span)) => Err(ParseError::new(
                "expected a value, variable reference, or '('",
                span,
                self.file_id,
            )),
            None => Err(self.error("expected an expression")),
        }
    }

    /// Parse the body of an object literal; the opening brace is consumed.
    fn parse_object_body(&mut self) -> Result<Literal, ParseError> {
        let mut entries = Vec::new();
        if self.peek() == Some(&Token::RBrace) {
            self.advance();
            return Ok(Literal::Object(entries));
        }
        loop {
            let key = match self.advance() {
                Some((Token::Ident(k), _)) => k,
                Some((Token::Str(k), _)) => k,
                _ => return Err(self.error("expected an object key")),
            };
            match self.advance() {
                Some((Token::Colon, _)) => {}
                _ => return Err(self.error("expected ':' after object key")),
            }
            entries.push((key, self.parse_literal_value()?));
            match self.advance() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RBrace, _)) => break,
                _ => return Err(self.error("expected ',' or '}' in object literal")),
            }
        }
        Ok(Literal::Object(entries))
    }

    fn parse_literal_value(&mut self) -> Result<Literal, ParseError> {
        match self.advance() {
            Some((Token::True, _)) => Ok(Literal::Bool(true)),
            Some((Token::False, _)) => Ok(Literal::Bool(false)),
            Some((Token::Int(n), _)) => Ok(Literal::Int(n)),
            Some((Token::Str(s), _)) => Ok(Literal::Str(s)),
            Some((Token::LBrace, _)) => self.parse_object_body(),
            _ => Err(self.error("object values must be literals")),
        }
    }
}
