use std::ops::Range;

use crate::element::{Attr, AttrValue, Element};
use crate::parser::error::ParseError;
use crate::parser::expression;

/// One item produced by scanning an HTML chunk.
#[derive(Debug, Clone)]
pub enum TagEvent {
    Open(Element),
    SelfClose(Element),
    Close { tag: String, span: Range<usize> },
    /// Text sharing the chunk with a tag; passed through verbatim.
    Raw { text: String },
}

/// Scan one raw HTML chunk (as delivered by the markdown parser) into a
/// sequence of tag events. `base_offset` is the chunk's byte offset within
/// the source file. HTML comments are dropped.
pub fn scan(chunk: &str, base_offset: usize, file_id: usize) -> Result<Vec<TagEvent>, ParseError> {
    let mut scanner = Scanner::new(chunk, base_offset, file_id);
    scanner.run()?;
    Ok(scanner.events)
}

struct Scanner<'a> {
    chars: Vec<char>,
    byte_pos: Vec<usize>,
    chunk: &'a str,
    base_offset: usize,
    file_id: usize,
    i: usize,
    raw_start: usize,
    events: Vec<TagEvent>,
}

impl<'a> Scanner<'a> {
    fn new(chunk: &'a str, base_offset: usize, file_id: usize) -> Self {
        let chars: Vec<char> = chunk.chars().collect();
        let byte_pos: Vec<usize> = {
            let mut bp = Vec::with_capacity(chars.len() + 1);
            let mut offset = 0;
            for c in &chars {
                bp.push(offset);
                offset += c.len_utf8();
            }
            bp.push(offset);
            bp
        };
        Scanner {
            chars,
            byte_pos,
            chunk,
            base_offset,
            file_id,
            i: 0,
            raw_start: 0,
            events: Vec::new(),
        }
    }

    fn span(&self, start: usize, end: usize) -> Range<usize> {
        self.base_offset + self.byte_pos[start]..self.base_offset + self.byte_pos[end]
    }

    fn error(&self, message: impl Into<String>, start: usize) -> ParseError {
        ParseError::new(message, self.span(start, self.i.min(self.chars.len())), self.file_id)
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let len = self.chars.len();
        while self.i < len {
            if self.chars[self.i] == '<' && self.tag_follows() {
                self.flush_raw();
                self.scan_tag()?;
                self.raw_start = self.i;
            } else {
                self.i += 1;
            }
        }
        self.flush_raw();
        Ok(())
    }

    /// True if the '<' at the cursor starts a tag or comment rather than
    /// literal text.
    fn tag_follows(&self) -> bool {
        match self.chars.get(self.i + 1) {
            Some(&'/') => matches!(self.chars.get(self.i + 2), Some(c) if c.is_ascii_alphabetic()),
            Some(&'!') => true,
            Some(c) => c.is_ascii_alphabetic(),
            None => false,
        }
    }

    fn flush_raw(&mut self) {
        if self.raw_start >= self.i {
            return;
        }
        let text = &self.chunk[self.byte_pos[self.raw_start]..self.byte_pos[self.i]];
        if !text.trim().is_empty() {
            self.events.push(TagEvent::Raw {
                text: text.trim_end_matches('\n').to_string(),
            });
        }
    }

    fn scan_tag(&mut self) -> Result<(), ParseError> {
        let start = self.i;
        self.i += 1; // '<'

        // Comment: skip to the closing marker.
        if self.chars.get(self.i) == Some(&'!') {
            let bytes = self.byte_pos[self.i];
            if self.chunk[bytes..].starts_with("!--") {
                match self.chunk[bytes..].find("-->") {
                    Some(rel) => {
                        let end_byte = bytes + rel + 3;
                        while self.i < self.chars.len() && self.byte_pos[self.i] < end_byte {
                            self.i += 1;
                        }
                        return Ok(());
                    }
                    None => return Err(self.error("unterminated comment", start)),
                }
            }
            // Other declarations: skip to '>'.
            while self.i < self.chars.len() && self.chars[self.i] != '>' {
                self.i += 1;
            }
            self.i = (self.i + 1).min(self.chars.len());
            return Ok(());
        }

        // Closing tag.
        if self.chars.get(self.i) == Some(&'/') {
            self.i += 1;
            let tag = self.scan_name();
            self.skip_whitespace();
            if self.chars.get(self.i) != Some(&'>') {
                return Err(self.error(format!("malformed closing tag '</{}'", tag), start));
            }
            self.i += 1;
            self.events.push(TagEvent::Close {
                tag,
                span: self.span(start, self.i),
            });
            return Ok(());
        }

        // Opening tag.
        let tag = self.scan_name();
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.get(self.i) {
                Some(&'>') => {
                    self.i += 1;
                    self.events.push(TagEvent::Open(Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                        span: self.span(start, self.i),
                    }));
                    return Ok(());
                }
                Some(&'/') if self.chars.get(self.i + 1) == Some(&'>') => {
                    self.i += 2;
                    self.events.push(TagEvent::SelfClose(Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                        span: self.span(start, self.i),
                    }));
                    return Ok(());
                }
                Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                    attrs.push(self.scan_attr()?);
                }
                Some(c) => {
                    return Err(self.error(
                        format!("unexpected character '{}' in <{}> tag", c, tag),
                        start,
                    ));
                }
                None => {
                    return Err(self.error(format!("unterminated <{}> tag", tag), start));
                }
            }
        }
    }

    fn scan_name(&mut self) -> String {
        let start = self.i;
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.i += 1;
            } else {
                break;
            }
        }
        self.chars[start..self.i].iter().collect()
    }

    fn scan_attr(&mut self) -> Result<Attr, ParseError> {
        let start = self.i;
        let name = self.scan_name();
        self.skip_whitespace();

        if self.chars.get(self.i) != Some(&'=') {
            return Ok(Attr {
                name,
                value: AttrValue::Flag,
                span: self.span(start, self.i),
            });
        }
        self.i += 1;
        self.skip_whitespace();

        match self.chars.get(self.i) {
            Some(&'"') | Some(&'\'') => {
                let delim = self.chars[self.i];
                self.i += 1;
                let text_start = self.i;
                while self.i < self.chars.len() && self.chars[self.i] != delim {
                    self.i += 1;
                }
                if self.i >= self.chars.len() {
                    return Err(self.error(format!("unterminated value for attribute '{}'", name), start));
                }
                let value: String = self.chars[text_start..self.i].iter().collect();
                self.i += 1;
                Ok(Attr {
                    name,
                    value: AttrValue::Str(value),
                    span: self.span(start, self.i),
                })
            }
            Some(&'{') => {
                self.i += 1;
                let text_start = self.i;
                let mut depth = 1usize;
                let mut in_string: Option<char> = None;
                while self.i < self.chars.len() {
                    let c = self.chars[self.i];
                    match in_string {
                        Some(delim) => {
                            if c == '\\' {
                                self.i += 1;
                            } else if c == delim {
                                in_string = None;
                            }
                        }
                        None => match c {
                            '"' | '\'' => in_string = Some(c),
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        },
                    }
                    self.i += 1;
                }
                if depth != 0 {
                    return Err(self.error(
                        format!("unterminated expression for attribute '{}'", name),
                        start,
                    ));
                }
                let text = &self.chunk[self.byte_pos[text_start]..self.byte_pos[self.i]];
                let expr = expression::parse(
                    text,
                    self.base_offset + self.byte_pos[text_start],
                    self.file_id,
                )?;
                self.i += 1; // closing '}'
                Ok(Attr {
                    name,
                    value: AttrValue::Expr(expr),
                    span: self.span(start, self.i),
                })
            }
            _ => Err(self.error(
                format!("expected a quoted string or {{expression}} for attribute '{}'", name),
                start,
            )),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.i < self.chars.len() && self.chars[self.i].is_whitespace() {
            self.i += 1;
        }
    }
}
