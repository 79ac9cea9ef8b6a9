use std::ops::Range;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd};

use crate::SourceDoc;
use crate::ast::{ColumnAlignment, Inline, Node};
use crate::element::Element;
use crate::frontmatter::{self, FrontMatter};
use crate::parser::error::ParseError;
use crate::parser::tag::{self, TagEvent};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a source document: front matter plus a markdown body with embedded
/// component elements.
pub fn parse_document(source: &str, file_id: usize) -> Result<SourceDoc, Vec<ParseError>> {
    let (yaml, body_offset) = frontmatter::split(source);
    let meta_span = if yaml.is_some() { 0..body_offset } else { 0..0 };

    let meta = match yaml {
        Some(yaml) => match frontmatter::parse(yaml) {
            Ok(meta) => meta,
            Err(message) => {
                return Err(vec![ParseError::new(message, meta_span, file_id)]);
            }
        },
        None => FrontMatter::empty(),
    };

    let options = Options::ENABLE_TABLES;
    let parser = CmarkParser::new_ext(&source[body_offset..], options);
    let events: Vec<(Event<'_>, Range<usize>)> = parser
        .into_offset_iter()
        .map(|(ev, range)| (ev, range.start + body_offset..range.end + body_offset))
        .collect();

    let mut collector = Collector {
        file_id,
        errors: Vec::new(),
    };
    let mut i = 0;
    let nodes = collector.collect_nodes(&events, &mut i, None);

    if collector.errors.is_empty() {
        Ok(SourceDoc {
            meta,
            meta_span,
            nodes,
            source_id: file_id,
        })
    } else {
        Err(collector.errors)
    }
}

// ---------------------------------------------------------------------------
// Node collector
// ---------------------------------------------------------------------------

struct Collector {
    file_id: usize,
    errors: Vec<ParseError>,
}

/// Open element under construction, with the children gathered so far.
struct OpenElement {
    element: Element,
    children: Vec<Node>,
}

impl Collector {
    /// Collect block-level nodes until the end predicate matches (or events
    /// run out). Each invocation keeps its own element stack: an element
    /// cannot span a list-item or quote boundary.
    fn collect_nodes(
        &mut self,
        events: &[(Event<'_>, Range<usize>)],
        i: &mut usize,
        until: Option<&dyn Fn(&TagEnd) -> bool>,
    ) -> Vec<Node> {
        let mut out: Vec<Node> = Vec::new();
        let mut stack: Vec<OpenElement> = Vec::new();

        while *i < events.len() {
            let (ref ev, ref range) = events[*i];

            match ev {
                Event::End(tag_end) if until.is_some_and(|f| f(tag_end)) => {
                    *i += 1;
                    break;
                }

                Event::Start(Tag::Heading { level, .. }) => {
                    let level = heading_level_to_u8(level);
                    *i += 1;
                    let content =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Heading(_)));
                    push_node(&mut stack, &mut out, Node::Heading { level, content });
                }

                Event::Start(Tag::Paragraph) => {
                    *i += 1;
                    let inlines =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Paragraph));
                    push_node(&mut stack, &mut out, Node::Paragraph(inlines));
                }

                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        pulldown_cmark::CodeBlockKind::Fenced(lang) => {
                            let lang = lang.to_string();
                            if lang.is_empty() { None } else { Some(lang) }
                        }
                        pulldown_cmark::CodeBlockKind::Indented => None,
                    };
                    *i += 1;
                    let content =
                        collect_text_until(events, i, |e| matches!(e, TagEnd::CodeBlock));
                    push_node(&mut stack, &mut out, Node::CodeBlock { language, content });
                }

                Event::Start(Tag::Table(alignments)) => {
                    let aligns: Vec<ColumnAlignment> = alignments
                        .iter()
                        .map(|a| match a {
                            pulldown_cmark::Alignment::None => ColumnAlignment::None,
                            pulldown_cmark::Alignment::Left => ColumnAlignment::Left,
                            pulldown_cmark::Alignment::Center => ColumnAlignment::Center,
                            pulldown_cmark::Alignment::Right => ColumnAlignment::Right,
                        })
                        .collect();
                    *i += 1;
                    let (headers, rows) = self.collect_table(events, i);
                    push_node(
                        &mut stack,
                        &mut out,
                        Node::Table {
                            alignments: aligns,
                            headers,
                            rows,
                        },
                    );
                }

                Event::Start(Tag::BlockQuote(_)) => {
                    *i += 1;
                    let inner = self.collect_nodes(
                        events,
                        i,
                        Some(&|e| matches!(e, TagEnd::BlockQuote(_))),
                    );
                    push_node(&mut stack, &mut out, Node::Quote(inner));
                }

                Event::Start(Tag::List(start_num)) => {
                    let ordered = start_num.is_some();
                    let start = (*start_num).unwrap_or(1);
                    *i += 1;
                    let mut items = Vec::new();
                    while *i < events.len() {
                        let (ref ev2, _) = events[*i];
                        match ev2 {
                            Event::End(TagEnd::List(_)) => {
                                *i += 1;
                                break;
                            }
                            Event::Start(Tag::Item) => {
                                *i += 1;
                                let item = self.collect_nodes(
                                    events,
                                    i,
                                    Some(&|e| matches!(e, TagEnd::Item)),
                                );
                                items.push(item);
                            }
                            _ => {
                                *i += 1;
                            }
                        }
                    }
                    push_node(
                        &mut stack,
                        &mut out,
                        Node::List {
                            ordered,
                            start,
                            items,
                        },
                    );
                }

                Event::Rule => {
                    push_node(&mut stack, &mut out, Node::Raw("---".to_string()));
                    *i += 1;
                }

                Event::Start(Tag::HtmlBlock) => {
                    *i += 1;
                    while *i < events.len() {
                        let (ref ev2, ref range2) = events[*i];
                        match ev2 {
                            Event::End(TagEnd::HtmlBlock) => {
                                *i += 1;
                                break;
                            }
                            Event::Html(text) => {
                                self.process_chunk(text, range2.start, &mut stack, &mut out);
                                *i += 1;
                            }
                            _ => {
                                *i += 1;
                            }
                        }
                    }
                }

                // Some nesting contexts deliver raw HTML without the block
                // wrapper; scan it the same way.
                Event::Html(text) => {
                    self.process_chunk(text, range.start, &mut stack, &mut out);
                    *i += 1;
                }

                // Tight list items carry inline content with no paragraph
                // wrapper; gather the run into an implicit paragraph.
                Event::Text(_)
                | Event::Code(_)
                | Event::InlineHtml(_)
                | Event::SoftBreak
                | Event::HardBreak
                | Event::Start(Tag::Strong)
                | Event::Start(Tag::Emphasis)
                | Event::Start(Tag::Link { .. }) => {
                    let inlines = self.collect_loose_inlines(events, i);
                    if !inlines.is_empty() {
                        push_node(&mut stack, &mut out, Node::Paragraph(inlines));
                    }
                }

                _ => {
                    *i += 1;
                }
            }
        }

        // Anything left open never saw its closing tag.
        while let Some(OpenElement { mut element, children }) = stack.pop() {
            self.errors.push(ParseError::new(
                format!("unclosed <{}> element", element.tag),
                element.span.clone(),
                self.file_id,
            ));
            element.children = children;
            push_node(&mut stack, &mut out, Node::Element(element));
        }

        out
    }

    /// Feed one raw HTML chunk through the tag scanner and apply the
    /// resulting events to the element stack.
    fn process_chunk(
        &mut self,
        chunk: &str,
        base_offset: usize,
        stack: &mut Vec<OpenElement>,
        out: &mut Vec<Node>,
    ) {
        let tag_events = match tag::scan(chunk, base_offset, self.file_id) {
            Ok(events) => events,
            Err(error) => {
                self.errors.push(error);
                return;
            }
        };

        for tag_event in tag_events {
            match tag_event {
                TagEvent::Open(element) => {
                    stack.push(OpenElement {
                        element,
                        children: Vec::new(),
                    });
                }
                TagEvent::SelfClose(element) => {
                    push_node(stack, out, Node::Element(element));
                }
                TagEvent::Close { tag, span } => match stack.pop() {
                    Some(OpenElement { mut element, children }) => {
                        if element.tag != tag {
                            self.errors.push(
                                ParseError::new(
                                    format!("mismatched closing tag </{}>", tag),
                                    span,
                                    self.file_id,
                                )
                                .with_note(format!("the open element here is <{}>", element.tag)),
                            );
                        }
                        element.children = children;
                        push_node(stack, out, Node::Element(element));
                    }
                    None => {
                        self.errors.push(ParseError::new(
                            format!("closing tag </{}> has no matching open tag", tag),
                            span,
                            self.file_id,
                        ));
                    }
                },
                TagEvent::Raw { text } => {
                    push_node(stack, out, Node::Raw(text));
                }
            }
        }
    }

    /// Collect inline nodes until a matching End tag.
    fn collect_inlines(
        &mut self,
        events: &[(Event<'_>, Range<usize>)],
        i: &mut usize,
        is_end: &dyn Fn(&TagEnd) -> bool,
    ) -> Vec<Inline> {
        let mut inlines = Vec::new();

        while *i < events.len() {
            let (ref ev, ref _range) = events[*i];
            match ev {
                Event::End(tag_end) if is_end(tag_end) => {
                    *i += 1;
                    break;
                }
                Event::Text(s) => {
                    inlines.push(Inline::Text(s.to_string()));
                    *i += 1;
                }
                Event::Code(s) => {
                    inlines.push(Inline::Code(s.to_string()));
                    *i += 1;
                }
                // Inline HTML has no element semantics; it is literal text.
                Event::InlineHtml(s) | Event::Html(s) => {
                    inlines.push(Inline::Text(s.to_string()));
                    *i += 1;
                }
                Event::SoftBreak => {
                    inlines.push(Inline::SoftBreak);
                    *i += 1;
                }
                Event::HardBreak => {
                    inlines.push(Inline::HardBreak);
                    *i += 1;
                }
                Event::Start(Tag::Strong) => {
                    *i += 1;
                    let children =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Strong));
                    inlines.push(Inline::Strong(children));
                }
                Event::Start(Tag::Emphasis) => {
                    *i += 1;
                    let children =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Emphasis));
                    inlines.push(Inline::Emphasis(children));
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    let dest = dest_url.to_string();
                    *i += 1;
                    let content =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Link));
                    inlines.push(Inline::Link { dest, content });
                }
                _ => {
                    *i += 1;
                }
            }
        }

        inlines
    }

    /// Collect a run of unwrapped inline events (tight list items) until the
    /// next block-level event.
    fn collect_loose_inlines(
        &mut self,
        events: &[(Event<'_>, Range<usize>)],
        i: &mut usize,
    ) -> Vec<Inline> {
        let mut inlines = Vec::new();

        while *i < events.len() {
            let (ref ev, ref _range) = events[*i];
            match ev {
                Event::Text(s) => {
                    inlines.push(Inline::Text(s.to_string()));
                    *i += 1;
                }
                Event::Code(s) => {
                    inlines.push(Inline::Code(s.to_string()));
                    *i += 1;
                }
                Event::InlineHtml(s) => {
                    inlines.push(Inline::Text(s.to_string()));
                    *i += 1;
                }
                Event::SoftBreak => {
                    inlines.push(Inline::SoftBreak);
                    *i += 1;
                }
                Event::HardBreak => {
                    inlines.push(Inline::HardBreak);
                    *i += 1;
                }
                Event::Start(Tag::Strong) => {
                    *i += 1;
                    let children =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Strong));
                    inlines.push(Inline::Strong(children));
                }
                Event::Start(Tag::Emphasis) => {
                    *i += 1;
                    let children =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Emphasis));
                    inlines.push(Inline::Emphasis(children));
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    let dest = dest_url.to_string();
                    *i += 1;
                    let content =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::Link));
                    inlines.push(Inline::Link { dest, content });
                }
                _ => break,
            }
        }

        inlines
    }

    /// Collect table headers and rows.
    fn collect_table(
        &mut self,
        events: &[(Event<'_>, Range<usize>)],
        i: &mut usize,
    ) -> (Vec<Vec<Inline>>, Vec<Vec<Vec<Inline>>>) {
        let mut headers: Vec<Vec<Inline>> = Vec::new();
        let mut rows: Vec<Vec<Vec<Inline>>> = Vec::new();
        let mut in_head = false;
        let mut current_row: Vec<Vec<Inline>> = Vec::new();

        while *i < events.len() {
            let (ref ev, _) = events[*i];
            match ev {
                Event::End(TagEnd::Table) => {
                    *i += 1;
                    break;
                }
                Event::Start(Tag::TableHead) => {
                    in_head = true;
                    *i += 1;
                }
                Event::End(TagEnd::TableHead) => {
                    in_head = false;
                    headers = std::mem::take(&mut current_row);
                    *i += 1;
                }
                Event::Start(Tag::TableRow) => {
                    current_row = Vec::new();
                    *i += 1;
                }
                Event::End(TagEnd::TableRow) => {
                    if !in_head {
                        rows.push(std::mem::take(&mut current_row));
                    }
                    *i += 1;
                }
                Event::Start(Tag::TableCell) => {
                    *i += 1;
                    let cell =
                        self.collect_inlines(events, i, &|e| matches!(e, TagEnd::TableCell));
                    current_row.push(cell);
                }
                _ => {
                    *i += 1;
                }
            }
        }

        (headers, rows)
    }
}

/// Append a node to the innermost open element, or to the top level.
fn push_node(stack: &mut Vec<OpenElement>, out: &mut Vec<Node>, node: Node) {
    if let Some(open) = stack.last_mut() {
        open.children.push(node);
    } else {
        out.push(node);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Collect all text content until a matching End tag.
fn collect_text_until(
    events: &[(Event<'_>, Range<usize>)],
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}
