//! Minimal DOT parser for relationship graphs.
//!
//! Understands the subset nodes emit: one `graph`/`digraph` block with node
//! statements, edge chains (`->` or `--`), attribute lists and `id = value`
//! graph attributes. Node attributes `label` and `ranking` and the edge
//! attribute `weight` are read; everything else is ignored. Subgraphs and
//! ports are not supported.

use std::collections::HashMap;

use crate::domain::{GraphParseError, RawEdge, RawGraph, RawNode};
use crate::ports::GraphParser;

/// Default [`GraphParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DotParser;

impl DotParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphParser for DotParser {
    fn parse(&self, text: &str) -> Result<RawGraph, GraphParseError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(GraphParseError::Empty);
        }
        Parser::new(tokens).parse_graph()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Id(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Semicolon,
    Comma,
    EdgeOp,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Id(id) => id.clone(),
            Self::LBrace => "{".to_string(),
            Self::RBrace => "}".to_string(),
            Self::LBracket => "[".to_string(),
            Self::RBracket => "]".to_string(),
            Self::Equals => "=".to_string(),
            Self::Semicolon => ";".to_string(),
            Self::Comma => ",".to_string(),
            Self::EdgeOp => "->".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '+' | '/')
}

fn tokenize(text: &str) -> Result<Vec<Token>, GraphParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '=' => TokenKind::Equals,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '#' => {
                skip_line(&mut chars);
                continue;
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                skip_line(&mut chars);
                continue;
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut previous = '\0';
                loop {
                    match chars.next() {
                        Some((_, '/')) if previous == '*' => break,
                        Some((_, ch)) => previous = ch,
                        None => return Err(GraphParseError::UnexpectedEnd),
                    }
                }
                continue;
            }
            '-' if matches!(chars.peek(), Some((_, '>' | '-'))) => {
                chars.next();
                TokenKind::EdgeOp
            }
            '"' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, '"')) => value.push('"'),
                            Some((_, '\n')) => {}
                            Some((_, other)) => {
                                value.push('\\');
                                value.push(other);
                            }
                            None => return Err(GraphParseError::UnterminatedString(offset)),
                        },
                        Some((_, ch)) => value.push(ch),
                        None => return Err(GraphParseError::UnterminatedString(offset)),
                    }
                }
                TokenKind::Id(value)
            }
            c if is_id_char(c) || c == '-' => {
                let mut value = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if !is_id_char(next) {
                        break;
                    }
                    value.push(next);
                    chars.next();
                }
                TokenKind::Id(value)
            }
            other => {
                return Err(GraphParseError::UnexpectedToken {
                    offset,
                    found: other.to_string(),
                })
            }
        };

        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) {
    for (_, c) in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nodes: Vec<RawNode>,
    positions: HashMap<String, usize>,
    edges: Vec<RawEdge>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nodes: Vec::new(),
            positions: HashMap::new(),
            edges: Vec::new(),
        }
    }

    fn parse_graph(mut self) -> Result<RawGraph, GraphParseError> {
        if self.peek_keyword("strict") {
            self.pos += 1;
        }
        if !(self.peek_keyword("graph") || self.peek_keyword("digraph")) {
            return Err(GraphParseError::MissingHeader);
        }
        self.pos += 1;

        if matches!(self.peek(), Some(TokenKind::Id(_))) {
            self.pos += 1;
        }
        self.expect(&TokenKind::LBrace)?;

        loop {
            match self.peek() {
                None => return Err(GraphParseError::UnexpectedEnd),
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(TokenKind::Semicolon | TokenKind::Comma) => self.pos += 1,
                Some(_) => self.statement()?,
            }
        }

        if let Some(token) = self.tokens.get(self.pos) {
            return Err(unexpected(token));
        }

        Ok(RawGraph {
            nodes: self.nodes,
            edges: self.edges,
        })
    }

    fn statement(&mut self) -> Result<(), GraphParseError> {
        let first = self.expect_id()?;

        let is_default_attrs = ["graph", "node", "edge"]
            .iter()
            .any(|kw| first.eq_ignore_ascii_case(kw));
        if is_default_attrs && self.peek() == Some(&TokenKind::LBracket) {
            self.attributes()?;
            return Ok(());
        }

        if self.peek() == Some(&TokenKind::Equals) {
            self.pos += 1;
            self.expect_id()?;
            return Ok(());
        }

        let mut chain = vec![first];
        while self.peek() == Some(&TokenKind::EdgeOp) {
            self.pos += 1;
            chain.push(self.expect_id()?);
        }
        let attrs = self.attributes()?;

        for id in &chain {
            self.ensure_node(id);
        }

        if chain.len() == 1 {
            let index = self.positions[&chain[0]];
            let node = &mut self.nodes[index];
            if let Some(label) = attrs.get("label") {
                node.label = label.clone();
            }
            if let Some(ranking) = attrs.get("ranking") {
                node.score = ranking.trim().parse().unwrap_or(0.0);
            }
        } else {
            let weight = attrs
                .get("weight")
                .and_then(|w| w.trim().parse().ok())
                .unwrap_or(1.0);
            for pair in chain.windows(2) {
                self.edges.push(RawEdge {
                    source: pair[0].clone(),
                    target: pair[1].clone(),
                    weight,
                });
            }
        }

        Ok(())
    }

    /// Zero or more `[k=v, ...]` lists, merged.
    fn attributes(&mut self) -> Result<HashMap<String, String>, GraphParseError> {
        let mut attrs = HashMap::new();

        while self.peek() == Some(&TokenKind::LBracket) {
            self.pos += 1;
            loop {
                match self.peek() {
                    None => return Err(GraphParseError::UnexpectedEnd),
                    Some(TokenKind::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(TokenKind::Comma | TokenKind::Semicolon) => self.pos += 1,
                    Some(_) => {
                        let name = self.expect_id()?;
                        self.expect(&TokenKind::Equals)?;
                        let value = self.expect_id()?;
                        attrs.insert(name, value);
                    }
                }
            }
        }

        Ok(attrs)
    }

    fn ensure_node(&mut self, id: &str) {
        if self.positions.contains_key(id) {
            return;
        }
        self.positions.insert(id.to_string(), self.nodes.len());
        self.nodes.push(RawNode {
            id: id.to_string(),
            label: id.to_string(),
            score: 0.0,
        });
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Id(id)) if id.eq_ignore_ascii_case(keyword))
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), GraphParseError> {
        match self.tokens.get(self.pos) {
            Some(token) if &token.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(unexpected(token)),
            None => Err(GraphParseError::UnexpectedEnd),
        }
    }

    fn expect_id(&mut self) -> Result<String, GraphParseError> {
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Id(id),
                ..
            }) => {
                let id = id.clone();
                self.pos += 1;
                Ok(id)
            }
            Some(token) => Err(unexpected(token)),
            None => Err(GraphParseError::UnexpectedEnd),
        }
    }
}

fn unexpected(token: &Token) -> GraphParseError {
    GraphParseError::UnexpectedToken {
        offset: token.offset,
        found: token.kind.describe(),
    }
}
