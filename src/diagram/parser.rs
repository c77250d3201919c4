//! DOT lexer and parser
//!
//! Covers the grammar Graphviz documents: `strict`, `graph`/`digraph`,
//! statement lists, attribute lists, `ID = ID` statements, subgraphs,
//! edge chains with subgraph operands, and ports. Comments (`//`, `/* */`
//! and `#` lines) are skipped. The parser records which nodes have a node
//! statement and which node pairs are connected; it keeps no attribute values.

use std::collections::BTreeSet;

use super::DiagramError;

/// Deepest subgraph nesting accepted
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    /// Unquoted identifier or numeral
    Ident(String),
    /// Double-quoted string with escapes resolved
    Quoted(String),
    /// `<...>` string, stored with its brackets
    Html(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Semicolon,
    Comma,
    Equals,
    Plus,
    DirectedEdge,
    UndirectedEdge,
    Eof,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier '{}'", s),
            TokenKind::Quoted(s) => format!("string \"{}\"", s),
            TokenKind::Html(_) => "HTML string".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::DirectedEdge => "'->'".to_string(),
            TokenKind::UndirectedEdge => "'--'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
    /// Byte offsets into the source
    start: usize,
    end: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    byte: usize,
    line: usize,
    column: usize,
    // Only whitespace seen so far on the current line
    line_start: bool,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            byte: 0,
            line: 1,
            column: 1,
            line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        self.byte += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_start = true;
        } else {
            self.column += 1;
            if !c.is_whitespace() {
                self.line_start = false;
            }
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> DiagramError {
        DiagramError::Malformed {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), DiagramError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') if self.line_start => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error(line, column, "unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, DiagramError> {
        self.skip_trivia()?;
        let (line, column, start) = (self.line, self.column, self.byte);
        let token = |kind| Token {
            kind,
            line,
            column,
            start,
            end: start,
        };

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(token(TokenKind::Eof)),
        };

        let simple = match c {
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ':' => Some(TokenKind::Colon),
            ';' => Some(TokenKind::Semicolon),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Equals),
            '+' => Some(TokenKind::Plus),
            _ => None,
        };
        if let Some(kind) = simple {
            self.bump();
            return Ok(token(kind));
        }

        match c {
            '-' if self.peek_at(1) == Some('>') => {
                self.bump();
                self.bump();
                Ok(token(TokenKind::DirectedEdge))
            }
            '-' if self.peek_at(1) == Some('-') => {
                self.bump();
                self.bump();
                Ok(token(TokenKind::UndirectedEdge))
            }
            '"' => self.quoted(line, column).map(|s| token(TokenKind::Quoted(s))),
            '<' => self.html(line, column).map(|s| token(TokenKind::Html(s))),
            c if c == '-' || c == '.' || c.is_ascii_digit() => {
                self.numeral(line, column).map(|s| token(TokenKind::Ident(s)))
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some(c) = self.peek() {
                    if !is_ident_continue(c) {
                        break;
                    }
                    ident.push(c);
                    self.bump();
                }
                Ok(token(TokenKind::Ident(ident)))
            }
            other => Err(self.error(line, column, format!("unexpected character '{}'", other))),
        }
    }

    fn quoted(&mut self, line: usize, column: usize) -> Result<String, DiagramError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('"') => value.push('"'),
                    Some('\n') => {}
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                Some(c) => value.push(c),
                None => break,
            }
        }
        Err(self.error(line, column, "unterminated string"))
    }

    fn html(&mut self, line: usize, column: usize) -> Result<String, DiagramError> {
        let mut depth = 0usize;
        let mut value = String::new();
        while let Some(c) = self.bump() {
            value.push(c);
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(value);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(line, column, "unterminated HTML string"))
    }

    fn numeral(&mut self, line: usize, column: usize) -> Result<String, DiagramError> {
        let mut value = String::new();
        if self.peek() == Some('-') {
            value.push('-');
            self.bump();
        }
        let mut digits = 0;
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits += 1;
            } else if c == '.' && !seen_dot {
                seen_dot = true;
            } else {
                break;
            }
            value.push(c);
            self.bump();
        }
        if digits == 0 {
            return Err(self.error(line, column, format!("invalid numeral '{}'", value)));
        }
        if self.peek().map(is_ident_start).unwrap_or(false) {
            return Err(self.error(line, column, "identifier cannot start with a digit"));
        }
        Ok(value)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()
}

fn tokenize(text: &str) -> Result<Vec<Token>, DiagramError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    loop {
        let mut token = lexer.next_token()?;
        token.end = lexer.byte;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// Structure recovered from DOT text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedGraph {
    /// `strict` keyword present
    pub strict: bool,
    /// `digraph` rather than `graph`
    pub directed: bool,
    /// Graph name, if any
    pub name: Option<String>,
    /// Node ids that have a node statement
    pub declared: BTreeSet<String>,
    /// Connected node pairs in source order
    pub edges: Vec<(String, String)>,
    /// Byte offset just past the graph's opening brace
    pub body_start: usize,
    /// Byte offsets of unquoted `label` keys in edge attribute lists without an `xlabel`
    pub edge_label_keys: Vec<usize>,
    /// Byte ranges of graph-level layout settings, including a trailing separator
    pub layout_spans: Vec<(usize, usize)>,
}

/// Which element an attribute list applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrTarget {
    Graph,
    Node,
    Edge,
}

fn is_layout_key(key: &str) -> bool {
    matches!(key, "rankdir" | "splines" | "nodesep" | "ranksep")
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    graph: ParsedGraph,
}

fn keyword(kind: &TokenKind, word: &str) -> bool {
    matches!(kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(word))
}

fn is_reserved(s: &str) -> bool {
    ["strict", "graph", "digraph", "node", "edge", "subgraph"]
        .iter()
        .any(|k| s.eq_ignore_ascii_case(k))
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// End offset of the last consumed token
    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].end
    }

    fn unexpected(&self, expected: &str) -> DiagramError {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        DiagramError::Malformed {
            line: token.line,
            column: token.column,
            message: format!("expected {}, found {}", expected, token.kind.describe()),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), DiagramError> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_id(&self) -> bool {
        match self.peek() {
            TokenKind::Ident(s) => !is_reserved(s),
            TokenKind::Quoted(_) | TokenKind::Html(_) => true,
            _ => false,
        }
    }

    /// ID, with `"a" + "b"` concatenation for quoted strings
    fn id(&mut self) -> Result<String, DiagramError> {
        if !self.at_id() {
            return Err(self.unexpected("an identifier"));
        }
        match self.advance().kind {
            TokenKind::Quoted(mut value) => {
                while *self.peek() == TokenKind::Plus {
                    self.advance();
                    match self.peek().clone() {
                        TokenKind::Quoted(next) => {
                            self.advance();
                            value.push_str(&next);
                        }
                        _ => return Err(self.unexpected("a quoted string after '+'")),
                    }
                }
                Ok(value)
            }
            TokenKind::Ident(value) | TokenKind::Html(value) => Ok(value),
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn graph(mut self) -> Result<ParsedGraph, DiagramError> {
        if keyword(self.peek(), "strict") {
            self.advance();
            self.graph.strict = true;
        }
        if keyword(self.peek(), "digraph") {
            self.graph.directed = true;
        } else if !keyword(self.peek(), "graph") {
            return Err(self.unexpected("'graph' or 'digraph'"));
        }
        self.advance();
        if self.at_id() {
            self.graph.name = Some(self.id()?);
        }
        self.expect(TokenKind::LBrace, "'{'")?;
        self.graph.body_start = self.prev_end();
        self.stmt_list()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        if *self.peek() != TokenKind::Eof {
            return Err(self.unexpected("end of input"));
        }
        Ok(self.graph)
    }

    /// Parses statements up to the closing brace; returns every node mentioned
    fn stmt_list(&mut self) -> Result<Vec<String>, DiagramError> {
        let mut mentioned = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            self.stmt(&mut mentioned)?;
            self.eat(&TokenKind::Semicolon);
        }
        Ok(mentioned)
    }

    fn stmt(&mut self, mentioned: &mut Vec<String>) -> Result<(), DiagramError> {
        let kind = self.peek().clone();
        let target = if keyword(&kind, "graph") {
            Some(AttrTarget::Graph)
        } else if keyword(&kind, "node") {
            Some(AttrTarget::Node)
        } else if keyword(&kind, "edge") {
            Some(AttrTarget::Edge)
        } else {
            None
        };
        if let Some(target) = target {
            self.advance();
            if *self.peek() != TokenKind::LBracket {
                return Err(self.unexpected("'['"));
            }
            return self.attr_lists(target);
        }
        if keyword(&kind, "subgraph") || kind == TokenKind::LBrace {
            let operand = self.subgraph()?;
            extend_unique(mentioned, &operand);
            return self.edge_rhs(operand, mentioned);
        }
        if !self.at_id() {
            return Err(self.unexpected("a statement"));
        }

        if *self.peek_at(1) == TokenKind::Equals {
            let key_token = self.current().clone();
            let key = self.id()?;
            self.advance();
            self.id()?;
            if matches!(key_token.kind, TokenKind::Ident(_)) && is_layout_key(&key) {
                let mut end = self.prev_end();
                if *self.peek() == TokenKind::Semicolon {
                    end = self.current().end;
                }
                self.graph.layout_spans.push((key_token.start, end));
            }
            return Ok(());
        }

        let node = self.node_id()?;
        extend_unique(mentioned, std::slice::from_ref(&node));
        if matches!(self.peek(), TokenKind::DirectedEdge | TokenKind::UndirectedEdge) {
            return self.edge_rhs(vec![node], mentioned);
        }
        self.graph.declared.insert(node);
        if *self.peek() == TokenKind::LBracket {
            self.attr_lists(AttrTarget::Node)?;
        }
        Ok(())
    }

    fn node_id(&mut self) -> Result<String, DiagramError> {
        let id = self.id()?;
        if self.eat(&TokenKind::Colon) {
            self.id()?;
            if self.eat(&TokenKind::Colon) {
                self.id()?;
            }
        }
        Ok(id)
    }

    fn subgraph(&mut self) -> Result<Vec<String>, DiagramError> {
        if keyword(self.peek(), "subgraph") {
            self.advance();
            if self.at_id() {
                self.id()?;
            }
        }
        if self.depth >= MAX_NESTING {
            let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
            return Err(DiagramError::Malformed {
                line: token.line,
                column: token.column,
                message: format!("subgraphs nested deeper than {} levels", MAX_NESTING),
            });
        }
        self.expect(TokenKind::LBrace, "'{'")?;
        self.depth += 1;
        let mentioned = self.stmt_list()?;
        self.depth -= 1;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(mentioned)
    }

    /// Parses `-> operand` repetitions following `left`, then an optional attribute list
    fn edge_rhs(&mut self, mut left: Vec<String>, mentioned: &mut Vec<String>) -> Result<(), DiagramError> {
        let mut saw_edge = false;
        loop {
            let directed = match self.peek() {
                TokenKind::DirectedEdge => true,
                TokenKind::UndirectedEdge => false,
                _ => break,
            };
            if directed != self.graph.directed {
                let op = if directed { "->" } else { "--" };
                let kind = if self.graph.directed { "digraph" } else { "graph" };
                let token = &self.tokens[self.pos];
                return Err(DiagramError::Malformed {
                    line: token.line,
                    column: token.column,
                    message: format!("edge operator '{}' is not allowed in a {}", op, kind),
                });
            }
            self.advance();
            saw_edge = true;

            let right = if keyword(self.peek(), "subgraph") || *self.peek() == TokenKind::LBrace {
                self.subgraph()?
            } else if self.at_id() {
                vec![self.node_id()?]
            } else {
                return Err(self.unexpected("a node or subgraph after the edge operator"));
            };
            extend_unique(mentioned, &right);

            for from in &left {
                for to in &right {
                    self.graph.edges.push((from.clone(), to.clone()));
                }
            }
            left = right;
        }
        if saw_edge && *self.peek() == TokenKind::LBracket {
            self.attr_lists(AttrTarget::Edge)?;
        }
        Ok(())
    }

    fn attr_lists(&mut self, target: AttrTarget) -> Result<(), DiagramError> {
        let mut labels = Vec::new();
        let mut has_xlabel = false;
        while self.eat(&TokenKind::LBracket) {
            while *self.peek() != TokenKind::RBracket {
                let key_token = self.current().clone();
                let key = self.id()?;
                let has_value = self.eat(&TokenKind::Equals);
                if has_value {
                    self.id()?;
                }
                if !self.eat(&TokenKind::Comma) {
                    self.eat(&TokenKind::Semicolon);
                }
                let end = self.prev_end();

                let plain = matches!(key_token.kind, TokenKind::Ident(_));
                match target {
                    AttrTarget::Edge if plain && key == "label" => labels.push(key_token.start),
                    AttrTarget::Edge if key == "xlabel" => has_xlabel = true,
                    AttrTarget::Graph if plain && has_value && is_layout_key(&key) => {
                        self.graph.layout_spans.push((key_token.start, end));
                    }
                    _ => {}
                }
            }
            self.expect(TokenKind::RBracket, "']'")?;
        }
        if !has_xlabel {
            self.graph.edge_label_keys.extend(labels);
        }
        Ok(())
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// Parses DOT text into its node declarations and edges
pub fn parse(text: &str) -> Result<ParsedGraph, DiagramError> {
    let tokens = tokenize(text)?;
    let parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        graph: ParsedGraph::default(),
    };
    parser.graph()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(graph: &ParsedGraph) -> Vec<(&str, &str)> {
        graph.edges.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect()
    }

    #[test]
    fn test_full_grammar() {
        let text = r#"
            # generated
            strict digraph "Architecture" {
                rankdir = LR; // layout
                graph [fontname="Helvetica"];
                node [shape=box, style="rounded,filled"];
                /* clusters */
                subgraph cluster_api {
                    label = "API";
                    api [label=<<b>API</b>>];
                    "db" + "_pool" [label="DB \"pool\""];
                }
                cli; worker:p1:n;
                cli -> api:in -> db_pool [label="queries"];
                worker -> { api cli };
                -1.5;
            }
        "#;
        let graph = parse(text).unwrap();

        assert!(graph.strict);
        assert!(graph.directed);
        assert_eq!(graph.name.as_deref(), Some("Architecture"));
        assert_eq!(
            graph.declared.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["-1.5", "api", "cli", "db_pool", "worker"]
        );
        assert_eq!(
            pairs(&graph),
            vec![("cli", "api"), ("api", "db_pool"), ("worker", "api"), ("worker", "cli")]
        );
    }

    #[test]
    fn test_undirected_graph() {
        let graph = parse("graph { a; b; a -- b }").unwrap();
        assert!(!graph.directed);
        assert_eq!(pairs(&graph), vec![("a", "b")]);
    }

    #[test]
    fn test_edge_operator_must_match_graph_kind() {
        let error = parse("digraph { a; b; a -- b }").unwrap_err();
        assert!(matches!(error, DiagramError::Malformed { line: 1, .. }));
        assert!(error.to_string().contains("'--'"));
    }

    #[test]
    fn test_edge_statement_does_not_declare() {
        let graph = parse("digraph { A; A -> B }").unwrap();
        assert!(graph.declared.contains("A"));
        assert!(!graph.declared.contains("B"));
    }

    #[test]
    fn test_malformed_inputs() {
        let cases = [
            "",
            "digraph {",
            "digraph { a -> }",
            "digraph { a [label=\"x] }",
            "digraph { a } trailing",
            "flowchart TD; A-->B",
            "digraph { /* open",
            "digraph { 3abc }",
            "digraph { a [label=<b> }",
        ];
        for case in cases {
            assert!(
                matches!(parse(case), Err(DiagramError::Malformed { .. })),
                "expected {:?} to be malformed",
                case
            );
        }
    }

    #[test]
    fn test_error_position() {
        let error = parse("digraph {\n  a;\n  b -> ;\n}").unwrap_err();
        match error {
            DiagramError::Malformed { line, column, .. } => {
                assert_eq!(line, 3);
                assert_eq!(column, 8);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let text = format!("digraph {{ a; {}{} }}", "{".repeat(10_000), "}".repeat(10_000));
        match parse(&text) {
            Err(DiagramError::Malformed { line, message, .. }) => {
                assert_eq!(line, 1);
                assert!(message.contains("nested deeper"), "{}", message);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_nesting_up_to_the_limit() {
        let text = format!(
            "digraph {{ {}a;{} }}",
            "subgraph {".repeat(MAX_NESTING),
            "}".repeat(MAX_NESTING)
        );
        let graph = parse(&text).unwrap();
        assert!(graph.declared.contains("a"));

        let deeper = format!("digraph {{ {}a;{} }}", "{".repeat(MAX_NESTING + 1), "}".repeat(MAX_NESTING + 1));
        assert!(parse(&deeper).is_err());
    }
}
