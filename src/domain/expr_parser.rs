//! Expression parser.
//!
//! Recursive descent parser for a Python-like expression grammar. Converts
//! text to a [`Node`] tree with meaningful error messages including character
//! offset and expected/found tokens. The grammar is deliberately wider than
//! what the validator accepts; see [`crate::domain::validator`].
//!
//! Precedence, loosest first:
//!
//! | level        | forms                                        |
//! |--------------|----------------------------------------------|
//! | test         | `lambda a: x`, `x if c else y`               |
//! | or / and     | `a or b`, `a and b`                          |
//! | not          | `not a`                                      |
//! | comparison   | `< > <= >= == != in` and `not in`            |
//! | arith        | `+ -`                                        |
//! | term         | `* / // %`                                   |
//! | unary        | `- + ~`                                      |
//! | power        | `**` and `^` (right associative)             |
//! | postfix      | call, `.attr`, `[index]`                     |

use crate::domain::error::ParseError;
use crate::domain::syntax::{
    BinaryOperator, BoolOperator, CompareOperator, ForClause, Node, NodeKind, SyntaxConstant,
    UnaryOperator,
};

/// Nesting limit; deeper input is rejected before it can exhaust the stack.
pub const MAX_DEPTH: usize = 128;

const KEYWORDS: [&str; 12] = [
    "and", "or", "not", "in", "is", "for", "if", "else", "lambda", "True", "False", "None",
];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!(
                "expression nested deeper than {} levels",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    /// Like `enter`, for one more link of a flat operator or postfix chain.
    /// Such chains build left-deep trees, so they share the depth budget.
    fn enter_chained(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!(
                "expression too long: more than {} chained operations",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(self.error(format!(
                "expected '{}', found '{}'",
                expected,
                self.peek_word()
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(is_identifier_char)
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected '{}', found '{}'",
                keyword,
                self.peek_word()
            )))
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|&c| is_identifier_char(c))
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => {
                return Err(self.error(format!("expected name, found '{}'", self.peek_word())));
            }
        }
        let word = self.peek_word();
        if KEYWORDS.contains(&word.as_str()) {
            return Err(self.error(format!("expected name, found keyword '{}'", word)));
        }
        self.pos += word.len();
        Ok(word)
    }

    fn parse_number(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        let mut digits = 0;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            digits += 1;
            self.advance();
        }
        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                digits += 1;
                self.advance();
            }
        }
        if digits == 0 {
            return Err(ParseError::new("expected number", start));
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = mark;
            }
        }

        let num_str = &self.input[start..self.pos];
        let value = num_str
            .parse::<f64>()
            .map_err(|_| ParseError::new(format!("invalid number: {}", num_str), start))?;
        Ok(Node::new(NodeKind::Number(value), start))
    }

    fn parse_string(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        let quote = self.advance().ok_or_else(|| self.error("expected string"))?;
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::new("unterminated string literal", start)),
                Some(ch) if ch == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => return Err(ParseError::new("unterminated string literal", start)),
                },
                Some(ch) => text.push(ch),
            }
        }
        Ok(Node::new(NodeKind::Text(text), start))
    }

    fn parse_test(&mut self) -> Result<Node, ParseError> {
        self.enter()?;
        let node = self.parse_test_inner();
        self.leave(1);
        node
    }

    fn parse_test_inner(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek_keyword("lambda") {
            return self.parse_lambda();
        }

        let body = self.parse_or()?;
        if self.consume_keyword("if") {
            let test = self.parse_or()?;
            self.expect_keyword("else")?;
            let orelse = self.parse_test()?;
            return Ok(Node::new(
                NodeKind::IfElse {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                start,
            ));
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.expect_keyword("lambda")?;
        let mut params = Vec::new();
        self.skip_whitespace();
        if self.peek() != Some(':') {
            params.push(self.parse_identifier()?);
            loop {
                self.skip_whitespace();
                if self.peek() != Some(',') {
                    break;
                }
                self.advance();
                params.push(self.parse_identifier()?);
            }
        }
        self.expect_char(':')?;
        let body = self.parse_test()?;
        Ok(Node::new(
            NodeKind::Lambda {
                params,
                body: Box::new(body),
            },
            start,
        ))
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut values = vec![self.parse_and()?];
        while self.consume_keyword("or") {
            values.push(self.parse_and()?);
        }
        Ok(collapse_bool(BoolOperator::Or, values, start))
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut values = vec![self.parse_not()?];
        while self.consume_keyword("and") {
            values.push(self.parse_not()?);
        }
        Ok(collapse_bool(BoolOperator::And, values, start))
    }

    fn parse_not(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.consume_keyword("not") {
            self.enter()?;
            let operand = self.parse_not();
            self.leave(1);
            return Ok(Node::new(
                NodeKind::Unary {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand?),
                },
                start,
            ));
        }
        self.parse_comparison()
    }

    fn parse_compare_operator(&mut self) -> Option<CompareOperator> {
        self.skip_whitespace();
        for (symbol, op) in [
            ("<=", CompareOperator::LtE),
            (">=", CompareOperator::GtE),
            ("==", CompareOperator::Eq),
            ("!=", CompareOperator::NotEq),
            ("<", CompareOperator::Lt),
            (">", CompareOperator::Gt),
        ] {
            if self.consume_exact(symbol) {
                return Some(op);
            }
        }
        if self.consume_keyword("in") {
            return Some(CompareOperator::In);
        }
        let mark = self.pos;
        if self.consume_keyword("not") {
            if self.consume_keyword("in") {
                return Some(CompareOperator::NotIn);
            }
            self.pos = mark;
        }
        None
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.parse_compare_operator() {
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Node::new(
            NodeKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            start,
        ))
    }

    fn parse_arith(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut node = self.parse_term()?;
        let mut levels = 0;
        let result = loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOperator::Add,
                Some('-') => BinaryOperator::Sub,
                _ => break Ok(node),
            };
            self.advance();
            if let Err(e) = self.enter_chained() {
                break Err(e);
            }
            levels += 1;
            let right = match self.parse_term() {
                Ok(r) => r,
                Err(e) => break Err(e),
            };
            node = binary(op, node, right, start);
        };
        self.leave(levels);
        result
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut node = self.parse_unary()?;
        let mut levels = 0;
        let result = loop {
            self.skip_whitespace();
            let op = if self.remaining().starts_with("**") {
                break Ok(node);
            } else if self.consume_exact("//") {
                BinaryOperator::FloorDiv
            } else if self.consume_exact("*") {
                BinaryOperator::Mul
            } else if self.consume_exact("/") {
                BinaryOperator::Div
            } else if self.consume_exact("%") {
                BinaryOperator::Mod
            } else {
                break Ok(node);
            };
            if let Err(e) = self.enter_chained() {
                break Err(e);
            }
            levels += 1;
            let right = match self.parse_unary() {
                Ok(r) => r,
                Err(e) => break Err(e),
            };
            node = binary(op, node, right, start);
        };
        self.leave(levels);
        result
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let op = match self.peek() {
            Some('-') => UnaryOperator::Neg,
            Some('+') => UnaryOperator::Pos,
            Some('~') => UnaryOperator::Invert,
            _ => return self.parse_power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.leave(1);
        Ok(Node::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand?),
            },
            start,
        ))
    }

    fn parse_power(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let base = self.parse_postfix()?;
        self.skip_whitespace();
        if self.consume_exact("**") || self.consume_exact("^") {
            self.enter()?;
            let exponent = self.parse_unary();
            self.leave(1);
            return Ok(binary(BinaryOperator::Pow, base, exponent?, start));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut node = self.parse_atom()?;
        let mut levels = 0;
        let result = loop {
            self.skip_whitespace();
            let step = match self.peek() {
                Some('(') => self.parse_call(node, start),
                Some('.') => self.parse_attribute(node, start),
                Some('[') => self.parse_subscript(node, start),
                _ => break Ok(node),
            };
            node = match step {
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            if let Err(e) = self.enter_chained() {
                break Err(e);
            }
            levels += 1;
        };
        self.leave(levels);
        result
    }

    fn parse_call(&mut self, func: Node, start: usize) -> Result<Node, ParseError> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }

            let arg_start = self.pos;
            if self.consume_exact("**") || self.consume_exact("*") {
                let inner = self.parse_test()?;
                args.push(Node::new(NodeKind::Starred(Box::new(inner)), arg_start));
            } else if let Some(name) = self.peek_keyword_argument() {
                self.pos += name.len();
                self.skip_whitespace();
                self.advance();
                keywords.push((name, self.parse_test()?));
            } else {
                let arg = self.parse_test()?;
                self.skip_whitespace();
                if self.peek_keyword("for") {
                    let comp = self.parse_comprehension(arg, arg_start)?;
                    args.push(comp);
                } else {
                    args.push(arg);
                }
            }

            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some(')') => {}
                _ => {
                    return Err(self.error(format!(
                        "expected ',' or ')', found '{}'",
                        self.peek_word()
                    )));
                }
            }
        }
        Ok(Node::new(
            NodeKind::Call {
                func: Box::new(func),
                args,
                keywords,
            },
            start,
        ))
    }

    /// `name =` (but not `name ==`) introduces a keyword argument.
    fn peek_keyword_argument(&self) -> Option<String> {
        if !self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return None;
        }
        let word = self.peek_word();
        let rest = self.remaining()[word.len()..].trim_start();
        if rest.starts_with('=') && !rest.starts_with("==") {
            Some(word)
        } else {
            None
        }
    }

    fn parse_attribute(&mut self, value: Node, start: usize) -> Result<Node, ParseError> {
        self.expect_char('.')?;
        let attr = self.parse_identifier()?;
        Ok(Node::new(
            NodeKind::Attribute {
                value: Box::new(value),
                attr,
            },
            start,
        ))
    }

    fn parse_subscript(&mut self, value: Node, start: usize) -> Result<Node, ParseError> {
        self.expect_char('[')?;
        let index = self.parse_test()?;
        self.expect_char(']')?;
        Ok(Node::new(
            NodeKind::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            },
            start,
        ))
    }

    fn parse_atom(&mut self) -> Result<Node, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() => self.parse_number(),
            Some('.') if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.parse_number()
            }
            Some('"') | Some('\'') => self.parse_string(),
            Some('(') => self.parse_parenthesized(),
            Some('[') => self.parse_list(),
            Some('{') => self.parse_dict(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word = self.peek_word();
                let constant = match word.as_str() {
                    "True" => Some(SyntaxConstant::True),
                    "False" => Some(SyntaxConstant::False),
                    "None" => Some(SyntaxConstant::None),
                    _ => None,
                };
                if let Some(c) = constant {
                    self.pos += word.len();
                    return Ok(Node::new(NodeKind::Constant(c), start));
                }
                if KEYWORDS.contains(&word.as_str()) {
                    return Err(self.error(format!(
                        "expected expression, found keyword '{}'",
                        word
                    )));
                }
                self.pos += word.len();
                Ok(Node::new(NodeKind::Name(word), start))
            }
            _ => Err(self.error(format!(
                "expected expression, found '{}'",
                self.peek_word()
            ))),
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.expect_char('(')?;
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(Node::new(NodeKind::Tuple(Vec::new()), start));
        }

        let first = self.parse_test()?;
        self.skip_whitespace();
        if self.peek_keyword("for") {
            let comp = self.parse_comprehension(first, start)?;
            self.expect_char(')')?;
            return Ok(comp);
        }
        if self.peek() != Some(',') {
            self.expect_char(')')?;
            return Ok(first);
        }

        let items = self.parse_sequence_tail(first, ')')?;
        Ok(Node::new(NodeKind::Tuple(items), start))
    }

    fn parse_list(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.expect_char('[')?;
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.advance();
            return Ok(Node::new(NodeKind::List(Vec::new()), start));
        }

        let first = self.parse_test()?;
        self.skip_whitespace();
        if self.peek_keyword("for") {
            let comp = self.parse_comprehension(first, start)?;
            self.expect_char(']')?;
            return Ok(comp);
        }

        let items = self.parse_sequence_tail(first, ']')?;
        Ok(Node::new(NodeKind::List(items), start))
    }

    /// Parse `, item, item [,] <close>` after a first item has been read.
    fn parse_sequence_tail(&mut self, first: Node, close: char) -> Result<Vec<Node>, ParseError> {
        let mut items = vec![first];
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(ch) if ch == close => {
                    self.advance();
                    return Ok(items);
                }
                Some(',') => {
                    self.advance();
                    self.skip_whitespace();
                    if self.peek() == Some(close) {
                        self.advance();
                        return Ok(items);
                    }
                    items.push(self.parse_test()?);
                }
                _ => {
                    return Err(self.error(format!(
                        "expected ',' or '{}', found '{}'",
                        close,
                        self.peek_word()
                    )));
                }
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.expect_char('{')?;
        let mut entries = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.advance();
                break;
            }
            let key = self.parse_test()?;
            self.expect_char(':')?;
            let value = self.parse_test()?;
            entries.push((key, value));
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some('}') => {}
                _ => {
                    return Err(self.error(format!(
                        "expected ',' or '}}', found '{}'",
                        self.peek_word()
                    )));
                }
            }
        }
        Ok(Node::new(NodeKind::Dict(entries), start))
    }

    fn parse_comprehension(&mut self, element: Node, start: usize) -> Result<Node, ParseError> {
        let mut generators = Vec::new();
        loop {
            self.skip_whitespace();
            if !self.peek_keyword("for") {
                break;
            }
            let clause_start = self.pos;
            self.expect_keyword("for")?;

            let mut targets = vec![self.parse_identifier()?];
            loop {
                self.skip_whitespace();
                if self.peek() != Some(',') {
                    break;
                }
                self.advance();
                targets.push(self.parse_identifier()?);
            }

            self.expect_keyword("in")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.consume_keyword("if") {
                conditions.push(self.parse_or()?);
            }
            generators.push(ForClause {
                targets,
                iter,
                conditions,
                position: clause_start,
            });
        }
        Ok(Node::new(
            NodeKind::Comprehension {
                element: Box::new(element),
                generators,
            },
            start,
        ))
    }

    fn parse(&mut self) -> Result<Node, ParseError> {
        let node = self.parse_test()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after expression: '{}'",
                self.remaining()
            )));
        }
        Ok(node)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn binary(op: BinaryOperator, left: Node, right: Node, start: usize) -> Node {
    Node::new(
        NodeKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        start,
    )
}

fn collapse_bool(op: BoolOperator, mut values: Vec<Node>, start: usize) -> Node {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Node::new(NodeKind::BoolOp { op, values }, start)
    }
}

pub fn parse(input: &str) -> Result<Node, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
