use std::collections::HashMap;
use std::sync::LazyLock;

use crate::ast::{BinOp, Position, SimVarRef, Span};
use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    Str(String),
    True,
    False,
    SimVar(SimVarRef),
    Insert(SimVarRef),

    // Identifiers & keywords
    Ident(String),
    MacroIdent(String),
    If,
    Else,
    Let,
    Alias,
    Macro,
    Import,
    Export,
    From,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Period,

    // Operators
    Assign,          // =
    AssignOp(BinOp), // +=, **=, and=, ...
    Bang,            // !
    Tilde,           // ~
    Or,
    And,
    Pipe,
    Caret,
    Ampersand,
    EqEq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    IDiv,
    Percent,

    Eof,
}

impl Token {
    /// The binary operator this token denotes, if any.
    pub fn binary_op(&self) -> Option<BinOp> {
        Some(match self {
            Token::Or => BinOp::Or,
            Token::And => BinOp::And,
            Token::Pipe => BinOp::BitOr,
            Token::Caret => BinOp::BitXor,
            Token::Ampersand => BinOp::BitAnd,
            Token::EqEq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Gt => BinOp::Gt,
            Token::Le => BinOp::Le,
            Token::Ge => BinOp::Ge,
            Token::Shl => BinOp::Shl,
            Token::Shr => BinOp::Shr,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::IDiv => BinOp::IDiv,
            Token::Percent => BinOp::Rem,
            Token::StarStar => BinOp::Pow,
            _ => return None,
        })
    }

    /// Binding power used by precedence climbing. Zero for non-operators.
    pub fn precedence(&self) -> u8 {
        match self {
            Token::Assign | Token::AssignOp(_) => 2,
            other => other.binary_op().map_or(0, BinOp::precedence),
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self, Token::Assign | Token::AssignOp(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "if" => Token::If,
        "else" => Token::Else,
        "let" => Token::Let,
        "alias" => Token::Alias,
        "macro" => Token::Macro,
        "true" => Token::True,
        "false" => Token::False,
        "import" => Token::Import,
        "export" => Token::Export,
        "from" => Token::From,
        "or" => Token::Or,
        "and" => Token::And,
        "idiv" => Token::IDiv,
        _ => return None,
    })
}

// ── Operator trie ──────────────────────────────────────────────

static PUNCTUATORS: &[(&str, Token)] = &[
    ("=", Token::Assign),
    ("|=", Token::AssignOp(BinOp::BitOr)),
    ("^=", Token::AssignOp(BinOp::BitXor)),
    ("&=", Token::AssignOp(BinOp::BitAnd)),
    ("<<=", Token::AssignOp(BinOp::Shl)),
    (">>=", Token::AssignOp(BinOp::Shr)),
    ("*=", Token::AssignOp(BinOp::Mul)),
    ("/=", Token::AssignOp(BinOp::Div)),
    ("%=", Token::AssignOp(BinOp::Rem)),
    ("**=", Token::AssignOp(BinOp::Pow)),
    ("+=", Token::AssignOp(BinOp::Add)),
    ("-=", Token::AssignOp(BinOp::Sub)),
    ("==", Token::EqEq),
    ("!=", Token::Ne),
    ("<", Token::Lt),
    (">", Token::Gt),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("|", Token::Pipe),
    ("^", Token::Caret),
    ("&", Token::Ampersand),
    ("<<", Token::Shl),
    (">>", Token::Shr),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("%", Token::Percent),
    ("**", Token::StarStar),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("!", Token::Bang),
    ("~", Token::Tilde),
    (",", Token::Comma),
    (";", Token::Semicolon),
    ("(", Token::LParen),
    (")", Token::RParen),
    ("{", Token::LBrace),
    ("}", Token::RBrace),
    (".", Token::Period),
];

#[derive(Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    token: Option<Token>,
}

/// Prefix tree over [`PUNCTUATORS`], walked for maximal munch.
struct Trie {
    nodes: Vec<TrieNode>,
}

impl Trie {
    fn build(entries: &[(&str, Token)]) -> Self {
        let mut nodes = vec![TrieNode::default()];
        for (text, token) in entries {
            let mut at = 0;
            for c in text.chars() {
                let next = nodes.len();
                let Some(node) = nodes.get_mut(at) else { break };
                at = *node.children.entry(c).or_insert(next);
                if at == next {
                    nodes.push(TrieNode::default());
                }
            }
            if let Some(node) = nodes.get_mut(at) {
                node.token = Some(token.clone());
            }
        }
        Self { nodes }
    }

    /// Longest entry that is a prefix of `input`, with its byte length.
    fn longest_match(&self, input: &str) -> Option<(usize, &Token)> {
        let mut at = 0;
        let mut best = None;
        for (i, c) in input.char_indices() {
            let Some(&next) = self.nodes.get(at).and_then(|n| n.children.get(&c)) else {
                break;
            };
            at = next;
            if let Some(token) = self.nodes.get(at).and_then(|n| n.token.as_ref()) {
                best = Some((i + c.len_utf8(), token));
            }
        }
        best
    }
}

static OPERATORS: LazyLock<Trie> = LazyLock::new(|| Trie::build(PUNCTUATORS));

// ── Lexer ──────────────────────────────────────────────────────

/// On-demand token stream with one token of lookahead.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    peeked: SpannedToken,
    last: Span,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Result<Self, CompileError> {
        let mut lexer = Self {
            source,
            pos: 0,
            line: 1,
            line_start: 0,
            peeked: SpannedToken { token: Token::Eof, span: Span::default() },
            last: Span::default(),
        };
        lexer.peeked = lexer.scan()?;
        Ok(lexer)
    }

    /// Consume the peeked token and scan the one after it.
    pub fn next(&mut self) -> Result<SpannedToken, CompileError> {
        let following = self.scan()?;
        let current = std::mem::replace(&mut self.peeked, following);
        self.last = current.span;
        Ok(current)
    }

    pub fn peek(&self) -> &SpannedToken {
        &self.peeked
    }

    /// Whether the peeked token is the same variant as `token`.
    pub fn test(&self, token: &Token) -> bool {
        std::mem::discriminant(&self.peeked.token) == std::mem::discriminant(token)
    }

    pub fn eat(&mut self, token: &Token) -> Result<bool, CompileError> {
        if self.test(token) {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn expect(&mut self, token: &Token) -> Result<SpannedToken, CompileError> {
        if self.test(token) {
            self.next()
        } else {
            Err(self.unexpected())
        }
    }

    /// Error for the peeked token.
    pub fn unexpected(&self) -> CompileError {
        if self.peeked.token == Token::Eof {
            CompileError::syntax("Unexpected end of source", self.peeked.span)
        } else {
            CompileError::syntax("Unexpected token", self.peeked.span)
        }
    }

    /// Span of the most recently consumed token.
    pub fn last_span(&self) -> Span {
        self.last
    }

    /// Re-read a peeked `(` as the start of a SimVar reference, for contexts
    /// that only accept SimVars. The name then runs up to the closing `)`.
    pub fn rescan_simvar(&mut self) -> Result<(), CompileError> {
        if self.peeked.token != Token::LParen {
            return Ok(());
        }
        // The peeked token is the last one scanned, so `pos` sits right after `(`.
        let open = self.peeked.span;
        let var = self.lex_reference(')', "Unexpected end of simvar")?;
        let end = self.here();
        self.peeked = SpannedToken {
            token: Token::SimVar(var),
            span: Span {
                start_index: open.start_index,
                end_index: self.pos,
                start: open.start,
                end,
            },
        };
        Ok(())
    }

    // ── Character helpers ──────────────────────────────────────

    fn rest(&self) -> &'a str {
        self.source.get(self.pos..).unwrap_or("")
    }

    fn current(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    fn here(&self) -> Position {
        let column = self
            .source
            .get(self.line_start..self.pos)
            .map_or(0, |s| s.chars().count());
        Position { line: self.line, column: column + 1 }
    }

    fn point(&self) -> Span {
        let start = self.here();
        Span {
            start_index: self.pos,
            end_index: self.pos,
            start,
            end: Position { line: start.line, column: start.column + 1 },
        }
    }

    // ── Scanning ───────────────────────────────────────────────

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.current(), self.nth(1)) {
                (Some(' ' | '\t' | '\r' | '\n'), _) => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), CompileError> {
        let mut depth = 0usize;
        loop {
            match (self.current(), self.nth(1)) {
                (None, _) => return Err(CompileError::lex("Unterminated block comment", self.point())),
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    depth += 1;
                }
                (Some('*'), Some('/')) => {
                    self.pos += 2;
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn scan(&mut self) -> Result<SpannedToken, CompileError> {
        self.skip_trivia()?;

        let start_index = self.pos;
        let start = self.here();

        let Some(c) = self.current() else {
            return Ok(SpannedToken { token: Token::Eof, span: self.eof_span() });
        };

        let token = match c {
            '0'..='9' => self.lex_number()?,
            '-' if self.nth(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
            '\'' => self.lex_string()?,
            '(' if self.nth(2) == Some(':') => {
                self.bump();
                Token::SimVar(self.lex_reference(')', "Unexpected end of simvar")?)
            }
            '#' => {
                self.bump();
                Token::Insert(self.lex_reference('#', "Unexpected end of template")?)
            }
            '$' => self.lex_word(),
            c if unicode_ident::is_xid_start(c) => self.lex_word(),
            _ => {
                let Some((len, token)) = OPERATORS.longest_match(self.rest()) else {
                    return Err(CompileError::lex(
                        format!("Unexpected character '{c}'"),
                        self.point(),
                    ));
                };
                self.pos += len;
                token.clone()
            }
        };

        Ok(SpannedToken {
            token,
            span: Span {
                start_index,
                end_index: self.pos,
                start,
                end: self.here(),
            },
        })
    }

    /// End-of-source location, placed after the last non-newline character.
    fn eof_span(&self) -> Span {
        let trimmed = self.source.trim_end_matches(['\n', '\r']);
        let index = trimmed.len();
        let line = 1 + trimmed.matches('\n').count();
        let line_start = trimmed.rfind('\n').map_or(0, |i| i + 1);
        let column = trimmed.get(line_start..).map_or(0, |s| s.chars().count()) + 1;
        Span {
            start_index: index,
            end_index: index,
            start: Position { line, column },
            end: Position { line, column: column + 1 },
        }
    }

    fn lex_word(&mut self) -> Token {
        let start = self.pos;
        self.bump();
        while self.current().is_some_and(unicode_ident::is_xid_continue) {
            self.bump();
        }
        let word = self.source.get(start..self.pos).unwrap_or("");

        if let Some(token) = keyword(word) {
            if let Some(op) = token.binary_op() {
                if self.current() == Some('=') && self.nth(1) != Some('=') {
                    self.bump();
                    return Token::AssignOp(op);
                }
            }
            return token;
        }
        if word.starts_with('$') {
            Token::MacroIdent(word.to_string())
        } else {
            Token::Ident(word.to_string())
        }
    }

    fn lex_number(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        let negative = self.current() == Some('-');
        if negative {
            self.bump();
        }

        let radix = match (self.current(), self.nth(1)) {
            (Some('0'), Some('x')) => Some(16),
            (Some('0'), Some('o')) => Some(8),
            (Some('0'), Some('b')) => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            self.pos += 2;
            let digits_start = self.pos;
            while self.current().is_some_and(|c| c.is_digit(radix)) {
                self.bump();
            }
            let digits = self.source.get(digits_start..self.pos).unwrap_or("");
            if digits.is_empty() {
                return Err(CompileError::lex("Expected digits after radix prefix", self.point()));
            }
            let value = u64::from_str_radix(digits, radix)
                .map_err(|_| CompileError::lex("Number literal out of range", self.point()))?;
            #[allow(clippy::cast_precision_loss)]
            let value = value as f64;
            return Ok(Token::Number(if negative { -value } else { value }));
        }

        self.eat_digits();
        if self.current() == Some('.') && self.nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_digits();
        }
        if matches!(self.current(), Some('e' | 'E')) {
            let signed = matches!(self.nth(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += digit_at;
                self.eat_digits();
            }
        }

        let text = self.source.get(start..self.pos).unwrap_or("");
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| CompileError::lex(format!("Invalid number literal '{text}'"), self.point()))
    }

    fn eat_digits(&mut self) {
        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn lex_string(&mut self) -> Result<Token, CompileError> {
        self.bump(); // opening quote
        let mut buffer = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(CompileError::lex("Unterminated string", self.point())),
                Some('\'') => {
                    self.bump();
                    return Ok(Token::Str(buffer));
                }
                Some('\\') => {
                    self.bump();
                    buffer.push('\\');
                    match self.current() {
                        None | Some('\n') => {
                            return Err(CompileError::lex("Unterminated string", self.point()))
                        }
                        Some(c) => {
                            self.bump();
                            buffer.push(c);
                        }
                    }
                }
                Some(c) => {
                    self.bump();
                    buffer.push(c);
                }
            }
        }
    }

    /// Scan `name[, unit]` up to `close`, consuming the delimiter.
    fn lex_reference(&mut self, close: char, unterminated: &str) -> Result<SimVarRef, CompileError> {
        let start = self.pos;
        let mut comma = None;
        loop {
            match self.current() {
                None | Some('\n') => return Err(CompileError::lex(unterminated, self.point())),
                Some(',') if comma.is_none() => comma = Some(self.pos),
                Some(c) if c == close => break,
                Some(_) => {}
            }
            self.bump();
        }
        let end = self.pos;
        self.bump();

        let text = |from: usize, to: usize| self.source.get(from..to).unwrap_or("").trim().to_string();
        Ok(match comma {
            Some(comma) => {
                let unit = text(comma + 1, end);
                SimVarRef {
                    name: text(start, comma),
                    unit: (!unit.is_empty()).then_some(unit),
                }
            }
            None => SimVarRef { name: text(start, end), unit: None },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source).unwrap();
        let mut out = Vec::new();
        loop {
            let t = lexer.next().unwrap();
            if t.token == Token::Eof {
                return out;
            }
            out.push(t.token);
        }
    }

    fn lex_err(source: &str) -> CompileError {
        let run = || -> Result<(), CompileError> {
            let mut lexer = Lexer::new(source)?;
            while lexer.next()?.token != Token::Eof {}
            Ok(())
        };
        run().unwrap_err()
    }

    fn simvar(name: &str, unit: Option<&str>) -> SimVarRef {
        SimVarRef { name: name.into(), unit: unit.map(Into::into) }
    }

    #[test]
    fn maximal_munch() {
        assert_eq!(tokens(">="), vec![Token::Ge]);
        assert_eq!(tokens("**="), vec![Token::AssignOp(BinOp::Pow)]);
        assert_eq!(tokens("***"), vec![Token::StarStar, Token::Star]);
        assert_eq!(tokens("<<="), vec![Token::AssignOp(BinOp::Shl)]);
        assert_eq!(tokens("a==b"), vec![Token::Ident("a".into()), Token::EqEq, Token::Ident("b".into())]);
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            tokens("let x_1 = $arg and y"),
            vec![
                Token::Let,
                Token::Ident("x_1".into()),
                Token::Assign,
                Token::MacroIdent("$arg".into()),
                Token::And,
                Token::Ident("y".into()),
            ]
        );
        assert_eq!(tokens("lettuce"), vec![Token::Ident("lettuce".into())]);
        assert_eq!(tokens("höhe"), vec![Token::Ident("höhe".into())]);
        // Combining marks continue an identifier but cannot start one.
        assert_eq!(tokens("e\u{301}"), vec![Token::Ident("e\u{301}".into())]);
        assert_eq!(lex_err("\u{301}").message, "Unexpected character '\u{301}'");
    }

    #[test]
    fn word_operators_accept_compound_assignment() {
        assert_eq!(
            tokens("a and= b"),
            vec![Token::Ident("a".into()), Token::AssignOp(BinOp::And), Token::Ident("b".into())]
        );
        assert_eq!(tokens("idiv=="), vec![Token::IDiv, Token::EqEq]);
    }

    #[test]
    fn numbers() {
        assert_eq!(tokens("42"), vec![Token::Number(42.0)]);
        assert_eq!(tokens("0.5"), vec![Token::Number(0.5)]);
        assert_eq!(tokens("-3"), vec![Token::Number(-3.0)]);
        assert_eq!(tokens("0xff"), vec![Token::Number(255.0)]);
        assert_eq!(tokens("0o17"), vec![Token::Number(15.0)]);
        assert_eq!(tokens("0b101"), vec![Token::Number(5.0)]);
        assert_eq!(tokens("1e3"), vec![Token::Number(1000.0)]);
        assert_eq!(tokens("2.5E-1"), vec![Token::Number(0.25)]);
        // A trailing period is a method call, not a fraction.
        assert_eq!(tokens("1.abs"), vec![Token::Number(1.0), Token::Period, Token::Ident("abs".into())]);
        assert_eq!(tokens("a - 1"), vec![Token::Ident("a".into()), Token::Minus, Token::Number(1.0)]);
    }

    #[test]
    fn strings_keep_escapes_verbatim() {
        assert_eq!(tokens("'hello'"), vec![Token::Str("hello".into())]);
        assert_eq!(tokens(r"'it\'s'"), vec![Token::Str(r"it\'s".into())]);
    }

    #[test]
    fn simvars_and_inserts() {
        assert_eq!(tokens("(A:ALTITUDE, feet)"), vec![Token::SimVar(simvar("A:ALTITUDE", Some("feet")))]);
        assert_eq!(tokens("(L:FOO)"), vec![Token::SimVar(simvar("L:FOO", None))]);
        assert_eq!(
            tokens("(A:X, percent over 100)"),
            vec![Token::SimVar(simvar("A:X", Some("percent over 100")))]
        );
        assert_eq!(tokens("(L:FOO,)"), vec![Token::SimVar(simvar("L:FOO", None))]);
        assert_eq!(tokens("#VALUE#"), vec![Token::Insert(simvar("VALUE", None))]);
        assert_eq!(tokens("#V, number#"), vec![Token::Insert(simvar("V", Some("number")))]);
        assert_eq!(tokens("(a)"), vec![Token::LParen, Token::Ident("a".into()), Token::RParen]);
    }

    #[test]
    fn comments_nest() {
        assert_eq!(tokens("/* a /* b */ c */ 1 // trailing\n2"), vec![Token::Number(1.0), Token::Number(2.0)]);
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let mut lexer = Lexer::new("let\n  abc = 1;").unwrap();
        lexer.next().unwrap();
        let abc = lexer.next().unwrap();
        assert_eq!(abc.span.start, Position { line: 2, column: 3 });
        assert_eq!(abc.span.end, Position { line: 2, column: 6 });
        assert_eq!((abc.span.start_index, abc.span.end_index), (6, 9));
    }

    #[test]
    fn eof_sits_after_last_line_of_text() {
        let lexer = Lexer::new("abc\n\n\n").unwrap();
        assert_eq!(lexer.peek().token, Token::Ident("abc".into()));
        let mut lexer = lexer;
        lexer.next().unwrap();
        let eof = lexer.peek();
        assert_eq!(eof.token, Token::Eof);
        assert_eq!(eof.span.start, Position { line: 1, column: 4 });
    }

    #[test]
    fn lexical_errors() {
        assert_eq!(lex_err("'abc").message, "Unterminated string");
        assert_eq!(lex_err("'ab\nc'").message, "Unterminated string");
        assert_eq!(lex_err("/* /* */").message, "Unterminated block comment");
        assert_eq!(lex_err("(A:FOO").message, "Unexpected end of simvar");
        assert_eq!(lex_err("#FOO\n#").message, "Unexpected end of template");
        assert_eq!(lex_err("1 @ 2").message, "Unexpected character '@'");
        assert_eq!(lex_err("0x").message, "Expected digits after radix prefix");
        assert_eq!(lex_err("@").kind, crate::error::ErrorKind::Lex);
    }

    #[test]
    fn expect_reports_end_of_source() {
        let mut lexer = Lexer::new("").unwrap();
        let e = lexer.expect(&Token::Semicolon).unwrap_err();
        assert_eq!(e.message, "Unexpected end of source");
    }

    #[test]
    fn rescan_turns_parenthesis_into_simvar() {
        let mut lexer = Lexer::new("alias x = (FOO, number);").unwrap();
        for _ in 0..3 {
            lexer.next().unwrap();
        }
        assert_eq!(lexer.peek().token, Token::LParen);
        lexer.rescan_simvar().unwrap();
        assert_eq!(lexer.peek().token, Token::SimVar(simvar("FOO", Some("number"))));
        assert_eq!(lexer.peek().span.start.column, 11);
        lexer.next().unwrap();
        assert_eq!(lexer.next().unwrap().token, Token::Semicolon);
    }
}
