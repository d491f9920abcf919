// SPDX-License-Identifier: Apache-2.0

//! Single-pass JSON tokenizer writing into a caller-owned token array.
//!
//! The scanner never allocates and never recurses. Nesting is tracked with a
//! fixed-depth [`OpenStack`] of open containers, and the token a new value
//! attaches to (an open container, or the key just followed by `:`) is kept
//! as the parser's *superior*.
//!
//! ```rust
//! use uartjson::tokenizer::{Parser, Token, TokenKind};
//!
//! let json = br#"{"uid": 1000, "groups": ["users", "wheel"]}"#;
//! let mut tokens = [Token::EMPTY; 8];
//! let count = Parser::new().parse(json, &mut tokens).unwrap();
//!
//! assert_eq!(count, 7);
//! assert_eq!(tokens[0].kind, TokenKind::Object);
//! assert_eq!(tokens[0].children, 2);
//! assert!(tokens[3].eq_str(json, "groups"));
//! assert_eq!(tokens[4].children, 2);
//! ```

mod error;
mod stack;
mod token;

pub use error::{ErrKind, Error};
pub use stack::{Frame, OpenStack};
pub use token::{skip, Token, TokenKind};

/// Default nesting limit, matching a 32-bit container stack.
pub const DEFAULT_DEPTH: usize = 32;

/// Grammar strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Anything that is not structure or a string is a primitive, and `:`
    /// also ends a primitive.
    #[default]
    Lenient,
    /// Primitives must look like numbers, booleans or `null`, cannot be
    /// object keys and must be followed by a delimiter. Unknown characters
    /// are rejected.
    Strict,
}

/// The token new values attach to, mirrored so the scan never has to read
/// the token array back.
#[derive(Debug, Clone, Copy)]
struct Superior {
    index: usize,
    kind: TokenKind,
    children: usize,
}

impl From<Frame> for Superior {
    fn from(frame: Frame) -> Self {
        Superior {
            index: frame.index,
            kind: frame.kind,
            children: 0,
        }
    }
}

/// Resumable tokenizer state.
///
/// After [`ErrKind::NoMemory`] the parser can be called again with a larger
/// array that still holds the tokens already written; after
/// [`ErrKind::Incomplete`] it can be called again with the same input
/// extended. Use [`reset`](Parser::reset) to start a new document.
#[derive(Debug, Clone)]
pub struct Parser<const DEPTH: usize = DEFAULT_DEPTH> {
    pos: usize,
    next: usize,
    superior: Option<Superior>,
    last: Option<Frame>,
    open: OpenStack<DEPTH>,
    mode: Mode,
}

impl Parser {
    /// Lenient parser with the default nesting limit.
    pub const fn new() -> Self {
        Self::with_mode(Mode::Lenient)
    }

    pub const fn strict() -> Self {
        Self::with_mode(Mode::Strict)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: usize> Parser<DEPTH> {
    pub const fn with_mode(mode: Mode) -> Self {
        Self {
            pos: 0,
            next: 0,
            superior: None,
            last: None,
            open: OpenStack::new(),
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Offset of the next byte to scan.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Forget all progress, keeping the mode.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.next = 0;
        self.superior = None;
        self.last = None;
        self.open.clear();
    }

    /// Tokenize `json` into `tokens`, returning the number of tokens.
    pub fn parse(&mut self, json: &[u8], tokens: &mut [Token]) -> Result<usize, Error> {
        self.run(json, Some(tokens))
    }

    /// Validate `json` and count its tokens without storing them.
    pub fn count(&mut self, json: &[u8]) -> Result<usize, Error> {
        self.run(json, None)
    }

    fn run(&mut self, json: &[u8], mut tokens: Option<&mut [Token]>) -> Result<usize, Error> {
        while let Some(&c) = json.get(self.pos) {
            if c == 0 {
                break;
            }
            match c {
                b'{' | b'[' => {
                    let kind = if c == b'{' {
                        TokenKind::Object
                    } else {
                        TokenKind::Array
                    };
                    self.open_container(kind, c, tokens.as_deref_mut())?;
                    self.pos += 1;
                }
                b'}' | b']' => {
                    let kind = if c == b'}' {
                        TokenKind::Object
                    } else {
                        TokenKind::Array
                    };
                    self.close_container(kind, c, tokens.as_deref_mut())?;
                    self.pos += 1;
                }
                b'"' => {
                    self.parse_string(json, tokens.as_deref_mut())?;
                }
                b'\t' | b'\r' | b'\n' | b' ' => {
                    self.pos += 1;
                }
                b':' => {
                    self.superior = self.last.map(Superior::from);
                    self.pos += 1;
                }
                b',' => {
                    if let Some(sup) = self.superior {
                        if !matches!(sup.kind, TokenKind::Object | TokenKind::Array) {
                            self.superior = self.open.top().map(Superior::from);
                        }
                    }
                    self.pos += 1;
                }
                b'-' | b'0'..=b'9' | b't' | b'f' | b'n' if self.mode == Mode::Strict => {
                    if let Some(sup) = self.superior {
                        let is_key_position = sup.kind == TokenKind::Object
                            || (sup.kind == TokenKind::String && sup.children != 0);
                        if is_key_position {
                            return Error::new(ErrKind::Invalid, c, self.pos);
                        }
                    }
                    self.parse_primitive(json, tokens.as_deref_mut())?;
                }
                _ if self.mode == Mode::Strict => {
                    return Error::new(ErrKind::Invalid, c, self.pos);
                }
                _ => {
                    self.parse_primitive(json, tokens.as_deref_mut())?;
                }
            }
        }

        if let Some(frame) = self.open.top() {
            log::trace!("input ended with container {} still open", frame.index);
            return Error::new(ErrKind::Incomplete, b' ', self.pos);
        }
        Ok(self.next)
    }

    /// Reserve the next token slot. Nothing is written on failure.
    fn alloc(&self, tokens: Option<&[Token]>, c: u8) -> Result<(), Error> {
        match tokens {
            Some(tokens) if self.next >= tokens.len() => {
                log::trace!("token array full at {} tokens", tokens.len());
                Error::new(ErrKind::NoMemory, c, self.pos)
            }
            _ => Ok(()),
        }
    }

    /// Store a finished token and attach it to the current superior.
    fn commit(&mut self, tokens: Option<&mut [Token]>, mut token: Token) -> usize {
        let index = self.next;
        self.next += 1;
        token.parent = self.superior.map(|sup| sup.index);

        if let Some(sup) = self.superior.as_mut() {
            sup.children += 1;
        }
        if let Some(tokens) = tokens {
            if let Some(sup) = self.superior {
                if let Some(parent) = tokens.get_mut(sup.index) {
                    parent.children += 1;
                }
            }
            if let Some(slot) = tokens.get_mut(index) {
                *slot = token;
            }
        }
        self.last = Some(Frame {
            index,
            kind: token.kind,
        });
        index
    }

    fn open_container(
        &mut self,
        kind: TokenKind,
        c: u8,
        tokens: Option<&mut [Token]>,
    ) -> Result<(), Error> {
        if self.mode == Mode::Strict {
            if let Some(sup) = self.superior {
                if sup.kind == TokenKind::Object {
                    return Error::new(ErrKind::Invalid, c, self.pos);
                }
            }
        }
        if self.open.depth() >= DEPTH {
            return Error::new(ErrKind::MaxDepthReached, c, self.pos);
        }
        self.alloc(tokens.as_deref(), c)?;

        let index = self.commit(tokens, Token::new(kind, self.pos, None));
        let frame = Frame { index, kind };
        // Depth was checked above.
        let _ = self.open.push(frame);
        self.superior = Some(frame.into());
        Ok(())
    }

    fn close_container(
        &mut self,
        kind: TokenKind,
        c: u8,
        tokens: Option<&mut [Token]>,
    ) -> Result<(), Error> {
        let Some(top) = self.open.top() else {
            return Error::new(ErrKind::Invalid, c, self.pos);
        };
        if top.kind != kind {
            return Error::new(ErrKind::Invalid, c, self.pos);
        }
        self.open.pop();
        if let Some(token) = tokens.and_then(|t| t.get_mut(top.index)) {
            token.end = Some(self.pos + 1);
        }
        self.superior = self.open.top().map(Superior::from);
        Ok(())
    }

    fn parse_string(&mut self, json: &[u8], tokens: Option<&mut [Token]>) -> Result<(), Error> {
        let start = self.pos;
        let mut i = start + 1;

        while let Some(&c) = json.get(i) {
            if c == 0 {
                break;
            }
            if c == b'"' {
                self.alloc(tokens.as_deref(), b'"')?;
                self.commit(tokens, Token::new(TokenKind::String, start + 1, Some(i)));
                self.pos = i + 1;
                return Ok(());
            }
            if c == b'\\' && i + 1 < json.len() {
                i += 1;
                match json.get(i).copied().unwrap_or(0) {
                    b'"' | b'/' | b'\\' | b'b' | b'f' | b'r' | b'n' | b't' => {}
                    b'u' => {
                        i += 1;
                        let mut digits = 0;
                        while digits < 4 {
                            match json.get(i) {
                                Some(&h) if h != 0 => {
                                    if !h.is_ascii_hexdigit() {
                                        return Error::new(ErrKind::Invalid, h, i);
                                    }
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        continue;
                    }
                    other => {
                        return Error::new(ErrKind::Invalid, other, i);
                    }
                }
            }
            i += 1;
        }

        Error::new(ErrKind::Incomplete, b'"', start)
    }

    fn parse_primitive(&mut self, json: &[u8], tokens: Option<&mut [Token]>) -> Result<(), Error> {
        let start = self.pos;
        let mut end = start;
        let mut delimited = false;

        while let Some(&c) = json.get(end) {
            if c == 0 {
                break;
            }
            let is_delimiter = match c {
                b'\t' | b'\r' | b'\n' | b' ' | b',' | b']' | b'}' => true,
                b':' => self.mode == Mode::Lenient,
                _ => false,
            };
            if is_delimiter {
                delimited = true;
                break;
            }
            if !(0x20..0x7f).contains(&c) {
                return Error::new(ErrKind::Invalid, c, end);
            }
            end += 1;
        }

        if self.mode == Mode::Strict && !delimited {
            return Error::new(ErrKind::Incomplete, b' ', end);
        }

        let first = json.get(start).copied().unwrap_or(b' ');
        self.alloc(tokens.as_deref(), first)?;
        self.commit(tokens, Token::new(TokenKind::Primitive, start, Some(end)));
        self.pos = end;
        Ok(())
    }
}

/// Tokenize `json` with a fresh lenient parser.
pub fn parse(json: &[u8], tokens: &mut [Token]) -> Result<usize, Error> {
    Parser::new().parse(json, tokens)
}

/// Tokenize `json` with a fresh parser in the given mode.
pub fn parse_with_mode(json: &[u8], tokens: &mut [Token], mode: Mode) -> Result<usize, Error> {
    Parser::<DEFAULT_DEPTH>::with_mode(mode).parse(json, tokens)
}
