// SPDX-License-Identifier: Apache-2.0

/// Kind of a token produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// An unused slot.
    #[default]
    Undefined,
    Object,
    Array,
    String,
    /// Number, `true`, `false`, `null`, or (lenient mode) any bare word.
    Primitive,
}

/// A typed span of the input.
///
/// Tokens are laid out in document order. A container's children follow it
/// directly; an object key is a `String` token whose single child is its
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Token {
    pub kind: TokenKind,
    /// Offset of the first byte. For strings, the byte after the quote.
    pub start: usize,
    /// Offset one past the last byte. `None` while a container is open.
    pub end: Option<usize>,
    /// Number of direct children.
    pub children: usize,
    /// Index of the token this one is attached to.
    pub parent: Option<usize>,
}

impl Token {
    pub const EMPTY: Token = Token {
        kind: TokenKind::Undefined,
        start: 0,
        end: None,
        children: 0,
        parent: None,
    };

    pub(crate) const fn new(kind: TokenKind, start: usize, end: Option<usize>) -> Self {
        Token {
            kind,
            start,
            end,
            children: 0,
            parent: None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, TokenKind::Object | TokenKind::Array)
    }

    pub fn len(&self) -> usize {
        self.end.map_or(0, |end| end.saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes this token spans, if it is closed and within `json`.
    pub fn as_bytes<'a>(&self, json: &'a [u8]) -> Option<&'a [u8]> {
        json.get(self.start..self.end?)
    }

    pub fn as_str<'a>(&self, json: &'a [u8]) -> Option<&'a str> {
        self.as_bytes(json)
            .and_then(|bytes| core::str::from_utf8(bytes).ok())
    }

    /// True if this is a string token whose raw content equals `s`.
    pub fn eq_str(&self, json: &[u8], s: &str) -> bool {
        self.kind == TokenKind::String && self.as_bytes(json) == Some(s.as_bytes())
    }
}

/// Index just past the subtree rooted at `index`.
///
/// Walks forward consuming each token's children, so it works for
/// containers, keys (one child, the value) and scalars alike. Stops at the
/// end of `tokens` if the array was cut short.
pub fn skip(tokens: &[Token], index: usize) -> usize {
    let mut pending = 1usize;
    let mut i = index;
    while pending > 0 {
        let Some(token) = tokens.get(i) else {
            return tokens.len();
        };
        pending = pending - 1 + token.children;
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_bytes_and_eq_str() {
        let json = br#"{"user":"x"}"#;
        let key = Token::new(TokenKind::String, 2, Some(6));
        assert_eq!(key.as_bytes(json), Some(&b"user"[..]));
        assert!(key.eq_str(json, "user"));
        assert!(!key.eq_str(json, "use"));
        assert!(!key.eq_str(json, "users"));
    }

    #[test]
    fn test_eq_str_requires_string_kind() {
        let json = b"[true]";
        let token = Token::new(TokenKind::Primitive, 1, Some(5));
        assert!(!token.eq_str(json, "true"));
        assert_eq!(token.as_str(json), Some("true"));
    }

    #[test]
    fn test_open_container_has_no_bytes() {
        let token = Token::new(TokenKind::Array, 0, None);
        assert_eq!(token.as_bytes(b"[1,2"), None);
        assert_eq!(token.len(), 0);
        assert!(token.is_container());
    }

    #[test]
    fn test_out_of_range_span() {
        let token = Token::new(TokenKind::String, 2, Some(40));
        assert_eq!(token.as_bytes(b"short"), None);
    }

    #[test]
    fn test_skip_over_scalar_key_and_container() {
        // {"a":1,"b":[2,3]}
        let mut tokens = [Token::EMPTY; 7];
        tokens[0] = Token {
            children: 2,
            ..Token::new(TokenKind::Object, 0, Some(17))
        };
        tokens[1] = Token {
            children: 1,
            ..Token::new(TokenKind::String, 2, Some(3))
        };
        tokens[2] = Token::new(TokenKind::Primitive, 5, Some(6));
        tokens[3] = Token {
            children: 1,
            ..Token::new(TokenKind::String, 8, Some(9))
        };
        tokens[4] = Token {
            children: 2,
            ..Token::new(TokenKind::Array, 11, Some(16))
        };
        tokens[5] = Token::new(TokenKind::Primitive, 12, Some(13));
        tokens[6] = Token::new(TokenKind::Primitive, 14, Some(15));

        assert_eq!(skip(&tokens, 0), 7);
        assert_eq!(skip(&tokens, 1), 3);
        assert_eq!(skip(&tokens, 2), 3);
        assert_eq!(skip(&tokens, 3), 7);
        assert_eq!(skip(&tokens, 4), 7);
        assert_eq!(skip(&tokens[..5], 4), 5);
    }
}
