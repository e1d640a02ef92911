use crate::lex::{TokenInstance, TokenKind};

use super::ParseError;

/// Position in a token stream, passed by `&mut` through the grammar
/// functions.
///
/// Newlines separate clauses, except inside parentheses where the cursor
/// steps over them transparently.
pub(crate) struct TokenCursor {
    tokens: Vec<TokenInstance>,
    current: usize,
    paren_depth: usize,
}

impl TokenCursor {
    /// `tokens` must end with an EOF token, as produced by
    /// [`tokenize`](crate::lex::tokenize).
    pub(crate) fn new(tokens: Vec<TokenInstance>) -> Self {
        debug_assert!(tokens.last().is_some_and(|t| t.is(TokenKind::Eof)));
        Self {
            tokens,
            current: 0,
            paren_depth: 0,
        }
    }

    fn last_index(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }

    /// Index of the next significant token.
    fn index(&self) -> usize {
        let mut i = self.current;
        if self.paren_depth > 0 {
            while i < self.last_index() && self.tokens[i].is(TokenKind::Newline) {
                i += 1;
            }
        }
        i.min(self.last_index())
    }

    pub(crate) fn peek(&self) -> &TokenInstance {
        &self.tokens[self.index()]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().is(TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    /// Consume the next token. At EOF the EOF token is returned and the
    /// cursor stays put.
    pub(crate) fn advance(&mut self) -> &TokenInstance {
        let i = self.index();
        self.current = if i < self.last_index() { i + 1 } else { i };
        &self.tokens[i]
    }

    /// Consume the next token when it has the given kind.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(
        &mut self,
        kind: TokenKind,
        message: &str,
    ) -> Result<&TokenInstance, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    /// Consume `(` and start ignoring newlines until the matching `)`.
    pub(crate) fn open_paren(&mut self, message: &str) -> Result<(), ParseError> {
        self.consume(TokenKind::LParen, message)?;
        self.paren_depth += 1;
        Ok(())
    }

    pub(crate) fn close_paren(&mut self, message: &str) -> Result<(), ParseError> {
        self.consume(TokenKind::RParen, message)?;
        self.paren_depth = self.paren_depth.saturating_sub(1);
        Ok(())
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.tokens[self.current].is(TokenKind::Newline) {
            self.current += 1;
        }
    }

    /// Consume `kind` when it is the next token, or when it is the first
    /// token after one or more newlines. Lets `AND`/`OR` lead a
    /// continuation line.
    pub(crate) fn eat_continued(&mut self, kind: TokenKind) -> bool {
        let mut i = self.index();
        while i < self.last_index() && self.tokens[i].is(TokenKind::Newline) {
            i += 1;
        }
        if self.tokens[i].is(kind) {
            self.current = i + 1;
            true
        } else {
            false
        }
    }

    /// Line of the last consumed token that is not a newline.
    pub(crate) fn previous_line(&self) -> usize {
        self.tokens[..self.current]
            .iter()
            .rev()
            .find(|t| !t.is(TokenKind::Newline))
            .map_or(1, TokenInstance::line)
    }

    /// A parse error positioned at the next token.
    pub(crate) fn error(&self, message: &str) -> ParseError {
        ParseError::at(self.peek(), message)
    }
}
