mod lexer;
mod token;

pub use token::{Position, TokenInstance, TokenKind};

/// Convert script text into a flat token stream terminated by an EOF token.
///
/// Lexing never fails. Unrecognized characters become
/// [`TokenKind::Unknown`] tokens and are reported later by the parser.
/// Comments are dropped from the returned stream.
#[must_use]
pub fn tokenize(source: &str) -> Vec<TokenInstance> {
    let mut lexer = lexer::Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        if token.kind != TokenKind::Comment {
            tokens.push(token);
        }
    }
    tokens.push(TokenInstance::new(TokenKind::Eof, "", lexer.position()));
    tokens
}
