use winnow::ascii::{digit1, till_line_ending};
use winnow::combinator::{alt, opt, repeat};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::token::{Position, TokenInstance, TokenKind};

// -- Character classes ------------------------------------------------------

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// -- Primitive scanners -----------------------------------------------------

/// Spaces, tabs and carriage returns. Newlines are significant.
fn blanks<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(0.., [' ', '\t', '\r']).parse_next(input)
}

/// Spaces and tabs only, used between the words of a multi-word keyword.
fn inline_spaces<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(0.., [' ', '\t']).parse_next(input)
}

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (one_of(is_word_start), take_while(0.., is_word_char))
        .take()
        .parse_next(input)
}

fn dotted_segments<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    repeat(1.., ('.', take_while(1.., is_word_char)).void())
        .map(|()| ())
        .take()
        .parse_next(input)
}

fn number<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (opt('-'), digit1, opt(('.', digit1)))
        .take()
        .parse_next(input)
}

fn comment<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    ('#', till_line_ending).take().parse_next(input)
}

fn operator<'i>(input: &mut &'i str) -> ModalResult<(TokenKind, &'i str)> {
    alt((
        "!=".value(TokenKind::Neq),
        ">=".value(TokenKind::Gte),
        "<=".value(TokenKind::Lte),
        '('.value(TokenKind::LParen),
        ')'.value(TokenKind::RParen),
        ','.value(TokenKind::Comma),
        ':'.value(TokenKind::Colon),
        '.'.value(TokenKind::Dot),
        '+'.value(TokenKind::Plus),
        '-'.value(TokenKind::Minus),
        '='.value(TokenKind::Eq),
        '!'.value(TokenKind::Not),
        '>'.value(TokenKind::Gt),
        '<'.value(TokenKind::Lt),
    ))
    .with_taken()
    .parse_next(input)
}

/// Byte length of a quoted string starting at the front of `input`.
///
/// Stops after the closing quote, or before a newline / end of input when
/// the string is unterminated. `\` followed by the quote character does not
/// close the string.
fn quoted_len(input: &str, quote: char) -> usize {
    let mut end = quote.len_utf8();
    let mut chars = input.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\n' {
            break;
        }
        if c == '\\' {
            if let Some(&(j, q)) = chars.peek() {
                if q == quote {
                    chars.next();
                    end = j + q.len_utf8();
                    continue;
                }
            }
        }
        end = i + c.len_utf8();
        if c == quote {
            break;
        }
    }
    end
}

// -- Lexer ------------------------------------------------------------------

/// Cursor over the script source. Tracks the current line and the byte
/// offset at which that line starts so columns can be computed lazily.
pub(crate) struct Lexer<'a> {
    source: &'a str,
    input: &'a str,
    line: usize,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            input: source,
            line: 1,
            line_start: 0,
        }
    }

    fn offset(&self) -> usize {
        self.source.len() - self.input.len()
    }

    pub(crate) fn position(&self) -> Position {
        let column = self.source[self.line_start..self.offset()].chars().count() + 1;
        Position::new(self.line, column)
    }

    /// Produce the next token, or `None` once the input is exhausted.
    ///
    /// Never fails: anything that cannot be scanned becomes an
    /// [`TokenKind::Unknown`] token covering a single character.
    pub(crate) fn next_token(&mut self) -> Option<TokenInstance> {
        // `blanks` accepts zero characters and cannot fail.
        blanks(&mut self.input).ok();

        let mut chars = self.input.chars();
        let c = chars.next()?;
        let next = chars.next();
        let start = self.position();
        let checkpoint = self.input;

        let scanned = match c {
            '\n' => Ok(self.newline(start)),
            '#' => comment(&mut self.input)
                .map(|text| TokenInstance::new(TokenKind::Comment, text[1..].trim(), start)),
            '"' | '\'' => Ok(self.string(c, start)),
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                number(&mut self.input).map(|text| TokenInstance::new(TokenKind::Number, text, start))
            }
            c if is_word_start(c) => self.identifier_or_keyword(start),
            _ => operator(&mut self.input).map(|(kind, text)| TokenInstance::new(kind, text, start)),
        };

        Some(match scanned {
            Ok(token) => token,
            Err(_) => {
                self.input = checkpoint;
                self.unknown(start)
            }
        })
    }

    fn newline(&mut self, start: Position) -> TokenInstance {
        self.input = &self.input[1..];
        self.line += 1;
        self.line_start = self.offset();
        TokenInstance::new(TokenKind::Newline, "\n", start)
    }

    fn unknown(&mut self, start: Position) -> TokenInstance {
        let len = self.input.chars().next().map_or(0, char::len_utf8);
        let (text, rest) = self.input.split_at(len);
        self.input = rest;
        TokenInstance::new(TokenKind::Unknown, text, start)
    }

    fn string(&mut self, quote: char, start: Position) -> TokenInstance {
        let len = quoted_len(self.input, quote);
        let (text, rest) = self.input.split_at(len);
        self.input = rest;
        TokenInstance::new(TokenKind::String, text, start)
    }

    fn identifier_or_keyword(&mut self, start: Position) -> ModalResult<TokenInstance> {
        let first = word(&mut self.input)?;

        // A dotted reference is always an identifier, never a keyword.
        if self.input.starts_with('.')
            && self.input[1..].chars().next().is_some_and(is_word_char)
        {
            let tail = dotted_segments(&mut self.input)?;
            return Ok(TokenInstance::new(
                TokenKind::Identifier,
                format!("{first}{tail}"),
                start,
            ));
        }

        let upper = first.to_ascii_uppercase();
        let compound = match upper.as_str() {
            "IS" => {
                if self.follows("EMPTY") {
                    Some((TokenKind::IsEmpty, "IS EMPTY"))
                } else {
                    let checkpoint = self.input.checkpoint();
                    if self.follows("NOT") && self.follows("EMPTY") {
                        Some((TokenKind::IsNotEmpty, "IS NOT EMPTY"))
                    } else {
                        self.input.reset(&checkpoint);
                        None
                    }
                }
            }
            "NOT" => self.follows("IN").then_some((TokenKind::NotIn, "NOT IN")),
            "STARTS" => self
                .follows("WITH")
                .then_some((TokenKind::StartsWith, "STARTS WITH")),
            "ENDS" => self
                .follows("WITH")
                .then_some((TokenKind::EndsWith, "ENDS WITH")),
            "PASS" => self
                .follows("MESSAGE")
                .then_some((TokenKind::PassMessage, "PASS MESSAGE")),
            "FAIL" => self
                .follows("MESSAGE")
                .then_some((TokenKind::FailMessage, "FAIL MESSAGE")),
            _ => None,
        };

        if let Some((kind, text)) = compound {
            return Ok(TokenInstance::new(kind, text, start));
        }

        let kind = TokenKind::keyword(first).unwrap_or(TokenKind::Identifier);
        Ok(TokenInstance::new(kind, first, start))
    }

    /// Consume `expected` as the next word on the same line if it is there.
    /// On a mismatch nothing is consumed, not even the separating spaces.
    fn follows(&mut self, expected: &str) -> bool {
        let checkpoint = self.input.checkpoint();
        let matched = inline_spaces(&mut self.input).is_ok_and(|spaces| !spaces.is_empty())
            && word(&mut self.input).is_ok_and(|w| w.eq_ignore_ascii_case(expected));
        if !matched {
            self.input.reset(&checkpoint);
        }
        matched
    }
}
