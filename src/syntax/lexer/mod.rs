use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

pub(crate) struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub(crate) fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Lexeme> {
        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.source.len() {
                return self.make_token(Lexeme::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }

            if ch.is_ascii_digit() {
                return self.scan_number();
            }

            // `.5` style float literals
            if ch == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                return self.scan_number();
            }

            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol returned None → error was recorded, try again
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            let line_comment = self.source.get(self.pos) == Some(&b'#')
                || (self.source.get(self.pos) == Some(&b'/')
                    && self.source.get(self.pos + 1) == Some(&b'/'));
            if line_comment {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        let token = Lexeme::from_keyword(&text).unwrap_or(Lexeme::Ident(text));
        self.make_token(token, start, self.pos)
    }

    /// Scan an integer or float literal: `42`, `4.`, `0.25`, `.5`, `1e-3`.
    fn scan_number(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        let mut is_float = false;
        self.skip_digits();

        // A fractional part, unless the dot starts an ellipsis.
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') {
            is_float = true;
            self.pos += 1;
            self.skip_digits();
        }

        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut look = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                look = 2;
            }
            if self.peek_at(look).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += look;
                self.skip_digits();
            }
        }

        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.make_token(Lexeme::Float(v), start, self.pos),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        format!("malformed float literal '{}'", text),
                        Span::new(start as u32, self.pos as u32),
                    ));
                    self.make_token(Lexeme::Float(0.0), start, self.pos)
                }
            }
        } else {
            match text.parse::<u64>() {
                Ok(n) => self.make_token(Lexeme::Integer(n), start, self.pos),
                Err(_) => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            format!("integer literal '{}' is too large", text),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help(format!("maximum integer value is {}", u64::MAX)),
                    );
                    self.make_token(Lexeme::Integer(0), start, self.pos)
                }
            }
        }
    }

    fn skip_digits(&mut self) {
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];
        self.pos += 1;

        let token = match ch {
            b'(' => Lexeme::LParen,
            b')' => Lexeme::RParen,
            b'{' => Lexeme::LBrace,
            b'}' => Lexeme::RBrace,
            b'[' => Lexeme::LBracket,
            b']' => Lexeme::RBracket,
            b',' => Lexeme::Comma,
            b':' => Lexeme::Colon,
            b';' => Lexeme::Semicolon,
            b'+' => Lexeme::Plus,
            b'-' => Lexeme::Minus,
            b'/' => Lexeme::Slash,
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.pos += 1;
                    Lexeme::StarStar
                } else {
                    Lexeme::Star
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::EqEq
                } else {
                    Lexeme::Eq
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::LtEq
                } else {
                    Lexeme::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::GtEq
                } else {
                    Lexeme::Gt
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Lexeme::NotEq
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unexpected '!'".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help("use `not` for logical negation".to_string()),
                    );
                    return None;
                }
            }
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    Lexeme::Ellipsis
                } else {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unexpected '.'".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help(
                            "attribute access is not part of the stencil language".to_string(),
                        ),
                    );
                    return None;
                }
            }
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("unexpected character '{}' (U+{:04X})", ch as char, ch),
                        Span::new(start as u32, self.pos as u32),
                    )
                    .with_help(
                        "this character is not recognized as part of stencil syntax".to_string(),
                    ),
                );
                return None;
            }
        };

        Some(self.make_token(token, start, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.source.get(self.pos + ahead).copied()
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests;
