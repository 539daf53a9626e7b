use super::error::{LexicalError, LexicalErrorType};
use super::token::{str_to_keyword, Token};
use std::fmt::Display;
use crate::utils::prelude::SrcSpan;

pub type Spanned = (u32, Token, u32);

/// A token as produced by [`Lexer::tokenize`].
///
/// `augmented` marks the operator of a rewritten `x op= y`: the lexer emits
/// `x = x op` and the parser takes the whole right-hand side as the second
/// operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
	pub token: Token,
	pub span: SrcSpan,
	pub augmented: bool,
}

impl Lexeme {
	pub fn new(token: Token, span: SrcSpan) -> Self {
		Self { token, span, augmented: false }
	}

	pub fn spanned(&self) -> Spanned {
		(self.span.start, self.token.clone(), self.span.end)
	}
}

pub type LexResult = std::result::Result<Vec<Lexeme>, LexicalError>;

struct OpenBracket {
	closer: char,
	span: SrcSpan,
	line: usize,
	column: usize,
}

pub struct Lexer<T: Iterator<Item = (u32, char)>> {
	position: u32,
	next_position: u32,
	ch: Option<char>,
	next_ch: Option<char>,
	input: T,

	line: usize,
	column: usize,
	brackets: Vec<OpenBracket>,
	tokens: Vec<Lexeme>,
	insert_let: bool,
}

impl<T: Iterator<Item = (u32, char)>> Display for Lexer<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f,
			"Lexer {{\n\tposition: {},\n\tnext_position: {},\n\tch: {:?}, next_ch: {:?},\n\topen brackets: {}\n}}",
			self.position, self.next_position, self.ch, self.next_ch, self.brackets.len()
		)
	}
}

impl<T: Iterator<Item = (u32, char)>> Lexer<T> {
	pub fn new(input: T) -> Self {
		let mut lexer = Self {
			position: 0,
			next_position: 0,
			ch: None,
			next_ch: None,
			input,

			line: 1,
			column: 0,
			brackets: vec![],
			tokens: vec![],
			insert_let: true,
		};

		lexer.next_char();
		lexer.next_char();
		lexer.line = 1;
		lexer.column = 1;

		lexer
	}

	/// Disables the implicit `let` in front of `name = ...`. Used when
	/// re-tokenizing fragments that are not whole statements.
	pub fn without_let_insertion(mut self) -> Self {
		self.insert_let = false;
		self
	}

	pub fn tokenize(self) -> LexResult {
		match self.tokenize_partial() {
			(tokens, None) => Ok(tokens),
			(_, Some(err)) => Err(err),
		}
	}

	/// Scans as far as possible. The returned list always ends in `Eof`,
	/// even when an error stopped the scan early.
	pub fn tokenize_partial(mut self) -> (Vec<Lexeme>, Option<LexicalError>) {
		let error = self.scan().err();
		let eof = SrcSpan::from(self.position, self.position);
		self.tokens.push(Lexeme::new(Token::Eof, eof));

		(self.tokens, error)
	}

	fn scan(&mut self) -> Result<(), LexicalError> {
		while let Some(ch) = self.ch {
			match ch {
				' ' | '\t' | '\r' | '\x0C' => {
					self.next_char();
				},
				'#' => self.skip_comment(),
				'\n' | ';' => {
					let start = self.position;
					self.next_char();

					if self.brackets.is_empty() {
						self.push_newline(SrcSpan::from(start, self.position));
					}
				},
				'\\' => self.line_continuation()?,
				'a'..='z' | 'A'..='Z' | '_' => self.lex_ident(),
				'0'..='9' => self.lex_number()?,
				'"' | '\'' => self.lex_string(ch)?,
				'(' => self.open_bracket(Token::LParen, ')'),
				'[' => self.open_bracket(Token::LSquare, ']'),
				'{' => self.open_bracket(Token::LBrace, '}'),
				')' | ']' | '}' => self.close_bracket(ch)?,
				'+' => self.lex_operator(Token::Plus),
				'%' => self.lex_operator(Token::Mod),
				'^' => self.lex_operator(Token::Pow),
				'-' => {
					if self.next_ch == Some('>') {
						self.eat_chars(2, Token::Arrow);
					} else {
						self.lex_operator(Token::Minus);
					}
				},
				'*' => {
					if self.next_ch == Some('*') {
						self.eat_chars(2, Token::DoubleStar);
					} else {
						self.lex_operator(Token::Mul);
					}
				},
				'/' => {
					if self.next_ch == Some('/') {
						let start = self.position;
						self.next_char();
						self.finish_operator(Token::FloorDiv, start);
					} else {
						self.lex_operator(Token::Div);
					}
				},
				'=' => {
					if self.next_ch == Some('=') {
						self.eat_chars(2, Token::EqEq);
					} else {
						self.maybe_insert_let();
						self.eat_chars(1, Token::Eq);
					}
				},
				'!' => {
					if self.next_ch == Some('=') {
						self.eat_chars(2, Token::NotEq);
					} else {
						let start = self.position;
						self.next_char();
						return Err(LexicalError {
							error: LexicalErrorType::ExpectedAfter { expected: '=', after: '!' },
							location: SrcSpan::from(start, self.position),
						});
					}
				},
				'<' => {
					if self.next_ch == Some('=') {
						self.eat_chars(2, Token::LtEq);
					} else {
						self.eat_chars(1, Token::Lt);
					}
				},
				'>' => {
					if self.next_ch == Some('=') {
						self.eat_chars(2, Token::GtEq);
					} else {
						self.eat_chars(1, Token::Gt);
					}
				},
				'$' => self.eat_chars(1, Token::Dollar),
				'.' => self.eat_chars(1, Token::Dot),
				',' => self.eat_chars(1, Token::Comma),
				':' => self.eat_chars(1, Token::Colon),
				'@' => self.eat_chars(1, Token::At),
				c => {
					let start = self.position;
					self.next_char();
					return Err(LexicalError {
						error: LexicalErrorType::IllegalCharacter { ch: c },
						location: SrcSpan::from(start, self.position),
					});
				}
			}
		}

		if let Some(open) = self.brackets.last() {
			return Err(LexicalError {
				error: LexicalErrorType::UnclosedBracket {
					expected: open.closer,
					opened_line: open.line,
					opened_column: open.column,
				},
				location: SrcSpan::from(open.span.start, self.position),
			});
		}

		Ok(())
	}

	fn next_char(&mut self) -> Option<char> {
		let ch = self.ch;

		let next = match self.input.next() {
			Some((pos, ch)) => {
				self.position = self.next_position;
				self.next_position = pos;

				Some(ch)
			},
			None => {
				self.position = self.next_position;
				self.next_position += self.next_ch.map_or(0, |c| c.len_utf8() as u32);

				None
			}
		};

		if ch == Some('\n') {
			self.line += 1;
			self.column = 1;
		} else if ch.is_some() {
			self.column += 1;
		}

		self.ch = self.next_ch;
		self.next_ch = next;

		ch
	}

	fn push(&mut self, token: Token, span: SrcSpan) {
		self.tokens.push(Lexeme::new(token, span));
	}

	fn push_newline(&mut self, span: SrcSpan) {
		match self.tokens.last() {
			Some(Lexeme { token: Token::Newline, .. }) => {},
			_ => self.push(Token::Newline, span),
		}
	}

	fn eat_chars(&mut self, count: usize, token: Token) {
		let start = self.position;
		for _ in 0..count {
			self.next_char();
		}
		self.push(token, SrcSpan::from(start, self.position));
	}

	fn skip_comment(&mut self) {
		while !matches!(self.ch, Some('\n') | None) {
			self.next_char();
		}
	}

	fn line_continuation(&mut self) -> Result<(), LexicalError> {
		let start = self.position;
		self.next_char();

		if self.ch == Some('\r') && self.next_ch == Some('\n') {
			self.next_char();
		}

		if self.ch == Some('\n') {
			self.next_char();
			return Ok(());
		}

		Err(LexicalError {
			error: LexicalErrorType::StrayBackslash,
			location: SrcSpan::from(start, self.position),
		})
	}

	fn open_bracket(&mut self, token: Token, closer: char) {
		let (line, column) = (self.line, self.column);
		let start = self.position;
		self.next_char();
		let span = SrcSpan::from(start, self.position);

		self.brackets.push(OpenBracket { closer, span, line, column });
		self.push(token, span);
	}

	fn close_bracket(&mut self, found: char) -> Result<(), LexicalError> {
		let start = self.position;
		self.next_char();
		let span = SrcSpan::from(start, self.position);

		let open = match self.brackets.pop() {
			Some(open) => open,
			None => return Err(LexicalError {
				error: LexicalErrorType::UnmatchedCloser { found },
				location: span,
			}),
		};

		if open.closer != found {
			return Err(LexicalError {
				error: LexicalErrorType::MismatchedCloser {
					expected: open.closer,
					found,
					opened_line: open.line,
					opened_column: open.column,
				},
				location: span,
			});
		}

		let token = match found {
			')' => Token::RParen,
			']' => Token::RSquare,
			_ => Token::RBrace,
		};
		self.push(token, span);

		Ok(())
	}

	/// Called right before an `=` or `op=` is emitted. Turns a bare
	/// `name = ...` at statement position into `let name = ...`.
	fn maybe_insert_let(&mut self) {
		if !self.insert_let {
			return;
		}

		let len = self.tokens.len();
		let ident_span = match self.tokens.last() {
			Some(Lexeme { token: Token::Ident(_), span, .. }) => *span,
			_ => return,
		};

		let at_statement_start = len < 2 || matches!(
			self.tokens[len - 2].token,
			Token::Newline | Token::Do | Token::Else | Token::Arrow
		);

		if at_statement_start {
			let span = SrcSpan::from(ident_span.start, ident_span.start);
			self.tokens.insert(len - 1, Lexeme::new(Token::Let, span));
		}
	}

	/// Lexes a single-character operator that may be followed by `=`.
	fn lex_operator(&mut self, token: Token) {
		let start = self.position;
		self.finish_operator(token, start);
	}

	fn finish_operator(&mut self, token: Token, start: u32) {
		self.next_char();
		let op_span = SrcSpan::from(start, self.position);

		if self.ch != Some('=') || self.next_ch == Some('=') {
			self.push(token, op_span);
			return;
		}

		let ident = match self.tokens.last() {
			Some(Lexeme { token: Token::Ident(name), span, .. }) => Some((name.clone(), *span)),
			_ => None,
		};

		match ident {
			Some((name, ident_span)) => {
				self.maybe_insert_let();

				let eq_start = self.position;
				self.next_char();
				self.push(Token::Eq, SrcSpan::from(eq_start, self.position));
				self.push(Token::Ident(name), ident_span);
				self.tokens.push(Lexeme { token, span: op_span, augmented: true });
			},
			None => {
				self.push(token, op_span);
				self.eat_chars(1, Token::Eq);
			}
		}
	}

	fn lex_ident(&mut self) {
		let start = self.position;
		let mut ident = String::new();

		while let Some(ch) = self.ch {
			if !(ch.is_ascii_alphanumeric() || ch == '_') {
				break;
			}
			ident.push(ch);
			self.next_char();
		}

		let span = SrcSpan::from(start, self.position);

		match str_to_keyword(&ident) {
			Some(keyword) => self.push(keyword, span),
			None => self.push(Token::Ident(ident), span),
		}
	}

	fn lex_number(&mut self) -> Result<(), LexicalError> {
		let start = self.position;
		let mut value = String::new();
		let mut has_period = false;

		loop {
			match self.ch {
				Some(ch) if ch.is_ascii_digit() => {
					value.push(ch);
					self.next_char();
				},
				// a second period, or one not followed by a digit, belongs to the parser
				Some('.') if !has_period && matches!(self.next_ch, Some(c) if c.is_ascii_digit()) => {
					has_period = true;
					value.push('.');
					self.next_char();
				},
				_ => break,
			}
		}

		let span = SrcSpan::from(start, self.position);

		let token = if has_period {
			match value.parse::<f64>() {
				Ok(value) => Token::Float(value),
				Err(_) => return Err(LexicalError { error: LexicalErrorType::IntegerTooLarge, location: span }),
			}
		} else {
			match value.parse::<i64>() {
				Ok(value) => Token::Int(value),
				Err(_) => return Err(LexicalError { error: LexicalErrorType::IntegerTooLarge, location: span }),
			}
		};

		self.push(token, span);
		Ok(())
	}

	fn lex_string(&mut self, quote: char) -> Result<(), LexicalError> {
		let start = self.position;
		self.next_char();

		let triple = self.ch == Some(quote) && self.next_ch == Some(quote);
		if triple {
			self.next_char();
			self.next_char();
		}

		let mut string = String::new();
		let mut escaped = false;

		loop {
			let ch = match self.ch {
				Some(ch) => ch,
				None => return Err(LexicalError {
					error: LexicalErrorType::UnterminatedString { quote, triple },
					location: SrcSpan::from(start, self.position),
				}),
			};

			if escaped {
				string.push(match ch {
					'n' => '\n',
					't' => '\t',
					'r' => '\r',
					other => other,
				});
				escaped = false;
				self.next_char();
				continue;
			}

			if ch == '\\' {
				escaped = true;
				self.next_char();
				continue;
			}

			if ch == quote {
				if !triple {
					self.next_char();
					break;
				}

				if self.next_ch == Some(quote) {
					// need the third quote too; peek past the window by consuming
					self.next_char();
					self.next_char();
					if self.ch == Some(quote) {
						self.next_char();
						break;
					}
					string.push(quote);
					string.push(quote);
					continue;
				}
			}

			string.push(ch);
			self.next_char();
		}

		self.push(Token::Str(string), SrcSpan::from(start, self.position));
		Ok(())
	}
}

/// Tokenizes a whole program.
pub fn tokenize(src: &str) -> LexResult {
	Lexer::new(char_stream(src)).tokenize()
}

pub fn char_stream(src: &str) -> impl Iterator<Item = (u32, char)> + '_ {
	src.char_indices().map(|(i, c)| (i as u32, c))
}
