use super::prelude::{tokenize, Lexer, LexicalError, LexicalErrorType, Token, char_stream};

fn kinds(input: &str) -> Result<Vec<Token>, LexicalError> {
    Ok(tokenize(input)?.into_iter().map(|lexeme| lexeme.token).collect())
}

fn assert_tokens(input: &str, expected: Vec<Token>) -> Result<(), LexicalError> {
    let tokens = kinds(input)?;

    for (idx, token) in expected.iter().enumerate() {
        assert_eq!(
            Some(token), tokens.get(idx),
            "Next token does not match expected token at {} in {:?}",
            idx, tokens
        );
    }
    assert_eq!(tokens.len(), expected.len(), "token count differs: {tokens:?}");

    Ok(())
}

#[test]
fn test_numbers() -> std::result::Result<(), LexicalError> {
    assert_tokens("10 1.5 007 3.25", vec![
        Token::Int(10),
        Token::Float(1.5),
        Token::Int(7),
        Token::Float(3.25),
        Token::Eof,
    ])
}

#[test]
fn test_second_period_ends_number() -> std::result::Result<(), LexicalError> {
    assert_tokens("1.5.x 2.y", vec![
        Token::Float(1.5),
        Token::Dot,
        Token::Ident("x".into()),
        Token::Int(2),
        Token::Dot,
        Token::Ident("y".into()),
        Token::Eof,
    ])
}

#[test]
fn test_operators() -> std::result::Result<(), LexicalError> {
    assert_tokens("a == b != c <= d >= e < f > g -> // % ^ $ ** @", vec![
        Token::Ident("a".into()),
        Token::EqEq,
        Token::Ident("b".into()),
        Token::NotEq,
        Token::Ident("c".into()),
        Token::LtEq,
        Token::Ident("d".into()),
        Token::GtEq,
        Token::Ident("e".into()),
        Token::Lt,
        Token::Ident("f".into()),
        Token::Gt,
        Token::Ident("g".into()),
        Token::Arrow,
        Token::FloorDiv,
        Token::Mod,
        Token::Pow,
        Token::Dollar,
        Token::DoubleStar,
        Token::At,
        Token::Eof,
    ])
}

#[test]
fn test_keywords_and_identifiers() -> std::result::Result<(), LexicalError> {
    assert_tokens("defun done using parent _tmp1 letter", vec![
        Token::Defun,
        Token::Done,
        Token::Using,
        Token::Parent,
        Token::Ident("_tmp1".into()),
        Token::Ident("letter".into()),
        Token::Eof,
    ])
}

#[test]
fn test_strings_and_escapes() -> std::result::Result<(), LexicalError> {
    assert_tokens(r#""a\nb" 'it\'s' "\q\\" """multi
line "quoted" """"#, vec![
        Token::Str("a\nb".into()),
        Token::Str("it's".into()),
        Token::Str("q\\".into()),
        Token::Str("multi\nline \"quoted\" ".into()),
        Token::Eof,
    ])
}

#[test]
fn test_empty_strings() -> std::result::Result<(), LexicalError> {
    assert_tokens(r#""" '' """""""#, vec![
        Token::Str("".into()),
        Token::Str("".into()),
        Token::Str("".into()),
        Token::Eof,
    ])
}

#[test]
fn test_unterminated_string() {
    for input in ["\"abc", "'''abc''", "\"abc\\\""] {
        match tokenize(input) {
            Err(LexicalError { error: LexicalErrorType::UnterminatedString { .. }, .. }) => {},
            other => panic!("expected unterminated string for {input:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_separators_collapse() -> std::result::Result<(), LexicalError> {
    assert_tokens("a\n\n;b;\nc # comment\n", vec![
        Token::Ident("a".into()),
        Token::Newline,
        Token::Ident("b".into()),
        Token::Newline,
        Token::Ident("c".into()),
        Token::Newline,
        Token::Eof,
    ])
}

#[test]
fn test_newlines_inside_brackets_are_ignored() -> std::result::Result<(), LexicalError> {
    assert_tokens("[1,\n2;\n3]\nx", vec![
        Token::LSquare,
        Token::Int(1),
        Token::Comma,
        Token::Int(2),
        Token::Int(3),
        Token::RSquare,
        Token::Newline,
        Token::Ident("x".into()),
        Token::Eof,
    ])
}

#[test]
fn test_line_continuation() -> std::result::Result<(), LexicalError> {
    assert_tokens("1 + \\\n2", vec![
        Token::Int(1),
        Token::Plus,
        Token::Int(2),
        Token::Eof,
    ])
}

#[test]
fn test_stray_backslash() {
    match tokenize("1 \\ 2") {
        Err(err) => {
            assert_eq!(err.error, LexicalErrorType::StrayBackslash);
            assert_eq!(err.details().0, "Stray '\\' character in program");
        },
        Ok(tokens) => panic!("expected an error, got {tokens:?}"),
    }
}

#[test]
fn test_let_insertion() -> std::result::Result<(), LexicalError> {
    assert_eq!(kinds("x = 1")?, kinds("let x = 1")?);
    assert_eq!(kinds("a\nx = 1")?, kinds("a\nlet x = 1")?);
    assert_eq!(kinds("if c do x = 1")?, kinds("if c do let x = 1")?);
    assert_eq!(kinds("defun f() -> y = 2")?, kinds("defun f() -> let y = 2")?);

    // comparisons and explicit lets are left alone
    assert_tokens("x == 1", vec![Token::Ident("x".into()), Token::EqEq, Token::Int(1), Token::Eof])?;
    assert_tokens("f(x = 1)", vec![
        Token::Ident("f".into()),
        Token::LParen,
        Token::Ident("x".into()),
        Token::Eq,
        Token::Int(1),
        Token::RParen,
        Token::Eof,
    ])
}

#[test]
fn test_augmented_assignment() -> std::result::Result<(), LexicalError> {
    assert_eq!(kinds("x += 1")?, kinds("x = x + 1")?);
    assert_eq!(kinds("x //= 2")?, kinds("x = x // 2")?);
    assert_eq!(kinds("x ^= 2")?, kinds("let x = x ^ 2")?);

    let tokens = tokenize("total -= 3")?;
    let op = &tokens[4];
    assert_eq!(op.token, Token::Minus);
    assert!(op.augmented, "synthesized operator should be flagged");
    // the synthesized name reuses the span of the original one
    assert_eq!(tokens[3].span, tokens[1].span);

    Ok(())
}

#[test]
fn test_not_equal_requires_equals() {
    match tokenize("a ! b") {
        Err(err) => assert_eq!(err.error, LexicalErrorType::ExpectedAfter { expected: '=', after: '!' }),
        Ok(tokens) => panic!("expected an error, got {tokens:?}"),
    }
}

#[test]
fn test_illegal_character() {
    match tokenize("a & b") {
        Err(err) => {
            assert_eq!(err.error, LexicalErrorType::IllegalCharacter { ch: '&' });
            assert_eq!(err.kind_name(), "IllegalCharacterError");
        },
        Ok(tokens) => panic!("expected an error, got {tokens:?}"),
    }
}

#[test]
fn test_balanced_brackets_never_error() {
    let inputs = [
        "(1)",
        "[(1), {\"a\": [2]}]",
        "f(g(h([{}])))",
        "{\n\"k\": (1 +\n2)\n}",
    ];

    for input in inputs {
        assert!(tokenize(input).is_ok(), "balanced input {input:?} failed to lex");
    }
}

#[test]
fn test_mismatched_closer_names_expected() {
    let cases = [
        ("([)", ']'),
        ("{(]", ')'),
        ("[1, 2)", ']'),
        ("(}", ')'),
    ];

    for (input, expected) in cases {
        match tokenize(input) {
            Err(err) => {
                assert_eq!(err.expected_closer(), Some(expected), "wrong closer for {input:?}");
                assert!(err.details().0.contains(expected));
            },
            Ok(tokens) => panic!("expected an error for {input:?}, got {tokens:?}"),
        }
    }
}

#[test]
fn test_mismatch_reports_opening_position() {
    let err = tokenize("x\n  [1, 2)").expect_err("mismatch");

    assert_eq!(err.error, LexicalErrorType::MismatchedCloser {
        expected: ']',
        found: ')',
        opened_line: 2,
        opened_column: 3,
    });
    assert!(err.details().1[0].contains("line 2, column 3"));
}

#[test]
fn test_unmatched_closer_and_unclosed_opener() {
    let err = tokenize("1)").expect_err("unmatched");
    assert_eq!(err.error, LexicalErrorType::UnmatchedCloser { found: ')' });

    let err = tokenize("f(1, [2").expect_err("unclosed");
    assert_eq!(err.expected_closer(), Some(']'));
}

#[test]
fn test_partial_tokenize_always_ends_with_eof() {
    let (tokens, error) = Lexer::new(char_stream("a + & b")).tokenize_partial();

    assert!(error.is_some());
    assert_eq!(tokens.last().map(|lexeme| &lexeme.token), Some(&Token::Eof));
    assert_eq!(tokens[0].token, Token::Ident("a".into()));
}

#[test]
fn test_spans() -> std::result::Result<(), LexicalError> {
    let tokens = tokenize("let abc = 'é' + 10")?;
    let spans: Vec<(u32, u32)> = tokens.iter().map(|lexeme| (lexeme.span.start, lexeme.span.end)).collect();

    assert_eq!(spans, vec![(0, 3), (4, 7), (8, 9), (10, 14), (15, 16), (17, 19), (19, 19)]);

    Ok(())
}
