use super::*;

fn lex(source: &str) -> Vec<Lexeme> {
    let (tokens, diagnostics) = Lexer::new(source).tokenize();
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
    tokens.into_iter().map(|t| t.node).collect()
}

#[test]
fn test_keywords_and_idents() {
    assert_eq!(
        lex("stencil with computation interval Field foo"),
        vec![
            Lexeme::Stencil,
            Lexeme::With,
            Lexeme::Computation,
            Lexeme::Interval,
            Lexeme::FieldTy,
            Lexeme::Ident("foo".to_string()),
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_numbers() {
    assert_eq!(
        lex("42 4. 0.25 .5 1e-3 2E+2"),
        vec![
            Lexeme::Integer(42),
            Lexeme::Float(4.0),
            Lexeme::Float(0.25),
            Lexeme::Float(0.5),
            Lexeme::Float(1e-3),
            Lexeme::Float(200.0),
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_ellipsis_is_not_a_float() {
    assert_eq!(
        lex("interval(...)"),
        vec![
            Lexeme::Interval,
            Lexeme::LParen,
            Lexeme::Ellipsis,
            Lexeme::RParen,
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_operators() {
    assert_eq!(
        lex("a ** b * c <= d != e == f >= g - h / i"),
        vec![
            Lexeme::Ident("a".into()),
            Lexeme::StarStar,
            Lexeme::Ident("b".into()),
            Lexeme::Star,
            Lexeme::Ident("c".into()),
            Lexeme::LtEq,
            Lexeme::Ident("d".into()),
            Lexeme::NotEq,
            Lexeme::Ident("e".into()),
            Lexeme::EqEq,
            Lexeme::Ident("f".into()),
            Lexeme::GtEq,
            Lexeme::Ident("g".into()),
            Lexeme::Minus,
            Lexeme::Ident("h".into()),
            Lexeme::Slash,
            Lexeme::Ident("i".into()),
            Lexeme::Eof,
        ]
    );
}

#[test]
fn test_comments_are_skipped() {
    let tokens = lex("a // trailing\n# python style\nb");
    assert_eq!(
        tokens,
        vec![
            Lexeme::Ident("a".into()),
            Lexeme::Ident("b".into()),
            Lexeme::Eof
        ]
    );
}

#[test]
fn test_spans_are_byte_offsets() {
    let (tokens, _) = Lexer::new("out = in_f[-1, 0, 0]").tokenize();
    assert_eq!(tokens[0].span, Span::new(0, 3));
    assert_eq!(tokens[2].span, Span::new(6, 10));
    assert_eq!(tokens[4].node, Lexeme::Minus);
    assert_eq!(tokens[4].span, Span::new(11, 12));
}

#[test]
fn test_unknown_character_reports_and_recovers() {
    let (tokens, diagnostics) = Lexer::new("a $ b").tokenize();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("unexpected character '$'"));
    let kinds: Vec<_> = tokens.into_iter().map(|t| t.node).collect();
    assert_eq!(
        kinds,
        vec![
            Lexeme::Ident("a".into()),
            Lexeme::Ident("b".into()),
            Lexeme::Eof
        ]
    );
}

#[test]
fn test_bang_without_eq_suggests_not() {
    let (_, diagnostics) = Lexer::new("!a").tokenize();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].help.as_deref(),
        Some("use `not` for logical negation")
    );
}

#[test]
fn test_integer_overflow() {
    let (tokens, diagnostics) = Lexer::new("99999999999999999999999").tokenize();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(tokens[0].node, Lexeme::Integer(0));
}
