use crate::parser::prelude::{parse_module, BinOp, Module, Node, ParseError, ParseErrorType};

fn canonical(input: &str) -> Result<String, ParseError> {
    Ok(parse_module(input)?.to_string())
}

fn assert_canonical(input: &str, expected: &str) -> Result<(), ParseError> {
    assert_eq!(canonical(input)?, expected, "canonical form of {input:?}");
    Ok(())
}

fn single(input: &str) -> Result<Node, ParseError> {
    let Module { mut statements, .. } = parse_module(input)?;
    assert_eq!(statements.len(), 1, "expected one statement in {input:?}");
    Ok(statements.remove(0))
}

fn parse_err(input: &str) -> ParseErrorType {
    match parse_module(input) {
        Err(err) => err.error,
        Ok(module) => panic!("expected {input:?} to fail, parsed as {module}"),
    }
}

#[test]
fn test_arithmetic_precedence() -> Result<(), ParseError> {
    assert_canonical("1 + 2 * 3", "(1 + (2 * 3))")?;
    assert_canonical("(1 + 2) * 3", "((1 + 2) * 3)")?;
    assert_canonical("10 - 4 - 3", "((10 - 4) - 3)")?;
    assert_canonical("7 // 2 % 3 / 1", "(((7 // 2) % 3) / 1)")
}

#[test]
fn test_power_is_right_associative() -> Result<(), ParseError> {
    assert_canonical("2 ^ 3 ^ 2", "(2 ^ (3 ^ 2))")?;
    assert_canonical("-2 ^ 2", "(-(2 ^ 2))")?;
    assert_canonical("2 ^ -1", "(2 ^ (-1))")
}

#[test]
fn test_index_binds_tighter_than_arithmetic() -> Result<(), ParseError> {
    assert_canonical("a $ 0 $ 1", "((a $ 0) $ 1)")?;
    assert_canonical("a $ 1 + 1", "((a $ 1) + 1)")?;
    assert_canonical("-a $ 0", "(-(a $ 0))")
}

#[test]
fn test_logic_and_comparison() -> Result<(), ParseError> {
    assert_canonical("not a == b and c", "((not (a == b)) and c)")?;
    assert_canonical("a < b or b >= c", "((a < b) or (b >= c))")?;
    assert_canonical("1 < 2 < 3", "((1 < 2) < 3)")
}

#[test]
fn test_calls_and_members() -> Result<(), ParseError> {
    assert_canonical("ns.f(1)(2)", "ns.f(1)(2)")?;
    assert_canonical("f(1, let k = 2, *xs, **kw)", "f(1, let k = 2, *xs, **kw)")?;
    assert_canonical("f(k = 2)", "f(let k = 2)")?;
    assert_canonical("(a + b).c", "(a + b).c")
}

#[test]
fn test_literals() -> Result<(), ParseError> {
    assert_canonical("1.50", "1.5")?;
    assert_canonical("2.0", "2.0")?;
    assert_canonical(r#""a\"b\n""#, r#""a\"b\n""#)?;
    assert_canonical("{\"a\": 1, \"b\": [1, 2]}", "{\"a\": 1, \"b\": [1, 2]}")?;
    assert_canonical("[]", "[]")?;
    assert_canonical("{}", "{}")
}

#[test]
fn test_assignments() -> Result<(), ParseError> {
    assert_eq!(canonical("x = 1")?, canonical("let x = 1")?);
    assert_canonical("let a, b = [1, 2]", "let a, b = [1, 2]")?;
    assert_canonical("let a as b", "let a as b")?;
    assert_canonical("del a, b", "del a, b")?;

    match single("a $ 0 = 5")? {
        Node::IndexAssign { target, index, value, .. } => {
            assert_eq!(target.to_string(), "a");
            assert_eq!(index.to_string(), "0");
            assert_eq!(value.to_string(), "5");
        },
        other => panic!("expected an index assignment, got {other:?}"),
    }

    assert_eq!(parse_err("1 = 2"), ParseErrorType::InvalidAssignmentTarget);

    Ok(())
}

#[test]
fn test_augmented_assignment_takes_whole_rhs() -> Result<(), ParseError> {
    assert_canonical("x -= 1 + 2", "let x = (x - (1 + 2))")?;
    assert_canonical("x = x - 1 + 2", "let x = ((x - 1) + 2)")?;
    assert_canonical("x *= 3", "let x = (x * 3)")?;

    match single("total //= 2")? {
        Node::VarAssign { value, .. } => {
            assert!(matches!(*value, Node::BinOp { op: BinOp::FloorDiv, .. }));
        },
        other => panic!("expected an assignment, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_if_chains() -> Result<(), ParseError> {
    assert_canonical("if a do 1 elif b do 2 else 3", "if a do 1 elif b do 2 else 3")?;
    assert_canonical("if a do 1\nelse 2", "if a do 1 else 2")?;
    assert_canonical(
        "if a do\n  x = 1\nelif b do\n  x = 2\nelse\n  x = 3\ndone",
        "if a do\nlet x = 1\nelif b do\nlet x = 2\nelse\nlet x = 3\ndone"
    )?;

    // an inline chain without else leaves the next line alone
    let module = parse_module("if a do 1\nb")?;
    assert_eq!(module.statements.len(), 2);

    Ok(())
}

#[test]
fn test_if_chain_cannot_mix_forms() {
    assert_eq!(
        parse_err("if a do 1\nelse\n  2\ndone"),
        ParseErrorType::MixedBlockForms { construct: "if" }
    );
    assert_eq!(
        parse_err("if a do\n  1\nelif b do 2"),
        ParseErrorType::MixedBlockForms { construct: "if" }
    );
}

#[test]
fn test_loops() -> Result<(), ParseError> {
    assert_canonical("for i = 1 to 10 step 2 do x", "for i = 1 to 10 step 2 do x")?;
    assert_canonical("for k, v in m do print(k)", "for k, v in m do print(k)")?;
    assert_canonical("while i < 3 do\n  i += 1\ndone", "while (i < 3) do\nlet i = (i + 1)\ndone")?;
    assert_canonical(
        "for x in xs do\n  if x do break\n  continue\ndone",
        "for x in xs do\nif x do break\ncontinue\ndone"
    )
}

#[test]
fn test_functions() -> Result<(), ParseError> {
    assert_canonical(
        "defun add(a, let b = 2)\n    return a + b\ndone",
        "defun add(a, let b = 2)\nreturn (a + b)\ndone"
    )?;
    assert_canonical("defun (x) -> x * 2", "defun(x) -> (x * 2)")?;
    assert_canonical("defun f(a, *rest, **opts) -> rest", "defun f(a, *rest, **opts) -> rest")?;
    assert_canonical("@memo\n@trace(1)\nasync defun f(n) -> n", "@memo\n@trace(1)\nasync defun f(n) -> n")?;
    assert_canonical("await f()", "(await f())")?;
    assert_canonical("defun f()\n  return\ndone", "defun f()\nreturn\ndone")
}

#[test]
fn test_parameter_validation() {
    assert_eq!(
        parse_err("defun f(let a = 1, b) -> a"),
        ParseErrorType::DefaultBeforeRequired { name: "b".into() }
    );
    assert_eq!(
        parse_err("defun f(a, a) -> a"),
        ParseErrorType::DuplicateParameter { name: "a".into() }
    );
    assert_eq!(
        parse_err("defun f(*a, *b) -> a"),
        ParseErrorType::DuplicateCollector { kind: "*" }
    );
}

#[test]
fn test_namespaces_and_scope_escapes() -> Result<(), ParseError> {
    assert_canonical("namespace ns\n  x = 1\ndone", "namespace ns\nlet x = 1\ndone")?;
    assert_canonical(
        "defun f()\n  using parent a, b\n  using c\ndone",
        "defun f()\nusing parent a, b\nusing c\ndone"
    )
}

#[test]
fn test_load_paths() -> Result<(), ParseError> {
    assert_canonical("load \"libs.math\"", "load \"libs.math\"")?;
    assert_canonical("load \"local.util.strings\"", "load \"local.util.strings\"")?;
    assert_eq!(parse_err("load \"math\""), ParseErrorType::InvalidLoadPath { path: "math".into() });

    Ok(())
}

#[test]
fn test_errors_after_progress_are_sticky() {
    // the assignment starts a statement, so its failure is reported as is
    match parse_err("if a do\n  x = \ndone") {
        ParseErrorType::UnexpectedToken { token, .. } => {
            assert_eq!(token, crate::lexer::prelude::Token::Done)
        },
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_trailing_tokens() {
    assert!(matches!(parse_err("1 2"), ParseErrorType::TrailingTokens { .. }));
    assert!(matches!(parse_err("done"), ParseErrorType::UnexpectedToken { .. }));
}

#[test]
fn test_lexical_errors_are_wrapped() {
    match parse_module("a & b") {
        Err(err) => assert_eq!(err.kind_name(), "IllegalCharacterError"),
        Ok(module) => panic!("expected an error, got {module}"),
    }
}

#[test]
fn test_canonical_form_round_trips() -> Result<(), ParseError> {
    let program = r#"
        load "libs.math"
        counter = 0

        @logged
        defun bump(let by = 1, *extra)
            using counter
            counter += by * 2
            if counter > 10 do
                return none
            elif counter == 5 do
                print("five")
            done
            return counter
        done

        namespace shapes
            defun area(w, h) -> w * h
        done

        for i = 0 to 3 do bump(i)
        for k, v in {"a": [1, 2.5], "b": "x\ty"} do print(k, v $ 0)
        while not (counter >= 3 or false) do counter = counter + -1 ^ 2
        data $ "key" = shapes.area(2, let h = 3)
        result = await fetch(*args, **opts)
    "#;

    let first = canonical(program)?;
    let second = canonical(&first)?;

    assert_eq!(first, second);
    assert!(first.contains("let counter = (counter + (by * 2))"));

    Ok(())
}
