use std::collections::BTreeMap;

use crate::{
    environment::prelude::{
        format_decimal, normalize_index, parse_decimal, Binding, Context, OpError, Shared, SymbolTable, Value,
    },
    eval::prelude::RuntimeErrorKind,
    parser::prelude::BinOp,
    utils::prelude::{Source, SrcSpan},
};

fn ints(values: &[i64]) -> Value {
    Value::list(values.iter().copied().map(Value::Int).collect())
}

fn op(left: Value, op: BinOp, right: Value) -> Result<Value, OpError> {
    left.binary(op, &right)
}

fn assert_op(left: Value, bin: BinOp, right: Value, expected: &str) -> Result<(), OpError> {
    let shown = format!("{left:?} {} {right:?}", bin.symbol());
    assert_eq!(op(left, bin, right)?.repr(), expected, "result of {shown}");
    Ok(())
}

fn op_err(left: Value, bin: BinOp, right: Value) -> OpError {
    match op(left, bin, right) {
        Err(err) => err,
        Ok(value) => panic!("expected '{}' to fail, got {value:?}", bin.symbol()),
    }
}

fn program_context() -> std::sync::Arc<Context> {
    Context::module("<program>", Source::new("<test>", ""), SymbolTable::new(None), None, SrcSpan::default())
}

#[test]
fn test_integer_arithmetic() -> Result<(), OpError> {
    assert_op(Value::Int(5), BinOp::FloorDiv, Value::Int(2), "2")?;
    assert_op(Value::Int(-5), BinOp::FloorDiv, Value::Int(2), "-3")?;
    assert_op(Value::Int(5), BinOp::Mod, Value::Int(2), "1")?;
    assert_op(Value::Int(-5), BinOp::Mod, Value::Int(3), "1")?;
    assert_op(Value::Int(2), BinOp::Pow, Value::Int(10), "1024")?;
    assert_op(Value::Int(0), BinOp::Pow, Value::Int(0), "1")?;
    assert_op(Value::Int(7), BinOp::Div, Value::Int(2), "3.5")
}

#[test]
fn test_mixed_numbers_widen() -> Result<(), OpError> {
    assert_op(Value::Int(1), BinOp::Add, Value::Float(0.5), "1.5")?;
    assert_op(Value::Float(2.0), BinOp::Mul, Value::Int(3), "6.0")?;

    let third = parse_decimal("1/3").map(Value::decimal).expect("1/3 parses");
    assert_op(third.clone(), BinOp::Mul, Value::Int(3), "1")?;
    assert_op(third, BinOp::Add, Value::Int(1), "4/3")
}

#[test]
fn test_math_errors() {
    for (left, bin, right, message) in [
        (Value::Int(1), BinOp::Div, Value::Int(0), "Division by zero"),
        (Value::Int(1), BinOp::Mod, Value::Int(0), "Modulo by zero"),
        (Value::Float(1.0), BinOp::FloorDiv, Value::Float(0.0), "Division by zero"),
        (Value::Int(i64::MAX), BinOp::Add, Value::Int(1), "Integer overflow"),
    ] {
        let err = op_err(left, bin, right);
        assert_eq!(err.kind, RuntimeErrorKind::Math);
        assert_eq!(err.message, message);
    }

    let err = op_err(Value::Float(-8.0), BinOp::Pow, Value::Float(0.5));
    assert_eq!(err.kind, RuntimeErrorKind::Math);
    assert!(err.message.starts_with("Math domain error"), "got {}", err.message);
}

#[test]
fn test_none_operands() {
    let err = op_err(Value::None, BinOp::Add, Value::Int(1));
    assert_eq!(err.kind, RuntimeErrorKind::Type);
    assert_eq!(err.message, "Cannot perform arithmetic or logical operation on 'none'");

    assert!(Value::None.not().is_err(), "'not none' must fail");
    assert!(Value::None.negate().is_err(), "'-none' must fail");
}

#[test]
fn test_none_comparison_table() -> Result<(), OpError> {
    assert_op(Value::None, BinOp::Eq, Value::None, "true")?;
    assert_op(Value::None, BinOp::LtEq, Value::None, "true")?;
    assert_op(Value::None, BinOp::Lt, Value::None, "false")?;
    assert_op(Value::None, BinOp::Eq, Value::Int(0), "false")?;
    assert_op(Value::Int(0), BinOp::NotEq, Value::None, "true")?;
    assert_op(Value::None, BinOp::GtEq, Value::Int(1), "false")
}

#[test]
fn test_comparisons() -> Result<(), OpError> {
    assert_op(Value::Int(1), BinOp::Eq, Value::Float(1.0), "true")?;
    assert_op(Value::str("abc"), BinOp::Lt, Value::str("abd"), "true")?;
    assert_op(ints(&[1, 2]), BinOp::Eq, ints(&[1, 2]), "true")?;
    assert_op(ints(&[1, 2]), BinOp::Eq, ints(&[1, 2, 3]), "false")?;
    assert_op(Value::Float(f64::NAN), BinOp::Lt, Value::Int(1), "false")?;
    assert_op(Value::str("1"), BinOp::Eq, Value::Int(1), "false")?;

    let err = op_err(Value::str("a"), BinOp::Lt, Value::Int(1));
    assert_eq!(err.message, "Illegal operation '<' between '<str>' and '<int>'");
    Ok(())
}

#[test]
fn test_sequence_operators() -> Result<(), OpError> {
    assert_op(Value::str("ab"), BinOp::Add, Value::str("cd"), "\"abcd\"")?;
    assert_op(Value::str("ab"), BinOp::Mul, Value::Int(3), "\"ababab\"")?;
    assert_op(ints(&[1, 2]), BinOp::Add, Value::Int(3), "[1, 2, 3]")?;
    assert_op(ints(&[1, 2]), BinOp::Mul, ints(&[3]), "[1, 2, 3]")?;
    assert_op(ints(&[1, 2]), BinOp::Mul, Value::Int(2), "[1, 2, 1, 2]")?;
    assert_op(ints(&[1, 2, 3]), BinOp::Sub, Value::Int(-1), "[1, 2]")?;

    let err = op_err(ints(&[1]), BinOp::Sub, Value::Int(4));
    assert_eq!(err.kind, RuntimeErrorKind::Runtime);

    let err = op_err(Value::str("a"), BinOp::Sub, Value::str("a"));
    assert_eq!(err.kind, RuntimeErrorKind::Type);
    Ok(())
}

#[test]
fn test_list_repeat_leaves_the_operand_alone() -> Result<(), OpError> {
    let base = ints(&[1, 2]);
    assert_op(base.clone(), BinOp::Mul, Value::Int(3), "[1, 2, 1, 2, 1, 2]")?;
    assert_op(base.clone(), BinOp::Mul, Value::Int(-2), "[]")?;
    assert_eq!(base.repr(), "[1, 2]");

    assert_op(Value::list(vec![]), BinOp::Mul, Value::Int(i64::MAX), "[]")?;
    assert_op(Value::str(""), BinOp::Mul, Value::Int(i64::MAX), "\"\"")
}

#[test]
fn test_oversized_repeats_are_rejected() {
    let huge = Value::Int(4611686018427387904);

    let err = op_err(Value::str("ab"), BinOp::Mul, huge.clone());
    assert_eq!(err.kind, RuntimeErrorKind::Runtime);
    assert!(err.message.contains("too large"), "unexpected message: {}", err.message);

    let err = op_err(ints(&[1]), BinOp::Mul, huge);
    assert_eq!(err.kind, RuntimeErrorKind::Runtime);
}

#[test]
fn test_trivial_bases_take_any_exponent() -> Result<(), OpError> {
    let exponent = Value::Int(5_000_000_000);

    assert_op(Value::Int(1), BinOp::Pow, exponent.clone(), "1")?;
    assert_op(Value::Int(0), BinOp::Pow, exponent.clone(), "0")?;
    assert_op(Value::Int(-1), BinOp::Pow, exponent.clone(), "1")?;
    assert_op(Value::Int(-1), BinOp::Pow, Value::Int(5_000_000_001), "-1")?;
    assert_op(Value::Int(0), BinOp::Pow, Value::Int(0), "1")?;

    let err = op_err(Value::Int(2), BinOp::Pow, exponent);
    assert_eq!(err.message, "Integer overflow");
    Ok(())
}

#[test]
fn test_map_merge_keeps_right_values() -> Result<(), OpError> {
    let left = Value::map(BTreeMap::from([("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))]));
    let right = Value::map(BTreeMap::from([("b".to_string(), Value::Int(3))]));

    assert_op(left, BinOp::Add, right, "{\"a\": 1, \"b\": 3}")
}

#[test]
fn test_indexing() -> Result<(), OpError> {
    assert_op(ints(&[10, 20, 30]), BinOp::Index, Value::Int(-1), "30")?;
    assert_op(Value::str("héllo"), BinOp::Index, Value::Int(1), "\"é\"")?;

    let err = op_err(ints(&[1]), BinOp::Index, Value::Int(5));
    assert_eq!(err.message, "Index 5 is out of bounds for list of length 1");

    let map = Value::map(BTreeMap::from([("a".to_string(), Value::Int(1))]));
    let err = op_err(map, BinOp::Index, Value::str("z"));
    assert_eq!(err.message, "Key \"z\" not found in hashmap of size 1");
    Ok(())
}

#[test]
fn test_normalize_index() {
    assert_eq!(normalize_index(0, 3), Some(0));
    assert_eq!(normalize_index(-3, 3), Some(0));
    assert_eq!(normalize_index(3, 3), None);
    assert_eq!(normalize_index(-4, 3), None);
    assert_eq!(normalize_index(0, 0), None);
}

#[test]
fn test_decimal_parsing_and_display() {
    let show = |text: &str| parse_decimal(text).map(|value| format_decimal(&value));

    assert_eq!(show("1.25").as_deref(), Some("1.25"));
    assert_eq!(show("-0.5").as_deref(), Some("-0.5"));
    assert_eq!(show("3e-2").as_deref(), Some("0.03"));
    assert_eq!(show("2/4").as_deref(), Some("0.5"));
    assert_eq!(show("1/3").as_deref(), Some("1/3"));
    assert_eq!(show("1/0"), None);
    assert_eq!(show("abc"), None);
}

#[test]
fn test_plain_list_is_copied_on_write() -> Result<(), OpError> {
    let original = ints(&[1, 2]);
    let mut copy = original.clone();
    copy.set_index(&Value::Int(0), Value::Int(9))?;

    assert_eq!(original.repr(), "[1, 2]");
    assert_eq!(copy.repr(), "[9, 2]");
    Ok(())
}

#[test]
fn test_reusable_list_is_shared() -> Result<(), OpError> {
    let original = Value::List(Shared::reusable(vec![Value::Int(1), Value::Int(2)]));
    let mut alias = original.clone();
    alias.set_index(&Value::Int(0), Value::Int(9))?;

    assert_eq!(original.repr(), "[9, 2]");
    Ok(())
}

#[test]
fn test_reusable_list_survives_a_panicked_writer() {
    let mut shared = Shared::reusable(vec![Value::Int(1)]);
    if let Shared::Reusable(lock) = &shared {
        let lock = lock.clone();
        let crashed = std::thread::spawn(move || {
            let _guard = lock.write();
            panic!("writer crashed while holding the lock");
        }).join();
        assert!(crashed.is_err());
    }

    shared.update(|items| items.push(Value::Int(2)));
    assert_eq!(shared.read(Vec::len), 2);
}

#[test]
fn test_truthiness() {
    assert!(!Value::Int(0).is_truthy());
    assert!(!Value::str("").is_truthy());
    assert!(!ints(&[]).is_truthy());
    assert!(Value::Float(0.1).is_truthy());
    assert!(!Value::None.is_truthy());
}

#[test]
fn test_symbol_table_lookup_walks_parents() {
    let root = SymbolTable::new(None);
    let child = SymbolTable::new(Some(root.clone()));
    root.set("x", Value::Int(1));
    child.set("y", Value::Int(2));

    assert_eq!(child.get("x").map(|v| v.repr()), Some("1".to_string()));
    assert!(root.get("y").is_none(), "parent must not see child bindings");
    assert!(!child.contains_local("x"));
    assert_eq!(child.find_outer("x"), Some(1));
    assert!(std::sync::Arc::ptr_eq(&child.root(), &root));
}

#[test]
fn test_nested_assignment_stays_local() {
    let program = program_context();
    program.assign("x", Value::Int(1));

    let call = Context::nested("f", &program, Some(program.clone()), SrcSpan::default());
    call.assign("x", Value::Int(2));

    assert_eq!(call.lookup("x").map(|v| v.repr()), Some("2".to_string()));
    assert_eq!(program.lookup("x").map(|v| v.repr()), Some("1".to_string()));
}

#[test]
fn test_using_escapes() -> Result<(), String> {
    let program = program_context();
    program.assign("counter", Value::Int(0));

    let outer = Context::nested("outer", &program, Some(program.clone()), SrcSpan::default());
    outer.assign("x", Value::Int(1));
    let inner = Context::nested("inner", &outer, Some(outer.clone()), SrcSpan::default());

    assert_eq!(inner.declare_escape("x", true)?, Binding::Outer(1));
    inner.assign("x", Value::Int(5));
    assert_eq!(outer.lookup("x").map(|v| v.repr()), Some("5".to_string()));

    assert_eq!(inner.declare_escape("counter", false)?, Binding::Global);
    inner.assign("counter", Value::Int(3));
    assert_eq!(program.lookup("counter").map(|v| v.repr()), Some("3".to_string()));
    Ok(())
}

#[test]
fn test_using_errors() {
    let program = program_context();
    let call = Context::nested("f", &program, Some(program.clone()), SrcSpan::default());

    assert_eq!(
        program.declare_escape("x", false),
        Err("'using' cannot be used at the global level".to_string())
    );
    assert_eq!(
        call.declare_escape("missing", true),
        Err("No binding for nonlocal variable 'missing' found".to_string())
    );
    assert_eq!(
        call.declare_escape("missing", false),
        Err("'missing' is not defined in the global scope".to_string())
    );
}
