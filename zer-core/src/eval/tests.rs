use crate::{
    eval::prelude::{RuntimeError, RuntimeErrorKind},
    utils::prelude::{traceback, Error},
    Config, Runtime,
};

fn runtime(max_depth: usize) -> Runtime {
    Runtime::new(Config {
        max_depth,
        stack_size: 64 * 1024 * 1024,
        ..Config::default()
    })
}

fn eval(input: &str) -> Result<String, Error> {
    Ok(runtime(200).run("<test>", input)?.repr())
}

fn assert_eval(input: &str, expected: &str) -> Result<(), Error> {
    assert_eq!(eval(input)?, expected, "result of {input:?}");
    Ok(())
}

fn runtime_err(input: &str) -> RuntimeError {
    match runtime(200).run("<test>", input) {
        Err(Error::Runtime { error }) => error,
        Err(other) => panic!("expected a runtime error from {input:?}, got {other:?}"),
        Ok(value) => panic!("expected {input:?} to fail, got {value:?}"),
    }
}

#[test]
fn test_program_result() -> Result<(), Error> {
    assert_eval("let x = 5\nlet y = x + 3\nreturn y", "8")?;
    assert_eval("let x = 2\nx * 21", "42")?;
    assert_eval("x = 1\nx += 2\nx", "3")
}

#[test]
fn test_division_by_zero() {
    let err = runtime_err("1/0");
    assert_eq!(err.kind, RuntimeErrorKind::Math);
    assert_eq!(err.message, "Division by zero");

    let err = runtime_err("1 % 0");
    assert_eq!(err.kind, RuntimeErrorKind::Math);
}

#[test]
fn test_default_arguments() -> Result<(), Error> {
    assert_eval(
        "defun add(a, let b = 10) -> a + b\nreturn [add(5), add(5, 1), add(1, b = 2)]",
        "[15, 6, 3]"
    )
}

#[test]
fn test_defaults_see_the_defining_scope_per_call() -> Result<(), Error> {
    assert_eval(
        "base = 1\ndefun f(let n = base) -> n\nlet first = f()\nbase = 7\nreturn [first, f()]",
        "[1, 7]"
    )
}

#[test]
fn test_argument_binding_errors() {
    let err = runtime_err("defun f(a) -> a\nf(1, 2)");
    assert_eq!(err.message, "'f' got too many positional arguments (expected at most 1, got 2)");

    let err = runtime_err("defun f(a) -> a\nf()");
    assert_eq!(err.message, "'f' missing required argument 'a'");

    let err = runtime_err("defun f(a) -> a\nf(1, z = 2)");
    assert_eq!(err.message, "'f' got an unexpected keyword argument 'z'");
}

#[test]
fn test_rest_and_keyword_collectors() -> Result<(), Error> {
    assert_eval(
        "defun f(a, *rest, **opts) -> [a, rest, opts]\nreturn f(1, 2, 3, k = 4)",
        "[1, [2, 3], {\"k\": 4}]"
    )?;
    assert_eval(
        "defun f(a, b) -> a - b\nlet args = [10]\nlet named = {\"b\": 3}\nreturn f(*args, **named)",
        "7"
    )
}

#[test]
fn test_plain_lists_are_copied() -> Result<(), Error> {
    assert_eval("let a = [1, 2]\nlet b = a\nb $ 0 = 9\nreturn [a $ 0, b $ 0]", "[1, 9]")
}

#[test]
fn test_reusable_lists_are_shared() -> Result<(), Error> {
    assert_eval(
        "let a = set_reusable([1, 2])\nlet b = a\nb $ 0 = 9\nreturn a $ 0",
        "9"
    )?;
    assert_eval(
        "let a = set_reusable([1])\ndefun push(xs) -> append(xs, 2)\npush(a)\nreturn a",
        "[1, 2]"
    )
}

#[test]
fn test_nested_index_assignment() -> Result<(), Error> {
    assert_eval(
        "let grid = [[0, 0], [0, 0]]\ngrid $ 1 $ 0 = 5\nreturn grid",
        "[[0, 0], [5, 0]]"
    )?;
    assert_eval("let m = {}\nm $ \"k\" = 1\nreturn m", "{\"k\": 1}")
}

#[test]
fn test_using_parent() -> Result<(), Error> {
    let program = "
        defun outer()
            let x = 1
            defun inner()
                using parent x
                x = 5
            done
            inner()
            return x
        done
        return outer()
    ";
    assert_eval(program, "5")?;

    let without = "
        defun outer()
            let x = 1
            defun inner()
                x = 5
            done
            inner()
            return x
        done
        return outer()
    ";
    assert_eval(without, "1")
}

#[test]
fn test_using_global() -> Result<(), Error> {
    assert_eval(
        "count = 0\ndefun bump()\nusing count\ncount += 1\ndone\nbump()\nbump()\nreturn count",
        "2"
    )
}

#[test]
fn test_namespace_runs_once_on_first_access() -> Result<(), Error> {
    let program = "
        count = 0
        namespace ns
            using count
            count += 1
            a = 1
            b = 2
        done
        let before = count
        let total = ns.a + ns.b
        return [before, count, total]
    ";
    assert_eval(program, "[0, 1, 3]")
}

#[test]
fn test_missing_namespace_member() {
    let err = runtime_err("namespace ns\na = 1\ndone\nns.b");
    assert_eq!(err.message, "'b' is not a member of namespace 'ns'");
}

#[test]
fn test_loops() -> Result<(), Error> {
    assert_eval("for i = 0 to 5 step 2 do i", "[0, 2, 4]")?;
    assert_eval("for i = 3 to 0 step -1 do i", "[3, 2, 1]")?;
    assert_eval("for k, v in {\"a\": 1, \"b\": 2} do k + to_str(v)", "[\"a1\", \"b2\"]")?;
    assert_eval("for c in \"ab\" do c", "[\"a\", \"b\"]")?;
    assert_eval(
        "let total = 0\nfor x in [1, 2, 3, 4] do\nif x == 2 do continue\nif x == 4 do break\ntotal += x\ndone\nreturn total",
        "4"
    )?;
    assert_eval("let i = 0\nwhile i < 3 do\ni += 1\ndone", "none")
}

#[test]
fn test_zero_step() {
    let err = runtime_err("for i = 0 to 3 step 0 do i");
    assert_eq!(err.message, "Step value for a 'for' loop cannot be zero");
}

#[test]
fn test_if_values() -> Result<(), Error> {
    assert_eval("if 1 > 2 do \"a\" elif 2 > 1 do \"b\" else \"c\"", "\"b\"")?;
    assert_eval("if false do 1", "none")
}

#[test]
fn test_unpacking() -> Result<(), Error> {
    assert_eval("let a, b = [1, 2]\nreturn b", "2")?;

    let err = runtime_err("let a, b, c = [1, 2]");
    assert_eq!(err.message, "Not enough values to unpack (expected 3, got 2)");

    let err = runtime_err("let a, b = 5");
    assert_eq!(err.kind, RuntimeErrorKind::Type);
    Ok(())
}

#[test]
fn test_alias_and_delete() -> Result<(), Error> {
    assert_eval("let a = 3\nlet a as b\nreturn b", "3")?;

    let err = runtime_err("let a = 1\ndel a\na");
    assert_eq!(err.message, "'a' is not defined");
    Ok(())
}

#[test]
fn test_decorators_apply_closest_first() -> Result<(), Error> {
    let program = "
        defun twice(f) -> defun (x) -> f(f(x))
        defun inc(f) -> defun (x) -> f(x) + 1
        @twice
        @inc
        defun double(x) -> x * 2
        return double(1)
    ";
    // inc wraps first: g(x) = 2x + 1, then twice: g(g(1)) = 7
    assert_eval(program, "7")
}

#[test]
fn test_undefined_name() {
    let err = runtime_err("return missing");
    assert_eq!(err.kind, RuntimeErrorKind::Runtime);
    assert_eq!(err.message, "'missing' is not defined");
}

#[test]
fn test_stray_break() {
    let err = runtime_err("break");
    assert_eq!(err.message, "'break' outside of a loop");
}

#[test]
fn test_recursion_limit() {
    let err = runtime(50)
        .run("<test>", "defun f(n) -> f(n + 1)\nf(0)")
        .expect_err("unbounded recursion must fail");

    let Error::Runtime { error } = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(error.message, "Maximum recursion depth exceeded (50)");
}

#[test]
fn test_traceback_lists_every_call() {
    let err = runtime_err("defun inner() -> 1 / 0\ndefun outer() -> inner()\nouter()");
    let names = err.frames.iter().map(|frame| frame.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["<program>", "outer", "inner"]);

    let rendered = traceback(&err);
    assert!(rendered.starts_with("Traceback (most recent call last):"), "got {rendered}");
    assert!(rendered.contains("line 3, in <program>"), "got {rendered}");
    assert!(rendered.contains("line 1, in inner"), "got {rendered}");
}

#[test]
fn test_catch_and_is_panic() -> Result<(), Error> {
    assert_eval(
        "defun boom() -> 1 / 0\nreturn catch(boom)",
        "[none, \"MathError: Division by zero\"]"
    )?;
    assert_eval(
        "defun boom() -> 1 / 0\nreturn is_panic(boom)",
        "[none, \"Division by zero\", \"M\"]"
    )?;
    assert_eval("defun fine(a) -> a\nreturn catch(fine, [4])", "[4, none]")
}

#[test]
fn test_finally_runs_cleanup_and_rethrows() {
    let program = "
        cleaned = false
        defun cleanup()
            using cleaned
            cleaned = true
        done
        defun boom() -> 1 / 0
        let outcome = catch(finally, [boom, cleanup])
        return [outcome $ 0, cleaned]
    ";
    assert_eq!(eval(program).ok().as_deref(), Some("[none, true]"));
}

#[test]
fn test_gather_keeps_input_order() -> Result<(), Error> {
    let program = "
        async defun job(i, delay)
            await async_sleep(delay)
            return i
        done
        return gather([job(0, 0.15), job(1, 0.01), job(2, 0.08)])
    ";
    assert_eval(program, "[0, 1, 2]")
}

#[test]
fn test_await_and_timeout() -> Result<(), Error> {
    assert_eval("async defun f() -> 41 + 1\nreturn await f()", "42")?;

    let err = runtime_err("async defun slow()\nawait async_sleep(2)\ndone\ntimeout(slow(), 0.05)");
    assert_eq!(err.message, "Coroutine timed out after 0.05 seconds");

    let err = runtime_err("await 5");
    assert_eq!(err.message, "Cannot await '<int>'");
    Ok(())
}

#[test]
fn test_gather_runs_bodies_one_at_a_time() -> Result<(), Error> {
    let program = "
        counter = 0
        async defun bump()
            using counter
            for i = 0 to 2000 do counter += 1
            return counter
        done
        let seen = gather([bump(), bump(), bump(), bump()])
        return [seen, counter]
    ";
    assert_eval(program, "[[2000, 4000, 6000, 8000], 8000]")
}

#[test]
fn test_gather_overlaps_native_waits() -> Result<(), Error> {
    let program = "
        let started = time_now()
        gather([async_sleep(0.3), async_sleep(0.3), async_sleep(0.3)])
        return time_now() - started < 0.8
    ";
    assert_eval(program, "true")
}

#[test]
fn test_timeout_stops_the_coroutine() -> Result<(), Error> {
    let program = "
        ticks = 0
        async defun spin()
            using ticks
            while true do
                ticks += 1
            done
        done
        let outcome = catch(timeout, [spin(), 0.05])
        let seen = ticks
        sleep(0.1)
        return [outcome $ 0, seen > 0, ticks == seen]
    ";
    assert_eval(program, "[none, true, true]")
}

#[test]
fn test_sleep_honours_timeout() {
    let err = runtime_err("async defun nap()\nsleep(5)\ndone\ntimeout(nap(), 0.05)");
    assert_eq!(err.message, "Coroutine timed out after 0.05 seconds");
}

#[test]
fn test_is_main() -> Result<(), Error> {
    assert_eval("is_main", "true")
}

#[test]
fn test_load_local_module() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("helper.zer"), "defun double(x) -> x * 2\nloaded_main = is_main\n")?;
    let main = dir.path().join("main.zer");
    std::fs::write(&main, "load \"local.helper\"\nreturn [double(21), loaded_main]\n")?;

    let value = runtime(200).run_file(&main)?;
    assert_eq!(value.repr(), "[42, false]");
    Ok(())
}

#[test]
fn test_load_from_lib_root() -> Result<(), Box<dyn std::error::Error>> {
    let root = tempfile::tempdir()?;
    std::fs::create_dir_all(root.path().join("libs").join("text"))?;
    std::fs::write(root.path().join("libs").join("text").join("greet.zer"), "defun hi(n) -> \"hi \" + n\n")?;

    let runtime = Runtime::new(Config {
        lib_root: root.path().to_path_buf(),
        stack_size: 64 * 1024 * 1024,
        ..Config::default()
    });
    let value = runtime.run("<test>", "load \"libs.text.greet\"\nreturn hi(\"zer\")")?;
    assert_eq!(value.repr(), "\"hi zer\"");
    Ok(())
}

#[test]
fn test_missing_module() {
    let err = runtime_err("load \"local.nowhere\"");
    assert_eq!(err.kind, RuntimeErrorKind::Io);
    assert!(err.message.starts_with("Module 'local.nowhere' not found"), "got {}", err.message);
}

#[test]
fn test_blank_program_is_rejected() {
    assert!(matches!(runtime(200).run("<test>", "# nothing\n\n;;"), Err(Error::Empty { .. })));
}

#[test]
fn test_syntax_errors_are_not_runtime_errors() {
    assert!(matches!(runtime(200).run("<test>", "let = 1"), Err(Error::Parse { .. })));
    assert!(matches!(runtime(200).run("<test>", "let x = 1 ?"), Err(Error::Lex { .. })));
}

#[test]
fn test_globals_survive_between_runs() -> Result<(), Error> {
    let runtime = runtime(200);
    runtime.run("<first>", "shared = 10")?;
    assert_eq!(runtime.run("<second>", "shared + 1")?.repr(), "11");
    Ok(())
}
