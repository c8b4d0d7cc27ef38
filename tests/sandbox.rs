use pylet::config::SandboxConfig;
use pylet::sandbox::{
    Capabilities, CapturedOutput, ExecutionResult, OutputStream, Sandbox, EMPTY_SENTINEL,
};

fn captured_sandbox(config: SandboxConfig) -> (Sandbox, CapturedOutput) {
    let host = CapturedOutput::new();
    let sandbox = Sandbox::with_output(config, OutputStream::new(host.clone()));
    (sandbox, host)
}

fn run(source: &str) -> ExecutionResult {
    let (mut sandbox, _host) = captured_sandbox(SandboxConfig::default());
    sandbox.execute(source)
}

fn output(source: &str) -> String {
    match run(source) {
        ExecutionResult::Success(text) => text,
        other => panic!("expected output, got {:?}", other),
    }
}

fn error(source: &str) -> String {
    let result = run(source);
    assert!(result.is_failure(), "expected failure, got {:?}", result);
    result.text()
}

// ============================================================================
// Boundary behavior
// ============================================================================

#[test]
fn test_print_returns_captured_text() {
    let result = run("print('hi')");
    assert_eq!(result.kind(), "output");
    assert_eq!(result.text(), "hi\n");
}

#[test]
fn test_silent_code_returns_sentinel() {
    let result = run("x = 1");
    assert_eq!(result, ExecutionResult::SuccessEmpty);
    assert_eq!(result.kind(), "empty");
    assert_eq!(result.text(), "Code executed successfully (no output)");
}

#[test]
fn test_undefined_name_fails() {
    assert_eq!(
        error("print(undefined_name)"),
        "Error: name 'undefined_name' is not defined"
    );
}

#[test]
fn test_division_by_zero_fails() {
    assert_eq!(error("1/0"), "Error: division by zero");
}

#[test]
fn test_import_is_blocked() {
    assert_eq!(error("import os"), "Error: __import__ not found");
    assert_eq!(error("from os import path"), "Error: __import__ not found");
}

#[test]
fn test_ambient_facilities_are_unreachable() {
    for name in ["open", "exec", "eval", "__import__", "globals", "getattr", "type"] {
        let text = error(&format!("{}('x')", name));
        assert_eq!(text, format!("Error: name '{}' is not defined", name));
    }
    assert_eq!(error("class A:\n    pass"), "Error: __build_class__ not found");
    assert!(error("def f():\n    pass\nf.__globals__").contains("has no attribute '__globals__'"));
    assert!(error("''.__class__").contains("has no attribute '__class__'"));
}

#[test]
fn test_output_is_byte_exact() {
    assert_eq!(output("print('a', 'b', sep='-', end='')"), "a-b");
    assert_eq!(output("print('  spaced  ')\nprint()"), "  spaced  \n\n");
    assert_eq!(output("print('héllo ✓')"), "héllo ✓\n");
}

#[test]
fn test_output_before_fault_is_discarded() {
    let text = error("print('partial')\nundefined_name");
    assert_eq!(text, "Error: name 'undefined_name' is not defined");
}

#[test]
fn test_sentinel_never_empty_string() {
    for source in ["", "pass", "x = [1, 2]\ny = x[0]", "def f():\n    return 1\nf()"] {
        let result = run(source);
        assert_eq!(result.text(), EMPTY_SENTINEL, "source: {:?}", source);
    }
}

#[test]
fn test_stream_restored_between_executions() {
    let (mut sandbox, host) = captured_sandbox(SandboxConfig::default());

    let first = sandbox.execute("print('first')\n1/0");
    assert!(first.is_failure());

    let second = sandbox.execute("print('second')");
    assert_eq!(second, ExecutionResult::Success("second\n".to_string()));

    sandbox.output().write_str("host").unwrap();
    assert_eq!(host.contents(), "host");
}

#[test]
fn test_repeated_execution_is_idempotent() {
    let (mut sandbox, _host) = captured_sandbox(SandboxConfig::default());
    let source = "total = 0\nfor i in range(5):\n    total += i\nprint(total)";
    let first = sandbox.execute(source);
    let second = sandbox.execute(source);
    assert_eq!(first, second);
    assert_eq!(first.text(), "10\n");
}

#[test]
fn test_state_does_not_leak_between_executions() {
    let (mut sandbox, _host) = captured_sandbox(SandboxConfig::default());
    assert_eq!(sandbox.execute("leaked = 1"), ExecutionResult::SuccessEmpty);
    assert_eq!(
        sandbox.execute("print(leaked)").text(),
        "Error: name 'leaked' is not defined"
    );
}

#[test]
fn test_syntax_error_reports_line() {
    let text = error("x = 1\ny = (\n");
    assert!(text.starts_with("Error: "), "{}", text);
    assert!(text.contains("line"), "{}", text);

    let fault = run("def f(:\n    pass").fault().cloned().unwrap();
    assert_eq!(fault.exception, "SyntaxError");
    assert!(fault.message.ends_with("(<string>, line 1)"), "{}", fault.message);
}

#[test]
fn test_narrowed_capabilities() {
    let host = CapturedOutput::new();
    let capabilities = Capabilities::from_builtins([pylet::lang::Builtin::Print]);
    let mut sandbox = Sandbox::with_output(SandboxConfig::default(), OutputStream::new(host))
        .with_capabilities(capabilities);

    assert_eq!(sandbox.execute("print(1)").text(), "1\n");
    assert_eq!(
        sandbox.execute("print(len([1]))").text(),
        "Error: name 'len' is not defined"
    );
}

// ============================================================================
// Execution budget
// ============================================================================

#[test]
fn test_recursion_limit() {
    let (mut sandbox, _host) =
        captured_sandbox(SandboxConfig::default().with_max_recursion_depth(50));
    let result = sandbox.execute("def f(n):\n    return f(n + 1)\nf(0)");
    let fault = result.fault().unwrap();
    assert_eq!(fault.exception, "RecursionError");
    assert_eq!(result.text(), "Error: maximum recursion depth exceeded");
}

#[test]
fn test_recursion_within_limit_succeeds() {
    let (mut sandbox, _host) =
        captured_sandbox(SandboxConfig::default().with_max_recursion_depth(100));
    let source = "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\nprint(fact(20))";
    assert_eq!(sandbox.execute(source).text(), "2432902008176640000\n");
}

#[test]
fn test_timeout_stops_infinite_loop() {
    let (mut sandbox, _host) = captured_sandbox(SandboxConfig::default().with_timeout(1));
    let result = sandbox.execute("while True:\n    pass");
    assert_eq!(result.fault().unwrap().exception, "TimeoutError");
    assert_eq!(result.text(), "Error: execution exceeded 1 seconds");
}

#[test]
fn test_timeout_cannot_be_swallowed() {
    let (mut sandbox, _host) = captured_sandbox(SandboxConfig::default().with_timeout(1));
    let source = "try:\n    while True:\n        pass\nexcept:\n    print('caught')";
    let result = sandbox.execute(source);
    assert_eq!(result.fault().unwrap().exception, "TimeoutError");
}

// ============================================================================
// Dialect
// ============================================================================

#[test]
fn test_functions_and_closures() {
    let source = "\
def counter():
    count = 0
    def bump(step=1):
        nonlocal count
        count += step
        return count
    return bump

c = counter()
c()
c(step=5)
print(c())
";
    assert_eq!(output(source), "7\n");
}

#[test]
fn test_unbound_local() {
    let source = "x = 1\ndef f():\n    print(x)\n    x = 2\nf()";
    assert_eq!(
        error(source),
        "Error: cannot access local variable 'x' where it is not associated with a value"
    );
}

#[test]
fn test_try_except_finally() {
    let source = "\
try:
    [][0]
except:
    print('handled')
else:
    print('no')
finally:
    print('done')
";
    assert_eq!(output(source), "handled\ndone\n");
}

#[test]
fn test_named_except_clause_cannot_match() {
    assert_eq!(
        error("try:\n    1/0\nexcept ZeroDivisionError:\n    pass"),
        "Error: name 'ZeroDivisionError' is not defined"
    );
}

#[test]
fn test_raise_is_a_type_error() {
    assert_eq!(
        error("raise 'boom'"),
        "Error: exceptions must derive from BaseException"
    );
}

#[test]
fn test_comprehensions_and_builtins() {
    let source = "\
words = ['pear', 'fig', 'apple']
lengths = {w: len(w) for w in words}
print(sorted(words, key=len))
print(max(words, key=len), min(lengths.values()))
print([n * n for n in range(6) if n % 2 == 0])
print(sum(x for x in range(4)), abs(-3), round(2.5), round(3.14159, 2))
print(list(zip('ab', [1, 2])), list(enumerate('xy', 1)))
";
    assert_eq!(
        output(source),
        "['fig', 'pear', 'apple']\n\
         apple 3\n\
         [0, 4, 16]\n\
         6 3 2 3.14\n\
         [('a', 1), ('b', 2)] [(1, 'x'), (2, 'y')]\n"
    );
}

#[test]
fn test_string_formatting() {
    let source = "\
name = 'pi'
value = 3.14159
print(f'{name}={value:.2f}')
print('{} has {:>4} items'.format('cart', 3))
print('%s is %d%%' % ('load', 42))
print(str(1.0), int('  12 '), float('2.5'), f'{\"q\"!r}')
";
    assert_eq!(
        output(source),
        "pi=3.14\ncart has    3 items\nload is 42%\n1.0 12 2.5 'q'\n"
    );
}

#[test]
fn test_collections_and_methods() {
    let source = "\
items = [3, 1, 2]
items.append(5)
items.sort(reverse=True)
print(items, items[1:3], items[::-1])
d = dict(a=1)
d['b'] = 2
d.update({'c': 3})
print(d, d.get('z', 0), 'b' in d)
print(', '.join(s.upper() for s in 'a b c'.split()))
t = (1, 2, 2)
print(t.count(2), t[-1])
";
    assert_eq!(
        output(source),
        "[5, 3, 2, 1] [3, 2] [1, 2, 3, 5]\n\
         {'a': 1, 'b': 2, 'c': 3} 0 True\n\
         A, B, C\n\
         2 2\n"
    );
}

#[test]
fn test_runtime_faults_are_python_shaped() {
    assert_eq!(error("[1][5]"), "Error: list index out of range");
    assert_eq!(error("{}['k']"), "Error: 'k'");
    assert_eq!(
        error("'a' + 1"),
        "Error: can only concatenate str (not \"int\") to str"
    );
    assert_eq!(
        error("int('x')"),
        "Error: invalid literal for int() with base 10: 'x'"
    );
    assert_eq!(error("10 % 0"), "Error: integer modulo by zero");
}

// ============================================================================
// Deep structures and large integers
// ============================================================================

#[test]
fn test_repr_of_deeply_nested_list_faults() {
    let source = "x = []\nfor i in range(200000):\n    x = [x]\nprint(str(x))";
    let result = run(source);
    assert_eq!(result.fault().unwrap().exception, "RecursionError");
    assert_eq!(
        result.text(),
        "Error: maximum recursion depth exceeded while getting the repr of an object"
    );
}

#[test]
fn test_deep_list_is_released_without_crashing() {
    let source = "x = []\nfor i in range(1000000):\n    x = [x]\nprint('built')";
    assert_eq!(output(source), "built\n");
}

#[test]
fn test_long_operator_chain_is_rejected() {
    let source = format!("x = 1{}\nprint(x)", " + 1".repeat(200_000));
    let result = run(&source);
    assert_eq!(result.fault().unwrap().exception, "RecursionError");
    assert_eq!(
        result.text(),
        "Error: maximum recursion depth exceeded during compilation"
    );

    let sandbox = Sandbox::new(SandboxConfig::default());
    let fault = sandbox.check(&source).unwrap_err();
    assert_eq!(fault.exception, "RecursionError");
}

#[test]
fn test_range_spanning_machine_integers() {
    let fault = run("len(range(-2**63, 2**63-1))").fault().cloned().unwrap();
    assert_eq!(fault.exception, "OverflowError");
    assert_eq!(
        output("print(list(range(-2**63, 2**63-1, 2**63-1)))"),
        "[-9223372036854775808, -1, 9223372036854775806]\n"
    );
}

#[test]
fn test_integers_are_arbitrary_precision() {
    assert_eq!(output("print(2**63-1)"), "9223372036854775807\n");
    assert_eq!(output("print(2**64)"), "18446744073709551616\n");
    let source = "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\nprint(fact(25))";
    assert_eq!(output(source), "15511210043330985984000000\n");
}

#[test]
fn test_list_repetition_shares_elements() {
    assert_eq!(output("print([[1]] * 3)"), "[[1], [1], [1]]\n");
    assert_eq!(
        output("a = [[1]] * 3\na[0].append(2)\nprint(a)"),
        "[[1, 2], [1, 2], [1, 2]]\n"
    );
}

#[test]
fn test_str_search_honours_start_and_end() {
    assert_eq!(
        output("s = 'abcabc'\nprint(s.find('c', 3), s.find('c', 3, 4), s.rfind('a', 0, 3), s.count('b', 2))"),
        "5 -1 0 1\n"
    );
}

#[test]
fn test_nonlocal_without_binding_is_a_syntax_error() {
    let fault = run("def f():\n    nonlocal q\n    q = 1\nf()").fault().cloned().unwrap();
    assert_eq!(fault.exception, "SyntaxError");
    assert_eq!(fault.message, "no binding for nonlocal 'q' found (<string>, line 2)");
}

#[test]
fn test_mixed_indentation_is_a_tab_error() {
    let fault = run("if True:\n        x = 1\n\ty = 2\n").fault().cloned().unwrap();
    assert_eq!(fault.exception, "TabError");
    assert!(fault.message.starts_with("inconsistent use of tabs and spaces in indentation"));
}
