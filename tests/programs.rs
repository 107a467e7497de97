//! Whole-program tests: each case runs a source text through the full
//! scan/parse/resolve/interpret pipeline against a capture sink and checks
//! the printed lines.

use treelox::interpreter::Interpreter;
use treelox::output::CaptureSink;
use treelox::Session;

fn run(source: &str) -> (Vec<String>, Session) {
    let session = Session::new();
    let mut interpreter = Interpreter::new(&session.interner);
    let mut out = CaptureSink::new();
    session.run(&mut interpreter, source, &mut out, false);
    let lines = out.lines().iter().map(|l| l.to_string()).collect();
    (lines, session)
}

fn expect_output(source: &str, expected: &[&str]) {
    let (lines, session) = run(source);
    assert!(!session.had_error(), "unexpected static error");
    assert!(!session.had_runtime_error(), "unexpected runtime error");
    assert_eq!(lines, expected);
}

fn expect_runtime_error(source: &str, message: &str) {
    let (_, session) = run(source);
    assert!(!session.had_error(), "unexpected static error");
    assert!(session.had_runtime_error(), "expected a runtime error");
    let reported = session.last_runtime_error().unwrap();
    assert!(
        reported.contains(message),
        "expected {:?} in {:?}",
        message,
        reported
    );
}

fn expect_static_error(source: &str) {
    let (lines, session) = run(source);
    assert!(session.had_error(), "expected a static error");
    assert_eq!(lines, Vec::<String>::new(), "execution must be skipped");
}

#[test]
fn closures_share_their_captured_counter() {
    expect_output(
        "fun makeCounter() {
           var i = 0;
           fun count() { i = i + 1; print i; }
           return count;
         }
         var c = makeCounter();
         c();
         c();",
        &["1", "2"],
    );
}

#[test]
fn two_closures_from_one_call_share_one_variable() {
    expect_output(
        "fun pair() {
           var n = 0;
           fun bump() { n = n + 1; }
           fun read() { print n; }
           bump();
           read();
           bump();
           read();
         }
         pair();",
        &["1", "2"],
    );
}

#[test]
fn scope_is_lexical_not_dynamic() {
    expect_output(
        "var a = \"global\";
         {
           fun showA() { print a; }
           showA();
           var a = \"block\";
           showA();
         }",
        &["global", "global"],
    );
}

#[test]
fn class_fields_and_methods() {
    expect_output(
        "class Cake {
           taste() {
             var adjective = \"delicious\";
             print \"The \" + this.flavor + \" cake is \" + adjective + \"!\";
           }
         }
         var cake = Cake();
         cake.flavor = \"German chocolate\";
         cake.taste();",
        &["The German chocolate cake is delicious!"],
    );
}

#[test]
fn super_calls_skip_to_the_superclass_method() {
    expect_output(
        "class A { method() { print \"A\"; } }
         class B < A {
           method() { print \"B\"; }
           test() { super.method(); }
         }
         class C < B {}
         C().test();",
        &["A"],
    );
}

#[test]
fn inherited_methods_fall_through_the_chain() {
    expect_output(
        "class Doughnut { cook() { print \"Fry until golden brown.\"; } }
         class BostonCream < Doughnut {}
         BostonCream().cook();",
        &["Fry until golden brown."],
    );
}

#[test]
fn initializers_always_yield_the_instance() {
    expect_output(
        "class Foo { init() { return; } }
         var f = Foo();
         print f;",
        &["Foo instance"],
    );
    // Calling init directly on an instance also yields the instance.
    expect_output(
        "class Foo { init() {} }
         var f = Foo();
         print f.init();",
        &["Foo instance"],
    );
}

#[test]
fn constructor_arguments_reach_init() {
    expect_output(
        "class Point {
           init(x, y) { this.x = x; this.y = y; }
           sum() { return this.x + this.y; }
         }
         print Point(3, 4).sum();",
        &["7"],
    );
    expect_runtime_error(
        "class Point { init(x, y) {} } Point(1);",
        "Expected 2 arguments but got 1.",
    );
}

#[test]
fn subclasses_inherit_the_initializer_arity() {
    expect_output(
        "class Base { init(x) { this.x = x; } }
         class Derived < Base {}
         print Derived(5).x;",
        &["5"],
    );
}

#[test]
fn fields_shadow_methods() {
    expect_output(
        "class C { speak() { print \"method\"; } }
         var c = C();
         c.speak = fun () { print \"field\"; };
         c.speak();",
        &["field"],
    );
}

#[test]
fn bound_methods_remember_their_instance() {
    expect_output(
        "class Person {
           init(name) { this.name = name; }
           greet() { print \"Hi, \" + this.name; }
         }
         var greet = Person(\"Ada\").greet;
         greet();",
        &["Hi, Ada"],
    );
}

#[test]
fn methods_may_reference_the_class_itself() {
    expect_output(
        "class Singleton {
           clone() { return Singleton(); }
         }
         print Singleton().clone();",
        &["Singleton instance"],
    );
}

#[test]
fn arithmetic_type_error_carries_the_line() {
    let (_, session) = run("print 1 + true;");
    assert!(session.had_runtime_error());
    let reported = session.last_runtime_error().unwrap();
    assert!(reported
        .contains("Operands must be two numbers or either operands must be a string."));
    assert!(reported.contains("[line 1]"));
}

#[test]
fn runtime_errors_stop_execution() {
    expect_runtime_error(
        "print \"before\";
         print missing;
         print \"after\";",
        "Undefined variable 'missing'.",
    );
    let (lines, _) = run("print \"before\"; print missing; print \"after\";");
    assert_eq!(lines, vec!["before"]);
}

#[test]
fn superclass_must_be_a_class() {
    expect_runtime_error(
        "var NotAClass = \"so such class\";
         class Oops < NotAClass {}",
        "Superclass must be a class.",
    );
}

#[test]
fn property_access_requires_instances() {
    expect_runtime_error("print true.field;", "Only instances have properties.");
    expect_runtime_error("true.field = 1;", "Only instances have fields.");
    expect_runtime_error(
        "class C {} print C().nope;",
        "Undefined property 'nope'.",
    );
}

#[test]
fn static_errors_skip_execution() {
    expect_static_error("print \"reachable\"; return 1;");
    expect_static_error("var a = 1; print a");
    expect_static_error("print \"x\"; print ;");
}

#[test]
fn loops_and_recursion() {
    expect_output(
        "fun fact(n) { if (n <= 1) return 1; return n * fact(n - 1); }
         print fact(6);",
        &["720"],
    );
    expect_output(
        "var total = 0;
         for (var i = 0; i < 5; i = i + 1) total = total + i;
         print total;",
        &["10"],
    );
}

#[test]
fn an_omitted_for_condition_loops_until_return() {
    expect_output(
        "fun firstPowerAbove(limit) {
           var p = 1;
           for (;;) {
             p = p * 2;
             if (p > limit) return p;
           }
         }
         print firstPowerAbove(100);",
        &["128"],
    );
}

#[test]
fn lambdas_flow_as_values() {
    expect_output(
        "fun compose(f, g) {
           return fun (x) { return f(g(x)); };
         }
         var addOneThenDouble = compose(fun (n) { return n * 2; }, fun (n) { return n + 1; });
         print addOneThenDouble(4);",
        &["10"],
    );
}

#[test]
fn interactive_session_persists_state_across_lines() {
    let session = Session::new();
    let mut interpreter = Interpreter::new(&session.interner);
    let mut out = CaptureSink::new();

    session.run(&mut interpreter, "var a = 1;", &mut out, true);
    session.reset_error();
    session.run(&mut interpreter, "a + 1", &mut out, true);
    session.reset_error();
    session.run(&mut interpreter, "fun f() { return a * 10; }", &mut out, true);
    session.reset_error();
    session.run(&mut interpreter, "f()", &mut out, true);

    assert!(!session.had_error());
    assert!(!session.had_runtime_error());
    assert_eq!(out.lines(), vec!["2", "10"]);
}

#[test]
fn interactive_errors_do_not_poison_later_lines() {
    let session = Session::new();
    let mut interpreter = Interpreter::new(&session.interner);
    let mut out = CaptureSink::new();

    session.run(&mut interpreter, "print ;", &mut out, true);
    assert!(session.had_error());
    session.reset_error();

    session.run(&mut interpreter, "print \"still here\";", &mut out, true);
    assert!(!session.had_error());
    assert_eq!(out.lines(), vec!["still here"]);
}

#[test]
fn file_mode_does_not_echo_expression_results() {
    let session = Session::new();
    let mut interpreter = Interpreter::new(&session.interner);
    let mut out = CaptureSink::new();
    session.run(&mut interpreter, "1 + 2", &mut out, false);
    assert!(!session.had_error());
    assert_eq!(out.lines(), Vec::<&str>::new());
}
