//! End-to-end pipeline tests: source text in, `.water` listing out,
//! listing executed by snow-vm. Each test grounds one of the worked
//! examples a Snow implementation is expected to handle correctly.

use snowc::config::CompilerConfig;
use snowc::{compile, DiagnosticKind};

fn run(source: &str) -> i32 {
    let result = compile(source, &CompilerConfig::new());
    let listing = result
        .listing
        .unwrap_or_else(|| panic!("expected a clean compile, got {:?}", result.diagnostics.into_vec()));
    snow_vm::run_listing(&listing, &[]).expect("listing should run to completion")
}

#[test]
fn arithmetic_entry_point_returns_the_sum() {
    let source = "module: M  function: main returns: int  body: return 1+2  end body end function end module";
    assert_eq!(run(source), 3);
}

#[test]
fn factorial_computed_via_a_counted_loop() {
    let source = r#"
module: Math
  function: fact params: declare n:int returns: int
    body: declare r:int=1
      loop: init: declare i:int=1 cond: i<=n step: i=i+1
        body: r=r*i end body
      end loop
      return r
    end body
  end function
  function: main returns: int
    body: return fact(6)
    end body
  end function
end module
"#;
    assert_eq!(run(source), 720);
}

#[test]
fn overridden_method_is_dispatched_on_the_runtime_type() {
    let source = r#"
struct: Animal
  function: speak returns: int body: return 1 end body end function
end struct
struct: Dog extends Animal
  function: speak returns: int body: return 2 end body end function
end struct
function: main returns: int
  body: declare a: Animal = new Dog()
    return a.speak()
  end body
end function
"#;
    assert_eq!(run(source), 2);
}

#[test]
fn constructor_overload_resolves_by_argument_count() {
    let source = "struct: Point fields: x:int, y:int \
        init: params: declare x:int, declare y:int body: this.x=x this.y=y end body end init \
        init: params: declare v:int body: this.x=v this.y=v end body end init \
        function: getX returns: int body: return this.x end body end function \
        function: getY returns: int body: return this.y end body end function \
        end struct\n\
        function: main returns: int body: declare p: Point = new Point(1, 2)\n\
        declare q: Point = new Point(3)\n\
        return p.getX()*1000+p.getY()*100+q.getX()*10+q.getY() end body end function";
    let result = compile(source, &CompilerConfig::new());
    let listing = result
        .listing
        .unwrap_or_else(|| panic!("expected a clean compile, got {:?}", result.diagnostics.into_vec()));
    // Point(1, 2) sets fields to 1, 2; Point(3) sets both fields to 3.
    assert_eq!(snow_vm::run_listing(&listing, &[]).expect("listing should run"), 1233);
}

#[test]
fn declared_ancestor_type_widens_to_the_constructed_subclass() {
    let source = r#"
struct: Animal
  function: speak returns: int body: return 1 end body end function
end struct
struct: Dog extends Animal
  fields: volume:int
  init: params: declare v:int body: this.volume=v end body end init
  function: bark returns: int body: return this.volume end body end function
end struct
function: main returns: int
  body: declare a: Animal = new Dog(7)
    return a.bark()
  end body
end function
"#;
    assert_eq!(run(source), 7);
}

#[test]
fn super_call_chains_to_the_parent_constructor() {
    let source = r#"
struct: Animal
  fields: legs:int
  init: params: declare l:int body: this.legs=l end body end init
end struct
struct: Dog extends Animal
  fields: volume:int
  init: params: declare l:int, declare v:int
    body: super(l) this.volume=v end body
  end init
  function: legCount returns: int body: return this.legs end body end function
  function: bark returns: int body: return this.volume end body end function
end struct
function: main returns: int
  body: declare d: Dog = new Dog(4, 9)
    return d.legCount()*100+d.bark()
  end body
end function
"#;
    assert_eq!(run(source), 409);
}

#[test]
fn constructor_call_with_unmatched_arity_is_a_diagnostic() {
    let source = "struct: Point fields: x:int, y:int \
        init: params: declare x:int, declare y:int body: return end body end init \
        end struct\n\
        function: main returns: int body: declare p: Point = new Point(1, 2, 3)\n\
        return 0 end body end function";
    let result = compile(source, &CompilerConfig::new());
    assert!(result.listing.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::CtorNotFound));
}

#[test]
fn break_outside_a_loop_is_a_diagnostic_naming_the_token() {
    let source = "function: f returns: void body: break end body end function";
    let result = compile(source, &CompilerConfig::new());
    assert!(result.listing.is_none());
    let diag = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("'break'"))
        .unwrap_or_else(|| panic!("expected a 'break' diagnostic, got {:?}", result.diagnostics.into_vec()));
    assert_eq!(diag.kind, DiagnosticKind::ParseErrorUnsupportedFeature);
    assert_eq!(diag.line, 1);
}

#[test]
fn division_by_zero_compiles_clean_but_fails_at_runtime() {
    let source = "function: main returns: int body: return 1/0 end body end function";
    let result = compile(source, &CompilerConfig::new());
    let listing = result.listing.expect("division by zero is not a compile-time error");
    let err = snow_vm::run_listing(&listing, &[]).unwrap_err();
    assert_eq!(err, snow_vm::VmError::DivideByZero);
}
