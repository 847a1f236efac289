use nova_breakpoints::{
    BreakpointError, BreakpointFactory, BreakpointKind, ClassPattern, DebuggingContext,
    ResolveError,
};

fn resolve_error(spec: &str) -> ResolveError {
    match BreakpointFactory::default().create_breakpoint(spec, None) {
        Err(BreakpointError::Resolve(err)) => err,
        other => panic!("expected resolve error for {spec:?}, got {other:?}"),
    }
}

#[test]
fn simple_class_and_line() {
    let bp = BreakpointFactory::default()
        .create_breakpoint("String:123", None)
        .unwrap();
    let BreakpointKind::Line(line) = bp.kind() else {
        panic!("expected line breakpoint, got {:?}", bp.kind());
    };
    assert_eq!(line.class_pattern(), &ClassPattern::Exact("String".into()));
    assert_eq!(line.line(), 123);
    assert_eq!(line.package(), None);
}

#[test]
fn bare_line_without_location_is_ambiguous() {
    assert!(matches!(
        resolve_error("123"),
        ResolveError::AmbiguousClassSpec(spec) if spec == "123"
    ));

    let ctx = DebuggingContext::at_class("com.x.Y");
    let bp = BreakpointFactory::default()
        .create_breakpoint("123", Some(&ctx))
        .unwrap();
    assert_eq!(bp.description(), "com.x.Y:123");
}

#[test]
fn method_with_parameter_types() {
    let bp = BreakpointFactory::default()
        .create_breakpoint("String:valueOf(int)", None)
        .unwrap();
    let BreakpointKind::Method(method) = bp.kind() else {
        panic!("expected method breakpoint, got {:?}", bp.kind());
    };
    assert_eq!(method.class_pattern().to_string(), "String");
    assert_eq!(method.method_name(), "valueOf");
    assert_eq!(method.parameters(), &["int".to_string()]);
}

#[test]
fn empty_argument_list_is_not_an_overload_selector() {
    let bp = BreakpointFactory::default()
        .create_breakpoint("a.B:run()", None)
        .unwrap();
    let BreakpointKind::Method(method) = bp.kind() else {
        panic!("expected method breakpoint");
    };
    assert!(method.parameters().is_empty());
}

#[test]
fn malformed_class_is_reported_before_member() {
    assert!(matches!(
        resolve_error("123.pkg.Malformed?$1:method"),
        ResolveError::MalformedClassName(_)
    ));
}

#[test]
fn member_starting_with_digit_is_malformed() {
    assert!(matches!(
        resolve_error("java.lang.String:123abc"),
        ResolveError::MalformedMemberName(name) if name == "123abc"
    ));
}

#[test]
fn oversized_line_is_invalid() {
    assert!(matches!(
        resolve_error("a.B:99999999999"),
        ResolveError::InvalidLineNumber(_)
    ));
}
