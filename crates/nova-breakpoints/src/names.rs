//! Java name validation helpers.

const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Dotted binary class name, e.g. `java.util.Map$Entry`.
pub(crate) fn is_class_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

/// Class name with at most one leading or trailing `*`.
pub(crate) fn is_class_pattern(pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(rest) = pattern.strip_prefix('*') {
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        return is_class_name(rest);
    }
    if let Some(rest) = pattern.strip_suffix('*') {
        let rest = rest.strip_suffix('.').unwrap_or(rest);
        return is_class_name(rest);
    }
    is_class_name(pattern)
}

pub(crate) fn is_method_name(name: &str) -> bool {
    name == "<init>" || name == "<clinit>" || is_identifier(name)
}

/// Source-level type name as used in method signatures (`int`, `String[]`,
/// `java.util.List`).
pub(crate) fn is_type_name(name: &str) -> bool {
    let mut base = name.trim();
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped.trim_end();
    }
    if let Some(stripped) = base.strip_suffix("...") {
        base = stripped;
    }
    PRIMITIVES.contains(&base) || is_class_name(base)
}

/// `com.x.Y$Z` → `Some("com.x")`.
pub(crate) fn package_of(class_name: &str) -> Option<&str> {
    class_name.rsplit_once('.').map(|(pkg, _)| pkg)
}

/// Whether a declared argument type (as reported by the VM) satisfies a
/// user-typed parameter type. `String` matches `java.lang.String`.
pub(crate) fn type_matches(declared: &str, typed: &str) -> bool {
    let typed = typed.trim().replace("...", "[]");
    if declared == typed {
        return true;
    }
    declared
        .rsplit_once('.')
        .is_some_and(|(_, simple)| simple == typed)
}
