//! Identifier rules shared by every target language.
//!
//! A name is accepted only if it is a plain ASCII identifier and is not a reserved word in
//! any of the languages code is emitted for (Go, C++, TypeScript/JavaScript).

/// Separator between namespace parts in type and protocol names.
pub const SEPARATOR: char = '/';

const RESERVED_GO: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

const RESERVED_CPP: &[&str] = &[
    "alignas", "alignof", "and_eq", "and", "asm", "atomic_cancel", "atomic_commit",
    "atomic_noexcept", "auto", "bitand", "bitor", "bool", "break", "case", "catch", "char",
    "class", "co_await", "co_return", "co_yield", "compl", "concept", "const_cast", "const",
    "consteval", "constexpr", "constinit", "continue", "decltype", "default", "delete", "do",
    "double", "dynamic_cast", "else", "enum", "explicit", "export", "extern", "false", "float",
    "for", "friend", "goto", "if", "import", "inline", "int", "long", "module", "mutable",
    "namespace", "new", "noexcept", "not_eq", "not", "nullptr", "operator", "or_eq", "or",
    "private", "protected", "public", "reflexpr", "register", "reinterpret_cast", "requires",
    "return", "short", "signed", "sizeof", "static_assert", "static_cast", "static", "struct",
    "switch", "synchronized", "template", "this", "thread_local", "throw", "true", "try",
    "typedef", "typeid", "typename", "union", "unsigned", "using", "virtual", "void",
    "volatile", "wchar_t", "while", "xor_eq", "xor", "char16_t", "char32_t", "char8_t",
    "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
];

// Strict-mode reserved words only; contextual keywords (`of`, `get`, `type`...) are fine in TS.
const RESERVED_TS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// True if `name` is a reserved word in any target language.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_GO.contains(&name) || RESERVED_CPP.contains(&name) || RESERVED_TS.contains(&name)
}

/// Checks if `name` is a valid name for a field, enum value, bit, message or namespace part.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    !is_reserved(name)
}

/// First invalid part of a `/`-separated path, if any.
pub fn invalid_path_part(path: &str) -> Option<&str> {
    path.split(SEPARATOR).find(|p| !is_valid_name(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["f0", "_x", "simple_struct", "Point3D", "f1_vec"] {
            assert!(is_valid_name(ok), "{} should be valid", ok);
        }
    }

    #[test]
    fn rejects_malformed_and_reserved() {
        for bad in ["", "0abc", "a-b", "a b", "naïve", "struct", "int32_t", "map", "function", "nullptr"] {
            assert!(!is_valid_name(bad), "{:?} should be invalid", bad);
        }
    }

    #[test]
    fn path_parts_checked_individually() {
        assert_eq!(invalid_path_part("messgen/test/simple_struct"), None);
        assert_eq!(invalid_path_part("messgen/class/x"), Some("class"));
        assert_eq!(invalid_path_part("a//b"), Some(""));
    }
}
