//! Type expression fuzz target: feed arbitrary text to the type name parser.
//! Parsing must not panic, and an accepted name must re-parse to itself in canonical form.
//! Build with: cargo fuzz run type_expr_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(expr) = messgen::parser::parse_type_expr(s) {
        let canonical = expr.canonical_name();
        let again = messgen::parser::parse_type_expr(&canonical).expect("canonical name parses");
        assert_eq!(again.canonical_name(), canonical);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run type_expr_fuzz");
}
