//! Demangling: try the Itanium ABI demangler first (native C/C++
//! targets, matching `original_source/src/dbg/demangle.cpp`), then fall
//! back to the Rust mangling scheme, then to the raw name.

use crate::error::Result;

/// Demangles `name`, falling back to the unmodified string when neither
/// demangler recognizes the mangling scheme. Never an error: an
/// unmangled or unrecognized name is a legitimate input (e.g. a C symbol).
pub fn demangle(name: &str) -> Result<String> {
    if let Ok(sym) = cpp_demangle::Symbol::new(name) {
        return Ok(sym.to_string());
    }
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return Ok(demangled.to_string());
    }
    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmangled_c_name_passes_through() {
        assert_eq!(demangle("matmul").unwrap(), "matmul");
    }

    #[test]
    fn itanium_mangled_name_demangles() {
        // _Z7computeiid -> compute(int, int, double)
        let demangled = demangle("_Z7computeiid").unwrap();
        assert!(demangled.starts_with("compute("));
    }
}
