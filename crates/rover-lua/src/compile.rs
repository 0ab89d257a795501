//! Up-front compile stage.
//!
//! Every provided source file, plus the maze-level global module, is
//! parse-validated before any script executes: a syntax error in *any* file
//! aborts the run as a [`SimError::Compile`] failure. The stage also scans
//! sources for third-party `require` specifiers so packages can be fetched
//! once, before the entry script runs.
//!
//! Blocking calls need no source rewriting: every blocking primitive the
//! scripts can reach is an async host function, so the interpreter itself
//! yields at exactly those calls.

use crate::modules::{is_builtin, normalize_file_name};
use indexmap::IndexMap;
use mlua::Lua;
use rover_core::SimError;

/// Conventional entry file name.
pub const ENTRY_FILE: &str = "main.lua";

/// Name used for the maze-level global module in diagnostics.
pub const GLOBAL_MODULE_NAME: &str = "<global module>";

/// Parse-validates every source without executing anything.
///
/// # Errors
///
/// [`SimError::Compile`] naming the first offending file.
pub fn precompile(
    lua: &Lua,
    files: &IndexMap<String, String>,
    global_module: Option<&str>,
) -> Result<(), SimError> {
    if let Some(source) = global_module {
        check_one(lua, GLOBAL_MODULE_NAME, source)?;
    }
    for (name, source) in files {
        check_one(lua, name, source)?;
    }
    tracing::debug!(files = files.len(), "precompiled all sources");
    Ok(())
}

fn check_one(lua: &Lua, name: &str, source: &str) -> Result<(), SimError> {
    lua.load(source)
        .set_name(format!("@{name}"))
        .into_function()
        .map(drop)
        .map_err(|e| SimError::Compile(format!("{name}: {e}")))
}

/// Extracts the ordered, de-duplicated set of third-party `require`
/// specifiers: everything that is not a builtin module and not a file in the
/// provided map.
///
/// This is a textual scan, so a specifier mentioned inside a comment or a
/// dead branch is still fetched; an unused package costs one download and
/// nothing else.
#[must_use]
pub fn scan_package_requires(files: &IndexMap<String, String>) -> Vec<String> {
    let mut packages = Vec::new();
    for source in files.values() {
        for spec in require_specifiers(source) {
            if is_builtin(&spec) || is_local(&spec, files) {
                continue;
            }
            if !packages.contains(&spec) {
                packages.push(spec);
            }
        }
    }
    packages
}

fn is_local(spec: &str, files: &IndexMap<String, String>) -> bool {
    spec.starts_with("./")
        || spec.starts_with("../")
        || spec.ends_with(".lua")
        || files.contains_key(&normalize_file_name(spec))
}

/// All string-literal arguments to `require` in one source text.
fn require_specifiers(source: &str) -> Vec<String> {
    let mut specs = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;
    while let Some(at) = source[i..].find("require") {
        let start = i + at;
        i = start + "require".len();
        // Reject identifiers that merely contain "require".
        if start > 0 && is_ident_byte(bytes[start - 1]) {
            continue;
        }
        let mut rest = source[i..].trim_start();
        if let Some(stripped) = rest.strip_prefix('(') {
            rest = stripped.trim_start();
        }
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let body = &rest[1..];
        if let Some(end) = body.find(quote) {
            let spec = &body[..end];
            if !spec.is_empty() {
                specs.push(spec.to_string());
            }
        }
    }
    specs
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(n, s)| ((*n).to_string(), (*s).to_string()))
            .collect()
    }

    #[test]
    fn accepts_valid_sources() {
        let lua = Lua::new();
        let fs = files(&[
            ("main.lua", "local x = 1\nreturn x"),
            ("util.lua", "return { double = function(n) return n * 2 end }"),
        ]);
        precompile(&lua, &fs, Some("print = nil")).expect("all sources valid");
    }

    #[test]
    fn syntax_error_is_a_compile_failure_naming_the_file() {
        let lua = Lua::new();
        let fs = files(&[("main.lua", "return 1"), ("bad.lua", "local = =")]);
        let err = precompile(&lua, &fs, None).unwrap_err();
        match err {
            SimError::Compile(msg) => assert!(msg.contains("bad.lua"), "got: {msg}"),
            other => panic!("expected Compile, got {other:?}"),
        }
    }

    #[test]
    fn global_module_is_also_checked() {
        let lua = Lua::new();
        let fs = files(&[("main.lua", "return 1")]);
        let err = precompile(&lua, &fs, Some("if then end")).unwrap_err();
        assert!(matches!(err, SimError::Compile(_)));
    }

    #[test]
    fn nothing_executes_during_precompile() {
        let lua = Lua::new();
        lua.globals().set("touched", false).unwrap();
        let fs = files(&[("main.lua", "touched = true")]);
        precompile(&lua, &fs, None).unwrap();
        assert!(!lua.globals().get::<bool>("touched").unwrap());
    }

    // --- Package scanning ---

    #[test]
    fn scan_skips_builtins_and_local_files() {
        let fs = files(&[
            (
                "main.lua",
                r#"
                local rover = require("rover")
                local util = require("./util")
                local inspect = require("inspect")
                local rl = require('readline')
                local again = require("inspect")
                "#,
            ),
            ("util.lua", r#"local json = require("dkjson")"#),
        ]);
        assert_eq!(scan_package_requires(&fs), vec!["inspect", "dkjson"]);
    }

    #[test]
    fn scan_resolves_bare_names_against_the_file_map() {
        let fs = files(&[
            ("main.lua", r#"require("util") require("helper.lua")"#),
            ("util.lua", "return 1"),
            ("helper.lua", "return 2"),
        ]);
        assert!(scan_package_requires(&fs).is_empty());
    }

    #[test]
    fn scan_ignores_identifiers_containing_require() {
        let fs = files(&[("main.lua", r#"local my_require = nil; prerequire("x")"#)]);
        assert!(scan_package_requires(&fs).is_empty());
    }
}
