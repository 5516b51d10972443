//! Build script for the native test fixture
//!
//! Compiles `native/example.c` into a shared library with the host C compiler
//! so the proxy tests have real exported symbols to bind against. The library
//! path is exported to the crate as `NATIVE_PROXY_FIXTURE`. When no compiler is
//! available the variable is left unset and fixture-backed tests skip.

use std::env;
use std::path::{Path, PathBuf};

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let target = env::var("TARGET").unwrap_or_default();

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=native/example.c");

    let source = Path::new("native").join("example.c");
    let library = out_dir.join(fixture_filename(&target));

    match compile_shared(&source, &library) {
        Ok(()) => {
            println!("cargo:rustc-env=NATIVE_PROXY_FIXTURE={}", library.display());
        }
        Err(reason) => {
            println!(
                "cargo:warning=native fixture not built ({}); fixture tests will be skipped",
                reason
            );
        }
    }
}

/// Compile a single C file into a shared library using the compiler `cc` selects
fn compile_shared(source: &Path, output: &Path) -> Result<(), String> {
    let compiler = cc::Build::new()
        .opt_level(2)
        .try_get_compiler()
        .map_err(|e| e.to_string())?;

    let mut cmd = compiler.to_command();
    if compiler.is_like_msvc() {
        cmd.arg("/LD").arg(source).arg(format!("/Fe{}", output.display()));
    } else {
        cmd.args(["-shared", "-fPIC", "-o"]).arg(output).arg(source);
    }

    let status = cmd.status().map_err(|e| e.to_string())?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("compiler exited with {}", status))
    }
}

/// Platform-specific file name for the fixture library
fn fixture_filename(target: &str) -> &'static str {
    if target.contains("windows") {
        "example.dll"
    } else if target.contains("apple") {
        "libexample.dylib"
    } else {
        "libexample.so"
    }
}
