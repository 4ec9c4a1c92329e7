//! Generate `include/fetch.h` from the `extern "C"` surface.
//!
//! Header generation is best-effort: a cbindgen failure is reported as a
//! cargo warning and never fails the library build.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };

    let bindings = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("FETCH_H")
        .generate();

    match bindings {
        Ok(bindings) => {
            bindings.write_to_file(crate_dir.join("include").join("fetch.h"));
        }
        Err(e) => println!("cargo:warning=could not generate fetch.h: {e}"),
    }
}
