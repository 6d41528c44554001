use rustc_version::{version_meta, Channel};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let meta = match version_meta() {
        Ok(meta) => meta,
        Err(err) => {
            println!("cargo:warning=unable to query rustc version: {}", err);
            return;
        }
    };
    assert!(meta.semver.major >= 1);

    match meta.channel {
        Channel::Nightly => println!("cargo:rustc-cfg=rustc_nightly"),
        Channel::Beta => println!("cargo:rustc-cfg=rustc_beta"),
        _ => {}
    }
}
