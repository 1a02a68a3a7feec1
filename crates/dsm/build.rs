use rustc_version::{version_meta, Channel};

// Labels feature-gated items on docs.rs. Builds on stable never see the cfg.
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(CHANNEL_NIGHTLY)");
    let nightly = version_meta()
        .map(|meta| meta.channel == Channel::Nightly)
        .unwrap_or(false);
    if nightly {
        println!("cargo:rustc-cfg=CHANNEL_NIGHTLY");
    }
}
