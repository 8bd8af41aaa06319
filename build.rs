//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into the gRPC server and client types
//! included by `src/generated.rs`. A vendored `protoc` is used so the build
//! does not depend on a system installation.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/provider.proto");

    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    std::env::set_var("PROTOC", protoc_path);

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    Ok(())
}
