/// Builds the gRPC client and server code for the `pairwise.proto` definition
/// using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`, along with a file descriptor set consumed by the
/// server-reflection service.
///
/// # Panics
///
/// This function will `panic!` if code generation fails. For CI use or better
/// diagnostics, wrap with a proper error handler or logging.
///
/// # Output
///
/// Generated code is accessible in Rust via:
///
/// ```rust
/// pub mod pairwise {
///     tonic::include_proto!("pairwise");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("pairwise_descriptor.bin");

    tonic_prost_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&["proto/pairwise.proto"], &["proto"])
        .unwrap();
}
