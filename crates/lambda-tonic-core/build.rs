/// Builds the gRPC client and server code for the `lambda.proto` definition
/// using `tonic-prost-build`.
///
/// # Byte Field Optimization
///
/// The `data` field of the `Image` message is marked with `.bytes(...)` so it
/// is decoded as `bytes::Bytes` instead of `Vec<u8>`. Image payloads are
/// buffered for the whole lifetime of a stream and handed to the backend
/// untouched, so sharing the decode buffer avoids a copy per image.
///
/// # Files and Paths
///
/// - Proto file: `proto/lambda.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/lambda_descriptor.bin` (served by reflection)
///
/// # Panics
///
/// Panics if code generation fails.
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("lambda_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".lambda.Image.data"])
        .file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/lambda.proto");

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/lambda.proto"], &["proto"])
        .unwrap();
}
