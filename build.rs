use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let proto_dir = PathBuf::from("proto");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/");

    // The client stub drives real checks; the server stub backs the
    // in-process fake service used by the transport tests.
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(out_dir.join("envoy_ratelimit_descriptor.bin"))
        .compile_protos(
            &[proto_dir.join("envoy/service/ratelimit/v3/rls.proto")],
            &[&proto_dir],
        )?;

    Ok(())
}
