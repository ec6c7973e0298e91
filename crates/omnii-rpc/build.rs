//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Protocol compilation for the Omnii RPC surface."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
fn main() {
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("failed to locate protoc");
    std::env::set_var("PROTOC", protoc);

    println!("cargo:rerun-if-changed=proto/omnii.proto");
    println!("cargo:rerun-if-changed=proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/omnii.proto"], &["proto"])
        .expect("failed to compile gRPC definitions");
}
