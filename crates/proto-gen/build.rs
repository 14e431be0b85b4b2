// Build script generating the policy replication gRPC client and server.
//
// Messages are hand-written prost structs in src/lib.rs, so only the service
// glue is generated and no protoc binary is needed at build time.
// proto/policy_replication.proto documents the same contract for non-Rust
// peers.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(input)
        .output_type(output)
        .codec_path(CODEC)
        .build()
}

fn main() {
    let replication = Service::builder()
        .name("PolicyReplication")
        .package("gatekeeper.policy")
        .method(unary(
            "load_policy",
            "LoadPolicy",
            "crate::policy::Empty",
            "crate::policy::Policies",
        ))
        .method(unary(
            "save_policy",
            "SavePolicy",
            "crate::policy::Policies",
            "crate::policy::Empty",
        ))
        .method(unary(
            "add_policy",
            "AddPolicy",
            "crate::policy::PolicyRequest",
            "crate::policy::Empty",
        ))
        .method(unary(
            "remove_policy",
            "RemovePolicy",
            "crate::policy::PolicyRequest",
            "crate::policy::Empty",
        ))
        .method(unary(
            "remove_filtered_policy",
            "RemoveFilteredPolicy",
            "crate::policy::FilteredPolicyRequest",
            "crate::policy::Empty",
        ))
        .build();

    Builder::new().compile(&[replication]);

    println!("cargo:rerun-if-changed=build.rs");
}
