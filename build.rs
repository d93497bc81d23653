//! Build script for Causalog.
//!
//! Currently a no-op placeholder. The delta and recovery wire frames are
//! implemented directly in Rust (see src/wire/) rather than generated from
//! schema definitions.
//!
//! This approach was chosen because:
//! - The byte layout is fixed by the replica protocol and must stay stable
//! - It avoids schema file dependencies and build-time codegen complexity
//! - Hand-rolled frames keep the zero-copy payload handling explicit
//!
//! If schema-based codegen is needed in the future, it can be configured
//! here.

fn main() {
    // Rerun if build.rs changes
    println!("cargo:rerun-if-changed=build.rs");
}
