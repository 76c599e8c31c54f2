//! Swift SDK generator - cross-compilation bundles for Swift on Ubuntu.
//!
//! This binary downloads the Swift runtime, the LLVM linker and the Ubuntu
//! system libraries for a target platform and assembles a Swift SDK
//! artifact bundle from them.

use std::process;
use swift_sdk_generator::cli::{self, Args};

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    // Initialize logging: info by default, debug with --verbose, RUST_LOG wins
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    // Run CLI and get exit code
    let exit_code = match cli::run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    process::exit(exit_code);
}
