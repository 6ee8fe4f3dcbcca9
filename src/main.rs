//! crewforge CLI binary.
//!
//! Minimal entrypoint: all logic is in the library; main only maps the
//! CLI result to a process exit code.

fn main() {
    if let Err(code) = crewforge::cli::run() {
        std::process::exit(code.as_i32());
    }
}
