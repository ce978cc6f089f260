//! echobench CLI entry point.

fn main() {
    if let Err(e) = echobench_cli::run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}
