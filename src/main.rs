fn main() {
    if let Err(err) = hai::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
