fn main() {
    if let Err(error) = backstop_cli::run() {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}
