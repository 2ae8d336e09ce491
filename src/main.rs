fn main() {
    if let Err(rendered) = pie::cli::run_cli() {
        pie::cli::eprint_error(&rendered);
        std::process::exit(1);
    }
}
