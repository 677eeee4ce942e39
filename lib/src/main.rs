fn main() {
    if let Err(error) = toolheat::run_from_env() {
        eprintln!("error: {error}");
        std::process::exit(error.exit_code());
    }
}
