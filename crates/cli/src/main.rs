fn main() {
    if let Err(err) = outsync_cli::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
