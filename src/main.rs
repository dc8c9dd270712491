fn main() {
    if let Err(err) = folio::cli::main() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
