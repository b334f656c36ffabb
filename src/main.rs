fn main() {
    if let Err(err) = results_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
