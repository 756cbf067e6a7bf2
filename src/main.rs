fn main() {
    if let Err(e) = proofgate::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
