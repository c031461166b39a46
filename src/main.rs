fn main() {
    if let Err(err) = ytclip::run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
