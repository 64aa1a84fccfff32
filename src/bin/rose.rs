fn main() {
    std::process::exit(rose::cli::run());
}
