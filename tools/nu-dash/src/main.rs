fn main() {
    match nu_dash::run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("nu-dash: {error}");
            std::process::exit(1);
        }
    }
}
