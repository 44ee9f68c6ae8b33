use clap::Parser;

mod args;
mod audit;

fn main() {
    let args = match args::Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(e) = audit::run_audit(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
