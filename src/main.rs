fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = chapterdl::cli::Args::parse();
    let verbosity = chapterdl::logging::Verbosity::from_flags(args.quiet, args.verbose);
    if let Err(e) = chapterdl::logging::init(verbosity) {
        eprintln!("warning: {e:#}");
    }
    if let Err(e) = chapterdl::cli::run(&args) {
        if matches!(e, chapterdl::cli::CliRunError::NotFound { .. }) {
            println!("{}", chapterdl::cli::NOT_FOUND_SENTINEL);
        } else {
            eprintln!("{}", e);
        }
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
