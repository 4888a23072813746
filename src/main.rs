fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = mangafeed::cli::Args::parse();
    mangafeed::cli::init_tracing(args.quiet, args.verbose);
    if let Err(e) = mangafeed::cli::run(&args) {
        tracing::error!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                tracing::error!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
