use ebzip::cli;
use ebzip::run::Action;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli::build_ebzip_cli().get_matches();
    let (book_directory, action, run) = match cli::run_from_ebzip_matches(&matches) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("{e}");
            eprintln!("try --help");
            std::process::exit(1);
        }
    };

    if run.quiet {
        log::set_max_level(log::LevelFilter::Warn);
    }

    let result = match action {
        Action::Zip => ebzip::run_zip(&book_directory, &run),
        Action::Unzip => ebzip::run_unzip(&book_directory, &run),
        Action::Info => ebzip::run_info(&book_directory, &run),
    };

    match result {
        Ok(()) => {
            if !run.quiet {
                log::info!("completed");
            }
        }
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
