use ebzip::cli;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli::build_ebrefile_cli().get_matches();
    let (book_directory, output_directory, subbooks) = cli::run_from_ebrefile_matches(&matches);

    match ebzip::run_refile(&book_directory, &output_directory, &subbooks) {
        Ok(()) => {}
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
