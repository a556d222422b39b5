//! # CLI surface
//!
//! `clap` builder-style `Command` definitions, one per binary, following
//! the teacher's `cli.rs` layout: `arg!()` macros, explicit `value_parser`s
//! for the level/overwrite/skip-content options, and a short `long_help`
//! with usage examples. Each binary's `main()` parses with the matching
//! `build_*_cli()`, converts the `ArgMatches` into a [`crate::run::Run`]
//! with `run_from_*_matches`, and dispatches into the library's top-level
//! `run_*` functions.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{arg, crate_version, Arg, ArgAction, ArgMatches, Command};
use regex::Regex;

use crate::error::{EbzipError, EbzipResult};
use crate::run::{Action, Overwrite, Run, SkipFlags};

const EBZIP_LONG_HELP: &str = "Compresses, decompresses, or inspects the physical files of an EB or \
EPWING book directory, in the sliced-deflate EBZIP1 container.

Examples:
---------
Compress in place:          `ebzip /cdrom/book`
Compress at a higher level:  `ebzip -l 5 -o /tmp/out /cdrom/book`
Decompress one subbook:      `ebzip -u -S dict1 /cdrom/book`
Inspect without modifying:   `ebzip -i /cdrom/book`";

const EBREFILE_LONG_HELP: &str = "Rewrites a book's CATALOG/CATALOGS file, keeping only the named \
subbooks. The original catalog is preserved once as `<name>.old` alongside the new one.";

fn level_parser(s: &str) -> Result<u8, String> {
    s.parse::<u8>()
        .ok()
        .filter(|n| *n <= 5)
        .ok_or_else(|| format!("level must be an integer in 0..=5, got `{s}`"))
}

pub fn build_ebzip_cli() -> Command {
    Command::new("ebzip")
        .about("Compress, decompress, or inspect an EB/EPWING book's physical files")
        .after_long_help(EBZIP_LONG_HELP)
        .version(crate_version!())
        .arg(arg!([book_directory] "book directory (default: `.`)").required(false))
        .arg(arg!(-z --compress "compress the book's files (default action)").action(ArgAction::SetTrue))
        .arg(arg!(-u --uncompress "decompress the book's files").action(ArgAction::SetTrue))
        .arg(arg!(-i --information "print a summary without modifying anything").action(ArgAction::SetTrue))
        .arg(
            Arg::new("level")
                .short('l')
                .long("level")
                .help("compression level 0..5 (slice_size = 2048 << level)")
                .value_name("N")
                .value_parser(level_parser)
                .default_value("0"),
        )
        .arg(
            arg!(-o --"output-directory" <DIR> "output root directory (default: `.`)")
                .required(false)
                .default_value("."),
        )
        .arg(
            arg!(-S --subbook <NAMES> "comma-separated subbook names to process (default: all)")
                .required(false),
        )
        .arg(
            arg!(-s --"skip-content" <KINDS> "comma-separated content kinds to skip: font,graphic,sound,movie")
                .required(false),
        )
        .arg(
            Arg::new("overwrite")
                .short('w')
                .long("overwrite")
                .help("overwrite policy for existing output files")
                .value_name("POLICY")
                .value_parser(["confirm", "force", "no"])
                .default_value("confirm"),
        )
        .arg(arg!(-f --force "alias for `--overwrite force`").action(ArgAction::SetTrue))
        .arg(arg!(-n --"no-overwrite" "alias for `--overwrite no`").action(ArgAction::SetTrue))
        .arg(arg!(-k --keep "do not delete source files after a successful run").action(ArgAction::SetTrue))
        .arg(arg!(-q --quiet "suppress progress lines").visible_alias("silent").action(ArgAction::SetTrue))
        .arg(arg!(-t --test "perform all reads and checks, write nothing").action(ArgAction::SetTrue))
}

pub fn build_ebrefile_cli() -> Command {
    Command::new("ebrefile")
        .about("Rewrite a book's catalog, keeping only the named subbooks")
        .after_long_help(EBREFILE_LONG_HELP)
        .version(crate_version!())
        .arg(arg!([book_directory] "book directory (default: `.`)").required(false))
        .arg(
            arg!(-o --"output-directory" <DIR> "output root directory (default: `.`)")
                .required(false)
                .default_value("."),
        )
        .arg(
            arg!(-S --subbook <NAMES> "comma-separated subbook names to keep (default: all)")
                .required(false),
        )
}

/// Split a `NAME[,NAME...]`-style token list on commas, trimming
/// surrounding whitespace around each token and dropping empties (a
/// trailing comma or repeated separators should not produce a blank
/// subbook/content-kind name).
fn split_names(raw: &str) -> Vec<String> {
    let separator = Regex::new(r"\s*,\s*").expect("static pattern");
    separator
        .split(raw.trim())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_skip(raw: &str) -> EbzipResult<SkipFlags> {
    let mut skip = SkipFlags::default();
    for kind in split_names(raw) {
        match kind.to_lowercase().as_str() {
            "font" => skip.font = true,
            "graphic" => skip.graphic = true,
            "sound" => skip.sound = true,
            "movie" => skip.movie = true,
            other => {
                return Err(EbzipError::BadArguments(format!(
                    "unknown content kind `{other}` (expected font, graphic, sound, or movie)"
                )))
            }
        }
    }
    Ok(skip)
}

/// Build `(book_directory, action, Run)` from parsed `ebzip` arguments.
/// When stdin is not a terminal, `confirm` is downgraded to `no`
/// (§6.1) so a pipeline never blocks on a prompt.
pub fn run_from_ebzip_matches(matches: &ArgMatches) -> EbzipResult<(PathBuf, Action, Run)> {
    let book_directory = matches
        .get_one::<String>("book_directory")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let action = if matches.get_flag("uncompress") {
        Action::Unzip
    } else if matches.get_flag("information") {
        Action::Info
    } else {
        Action::Zip
    };

    let level = *matches.get_one::<u8>("level").expect("has default");

    let mut overwrite = match matches.get_one::<String>("overwrite").map(String::as_str) {
        Some("force") => Overwrite::Force,
        Some("no") => Overwrite::No,
        _ => Overwrite::Confirm,
    };
    if matches.get_flag("force") {
        overwrite = Overwrite::Force;
    }
    if matches.get_flag("no-overwrite") {
        overwrite = Overwrite::No;
    }
    if overwrite == Overwrite::Confirm && !std::io::stdin().is_terminal() {
        overwrite = Overwrite::No;
    }

    let output_dir = matches
        .get_one::<String>("output-directory")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let subbooks = matches
        .get_one::<String>("subbook")
        .map(|s| split_names(s))
        .unwrap_or_default();

    let skip = match matches.get_one::<String>("skip-content") {
        Some(raw) => parse_skip(raw)?,
        None => SkipFlags::default(),
    };

    let mut run = Run::new(output_dir);
    run.level = level;
    run.overwrite = overwrite;
    run.keep = matches.get_flag("keep");
    run.test = matches.get_flag("test");
    run.quiet = matches.get_flag("quiet");
    run.subbooks = subbooks;
    run.skip = skip;

    Ok((book_directory, action, run))
}

/// Build `(book_directory, output_directory, subbook_names)` from parsed
/// `ebrefile` arguments.
pub fn run_from_ebrefile_matches(matches: &ArgMatches) -> (PathBuf, PathBuf, Vec<String>) {
    let book_directory = matches
        .get_one::<String>("book_directory")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let output_dir = matches
        .get_one::<String>("output-directory")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let subbooks = matches
        .get_one::<String>("subbook")
        .map(|s| split_names(s))
        .unwrap_or_default();
    (book_directory, output_dir, subbooks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parser_rejects_out_of_range() {
        assert!(level_parser("5").is_ok());
        assert!(level_parser("6").is_err());
        assert!(level_parser("-1").is_err());
    }

    #[test]
    fn default_action_is_zip() {
        let matches = build_ebzip_cli().get_matches_from(["ebzip", "/tmp/book"]);
        let (book_dir, action, run) = run_from_ebzip_matches(&matches).unwrap();
        assert_eq!(book_dir, PathBuf::from("/tmp/book"));
        assert!(matches!(action, Action::Zip));
        assert_eq!(run.level, 0);
    }

    #[test]
    fn skip_content_parses_comma_list() {
        let matches = build_ebzip_cli().get_matches_from(["ebzip", "-s", "font,movie", "."]);
        let (_, _, run) = run_from_ebzip_matches(&matches).unwrap();
        assert!(run.skip.font);
        assert!(run.skip.movie);
        assert!(!run.skip.sound);
    }

    #[test]
    fn unknown_skip_kind_is_rejected() {
        let matches = build_ebzip_cli().get_matches_from(["ebzip", "-s", "bogus", "."]);
        assert!(run_from_ebzip_matches(&matches).is_err());
    }

    #[test]
    fn force_flag_overrides_overwrite_value() {
        let matches = build_ebzip_cli().get_matches_from(["ebzip", "-f", "."]);
        let (_, _, run) = run_from_ebzip_matches(&matches).unwrap();
        assert_eq!(run.overwrite, Overwrite::Force);
    }

    #[test]
    fn ebrefile_parses_subbook_filter() {
        let matches = build_ebrefile_cli().get_matches_from(["ebrefile", "-S", "dict1,dict2", "book"]);
        let (book_dir, _out, subbooks) = run_from_ebrefile_matches(&matches);
        assert_eq!(book_dir, PathBuf::from("book"));
        assert_eq!(subbooks, vec!["dict1", "dict2"]);
    }
}
