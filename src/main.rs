#![deny(missing_docs)]
#![deny(warnings)]

//! Command-line entry point.
//!
//! Verifies that every recognized media file on a storage card has a
//! content-identical backup under a disk archive and writes an HTML report
//! of the files that do not.

use std::path::PathBuf;
use std::process::ExitCode;

use cardcheck::config::{Settings, VerifyConfig};
use cardcheck::engine;
use cardcheck::index::{CardIndex, DiskIndex};
use cardcheck::logging::{self, Verbosity};
use cardcheck::report;

fn main() -> ExitCode {
    let options = match parse_args(std::env::args().skip(1).collect()) {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = logging::init(options.verbosity) {
        eprintln!("Logging disabled: {err}");
    }

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            tracing::error!("{}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

struct RunFailure {
    message: String,
    code: u8,
}

fn fail(code: u8, err: impl std::fmt::Display) -> RunFailure {
    RunFailure {
        message: err.to_string(),
        code,
    }
}

fn run(options: CliOptions) -> Result<(), RunFailure> {
    let mut config = VerifyConfig::new(options.card, options.disk);
    config.copy_dir = options.copy;
    if let Some(report_path) = options.report {
        config.report_path = report_path;
    }
    if let Some(settings_path) = &options.config {
        let settings = Settings::load(settings_path).map_err(|err| fail(2, err))?;
        config.apply_settings(&settings);
    }
    config.validate().map_err(|err| fail(2, err))?;

    let disk =
        DiskIndex::build(&config.disk_root, &config.extensions).map_err(|err| fail(1, err))?;
    let card =
        CardIndex::build(&config.card_root, &config.extensions).map_err(|err| fail(1, err))?;

    let entries = engine::verify(card, disk, &config).map_err(|err| fail(1, err))?;
    report::render_html(&entries, &config.report_path).map_err(|err| fail(1, err))?;
    tracing::info!(
        "Comparison ended: {} file(s) without backup; see {}",
        entries.len(),
        config.report_path.display()
    );

    if options.show
        && let Err(err) = open::that(&config.report_path)
    {
        tracing::warn!(
            "Failed to open report {}: {err}",
            config.report_path.display()
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    card: PathBuf,
    disk: PathBuf,
    copy: Option<PathBuf>,
    config: Option<PathBuf>,
    report: Option<PathBuf>,
    show: bool,
    verbosity: Verbosity,
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut card: Option<PathBuf> = None;
    let mut disk: Option<PathBuf> = None;
    let mut copy: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut report: Option<PathBuf> = None;
    let mut show = false;
    let mut verbosity = Verbosity::Normal;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--card" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--card requires a value".to_string())?;
                card = Some(PathBuf::from(value));
            }
            "--disk" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--disk requires a value".to_string())?;
                disk = Some(PathBuf::from(value));
            }
            "--copy" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--copy requires a value".to_string())?;
                copy = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--report" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--report requires a value".to_string())?;
                report = Some(PathBuf::from(value));
            }
            "--show" => show = true,
            "-v" | "--verbose" => verbosity = Verbosity::Verbose,
            "-d" | "--debug" => verbosity = Verbosity::Debug,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let (Some(card), Some(disk)) = (card, disk) else {
        return Err(help_text());
    };
    Ok(Some(CliOptions {
        card,
        disk,
        copy,
        config,
        report,
        show,
        verbosity,
    }))
}

fn help_text() -> String {
    [
        "cardcheck",
        "",
        "Checks that every media file (jpeg, raw, video) on a card has a",
        "content-identical backup somewhere under a disk folder, and writes",
        "an HTML report of the files that do not.",
        "",
        "Usage:",
        "  cardcheck --card <dir> --disk <dir> [options]",
        "",
        "Options:",
        "  --card <dir>     card to read, including drive and path",
        "  --disk <dir>     disk folder to compare to",
        "  --copy <dir>     folder to copy unmatched files to",
        "  --config <file>  TOML settings file (extensions, workers)",
        "  --report <file>  report output path (default: uncopied.html)",
        "  --show           open the report when done",
        "  -v, --verbose    per-file detail",
        "  -d, --debug      worker-level tracing",
        "  -h, --help       show this help",
    ]
    .join("\n")
}
