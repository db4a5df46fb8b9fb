use anyhow::Context;
use clap::Parser;
use fieldprof::cli::Cli;
use fieldprof::dwarf::parse::{self, FetchOptions, FetchRequest};
use fieldprof::engine::HistogramBuilder;
use fieldprof::error::exit_code;
use fieldprof::profile::JsonProfileReader;
use fieldprof::resolver::TypeResolver;
use fieldprof::retriever::LocalFileRetriever;
use fieldprof::store::TypeTreeStore;
use log::{info, warn};
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(err) = e.downcast_ref::<fieldprof::Error>() {
                ExitCode::from(err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Invalid arguments")?;

    info!("running field access attribution in local mode");
    let binary_path = cli.memprof_profiled_binary.clone().expect("validated");
    let profile_path = cli.memprof_profile.clone().expect("validated");
    let dwarf_path = cli.dwarf_path().expect("validated");

    // The build-id is informational for local files; an unreadable one is
    // not fatal.
    let build_id = match parse::build_id_for_file(&binary_path) {
        Ok(id) => id,
        Err(e) => {
            warn!("failed to get build id for local file: {e}, continuing with empty build id");
            String::new()
        }
    };

    let retriever = LocalFileRetriever;
    let index = parse::fetch(
        &retriever,
        &[FetchRequest {
            build_id,
            binary_path: binary_path.clone(),
            dwarf_path: Some(dwarf_path),
        }],
        &FetchOptions {
            read_subprograms: true,
            parse_thread_count: cli.parse_thread_count,
        },
    )
    .context("building the debug index")?;

    let resolver = TypeResolver::new(&index, true);
    let builder = HistogramBuilder::new(resolver)
        .with_type_prefix_filter(cli.type_prefix_filter.clone())
        .with_callstack_filter(cli.callstack_filter.clone())
        .only_records(cli.only_records)
        .verify_verbose(cli.verify_verbose)
        .collect_unresolved(cli.dump_unresolved_callstacks);

    let mut reader = JsonProfileReader::open(&profile_path).context("opening the profile")?;
    let results = builder.build(&mut reader).context("building the histogram")?;

    let mut out: Box<dyn Write> = match &cli.out {
        Some(path) => Box::new(std::fs::File::create(path).context("creating the output file")?),
        None => Box::new(std::io::stdout().lock()),
    };

    if cli.dump_unresolved_callstacks {
        for callstack in &results.unresolved_callstacks {
            TypeTreeStore::dump_callstack(callstack, &mut out, 0, true)?;
        }
    } else if cli.flamegraph {
        results.store.dump_flamegraph(&mut out, cli.limit)?;
    } else {
        results.store.dump(&mut out, cli.limit)?;
    }
    out.flush()?;

    if cli.stats {
        results.stats.log();
    }
    Ok(())
}
