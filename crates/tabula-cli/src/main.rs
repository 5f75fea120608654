// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use runtime::WorkerRuntime;
use std::env;
use std::path::PathBuf;
use tabula_app::{DEFAULT_BASE_NAME, GridController, PersistenceGateway};
use tabula_db::Store;
use tracing::info;

const DEMO_ROWS: usize = 500;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `tabula --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    if !options.check_only {
        runtime::init_logging(&config.log_path()?, config.log_level())?;
    }

    let store = if options.demo {
        Store::open_memory()?
    } else {
        Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or TABULA_DB_PATH",
                db_path.display()
            )
        })?
    };
    store.bootstrap()?;

    let base = store.ensure_base(&options.base)?;
    if options.demo {
        seed_demo(&store, &base)?;
    }
    let settings = config.grid_settings()?;
    if options.check_only {
        return Ok(());
    }

    info!(base = %base.name, db = %db_path.display(), "starting tabula");
    let mut runtime = WorkerRuntime::spawn(store)?;
    let mut grid = GridController::new(base.id, settings);
    tabula_tui::run_app(&mut grid, &mut runtime)
}

fn seed_demo(store: &Store, base: &tabula_app::Base) -> Result<()> {
    let table = store.create_table(base.id, "Demo")?;
    store.generate_fake_rows(table.id, DEMO_ROWS)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    base: String,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        base: DEFAULT_BASE_NAME.to_owned(),
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--base" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--base requires a base name"))?;
                let name = value.as_ref().trim();
                if name.is_empty() {
                    return Err(anyhow!("--base requires a non-empty base name"));
                }
                options.base = name.to_owned();
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("tabula");
    println!("  --config <path>          Use a specific config path");
    println!("  --base <name>            Open (or create) this base; default \"My Base\"");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with generated demo rows (in-memory)");
    println!("  --check                  Validate config and database, then exit");
    println!("  --help                   Show this help");
}
