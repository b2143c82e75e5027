pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod datetime;
pub mod error;
pub mod kv;
pub mod login;
pub mod render;
pub mod scheduler;
pub mod task;
pub mod taskstore;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::scheduler::{Reminder, ThreadScheduler};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting marktask CLI");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rcfile.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = kv::FileStore::open(&data_dir)
        .with_context(|| format!("failed to open store at {}", data_dir.display()))?;

    let mut renderer = render::Renderer::new(&cfg)?;
    let scheduler = ThreadScheduler::new(|reminder: Reminder| {
        eprintln!("Reminder: time's up for \"{}\"!", reminder.title);
    });

    let inv = cli::Invocation::parse(&cfg, cli.rest)?;
    commands::dispatch(&store, &cfg, &mut renderer, &scheduler, inv)?;

    info!("done");
    Ok(())
}
