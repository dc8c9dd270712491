//! Administrative command line interface.
//!
//! This is a thin caller of the core operations, the same role any other
//! presentation layer plays. Mutating commands act on behalf of the user
//! given with `--user`, with full editorial permissions.

use structopt::StructOpt;

use crate::{Result, config::{self, Config, Logging}, db, queue};

mod submission;
mod task;

#[derive(StructOpt)]
struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Manage submissions
    #[structopt(name = "submission")]
    Submission(submission::Opts),
    /// Manage editorial tasks
    #[structopt(name = "task")]
    Task(task::Opts),
    /// Show dashboard queue counts
    #[structopt(name = "queue")]
    Queue(QueueOpts),
}

#[derive(StructOpt)]
struct QueueOpts {
    /// Editor whose dashboard to compute
    #[structopt(long = "editor")]
    editor: i32,
}

pub fn main() -> Result<()> {
    let opts = Opts::from_args();
    let config = config::load()?;

    setup_logging(&config.logging)?;

    match opts.command {
        Command::Submission(opts) => submission::main(config, opts),
        Command::Task(opts) => task::main(config, opts),
        Command::Queue(opts) => queue_stats(config, opts),
    }
}

fn setup_logging(config: &Logging) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(config.level);

    for (module, level) in &config.filters {
        builder.filter_module(module, *level);
    }

    builder.try_init()?;
    Ok(())
}

fn queue_stats(cfg: &Config, opts: QueueOpts) -> Result<()> {
    let db = db::connect(cfg)?;
    let stats = queue::stats(&db, opts.editor)?;

    println!("my queue:    {}", stats.my_queue);
    println!("in review:   {}", stats.in_review);
    println!("copyediting: {}", stats.copyediting);
    println!("production:  {}", stats.production);
    println!("archived:    {}", stats.archived);
    println!("open tasks:  {}", stats.open_tasks);

    Ok(())
}
