use structopt::StructOpt;
use uuid::Uuid;

use crate::{
    Result,
    config::Config,
    db::{self, types::SubmissionStage},
    models::{Submission, Task, task::NewTaskParams},
    permissions::{Caller, PermissionBits},
};

#[derive(StructOpt)]
pub struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// List a user's open tasks
    #[structopt(name = "list")]
    List(ListOpts),
    /// Create a task on a submission
    #[structopt(name = "add")]
    Add(AddOpts),
    /// Mark a task as done
    #[structopt(name = "complete")]
    Complete(CompleteOpts),
}

#[derive(StructOpt)]
struct ListOpts {
    /// User whose open tasks to list
    #[structopt(long = "assignee")]
    assignee: i32,
}

#[derive(StructOpt)]
struct AddOpts {
    /// Submission the task concerns
    #[structopt(parse(try_from_str))]
    submission: Uuid,
    /// Task title
    title: String,
    /// Stage the task belongs to
    #[structopt(long = "stage", parse(try_from_str))]
    stage: SubmissionStage,
    /// User the task is assigned to
    #[structopt(long = "assignee")]
    assignee: Option<i32>,
    /// User to act as
    #[structopt(long = "user")]
    user: i32,
}

#[derive(StructOpt)]
struct CompleteOpts {
    /// Submission the task concerns
    #[structopt(parse(try_from_str))]
    submission: Uuid,
    /// Task ID
    task: i32,
    /// User to act as
    #[structopt(long = "user")]
    user: i32,
}

pub fn main(cfg: &Config, opts: Opts) -> Result<()> {
    let db = db::connect(cfg)?;

    match opts.command {
        Command::List(opts) => list(&db, opts),
        Command::Add(opts) => add(&db, opts),
        Command::Complete(opts) => complete(&db, opts),
    }
}

fn list(db: &db::Connection, opts: ListOpts) -> Result<()> {
    for task in Task::all_open(db, opts.assignee)? {
        println!("{:>6} {} {:<12} {}",
            task.id, task.submission, task.stage.to_string(), task.title);
    }

    Ok(())
}

fn add(db: &db::Connection, opts: AddOpts) -> Result<()> {
    let caller = Caller::with_permissions(opts.user, PermissionBits::all());
    let submission = Submission::by_id(db, opts.submission)?;

    let task = Task::create(db, &caller, &submission, NewTaskParams {
        stage: opts.stage,
        title: &opts.title,
        assignee: opts.assignee,
        due_date: None,
    })?;

    println!("created task {}", task.id);

    Ok(())
}

fn complete(db: &db::Connection, opts: CompleteOpts) -> Result<()> {
    let caller = Caller::with_permissions(opts.user, PermissionBits::all());
    let mut task = Task::by_id(db, opts.submission, opts.task)?;

    task.complete(db, &caller)?;

    println!("task {} completed", task.id);

    Ok(())
}
