use structopt::StructOpt;
use uuid::Uuid;

use crate::{
    Result,
    audit,
    config::Config,
    db::{self, types::{SubmissionStage, SubmissionStatus}},
    events,
    models::Submission,
    permissions::{Caller, PermissionBits},
    queue::{self, Filter, Queue},
};

#[derive(StructOpt)]
pub struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// List submissions
    #[structopt(name = "list")]
    List(ListOpts),
    /// Show a submission together with its activity log
    #[structopt(name = "show")]
    Show(ShowOpts),
    /// Move a submission to another stage
    #[structopt(name = "transition")]
    Transition(TransitionOpts),
    /// Change a submission's status within its stage
    #[structopt(name = "set-status")]
    SetStatus(SetStatusOpts),
}

#[derive(StructOpt)]
struct ListOpts {
    /// Queue to list (my, all, archived)
    #[structopt(long = "queue", default_value = "all", parse(try_from_str))]
    queue: Queue,
    /// Only submissions in this stage
    #[structopt(long = "stage", parse(try_from_str))]
    stage: Option<SubmissionStage>,
    /// Only submissions whose title contains this string
    #[structopt(long = "search")]
    search: Option<String>,
    /// Editor whose queue to use with `--queue my`
    #[structopt(long = "editor", default_value = "0")]
    editor: i32,
}

#[derive(StructOpt)]
struct ShowOpts {
    /// Submission ID
    #[structopt(parse(try_from_str))]
    submission: Uuid,
}

#[derive(StructOpt)]
struct TransitionOpts {
    /// Submission ID
    #[structopt(parse(try_from_str))]
    submission: Uuid,
    /// Target stage
    #[structopt(parse(try_from_str))]
    stage: SubmissionStage,
    /// Status override; defaults to the stage's default status
    #[structopt(long = "status", parse(try_from_str))]
    status: Option<SubmissionStatus>,
    /// Note to record with the transition
    #[structopt(long = "note")]
    note: Option<String>,
    /// User to act as
    #[structopt(long = "user")]
    user: i32,
}

#[derive(StructOpt)]
struct SetStatusOpts {
    /// Submission ID
    #[structopt(parse(try_from_str))]
    submission: Uuid,
    /// New status
    #[structopt(parse(try_from_str))]
    status: SubmissionStatus,
    /// Note to record with the change
    #[structopt(long = "note")]
    note: Option<String>,
    /// User to act as
    #[structopt(long = "user")]
    user: i32,
}

pub fn main(cfg: &Config, opts: Opts) -> Result<()> {
    let db = db::connect(cfg)?;

    match opts.command {
        Command::List(opts) => list(&db, opts),
        Command::Show(opts) => show(&db, opts),
        Command::Transition(opts) => transition(&db, opts),
        Command::SetStatus(opts) => set_status(&db, opts),
    }
}

fn list(db: &db::Connection, opts: ListOpts) -> Result<()> {
    let submissions = queue::list(db, &Filter {
        stage: opts.stage,
        search: opts.search.as_ref().map(String::as_str),
        limit: 100,
        .. Filter::new(opts.queue, opts.editor)
    })?;

    for submission in submissions {
        println!("{} {:<12} {:<10} {}",
            submission.id,
            submission.stage.to_string(),
            submission.status.to_string(),
            submission.title);
    }

    Ok(())
}

fn show(db: &db::Connection, opts: ShowOpts) -> Result<()> {
    let submission = Submission::by_id(db, opts.submission)?;
    let public = submission.get_public(db)?;

    println!("{}: {}", public.id, public.title);
    println!("stage: {}, status: {}, archived: {}",
        public.stage, public.status, public.is_archived);
    println!("editors: {:?}", public.editors);
    println!("submitted: {}, updated: {}",
        public.submitted_at, public.updated_at);

    println!("\nactivity:");
    for entry in audit::entries_for(db, public.id)? {
        println!("{} {:<12} {:<20} actor: {}",
            entry.timestamp,
            entry.category,
            entry.kind,
            entry.actor.map(|id| id.to_string())
                .unwrap_or_else(|| "system".to_string()));
    }

    println!("\nevents:");
    for event in events::for_submission(db, public.id)? {
        println!("{} {}", event.timestamp, event.kind);
    }

    Ok(())
}

fn transition(db: &db::Connection, opts: TransitionOpts) -> Result<()> {
    let caller = Caller::with_permissions(opts.user, PermissionBits::all());
    let mut submission = Submission::by_id(db, opts.submission)?;

    submission.transition_stage(
        db,
        &caller,
        opts.stage,
        opts.status,
        opts.note.as_ref().map(String::as_str),
    )?;

    println!("{} is now in {} ({})",
        submission.id, submission.stage, submission.status);

    Ok(())
}

fn set_status(db: &db::Connection, opts: SetStatusOpts) -> Result<()> {
    let caller = Caller::with_permissions(opts.user, PermissionBits::all());
    let mut submission = Submission::by_id(db, opts.submission)?;

    submission.set_status(
        db,
        &caller,
        opts.status,
        opts.note.as_ref().map(String::as_str),
    )?;

    println!("{} is now {}", submission.id, submission.status);

    Ok(())
}
