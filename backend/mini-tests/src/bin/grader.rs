use anyhow::{bail, Context};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_tests::client::{render, Catalog, GradingSession};
use mini_tests::grading::Grader;
use mini_tests::models::Exercise;
use mini_tests::progress::mirror::MIRROR_TIMEOUT;
use mini_tests::progress::{FileStorage, HttpSubmissionSink, KeyValueStorage, Mirror, ProgressStore};
use mini_tests::quiz::AnswerEffect;
use mini_tests::script::Limits;
use mini_tests::GraderConfig;

const HELP: &str = "\
Commands:
  login <5 digits>          sign in
  logout                    sign out
  list                      exercise overview
  show <id>                 exercise details
  run <id> [file]           grade a file, or the saved draft
  draft <id> <file>         save a file as the draft
  reset <id>                restore starter code or restart a quiz
  answer <id> <qid> v|f     answer a quiz question
  submit <id>               finish a quiz now
  restart <id>              start a quiz over
  help                      this text
  quit                      exit";

enum Flow {
    Continue,
    Quit,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_tests=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = GraderConfig::load().context("Failed to load grader configuration")?;
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };
    let sink = HttpSubmissionSink::new(config.collector_url.clone())
        .context("Failed to build collector client")?;
    let store = ProgressStore::new(FileStorage::open(&config.storage_path))
        .with_mirror(Mirror::new(Arc::new(sink)));
    let grader = Grader::new(Limits {
        step_budget: config.step_budget,
        ..Limits::default()
    });

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut session = GradingSession::new(catalog, store, grader, events_tx);

    println!("{}\n", HELP);
    print!("{}", render(&session));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match execute(&mut session, line.trim()).await {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("error: {:#}", e),
                }
                print!("{}", render(&session));
            }
            Some(event) = events.recv() => {
                match session.handle_timer_event(event) {
                    Ok(Some(expired)) => {
                        println!("Time is up for exercise {}.", expired.exercise_id());
                        print!("{}", render(&session));
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "failed to apply quiz tick"),
                }
            }
        }
    }

    // Let the last mirror finish before the runtime goes away.
    if let Some(task) = session.take_mirror_task() {
        let _ = tokio::time::timeout(MIRROR_TIMEOUT, task).await;
    }
    Ok(())
}

async fn execute<S: KeyValueStorage>(
    session: &mut GradingSession<S>,
    line: &str,
) -> anyhow::Result<Flow> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(Flow::Continue);
    };
    let args: Vec<&str> = words.collect();

    match (command, args.as_slice()) {
        ("quit" | "exit", []) => return Ok(Flow::Quit),
        ("help", []) => println!("{}", HELP),
        ("list", []) => {}
        ("login", [id]) => {
            let id = session.sign_in(id)?;
            println!("Signed in as {}.", id);
        }
        ("logout", []) => session.sign_out()?,
        ("show", [id]) => {
            let id = exercise_id(id)?;
            let view = render(session);
            match view.exercise(id) {
                Some(exercise) => print!("{}", exercise),
                None => bail!("exercise {} not found", id),
            }
        }
        ("run", [id]) => {
            let id = exercise_id(id)?;
            let code = session.code_for(id)?;
            session.run_exercise(id, &code)?;
        }
        ("run", [id, file]) => {
            let id = exercise_id(id)?;
            let code = read_file(file).await?;
            session.run_exercise(id, &code)?;
        }
        ("draft", [id, file]) => {
            let id = exercise_id(id)?;
            let code = read_file(file).await?;
            session.save_draft(id, &code)?;
            println!("Draft saved.");
        }
        ("reset", [id]) => {
            let id = exercise_id(id)?;
            match session.catalog().get(id) {
                Some(Exercise::Quiz(_)) => session.restart_quiz(id)?,
                _ => {
                    session.reset_code(id)?;
                    println!("Starter code restored.");
                }
            }
        }
        ("restart", [id]) => session.restart_quiz(exercise_id(id)?)?,
        ("answer", [id, question, value]) => {
            let id = exercise_id(id)?;
            let value = match value.to_ascii_lowercase().as_str() {
                "v" | "t" | "true" => true,
                "f" | "false" => false,
                other => bail!("answer must be v or f, got {}", other),
            };
            match session.answer(id, question, value)? {
                AnswerEffect::Recorded { timer_started: true } => println!("Timer started."),
                AnswerEffect::Recorded { .. } => {}
                AnswerEffect::Ignored => println!("Quiz already finished; restart to try again."),
            }
        }
        ("submit", [id]) => {
            if session.submit_quiz(exercise_id(id)?)?.is_none() {
                println!("Quiz already finished.");
            }
        }
        _ => bail!("unknown command {:?}, try help", line),
    }
    Ok(Flow::Continue)
}

fn exercise_id(raw: &str) -> anyhow::Result<u32> {
    raw.parse()
        .with_context(|| format!("invalid exercise id {:?}", raw))
}

async fn read_file(path: &str) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path))
}
