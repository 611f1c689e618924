//! Line-oriented driver for the reconciler.
//!
//! Each input line becomes a `Command`; executing it returns a `Reply` for the
//! caller to print. Failures are rendered as text so the session continues.

use crate::reconciler::{AiOutcome, Reconciler, SaveOutcome};
use crate::types::{Resume, Role};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

const UPDATED_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

pub const HELP: &str = "\
Commands:
  list [filter]        list resumes (default first, newest next)
  open <id>            open a saved resume
  new                  start an empty draft
  tailor <id>          start an unsaved copy of a resume
  chat <message>       ask the assistant to edit the draft
  upload <path>        send a plain-text resume file to the assistant
  save                 save the draft (asks for a name if unsaved)
  save-as <name>       save the draft as a new resume
  rename <id> <name>   rename a resume
  delete <id>          delete a resume
  default <id>         open this resume on start
  restore              load the snapshot kept by older versions
  show                 print the current draft
  help                 show this text
  quit                 exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List(Option<String>),
    Open(i64),
    New,
    Tailor(i64),
    Chat(String),
    Upload(PathBuf),
    Save,
    SaveAs(String),
    Rename(i64, String),
    Delete(i64),
    Default(i64),
    Restore,
    Show,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),

    #[error("Missing argument: {0}")]
    MissingArg(&'static str),

    #[error("Invalid resume id: {0}")]
    InvalidId(String),
}

pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => Command::List(non_empty(rest)),
        "open" => Command::Open(parse_id(rest)?),
        "new" => Command::New,
        "tailor" => Command::Tailor(parse_id(rest)?),
        "chat" => Command::Chat(require(rest, "message")?.to_string()),
        "upload" => Command::Upload(PathBuf::from(require(rest, "path")?)),
        "save" => Command::Save,
        "save-as" => Command::SaveAs(require(rest, "name")?.to_string()),
        "rename" => {
            let (id, name) = rest
                .split_once(char::is_whitespace)
                .ok_or(CommandError::MissingArg("name"))?;
            Command::Rename(parse_id(id)?, require(name.trim(), "name")?.to_string())
        }
        "delete" | "rm" => Command::Delete(parse_id(rest)?),
        "default" => Command::Default(parse_id(rest)?),
        "restore" => Command::Restore,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn require<'a>(value: &'a str, what: &'static str) -> Result<&'a str, CommandError> {
    if value.is_empty() {
        Err(CommandError::MissingArg(what))
    } else {
        Ok(value)
    }
}

fn parse_id(raw: &str) -> Result<i64, CommandError> {
    let raw = require(raw.trim(), "resume id")?;
    raw.parse()
        .map_err(|_| CommandError::InvalidId(raw.to_string()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The draft is unsaved; the caller should prompt and issue `SaveAs`.
    NeedsName,
    Quit,
}

pub struct Shell {
    reconciler: Arc<Reconciler>,
}

impl Shell {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn prompt(&self) -> String {
        let snapshot = self.reconciler.snapshot();
        let label = match snapshot.selected_resume_id {
            Some(id) => format!("#{id}"),
            None => "new".to_string(),
        };
        let marker = if snapshot.dirty { "*" } else { "" };
        format!("tailor[{label}{marker}]> ")
    }

    pub async fn execute(&self, command: Command) -> Reply {
        match self.run(command).await {
            Ok(reply) => reply,
            Err(err) => Reply::Text(format!("error: {err}")),
        }
    }

    async fn run(&self, command: Command) -> crate::Result<Reply> {
        let rec = &self.reconciler;
        let text = match command {
            Command::List(filter) => {
                let listing = rec.list_resumes(filter.as_deref()).await?;
                render_list(&listing.resumes, listing.default_id)
            }
            Command::Open(id) => {
                rec.select_resume(id).await?;
                format!("opened #{id} ({})", rec.query_string())
            }
            Command::New => {
                rec.new_draft();
                "started a new draft".to_string()
            }
            Command::Tailor(id) => {
                let source = rec.duplicate_resume(id).await?;
                format!("new draft copied from '{}'", source.name)
            }
            Command::Chat(message) => render_ai(rec.send_message(&message, None).await?),
            Command::Upload(path) => {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    crate::TailorError::Validation(format!(
                        "Could not read {}: {e}",
                        path.display()
                    ))
                })?;
                let prompt = "Extract my resume information";
                render_ai(rec.send_message(prompt, Some(content)).await?)
            }
            Command::Save => match rec.save().await? {
                SaveOutcome::Updated(resume) => format!("saved '{}'", resume.name),
                SaveOutcome::NeedsName => return Ok(Reply::NeedsName),
            },
            Command::SaveAs(name) => {
                let resume = rec.save_as_new(&name).await?;
                format!("saved as '{}' (#{})", resume.name, resume.id)
            }
            Command::Rename(id, name) => {
                let resume = rec.rename(id, &name).await?;
                format!("renamed #{} to '{}'", resume.id, resume.name)
            }
            Command::Delete(id) => {
                rec.delete(id).await?;
                format!("deleted #{id}")
            }
            Command::Default(id) => {
                rec.set_default(id).await?;
                format!("#{id} opens on start")
            }
            Command::Restore => {
                if rec.restore_legacy_snapshot().await? {
                    "restored the saved snapshot into a new draft".to_string()
                } else {
                    "no snapshot to restore".to_string()
                }
            }
            Command::Show => render_draft(rec),
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Reply::Quit),
        };
        Ok(Reply::Text(text))
    }
}

fn render_ai(outcome: AiOutcome) -> String {
    match outcome {
        AiOutcome::Applied { reply: Some(reply) } => reply,
        AiOutcome::Applied { reply: None } => "draft updated".to_string(),
        AiOutcome::Superseded => "response arrived after the draft changed; ignored".to_string(),
    }
}

fn render_list(resumes: &[Resume], default_id: Option<i64>) -> String {
    if resumes.is_empty() {
        return "no resumes yet".to_string();
    }
    let now = OffsetDateTime::now_utc();
    resumes
        .iter()
        .map(|resume| {
            let marker = if Some(resume.id) == default_id { "*" } else { " " };
            let updated = resume
                .updated_at
                .format(UPDATED_FORMAT)
                .unwrap_or_default();
            let expired = if resume.is_expired(now) { " (expired)" } else { "" };
            format!("{marker} #{:<4} {:<32} {updated}{expired}", resume.id, resume.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_draft(rec: &Reconciler) -> String {
    let snapshot = rec.snapshot();
    let mut out = String::new();
    match snapshot.selected_resume_id {
        Some(id) => out.push_str(&format!("resume #{id}")),
        None => out.push_str("unsaved draft"),
    }
    if snapshot.loading {
        out.push_str(" (loading)");
    }
    if snapshot.dirty {
        out.push_str(" (modified)");
    }
    if snapshot.ai_pending {
        out.push_str(" (assistant working)");
    }
    out.push('\n');
    match &snapshot.content {
        Some(content) => out.push_str(
            &serde_json::to_string_pretty(content.as_value()).unwrap_or_default(),
        ),
        None => out.push_str("(empty)"),
    }
    for message in &snapshot.transcript {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        out.push_str(&format!("\n{who}: {}", message.content));
    }
    out
}
