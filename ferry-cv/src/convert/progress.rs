//! Status lines returned to the driving client
//!
//! The client loops until it sees [`COMPLETE_SENTINEL`] or any line containing
//! "error" (case-insensitive), so no non-fatal line may contain that word.

use super::state::Step;

pub const COMPLETE_SENTINEL: &str = "Conversion Complete";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressMessage {
    /// A page was processed; `from`/`to` are the row numbers covered
    Working { step: Step, from: i64, to: i64, skipped: usize },
    /// First page of a step found nothing
    Empty { step: Step },
    /// Later page of a step found nothing; the previous page ended exactly on the last row
    Finished { step: Step },
    /// Step disabled by request flags
    NothingToDo { step: Step },
    /// Step disabled by request flags after it had already started
    Quiet,
    /// Source query failed; the same page is attempted again next time
    Retrying { step: Step, from: i64, to: i64 },
    Complete,
    Error(String),
}

impl ProgressMessage {
    pub fn text(&self) -> String {
        match self {
            ProgressMessage::Working {
                step,
                from,
                to,
                skipped,
            } => {
                let mut line = format!("{} ({} - {})", working_label(*step), from, to);
                if *skipped > 0 {
                    line.push_str(&format!(", {} skipped", skipped));
                }
                line
            }
            ProgressMessage::Empty { step } => empty_label(*step),
            ProgressMessage::Finished { step } => format!("{}: finished", working_label(*step)),
            ProgressMessage::NothingToDo { step } => {
                format!("Skipping {}: nothing to do", noun(*step))
            }
            ProgressMessage::Quiet => String::new(),
            ProgressMessage::Retrying { step, from, to } => {
                format!("Source unavailable, retrying {} ({} - {})", noun(*step), from, to)
            }
            ProgressMessage::Complete => COMPLETE_SENTINEL.to_string(),
            ProgressMessage::Error(message) => format!("Error: {}", message),
        }
    }

    /// HTML fragment sent as the response body
    pub fn render(&self) -> String {
        format!("<p>{}</p>", escape_html(&self.text()))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ProgressMessage::Complete)
    }

    /// Whether a client watching for the error sentinel stops on this line
    pub fn is_error(&self) -> bool {
        self.text().to_ascii_lowercase().contains("error")
    }

    pub fn is_terminal(&self) -> bool {
        self.is_complete() || self.is_error()
    }
}

fn noun(step: Step) -> &'static str {
    if let Some(kind) = step.entity_kind() {
        return kind.plural();
    }
    match step {
        Step::Clean => "clean",
        Step::Passwords => "passwords",
        Step::PeriodHierarchy => "period parents",
        _ => "completion",
    }
}

fn working_label(step: Step) -> String {
    match step {
        Step::Clean => "Deleting previously converted data".to_string(),
        Step::Passwords => "Delete user passwords".to_string(),
        Step::PeriodHierarchy => "Calculating period hierarchy".to_string(),
        other => format!("Converting {}", noun(other)),
    }
}

fn empty_label(step: Step) -> String {
    match step {
        Step::Clean => "No data to clean".to_string(),
        Step::Passwords => "No passwords to clear".to_string(),
        other => format!("No {} to convert", noun(other)),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
