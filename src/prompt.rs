//! Terminal questions asked during downloads.
//!
//! The orchestration code only sees the traits; the `inquire` backed
//! implementation is wired up by the binaries.

use anyhow::Result;
use inquire::{InquireError, Select, Text};

/// Presenters offered in the selection list, most frequent first.
pub const KNOWN_PRESENTERS: &[&str] = &[
    "Christoph", "Armin", "Ralph", "Clarissa", "Siham", "Johannes", "Andre", "Jana", "Laura",
];

const OTHER: &str = "Andere";
const UNKNOWN: &str = "Unbekannt";
const SKIP: &str = "Überspringen";

/// Stored presenter value for "asked, but nobody knows".
pub const UNKNOWN_PRESENTER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterAnswer {
    Name(String),
    Unknown,
    Skip,
    Cancelled,
}

impl PresenterAnswer {
    /// The value written to the stores, `None` when the run was cancelled.
    pub fn stored_value(&self) -> Option<String> {
        match self {
            PresenterAnswer::Name(name) => Some(name.clone()),
            PresenterAnswer::Unknown => Some(UNKNOWN_PRESENTER.to_string()),
            PresenterAnswer::Skip => Some(String::new()),
            PresenterAnswer::Cancelled => None,
        }
    }
}

pub trait PresenterPrompt {
    fn ask(&self, title: &str, year: &str) -> Result<PresenterAnswer>;
}

pub trait EpisodeChooser {
    /// Index into `candidates`, or `None` to abort.
    fn choose(&self, title: &str, candidates: &[String]) -> Result<Option<usize>>;
}

/// Interactive prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompt;

impl InquirePrompt {
    /// Asks for the next episode URL until one is given. `q`, `quit` or Esc
    /// ends the loop; empty input asks again.
    pub fn ask_url(&self) -> Result<Option<String>> {
        loop {
            match Text::new("URL (q zum Beenden):").prompt() {
                Ok(input) => match read_url_input(&input) {
                    UrlInput::Empty => continue,
                    UrlInput::Quit => return Ok(None),
                    UrlInput::Url(url) => return Ok(Some(url)),
                },
                Err(err) if is_cancel(&err) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum UrlInput {
    Empty,
    Quit,
    Url(String),
}

fn read_url_input(input: &str) -> UrlInput {
    let input = input.trim();
    if input.is_empty() {
        UrlInput::Empty
    } else if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        UrlInput::Quit
    } else {
        UrlInput::Url(input.to_string())
    }
}

fn is_cancel(err: &InquireError) -> bool {
    matches!(
        err,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

impl PresenterPrompt for InquirePrompt {
    fn ask(&self, title: &str, year: &str) -> Result<PresenterAnswer> {
        let mut options: Vec<&str> = KNOWN_PRESENTERS.to_vec();
        options.extend([OTHER, UNKNOWN, SKIP]);

        let label = if year.is_empty() {
            format!("Wer moderiert \"{title}\"?")
        } else {
            format!("Wer moderiert \"{title}\" ({year})?")
        };
        let choice = match Select::new(&label, options).with_page_size(12).prompt() {
            Ok(choice) => choice,
            Err(err) if is_cancel(&err) => return Ok(PresenterAnswer::Cancelled),
            Err(err) => return Err(err.into()),
        };

        Ok(match choice {
            OTHER => match Text::new("Name:").prompt() {
                Ok(name) if name.trim().is_empty() => PresenterAnswer::Skip,
                Ok(name) => PresenterAnswer::Name(name.trim().to_string()),
                Err(err) if is_cancel(&err) => PresenterAnswer::Cancelled,
                Err(err) => return Err(err.into()),
            },
            UNKNOWN => PresenterAnswer::Unknown,
            SKIP => PresenterAnswer::Skip,
            name => PresenterAnswer::Name(name.to_string()),
        })
    }
}

impl EpisodeChooser for InquirePrompt {
    fn choose(&self, title: &str, candidates: &[String]) -> Result<Option<usize>> {
        let mut options: Vec<String> = candidates.to_vec();
        options.push("Abbrechen".to_string());
        let label = format!("Mehrere Treffer für \"{title}\":");
        match Select::new(&label, options).raw_prompt() {
            Ok(choice) if choice.index < candidates.len() => Ok(Some(choice.index)),
            Ok(_) => Ok(None),
            Err(err) if is_cancel(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned answers and records what was asked.
    #[derive(Default)]
    pub struct ScriptedPrompt {
        pub answers: RefCell<VecDeque<PresenterAnswer>>,
        pub choices: RefCell<VecDeque<Option<usize>>>,
        pub asked: RefCell<Vec<String>>,
    }

    impl ScriptedPrompt {
        pub fn answering(answers: Vec<PresenterAnswer>) -> Self {
            Self {
                answers: RefCell::new(answers.into()),
                ..Self::default()
            }
        }

        pub fn choosing(choices: Vec<Option<usize>>) -> Self {
            Self {
                choices: RefCell::new(choices.into()),
                ..Self::default()
            }
        }
    }

    impl PresenterPrompt for ScriptedPrompt {
        fn ask(&self, title: &str, _year: &str) -> Result<PresenterAnswer> {
            self.asked.borrow_mut().push(title.to_string());
            Ok(self
                .answers
                .borrow_mut()
                .pop_front()
                .unwrap_or(PresenterAnswer::Skip))
        }
    }

    impl EpisodeChooser for ScriptedPrompt {
        fn choose(&self, title: &str, _candidates: &[String]) -> Result<Option<usize>> {
            self.asked.borrow_mut().push(title.to_string());
            Ok(self.choices.borrow_mut().pop_front().flatten())
        }
    }
}
