//! Yes/no/abort questions asked on behalf of the engine.
//!
//! The engine never talks to a terminal itself: anything that needs the
//! user's decision goes through a [`Prompt`] supplied by the caller.

/// Answer to a three-way question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// Stop the whole enclosing operation.
    Abort,
}

impl Answer {
    /// Parse a typed reply. Empty input selects `default`.
    pub fn parse(input: &str, default: Answer) -> Option<Answer> {
        match input.trim().to_ascii_lowercase().as_str() {
            "" => Some(default),
            "y" | "yes" => Some(Answer::Yes),
            "n" | "no" => Some(Answer::No),
            "q" | "a" | "abort" | "quit" => Some(Answer::Abort),
            _ => None,
        }
    }
}

/// Source of answers to questions raised during an operation.
pub trait Prompt {
    fn ask(&mut self, question: &str, default: Answer) -> Answer;
}

/// Answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub Answer);

impl Prompt for FixedAnswer {
    fn ask(&mut self, question: &str, _default: Answer) -> Answer {
        tracing::debug!(question, answer = ?self.0, "Answered automatically");
        self.0
    }
}

/// Takes each question's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAnswer;

impl Prompt for DefaultAnswer {
    fn ask(&mut self, _question: &str, default: Answer) -> Answer {
        default
    }
}

impl<F> Prompt for F
where
    F: FnMut(&str, Answer) -> Answer,
{
    fn ask(&mut self, question: &str, default: Answer) -> Answer {
        self(question, default)
    }
}
