//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Operator confirmation for destructive operations."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use parking_lot::Mutex;

/// Word an operator must type before a destructive bulk operation.
pub const PURGE_CONFIRMATION_WORD: &str = "PURGE";

/// Asks the operator before anything destructive happens.
pub trait Confirmer: Send + Sync {
    /// Yes/no question. `prompt` states what will be affected.
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool>;

    /// Require the operator to type `word` exactly.
    fn confirm_phrase(&self, prompt: &str, word: &str) -> anyhow::Result<bool>;
}

/// Answers every yes/no prompt the same way. A blanket answer never
/// satisfies a typed-word confirmation.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmer(pub bool);

impl Confirmer for StaticConfirmer {
    fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(self.0)
    }

    fn confirm_phrase(&self, _prompt: &str, _word: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Unattended runs: every yes/no prompt is accepted, a typed-word prompt
/// only when the operator supplied that exact word up front.
#[derive(Debug, Clone, Default)]
pub struct AssumeYes {
    phrase: Option<String>,
}

impl AssumeYes {
    pub fn new(phrase: Option<String>) -> Self {
        Self { phrase }
    }
}

impl Confirmer for AssumeYes {
    fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn confirm_phrase(&self, _prompt: &str, word: &str) -> anyhow::Result<bool> {
        Ok(self.phrase.as_deref() == Some(word))
    }
}

/// Replays scripted answers in order and keeps the prompts it saw.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<Vec<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        let mut answers: Vec<bool> = answers.into_iter().collect();
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next(&self, prompt: &str) -> bool {
        self.prompts.lock().push(prompt.to_owned());
        self.answers.lock().pop().unwrap_or(false)
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        Ok(self.next(prompt))
    }

    fn confirm_phrase(&self, prompt: &str, _word: &str) -> anyhow::Result<bool> {
        Ok(self.next(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_run_out_as_no() {
        let confirmer = ScriptedConfirmer::new([true]);
        assert!(confirmer.confirm("first").unwrap());
        assert!(!confirmer.confirm("second").unwrap());
        assert_eq!(confirmer.prompts(), vec!["first", "second"]);
    }

    #[test]
    fn blanket_yes_does_not_type_the_word() {
        assert!(StaticConfirmer(true).confirm("remove?").unwrap());
        assert!(!StaticConfirmer(true)
            .confirm_phrase("type it", PURGE_CONFIRMATION_WORD)
            .unwrap());
    }

    #[test]
    fn assume_yes_needs_the_exact_word() {
        let bare = AssumeYes::new(None);
        assert!(bare.confirm("remove?").unwrap());
        assert!(!bare.confirm_phrase("type it", PURGE_CONFIRMATION_WORD).unwrap());

        let wrong = AssumeYes::new(Some("purge".to_owned()));
        assert!(!wrong.confirm_phrase("type it", PURGE_CONFIRMATION_WORD).unwrap());

        let typed = AssumeYes::new(Some(PURGE_CONFIRMATION_WORD.to_owned()));
        assert!(typed.confirm_phrase("type it", PURGE_CONFIRMATION_WORD).unwrap());
    }
}
