//! Intent classification for captured input.
//!
//! Explicit invocations are always natural-language tasks. For failed
//! commands a pluggable [`IntentPolicy`] decides between a typo correction
//! and a natural-language task; when it cannot tell, the router falls back
//! to the natural-language path, which plans and confirms instead of
//! silently auto-running a guess.

use crate::session::{CapturedInput, Intent, IntentKind, Origin};
use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use tracing::{debug, info};

/// Words that rarely appear in a real command line but are everywhere in
/// English requests.
const FUNCTION_WORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "can", "could", "every", "everything", "for", "from",
    "how", "i", "in", "into", "is", "it", "me", "my", "of", "on", "please", "some", "that", "the",
    "these", "this", "those", "to", "what", "where", "which", "why", "with", "would", "you",
];

/// Shell builtins never show up in a PATH scan.
const BUILTINS: &[&str] = &[
    "alias", "bg", "cd", "command", "echo", "eval", "exec", "exit", "export", "fg", "history",
    "jobs", "printf", "pwd", "read", "set", "source", "type", "ulimit", "umask", "unalias",
    "unset", "wait",
];

/// Plain-word run length at which a line reads as a sentence.
const SENTENCE_WORDS: usize = 5;

/// Decision procedure for input that came from the not-found hook.
pub trait IntentPolicy: Send + Sync {
    /// Classifies non-empty, trimmed text.
    fn classify_failed(&self, text: &str) -> Intent;
}

/// Names of commands the user could have meant.
#[derive(Debug, Clone, Default)]
pub struct KnownCommands {
    names: BTreeSet<String>,
}

impl KnownCommands {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Executables on `$PATH` plus common shell builtins.
    pub fn from_path_env() -> Self {
        let mut names: BTreeSet<String> = BUILTINS.iter().map(|s| s.to_string()).collect();
        if let Some(path) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path) {
                let Ok(entries) = std::fs::read_dir(&dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let executable = entry
                        .metadata()
                        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                        .unwrap_or(false);
                    if executable {
                        names.insert(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
        }
        debug!("Indexed {} known commands", names.len());
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The single closest command within `max_distance`, or `None` when
    /// nothing is close enough or several candidates tie.
    pub fn closest(&self, word: &str, max_distance: usize) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        let mut tied = false;
        for name in &self.names {
            // Length difference is a lower bound on the distance.
            if name.len().abs_diff(word.len()) > max_distance {
                continue;
            }
            let d = edit_distance(word, name);
            if d == 0 || d > max_distance {
                continue;
            }
            match best {
                Some((_, bd)) if d > bd => {}
                Some((_, bd)) if d == bd => tied = true,
                _ => {
                    best = Some((name, d));
                    tied = false;
                }
            }
        }
        if tied { None } else { best.map(|(n, _)| n) }
    }
}

/// Edit distance counting adjacent transpositions as one edit
/// (optimal string alignment), so `gti` is one edit from `git`.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut d = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        d[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut v = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                v = v.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = v;
        }
    }
    d[n][m]
}

/// Default policy: English function words or a long run of plain words mean
/// natural language; a first word one or two edits away from exactly one
/// known command means a typo; anything else is ambiguous.
pub struct HeuristicPolicy {
    known: KnownCommands,
}

impl HeuristicPolicy {
    pub fn new(known: KnownCommands) -> Self {
        Self { known }
    }

    fn max_typo_distance(word: &str) -> usize {
        if word.chars().count() <= 4 { 1 } else { 2 }
    }

    fn reads_as_language(words: &[&str]) -> bool {
        if words.iter().any(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            FUNCTION_WORDS.contains(&w.as_str())
        }) {
            return true;
        }
        if words.last().is_some_and(|w| w.ends_with('?')) {
            return true;
        }
        let plain = words
            .iter()
            .filter(|w| w.chars().all(|c| c.is_alphabetic() || c == ',' || c == '.'))
            .count();
        plain >= SENTENCE_WORDS && plain == words.len()
    }
}

impl IntentPolicy for HeuristicPolicy {
    fn classify_failed(&self, text: &str) -> Intent {
        let words: Vec<&str> = text.split_whitespace().collect();

        if Self::reads_as_language(&words) {
            return Intent::new(IntentKind::NaturalLanguageTask, normalize_language(text));
        }

        let first = words[0];
        if let Some(candidate) = self.known.closest(first, Self::max_typo_distance(first)) {
            debug!("'{}' looks like a typo of '{}'", first, candidate);
            return Intent::new(IntentKind::TypoCorrection, text);
        }

        info!("Ambiguous input '{}', defaulting to natural-language task", text);
        Intent::ambiguous(IntentKind::NaturalLanguageTask, normalize_language(text))
    }
}

fn normalize_language(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct IntentRouter {
    policy: Box<dyn IntentPolicy>,
}

impl IntentRouter {
    pub fn new(policy: Box<dyn IntentPolicy>) -> Self {
        Self { policy }
    }

    /// Router using [`HeuristicPolicy`] over the commands on `$PATH`.
    pub fn from_path_env() -> Self {
        Self::new(Box::new(HeuristicPolicy::new(KnownCommands::from_path_env())))
    }

    pub fn classify(&self, input: &CapturedInput) -> Intent {
        let text = input.text().trim();
        if text.is_empty() {
            return Intent::new(IntentKind::Passthrough, "");
        }
        let intent = match input.origin() {
            Origin::ExplicitInvocation => {
                Intent::new(IntentKind::NaturalLanguageTask, normalize_language(text))
            }
            Origin::FailedCommand => self.policy.classify_failed(text),
        };
        info!("Classified {:?} input as {:?}", input.origin(), intent.kind);
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> IntentRouter {
        let known = KnownCommands::from_names([
            "ls", "git", "grep", "cat", "docker", "python3", "make", "cd", "echo",
        ]);
        IntentRouter::new(Box::new(HeuristicPolicy::new(known)))
    }

    #[test]
    fn test_edit_distance_counts_transposition_once() {
        assert_eq!(edit_distance("gti", "git"), 1);
        assert_eq!(edit_distance("list", "ls"), 2);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("docker", "docker"), 0);
    }

    #[test]
    fn test_explicit_invocation_is_always_natural_language() {
        let intent = router().classify(&CapturedInput::explicit("gti status"));
        assert_eq!(intent.kind, IntentKind::NaturalLanguageTask);
        assert!(!intent.ambiguous);
    }

    #[test]
    fn test_empty_input_is_passthrough() {
        let intent = router().classify(&CapturedInput::failed("   "));
        assert_eq!(intent.kind, IntentKind::Passthrough);
    }

    #[test]
    fn test_close_first_word_is_typo() {
        let intent = router().classify(&CapturedInput::failed("gti status"));
        assert_eq!(intent.kind, IntentKind::TypoCorrection);
        assert_eq!(intent.text, "gti status");
    }

    #[test]
    fn test_typo_keeps_quoting() {
        let intent = router().classify(&CapturedInput::failed("  grpe -r \"two  spaces\" src "));
        assert_eq!(intent.kind, IntentKind::TypoCorrection);
        assert_eq!(intent.text, "grpe -r \"two  spaces\" src");
    }

    #[test]
    fn test_list_files_is_ambiguous_natural_language() {
        let intent = router().classify(&CapturedInput::failed("list files"));
        assert_eq!(intent.kind, IntentKind::NaturalLanguageTask);
        assert!(intent.ambiguous);
        assert_eq!(intent.text, "list files");
    }

    #[test]
    fn test_function_words_mean_natural_language() {
        let intent = router().classify(&CapturedInput::failed("dockr   show me the containers"));
        assert_eq!(intent.kind, IntentKind::NaturalLanguageTask);
        assert!(!intent.ambiguous);
        assert_eq!(intent.text, "dockr show me the containers");
    }

    #[test]
    fn test_question_mark_means_natural_language() {
        let intent = router().classify(&CapturedInput::failed("disk usage?"));
        assert_eq!(intent.kind, IntentKind::NaturalLanguageTask);
        assert!(!intent.ambiguous);
    }

    #[test]
    fn test_tied_candidates_are_not_a_typo() {
        let known = KnownCommands::from_names(["cat", "cut"]);
        assert_eq!(known.closest("cot", 1), None);
        assert_eq!(known.closest("cta", 1), Some("cat"));
    }

    #[test]
    fn test_custom_policy_is_pluggable() {
        struct AlwaysTypo;
        impl IntentPolicy for AlwaysTypo {
            fn classify_failed(&self, text: &str) -> Intent {
                Intent::new(IntentKind::TypoCorrection, text)
            }
        }
        let router = IntentRouter::new(Box::new(AlwaysTypo));
        let intent = router.classify(&CapturedInput::failed("list files"));
        assert_eq!(intent.kind, IntentKind::TypoCorrection);
    }
}
