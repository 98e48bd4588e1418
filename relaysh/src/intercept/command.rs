//! Classification of the text typed after a prompt.

use std::fmt;

use indexmap::IndexMap;

/// The two in-session transfer commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferVerb {
    /// Download a remote file.
    Get,
    /// Upload a local file.
    Put,
}

impl TransferVerb {
    /// The word the user types.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
        }
    }

    /// Status message announced before the transfer starts.
    pub fn announce(self, from: &str, to: &str) -> String {
        match self {
            Self::Get => format!("Downloading from {} to {}", from, to),
            Self::Put => format!("Uploading from {} to {}", from, to),
        }
    }
}

impl fmt::Display for TransferVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized transfer command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub verb: TransferVerb,
    pub source: String,
    pub destination: Option<String>,
}

/// A transfer command in flight, with the remote directory the prompt
/// showed when it was typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: ParsedCommand,
    pub remote_directory: String,
}

impl PendingCommand {
    pub fn verb(&self) -> TransferVerb {
        self.command.verb
    }
}

/// Matches command lines against the registered verbs.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    verbs: IndexMap<String, TransferVerb>,
}

impl CommandClassifier {
    /// Create a classifier with no verbs registered.
    pub fn empty() -> Self {
        Self {
            verbs: IndexMap::new(),
        }
    }

    /// Register a verb under its own name.
    pub fn with_verb(mut self, verb: TransferVerb) -> Self {
        self.verbs.insert(verb.as_str().to_string(), verb);
        self
    }

    /// Names of the registered verbs, in registration order.
    pub fn verbs(&self) -> impl Iterator<Item = &str> {
        self.verbs.keys().map(String::as_str)
    }

    /// Classify the text typed after a prompt.
    ///
    /// Returns `None` when the first word is not exactly a registered verb,
    /// or when no source argument follows it.
    pub fn classify(&self, command_line: &str) -> Option<ParsedCommand> {
        let mut tokens = command_line.split_whitespace();
        let verb = *self.verbs.get(tokens.next()?)?;
        let source = tokens.next()?.to_string();
        let destination = tokens.next().map(str::to_string);

        Some(ParsedCommand {
            verb,
            source,
            destination,
        })
    }
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::empty()
            .with_verb(TransferVerb::Get)
            .with_verb(TransferVerb::Put)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_with_source_only() {
        let parsed = CommandClassifier::default().classify("get report.txt").unwrap();
        assert_eq!(parsed.verb, TransferVerb::Get);
        assert_eq!(parsed.source, "report.txt");
        assert_eq!(parsed.destination, None);
    }

    #[test]
    fn test_put_with_destination_and_extra_spaces() {
        let parsed = CommandClassifier::default()
            .classify("  put   app.log\tremote-app.log  ")
            .unwrap();
        assert_eq!(parsed.verb, TransferVerb::Put);
        assert_eq!(parsed.source, "app.log");
        assert_eq!(parsed.destination.as_deref(), Some("remote-app.log"));
    }

    #[test]
    fn test_trailing_tokens_are_ignored() {
        let parsed = CommandClassifier::default().classify("get a b c").unwrap();
        assert_eq!(parsed.destination.as_deref(), Some("b"));
    }

    #[test]
    fn test_prefix_verbs_are_rejected() {
        let classifier = CommandClassifier::default();
        assert!(classifier.classify("getfacl file").is_none());
        assert!(classifier.classify("putty host").is_none());
        assert!(classifier.classify("ge file").is_none());
        assert!(classifier.classify("GET file").is_none());
    }

    #[test]
    fn test_other_commands_are_not_transfers() {
        let classifier = CommandClassifier::default();
        assert!(classifier.classify("ls -la").is_none());
        assert!(classifier.classify("").is_none());
        assert!(classifier.classify("   ").is_none());
    }

    #[test]
    fn test_verb_without_source() {
        assert!(CommandClassifier::default().classify("get").is_none());
    }

    #[test]
    fn test_only_registered_verbs_match() {
        let classifier = CommandClassifier::empty().with_verb(TransferVerb::Put);
        assert!(classifier.classify("get file").is_none());
        assert!(classifier.classify("put file").is_some());
        assert_eq!(classifier.verbs().collect::<Vec<_>>(), vec!["put"]);
    }

    #[test]
    fn test_announce_formats() {
        assert_eq!(
            TransferVerb::Get.announce("/srv/a.txt", "./a.txt"),
            "Downloading from /srv/a.txt to ./a.txt"
        );
        assert_eq!(
            TransferVerb::Put.announce("a.txt", "./a.txt"),
            "Uploading from a.txt to ./a.txt"
        );
    }
}
