//! Message classification: prefixed command or free-form text.

use super::config::RouterConfig;

/// A prefixed command split into its token and arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lower-cased token after the marker. Also the rate-limit class.
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified<'a> {
    Empty,
    Prefixed(Command),
    Freeform(&'a str),
}

/// Classify before any session or rate-limit lookup
pub fn classify<'a>(body: &'a str, config: &RouterConfig) -> Classified<'a> {
    let body = body.trim();
    if body.is_empty() {
        return Classified::Empty;
    }

    let Some(rest) = config.strip_prefix(body) else {
        return Classified::Freeform(body);
    };

    let mut words = rest.split_whitespace();
    // A bare marker yields an empty token, handled as an unknown command
    let name = if rest.starts_with(char::is_whitespace) {
        String::new()
    } else {
        words.next().unwrap_or_default().to_lowercase()
    };

    Classified::Prefixed(Command {
        name,
        args: words.map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouterConfig {
        RouterConfig::default()
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(classify("", &config()), Classified::Empty);
        assert_eq!(classify("  \n\t ", &config()), Classified::Empty);
    }

    #[test]
    fn test_freeform() {
        assert_eq!(
            classify("what's the weather?", &config()),
            Classified::Freeform("what's the weather?")
        );
        // Looks like a command but has no marker
        assert_eq!(classify("help", &config()), Classified::Freeform("help"));
    }

    #[test]
    fn test_prefixed() {
        let Classified::Prefixed(cmd) = classify("!AI activate now", &config()) else {
            panic!("expected command");
        };
        assert_eq!(cmd.name, "ai");
        assert_eq!(cmd.args, vec!["activate", "now"]);
        assert_eq!(cmd.arg(0), Some("activate"));
        assert_eq!(cmd.arg(5), None);

        let Classified::Prefixed(cmd) = classify("/note list", &config()) else {
            panic!("expected command");
        };
        assert_eq!(cmd.name, "note");
    }

    #[test]
    fn test_bare_marker() {
        let Classified::Prefixed(cmd) = classify("!", &config()) else {
            panic!("expected command");
        };
        assert!(cmd.name.is_empty());

        let Classified::Prefixed(cmd) = classify("! help", &config()) else {
            panic!("expected command");
        };
        assert!(cmd.name.is_empty());
        assert_eq!(cmd.args, vec!["help"]);
    }

    #[test]
    fn test_leading_whitespace_is_ignored() {
        assert!(matches!(
            classify("   !help", &config()),
            Classified::Prefixed(Command { ref name, .. }) if name == "help"
        ));
    }
}
