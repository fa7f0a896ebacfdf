//! Built-in inbound command registry.
//!
//! Inbound text is matched against a small fixed registry; anything the
//! registry does not recognize gets the default hint reply. Commands that
//! need daemon cooperation (contact refresh, restart) come back as actions
//! for the service loop instead of plain replies.

use chrono::Utc;

/// What the service loop should do with an inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Send this reply.
    Reply(String),
    /// Run an ad hoc reconciliation pass (still subject to the cooldown)
    /// and report the outcome.
    RefreshContacts,
    /// Publish `restarting` and exit cleanly for the supervisor to restart.
    Restart,
}

struct BuiltinCommand {
    name: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
}

const BUILTINS: &[BuiltinCommand] = &[
    BuiltinCommand {
        name: "help",
        aliases: &[],
        description: "List available commands",
    },
    BuiltinCommand {
        name: "info",
        aliases: &["about"],
        description: "Bot name and version",
    },
    BuiltinCommand {
        name: "ping",
        aliases: &[],
        description: "Liveness check",
    },
    BuiltinCommand {
        name: "time",
        aliases: &[],
        description: "Current server time",
    },
    BuiltinCommand {
        name: "refresh contacts",
        aliases: &["update contacts"],
        description: "Re-run contact discovery",
    },
];

/// Matches inbound text against the built-in registry.
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Resolve inbound text to an action. Matching is case-insensitive on
    /// the trimmed text.
    pub fn dispatch(&self, text: &str) -> CommandAction {
        let normalized = text.trim().to_lowercase();

        match normalized.as_str() {
            "help" => CommandAction::Reply(self.help_text()),
            "info" | "about" => CommandAction::Reply(format!(
                "courier bot v{}",
                env!("CARGO_PKG_VERSION")
            )),
            "ping" => CommandAction::Reply("pong".to_string()),
            "hi" | "hello" => {
                CommandAction::Reply("Hello! How can I help you today?".to_string())
            }
            "time" => CommandAction::Reply(format!(
                "Current time is: {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            )),
            "refresh contacts" | "update contacts" => CommandAction::RefreshContacts,
            "!restart bot now!" => CommandAction::Restart,
            _ => CommandAction::Reply(
                "I received your message. Send \"help\" to see available commands.".to_string(),
            ),
        }
    }

    fn help_text(&self) -> String {
        let mut lines = vec!["Available commands:".to_string()];
        for command in BUILTINS {
            if command.aliases.is_empty() {
                lines.push(format!("  {} - {}", command.name, command.description));
            } else {
                lines.push(format!(
                    "  {} ({}) - {}",
                    command.name,
                    command.aliases.join(", "),
                    command.description
                ));
            }
        }
        lines.join("\n")
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_commands_resolve() {
        let dispatcher = CommandDispatcher::new();
        assert_eq!(
            dispatcher.dispatch("ping"),
            CommandAction::Reply("pong".to_string())
        );
        assert_eq!(
            dispatcher.dispatch("Refresh Contacts"),
            CommandAction::RefreshContacts
        );
        assert_eq!(
            dispatcher.dispatch("update contacts"),
            CommandAction::RefreshContacts
        );
        assert_eq!(dispatcher.dispatch("!restart bot now!"), CommandAction::Restart);
    }

    #[test]
    fn matching_is_case_insensitive_and_trims() {
        let dispatcher = CommandDispatcher::new();
        assert_eq!(
            dispatcher.dispatch("  PING  "),
            CommandAction::Reply("pong".to_string())
        );
        match dispatcher.dispatch("HELLO") {
            CommandAction::Reply(text) => assert!(text.starts_with("Hello")),
            other => panic!("expected Reply, got {other:?}"),
        }
    }

    #[test]
    fn help_lists_every_builtin() {
        let dispatcher = CommandDispatcher::new();
        let CommandAction::Reply(help) = dispatcher.dispatch("help") else {
            panic!("expected Reply");
        };
        for command in BUILTINS {
            assert!(help.contains(command.name), "help missing {}", command.name);
        }
    }

    #[test]
    fn unknown_text_gets_the_default_hint() {
        let dispatcher = CommandDispatcher::new();
        let CommandAction::Reply(reply) = dispatcher.dispatch("what is the weather") else {
            panic!("expected Reply");
        };
        assert!(reply.contains("help"));
    }

    #[test]
    fn restart_requires_the_exact_phrase() {
        let dispatcher = CommandDispatcher::new();
        match dispatcher.dispatch("restart") {
            CommandAction::Reply(_) => {}
            other => panic!("bare 'restart' must not restart, got {other:?}"),
        }
    }
}
