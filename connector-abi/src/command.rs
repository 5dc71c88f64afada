#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub verb: Verb,
}

/// The fixed protocol command set. Each command carries the verb it must be
/// issued over; read commands over GET, everything else over POST.
pub const COMMANDS: [CommandSpec; 10] = [
    CommandSpec {
        name: "get_app_info",
        verb: Verb::Get,
    },
    CommandSpec {
        name: "get_function_info",
        verb: Verb::Get,
    },
    CommandSpec {
        name: "get_image",
        verb: Verb::Get,
    },
    CommandSpec {
        name: "process_trigger",
        verb: Verb::Post,
    },
    CommandSpec {
        name: "do_action",
        verb: Verb::Post,
    },
    CommandSpec {
        name: "authenticate_user",
        verb: Verb::Post,
    },
    CommandSpec {
        name: "begin_authenticate_user",
        verb: Verb::Post,
    },
    CommandSpec {
        name: "end_authenticate_user",
        verb: Verb::Post,
    },
    CommandSpec {
        name: "validate_form_data",
        verb: Verb::Post,
    },
    CommandSpec {
        name: "form_request",
        verb: Verb::Post,
    },
];

pub fn command_by_name(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|command| command.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_are_unique() {
        for (position, command) in COMMANDS.iter().enumerate() {
            assert!(
                !COMMANDS[position + 1..]
                    .iter()
                    .any(|other| other.name == command.name),
                "duplicate command name: {}",
                command.name
            );
        }
    }

    #[test]
    fn verb_table_matches_the_read_prefix_convention() {
        for command in COMMANDS {
            let expected = if command.name.starts_with("get_") {
                Verb::Get
            } else {
                Verb::Post
            };
            assert_eq!(command.verb, expected, "command {}", command.name);
        }
    }

    #[test]
    fn lookup_finds_registered_commands_only() {
        assert!(command_by_name("do_action").is_some());
        assert!(command_by_name("get_app_info").is_some());
        assert!(command_by_name("drop_tables").is_none());
    }
}
