//! Slash command publication.

use serenity::all::{CommandOptionType, CreateCommand, CreateCommandOption};

use algobot_gateway::commands::ParamType;
use algobot_gateway::CommandSpec;

fn option_type(kind: ParamType) -> CommandOptionType {
    match kind {
        ParamType::String => CommandOptionType::String,
        ParamType::Integer => CommandOptionType::Integer,
        ParamType::Boolean => CommandOptionType::Boolean,
    }
}

/// Build the guild command definition for a registered command.
pub fn to_create_command(spec: &CommandSpec) -> CreateCommand {
    spec.params.iter().fold(
        CreateCommand::new(&spec.name).description(&spec.description),
        |command, param| {
            command.add_option(
                CreateCommandOption::new(option_type(param.kind), &param.name, &param.description)
                    .required(param.required),
            )
        },
    )
}
