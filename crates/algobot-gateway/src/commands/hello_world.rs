//! `/hello-world`: connectivity check.

use crate::error::BotError;

use super::{Command, CommandOptions, CommandReply, CommandSpec, InvocationContext};

pub struct HelloWorldCommand {
    spec: CommandSpec,
}

impl HelloWorldCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec {
                name: "hello-world".to_string(),
                description: "Returns \"Hello World!\"".to_string(),
                params: Vec::new(),
                deferred: false,
            },
        }
    }
}

impl Default for HelloWorldCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Command for HelloWorldCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn execute(
        &self,
        _options: CommandOptions,
        _ctx: &InvocationContext,
    ) -> Result<CommandReply, BotError> {
        Ok(CommandReply::ephemeral("Hello World!"))
    }
}
