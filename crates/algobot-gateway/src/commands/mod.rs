//! Command registry: the fixed set of slash commands, their declared
//! parameters, option validation, and routing to handlers.

pub mod hello_world;
pub mod post_algo;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BotError;

pub use hello_world::HelloWorldCommand;
pub use post_algo::PostAlgoCommand;

/// Type of a declared command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

/// A declared command parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub kind: ParamType,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: &str, description: &str, kind: ParamType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str, kind: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, description, kind)
        }
    }
}

/// Name, description, and ordered parameters of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Acknowledge the interaction (ephemerally) before the handler runs.
    /// Set for commands whose handler may outlast the platform's reply deadline.
    #[serde(default)]
    pub deferred: bool,
}

/// A validated, typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

/// Typed option bag handed to a command handler.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    values: HashMap<String, OptionValue>,
}

impl CommandOptions {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// A required string option. Validation guarantees presence for declared
    /// required parameters, so a miss here is reported as invalid input.
    pub fn require_str(&self, name: &str) -> Result<&str, BotError> {
        self.get_str(name)
            .ok_or_else(|| BotError::invalid_option(name, "required option is missing"))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Who invoked a command, from where, and on which day.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub interaction_id: u64,
    pub member_id: u64,
    pub member_name: String,
    pub channel_id: u64,
    /// Calendar date of the invocation in the configured zone.
    pub today: NaiveDate,
}

/// The single reply a dispatch produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub text: String,
    pub ephemeral: bool,
}

impl CommandReply {
    pub fn public(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: true,
        }
    }
}

/// A slash command handler.
#[async_trait::async_trait]
pub trait Command: Send + Sync {
    /// Declared shape of the command.
    fn spec(&self) -> &CommandSpec;

    /// Run the command with validated options.
    async fn execute(
        &self,
        options: CommandOptions,
        ctx: &InvocationContext,
    ) -> Result<CommandReply, BotError>;
}

/// Name → handler map. Built once at startup, then shared read-only.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Names are unique.
    pub fn register(&mut self, command: Arc<dyn Command>) -> Result<(), BotError> {
        let name = command.spec().name.clone();
        if self.commands.contains_key(&name) {
            return Err(BotError::DuplicateCommand(name));
        }
        tracing::debug!(command = %name, "Registering command");
        self.commands.insert(name, command);
        Ok(())
    }

    /// Declared specs, sorted by name.
    pub fn specs(&self) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = self
            .commands
            .values()
            .map(|c| c.spec().clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Look up, validate, and run a command.
    pub async fn dispatch(
        &self,
        name: &str,
        provided: &HashMap<String, String>,
        ctx: &InvocationContext,
    ) -> Result<CommandReply, BotError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| BotError::UnknownCommand(name.to_string()))?;
        let options = validate_options(command.spec(), provided)?;
        command.execute(options, ctx).await
    }
}

/// Check `provided` against the declared parameters and convert to typed values.
pub fn validate_options(
    spec: &CommandSpec,
    provided: &HashMap<String, String>,
) -> Result<CommandOptions, BotError> {
    if let Some(unexpected) = provided
        .keys()
        .find(|key| !spec.params.iter().any(|p| &p.name == *key))
    {
        return Err(BotError::invalid_option(
            unexpected.as_str(),
            format!("not a parameter of /{}", spec.name),
        ));
    }

    let mut values = HashMap::new();
    for param in &spec.params {
        let raw = match provided.get(&param.name) {
            Some(s) if !s.trim().is_empty() => s.as_str(),
            _ if param.required => {
                return Err(BotError::invalid_option(
                    &param.name,
                    "required option is missing",
                ));
            }
            _ => continue,
        };

        let value = match param.kind {
            ParamType::String => OptionValue::String(raw.to_string()),
            ParamType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(OptionValue::Integer)
                .map_err(|_| BotError::invalid_option(&param.name, "expected an integer"))?,
            ParamType::Boolean => raw
                .trim()
                .parse::<bool>()
                .map(OptionValue::Boolean)
                .map_err(|_| BotError::invalid_option(&param.name, "expected true or false"))?,
        };
        values.insert(param.name.clone(), value);
    }

    Ok(CommandOptions { values })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCommand {
        spec: CommandSpec,
    }

    impl EchoCommand {
        fn new(name: &str) -> Self {
            Self {
                spec: CommandSpec {
                    name: name.to_string(),
                    description: "Echo a word".into(),
                    params: vec![
                        ParamSpec::required("word", "Word to echo", ParamType::String),
                        ParamSpec::optional("times", "Repeat count", ParamType::Integer),
                    ],
                    deferred: false,
                },
            }
        }
    }

    #[async_trait::async_trait]
    impl Command for EchoCommand {
        fn spec(&self) -> &CommandSpec {
            &self.spec
        }

        async fn execute(
            &self,
            options: CommandOptions,
            _ctx: &InvocationContext,
        ) -> Result<CommandReply, BotError> {
            let word = options.require_str("word")?;
            let times = match options.get("times") {
                Some(OptionValue::Integer(n)) => *n as usize,
                _ => 1,
            };
            Ok(CommandReply::public(word.repeat(times)))
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext {
            interaction_id: 1,
            member_id: 2,
            member_name: "Alice".into(),
            channel_id: 3,
            today: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        }
    }

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoCommand::new("echo"))).unwrap();
        let err = registry
            .register(Arc::new(EchoCommand::new("echo")))
            .unwrap_err();
        assert!(matches!(err, BotError::DuplicateCommand(ref n) if n == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_specs_sorted() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoCommand::new("zeta"))).unwrap();
        registry.register(Arc::new(EchoCommand::new("alpha"))).unwrap();
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command() {
        let registry = CommandRegistry::new();
        let err = registry
            .dispatch("missing", &HashMap::new(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::UnknownCommand(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn test_dispatch_valid() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoCommand::new("echo"))).unwrap();
        let reply = registry
            .dispatch("echo", &opts(&[("word", "hi"), ("times", "3")]), &ctx())
            .await
            .unwrap();
        assert_eq!(reply.text, "hihihi");
    }

    #[tokio::test]
    async fn test_dispatch_missing_required() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoCommand::new("echo"))).unwrap();
        let err = registry
            .dispatch("echo", &opts(&[("times", "3")]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidOptions { ref option, .. } if option == "word"));
    }

    #[test]
    fn test_validate_blank_required_is_missing() {
        let spec = EchoCommand::new("echo").spec;
        let err = validate_options(&spec, &opts(&[("word", "   ")])).unwrap_err();
        assert!(matches!(err, BotError::InvalidOptions { ref option, .. } if option == "word"));
    }

    #[test]
    fn test_validate_malformed_integer() {
        let spec = EchoCommand::new("echo").spec;
        let err = validate_options(&spec, &opts(&[("word", "x"), ("times", "many")])).unwrap_err();
        assert!(matches!(err, BotError::InvalidOptions { ref option, .. } if option == "times"));
    }

    #[test]
    fn test_validate_unexpected_option() {
        let spec = EchoCommand::new("echo").spec;
        let err = validate_options(&spec, &opts(&[("word", "x"), ("color", "red")])).unwrap_err();
        assert!(matches!(err, BotError::InvalidOptions { ref option, .. } if option == "color"));
    }

    #[test]
    fn test_validate_optional_absent() {
        let spec = EchoCommand::new("echo").spec;
        let options = validate_options(&spec, &opts(&[("word", "x")])).unwrap();
        assert_eq!(options.len(), 1);
        assert!(options.get("times").is_none());
    }

    #[test]
    fn test_validate_keeps_string_verbatim() {
        let spec = EchoCommand::new("echo").spec;
        let options =
            validate_options(&spec, &opts(&[("word", "    indented\n"), ("times", " 2 ")])).unwrap();
        assert_eq!(options.require_str("word").unwrap(), "    indented\n");
        assert_eq!(options.get("times"), Some(&OptionValue::Integer(2)));
    }
}
