#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use clap::Parser;
use eyre::{Context, Result};

use crate::config::{self, Configuration, load_configuration, lookup_config_path, resolve_path};
use crate::models::{Page, SessionContext};

#[derive(Debug, Parser)]
#[command(
    version,
    about,
    long_about = r#"Chat with the book marketing assistant from the terminal

Default configuration file location looks up in the following order:
    * $XDG_CONFIG_HOME/inkwell/config.toml
    * $HOME/.config/inkwell/config.toml
    * $HOME/.inkwell.toml
"#,
    disable_version_flag = true
)]
pub struct Command {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// User id, overrides `general.user_id`
    #[arg(short, long, value_name = "ID")]
    user: Option<String>,

    /// Continue this conversation instead of the latest one
    #[arg(long, value_name = "ID")]
    conversation: Option<String>,

    /// Marketing plan the conversation is about
    #[arg(long, value_name = "ID")]
    plan: Option<String>,

    /// Page hosting the chat, overrides `general.page`
    #[arg(long, value_enum)]
    page: Option<Page>,

    /// JSON file with the book brief sent along with every message
    #[arg(long, value_name = "PATH")]
    brief: Option<String>,

    /// Print the resolved conversation and exit
    #[arg(long, conflicts_with = "delete")]
    history: bool,

    /// Delete the resolved conversation and exit
    #[arg(long)]
    delete: bool,

    /// Show the version
    #[arg(short, long)]
    version: bool,
}

impl Command {
    pub fn new() -> Command {
        Self::parse()
    }

    pub fn get_config(&self) -> Result<Configuration> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| lookup_config_path().unwrap_or_default());

        if config_path.is_empty() {
            // No config path is specified just use the default config
            return Ok(Configuration::default());
        }
        Ok(load_configuration(config_path.as_str()).wrap_err("loading configuration")?)
    }

    /// Build the context of the chat surface from flags, falling back to
    /// the `[general]` section.
    pub fn session_context(&self, config: &Configuration) -> Result<SessionContext> {
        let mut context = SessionContext::new();

        if let Some(user_id) = self.user.as_deref().or(config.general.user_id.as_deref()) {
            context = context.with_user_id(user_id);
        }

        if let Some(conversation_id) = &self.conversation {
            context = context.with_conversation_id(conversation_id);
        }

        if let Some(plan_id) = &self.plan {
            context = context.with_marketing_plan_id(plan_id);
        }

        if let Some(page) = self.page.or(config.general.page) {
            context = context.with_page(page);
        }

        if let Some(path) = &self.brief {
            let path = resolve_path(path)?;
            let raw = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("reading book brief {}", path))?;
            let brief: serde_json::Value = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("parsing book brief {}", path))?;
            context = context.with_book_brief(brief);
        }

        Ok(context)
    }

    pub fn history(&self) -> bool {
        self.history
    }

    pub fn delete(&self) -> bool {
        self.delete
    }

    pub fn version(&self) -> bool {
        self.version
    }

    pub fn print_version(&self) {
        println!("{}", config::version())
    }
}
