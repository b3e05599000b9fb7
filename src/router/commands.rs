//! Prefixed command handlers.
//!
//! Built-ins cover registration and integration session control. Other
//! commands plug in through [`CommandHandler`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::classify::Command;
use super::config::RouterConfig;
use crate::governor::{GovernorError, SessionGovernor, SessionState, Tier};
use crate::store::Remaining;
use crate::transport::InboundMessage;

/// What a handler gets to work with
pub struct CommandContext<'a> {
    pub message: &'a InboundMessage,
    pub command: &'a Command,
    pub governor: &'a SessionGovernor,
    pub config: &'a RouterConfig,
    pub registry: &'a CommandRegistry,
}

impl CommandContext<'_> {
    pub fn identity(&self) -> &str {
        self.message.identity()
    }

    pub fn is_group(&self) -> bool {
        self.message.is_group
    }

    /// Command name with the primary marker, for hints
    pub fn usage(&self, rest: &str) -> String {
        format!("{}{}", self.config.command_prefix, rest)
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Token after the marker, lower case
    fn name(&self) -> &str;

    /// One help line, without the marker
    fn usage(&self) -> &str;

    fn allowed_in_groups(&self) -> bool {
        false
    }

    fn requires_registration(&self) -> bool {
        true
    }

    /// Reply text. Governor errors are turned into their user message by the router.
    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<String>;
}

/// Handlers by name
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RegisterCommand));
        registry.register(Arc::new(HelpCommand));
        registry.register(Arc::new(StatusCommand));
        registry.register(Arc::new(PingCommand));
        registry.register(Arc::new(AiCommand));
        registry
    }

    /// Add or replace a handler
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.name().to_lowercase(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CommandHandler>> {
        self.handlers.values()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub struct RegisterCommand;

#[async_trait]
impl CommandHandler for RegisterCommand {
    fn name(&self) -> &str {
        "register"
    }

    fn usage(&self) -> &str {
        "register - Register as a new user"
    }

    fn requires_registration(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<String> {
        let user = ctx.governor.register(ctx.identity()).await?;
        let mut text = format!(
            "✅ Registration successful!\n\nIdentity: {}\nYou can now use all bot features.",
            user.identity
        );
        if user.is_admin {
            text.push_str("\nRole: Administrator");
        }
        Ok(text)
    }
}

pub struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn usage(&self) -> &str {
        "help - Show this help menu"
    }

    fn allowed_in_groups(&self) -> bool {
        true
    }

    fn requires_registration(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<String> {
        let prefix = &ctx.config.command_prefix;
        let mut text = String::from("*Bot Commands*\n");

        for handler in ctx.registry.iter() {
            if ctx.is_group() && !handler.allowed_in_groups() {
                continue;
            }
            text.push_str(&format!("\n{}{}", prefix, handler.usage()));
        }

        if ctx.governor.is_admin(ctx.identity()).await? {
            text.push_str("\n\n*Admin Commands*\n");
            if ctx.is_group() {
                text.push_str(&format!(
                    "\n{}ai premium group - Upgrade this group's activator to premium",
                    prefix
                ));
            } else {
                text.push_str(&format!(
                    "\n{}ai premium [identity] [limit] - Upgrade a user to premium",
                    prefix
                ));
                text.push_str(&format!(
                    "\n{}ai premium group [group] - Upgrade a group's activator to premium",
                    prefix
                ));
            }
        }
        Ok(text)
    }
}

pub struct StatusCommand;

#[async_trait]
impl CommandHandler for StatusCommand {
    fn name(&self) -> &str {
        "status"
    }

    fn usage(&self) -> &str {
        "status - Check your registration status"
    }

    fn requires_registration(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<String> {
        let Some(user) = ctx.governor.find_user(ctx.identity()).await? else {
            return Ok(format!(
                "❌ You are not registered yet!\nUse {} to register.",
                ctx.usage("register")
            ));
        };

        let mut text = format!(
            "👤 *User Information*\n\nIdentity: {}\nRegistered: Yes\nRegistration date: {}",
            user.identity,
            user.registered_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        );
        if ctx.governor.is_admin(ctx.identity()).await? {
            text.push_str("\nRole: Administrator");
        }
        Ok(text)
    }
}

pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    fn name(&self) -> &str {
        "ping"
    }

    fn usage(&self) -> &str {
        "ping - Test bot response"
    }

    fn requires_registration(&self) -> bool {
        false
    }

    async fn handle(&self, _ctx: &CommandContext<'_>) -> Result<String> {
        Ok("🏓 Pong!".to_string())
    }
}

/// `ai activate | deactivate | status | premium`
pub struct AiCommand;

impl AiCommand {
    async fn activate(&self, ctx: &CommandContext<'_>) -> Result<String> {
        let governor = ctx.governor;
        if ctx.is_group() {
            let activation = governor
                .activate_for_group(&ctx.message.chat_id, ctx.identity())
                .await?;
            let expiry = format_expiry(activation.session.session_expiry);
            return Ok(format!(
                "🔌 *Integration activated for this group*\n\nSession expires: {}\n\
                 Each member uses their own daily limit.\nJust type normally without commands.",
                expiry
            ));
        }

        let activation = governor
            .activate(ctx.identity(), Default::default())
            .await?;
        let session = activation.session;
        let title = if activation.refreshed {
            "🔌 *Integration session refreshed*"
        } else {
            "🔌 *Integration activated*"
        };
        Ok(format!(
            "{}\n\nSession expires: {}\nDaily limit: {}\nUsed today: {}\n\
             Just type normally without commands.",
            title,
            format_expiry(session.session_expiry),
            format_limit(session.is_unlimited, session.daily_limit),
            session.usage_count
        ))
    }

    async fn deactivate(&self, ctx: &CommandContext<'_>) -> Result<String> {
        if ctx.is_group() {
            ctx.governor
                .deactivate_for_group(&ctx.message.chat_id, ctx.identity())
                .await?;
            return Ok(
                "🔌 *Integration deactivated for this group*\n\nUse commands with a prefix again."
                    .to_string(),
            );
        }

        ctx.governor.deactivate(ctx.identity()).await?;
        Ok("🔌 *Integration deactivated*\n\nUse commands with a prefix again.".to_string())
    }

    async fn status(&self, ctx: &CommandContext<'_>) -> Result<String> {
        if ctx.is_group() {
            let status = ctx.governor.status_for_group(&ctx.message.chat_id).await?;
            let mut text = format!(
                "🔌 *Integration status for this group*\n\nStatus: {}\nPremium: {}",
                state_label(status.state),
                yes_no(status.activator_premium)
            );
            if let Some(minutes) = status.session_minutes_left {
                text.push_str(&format!("\nSession: {} minutes left", minutes));
            }
            if let Some(activator) = status.activated_by {
                text.push_str(&format!("\nActivated by: {}", activator));
            }
            text.push_str("\nAll members use their individual limits.");
            return Ok(text);
        }

        let status = ctx.governor.status_for_user(ctx.identity()).await?;
        let premium = match status.tier {
            Tier::Owner => "Yes (Owner)",
            Tier::Premium => "Yes",
            Tier::Standard => "No",
        };
        let mut text = format!(
            "🔌 *Integration status*\n\nStatus: {}\nPremium: {}",
            state_label(status.state),
            premium
        );
        if let Some(minutes) = status.session_minutes_left {
            text.push_str(&format!("\nSession: {} minutes left", minutes));
        }
        if status.state != SessionState::NotConfigured {
            let limit = match status.daily_limit {
                Some(limit) => limit.to_string(),
                None => "Unlimited".to_string(),
            };
            text.push_str(&format!(
                "\nDaily limit: {}\nUsed today: {}\nRemaining: {}",
                limit, status.usage_count, status.remaining
            ));
        }
        Ok(text)
    }

    async fn premium(&self, ctx: &CommandContext<'_>) -> Result<String> {
        if !ctx.governor.is_admin(ctx.identity()).await? {
            warn!(identity = ctx.identity(), "Unauthorized premium command");
            return Ok("❌ You are not authorized to use premium commands.".to_string());
        }

        let target = ctx.command.arg(1);
        if target == Some("group") {
            let group_key = match (ctx.is_group(), ctx.command.arg(2)) {
                (true, _) => ctx.message.chat_id.as_str(),
                (false, Some(key)) => key,
                (false, None) => return Ok(self.premium_usage(ctx)),
            };
            let session = ctx.governor.upgrade_group_to_premium(group_key).await?;
            info!(group_key, activator = %session.identity, "Group activator upgraded");
            return Ok(format!(
                "🔌 *Group activator upgraded to premium*\n\nGroup: {}\nActivator: {}\n\
                 Group members keep their individual limits.",
                group_key, session.identity
            ));
        }

        let (Some(target), false) = (target, ctx.is_group()) else {
            return Ok(self.premium_usage(ctx));
        };
        let limit = match ctx.command.arg(2).map(str::parse::<u32>) {
            None => None,
            Some(Ok(limit)) if limit > 0 => Some(limit),
            Some(_) => return Ok(self.premium_usage(ctx)),
        };

        let session = ctx.governor.upgrade_to_premium(target, limit).await?;
        Ok(format!(
            "🔌 *User upgraded to premium*\n\nIdentity: {}\nNew daily limit: {}",
            target,
            format_limit(session.is_unlimited, session.daily_limit)
        ))
    }

    fn premium_usage(&self, ctx: &CommandContext<'_>) -> String {
        if ctx.is_group() {
            format!("❌ Use: {}", ctx.usage("ai premium group"))
        } else {
            format!(
                "❌ Use: {} or {}",
                ctx.usage("ai premium [identity] [limit]"),
                ctx.usage("ai premium group [group]")
            )
        }
    }
}

#[async_trait]
impl CommandHandler for AiCommand {
    fn name(&self) -> &str {
        "ai"
    }

    fn usage(&self) -> &str {
        "ai [activate|deactivate|status] - Control the integration session"
    }

    fn allowed_in_groups(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<String> {
        let sub = ctx.command.arg(0).map(str::to_lowercase);
        match sub.as_deref() {
            Some("activate") => self.activate(ctx).await,
            Some("deactivate") => self.deactivate(ctx).await,
            Some("status") => self.status(ctx).await,
            Some("premium") => self.premium(ctx).await,
            None => Ok(format!(
                "❌ Invalid ai command. Use: {}",
                ctx.usage("ai [activate|deactivate|status]")
            )),
            Some(_) => Ok(
                "❌ Unknown ai command. Available commands: activate, deactivate, status"
                    .to_string(),
            ),
        }
    }
}

/// Reply text for a failed handler
pub fn error_reply(err: &anyhow::Error) -> String {
    match err.downcast_ref::<GovernorError>() {
        Some(e) => format!("❌ {}", e.user_message()),
        None => "❌ An error occurred while processing your command. Please try again later."
            .to_string(),
    }
}

fn format_expiry(expiry: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match expiry {
        Some(at) => format!("at {}", at.with_timezone(&Local).format("%H:%M")),
        None => "not set".to_string(),
    }
}

fn format_limit(unlimited: bool, limit: u32) -> String {
    if unlimited {
        Remaining::Unlimited.to_string()
    } else {
        format!("{} requests", limit)
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::NotConfigured => "Not configured",
        SessionState::Active => "Active",
        SessionState::Inactive => "Inactive",
        SessionState::Expired => "Expired",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::GovernorConfig;
    use crate::router::classify::{classify, Classified};
    use crate::store::MemoryStore;

    fn governor() -> SessionGovernor {
        SessionGovernor::new(
            Arc::new(MemoryStore::new()),
            GovernorConfig::default().with_owner("owner"),
        )
    }

    fn parse(body: &str) -> Command {
        match classify(body, &RouterConfig::default()) {
            Classified::Prefixed(cmd) => cmd,
            other => panic!("not a command: {:?}", other),
        }
    }

    async fn run(governor: &SessionGovernor, message: InboundMessage) -> Result<String> {
        let config = RouterConfig::default();
        let registry = CommandRegistry::with_builtins();
        let command = parse(&message.body);
        let handler = registry.get(&command.name).expect("handler");
        let ctx = CommandContext {
            message: &message,
            command: &command,
            governor,
            config: &config,
            registry: &registry,
        };
        handler.handle(&ctx).await
    }

    #[test]
    fn test_registry_builtins() {
        let registry = CommandRegistry::with_builtins();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("ai").unwrap().allowed_in_groups());
        assert!(!registry.get("register").unwrap().requires_registration());
        assert!(!registry.get("ping").unwrap().requires_registration());
        assert!(registry.get("note").is_none());
    }

    #[tokio::test]
    async fn test_register_then_already_registered() {
        let governor = governor();
        let text = run(&governor, InboundMessage::direct("6281@c.us", "!register"))
            .await
            .unwrap();
        assert!(text.contains("Registration successful"));

        let err = run(&governor, InboundMessage::direct("6281@c.us", "!register"))
            .await
            .unwrap_err();
        assert!(error_reply(&err).contains("already registered"));
    }

    #[tokio::test]
    async fn test_ai_activate_and_status() {
        let governor = governor();
        governor.register("6281").await.unwrap();

        let text = run(&governor, InboundMessage::direct("6281", "!ai activate"))
            .await
            .unwrap();
        assert!(text.contains("Integration activated"));
        assert!(text.contains("50 requests"));

        let text = run(&governor, InboundMessage::direct("6281", "!ai activate"))
            .await
            .unwrap();
        assert!(text.contains("refreshed"));

        let text = run(&governor, InboundMessage::direct("6281", "!ai status"))
            .await
            .unwrap();
        assert!(text.contains("Status: Active"));
        assert!(text.contains("Remaining: 50"));
    }

    #[tokio::test]
    async fn test_ai_deactivate_when_inactive() {
        let governor = governor();
        governor.register("6281").await.unwrap();

        let err = run(&governor, InboundMessage::direct("6281", "!ai deactivate"))
            .await
            .unwrap_err();
        assert!(error_reply(&err).contains("not currently active"));
    }

    #[tokio::test]
    async fn test_ai_group_commands() {
        let governor = governor();
        governor.register("6281").await.unwrap();

        let text = run(&governor, InboundMessage::group("g1", "6281", "!ai activate"))
            .await
            .unwrap();
        assert!(text.contains("for this group"));

        let text = run(&governor, InboundMessage::group("g1", "6282", "!ai status"))
            .await
            .unwrap();
        assert!(text.contains("Activated by: 6281"));
    }

    #[tokio::test]
    async fn test_premium_requires_admin() {
        let governor = governor();
        governor.register("6281").await.unwrap();

        let text = run(&governor, InboundMessage::direct("6281", "!ai premium 6281"))
            .await
            .unwrap();
        assert!(text.contains("not authorized"));
    }

    #[tokio::test]
    async fn test_premium_by_owner() {
        let governor = governor();
        governor.register("6281").await.unwrap();

        let text = run(&governor, InboundMessage::direct("owner", "!ai premium 6281 300"))
            .await
            .unwrap();
        assert!(text.contains("300 requests"));

        let text = run(&governor, InboundMessage::direct("owner", "!ai premium 6281 lots"))
            .await
            .unwrap();
        assert!(text.starts_with("❌ Use:"));
    }

    #[tokio::test]
    async fn test_help_shows_admin_section_for_owner() {
        let governor = governor();
        let text = run(&governor, InboundMessage::direct("6281", "!help"))
            .await
            .unwrap();
        assert!(text.contains("!register"));
        assert!(!text.contains("Admin Commands"));

        let text = run(&governor, InboundMessage::direct("owner", "!help"))
            .await
            .unwrap();
        assert!(text.contains("Admin Commands"));

        let text = run(&governor, InboundMessage::group("g1", "6281", "!help"))
            .await
            .unwrap();
        assert!(!text.contains("!register"));
        assert!(text.contains("!ai"));
    }

    #[test]
    fn test_error_reply_fallback() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(error_reply(&err).contains("try again later"));
    }
}
