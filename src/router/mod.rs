//! Message Router
//!
//! Decides for every inbound message whether it goes to the integration
//! pass-through or to prefixed command dispatch.
//!
//! ```text
//! inbound ─► broadcast / self-echo / empty ─────────────► dropped
//!        │
//!        ├─► free-form, direct ─► is_active(sender) ─────► pass-through
//!        │                              └─ inactive ─────► dropped
//!        ├─► free-form, group ──► is_active_for_group ───► pass-through
//!        │                              └─ inactive ─────► dropped
//!        └─► prefixed ─► rate limiter ─► command handler
//! ```
//!
//! Free-form text never reaches the command parser. An active session takes
//! everything without a marker, even text that reads like a command.

pub mod classify;
pub mod commands;
pub mod config;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::governor::{
    ActivateOptions, Activity, GovernorError, InactiveReason, SessionGovernor, UsageAccountant,
};
use crate::integration::{IntegrationPayload, IntegrationSink};
use crate::metrics::{MESSAGES_ROUTED_TOTAL, QUOTA_REJECTIONS_TOTAL};
use crate::rate_limit::RateLimiter;
use crate::store::Remaining;
use crate::transport::{InboundMessage, MessagingClient};

pub use classify::{classify, Classified, Command};
pub use commands::{CommandContext, CommandHandler, CommandRegistry};
pub use config::RouterConfig;

/// Where a message ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    Routed(Route),
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Forwarded to the integration and charged to the sender
    PassThrough { remaining: Remaining, replied: bool },
    /// The governor or the sink refused; the sender was told why
    Rejected { reason: &'static str },
    /// The rate limiter stopped a command
    RateLimited { command_class: String, wait_secs: u64 },
    /// A handler ran
    Command { name: String },
    /// No handler for the token, or not allowed here
    UnknownCommand { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Broadcast,
    SelfEcho,
    Empty,
    /// Direct free-form text without an active session
    NoActiveSession,
    /// Group free-form text while the group session is off
    GroupInactive,
}

impl Routing {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Routing::Routed(Route::PassThrough { .. }) => "pass_through",
            Routing::Routed(Route::Rejected { .. }) => "rejected",
            Routing::Routed(Route::RateLimited { .. }) => "rate_limited",
            Routing::Routed(Route::Command { .. }) => "command",
            Routing::Routed(Route::UnknownCommand { .. }) => "unknown_command",
            Routing::Dropped(_) => "dropped",
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Routing::Dropped(_))
    }
}

pub fn rate_limit_message(wait_secs: u64) -> String {
    format!(
        "⚠️ *Rate Limit Reached*\n\nYou're sending commands too quickly. \
         Please wait {} seconds before trying again.",
        wait_secs
    )
}

#[derive(Clone)]
pub struct MessageRouter {
    config: Arc<RouterConfig>,
    limiter: RateLimiter,
    accountant: UsageAccountant,
    sink: Arc<dyn IntegrationSink>,
    client: Arc<dyn MessagingClient>,
    commands: Arc<CommandRegistry>,
}

impl MessageRouter {
    pub fn new(
        config: RouterConfig,
        limiter: RateLimiter,
        governor: SessionGovernor,
        sink: Arc<dyn IntegrationSink>,
        client: Arc<dyn MessagingClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            limiter,
            accountant: UsageAccountant::new(governor),
            sink,
            client,
            commands: Arc::new(CommandRegistry::with_builtins()),
        }
    }

    /// Replace the command set
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn governor(&self) -> &SessionGovernor {
        self.accountant.governor()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Route one message. Never fails: every error ends as a reply or a log line.
    pub async fn handle(&self, message: &InboundMessage) -> Routing {
        let routing = self.route(message).await;
        MESSAGES_ROUTED_TOTAL
            .with_label_values(&[routing.label()])
            .inc();
        debug!(
            chat = %message.chat_id,
            identity = message.identity(),
            outcome = routing.label(),
            "Message routed"
        );
        routing
    }

    async fn route(&self, message: &InboundMessage) -> Routing {
        if message.is_broadcast {
            return Routing::Dropped(DropReason::Broadcast);
        }
        if message.from_me {
            return Routing::Dropped(DropReason::SelfEcho);
        }

        if self.config.integration_only {
            if message.body.trim().is_empty() {
                return Routing::Dropped(DropReason::Empty);
            }
            return self.route_integration_only(message).await;
        }

        match classify(&message.body, &self.config) {
            Classified::Empty => Routing::Dropped(DropReason::Empty),
            Classified::Freeform(_) if message.is_group => self.route_group_freeform(message).await,
            Classified::Freeform(_) => self.route_direct_freeform(message).await,
            Classified::Prefixed(command) => self.dispatch(message, command).await,
        }
    }

    async fn route_direct_freeform(&self, message: &InboundMessage) -> Routing {
        match self.governor().is_active(message.identity()).await {
            Ok(Activity::Active(_)) => self.pass_through(message).await,
            Ok(Activity::Inactive(InactiveReason::LimitReached)) => {
                let err = InactiveReason::LimitReached.into_error(message.identity());
                self.reject(message, err).await
            }
            Ok(Activity::Inactive(_)) => Routing::Dropped(DropReason::NoActiveSession),
            Err(e) => self.reject(message, e).await,
        }
    }

    async fn route_group_freeform(&self, message: &InboundMessage) -> Routing {
        match self.governor().is_active_for_group(&message.chat_id).await {
            Ok(Activity::Active(_)) => {}
            Ok(Activity::Inactive(_)) => return Routing::Dropped(DropReason::GroupInactive),
            Err(e) => return self.reject(message, e).await,
        }

        // The group only opens the gate; the member pays
        match self.accountant.resolve_quota_owner(message.identity()).await {
            Ok(_) => self.pass_through(message).await,
            Err(e) => self.reject(message, e).await,
        }
    }

    async fn route_integration_only(&self, message: &InboundMessage) -> Routing {
        let identity = message.identity();
        let governor = self.governor();

        if self.config.auto_register {
            if let Err(e) = governor.register_if_absent(identity).await {
                return self.reject(message, e).await;
            }
        }

        match governor.activate(identity, ActivateOptions::forced()).await {
            Ok(_) => self.pass_through(message).await,
            Err(e) => self.reject(message, e).await,
        }
    }

    async fn pass_through(&self, message: &InboundMessage) -> Routing {
        let identity = message.identity();

        // Charged before delivery, refunded if the sink fails
        let reservation = match self.accountant.reserve(identity).await {
            Ok(reservation) => reservation,
            Err(e) => return self.reject(message, e).await,
        };

        let payload = IntegrationPayload::new(
            &message.body,
            &message.chat_id,
            identity,
            &message.id,
            message.is_group,
        );

        self.typing(&message.chat_id, true).await;
        let result = self.sink.forward(&payload).await;
        self.typing(&message.chat_id, false).await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                if let Err(release_err) = self.accountant.release(identity, &reservation).await {
                    warn!(identity, "Failed to release usage slot: {}", release_err);
                }
                let err = GovernorError::UpstreamIntegrationFailure(e.to_string());
                return self.reject(message, err).await;
            }
        };

        let replied = match reply {
            Some(text) => {
                self.reply(message, &text).await;
                true
            }
            None => false,
        };

        let remaining = reservation.remaining;
        info!(
            identity,
            chat = %message.chat_id,
            group = message.is_group,
            %remaining,
            "Message passed to integration"
        );
        Routing::Routed(Route::PassThrough { remaining, replied })
    }

    async fn dispatch(&self, message: &InboundMessage, command: Command) -> Routing {
        let identity = message.identity();

        if !command.name.is_empty() && !self.config.is_always_allowed(&command.name) {
            let result = self.limiter.check(identity, &command.name);
            if result.limited {
                let wait_secs = result.time_left_secs.unwrap_or(1);
                self.reply(message, &rate_limit_message(wait_secs)).await;
                info!(identity, command = %command.name, wait_secs, "Command rate limited");
                return Routing::Routed(Route::RateLimited {
                    command_class: command.name,
                    wait_secs,
                });
            }
        }

        let handler = match self.commands.get(&command.name) {
            Some(handler) if !message.is_group || handler.allowed_in_groups() => handler,
            _ => {
                self.reply(message, &self.unknown_command_hint(message.is_group))
                    .await;
                debug!(identity, command = %command.name, "Unknown command");
                return Routing::Routed(Route::UnknownCommand { name: command.name });
            }
        };

        if handler.requires_registration() {
            match self.governor().find_user(identity).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let err = GovernorError::NotRegistered(identity.to_string());
                    return self.reject(message, err).await;
                }
                Err(e) => return self.reject(message, e).await,
            }
        }

        let ctx = CommandContext {
            message,
            command: &command,
            governor: self.governor(),
            config: &self.config,
            registry: &self.commands,
        };
        let text = match handler.handle(&ctx).await {
            Ok(text) => text,
            Err(e) => {
                warn!(identity, command = %command.name, "Command failed: {:#}", e);
                commands::error_reply(&e)
            }
        };
        self.reply(message, &text).await;

        Routing::Routed(Route::Command { name: command.name })
    }

    fn unknown_command_hint(&self, is_group: bool) -> String {
        let help = format!("{}help", self.config.command_prefix);
        if is_group {
            format!(
                "⚠️ This command is not supported in groups or is unknown. \
                 Type {} for available group commands.",
                help
            )
        } else {
            format!("⚠️ Unknown command. Type {} to see available commands.", help)
        }
    }

    /// Tell the sender why their message went nowhere
    async fn reject(&self, message: &InboundMessage, err: GovernorError) -> Routing {
        let reason = err.kind();
        match &err {
            GovernorError::UpstreamIntegrationFailure(_) | GovernorError::StoreUnavailable(_) => {
                warn!(identity = message.identity(), "Message rejected: {}", err)
            }
            _ => info!(identity = message.identity(), reason, "Message rejected"),
        }
        QUOTA_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();

        self.reply(message, &format!("❌ {}", err.user_message()))
            .await;
        Routing::Routed(Route::Rejected { reason })
    }

    async fn reply(&self, message: &InboundMessage, text: &str) {
        if let Err(e) = self.client.reply(&message.chat_id, text, &message.id).await {
            warn!(chat = %message.chat_id, "Failed to send reply: {:#}", e);
        }
    }

    async fn typing(&self, chat_id: &str, on: bool) {
        if let Err(e) = self.client.set_typing(chat_id, on).await {
            warn!(chat = chat_id, "Failed to toggle typing indicator: {:#}", e);
        }
    }
}
