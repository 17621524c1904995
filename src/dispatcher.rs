use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::market::{display_name, PriceSource};
use crate::platform::IncomingMessage;
use crate::registry::RegistryStore;

/// A recognized bot command. Matched by exact, case-sensitive prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    SetChannel,
    Help,
    /// Text following the price command, untrimmed
    Price(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(text: &'a str, prefix: &str) -> Option<Self> {
        let body = text.strip_prefix(prefix)?;
        if body.starts_with("setchannel") {
            Some(Command::SetChannel)
        } else if body.starts_with("help") {
            Some(Command::Help)
        } else {
            body.strip_prefix("price").map(Command::Price)
        }
    }
}

pub fn help_text(prefix: &str) -> String {
    format!(
        "Welcome to the Warframe Market Bot! Here are the commands you can use:\n\n\
         **{p}setchannel**\n\
         \x20 - Sets the channel for bot commands in this server.\n\n\
         **{p}price <item_name>**\n\
         \x20 - Queries the price of an item on the Warframe market.\n\
         \x20 - **item_name** is the name of the item (e.g., `Rhino Prime Set`, `Soma Prime`, `Primed Bane of Grineer`).\n\n\
         Examples:\n\
         \x20 - `{p}price Rhino Prime Set`\n\
         \x20 - `{p}price Soma Prime`\n\
         \x20 - `{p}price Primed Bane of Grineer`\n",
        p = prefix
    )
}

/// Routes chat messages to commands, gated by the per-server channel registry.
pub struct Dispatcher {
    registry: Arc<RegistryStore>,
    prices: Arc<dyn PriceSource>,
    prefix: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<RegistryStore>, prices: Arc<dyn PriceSource>, prefix: &str) -> Self {
        Self {
            registry,
            prices,
            prefix: prefix.to_string(),
        }
    }

    pub fn command<'a>(&self, text: &'a str) -> Option<Command<'a>> {
        Command::parse(text, &self.prefix)
    }

    /// Handles one message and returns the reply to send, if any.
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<String> {
        if msg.from_self {
            return None;
        }
        let command = self.command(&msg.text)?;

        info!(
            "Command from {} ({}) in channel {}: {}",
            msg.user_name, msg.user_id, msg.channel_id, msg.text
        );

        if command != Command::SetChannel && !self.channel_allowed(msg).await {
            return None;
        }

        let reply = match command {
            Command::SetChannel => self.set_channel(msg).await,
            Command::Help => help_text(&self.prefix),
            Command::Price(rest) => self.price(rest).await,
        };
        Some(reply)
    }

    /// Direct messages have no server and are never gated.
    async fn channel_allowed(&self, msg: &IncomingMessage) -> bool {
        let Some(server) = &msg.server_id else {
            return true;
        };
        let allowed = self.registry.is_allowed(server, &msg.channel_id).await;
        if !allowed {
            debug!(
                "Ignoring command in channel {} of server {}",
                msg.channel_id, server
            );
        }
        allowed
    }

    async fn set_channel(&self, msg: &IncomingMessage) -> String {
        let Some(server) = &msg.server_id else {
            return "This command can only be used in a server.".to_string();
        };
        if !msg.is_admin {
            return "You do not have permission to set the channel.".to_string();
        }

        match self.registry.set_channel(server, &msg.channel_id).await {
            Ok(()) => {
                let name = msg
                    .channel_name
                    .clone()
                    .unwrap_or_else(|| format!("<#{}>", msg.channel_id));
                format!("Channel {} has been set for bot commands.", name)
            }
            Err(e) => {
                error!("Failed to persist channel for server {}: {}", server, e);
                "Failed to save the channel setting.".to_string()
            }
        }
    }

    async fn price(&self, rest: &str) -> String {
        let item = rest.trim().to_lowercase();
        if item.is_empty() {
            return "Please specify the item name.".to_string();
        }
        let title = display_name(&item);

        match self.prices.quote(&item).await {
            Ok(quote) => quote.render(&title),
            Err(e) if e.is_item_missing() => {
                warn!("No order book for '{}': {}", item, e);
                format!("Item {} not found.", title)
            }
            Err(e) => {
                warn!("Price lookup for '{}' failed: {}", item, e);
                format!("Error fetching data for {}: {}", title, e)
            }
        }
    }
}
