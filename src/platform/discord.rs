use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{Client, Context, EventHandler, GatewayIntents, Message, Ready};
use tracing::{error, info, warn};

use crate::dispatcher::{Command, Dispatcher};
use crate::platform::IncomingMessage;

struct Handler {
    dispatcher: Arc<Dispatcher>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("We have logged in as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let from_self = msg.author.id == ctx.cache.current_user().id;
        let command = self.dispatcher.command(&msg.content);
        if command.is_none() {
            return;
        }

        // Only set-channel reads permissions and the channel name.
        let (is_admin, channel_name) = if !from_self && command == Some(Command::SetChannel) {
            (
                sender_is_admin(&ctx, &msg).await,
                msg.channel_id.name(&ctx).await.ok(),
            )
        } else {
            (false, None)
        };

        let incoming = IncomingMessage {
            user_id: msg.author.id.to_string(),
            user_name: msg.author.name.clone(),
            from_self,
            server_id: msg.guild_id.map(|id| id.to_string()),
            channel_id: msg.channel_id.to_string(),
            channel_name,
            text: msg.content.clone(),
            is_admin,
        };

        if let Some(reply) = self.dispatcher.handle(&incoming).await {
            if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
                error!("Failed to send reply to channel {}: {}", msg.channel_id, e);
            }
        }
    }
}

async fn sender_is_admin(ctx: &Context, msg: &Message) -> bool {
    let Some(guild_id) = msg.guild_id else {
        return false;
    };
    let member = match guild_id.member(ctx, msg.author.id).await {
        Ok(member) => member,
        Err(e) => {
            warn!("Failed to fetch member {} of {}: {}", msg.author.id, guild_id, e);
            return false;
        }
    };
    match ctx.cache.guild(guild_id) {
        Some(guild) => guild.member_permissions(&member).administrator(),
        None => {
            warn!("Guild {} not in cache; treating sender as non-admin", guild_id);
            false
        }
    }
}

/// Run the Discord bot platform
pub async fn run(token: &str, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    info!("Starting Discord platform...");

    let mut client = Client::builder(token, intents)
        .event_handler(Handler { dispatcher })
        .await
        .context("Failed to create Discord client")?;

    client.start().await.context("Discord client stopped")?;

    Ok(())
}
