pub mod discord;

/// A chat message received from the platform
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    /// Platform-specific user ID as string
    pub user_id: String,
    /// Display name of the user
    pub user_name: String,
    /// Sent by the bot's own account
    pub from_self: bool,
    /// Server (guild) ID; `None` for direct messages
    pub server_id: Option<String>,
    /// Platform-specific channel ID as string
    pub channel_id: String,
    pub channel_name: Option<String>,
    /// The message text
    pub text: String,
    /// Sender holds administrator permission in the server
    pub is_admin: bool,
}
