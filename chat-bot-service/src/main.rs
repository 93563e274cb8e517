// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{Json, Router, routing::get};
use hypixelstats_common::{
    COMMAND_PREFIX, GameMode, SUPPORTED_MODE_TOKENS, StatsFormatError, mode_stats,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use twitch_irc::{
    ClientConfig, SecureTCPTransport, TwitchIRCClient, login::StaticLoginCredentials,
    message::ServerMessage,
};
use uuid::Uuid;

const PLAYER_NOT_FOUND_REPLY: &str = "That player does not exist.";
const STATS_UNAVAILABLE_REPLY: &str = "User not found. Please try again later.";

type ChatClient = TwitchIRCClient<SecureTCPTransport, StaticLoginCredentials>;

#[derive(Clone)]
struct AppState {
    chat: Arc<dyn ChatSink>,
    identity: Arc<dyn IdentityResolver>,
    stats: Arc<dyn StatsFetcher>,
}

#[derive(Debug, Clone)]
struct BotConfig {
    login: String,
    client_id: Option<String>,
    oauth_token: String,
    channels: Vec<String>,
    hypixel_api_key: String,
    mojang_base_url: String,
    hypixel_base_url: String,
}

impl BotConfig {
    fn from_env() -> anyhow::Result<Self> {
        let oauth_token = std::env::var("TWITCH_OAUTH_TOKEN")
            .context("TWITCH_OAUTH_TOKEN is required to authenticate with chat")?;
        let hypixel_api_key = std::env::var("HYPIXEL_API_KEY")
            .context("HYPIXEL_API_KEY is required to query the stats service")?;

        let channels = std::env::var("TWITCH_CHANNELS")
            .ok()
            .unwrap_or_else(|| "hayhayislive,cakadyboi".to_string())
            .split(',')
            .map(|channel| channel.trim().to_lowercase())
            .filter(|channel| !channel.is_empty())
            .collect::<Vec<_>>();
        if channels.is_empty() {
            anyhow::bail!("TWITCH_CHANNELS must name at least one channel");
        }

        Ok(Self {
            login: std::env::var("TWITCH_LOGIN")
                .ok()
                .unwrap_or_else(|| "hypixelstats".to_string()),
            client_id: normalize_optional_string(std::env::var("TWITCH_CLIENT_ID").ok()),
            oauth_token,
            channels,
            hypixel_api_key,
            mojang_base_url: std::env::var("MOJANG_BASE_URL")
                .ok()
                .unwrap_or_else(|| "https://api.mojang.com".to_string()),
            hypixel_base_url: std::env::var("HYPIXEL_BASE_URL")
                .ok()
                .unwrap_or_else(|| "https://api.hypixel.net".to_string()),
        })
    }
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
}

/// A chat line as delivered by the transport adapter.
#[derive(Debug, Clone)]
struct ChatMessage {
    channel: String,
    sender_login: String,
    text: String,
    is_self: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LookupCommand {
    mode_token: String,
    player_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandParse {
    NotACommand,
    MissingArguments,
    Lookup(LookupCommand),
}

/// Stable player identifier resolved from a display name. Obtained once
/// per command invocation and never cached across invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlayerIdentity {
    id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatsFetchError {
    PlayerNotFound,
    ServiceUnavailable,
}

impl StatsFetchError {
    fn as_str(self) -> &'static str {
        match self {
            Self::PlayerNotFound => "player_not_found",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchOutcome {
    Ignored,
    InvalidCommand,
    PlayerNotFound,
    ServiceUnavailable,
    UnsupportedMode,
    NoDataForMode,
    Replied,
}

impl DispatchOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::InvalidCommand => "invalid_command",
            Self::PlayerNotFound => "player_not_found",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UnsupportedMode => "unsupported_mode",
            Self::NoDataForMode => "no_data_for_mode",
            Self::Replied => "replied",
        }
    }
}

#[async_trait]
trait ChatSink: Send + Sync {
    async fn say(&self, channel: &str, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
trait IdentityResolver: Send + Sync {
    /// Resolve a display name to a stable identity. Unknown players and
    /// resolver outages both collapse to `None`; the caller cannot tell
    /// them apart, only the logs can.
    async fn resolve(&self, name: &str) -> Option<PlayerIdentity>;
}

#[async_trait]
trait StatsFetcher: Send + Sync {
    async fn fetch(&self, identity: PlayerIdentity) -> Result<serde_json::Value, StatsFetchError>;
}

struct MojangIdentityResolver {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MojangProfile {
    id: String,
}

#[async_trait]
impl IdentityResolver for MojangIdentityResolver {
    async fn resolve(&self, name: &str) -> Option<PlayerIdentity> {
        let url = format!("{}/users/profiles/minecraft/{}", self.base_url, name);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(player_name = %name, error = %error, "identity request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(player_name = %name, status = %status, "identity service returned non-success");
            return None;
        }

        let profile = match response.json::<MojangProfile>().await {
            Ok(profile) => profile,
            Err(error) => {
                warn!(player_name = %name, error = %error, "invalid identity payload");
                return None;
            }
        };

        match Uuid::try_parse(&profile.id) {
            Ok(id) => Some(PlayerIdentity { id }),
            Err(error) => {
                warn!(
                    player_name = %name,
                    profile_id = %profile.id,
                    error = %error,
                    "identity service returned a malformed id"
                );
                None
            }
        }
    }
}

struct HypixelStatsFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct HypixelPlayerResponse {
    #[serde(default)]
    player: Option<serde_json::Value>,
}

#[async_trait]
impl StatsFetcher for HypixelStatsFetcher {
    async fn fetch(
        &self,
        identity: PlayerIdentity,
    ) -> Result<serde_json::Value, StatsFetchError> {
        let url = format!("{}/player", self.base_url);
        let response = match self
            .client
            .get(&url)
            .header("API-Key", &self.api_key)
            .query(&[("uuid", identity.id.as_simple().to_string())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(player_uuid = %identity.id, error = %error, "stats request failed");
                return Err(StatsFetchError::ServiceUnavailable);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(player_uuid = %identity.id, status = %status, "stats service returned non-success");
            return Err(StatsFetchError::ServiceUnavailable);
        }

        let payload = match response.json::<HypixelPlayerResponse>().await {
            Ok(payload) => payload,
            Err(error) => {
                warn!(player_uuid = %identity.id, error = %error, "invalid stats payload");
                return Err(StatsFetchError::ServiceUnavailable);
            }
        };

        payload
            .player
            .filter(|player| !player.is_null())
            .ok_or(StatsFetchError::PlayerNotFound)
    }
}

struct TwitchChatSink {
    client: ChatClient,
}

#[async_trait]
impl ChatSink for TwitchChatSink {
    async fn say(&self, channel: &str, text: &str) -> anyhow::Result<()> {
        self.client
            .say(channel.to_string(), text.to_string())
            .await
            .map_err(|error| anyhow::anyhow!("failed to send chat reply: {error}"))
    }
}

fn parse_command(text: &str) -> CommandParse {
    let Some(rest) = text.strip_prefix(COMMAND_PREFIX) else {
        return CommandParse::NotACommand;
    };

    let mut tokens = rest.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(mode_token), Some(player_name)) => CommandParse::Lookup(LookupCommand {
            mode_token: mode_token.to_string(),
            player_name: player_name.to_string(),
        }),
        _ => CommandParse::MissingArguments,
    }
}

fn usage_reply() -> String {
    format!("Usage: {COMMAND_PREFIX}<mode> <player> (modes: {SUPPORTED_MODE_TOKENS})")
}

fn unsupported_mode_reply(mode_token: &str) -> String {
    format!("Unknown mode '{mode_token}'. Supported modes: {SUPPORTED_MODE_TOKENS}.")
}

fn no_mode_data_reply(command: &LookupCommand) -> String {
    let mode_name = GameMode::parse(&command.mode_token)
        .map(GameMode::display_name)
        .unwrap_or("this mode");
    format!("{} has no {} stats yet.", command.player_name, mode_name)
}

/// Run one command invocation: parse, resolve, fetch, format, reply.
/// Every step short-circuits into exactly one reply (or, for non-commands
/// and self-authored lines, into silence). Only a failure to *send* a
/// reply escapes as an error.
async fn handle_chat_message(
    state: &AppState,
    message: &ChatMessage,
) -> anyhow::Result<DispatchOutcome> {
    // A reply that re-entered the dispatcher would loop forever.
    if message.is_self {
        return Ok(DispatchOutcome::Ignored);
    }

    let command = match parse_command(&message.text) {
        CommandParse::NotACommand => return Ok(DispatchOutcome::Ignored),
        CommandParse::MissingArguments => {
            state.chat.say(&message.channel, &usage_reply()).await?;
            return Ok(DispatchOutcome::InvalidCommand);
        }
        CommandParse::Lookup(command) => command,
    };

    let Some(identity) = state.identity.resolve(&command.player_name).await else {
        state
            .chat
            .say(&message.channel, PLAYER_NOT_FOUND_REPLY)
            .await?;
        return Ok(DispatchOutcome::PlayerNotFound);
    };

    let record = match state.stats.fetch(identity).await {
        Ok(record) => record,
        Err(error) => {
            warn!(
                player_name = %command.player_name,
                error = error.as_str(),
                "stats lookup failed"
            );
            state
                .chat
                .say(&message.channel, STATS_UNAVAILABLE_REPLY)
                .await?;
            return Ok(match error {
                StatsFetchError::PlayerNotFound => DispatchOutcome::PlayerNotFound,
                StatsFetchError::ServiceUnavailable => DispatchOutcome::ServiceUnavailable,
            });
        }
    };

    match mode_stats(&record, &command.mode_token) {
        Ok(stats) => {
            let reply = format!("Stats for {}: {}", command.player_name, stats.summary());
            state.chat.say(&message.channel, &reply).await?;
            Ok(DispatchOutcome::Replied)
        }
        Err(StatsFormatError::UnsupportedMode) => {
            state
                .chat
                .say(&message.channel, &unsupported_mode_reply(&command.mode_token))
                .await?;
            Ok(DispatchOutcome::UnsupportedMode)
        }
        Err(StatsFormatError::NoModeData) => {
            state
                .chat
                .say(&message.channel, &no_mode_data_reply(&command))
                .await?;
            Ok(DispatchOutcome::NoDataForMode)
        }
    }
}

/// Consume the incoming chat stream and spawn one dispatch task per
/// message, so a slow lookup never starves the subscription.
async fn run_chat_loop(
    state: AppState,
    mut incoming: mpsc::UnboundedReceiver<ServerMessage>,
    bot_login: String,
) {
    while let Some(server_message) = incoming.recv().await {
        let ServerMessage::Privmsg(privmsg) = server_message else {
            continue;
        };

        let message = ChatMessage {
            is_self: privmsg.sender.login.eq_ignore_ascii_case(&bot_login),
            channel: privmsg.channel_login,
            sender_login: privmsg.sender.login,
            text: privmsg.message_text,
        };

        let task_state = state.clone();
        tokio::spawn(async move {
            match handle_chat_message(&task_state, &message).await {
                Ok(outcome) => {
                    if outcome != DispatchOutcome::Ignored {
                        info!(
                            channel = %message.channel,
                            sender_login = %message.sender_login,
                            outcome = outcome.as_str(),
                            "chat command dispatched"
                        );
                    }
                }
                Err(error) => {
                    warn!(
                        channel = %message.channel,
                        sender_login = %message.sender_login,
                        error = %error,
                        "chat command dispatch failed"
                    );
                }
            }
        });
    }

    info!("chat message stream closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "chat_bot_service=debug,tower_http=info".to_string()),
        )
        .init();

    let config = BotConfig::from_env()?;
    info!(
        login = %config.login,
        channels = ?config.channels,
        client_id_present = config.client_id.is_some(),
        "chat-bot-service starting"
    );

    let chat_config = ClientConfig::new_simple(StaticLoginCredentials::new(
        config.login.clone(),
        Some(config.oauth_token.clone()),
    ));
    let (incoming, chat_client) =
        TwitchIRCClient::<SecureTCPTransport, StaticLoginCredentials>::new(chat_config);
    for channel in &config.channels {
        chat_client
            .join(channel.clone())
            .with_context(|| format!("failed to join channel {channel}"))?;
    }

    let http_client = reqwest::Client::new();
    let state = AppState {
        chat: Arc::new(TwitchChatSink {
            client: chat_client,
        }),
        identity: Arc::new(MojangIdentityResolver {
            client: http_client.clone(),
            base_url: config.mojang_base_url.clone(),
        }),
        stats: Arc::new(HypixelStatsFetcher {
            client: http_client,
            base_url: config.hypixel_base_url.clone(),
            api_key: config.hypixel_api_key.clone(),
        }),
    };

    tokio::spawn(run_chat_loop(state, incoming, config.login.clone()));

    let app = build_router();
    let bind_addr = parse_bind_addr("CHAT_BOT_SERVICE_BIND", "0.0.0.0:8093")?;
    info!(%bind_addr, "chat-bot-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "chat-bot-service"}))
}
