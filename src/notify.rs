//! Notification sinks.
//!
//! A chain's report is posted unless the last posted report for the same title is fully contained
//! in it (see [`needs_update`]). Bodies are cut to the channel limit before that comparison, so a
//! long report is compared against what was actually posted.

use crate::error::{AuditError, Result};
use crate::report::{needs_update, truncate_body, Report};
use crate::utils::config::DiscordConfig;
use crate::utils::error::compact_error_message;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DISCORD_HTTP_TIMEOUT_MS: u64 = 10_000;
/// Messages scanned when looking for the previous report.
pub const HISTORY_WINDOW: usize = 20;
const ERROR_BODY_MAX_LEN: usize = 240;

/// Write side of the notification channel, plus read access to its recent history.
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;
    /// Body of the most recent report posted under `title`, if any is still in the window.
    async fn latest(&self, title: &str) -> Result<Option<String>>;
    async fn post(&self, report: &Report) -> Result<()>;
}

/// Post `report` unless it is already covered by the last one. Returns whether it was posted.
pub async fn notify(sink: &dyn ReportSink, report: &Report) -> Result<bool> {
    let outgoing = Report {
        body: truncate_body(&report.body),
        ..report.clone()
    };
    let report = &outgoing;
    let previous = sink.latest(&report.title).await?;
    if !needs_update(previous.as_deref(), &report.body) {
        tracing::info!(
            "[NOTIFY] {} unchanged on {}; not posting",
            report.title,
            sink.name()
        );
        return Ok(false);
    }
    sink.post(report).await?;
    tracing::info!(
        "[NOTIFY] Posted {} to {} ({} line(s))",
        report.title,
        sink.name(),
        report.body.lines().filter(|l| !l.trim().is_empty()).count()
    );
    Ok(true)
}

/// Prints reports instead of posting them. Has no history, so everything is printed.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl ReportSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn latest(&self, _title: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn post(&self, report: &Report) -> Result<()> {
        println!("{}\n{}", report.title, report.body);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GuildChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Embed {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    embeds: Vec<Embed>,
}

/// Find the newest embed with `title`. Discord returns messages newest first.
fn find_latest_description(messages: &[Message], title: &str) -> Option<String> {
    messages
        .iter()
        .flat_map(|message| message.embeds.iter())
        .find(|embed| embed.title.as_deref() == Some(title))
        .map(|embed| embed.description.clone().unwrap_or_default())
}

/// Bot-authenticated Discord REST client bound to one guild channel, located by name.
pub struct DiscordSink {
    client: Client,
    api_base: String,
    token: String,
    guild_id: String,
    channel_name: String,
    channel_id: OnceCell<String>,
}

impl DiscordSink {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        Self::with_api_base(config, DISCORD_API_BASE)
    }

    pub fn with_api_base(config: &DiscordConfig, api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(DISCORD_HTTP_TIMEOUT_MS))
            .build()
            .map_err(|err| AuditError::Notify(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            guild_id: config.guild_id.clone(),
            channel_name: config.channel_name.clone(),
            channel_id: OnceCell::new(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|err| AuditError::Notify(format!("GET {path} failed: {err}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuditError::Notify(format!(
                "GET {path} returned HTTP {status}: {}",
                compact_error_message(&body, ERROR_BODY_MAX_LEN)
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|err| AuditError::Notify(format!("GET {path} returned malformed JSON: {err}")))
    }

    async fn channel_id(&self) -> Result<&str> {
        let id = self
            .channel_id
            .get_or_try_init(|| async {
                let channels: Vec<GuildChannel> = self
                    .get_json(&format!("/guilds/{}/channels", self.guild_id))
                    .await?;
                channels
                    .into_iter()
                    .find(|c| c.name.as_deref() == Some(self.channel_name.as_str()))
                    .map(|c| c.id)
                    .ok_or_else(|| {
                        AuditError::Notify(format!(
                            "discord channel `{}` not found",
                            self.channel_name
                        ))
                    })
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl ReportSink for DiscordSink {
    fn name(&self) -> &str {
        &self.channel_name
    }

    async fn latest(&self, title: &str) -> Result<Option<String>> {
        let channel = self.channel_id().await?;
        let messages: Vec<Message> = self
            .get_json(&format!("/channels/{channel}/messages?limit={HISTORY_WINDOW}"))
            .await?;
        Ok(find_latest_description(&messages, title))
    }

    async fn post(&self, report: &Report) -> Result<()> {
        let channel = self.channel_id().await?;
        let path = format!("/channels/{channel}/messages");
        let payload = serde_json::json!({
            "embeds": [{
                "title": report.title,
                "description": truncate_body(&report.body),
            }]
        });
        let resp = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&payload)
            .send()
            .await
            .map_err(|err| AuditError::Notify(format!("POST {path} failed: {err}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuditError::Notify(format!(
                "POST {path} returned HTTP {status}: {}",
                compact_error_message(&body, ERROR_BODY_MAX_LEN)
            )));
        }
        Ok(())
    }
}
