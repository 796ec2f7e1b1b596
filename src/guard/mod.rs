//! Rule-evaluation pipeline for inbound chat messages.
//!
//! The [`Moderator`] is what a bot embeds: for every message it reads the
//! community's configuration through the TTL cache, checks exceptions,
//! detects at most one violation, applies every enabled sanction, reports
//! the event to the backend, and posts a log notice.
//!
//! # Failure policy
//!
//! Enforcement is best-effort throughout. An unavailable configuration
//! skips enforcement for that message; a failing sanction is recorded as a
//! [`ActionOutcome`] and never blocks its siblings; a failed event report
//! or log post is logged and swallowed. A community may see a deleted
//! message without a warning DM; partial enforcement beats all-or-nothing.

pub mod actions;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

pub use actions::{ActionError, ActionKind, ActionOutcome, ActionStatus, ChatActions};
pub use rules::{caps_percent, RuleKind, RuleMatcher};

use crate::cache::ConfigCache;
use crate::client::ClientError;
use crate::document::{Actions, Exceptions};
use crate::event::ModEvent;

/// Where enforced violations get reported (the backend's event ingestion).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn report(&self, event: &ModEvent) -> Result<(), ClientError>;
}

/// A chat message as the platform adapter hands it over.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub id: String,
    /// Absent for direct messages; those are never moderated.
    pub community_id: Option<String>,
    pub channel_id: String,
    pub author_id: String,
    pub author_roles: Vec<String>,
    pub author_is_bot: bool,
    pub content: String,
}

/// Which exception list matched. Checked in this order, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    User,
    Channel,
    Role,
}

/// Why a message was not evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Skip {
    FromBot,
    NoCommunity,
    ConfigUnavailable,
    Disabled,
    Excepted(ExceptionKind),
}

/// Result of running one message through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skipped(Skip),
    Clean,
    Enforced(EnforcementReport),
}

/// Everything that happened while enforcing one violation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementReport {
    pub rule: RuleKind,
    pub outcomes: Vec<ActionOutcome>,
    /// Whether the event reached ingestion.
    pub reported: bool,
    /// Whether the log-sink notice was posted.
    pub notice_posted: bool,
}

/// The moderation front end.
pub struct Moderator {
    cache: ConfigCache,
    sink: Arc<dyn EventSink>,
    chat: Arc<dyn ChatActions>,
    rules: RuleMatcher,
}

impl Moderator {
    pub fn new(cache: ConfigCache, sink: Arc<dyn EventSink>, chat: Arc<dyn ChatActions>) -> Self {
        Self {
            cache,
            sink,
            chat,
            rules: RuleMatcher::new(),
        }
    }

    /// Evaluate one message and enforce on a match.
    pub async fn on_message(&self, msg: &InboundMessage) -> Outcome {
        if msg.author_is_bot {
            return Outcome::Skipped(Skip::FromBot);
        }
        let Some(community_id) = msg.community_id.as_deref() else {
            return Outcome::Skipped(Skip::NoCommunity);
        };

        let config = match self.cache.get(community_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    community = %community_id,
                    error = %e,
                    "Config unavailable, skipping enforcement"
                );
                return Outcome::Skipped(Skip::ConfigUnavailable);
            }
        };

        if !config.enabled {
            return Outcome::Skipped(Skip::Disabled);
        }

        if let Some(kind) = match_exception(msg, &config.exceptions) {
            return Outcome::Skipped(Skip::Excepted(kind));
        }

        let Some(rule) = self.rules.detect(&msg.content, &config.filters) else {
            return Outcome::Clean;
        };

        info!(
            community = %community_id,
            author = %msg.author_id,
            rule = %rule,
            "Violation detected"
        );

        let outcomes = self
            .apply_sanctions(msg, community_id, &config.actions, rule)
            .await;

        let event = ModEvent::violation(community_id, rule.label(), Some(msg.author_id.clone()));
        let reported = match self.sink.report(&event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(community = %community_id, error = %e, "Failed to report violation event");
                false
            }
        };

        let mut notice_posted = false;
        if let Some(sink) = &config.logs {
            match self
                .chat
                .post_notice(&sink.channel_id, &notice_text(msg, rule))
                .await
            {
                Ok(()) => notice_posted = true,
                Err(e) => {
                    warn!(channel = %sink.channel_id, error = %e, "Failed to post log notice");
                }
            }
        }

        Outcome::Enforced(EnforcementReport {
            rule,
            outcomes,
            reported,
            notice_posted,
        })
    }

    /// Run every enabled action, independently and in order.
    async fn apply_sanctions(
        &self,
        msg: &InboundMessage,
        community_id: &str,
        actions: &Actions,
        rule: RuleKind,
    ) -> Vec<ActionOutcome> {
        let reason = format!("automod: {}", rule.label());
        let mut outcomes = Vec::new();

        if actions.delete.is_enabled() {
            let result = self.chat.delete_message(&msg.channel_id, &msg.id).await;
            outcomes.push(to_outcome(ActionKind::Delete, result));
        }

        if let Some(warn_action) = actions.warn.params() {
            let text = warn_action
                .message
                .clone()
                .unwrap_or_else(|| format!("Your message was flagged for {}", rule.label()));
            let result = self.chat.warn_member(&msg.author_id, &text).await;
            outcomes.push(to_outcome(ActionKind::Warn, result));
        }

        if let Some(timeout) = actions.timeout.params() {
            let result = self
                .chat
                .timeout_member(
                    community_id,
                    &msg.author_id,
                    Duration::from_secs(timeout.duration),
                    &reason,
                )
                .await;
            outcomes.push(to_outcome(ActionKind::Timeout, result));
        }

        if actions.kick.is_enabled() {
            let result = self
                .chat
                .kick_member(community_id, &msg.author_id, &reason)
                .await;
            outcomes.push(to_outcome(ActionKind::Kick, result));
        }

        if actions.ban.is_enabled() {
            let result = self
                .chat
                .ban_member(community_id, &msg.author_id, &reason)
                .await;
            outcomes.push(to_outcome(ActionKind::Ban, result));
        }

        outcomes
    }
}

fn to_outcome(kind: ActionKind, result: Result<(), ActionError>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::applied(kind),
        Err(e) => {
            warn!(action = %kind, error = %e, "Sanction failed, continuing with remaining actions");
            ActionOutcome::failed(kind, e.to_string())
        }
    }
}

/// Exception check: user id, then channel id, then any role id.
fn match_exception(msg: &InboundMessage, exceptions: &Exceptions) -> Option<ExceptionKind> {
    if exceptions.users.contains(&msg.author_id) {
        return Some(ExceptionKind::User);
    }
    if exceptions.channels.contains(&msg.channel_id) {
        return Some(ExceptionKind::Channel);
    }
    if msg
        .author_roles
        .iter()
        .any(|role| exceptions.roles.contains(role))
    {
        return Some(ExceptionKind::Role);
    }
    None
}

/// Enforcement notice for the configured log channel.
///
/// Content excerpt is capped at 1500 characters.
fn notice_text(msg: &InboundMessage, rule: RuleKind) -> String {
    let mut excerpt: String = msg.content.chars().take(1500).collect();
    if msg.content.chars().count() > 1500 {
        excerpt.push('…');
    }
    format!(
        "Automod: <@{}> triggered `{}` in <#{}>\n```\n{}\n```",
        msg.author_id,
        rule.label(),
        msg.channel_id,
        excerpt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ConfigFetcher;
    use crate::document::AutomodConfig;
    use crate::event::ModEventKind;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedFetcher(AutomodConfig);

    #[async_trait]
    impl ConfigFetcher for FixedFetcher {
        async fn fetch_config(&self, _community_id: &str) -> Result<AutomodConfig, ClientError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ConfigFetcher for FailingFetcher {
        async fn fetch_config(&self, _community_id: &str) -> Result<AutomodConfig, ClientError> {
            Err(ClientError::Status(reqwest::StatusCode::BAD_GATEWAY))
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        calls: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    impl RecordingChat {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatActions for RecordingChat {
        async fn delete_message(
            &self,
            _channel_id: &str,
            _message_id: &str,
        ) -> Result<(), ActionError> {
            self.record("delete");
            if self.fail_delete {
                Err(ActionError("missing permission".to_string()))
            } else {
                Ok(())
            }
        }

        async fn warn_member(&self, _user_id: &str, _text: &str) -> Result<(), ActionError> {
            self.record("warn");
            Ok(())
        }

        async fn timeout_member(
            &self,
            _community_id: &str,
            _user_id: &str,
            _duration: Duration,
            _reason: &str,
        ) -> Result<(), ActionError> {
            self.record("timeout");
            Ok(())
        }

        async fn kick_member(
            &self,
            _community_id: &str,
            _user_id: &str,
            _reason: &str,
        ) -> Result<(), ActionError> {
            self.record("kick");
            Ok(())
        }

        async fn ban_member(
            &self,
            _community_id: &str,
            _user_id: &str,
            _reason: &str,
        ) -> Result<(), ActionError> {
            self.record("ban");
            Ok(())
        }

        async fn post_notice(&self, _channel_id: &str, _text: &str) -> Result<(), ActionError> {
            self.record("notice");
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ModEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn report(&self, event: &ModEvent) -> Result<(), ClientError> {
            if self.fail {
                return Err(ClientError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn enforcing_config() -> AutomodConfig {
        AutomodConfig::from_value(&json!({
            "enabled": true,
            "filters": { "links": { "enabled": true } },
            "actions": { "delete": { "enabled": true }, "warn": { "enabled": true } },
            "exceptions": { "users": ["excepted-user"], "channels": ["excepted-chan"], "roles": ["excepted-role"] },
            "logs": { "channelId": "log-chan" }
        }))
    }

    fn moderator(
        config: AutomodConfig,
        chat: Arc<RecordingChat>,
        sink: Arc<RecordingSink>,
    ) -> Moderator {
        let cache = ConfigCache::new(Arc::new(FixedFetcher(config)));
        Moderator::new(cache, sink, chat)
    }

    fn message(content: &str) -> InboundMessage {
        InboundMessage {
            id: "m1".to_string(),
            community_id: Some("c1".to_string()),
            channel_id: "chan1".to_string(),
            author_id: "u1".to_string(),
            author_roles: vec![],
            author_is_bot: false,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_bot_and_dm_messages_are_skipped() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let moderator = moderator(enforcing_config(), chat.clone(), sink);

        let mut bot_msg = message("https://spam.example");
        bot_msg.author_is_bot = true;
        assert_eq!(
            moderator.on_message(&bot_msg).await,
            Outcome::Skipped(Skip::FromBot)
        );

        let mut dm = message("https://spam.example");
        dm.community_id = None;
        assert_eq!(
            moderator.on_message(&dm).await,
            Outcome::Skipped(Skip::NoCommunity)
        );

        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_config_unavailable_skips_enforcement() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let cache = ConfigCache::new(Arc::new(FailingFetcher));
        let moderator = Moderator::new(cache, sink, chat.clone());

        let outcome = moderator.on_message(&message("https://spam.example")).await;
        assert_eq!(outcome, Outcome::Skipped(Skip::ConfigUnavailable));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_community_is_skipped() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let mut config = enforcing_config();
        config.enabled = false;
        let moderator = moderator(config, chat.clone(), sink);

        let outcome = moderator.on_message(&message("https://spam.example")).await;
        assert_eq!(outcome, Outcome::Skipped(Skip::Disabled));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_excepted_user_short_circuits_everything() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let moderator = moderator(enforcing_config(), chat.clone(), sink.clone());

        let mut msg = message("https://spam.example");
        msg.author_id = "excepted-user".to_string();

        let outcome = moderator.on_message(&msg).await;
        assert_eq!(
            outcome,
            Outcome::Skipped(Skip::Excepted(ExceptionKind::User))
        );
        assert!(chat.calls().is_empty());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exception_order_user_before_channel_before_role() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let moderator = moderator(enforcing_config(), chat, sink);

        // Matches both user and channel lists; user wins.
        let mut msg = message("https://spam.example");
        msg.author_id = "excepted-user".to_string();
        msg.channel_id = "excepted-chan".to_string();
        assert_eq!(
            moderator.on_message(&msg).await,
            Outcome::Skipped(Skip::Excepted(ExceptionKind::User))
        );

        let mut msg = message("https://spam.example");
        msg.channel_id = "excepted-chan".to_string();
        msg.author_roles = vec!["excepted-role".to_string()];
        assert_eq!(
            moderator.on_message(&msg).await,
            Outcome::Skipped(Skip::Excepted(ExceptionKind::Channel))
        );

        let mut msg = message("https://spam.example");
        msg.author_roles = vec!["excepted-role".to_string()];
        assert_eq!(
            moderator.on_message(&msg).await,
            Outcome::Skipped(Skip::Excepted(ExceptionKind::Role))
        );
    }

    #[tokio::test]
    async fn test_clean_message_reports_nothing() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let moderator = moderator(enforcing_config(), chat.clone(), sink.clone());

        let outcome = moderator.on_message(&message("perfectly fine")).await;
        assert_eq!(outcome, Outcome::Clean);
        assert!(chat.calls().is_empty());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enforcement_runs_actions_reports_and_logs() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let moderator = moderator(enforcing_config(), chat.clone(), sink.clone());

        let outcome = moderator.on_message(&message("https://spam.example")).await;
        let Outcome::Enforced(report) = outcome else {
            panic!("expected enforcement");
        };

        assert_eq!(report.rule, RuleKind::Links);
        assert!(report.outcomes.iter().all(ActionOutcome::is_applied));
        assert!(report.reported);
        assert!(report.notice_posted);
        assert_eq!(chat.calls(), vec!["delete", "warn", "notice"]);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].community_id, "c1");
        assert_eq!(
            events[0].kind,
            ModEventKind::Violation {
                label: "links".to_string()
            }
        );
        assert_eq!(events[0].subject_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_failing_action_does_not_block_siblings() {
        let chat = Arc::new(RecordingChat {
            fail_delete: true,
            ..RecordingChat::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let moderator = moderator(enforcing_config(), chat.clone(), sink);

        let Outcome::Enforced(report) =
            moderator.on_message(&message("https://spam.example")).await
        else {
            panic!("expected enforcement");
        };

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(
            report.outcomes[0],
            ActionOutcome::failed(ActionKind::Delete, "missing permission")
        );
        assert!(report.outcomes[1].is_applied());
        // The warn still ran after the failed delete.
        assert!(chat.calls().contains(&"warn".to_string()));
    }

    #[tokio::test]
    async fn test_report_failure_is_swallowed() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let moderator = moderator(enforcing_config(), chat.clone(), sink);

        let Outcome::Enforced(report) =
            moderator.on_message(&message("https://spam.example")).await
        else {
            panic!("expected enforcement");
        };

        assert!(!report.reported);
        // Sanctions and the log notice still went through.
        assert!(report.outcomes.iter().all(ActionOutcome::is_applied));
        assert!(report.notice_posted);
    }

    #[tokio::test]
    async fn test_no_log_sink_means_no_notice() {
        let chat = Arc::new(RecordingChat::default());
        let sink = Arc::new(RecordingSink::default());
        let mut config = enforcing_config();
        config.logs = None;
        let moderator = moderator(config, chat.clone(), sink);

        let Outcome::Enforced(report) =
            moderator.on_message(&message("https://spam.example")).await
        else {
            panic!("expected enforcement");
        };

        assert!(!report.notice_posted);
        assert!(!chat.calls().contains(&"notice".to_string()));
    }

    #[test]
    fn test_notice_text_truncates_long_content() {
        let mut msg = message("");
        msg.content = "x".repeat(2000);

        let text = notice_text(&msg, RuleKind::Caps);
        assert!(text.contains(&"x".repeat(1500)));
        assert!(!text.contains(&"x".repeat(1501)));
        assert!(text.contains('…'));
    }
}
