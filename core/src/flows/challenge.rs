//! Weekly challenges and the on-demand daily report.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::callback::{CallbackAction, ChallengeAction};
use crate::collaborators::{Button, Keyboard};
use crate::domain::{Challenge, ChallengeMetric};
use crate::error::FlowError;
use crate::report::render_daily_report;

use super::{FlowContext, Party};

const LOAD_FALLBACK: &str = "Could not load the challenge right now. Please try again later.";
const REPORT_FALLBACK: &str = "Could not build your report right now. Please try again later.";

struct ChallengeTemplate {
    title: &'static str,
    description: &'static str,
    metric: ChallengeMetric,
    target: u32,
}

const CATALOG: [ChallengeTemplate; 4] = [
    ChallengeTemplate {
        title: "70k steps week",
        description: "Walk 70 000 steps this week. Every walk counts!",
        metric: ChallengeMetric::Steps,
        target: 70_000,
    },
    ChallengeTemplate {
        title: "Hydration week",
        description: "Drink 14 litres of water this week, about 2 litres a day.",
        metric: ChallengeMetric::WaterMl,
        target: 14_000,
    },
    ChallengeTemplate {
        title: "100k steps marathon",
        description: "Reach 100 000 steps before Sunday night.",
        metric: ChallengeMetric::Steps,
        target: 100_000,
    },
    ChallengeTemplate {
        title: "Water champion",
        description: "Drink 17.5 litres of water this week, 2.5 litres a day.",
        metric: ChallengeMetric::WaterMl,
        target: 17_500,
    },
];

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - ChronoDuration::days(date.weekday().num_days_from_monday() as i64)
}

/// Challenge for the week starting on `week_start`, rotating through the catalog
/// by ISO week number.
pub fn challenge_for_week(week_start: NaiveDate) -> Challenge {
    let template = &CATALOG[week_start.iso_week().week() as usize % CATALOG.len()];
    Challenge {
        id: Uuid::now_v7(),
        title: template.title.to_string(),
        description: template.description.to_string(),
        metric: template.metric,
        target: template.target,
        week_start,
    }
}

/// First instant of `date` in `timezone`, as UTC.
pub fn local_midnight_utc(date: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

pub fn render_challenge(challenge: &Challenge) -> String {
    format!(
        "🏆 *{}*\n{}\nGoal: {} {}",
        challenge.title,
        challenge.description,
        challenge.target,
        challenge.metric.unit()
    )
}

pub fn join_keyboard(challenge: &Challenge) -> Keyboard {
    Keyboard::single_column([Button::new(
        "🙋 Join",
        CallbackAction::Challenge(ChallengeAction::Join(challenge.id)),
    )])
}

impl FlowContext {
    pub async fn show_challenge(&self, party: Party) -> Result<(), FlowError> {
        let today = self.today();
        let Some(challenge) = self
            .io
            .store("current_challenge", LOAD_FALLBACK, move |store| async move {
                store.current_challenge(today).await
            })
            .await?
        else {
            self.say(party.chat_id, "There is no active challenge right now. A new one starts on Monday.")
                .await;
            return Ok(());
        };

        let since = local_midnight_utc(challenge.week_start, self.config.timezone);
        let (user_id, metric) = (party.user_id, challenge.metric);
        let progress = self
            .io
            .store("metric_total", "", move |store| async move {
                store.metric_total(user_id, metric, since).await
            })
            .await
            .ok();

        let mut text = render_challenge(&challenge);
        if let Some(progress) = progress {
            text.push_str(&format!(
                "\nYour progress: {progress} / {} {}",
                challenge.target,
                challenge.metric.unit()
            ));
        }
        self.say_markdown(party.chat_id, &text, Some(&join_keyboard(&challenge)))
            .await;
        Ok(())
    }

    pub async fn join_challenge(&self, party: Party, challenge_id: Uuid) -> Result<(), FlowError> {
        let today = self.today();
        let current = self
            .io
            .store("current_challenge", LOAD_FALLBACK, move |store| async move {
                store.current_challenge(today).await
            })
            .await?;
        if current.as_ref().map(|challenge| challenge.id) != Some(challenge_id) {
            return Err(FlowError::StaleReference(format!(
                "challenge {challenge_id} is not the current one"
            )));
        }

        let user_id = party.user_id;
        let joined = self
            .io
            .store(
                "join_challenge",
                "Could not join the challenge right now. Please tap again later.",
                move |store| async move { store.join_challenge(challenge_id, user_id).await },
            )
            .await?;
        let text = if joined {
            tracing::info!(user_id, challenge_id = %challenge_id, "challenge joined");
            "You joined the challenge. Good luck! 💪"
        } else {
            "You are already in this challenge."
        };
        self.say(party.chat_id, text).await;
        Ok(())
    }

    pub async fn show_today_report(&self, party: Party) -> Result<(), FlowError> {
        let user_id = party.user_id;
        let today = self.today();
        let timezone = self.config.timezone;
        let profile = self.profile_for_prompt(party).await;
        let summary = self
            .io
            .store("daily_summary", REPORT_FALLBACK, move |store| async move {
                store.daily_summary(user_id, today, timezone).await
            })
            .await?;
        let targets = self
            .io
            .store("get_daily_targets", REPORT_FALLBACK, move |store| async move {
                store.get_daily_targets(user_id).await
            })
            .await?;
        let name = profile.map(|p| p.name).unwrap_or_else(|| "you".to_string());
        self.say_markdown(
            party.chat_id,
            &render_daily_report(&name, today, &summary, targets.as_ref()),
            None,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn week_starts_on_monday() {
        assert_eq!(week_start(date(2026, 3, 12)), date(2026, 3, 9));
        assert_eq!(week_start(date(2026, 3, 9)), date(2026, 3, 9));
        assert_eq!(week_start(date(2026, 3, 15)), date(2026, 3, 9));
    }

    #[test]
    fn consecutive_weeks_rotate_the_catalog() {
        let first = challenge_for_week(date(2026, 3, 9));
        let second = challenge_for_week(date(2026, 3, 16));
        assert_ne!(first.title, second.title);
        assert_eq!(first.week_start, date(2026, 3, 9));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn local_midnight_honours_timezone() {
        let berlin: Tz = "Europe/Berlin".parse().expect("known zone");
        let instant = local_midnight_utc(date(2026, 1, 5), berlin);
        assert_eq!(instant.to_rfc3339(), "2026-01-04T23:00:00+00:00");
    }

    #[test]
    fn join_button_encodes_challenge_id() {
        let challenge = challenge_for_week(date(2026, 3, 9));
        let keyboard = join_keyboard(&challenge);
        let button = keyboard.buttons().next().expect("one button");
        assert_eq!(
            CallbackAction::decode(&button.data),
            Ok(CallbackAction::Challenge(ChallengeAction::Join(challenge.id)))
        );
    }
}
