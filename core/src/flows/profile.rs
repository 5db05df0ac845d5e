use crate::callback::{CallbackAction, ProfileAction};
use crate::collaborators::{Button, Keyboard};
use crate::domain::{ActivityLevel, Gender, Goal, Profile, ProfileField};
use crate::error::{FlowError, ValidationError};
use crate::nutrition::daily_targets;
use crate::report::{render_profile, render_targets};
use crate::session::FlowKind;
use crate::validate::{
    validate_activity, validate_age, validate_gender, validate_goal, validate_height,
    validate_name, validate_weight,
};

use super::{FlowContext, Party};

const LOAD_FALLBACK: &str = "Could not load your profile right now. Please try again later.";
const SAVE_FALLBACK: &str = "Could not save the change right now. Please send the value again.";
const NO_PROFILE: &str = "You have no profile yet. Send /start to create one.";

/// Apply one edited field to `profile`, validating the raw text first.
pub fn apply_field(
    profile: &mut Profile,
    field: ProfileField,
    raw: &str,
) -> Result<(), ValidationError> {
    match field {
        ProfileField::Name => profile.name = validate_name(raw)?,
        ProfileField::Gender => profile.gender = validate_gender(raw)?,
        ProfileField::Age => profile.age = validate_age(raw)?,
        ProfileField::Height => profile.height_cm = validate_height(raw)?,
        ProfileField::Weight => profile.weight_kg = validate_weight(raw)?,
        ProfileField::Goal => profile.goal = validate_goal(raw)?,
        ProfileField::ActivityLevel => profile.activity_level = validate_activity(raw)?,
    }
    Ok(())
}

pub fn field_prompt(field: ProfileField) -> String {
    match field {
        ProfileField::Name => "Send your new name.".to_string(),
        ProfileField::Gender => format!(
            "Send your gender: {}.",
            Gender::ALL.map(|g| g.label().to_lowercase()).join(" or ")
        ),
        ProfileField::Age => "Send your age in years.".to_string(),
        ProfileField::Height => "Send your height in cm.".to_string(),
        ProfileField::Weight => "Send your weight in kg.".to_string(),
        ProfileField::Goal => format!(
            "Send your goal: {}.",
            Goal::ALL.map(|g| g.label().to_lowercase()).join(", ")
        ),
        ProfileField::ActivityLevel => format!(
            "Send your activity level: {}.",
            ActivityLevel::ALL
                .map(|level| level.as_str().replace('_', " "))
                .join(", ")
        ),
    }
}

fn edit_keyboard() -> Keyboard {
    let button = |field: ProfileField| {
        Button::new(
            format!("✏️ {}", field.label()),
            CallbackAction::Profile(ProfileAction::Edit(field)),
        )
    };
    Keyboard::default()
        .row([button(ProfileField::Name), button(ProfileField::Gender)])
        .row([button(ProfileField::Age), button(ProfileField::Height)])
        .row([button(ProfileField::Weight), button(ProfileField::Goal)])
        .row([button(ProfileField::ActivityLevel)])
}

impl FlowContext {
    async fn load_profile(&self, party: Party) -> Result<Option<Profile>, FlowError> {
        let user_id = party.user_id;
        Ok(self
            .io
            .store("get_profile", LOAD_FALLBACK, move |store| async move {
                store.get_profile(user_id).await
            })
            .await?)
    }

    pub async fn show_profile(&self, party: Party) -> Result<(), FlowError> {
        let Some(profile) = self.load_profile(party).await? else {
            self.say(party.chat_id, NO_PROFILE).await;
            return Ok(());
        };
        let user_id = party.user_id;
        let targets = self
            .io
            .store("get_daily_targets", LOAD_FALLBACK, move |store| async move {
                store.get_daily_targets(user_id).await
            })
            .await?;
        self.say_markdown(
            party.chat_id,
            &render_profile(&profile, targets.as_ref()),
            Some(&edit_keyboard()),
        )
        .await;
        Ok(())
    }

    pub async fn start_profile_edit(&self, party: Party, field: ProfileField) -> Result<(), FlowError> {
        if self.load_profile(party).await?.is_none() {
            self.say(party.chat_id, NO_PROFILE).await;
            return Ok(());
        }
        self.sessions
            .clear_except(party.user_id, FlowKind::ProfileEdit)
            .await;
        self.sessions.profile_edit.set(party.user_id, field).await;
        self.say(party.chat_id, &field_prompt(field)).await;
        Ok(())
    }

    pub async fn handle_profile_edit_text(&self, party: Party, text: &str) -> Result<(), FlowError> {
        let field = self
            .sessions
            .profile_edit
            .get(party.user_id)
            .await
            .ok_or_else(|| FlowError::StaleReference("no profile edit in progress".to_string()))?;

        let mut profile = self.load_profile(party).await?.ok_or_else(|| {
            FlowError::InternalInconsistency("profile vanished during edit".to_string())
        })?;
        if let Err(invalid) = apply_field(&mut profile, field, text) {
            self.say(
                party.chat_id,
                &format!("{}\n{}", invalid.message, field_prompt(field)),
            )
            .await;
            return Ok(());
        }

        let stored = profile.clone();
        self.io
            .store("upsert_profile", SAVE_FALLBACK, move |store| async move {
                store.upsert_profile(&stored).await
            })
            .await?;

        let mut reply = format!("{} updated.", field.label());
        if field.affects_targets() {
            let targets = daily_targets(&profile);
            let user_id = party.user_id;
            self.io
                .store("save_daily_targets", SAVE_FALLBACK, move |store| async move {
                    store.save_daily_targets(user_id, &targets).await
                })
                .await?;
            reply.push_str("\n\n");
            reply.push_str(&render_targets(&targets));
        }

        self.sessions.profile_edit.clear(party.user_id).await;
        tracing::info!(user_id = party.user_id, field = field.as_str(), "profile field updated");
        self.say_markdown(party.chat_id, &reply, None).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActivityLevel;

    fn profile() -> Profile {
        Profile {
            user_id: 1,
            chat_id: 1,
            name: "Ann".into(),
            gender: Gender::Female,
            age: 30,
            height_cm: 165.0,
            weight_kg: 60.0,
            goal: Goal::Maintain,
            activity_level: ActivityLevel::Moderate,
        }
    }

    #[test]
    fn apply_field_updates_only_that_field() {
        let mut edited = profile();
        apply_field(&mut edited, ProfileField::Weight, "58.5").expect("valid weight");
        assert_eq!(edited.weight_kg, 58.5);
        assert_eq!(edited.height_cm, 165.0);

        apply_field(&mut edited, ProfileField::ActivityLevel, "very active").expect("valid level");
        assert_eq!(edited.activity_level, ActivityLevel::VeryActive);
    }

    #[test]
    fn invalid_value_leaves_profile_untouched() {
        let mut edited = profile();
        let err = apply_field(&mut edited, ProfileField::Age, "abc").expect_err("invalid");
        assert_eq!(err.field, "age");
        assert_eq!(edited, profile());
    }

    #[test]
    fn every_field_has_an_edit_button() {
        let keyboard = edit_keyboard();
        assert_eq!(keyboard.buttons().count(), ProfileField::ALL.len());
    }
}
