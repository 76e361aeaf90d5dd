//! Slash-command handlers.
//!
//! Commands are answered inline; anything that needs a follow-up message
//! from the user registers a [`Continuation`] instead of blocking.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use parley_core::repository::{ChatRepository, SubscriptionRepository};
use parley_infra::config::save_bot_config;
use parley_infra::telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup, LabeledPrice};
use parley_types::config::Strings;
use parley_types::error::RepositoryError;
use parley_types::subscription::SubscriptionPlan;
use parley_types::user::{User, UserRole};

use crate::state::{AppState, Continuation};

pub async fn dispatch(
    state: &AppState,
    user: &User,
    chat_id: i64,
    text: &str,
) -> anyhow::Result<()> {
    let mut parts = text.split_whitespace();
    let word = parts.next().unwrap_or(text);
    // Group chats address commands as /cmd@botname.
    let command = word.split('@').next().unwrap_or(word);
    let rest = text[word.len()..].trim();

    match command {
        "/start" => {
            let greeting = Strings::fill(&state.config.strings.welcome, "name", &user.name);
            state.api.send_message(chat_id, &greeting, None).await?;
        }
        "/help" => {
            state
                .api
                .send_message(chat_id, &state.config.strings.help, None)
                .await?;
        }
        "/new" => {
            state.continuations.insert(chat_id, Continuation::AwaitChatName);
            state
                .api
                .send_message(chat_id, &state.config.strings.ask_chat_name, None)
                .await?;
        }
        "/chats" => pick_chat(state, user, chat_id, "chat:", "Pick a chat:").await?,
        "/delete" => pick_chat(state, user, chat_id, "del:", "Pick a chat to delete:").await?,
        "/generate" => generate(state, user, chat_id).await?,
        "/purchase" => purchase(state, chat_id).await?,
        "/account" => account(state, user, chat_id).await?,
        "/cancel" => cancel(state, chat_id).await?,
        "/plans" if is_admin(state, user) => plans(state, chat_id).await?,
        "/export" if is_admin(state, user) => export(state, chat_id, rest).await?,
        "/addplan" if is_admin(state, user) => add_plan(state, chat_id, rest).await?,
        "/delplan" if is_admin(state, user) => del_plan(state, chat_id, rest).await?,
        "/setmodel" if is_admin(state, user) => set_model(state, chat_id, rest).await?,
        _ => {
            state
                .api
                .send_message(chat_id, "Unknown command. Try /help.", None)
                .await?;
        }
    }
    Ok(())
}

fn is_admin(state: &AppState, user: &User) -> bool {
    user.role == UserRole::Admin || state.is_admin(user.id)
}

/// Offer the user's chats as an inline keyboard; `prefix` decides what
/// the pressed button does.
async fn pick_chat(
    state: &AppState,
    user: &User,
    chat_id: i64,
    prefix: &str,
    title: &str,
) -> anyhow::Result<()> {
    let chats = state.chats.list_chats(user.id).await?;
    if chats.is_empty() {
        state
            .api
            .send_message(chat_id, "You have no chats yet. Use /new to start one.", None)
            .await?;
        return Ok(());
    }

    let keyboard = InlineKeyboardMarkup {
        inline_keyboard: chats
            .iter()
            .map(|chat| {
                vec![InlineKeyboardButton::callback(
                    &chat.name,
                    format!("{prefix}{}", chat.id),
                )]
            })
            .collect(),
    };
    state.api.send_message(chat_id, title, Some(&keyboard)).await?;
    Ok(())
}

async fn generate(state: &AppState, user: &User, chat_id: i64) -> anyhow::Result<()> {
    use parley_types::subscription::Entitlement;

    match state.gate.check_entitlement(user.id).await? {
        Entitlement::Entitled => {
            state
                .continuations
                .insert(chat_id, Continuation::AwaitImagePrompt);
            state
                .api
                .send_message(chat_id, &state.config.strings.image_ask_description, None)
                .await?;
        }
        Entitlement::Denied(_) => {
            state
                .api
                .send_message(chat_id, &state.config.strings.no_subscription, None)
                .await?;
        }
    }
    Ok(())
}

async fn purchase(state: &AppState, chat_id: i64) -> anyhow::Result<()> {
    if state.payment_provider_token.is_none() {
        state
            .api
            .send_message(chat_id, "Payments are not configured.", None)
            .await?;
        return Ok(());
    }

    let plans = state.gate.subscriptions().list_plans().await?;
    let Some(keyboard) = purchase_keyboard(&plans) else {
        state
            .api
            .send_message(chat_id, "No plans are available right now.", None)
            .await?;
        return Ok(());
    };
    state
        .api
        .send_message(chat_id, &state.config.strings.purchase_button, Some(&keyboard))
        .await?;
    Ok(())
}

/// One `buy:` button per paid plan; `None` when nothing is purchasable.
fn purchase_keyboard(plans: &[SubscriptionPlan]) -> Option<InlineKeyboardMarkup> {
    let rows: Vec<Vec<InlineKeyboardButton>> = plans
        .iter()
        .filter(|plan| plan.price > 0.0)
        .map(|plan| {
            vec![InlineKeyboardButton::callback(
                format!(
                    "{} -- {:.2} {} / {} days",
                    plan.name, plan.price, plan.currency, plan.duration_days
                ),
                format!("buy:{}", plan.id),
            )]
        })
        .collect();
    (!rows.is_empty()).then_some(InlineKeyboardMarkup {
        inline_keyboard: rows,
    })
}

/// Follow a denial notice with the purchasable plans, so the user can
/// act on it directly.
pub async fn offer_plans(
    state: &AppState,
    chat_id: i64,
    plans: &[SubscriptionPlan],
) -> anyhow::Result<()> {
    if state.payment_provider_token.is_none() {
        return Ok(());
    }
    let Some(keyboard) = purchase_keyboard(plans) else {
        return Ok(());
    };
    state
        .api
        .send_message(chat_id, &state.config.strings.purchase_button, Some(&keyboard))
        .await?;
    Ok(())
}

/// Invoice for one plan; amounts go over the wire in minor units (cents).
pub async fn send_plan_invoice(
    state: &AppState,
    chat_id: i64,
    plan_id: Uuid,
) -> anyhow::Result<()> {
    let Some(provider_token) = state.payment_provider_token.as_deref() else {
        state
            .api
            .send_message(chat_id, "Payments are not configured.", None)
            .await?;
        return Ok(());
    };
    let Some(plan) = state.gate.subscriptions().get_plan(&plan_id).await? else {
        warn!(%plan_id, "invoice requested for unknown plan");
        state
            .api
            .send_message(chat_id, "This plan no longer exists.", None)
            .await?;
        return Ok(());
    };

    let description = plan
        .description
        .clone()
        .unwrap_or_else(|| format!("{} days of access", plan.duration_days));
    let prices = [LabeledPrice {
        label: plan.name.clone(),
        amount: (plan.price * 100.0).round() as i64,
    }];
    state
        .api
        .send_invoice(
            chat_id,
            &plan.name,
            &description,
            &format!("plan:{}", plan.id),
            provider_token,
            &plan.currency,
            &prices,
        )
        .await?;
    Ok(())
}

async fn account(state: &AppState, user: &User, chat_id: i64) -> anyhow::Result<()> {
    use parley_types::subscription::SubscriptionStatus;

    let now = Utc::now();
    let subscriptions = state.gate.subscriptions().list_subscriptions(user.id).await?;

    let mut lines = vec![format!("Account: {} (id {})", user.name, user.id)];
    let mut active = 0usize;
    for subscription in &subscriptions {
        if subscription.derived_status(now) != SubscriptionStatus::Active {
            continue;
        }
        active += 1;
        let plan_name = match state
            .gate
            .subscriptions()
            .get_plan(&subscription.plan_id)
            .await?
        {
            Some(plan) => plan.name,
            None => "unknown plan".to_string(),
        };
        lines.push(format!(
            "{plan_name}: active until {}",
            subscription.end_date.format("%Y-%m-%d")
        ));
    }
    if active == 0 {
        lines.push(state.config.strings.no_subscription.clone());
    }

    state.api.send_message(chat_id, &lines.join("\n"), None).await?;
    Ok(())
}

/// Abort the in-flight turn (if any) and drop any pending prompt.
async fn cancel(state: &AppState, chat_id: i64) -> anyhow::Result<()> {
    state.continuations.remove(&chat_id);
    if let Some(entry) = state.running.get(&chat_id) {
        entry.value().cancel();
    }
    state
        .api
        .send_message(chat_id, &state.config.strings.canceled, None)
        .await?;
    Ok(())
}

async fn plans(state: &AppState, chat_id: i64) -> anyhow::Result<()> {
    let plans = state.gate.subscriptions().list_plans().await?;
    if plans.is_empty() {
        state.api.send_message(chat_id, "No plans defined.", None).await?;
        return Ok(());
    }
    let text = plans
        .iter()
        .map(|plan| {
            format!(
                "{} -- {} -- {:.2} {} / {} days",
                plan.id, plan.name, plan.price, plan.currency, plan.duration_days
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    state.api.send_message(chat_id, &text, None).await?;
    Ok(())
}

/// Send the users, chats, and messages tables as CSV documents,
/// optionally limited to the last N days.
///
/// Built in memory and uploaded directly; nothing touches disk.
async fn export(state: &AppState, chat_id: i64, args: &str) -> anyhow::Result<()> {
    use parley_core::repository::UserRepository;

    let cutoff = match args.trim() {
        "" => None,
        days => match days.parse::<i64>() {
            Ok(days) if days > 0 => Some(Utc::now() - chrono::Duration::days(days)),
            _ => {
                state
                    .api
                    .send_message(chat_id, "Usage: /export [days]", None)
                    .await?;
                return Ok(());
            }
        },
    };

    let mut users_csv = String::from("id,name,role,current_chat_id\n");
    let mut chats_csv = String::from("id,user_id,name,created_at\n");
    let mut messages_csv = String::from("id,chat_id,role,content,created_at\n");

    for user in state.users.list_users().await? {
        users_csv.push_str(&csv_row(&[
            &user.id.to_string(),
            &user.name,
            &user.role.to_string(),
            &user
                .current_chat_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ]));

        for chat in state.chats.list_chats(user.id).await? {
            if cutoff.is_none_or(|c| chat.created_at >= c) {
                chats_csv.push_str(&csv_row(&[
                    &chat.id.to_string(),
                    &chat.user_id.to_string(),
                    &chat.name,
                    &chat.created_at.to_rfc3339(),
                ]));
            }
            // An old chat can still hold messages inside the period.
            for message in state
                .chats
                .get_history(&chat.id)
                .await?
                .iter()
                .filter(|m| cutoff.is_none_or(|c| m.created_at >= c))
            {
                messages_csv.push_str(&csv_row(&[
                    &message.id.to_string(),
                    &message.chat_id.to_string(),
                    &message.role.to_string(),
                    &message.content,
                    &message.created_at.to_rfc3339(),
                ]));
            }
        }
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    for (table, csv) in [
        ("users", users_csv),
        ("chats", chats_csv),
        ("messages", messages_csv),
    ] {
        state
            .api
            .send_document_bytes(chat_id, &format!("{table}_{stamp}.csv"), csv.into_bytes())
            .await?;
    }
    info!(chat_id, "data export delivered");
    Ok(())
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

fn csv_field(field: &str) -> String {
    if field.contains(['"', ',', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

async fn add_plan(state: &AppState, chat_id: i64, args: &str) -> anyhow::Result<()> {
    let Some((name, price, duration_days, description)) = parse_add_plan(args) else {
        state
            .api
            .send_message(
                chat_id,
                "Usage: /addplan <name> <price> <days> [description]",
                None,
            )
            .await?;
        return Ok(());
    };

    let plan = SubscriptionPlan {
        id: Uuid::now_v7(),
        name,
        description,
        price,
        currency: "USD".to_string(),
        duration_days,
    };
    state.gate.subscriptions().create_plan(&plan).await?;
    info!(plan_id = %plan.id, plan = %plan.name, "plan created");
    state
        .api
        .send_message(chat_id, &format!("Plan '{}' created ({}).", plan.name, plan.id), None)
        .await?;
    Ok(())
}

fn parse_add_plan(args: &str) -> Option<(String, f64, i64, Option<String>)> {
    let mut parts = args.split_whitespace();
    let name = parts.next()?.to_string();
    let price: f64 = parts.next()?.parse().ok()?;
    let duration_days: i64 = parts.next()?.parse().ok()?;
    if price < 0.0 || duration_days <= 0 {
        return None;
    }
    let description = {
        let rest = parts.collect::<Vec<_>>().join(" ");
        (!rest.is_empty()).then_some(rest)
    };
    Some((name, price, duration_days, description))
}

async fn del_plan(state: &AppState, chat_id: i64, args: &str) -> anyhow::Result<()> {
    let Ok(plan_id) = args.trim().parse::<Uuid>() else {
        state
            .api
            .send_message(chat_id, "Usage: /delplan <plan-id>", None)
            .await?;
        return Ok(());
    };

    let reply = match state.gate.subscriptions().delete_plan(&plan_id).await {
        Ok(()) => "Plan deleted.".to_string(),
        Err(RepositoryError::NotFound) => "No such plan.".to_string(),
        Err(RepositoryError::Conflict(_)) => {
            "Plan has subscriptions and cannot be deleted.".to_string()
        }
        Err(err) => return Err(err.into()),
    };
    state.api.send_message(chat_id, &reply, None).await?;
    Ok(())
}

/// Persist a new provider/model pair. The running process keeps its
/// current model; the change applies on restart.
async fn set_model(state: &AppState, chat_id: i64, args: &str) -> anyhow::Result<()> {
    let mut parts = args.split_whitespace();
    let (Some(provider), Some(model_name), None) = (parts.next(), parts.next(), parts.next())
    else {
        state
            .api
            .send_message(chat_id, "Usage: /setmodel <provider> <model-name>", None)
            .await?;
        return Ok(());
    };
    if !matches!(provider, "openai" | "fireworks") {
        state
            .api
            .send_message(chat_id, "Provider must be 'openai' or 'fireworks'.", None)
            .await?;
        return Ok(());
    }

    let mut config = (*state.config).clone();
    config.model.provider = provider.to_string();
    config.model.model_name = model_name.to_string();
    save_bot_config(&state.data_dir, &config).await?;
    info!(provider, model_name, "model configuration saved");

    state
        .api
        .send_message(
            chat_id,
            &format!("Saved {provider}/{model_name}. Restart the bot to apply."),
            None,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_plan_full() {
        let (name, price, days, description) =
            parse_add_plan("Pro 9.99 30 Monthly access to everything").unwrap();
        assert_eq!(name, "Pro");
        assert_eq!(price, 9.99);
        assert_eq!(days, 30);
        assert_eq!(description.as_deref(), Some("Monthly access to everything"));
    }

    #[test]
    fn test_parse_add_plan_without_description() {
        let (name, price, days, description) = parse_add_plan("Basic 5 7").unwrap();
        assert_eq!(name, "Basic");
        assert_eq!(price, 5.0);
        assert_eq!(days, 7);
        assert!(description.is_none());
    }

    #[test]
    fn test_csv_plain_fields_pass_through() {
        assert_eq!(csv_row(&["1", "Ada", "user"]), "1,Ada,user\n");
    }

    #[test]
    fn test_csv_quotes_and_separators_escaped() {
        assert_eq!(
            csv_row(&["say \"hi\"", "a,b", "line\nbreak"]),
            "\"say \"\"hi\"\"\",\"a,b\",\"line\nbreak\"\n"
        );
    }

    fn plan(name: &str, price: f64) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            price,
            currency: "USD".to_string(),
            duration_days: 30,
        }
    }

    #[test]
    fn test_purchase_keyboard_offers_paid_plans() {
        let plans = [plan("Trial", 0.0), plan("Pro", 9.99)];
        let keyboard = purchase_keyboard(&plans).unwrap();
        assert_eq!(keyboard.inline_keyboard.len(), 1);
        let button = &keyboard.inline_keyboard[0][0];
        assert!(button.text.starts_with("Pro"));
        assert_eq!(
            button.callback_data.as_deref(),
            Some(format!("buy:{}", plans[1].id).as_str())
        );
    }

    #[test]
    fn test_purchase_keyboard_empty_for_free_plans_only() {
        assert!(purchase_keyboard(&[plan("Trial", 0.0)]).is_none());
        assert!(purchase_keyboard(&[]).is_none());
    }

    #[test]
    fn test_parse_add_plan_rejects_bad_numbers() {
        assert!(parse_add_plan("Pro free 30").is_none());
        assert!(parse_add_plan("Pro -1 30").is_none());
        assert!(parse_add_plan("Pro 9.99 0").is_none());
        assert!(parse_add_plan("").is_none());
    }
}
