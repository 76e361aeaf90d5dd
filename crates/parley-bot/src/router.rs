//! Update router: maps Telegram updates onto core operations.
//!
//! Fast interactions (commands, callbacks, payments) are handled inline;
//! model turns and image generation are spawned so a slow generation
//! never blocks the poll loop. At most one turn runs per platform chat:
//! registering a new one cancels its predecessor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_core::attachment::{AttachmentKind, FileDescriptor};
use parley_core::orchestrator::{InboundTurn, TurnContent, TurnOutcome};
use parley_core::repository::{SubscriptionRepository, UserRepository};
use parley_core::transport::ChatRef;
use parley_infra::telegram::types::{CallbackQuery, Message, PreCheckoutQuery, Update};
use parley_types::chat::LogEntry;
use parley_types::config::Strings;
use parley_types::user::User;

use crate::commands;
use crate::state::{AppState, Continuation};

/// Invoice payload prefix; the rest is the plan id.
const PLAN_PAYLOAD_PREFIX: &str = "plan:";

pub async fn handle_update(state: &AppState, update: Update) -> anyhow::Result<()> {
    if let Some(query) = update.pre_checkout_query {
        return handle_pre_checkout(state, query).await;
    }
    if let Some(callback) = update.callback_query {
        return handle_callback(state, callback).await;
    }
    if let Some(message) = update.message {
        return handle_message(state, message).await;
    }
    Ok(())
}

async fn handle_message(state: &AppState, message: Message) -> anyhow::Result<()> {
    let Some(from) = &message.from else {
        // Channel posts and service messages carry no sender.
        return Ok(());
    };
    let chat_id = message.chat.id;
    let user = sign_in(state, from.id, from.display_name()).await?;

    if let Some(payment) = &message.successful_payment {
        return handle_successful_payment(state, &user, chat_id, payment).await;
    }

    if let Some(document) = &message.document {
        spawn_turn(
            state,
            user.id,
            chat_id,
            TurnContent::Attachment(FileDescriptor {
                file_id: document.file_id.clone(),
                file_name: document.file_name.clone(),
                caption: message.caption.clone(),
                kind: AttachmentKind::Document,
            }),
        );
        return Ok(());
    }

    if let Some(photo) = message.largest_photo() {
        spawn_turn(
            state,
            user.id,
            chat_id,
            TurnContent::Attachment(FileDescriptor {
                file_id: photo.file_id.clone(),
                file_name: None,
                caption: message.caption.clone(),
                kind: AttachmentKind::Photo,
            }),
        );
        return Ok(());
    }

    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };

    if text.starts_with('/') {
        // A command supersedes whatever prompt was pending.
        state.continuations.remove(&chat_id);
        return commands::dispatch(state, &user, chat_id, text).await;
    }

    if let Some((_, continuation)) = state.continuations.remove(&chat_id) {
        return resume_continuation(state, &user, chat_id, continuation, text).await;
    }

    spawn_turn(state, user.id, chat_id, TurnContent::Text(text.to_string()));
    Ok(())
}

/// Upsert the user; a first sign-in also grants the trial and logs.
async fn sign_in(state: &AppState, user_id: i64, name: &str) -> anyhow::Result<User> {
    let first_time = state.users.get_user(user_id).await?.is_none();
    let user = state.users.upsert_user(user_id, name).await?;

    if first_time {
        info!(user_id, "first sign-in");
        if state.gate.grant_trial(user_id).await?.is_none() {
            warn!(user_id, "no trial plan configured");
        }
        state
            .users
            .write_log(&LogEntry {
                id: Uuid::now_v7(),
                user_id: Some(user_id),
                content: "signed in".to_string(),
                created_at: chrono::Utc::now(),
            })
            .await?;
    }
    Ok(user)
}

async fn resume_continuation(
    state: &AppState,
    user: &User,
    chat_id: i64,
    continuation: Continuation,
    text: &str,
) -> anyhow::Result<()> {
    match continuation {
        Continuation::AwaitChatName => {
            let chat = state.resolver.start_chat(user.id, text.trim()).await?;
            let notice = Strings::fill(
                &state.config.strings.current_chat,
                "chat_name",
                &chat.name,
            );
            state
                .api
                .send_message(
                    chat_id,
                    &format!("{}\n{notice}", state.config.strings.new_chat_created),
                    None,
                )
                .await?;
        }
        Continuation::AwaitImagePrompt => {
            spawn_image_generation(state, user.id, chat_id, text.to_string());
        }
    }
    Ok(())
}

/// Run one conversational turn in the background, cancelling any turn
/// already in flight for this chat.
pub fn spawn_turn(state: &AppState, user_id: i64, chat_id: i64, content: TurnContent) {
    let token = Arc::new(CancellationToken::new());
    if let Some(previous) = state.running.insert(chat_id, token.clone()) {
        previous.cancel();
    }

    let state = state.clone();
    tokio::spawn(async move {
        let turn = InboundTurn {
            user_id,
            platform_chat: ChatRef(chat_id),
            content,
        };
        match state
            .orchestrator
            .process_turn(turn, token.as_ref().clone())
            .await
        {
            Ok(TurnOutcome::Denied(plans)) => {
                if let Err(err) = commands::offer_plans(&state, chat_id, &plans).await {
                    error!(chat_id, %err, "failed to offer plans");
                }
            }
            Ok(_) => {}
            Err(err) => error!(user_id, chat_id, %err, "turn failed"),
        }
        state
            .running
            .remove_if(&chat_id, |_, current| Arc::ptr_eq(current, &token));
    });
}

/// Generate an image in the background: ask the API for a URL, fetch the
/// bytes, deliver as a photo.
pub fn spawn_image_generation(state: &AppState, user_id: i64, chat_id: i64, prompt: String) {
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = generate_and_send(&state, chat_id, &prompt).await {
            error!(user_id, chat_id, %err, "image generation failed");
            if let Err(send_err) = state
                .api
                .send_message(chat_id, &state.config.strings.model_error, None)
                .await
            {
                error!(chat_id, %send_err, "failed to deliver error notice");
            }
        }
    });
}

async fn generate_and_send(state: &AppState, chat_id: i64, prompt: &str) -> anyhow::Result<()> {
    use parley_core::model::provider::ImageGenerator;

    state
        .api
        .send_message(chat_id, &state.config.strings.image_please_wait, None)
        .await?;

    let url = state.image_gen.generate(prompt, None).await?;
    let bytes = state
        .http
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    state.api.send_photo_bytes(chat_id, bytes.to_vec()).await?;
    info!(chat_id, "image delivered");
    Ok(())
}

async fn handle_callback(state: &AppState, callback: CallbackQuery) -> anyhow::Result<()> {
    // Acknowledge first so the client stops its spinner.
    state.api.answer_callback_query(&callback.id).await?;

    let Some(data) = callback.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = &callback.message else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let user_id = callback.from.id;

    if let Some(id) = data.strip_prefix("chat:") {
        let chat = state
            .resolver
            .set_active_chat(user_id, id.parse::<Uuid>()?)
            .await?;
        let notice = Strings::fill(&state.config.strings.current_chat, "chat_name", &chat.name);
        state.api.send_message(chat_id, &notice, None).await?;
    } else if let Some(id) = data.strip_prefix("del:") {
        state
            .resolver
            .delete_chat(user_id, id.parse::<Uuid>()?)
            .await?;
        state.api.send_message(chat_id, "Chat deleted.", None).await?;
    } else if let Some(id) = data.strip_prefix("buy:") {
        commands::send_plan_invoice(state, chat_id, id.parse::<Uuid>()?).await?;
    } else {
        warn!(data, "unknown callback");
    }
    Ok(())
}

/// Pre-checkout must be answered within ten seconds; approve when the
/// payload still names an existing plan.
async fn handle_pre_checkout(state: &AppState, query: PreCheckoutQuery) -> anyhow::Result<()> {
    let plan = match query
        .invoice_payload
        .strip_prefix(PLAN_PAYLOAD_PREFIX)
        .and_then(|id| id.parse::<Uuid>().ok())
    {
        Some(plan_id) => state.gate.subscriptions().get_plan(&plan_id).await?,
        None => None,
    };

    match plan {
        Some(_) => state.api.answer_pre_checkout_query(&query.id, true, None).await?,
        None => {
            warn!(payload = %query.invoice_payload, "pre-checkout for unknown plan");
            state
                .api
                .answer_pre_checkout_query(&query.id, false, Some("This plan no longer exists."))
                .await?;
        }
    }
    Ok(())
}

async fn handle_successful_payment(
    state: &AppState,
    user: &User,
    chat_id: i64,
    payment: &parley_infra::telegram::types::SuccessfulPayment,
) -> anyhow::Result<()> {
    let Some(plan_id) = payment
        .invoice_payload
        .strip_prefix(PLAN_PAYLOAD_PREFIX)
        .and_then(|id| id.parse::<Uuid>().ok())
    else {
        anyhow::bail!("payment with malformed payload: {}", payment.invoice_payload);
    };

    let (_, plan) = state
        .gate
        .record_payment(
            user.id,
            plan_id,
            payment.total_amount as f64 / 100.0,
            &payment.currency,
            &payment.telegram_payment_charge_id,
        )
        .await?;

    let notice = Strings::fill(
        &state.config.strings.payment_successful,
        "plan_name",
        &plan.name,
    );
    state.api.send_message(chat_id, &notice, None).await?;
    Ok(())
}
