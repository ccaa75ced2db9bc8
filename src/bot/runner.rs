//! Update loop
//!
//! Long-polls Telegram and feeds every update through one serial worker, so
//! each update is handled to completion before the next one starts. A
//! cancelled token stops polling and waits for the update in flight.

use super::router::{Inbound, Router};
use crate::config::TELEGRAM_POLL_TIMEOUT_SECS;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::dispatching::ShutdownToken;
use teloxide::types::{CallbackQuery, MessageEntityKind};
use teloxide::update_listeners::Polling;
use teloxide::utils::command::BotCommands;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between shutdown attempts while the dispatcher is not running yet
const SHUTDOWN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Supported commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "начать работу")]
    Start,
    #[command(description = "показать справку")]
    Help,
}

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a token that is cancelled when either signal arrives.
#[must_use]
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
                        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received SIGINT, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down");
        }

        trigger.cancel();
    });

    token
}

/// Dispatch tree: callbacks, commands, then every other message.
///
/// Commands other than `/start` and `/help` (including ones addressed to
/// another bot) are dropped instead of being read as a search query.
#[must_use]
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| starts_with_command(&msg))
                        .endpoint(ignore_command),
                )
                .branch(dptree::endpoint(handle_message)),
        )
}

fn starts_with_command(msg: &Message) -> bool {
    msg.entities().is_some_and(|entities| {
        entities
            .iter()
            .any(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::BotCommand))
    })
}

async fn ignore_command(msg: Message) -> Result<(), teloxide::RequestError> {
    debug!(chat_id = msg.chat.id.0, text = ?msg.text(), "Ignoring unsupported command");
    respond(())
}

async fn handle_command(
    msg: Message,
    cmd: Command,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let inbound = match cmd {
        Command::Start => Inbound::Start,
        Command::Help => Inbound::Help,
    };
    router.handle(msg.chat.id.0, inbound).await;
    respond(())
}

async fn handle_message(msg: Message, router: Arc<Router>) -> Result<(), teloxide::RequestError> {
    let text = msg.text().unwrap_or_default().to_string();
    router.handle(msg.chat.id.0, Inbound::Text(text)).await;
    respond(())
}

async fn handle_callback(
    q: CallbackQuery,
    router: Arc<Router>,
) -> Result<(), teloxide::RequestError> {
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        warn!(data = ?q.data, "Received callback without message");
        return respond(());
    };

    let inbound = Inbound::Callback {
        id: q.id.0.clone(),
        data: q.data.clone().unwrap_or_default(),
    };
    router.handle(chat_id.0, inbound).await;
    respond(())
}

fn build_dispatcher(bot: Bot, router: Arc<Router>) -> Dispatcher<Bot, teloxide::RequestError, ()> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![router])
        // One worker for every update
        .distribution_function(|_| Some(()))
        .default_handler(|upd| async move {
            debug!(kind = ?upd.kind, "Unhandled update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .build()
}

/// Stops the dispatcher once `shutdown` is cancelled.
///
/// A dispatcher that has not started polling yet rejects the request, so it
/// is repeated until the dispatcher accepts it.
fn forward_shutdown(shutdown: CancellationToken, dispatcher: ShutdownToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown.cancelled().await;
        loop {
            match dispatcher.shutdown() {
                Ok(done) => {
                    info!("Waiting for the update in flight");
                    done.await;
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "Dispatcher not running yet, retrying shutdown");
                    tokio::time::sleep(SHUTDOWN_RETRY_INTERVAL).await;
                }
            }
        }
    })
}

/// Runs the update loop until `shutdown` is cancelled.
pub async fn run(bot: Bot, router: Arc<Router>, shutdown: CancellationToken) {
    if shutdown.is_cancelled() {
        info!("Shutdown requested before the update loop started");
        return;
    }

    let mut dispatcher = build_dispatcher(bot.clone(), router);
    let forwarder = forward_shutdown(shutdown, dispatcher.shutdown_token());

    let listener = Polling::builder(bot)
        .timeout(Duration::from_secs(TELEGRAM_POLL_TIMEOUT_SECS))
        .build();

    info!("Bot is running...");
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
    forwarder.abort();
    info!("Update loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::views::MENU_SEARCH_FILMS;
    use crate::bot::ChatPlatform;
    use crate::session::{MemorySessionStore, SearchKind, SessionState, SessionStore};
    use crate::testing::{film, RecordingPlatform, StaticCatalog, StaticPosters};
    use serde_json::json;
    use std::ops::ControlFlow;
    use teloxide::types::Me;

    const CHAT: i64 = 777;

    struct Fixture {
        router: Arc<Router>,
        chat: Arc<RecordingPlatform>,
        sessions: Arc<MemorySessionStore>,
    }

    fn fixture() -> Fixture {
        let catalog = StaticCatalog::default().with_films("matrix", 1, vec![film(1, "Matrix")]);
        let chat = Arc::new(RecordingPlatform::default());
        let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(60)));
        let router = Arc::new(Router::new(
            Arc::new(catalog),
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::new(StaticPosters::default()),
            Arc::clone(&chat) as Arc<dyn ChatPlatform>,
        ));
        Fixture {
            router,
            chat,
            sessions,
        }
    }

    fn me() -> Me {
        serde_json::from_value(json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Kino",
            "username": "kino_bot",
            "can_join_groups": false,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "has_main_web_app": false
        }))
        .expect("valid bot user")
    }

    fn text_update(text: &str) -> Update {
        let mut message = json!({
            "message_id": 10,
            "date": 1_700_000_000,
            "chat": { "id": CHAT, "type": "private", "first_name": "User" },
            "from": { "id": CHAT, "is_bot": false, "first_name": "User" },
            "text": text
        });
        if let Some(command) = text.split_whitespace().next().filter(|w| w.starts_with('/')) {
            message["entities"] = json!([{
                "type": "bot_command",
                "offset": 0,
                "length": command.encode_utf16().count()
            }]);
        }
        // `Update` only deserializes from text; `from_value` yields `UpdateKind::Error`
        serde_json::from_str(&json!({ "update_id": 1, "message": message }).to_string())
            .expect("valid update")
    }

    async fn dispatch(fx: &Fixture, text: &str) {
        let result = schema()
            .dispatch(dptree::deps![text_update(text), me(), Arc::clone(&fx.router)])
            .await;
        assert!(matches!(result, ControlFlow::Break(Ok(()))));
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let fx = fixture();
        let paging = SessionState::searching(SearchKind::PagingFilms, "matrix").at_page(3);
        fx.sessions.put(CHAT, &paging).await.expect("store write");

        dispatch(&fx, "/settings@kino_bot").await;
        dispatch(&fx, "/start@other_bot").await;
        dispatch(&fx, "/settings").await;

        assert!(fx.chat.sent().is_empty());
        assert_eq!(fx.sessions.get(CHAT).await.expect("store read"), Some(paging));
    }

    #[tokio::test]
    async fn test_known_commands_and_text_reach_router() {
        let fx = fixture();

        dispatch(&fx, "/start@kino_bot").await;
        assert_eq!(fx.chat.texts().len(), 1);

        fx.chat.clear();
        dispatch(&fx, MENU_SEARCH_FILMS).await;
        assert_eq!(
            fx.sessions.get(CHAT).await.expect("store read"),
            Some(SessionState::awaiting(SearchKind::AwaitingFilmQuery))
        );
    }

    #[tokio::test]
    async fn test_run_returns_when_already_cancelled() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let finished = tokio::time::timeout(
            Duration::from_secs(1),
            run(Bot::new("1:test"), fixture().router, shutdown),
        )
        .await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_retried_while_dispatcher_idle() {
        let dispatcher = build_dispatcher(Bot::new("1:test"), fixture().router);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let forwarder = forward_shutdown(shutdown, dispatcher.shutdown_token());
        tokio::time::sleep(SHUTDOWN_RETRY_INTERVAL * 3).await;

        // Still waiting for the dispatcher to start
        assert!(!forwarder.is_finished());
        forwarder.abort();
    }

    #[test]
    fn test_commands_parse() {
        assert_eq!(Command::parse("/start", "kino_bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/help", "kino_bot").ok(), Some(Command::Help));
        assert!(Command::parse("/clear", "kino_bot").is_err());
    }

    #[test]
    fn test_command_descriptions_list_both() {
        let text = Command::descriptions().to_string();
        assert!(text.contains("/start"));
        assert!(text.contains("/help"));
    }
}
